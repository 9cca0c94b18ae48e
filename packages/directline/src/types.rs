//! Wire shapes exchanged with the Direct Line service.

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

use crate::config::BatchDispatch;

/// Activity type used for plain text messages.
pub const MESSAGE_TYPE: &str = "message";

/// A participant reference: a display name, an opaque id, or both.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Identity {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: Some(name.into()),
        }
    }

    /// The display name if present, otherwise the id.
    pub fn label(&self) -> &str {
        self.name
            .as_deref()
            .or(self.id.as_deref())
            .unwrap_or_default()
    }
}

/// Body of the conversation negotiation response.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartConversation {
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub stream_url: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default, rename = "expires_in")]
    pub expires_in: Option<u64>,
}

/// Outbound activity posted for each `send`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct OutboundActivity {
    #[serde(rename = "type")]
    pub kind: String,
    pub from: Identity,
    pub text: String,
}

impl OutboundActivity {
    pub fn message(sender: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            kind: MESSAGE_TYPE.to_string(),
            from: Identity::named(sender),
            text: text.into(),
        }
    }
}

/// Acknowledgement returned by the activity endpoint.
#[derive(Clone, Debug, Deserialize)]
pub struct ResourceResponse {
    #[serde(default)]
    pub id: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub content_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// One activity pushed by the bot over the stream.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_timestamp: Option<String>,
    #[serde(default)]
    pub channel_id: String,
    #[serde(default)]
    pub from: Identity,
    #[serde(default)]
    pub conversation: Identity,
    #[serde(default)]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speak: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_hint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
}

impl Activity {
    pub fn is_message(&self) -> bool {
        self.kind == MESSAGE_TYPE
    }

    /// Service-side timestamp, if present and well formed.
    pub fn timestamp(&self) -> Option<DateTime<FixedOffset>> {
        parse_timestamp(self.timestamp.as_deref())
    }

    /// Sender-local timestamp, if present and well formed.
    pub fn local_timestamp(&self) -> Option<DateTime<FixedOffset>> {
        parse_timestamp(self.local_timestamp.as_deref())
    }
}

fn parse_timestamp(raw: Option<&str>) -> Option<DateTime<FixedOffset>> {
    raw.and_then(|s| DateTime::parse_from_rfc3339(s).ok())
}

/// One stream frame: a watermark cursor plus the activities it carries.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct ActivitySet {
    #[serde(default)]
    pub watermark: Option<String>,
    #[serde(default)]
    pub activities: Vec<Activity>,
}

impl ActivitySet {
    /// Decode a text frame. Blank frames are heartbeats and decode to an empty set.
    pub fn decode(frame: &str) -> Result<Self, serde_json::Error> {
        if frame.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_json::from_str(frame)
    }

    /// Activities to hand to the observer. A set without a watermark carries nothing.
    pub fn into_dispatch(self, mode: BatchDispatch) -> Vec<Activity> {
        if self.watermark.is_none() {
            return Vec::new();
        }
        match mode {
            BatchDispatch::First => self.activities.into_iter().take(1).collect(),
            BatchDispatch::All => self.activities,
        }
    }
}
