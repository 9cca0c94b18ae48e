use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Public Direct Line v3 endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://directline.botframework.com/v3/directline/";

/// Sender name used when the caller does not pick one.
pub const DEFAULT_DISPLAY_NAME: &str = "Me";

/// How many activities of a watermarked frame reach the observer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchDispatch {
    /// Only the first activity of each frame.
    #[default]
    First,
    /// Every activity, in arrival order.
    All,
}

/// Session tunables. Every field has a default so partial TOML/env layers deserialize.
#[derive(Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default)]
    pub secret: String,
    #[serde(default = "default_display_name")]
    pub display_name: String,
    #[serde(default)]
    pub debug: bool,
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default)]
    pub batch_dispatch: BatchDispatch,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_close_timeout_secs")]
    pub close_timeout_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            secret: String::new(),
            display_name: default_display_name(),
            debug: false,
            endpoint: default_endpoint(),
            batch_dispatch: BatchDispatch::default(),
            request_timeout_secs: default_request_timeout_secs(),
            close_timeout_secs: default_close_timeout_secs(),
        }
    }
}

impl std::fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionConfig")
            .field("secret", &"<redacted>")
            .field("display_name", &self.display_name)
            .field("debug", &self.debug)
            .field("endpoint", &self.endpoint)
            .field("batch_dispatch", &self.batch_dispatch)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("close_timeout_secs", &self.close_timeout_secs)
            .finish()
    }
}

impl SessionConfig {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            ..Default::default()
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn close_timeout(&self) -> Duration {
        Duration::from_secs(self.close_timeout_secs)
    }
}

fn default_display_name() -> String {
    DEFAULT_DISPLAY_NAME.to_string()
}
fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}
fn default_request_timeout_secs() -> u64 {
    30
}
fn default_close_timeout_secs() -> u64 {
    5
}
