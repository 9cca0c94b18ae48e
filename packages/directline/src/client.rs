use reqwest::{Response, Url};
use std::time::Duration;
use tracing::debug;

use crate::error::ClientError;
use crate::types::{OutboundActivity, ResourceResponse, StartConversation};

/// Outcome of a successful negotiation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NegotiationResult {
    pub stream_url: Url,
    pub conversation_id: String,
}

impl TryFrom<StartConversation> for NegotiationResult {
    type Error = ClientError;

    fn try_from(body: StartConversation) -> Result<Self, Self::Error> {
        let conversation_id = body
            .conversation_id
            .filter(|id| !id.is_empty())
            .ok_or(ClientError::Incomplete("conversationId"))?;
        let stream_url = body
            .stream_url
            .filter(|url| !url.is_empty())
            .ok_or(ClientError::Incomplete("streamUrl"))?;
        let stream_url = Url::parse(&stream_url)
            .map_err(|e| ClientError::Endpoint(format!("{stream_url}: {e}")))?;
        Ok(Self {
            stream_url,
            conversation_id,
        })
    }
}

/// Request/response half of the Direct Line protocol.
#[derive(Clone, Debug)]
pub struct DirectLineClient {
    http: reqwest::Client,
    endpoint: Url,
}

impl DirectLineClient {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, ClientError> {
        let parsed =
            Url::parse(endpoint).map_err(|e| ClientError::Endpoint(format!("{endpoint}: {e}")))?;
        if parsed.cannot_be_a_base() {
            return Err(ClientError::Endpoint(format!(
                "{endpoint}: cannot carry a path"
            )));
        }
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            endpoint: parsed,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Start a conversation and learn where its activity stream lives.
    pub async fn negotiate(&self, secret: &str) -> Result<NegotiationResult, ClientError> {
        let url = self.url(&["conversations"])?;
        debug!(%url, "starting conversation");
        let response = self
            .http
            .post(url)
            .bearer_auth(secret)
            .body("")
            .send()
            .await?;
        let body: StartConversation = ensure_success(response).await?.json().await?;
        NegotiationResult::try_from(body)
    }

    /// Post one activity to a conversation. Returns the id the service assigned to it.
    pub async fn send_message(
        &self,
        activity: &OutboundActivity,
        conversation_id: &str,
        secret: &str,
    ) -> Result<String, ClientError> {
        let url = self.url(&["conversations", conversation_id, "activities"])?;
        let response = self
            .http
            .post(url)
            .bearer_auth(secret)
            .json(activity)
            .send()
            .await?;
        let ack: ResourceResponse = ensure_success(response).await?.json().await?;
        Ok(ack.id)
    }

    fn url(&self, segments: &[&str]) -> Result<Url, ClientError> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| ClientError::Endpoint(self.endpoint.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

async fn ensure_success(response: Response) -> Result<Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<unable to read body>".into());
    Err(ClientError::Status { status, body })
}
