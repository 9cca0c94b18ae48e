use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::client::DirectLineClient;
use crate::types::OutboundActivity;

/// Enqueue side of a conversation's outbound queue. Dropping it ends the queue.
#[derive(Clone, Debug)]
pub struct Outbox {
    tx: mpsc::UnboundedSender<OutboundActivity>,
}

impl Outbox {
    /// Queue an activity. Returns false once the sender task is gone.
    pub fn push(&self, activity: OutboundActivity) -> bool {
        self.tx.send(activity).is_ok()
    }
}

/// Posts a conversation's outbound activities one at a time, in enqueue order.
///
/// Failures are logged and never retried.
pub struct MessageSender {
    client: DirectLineClient,
    conversation_id: String,
    secret: String,
    debug: Arc<AtomicBool>,
}

impl MessageSender {
    pub fn new(
        client: DirectLineClient,
        conversation_id: String,
        secret: String,
        debug: Arc<AtomicBool>,
    ) -> Self {
        Self {
            client,
            conversation_id,
            secret,
            debug,
        }
    }

    pub fn spawn(self) -> Outbox {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(self.run(rx));
        Outbox { tx }
    }

    async fn run(self, mut rx: mpsc::UnboundedReceiver<OutboundActivity>) {
        while let Some(activity) = rx.recv().await {
            match self
                .client
                .send_message(&activity, &self.conversation_id, &self.secret)
                .await
            {
                Ok(id) => {
                    if self.debug.load(Ordering::Relaxed) {
                        debug!(activity_id = %id, text = %activity.text, "message sent");
                    }
                }
                Err(e) => {
                    warn!(
                        conversation_id = %self.conversation_id,
                        error = %e,
                        "failed to send message"
                    );
                }
            }
        }
        debug!(conversation_id = %self.conversation_id, "outbox closed");
    }
}
