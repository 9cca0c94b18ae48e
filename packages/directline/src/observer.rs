use tokio::sync::mpsc;

use crate::types::Activity;

/// Receives session lifecycle and message notifications.
///
/// All calls for one `start` come from a single task, in transport order.
/// Calls from different starts are not ordered against each other.
pub trait SessionObserver: Send + Sync {
    /// The activity stream is open; `send` reaches the bot.
    fn on_started(&self);

    /// The activity stream closed, whether we or the service ended it.
    ///
    /// Not called when the stream never opened. After `Session::stop` this
    /// arrives once the close handshake ends, which may be after `on_started`
    /// of a `start` issued in the meantime.
    fn on_closed(&self);

    /// The bot sent an activity.
    fn on_message_received(&self, activity: &Activity);

    /// Something failed asynchronously.
    fn on_error_received(&self, error: &str);
}

/// Notifications as values, for consumers that prefer a channel.
#[derive(Clone, Debug, PartialEq)]
pub enum SessionEvent {
    Started,
    Closed,
    Message(Activity),
    Error(String),
}

/// Observer that forwards every notification into an unbounded channel.
#[derive(Clone, Debug)]
pub struct ChannelObserver {
    tx: mpsc::UnboundedSender<SessionEvent>,
}

impl ChannelObserver {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn forward(&self, event: SessionEvent) {
        let _ = self.tx.send(event);
    }
}

impl SessionObserver for ChannelObserver {
    fn on_started(&self) {
        self.forward(SessionEvent::Started);
    }

    fn on_closed(&self) {
        self.forward(SessionEvent::Closed);
    }

    fn on_message_received(&self, activity: &Activity) {
        self.forward(SessionEvent::Message(activity.clone()));
    }

    fn on_error_received(&self, error: &str) {
        self.forward(SessionEvent::Error(error.to_string()));
    }
}
