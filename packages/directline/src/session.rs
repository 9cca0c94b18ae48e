use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::client::{DirectLineClient, NegotiationResult};
use crate::config::{BatchDispatch, SessionConfig};
use crate::error::{ClientError, SessionError};
use crate::observer::SessionObserver;
use crate::sender::{MessageSender, Outbox};
use crate::stream::{StreamEvent, StreamHandle, StreamState, StreamSupervisor};
use crate::types::OutboundActivity;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    Idle,
    Negotiating,
    Streaming,
}

/// Everything that transport callbacks and caller operations both touch.
struct SessionState {
    /// Bumped by every `start` and `stop`; late results from older generations are discarded.
    generation: u64,
    phase: Phase,
    conversation_id: Option<String>,
    observer: Option<Arc<dyn SessionObserver>>,
    stream: Option<StreamHandle>,
    outbox: Option<Outbox>,
}

impl SessionState {
    fn reset(&mut self) {
        self.phase = Phase::Idle;
        self.conversation_id = None;
        self.outbox = None;
        if let Some(mut stream) = self.stream.take() {
            stream.close();
        }
    }
}

fn lock(state: &Mutex<SessionState>) -> MutexGuard<'_, SessionState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A conversation with one bot: negotiated over REST, fed over a websocket.
///
/// `start`, `send` and `stop` return immediately. Everything that happens
/// later is reported to the [`SessionObserver`] passed to `start`.
pub struct Session {
    secret: String,
    client: DirectLineClient,
    display_name: RwLock<String>,
    debug: Arc<AtomicBool>,
    dispatch: BatchDispatch,
    close_timeout: Duration,
    state: Arc<Mutex<SessionState>>,
}

impl Session {
    /// A session with default settings for the given Direct Line secret.
    pub fn new(secret: impl Into<String>) -> Result<Self, ClientError> {
        Self::with_config(SessionConfig::new(secret))
    }

    pub fn with_config(config: SessionConfig) -> Result<Self, ClientError> {
        let client = DirectLineClient::new(&config.endpoint, config.request_timeout())?;
        let close_timeout = config.close_timeout();
        Ok(Self {
            secret: config.secret,
            client,
            display_name: RwLock::new(config.display_name),
            debug: Arc::new(AtomicBool::new(config.debug)),
            dispatch: config.batch_dispatch,
            close_timeout,
            state: Arc::new(Mutex::new(SessionState {
                generation: 0,
                phase: Phase::Idle,
                conversation_id: None,
                observer: None,
                stream: None,
                outbox: None,
            })),
        })
    }

    /// Negotiate a conversation and open its stream in the background.
    ///
    /// `observer.on_started()` fires once the stream is open. A failed
    /// negotiation is reported through `on_error_received`.
    pub fn start(&self, observer: Arc<dyn SessionObserver>) -> Result<(), SessionError> {
        let runtime = Handle::try_current().map_err(|_| SessionError::NoRuntime)?;

        let generation = {
            let mut state = lock(&self.state);
            if state.phase != Phase::Idle {
                return Err(SessionError::AlreadyStarted);
            }
            state.generation += 1;
            state.phase = Phase::Negotiating;
            state.observer = Some(Arc::clone(&observer));
            state.generation
        };
        info!(generation, "starting session");

        let driver = Driver {
            generation,
            observer,
            client: self.client.clone(),
            secret: self.secret.clone(),
            dispatch: self.dispatch,
            close_timeout: self.close_timeout,
            debug: Arc::clone(&self.debug),
            state: Arc::clone(&self.state),
        };
        runtime.spawn(driver.run());
        Ok(())
    }

    /// Queue a text message for the bot.
    ///
    /// Fails only when no conversation has been negotiated. Delivery failures
    /// are logged, not returned.
    pub fn send(&self, text: impl Into<String>) -> Result<(), SessionError> {
        let activity = OutboundActivity::message(self.display_name(), text);
        let state = lock(&self.state);
        let outbox = match (&state.conversation_id, &state.outbox) {
            (Some(_), Some(outbox)) => outbox,
            _ => return Err(SessionError::NotStarted),
        };
        if self.is_debug() {
            debug!(text = %activity.text, "queueing message");
        }
        if outbox.push(activity) {
            Ok(())
        } else {
            Err(SessionError::NotStarted)
        }
    }

    /// Forget the conversation and close its stream. Safe to call repeatedly.
    ///
    /// No notification is synthesized here; `on_closed` fires when the
    /// transport reports the close, on the observer that was passed to the
    /// `start` being stopped. That can take up to the close timeout, so after
    /// an immediate restart with the same observer the old `on_closed` may
    /// arrive after the new `on_started`. Use a fresh observer per `start` to
    /// tell them apart.
    ///
    /// The registered observer is dropped; the next `start` supplies one.
    pub fn stop(&self) {
        let mut state = lock(&self.state);
        if state.phase == Phase::Idle {
            debug!("stop on an idle session");
            return;
        }
        info!(
            generation = state.generation,
            conversation_id = state.conversation_id.as_deref().unwrap_or_default(),
            "stopping session"
        );
        state.generation += 1;
        state.observer = None;
        state.reset();
    }

    pub fn conversation_id(&self) -> Option<String> {
        lock(&self.state).conversation_id.clone()
    }

    pub fn stream_state(&self) -> StreamState {
        lock(&self.state)
            .stream
            .as_ref()
            .map_or(StreamState::Idle, StreamHandle::state)
    }

    /// Replace the observer of the running session.
    pub fn set_observer(&self, observer: Arc<dyn SessionObserver>) {
        lock(&self.state).observer = Some(observer);
    }

    /// Drop the observer; notifications for the running session are discarded.
    pub fn clear_observer(&self) {
        lock(&self.state).observer = None;
    }

    pub fn display_name(&self) -> String {
        self.display_name
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Name sent as the author of subsequent messages.
    pub fn set_display_name(&self, name: impl Into<String>) {
        *self
            .display_name
            .write()
            .unwrap_or_else(PoisonError::into_inner) = name.into();
    }

    pub fn is_debug(&self) -> bool {
        self.debug.load(Ordering::Relaxed)
    }

    /// Toggle verbose protocol tracing. Has no effect on behavior.
    pub fn set_debug(&self, enabled: bool) {
        self.debug.store(enabled, Ordering::Relaxed);
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Drives one generation: negotiation, then stream events to the observer.
struct Driver {
    generation: u64,
    /// Observer registered by the `start` that spawned this driver.
    observer: Arc<dyn SessionObserver>,
    client: DirectLineClient,
    secret: String,
    dispatch: BatchDispatch,
    close_timeout: Duration,
    debug: Arc<AtomicBool>,
    state: Arc<Mutex<SessionState>>,
}

impl Driver {
    async fn run(self) {
        let negotiated = match self.client.negotiate(&self.secret).await {
            Ok(negotiated) => negotiated,
            Err(err) => {
                self.negotiation_failed(err);
                return;
            }
        };

        let Some(mut events) = self.attach(negotiated) else {
            return;
        };
        while let Some(event) = events.recv().await {
            self.deliver(event);
        }
        debug!(generation = self.generation, "session driver finished");
    }

    fn negotiation_failed(&self, err: ClientError) {
        warn!(error = %err, "conversation negotiation failed");
        let observer = {
            let mut state = lock(&self.state);
            if state.generation != self.generation {
                return;
            }
            state.reset();
            state.observer.clone()
        };
        if let Some(observer) = observer {
            observer.on_error_received(&format!("negotiation failed: {err}"));
        }
    }

    /// Record the conversation and dial its stream, unless the session was stopped meanwhile.
    fn attach(
        &self,
        negotiated: NegotiationResult,
    ) -> Option<mpsc::UnboundedReceiver<StreamEvent>> {
        let mut state = lock(&self.state);
        if state.generation != self.generation {
            debug!(
                conversation_id = %negotiated.conversation_id,
                "discarding negotiation for a stopped session"
            );
            return None;
        }

        info!(conversation_id = %negotiated.conversation_id, "conversation negotiated");
        if self.debug.load(Ordering::Relaxed) {
            debug!(stream_url = %negotiated.stream_url, "stream address");
        }

        let outbox = MessageSender::new(
            self.client.clone(),
            negotiated.conversation_id.clone(),
            self.secret.clone(),
            Arc::clone(&self.debug),
        )
        .spawn();
        let (stream, events) = StreamSupervisor::new(
            negotiated.stream_url,
            self.dispatch,
            self.close_timeout,
            Arc::clone(&self.debug),
        )
        .spawn();

        state.conversation_id = Some(negotiated.conversation_id);
        state.outbox = Some(outbox);
        state.stream = Some(stream);
        state.phase = Phase::Streaming;
        Some(events)
    }

    fn deliver(&self, event: StreamEvent) {
        let (current, observer) = {
            let mut state = lock(&self.state);
            let current = state.generation == self.generation;
            if current
                && matches!(
                    event,
                    StreamEvent::Closed { .. } | StreamEvent::ConnectFailed(_)
                )
            {
                state.reset();
            }
            // A stopped generation still owes its starter the close notification.
            let observer = if current {
                state.observer.clone()
            } else {
                Some(Arc::clone(&self.observer))
            };
            (current, observer)
        };
        let Some(observer) = observer else {
            return;
        };

        match event {
            StreamEvent::Opened if current => observer.on_started(),
            StreamEvent::Activity(activity) if current => {
                observer.on_message_received(&activity)
            }
            StreamEvent::Error(error) | StreamEvent::ConnectFailed(error) if current => {
                observer.on_error_received(&error)
            }
            StreamEvent::Closed { remote } => {
                debug!(remote, generation = self.generation, "session stream closed");
                observer.on_closed();
            }
            _ => debug!(
                generation = self.generation,
                "dropping notification for a stopped session"
            ),
        }
    }
}
