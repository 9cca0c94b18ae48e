//! Supervision of the websocket that carries the bot's activities.
//!
//! A [`StreamSupervisor`] owns one connection from dial to close and reports
//! what happens on it as [`StreamEvent`]s. It never touches session state or
//! observers directly; the session decides what each event means.

use futures::{SinkExt, StreamExt};
use reqwest::Url;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use crate::config::BatchDispatch;
use crate::error::StreamError;
use crate::types::{Activity, ActivitySet};

/// Lifecycle of one streaming connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamState {
    Idle,
    Connecting,
    Open,
    Closed,
}

/// What the supervisor observed on the connection.
#[derive(Clone, Debug, PartialEq)]
pub enum StreamEvent {
    /// The handshake completed.
    Opened,
    /// A watermarked frame carried this activity.
    Activity(Activity),
    /// The connection is gone. `remote` is false when we asked for the close.
    Closed { remote: bool },
    /// The handshake failed. The connection never opened and no `Closed` follows.
    ConnectFailed(String),
    /// A transport or decode failure, as a diagnostic string.
    Error(String),
}

/// Owner-side handle. Dropping it closes the connection.
#[derive(Debug)]
pub struct StreamHandle {
    close_tx: Option<oneshot::Sender<()>>,
    state: watch::Receiver<StreamState>,
}

impl StreamHandle {
    /// Ask the supervisor to close the connection. Idempotent.
    pub fn close(&mut self) {
        if let Some(tx) = self.close_tx.take() {
            let _ = tx.send(());
        }
    }

    pub fn state(&self) -> StreamState {
        *self.state.borrow()
    }

    /// A receiver that follows state transitions.
    pub fn watch(&self) -> watch::Receiver<StreamState> {
        self.state.clone()
    }
}

impl Drop for StreamHandle {
    fn drop(&mut self) {
        self.close();
    }
}

pub struct StreamSupervisor {
    url: Url,
    dispatch: BatchDispatch,
    close_timeout: Duration,
    debug: Arc<AtomicBool>,
}

impl StreamSupervisor {
    pub fn new(
        url: Url,
        dispatch: BatchDispatch,
        close_timeout: Duration,
        debug: Arc<AtomicBool>,
    ) -> Self {
        Self {
            url,
            dispatch,
            close_timeout,
            debug,
        }
    }

    /// Dial the stream on a background task.
    pub fn spawn(self) -> (StreamHandle, mpsc::UnboundedReceiver<StreamEvent>) {
        let (close_tx, close_rx) = oneshot::channel();
        let (state_tx, state_rx) = watch::channel(StreamState::Idle);
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        state_tx.send_replace(StreamState::Connecting);
        tokio::spawn(self.run(close_rx, state_tx, event_tx));

        let handle = StreamHandle {
            close_tx: Some(close_tx),
            state: state_rx,
        };
        (handle, event_rx)
    }

    fn verbose(&self) -> bool {
        self.debug.load(Ordering::Relaxed)
    }

    async fn run(
        self,
        mut close_rx: oneshot::Receiver<()>,
        state: watch::Sender<StreamState>,
        events: mpsc::UnboundedSender<StreamEvent>,
    ) {
        if self.verbose() {
            debug!(url = %self.url, "opening stream");
        }

        let connect = tokio_tungstenite::connect_async(self.url.as_str());
        let ws = tokio::select! {
            _ = &mut close_rx => {
                debug!("stream closed before the handshake finished");
                state.send_replace(StreamState::Closed);
                return;
            }
            result = connect => match result {
                Ok((ws, _)) => ws,
                Err(e) => {
                    let err = StreamError::Connect(e);
                    warn!(error = %err, "stream connect failed");
                    state.send_replace(StreamState::Closed);
                    let _ = events.send(StreamEvent::ConnectFailed(err.to_string()));
                    return;
                }
            }
        };

        info!("stream open");
        state.send_replace(StreamState::Open);
        let _ = events.send(StreamEvent::Opened);

        let (mut ws_write, mut ws_read) = ws.split();

        let close_timer = tokio::time::sleep(Duration::ZERO);
        tokio::pin!(close_timer);
        let mut closing = false;

        loop {
            tokio::select! {
                _ = &mut close_rx, if !closing => {
                    debug!("closing stream");
                    closing = true;
                    let _ = ws_write.send(Message::Close(None)).await;
                    close_timer
                        .as_mut()
                        .reset(tokio::time::Instant::now() + self.close_timeout);
                }

                () = &mut close_timer, if closing => {
                    warn!("peer did not finish the close handshake in time");
                    break;
                }

                msg = ws_read.next() => match msg {
                    Some(Ok(Message::Text(text))) => {
                        if !closing {
                            self.handle_frame(text.as_str(), &events);
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        debug!(?frame, "close frame received");
                    }
                    // tungstenite answers pings on its own
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        if !closing {
                            let err = StreamError::Transport(e);
                            warn!(error = %err, "stream failed");
                            let _ = events.send(StreamEvent::Error(err.to_string()));
                        }
                        break;
                    }
                    None => break,
                }
            }
        }

        info!(remote = !closing, "stream closed");
        state.send_replace(StreamState::Closed);
        let _ = events.send(StreamEvent::Closed { remote: !closing });
    }

    fn handle_frame(&self, text: &str, events: &mpsc::UnboundedSender<StreamEvent>) {
        if self.verbose() {
            debug!(frame = text, "frame received");
        }
        match decode_frame(text, self.dispatch) {
            Ok(activities) => {
                for activity in activities {
                    let _ = events.send(StreamEvent::Activity(activity));
                }
            }
            Err(err) => {
                warn!(error = %err, "dropping frame");
                let _ = events.send(StreamEvent::Error(err.to_string()));
            }
        }
    }
}

/// Activities a text frame contributes. Heartbeats and unwatermarked sets yield none.
pub fn decode_frame(text: &str, dispatch: BatchDispatch) -> Result<Vec<Activity>, StreamError> {
    Ok(ActivitySet::decode(text)?.into_dispatch(dispatch))
}
