//! Session manager owning the single WebSocket session to the hub.
//!
//! [`SessionManager::run`] connects, announces readiness, feeds inbound
//! messages to a [`MessageHandler`] and reconnects after a fixed delay
//! whenever the session is lost. Outbound messages go through
//! [`SessionManager::send`], which never blocks on the socket.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use hmip_protocol::Message;
use hmip_protocol::messages;

use crate::SEND_BUFFER_SIZE;
use crate::error::{SendError, SessionError};
use crate::handler::{MessageHandler, Outbound};
use crate::pumps::{ping::ping_pump, read::read_pump, write::write_pump};
use crate::reconnection::{RetryState, wait_before_retry};
use crate::types::{SessionConfig, SessionState};
use crate::ws_client::{self, WsError, WsStream};

/// How long teardown waits for the write pump to flush its close frame.
const WRITE_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Outbound side of one established session.
struct SessionHandle {
    id: u64,
    write_tx: mpsc::Sender<tungstenite::Message>,
    cancel: CancellationToken,
}

/// Keeps one authenticated session to the hub alive.
pub struct SessionManager {
    config: SessionConfig,
    current: RwLock<Option<Arc<SessionHandle>>>,
    state_tx: watch::Sender<SessionState>,
    cancel: CancellationToken,
    next_session: AtomicU64,
}

impl SessionManager {
    pub fn new(config: SessionConfig) -> Arc<Self> {
        let (state_tx, _) = watch::channel(SessionState::Disconnected);
        Arc::new(Self {
            config,
            current: RwLock::new(None),
            state_tx,
            cancel: CancellationToken::new(),
            next_session: AtomicU64::new(1),
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        *self.state_tx.borrow()
    }

    /// Watches lifecycle transitions.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    /// Returns `true` once the readiness announcement went out on the
    /// current session.
    pub fn is_connected(&self) -> bool {
        self.state() == SessionState::Connected
    }

    /// Stops the session loop and closes the current session.
    pub fn shutdown(&self) {
        info!("hub session shutdown requested");
        self.cancel.cancel();
    }

    /// Token cancelled by [`shutdown`](Self::shutdown).
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Queues `msg` on the current session.
    ///
    /// Fails with [`SendError::NotConnected`] when there is no session. A
    /// full or closed outbound queue tears the session down and reports
    /// [`SendError::Transport`]; the run loop then reconnects.
    pub fn send(&self, msg: Message) -> Result<(), SendError> {
        let Some(handle) = self.current_handle() else {
            return Err(SendError::NotConnected);
        };

        trace!(msg_type = %msg.msg_type, id = %msg.id, "sending message");
        let frame = tungstenite::Message::Text(msg.encode().into());
        match handle.write_tx.try_send(frame) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                warn!(session = handle.id, "outbound queue full, dropping session");
                handle.cancel.cancel();
                Err(SendError::Transport("outbound queue full".into()))
            }
            Err(TrySendError::Closed(_)) => {
                handle.cancel.cancel();
                Err(SendError::Transport("session closed".into()))
            }
        }
    }

    /// Runs the connect/receive/reconnect loop until shutdown.
    ///
    /// Returns `Ok(())` after [`shutdown`](Self::shutdown) and
    /// [`SessionError::RetriesExhausted`] when a retry cap is configured and
    /// reached.
    pub async fn run<H: MessageHandler>(&self, handler: Arc<H>) -> Result<(), SessionError> {
        let mut retry = RetryState::new(self.config.reconnect.clone());
        info!(url = %self.config.url, "starting hub session loop");

        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            let attempt = retry.next_attempt();
            self.set_state(SessionState::Connecting { attempt });
            let connected = tokio::select! {
                _ = self.cancel.cancelled() => break,
                result = ws_client::connect(&self.config) => result,
            };

            match connected {
                Ok(stream) => {
                    retry.reset();
                    info!(url = %self.config.url, "connected to hub");
                    match self.drive_session(stream, handler.as_ref()).await {
                        Ok(()) => debug!("hub session cancelled"),
                        Err(e) => warn!(error = %e, "hub session lost"),
                    }
                }
                Err(e) => {
                    retry.record_failure();
                    warn!(attempt, error = %e, "connection attempt failed");
                }
            }

            self.set_state(SessionState::Disconnected);
            if self.cancel.is_cancelled() {
                break;
            }
            if retry.exhausted() {
                let attempts = retry.failures();
                error!(attempts, "giving up on hub connection");
                return Err(SessionError::RetriesExhausted { attempts });
            }

            let delay = retry.delay();
            info!(delay_secs = delay.as_secs_f64(), "reconnecting to hub");
            if !wait_before_retry(delay, &self.cancel).await {
                break;
            }
        }

        self.set_state(SessionState::Disconnected);
        info!("hub session loop stopped");
        Ok(())
    }

    /// Owns one established socket until it ends.
    async fn drive_session<H>(&self, stream: WsStream, handler: &H) -> Result<(), WsError>
    where
        H: MessageHandler + ?Sized,
    {
        let (write, read) = stream.split();
        let (write_tx, write_rx) = mpsc::channel(SEND_BUFFER_SIZE);
        let session_cancel = self.cancel.child_token();

        let mut write_task = tokio::spawn(write_pump(write, write_rx, session_cancel.clone()));
        let ping_task = self
            .config
            .keepalive
            .map(|period| tokio::spawn(ping_pump(write_tx.clone(), period, session_cancel.clone())));

        let id = self.next_session.fetch_add(1, Ordering::Relaxed);
        self.install(Arc::new(SessionHandle {
            id,
            write_tx: write_tx.clone(),
            cancel: session_cancel.clone(),
        }));
        self.set_state(SessionState::Handshaking);

        let result = self
            .announce_and_read(read, handler, &write_tx, &session_cancel)
            .await;

        session_cancel.cancel();
        self.release(id);
        drop(write_tx);
        if let Some(ping) = ping_task {
            ping.abort();
        }
        if tokio::time::timeout(WRITE_DRAIN_TIMEOUT, &mut write_task)
            .await
            .is_err()
        {
            write_task.abort();
        }
        debug!(session = id, "session torn down");
        result
    }

    async fn announce_and_read<S, H>(
        &self,
        read: S,
        handler: &H,
        write_tx: &mpsc::Sender<tungstenite::Message>,
        session_cancel: &CancellationToken,
    ) -> Result<(), WsError>
    where
        S: StreamExt<Item = Result<tungstenite::Message, tungstenite::Error>> + Unpin,
        H: MessageHandler + ?Sized,
    {
        let ready = messages::plugin_ready(&self.config.plugin_id, &self.config.friendly_name)?;
        self.send(ready)?;
        info!(plugin_id = %self.config.plugin_id, "plugin readiness announced");
        self.set_state(SessionState::Connected);

        handler.on_connected().await;
        read_pump(read, handler, write_tx, self.config.read_timeout, session_cancel).await
    }

    fn current_handle(&self) -> Option<Arc<SessionHandle>> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn install(&self, handle: Arc<SessionHandle>) {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Some(handle);
    }

    /// Clears the current handle if it still belongs to session `id`.
    fn release(&self, id: u64) {
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        if current.as_ref().is_some_and(|h| h.id == id) {
            *current = None;
        }
    }

    fn set_state(&self, state: SessionState) {
        let previous = self.state_tx.send_replace(state);
        if previous != state {
            debug!(from = previous.label(), to = state.label(), "session state changed");
        }
    }
}

impl Outbound for SessionManager {
    fn send(&self, msg: Message) -> Result<(), SendError> {
        SessionManager::send(self, msg)
    }

    fn is_connected(&self) -> bool {
        SessionManager::is_connected(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hmip_protocol::MessageType;

    use crate::handler::HandlerFuture;
    use crate::types::ReconnectConfig;

    struct Ignore;

    impl MessageHandler for Ignore {
        fn on_message(&self, _msg: Message) -> HandlerFuture<'_> {
            Box::pin(async {})
        }
    }

    fn manager() -> Arc<SessionManager> {
        SessionManager::new(SessionConfig::for_hub("127.0.0.1", "tok", "plugin", "Bridge"))
    }

    #[test]
    fn starts_disconnected() {
        let mgr = manager();
        assert_eq!(mgr.state(), SessionState::Disconnected);
        assert!(!mgr.is_connected());
    }

    #[test]
    fn send_without_session_is_not_connected() {
        let mgr = manager();
        let msg = Message::new("plugin", MessageType::SystemRequest, Default::default());
        assert_eq!(mgr.send(msg), Err(SendError::NotConnected));
    }

    #[test]
    fn full_queue_tears_session_down() {
        let mgr = manager();
        let (tx, _rx) = mpsc::channel(1);
        let cancel = CancellationToken::new();
        mgr.install(Arc::new(SessionHandle {
            id: 7,
            write_tx: tx,
            cancel: cancel.clone(),
        }));

        let msg = || Message::new("plugin", MessageType::SystemRequest, Default::default());
        assert_eq!(mgr.send(msg()), Ok(()));
        assert!(matches!(mgr.send(msg()), Err(SendError::Transport(_))));
        assert!(cancel.is_cancelled());
    }

    #[test]
    fn release_ignores_stale_session() {
        let mgr = manager();
        let (tx, _rx) = mpsc::channel(1);
        mgr.install(Arc::new(SessionHandle {
            id: 2,
            write_tx: tx,
            cancel: CancellationToken::new(),
        }));

        mgr.release(1);
        assert!(mgr.current_handle().is_some());
        mgr.release(2);
        assert!(mgr.current_handle().is_none());
    }

    #[tokio::test]
    async fn shutdown_before_run_returns_immediately() {
        let mgr = manager();
        mgr.shutdown();
        let result = tokio::time::timeout(Duration::from_secs(2), mgr.run(Arc::new(Ignore))).await;
        assert!(matches!(result, Ok(Ok(()))));
        assert_eq!(mgr.state(), SessionState::Disconnected);
    }

    #[tokio::test]
    async fn state_transitions_are_observable() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let mut config = SessionConfig::for_hub("127.0.0.1", "tok", "plugin", "Bridge");
        config.url = format!("ws://{addr}");
        config.reconnect = ReconnectConfig {
            delay: Duration::from_millis(10),
            max_attempts: Some(1),
        };
        let mgr = SessionManager::new(config);
        let mut states = mgr.subscribe();

        let result = mgr.run(Arc::new(Ignore)).await;
        assert!(matches!(
            result,
            Err(SessionError::RetriesExhausted { attempts: 1 })
        ));
        assert!(states.has_changed().unwrap());
        assert_eq!(*states.borrow_and_update(), SessionState::Disconnected);
    }
}
