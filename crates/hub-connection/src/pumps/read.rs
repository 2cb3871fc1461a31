//! WebSocket read pump: decodes frames and hands them to the handler.

use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use hmip_protocol::Message;

use crate::handler::MessageHandler;
use crate::ws_client::WsError;

/// Idle deadline armed when no read timeout is configured; the select
/// branch is disabled in that case so the value is never observed.
const UNUSED_DEADLINE: Duration = Duration::from_secs(3600);

/// Reads frames until the session ends.
///
/// Returns `Ok(())` when the session was cancelled locally and an error for
/// every other way the socket can end. Undecodable frames are logged and
/// skipped without ending the session.
pub(crate) async fn read_pump<S, H>(
    mut read: S,
    handler: &H,
    write_tx: &mpsc::Sender<tungstenite::Message>,
    read_timeout: Option<Duration>,
    cancel: &CancellationToken,
) -> Result<(), WsError>
where
    S: StreamExt<Item = Result<tungstenite::Message, tungstenite::Error>> + Unpin,
    H: MessageHandler + ?Sized,
{
    let idle = tokio::time::sleep(read_timeout.unwrap_or(UNUSED_DEADLINE));
    tokio::pin!(idle);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return Ok(()),

            () = &mut idle, if read_timeout.is_some() => {
                warn!("no traffic from hub within read timeout");
                return Err(WsError::Timeout);
            }

            frame = read.next() => {
                let frame = match frame {
                    Some(Ok(frame)) => frame,
                    Some(Err(e)) => return Err(e.into()),
                    None => {
                        debug!("hub stream ended");
                        return Err(WsError::Closed);
                    }
                };

                if let Some(timeout) = read_timeout {
                    idle.as_mut().reset(tokio::time::Instant::now() + timeout);
                }

                match frame {
                    tungstenite::Message::Text(text) => {
                        dispatch(text.as_bytes(), handler).await;
                    }
                    tungstenite::Message::Binary(data) => {
                        dispatch(&data, handler).await;
                    }
                    tungstenite::Message::Ping(data) => {
                        trace!("ping from hub");
                        let _ = write_tx.send(tungstenite::Message::Pong(data)).await;
                    }
                    tungstenite::Message::Pong(_) => trace!("pong from hub"),
                    tungstenite::Message::Close(frame) => {
                        debug!(?frame, "hub closed the session");
                        return Err(WsError::Closed);
                    }
                    tungstenite::Message::Frame(_) => {}
                }
            }
        }
    }
}

async fn dispatch<H: MessageHandler + ?Sized>(bytes: &[u8], handler: &H) {
    match Message::decode(bytes) {
        Ok(msg) => {
            trace!(msg_type = %msg.msg_type, id = %msg.id, "received message");
            handler.on_message(msg).await;
        }
        Err(e) => warn!(len = bytes.len(), "dropping undecodable frame: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use futures_util::stream;
    use hmip_protocol::MessageType;

    use crate::handler::HandlerFuture;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<Message>>,
    }

    impl MessageHandler for Recorder {
        fn on_message(&self, msg: Message) -> HandlerFuture<'_> {
            self.seen.lock().unwrap().push(msg);
            Box::pin(async {})
        }
    }

    fn text(s: &str) -> Result<tungstenite::Message, tungstenite::Error> {
        Ok(tungstenite::Message::Text(s.to_string().into()))
    }

    #[tokio::test]
    async fn skips_malformed_frames_and_delivers_the_rest() {
        let frames = stream::iter(vec![
            text("{not json"),
            text(r#"{"pluginId":"x","type":"PLUGIN_STATE_REQUEST","id":"r1"}"#),
            text(r#"{"id":"no-type"}"#),
        ]);
        let handler = Recorder::default();
        let (tx, _rx) = mpsc::channel(4);
        let cancel = CancellationToken::new();

        let result = read_pump(frames, &handler, &tx, None, &cancel).await;
        assert!(matches!(result, Err(WsError::Closed)));

        let seen = handler.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].id, "r1");
        assert_eq!(seen[0].msg_type, MessageType::PluginStateRequest);
    }

    #[tokio::test]
    async fn binary_frames_are_decoded_too() {
        let body = br#"{"type":"HMIP_SYSTEM_RESPONSE","id":"b1","body":{}}"#.to_vec();
        let frames = stream::iter(vec![Ok(tungstenite::Message::Binary(body.into()))]);
        let handler = Recorder::default();
        let (tx, _rx) = mpsc::channel(4);

        let _ = read_pump(frames, &handler, &tx, None, &CancellationToken::new()).await;
        assert_eq!(handler.seen.lock().unwrap()[0].id, "b1");
    }

    #[tokio::test]
    async fn answers_ping_with_pong() {
        let frames = stream::iter(vec![Ok(tungstenite::Message::Ping(b"hi".to_vec().into()))]);
        let handler = Recorder::default();
        let (tx, mut rx) = mpsc::channel(4);

        let _ = read_pump(frames, &handler, &tx, None, &CancellationToken::new()).await;
        match rx.recv().await {
            Some(tungstenite::Message::Pong(data)) => assert_eq!(&data[..], b"hi"),
            other => panic!("expected pong, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn close_frame_ends_session() {
        let frames = stream::iter(vec![
            Ok(tungstenite::Message::Close(None)),
            text(r#"{"type":"PLUGIN_STATE_REQUEST"}"#),
        ]);
        let handler = Recorder::default();
        let (tx, _rx) = mpsc::channel(4);

        let result = read_pump(frames, &handler, &tx, None, &CancellationToken::new()).await;
        assert!(matches!(result, Err(WsError::Closed)));
        assert!(handler.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn cancel_returns_ok() {
        let frames = stream::pending::<Result<tungstenite::Message, tungstenite::Error>>();
        let handler = Recorder::default();
        let (tx, _rx) = mpsc::channel(4);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = read_pump(frames, &handler, &tx, None, &cancel).await;
        assert!(result.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn silence_without_read_timeout_keeps_session() {
        let frames = stream::pending::<Result<tungstenite::Message, tungstenite::Error>>();
        let handler = Recorder::default();
        let (tx, _rx) = mpsc::channel(4);
        let cancel = CancellationToken::new();

        let pump = read_pump(frames, &handler, &tx, None, &cancel);
        let outcome = tokio::time::timeout(Duration::from_secs(24 * 3600), pump).await;
        assert!(outcome.is_err(), "pump should still be running");
    }

    #[tokio::test(start_paused = true)]
    async fn silence_past_read_timeout_ends_session() {
        let frames = stream::pending::<Result<tungstenite::Message, tungstenite::Error>>();
        let handler = Recorder::default();
        let (tx, _rx) = mpsc::channel(4);

        let result = read_pump(
            frames,
            &handler,
            &tx,
            Some(Duration::from_secs(60)),
            &CancellationToken::new(),
        )
        .await;
        assert!(matches!(result, Err(WsError::Timeout)));
    }

    #[tokio::test(start_paused = true)]
    async fn traffic_resets_read_timeout() {
        let timeout = Duration::from_secs(60);
        let late = stream::once(async move {
            tokio::time::sleep(timeout - Duration::from_secs(1)).await;
            text(r#"{"type":"PLUGIN_STATE_REQUEST","id":"late"}"#)
        });
        let frames = Box::pin(late.chain(stream::pending()));
        let handler = Recorder::default();
        let (tx, _rx) = mpsc::channel(4);

        let started = tokio::time::Instant::now();
        let result = read_pump(frames, &handler, &tx, Some(timeout), &CancellationToken::new()).await;

        assert!(matches!(result, Err(WsError::Timeout)));
        assert!(started.elapsed() >= timeout * 2 - Duration::from_secs(1));
        assert_eq!(handler.seen.lock().unwrap()[0].id, "late");
    }
}
