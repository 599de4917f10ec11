//! Background task that owns one WebSocket connection
//!
//! The task only decodes and forwards. Every state change is applied by the
//! [`LiveChannel`](super::LiveChannel) when it drains the queue.

use super::CloseReason;
use futures_util::{SinkExt, StreamExt};
use hookscope_common::{decode_binary_frame, decode_frame, ProtocolError, RequestEvent};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{
        self,
        protocol::{frame::coding::CloseCode, CloseFrame},
        Message,
    },
};
use url::Url;

/// Queue depth between the connection task and the channel owner
const INBOUND_CAPACITY: usize = 256;

/// What the connection task reports
#[derive(Debug)]
pub(crate) enum ChannelEvent {
    Opened,
    Request(Box<RequestEvent>),
    Closed(CloseReason),
}

/// Handle to a running connection task
///
/// Dropping the handle asks the task to send a close frame and exit.
pub(crate) struct Connection {
    pub(crate) inbound: mpsc::Receiver<ChannelEvent>,
    _shutdown: oneshot::Sender<()>,
    _task: JoinHandle<()>,
}

impl Connection {
    pub(crate) fn spawn(url: Url) -> Self {
        let (tx, inbound) = mpsc::channel(INBOUND_CAPACITY);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(run(url, tx, shutdown_rx));

        Self {
            inbound,
            _shutdown: shutdown_tx,
            _task: task,
        }
    }
}

async fn run(url: Url, tx: mpsc::Sender<ChannelEvent>, mut shutdown: oneshot::Receiver<()>) {
    tracing::debug!("Connecting to {}", redact(&url));

    let connected = tokio::select! {
        result = connect_async(url.as_str()) => result,
        _ = &mut shutdown => return,
    };

    let ws_stream = match connected {
        Ok((ws_stream, _)) => ws_stream,
        Err(e) => {
            tracing::warn!("Failed to connect: {}", e);
            let _ = tx.send(ChannelEvent::Closed(handshake_failure(e))).await;
            return;
        }
    };

    if tx.send(ChannelEvent::Opened).await.is_err() {
        return;
    }

    let (mut write, mut read) = ws_stream.split();

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                let frame = CloseFrame {
                    code: CloseCode::Normal,
                    reason: "client closed".into(),
                };
                let _ = write.send(Message::Close(Some(frame))).await;
                return;
            }

            msg = read.next() => {
                let event = match msg {
                    Some(Ok(Message::Text(text))) => accept(decode_frame(text.as_str())),
                    Some(Ok(Message::Binary(data))) => accept(decode_binary_frame(&data)),
                    Some(Ok(Message::Close(frame))) => {
                        let reason = match frame {
                            Some(frame) => CloseReason::from_code(
                                Some(u16::from(frame.code)),
                                frame.reason.as_str().to_string(),
                            ),
                            None => CloseReason::from_code(None, String::new()),
                        };
                        // The close reply is queued on read; push it out before dropping
                        if let Err(e) = write.flush().await {
                            tracing::debug!("Failed to complete close handshake: {}", e);
                        }
                        let _ = tx.send(ChannelEvent::Closed(reason)).await;
                        return;
                    }
                    Some(Ok(_)) => None,
                    Some(Err(e)) => {
                        tracing::error!("WebSocket error: {}", e);
                        let _ = tx.send(ChannelEvent::Closed(CloseReason::Failed(e.to_string()))).await;
                        return;
                    }
                    None => {
                        let reason = CloseReason::Other {
                            code: None,
                            reason: "connection dropped".to_string(),
                        };
                        let _ = tx.send(ChannelEvent::Closed(reason)).await;
                        return;
                    }
                };

                if let Some(event) = event {
                    if tx.send(ChannelEvent::Request(Box::new(event))).await.is_err() {
                        return;
                    }
                }
            }
        }
    }
}

/// Malformed frames are dropped, the connection stays up
fn accept(result: Result<RequestEvent, ProtocolError>) -> Option<RequestEvent> {
    match result {
        Ok(event) => Some(event),
        Err(e) => {
            tracing::warn!("Dropping malformed frame: {}", e);
            None
        }
    }
}

/// A 401/403 on the upgrade means the token was refused
fn handshake_failure(err: tungstenite::Error) -> CloseReason {
    match err {
        tungstenite::Error::Http(response)
            if matches!(response.status().as_u16(), 401 | 403) =>
        {
            CloseReason::Unauthorized
        }
        other => CloseReason::Failed(other.to_string()),
    }
}

/// Connect URL without the token, for logs
fn redact(url: &Url) -> String {
    let mut url = url.clone();
    url.set_query(None);
    url.to_string()
}
