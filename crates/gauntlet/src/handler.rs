//! Per-connection handler.
//!
//! 1. Wait for `hello` and resume or create the session.
//! 2. Spawn a writer task that drains the connection's [`ClientLink`].
//! 3. Route client messages into the service until either side closes.
//! 4. Unbind the link and let the writer finish.

use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use gauntlet_protocol::{ClientMessage, Codec, Notification, ProtocolError, SessionId};
use gauntlet_session::{ClientLink, LinkReceiver, Outbound, UserHandle};
use tokio::net::TcpStream;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::{self, Message};

use crate::server::ServerState;
use crate::{AnswerOutcome, GauntletError};

const HELLO_TIMEOUT: Duration = Duration::from_secs(5);

type WsStream = WebSocketStream<TcpStream>;

pub(crate) async fn handle_connection<C: Codec>(
    stream: TcpStream,
    state: Arc<ServerState<C>>,
) -> Result<(), GauntletError> {
    let ws = tokio_tungstenite::accept_async(stream).await?;
    let (mut sink, mut frames) = ws.split();

    let hello = match tokio::time::timeout(HELLO_TIMEOUT, next_payload(&mut frames)).await {
        Ok(Some(Ok(data))) => data,
        Ok(Some(Err(e))) => return Err(e.into()),
        Ok(None) => {
            return Err(ProtocolError::InvalidMessage("closed before hello".into()).into());
        }
        Err(_) => return Err(ProtocolError::InvalidMessage("hello timed out".into()).into()),
    };

    let requested = match state.codec.decode::<ClientMessage>(&hello) {
        Ok(ClientMessage::Hello { session_id }) => session_id,
        Ok(_) | Err(_) => {
            let refusal = Notification::Error {
                code: "BAD_MESSAGE".into(),
                message: "first message must be hello".into(),
            };
            let bytes = state.codec.encode(&refusal)?;
            sink.send(text_frame(&bytes)).await?;
            let _ = sink.close().await;
            return Err(ProtocolError::InvalidMessage("first message must be hello".into()).into());
        }
    };

    let user = requested
        .and_then(|raw| state.service.resume(&SessionId::new(raw)))
        .unwrap_or_else(|| state.service.join().0);
    let session_id = user.lock().session_id().clone();

    let (link, rx) = ClientLink::channel();
    let writer = tokio::spawn(write_loop(sink, rx, Arc::clone(&state)));
    state.service.connect(&user, link.clone());

    let result = read_loop(&mut frames, &state, &user, &session_id, &link).await;

    state.service.disconnect(&user, &link);
    link.close();
    let _ = writer.await;
    result
}

async fn read_loop<C: Codec>(
    frames: &mut SplitStream<WsStream>,
    state: &ServerState<C>,
    user: &UserHandle,
    session_id: &SessionId,
    link: &ClientLink,
) -> Result<(), GauntletError> {
    let idle = state.service.config().idle_timeout();
    while !link.is_closed() {
        let data = match tokio::time::timeout(idle, next_payload(frames)).await {
            Ok(Some(Ok(data))) => data,
            Ok(Some(Err(e))) => return Err(e.into()),
            Ok(None) => {
                tracing::debug!(user_id = %user.id(), "connection closed");
                break;
            }
            Err(_) => {
                tracing::info!(user_id = %user.id(), "connection idle, dropping");
                break;
            }
        };

        let outcome = match state.codec.decode::<ClientMessage>(&data) {
            Ok(msg) => dispatch(state, user, session_id, link, msg),
            Err(e) => Err(e.into()),
        };
        if let Err(e) = outcome {
            tracing::debug!(user_id = %user.id(), error = %e, "request refused");
            let _ = link.send(Notification::Error {
                code: e.code().to_string(),
                message: e.to_string(),
            });
        }
    }
    Ok(())
}

fn dispatch<C: Codec>(
    state: &ServerState<C>,
    user: &UserHandle,
    session_id: &SessionId,
    link: &ClientLink,
    msg: ClientMessage,
) -> Result<(), GauntletError> {
    let service = &state.service;
    match msg {
        ClientMessage::Hello { .. } => {
            tracing::debug!(user_id = %user.id(), "repeated hello ignored");
        }
        ClientMessage::Ping => link.send(Notification::Pong)?,
        ClientMessage::DinoResult { cleared, score } => {
            tracing::info!(user_id = %user.id(), cleared, score, "dino run finished");
            service.finish_dino(user, cleared)?;
        }
        ClientMessage::CaptchaClick { x, y } => {
            let outcome = service.verify_captcha(user, x, y)?;
            if outcome != AnswerOutcome::Passed {
                tracing::debug!(user_id = %user.id(), ?outcome, "captcha miss");
            }
        }
        ClientMessage::OtpRequest => service.send_otp(user)?,
        ClientMessage::OtpAnswer { answer } => {
            let outcome = service.verify_otp(user, &answer)?;
            if outcome != AnswerOutcome::Passed {
                tracing::debug!(user_id = %user.id(), ?outcome, "fish name miss");
            }
        }
        ClientMessage::Register { token } => {
            service.complete_registration(user, session_id, &token)?;
        }
    }
    Ok(())
}

async fn write_loop<C: Codec>(
    mut sink: SplitSink<WsStream, Message>,
    mut rx: LinkReceiver,
    state: Arc<ServerState<C>>,
) {
    while let Some(outbound) = rx.recv().await {
        let notification = match outbound {
            Outbound::Notify(n) => n,
            Outbound::Close => break,
        };
        let bytes = match state.codec.encode(&notification) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(error = %e, "failed to encode notification");
                continue;
            }
        };
        if let Err(e) = sink.send(text_frame(&bytes)).await {
            tracing::debug!(error = %e, "write failed");
            break;
        }
    }
    let _ = sink.close().await;
}

/// Next text or binary payload. `None` on a close frame or end of stream.
async fn next_payload(
    frames: &mut SplitStream<WsStream>,
) -> Option<Result<Vec<u8>, tungstenite::Error>> {
    loop {
        match frames.next().await? {
            Ok(Message::Text(text)) => return Some(Ok(text.as_bytes().to_vec())),
            Ok(Message::Binary(data)) => return Some(Ok(data.to_vec())),
            Ok(Message::Close(_)) => return None,
            Ok(_) => continue,
            Err(e) => return Some(Err(e)),
        }
    }
}

fn text_frame(bytes: &[u8]) -> Message {
    Message::text(String::from_utf8_lossy(bytes).into_owned())
}
