use anp_core::{decode_event, encode_command, InboundEvent, OutboundCommand};
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};
use url::Url;

#[derive(Clone, Debug)]
pub struct StreamConfig {
    pub url: Url,
    pub reconnect_delay: Duration,
    pub max_frame_bytes: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Connected,
    Disconnected { reason: String, retry_in: Duration },
    Event(InboundEvent),
}

/// Owns the single launcher connection. Decoded events go to `tx` in arrival
/// order; `command_rx` is only read while a socket is open. Returns when the
/// consumer drops its receiver.
pub async fn event_stream_loop(
    config: StreamConfig,
    tx: mpsc::Sender<StreamEvent>,
    mut command_rx: mpsc::Receiver<OutboundCommand>,
) {
    let mut commands_open = true;
    loop {
        if tx.is_closed() {
            return;
        }
        let reason = match connect_async(config.url.as_str()).await {
            Ok((ws, _)) => {
                let stale = drain_stale_commands(&mut command_rx);
                if stale > 0 {
                    warn!(
                        event = "stream_stale_commands_dropped",
                        count = stale,
                        "dropping commands queued before connect"
                    );
                }
                info!(event = "stream_connected", url = %config.url);
                if tx.send(StreamEvent::Connected).await.is_err() {
                    return;
                }
                match run_session(&config, ws, &tx, &mut command_rx, &mut commands_open).await {
                    Some(reason) => reason,
                    None => return,
                }
            }
            Err(err) => {
                warn!(event = "stream_connect_error", url = %config.url, error = %err);
                err.to_string()
            }
        };
        let disconnected = StreamEvent::Disconnected {
            reason,
            retry_in: config.reconnect_delay,
        };
        if tx.send(disconnected).await.is_err() {
            return;
        }
        tokio::select! {
            _ = tokio::time::sleep(config.reconnect_delay) => {}
            _ = tx.closed() => return,
        }
    }
}

/// Pumps one open socket. `Some(reason)` means the socket went away and the
/// caller should retry; `None` means the consumer is gone.
async fn run_session<S>(
    config: &StreamConfig,
    ws: S,
    tx: &mpsc::Sender<StreamEvent>,
    command_rx: &mut mpsc::Receiver<OutboundCommand>,
    commands_open: &mut bool,
) -> Option<String>
where
    S: futures_util::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>>
        + futures_util::Sink<Message, Error = tokio_tungstenite::tungstenite::Error>
        + Unpin,
{
    let (mut sink, mut stream) = ws.split();
    let reason = loop {
        tokio::select! {
            frame = stream.next() => {
                let text = match frame {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                        Ok(text) => text,
                        Err(_) => {
                            warn!(event = "stream_frame_skipped", reason = "binary_not_utf8");
                            continue;
                        }
                    },
                    Some(Ok(Message::Close(_))) => break "closed by launcher".to_string(),
                    Some(Ok(_)) => continue,
                    Some(Err(err)) => break err.to_string(),
                    None => break "stream ended".to_string(),
                };
                match decode_event(&text, config.max_frame_bytes) {
                    Ok(InboundEvent::Unrecognized { kind }) => {
                        debug!(event = "stream_event_unrecognized", kind = %kind);
                    }
                    Ok(event) => {
                        if tx.send(StreamEvent::Event(event)).await.is_err() {
                            return None;
                        }
                    }
                    Err(err) => {
                        warn!(event = "stream_frame_decode_error", error = %err);
                    }
                }
            }
            command = command_rx.recv(), if *commands_open => {
                let Some(command) = command else {
                    *commands_open = false;
                    continue;
                };
                let kind = command.kind();
                match encode_command(&command, config.max_frame_bytes) {
                    Ok(text) => {
                        if let Err(err) = sink.send(Message::Text(text)).await {
                            warn!(event = "stream_command_send_error", kind, error = %err);
                            break err.to_string();
                        }
                        debug!(event = "stream_command_sent", kind);
                    }
                    Err(err) => {
                        warn!(event = "stream_command_encode_error", kind, error = %err);
                    }
                }
            }
            _ = tx.closed() => return None,
        }
    };
    let _ = sink.close().await;
    info!(event = "stream_disconnected", reason = %reason);
    Some(reason)
}

fn drain_stale_commands(command_rx: &mut mpsc::Receiver<OutboundCommand>) -> usize {
    let mut dropped = 0;
    while command_rx.try_recv().is_ok() {
        dropped += 1;
    }
    dropped
}
