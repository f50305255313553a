//! Live channel: one supervised WebSocket connection to the server.
//!
//! The supervisor task owns the socket. It announces the session user in the
//! handshake query, asks for the online set as soon as the socket is up, and
//! reconnects with capped exponential backoff when the connection drops.
//! Events queued while disconnected are dropped: every message they could
//! carry has already been persisted and is recovered through history.

use std::time::Duration;

use futures::{Sink, SinkExt, StreamExt};
use reqwest::Url;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::Message as WsMessage;
use tracing::{debug, info, warn};

use alumnet_shared::constants::{USER_ID_QUERY_PARAM, WS_PATH};
use alumnet_shared::message::Message;
use alumnet_shared::protocol::{ClientEvent, ServerEvent, WireMessage};
use alumnet_shared::types::UserId;

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};

/// What the supervisor reports to the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LiveEvent {
    Connected,
    Disconnected,
    Server(ServerEvent),
}

/// Cloneable handle for queueing client events on the live channel.
#[derive(Debug, Clone)]
pub struct LiveSender {
    tx: mpsc::UnboundedSender<ClientEvent>,
}

impl LiveSender {
    /// A sender and the receiving end the supervisor drains.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ClientEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Ask the server to relay an already-persisted message to its receiver.
    pub fn push_message(&self, message: &Message) -> Result<()> {
        self.send(ClientEvent::PushMessage(WireMessage::from(message)))
    }

    pub fn request_online_set(&self) -> Result<()> {
        self.send(ClientEvent::RequestOnlineSet)
    }

    fn send(&self, event: ClientEvent) -> Result<()> {
        self.tx.send(event).map_err(|_| ClientError::ChannelClosed)
    }
}

/// Capped exponential backoff.
#[derive(Debug, Clone)]
pub struct Backoff {
    min: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(min: Duration, max: Duration) -> Self {
        Self {
            min,
            max: max.max(min),
            current: min,
        }
    }

    /// The delay to wait now; doubles the following one up to the cap.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(self.max);
        delay
    }

    pub fn reset(&mut self) {
        self.current = self.min;
    }
}

/// WebSocket URL for `user` on the server at `server_url`.
pub fn live_url(server_url: &str, user: &UserId) -> Result<Url> {
    let mut url = Url::parse(server_url)
        .map_err(|e| ClientError::InvalidUrl(format!("{server_url}: {e}")))?;

    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(ClientError::InvalidUrl(format!(
                "{server_url}: unsupported scheme {other}"
            )))
        }
    };
    url.set_scheme(scheme)
        .map_err(|_| ClientError::InvalidUrl(server_url.to_string()))?;
    url.set_path(WS_PATH);
    url.query_pairs_mut()
        .clear()
        .append_pair(USER_ID_QUERY_PARAM, user.as_str());
    Ok(url)
}

/// Start the supervisor for `user`.
///
/// Dropping every [`LiveSender`] closes the socket and ends the task.
pub fn spawn(
    config: &ClientConfig,
    user: &UserId,
) -> Result<(LiveSender, mpsc::UnboundedReceiver<LiveEvent>, JoinHandle<()>)> {
    let url = live_url(&config.server_url, user)?;
    let backoff = Backoff::new(config.reconnect_min, config.reconnect_max);
    let (sender, outgoing) = LiveSender::channel();
    let (events_tx, events_rx) = mpsc::unbounded_channel();

    let handle = tokio::spawn(supervise(url, outgoing, events_tx, backoff));
    Ok((sender, events_rx, handle))
}

#[derive(Debug, PartialEq, Eq)]
enum Exit {
    Lost,
    Shutdown,
}

async fn supervise(
    url: Url,
    mut outgoing: mpsc::UnboundedReceiver<ClientEvent>,
    events: mpsc::UnboundedSender<LiveEvent>,
    mut backoff: Backoff,
) {
    loop {
        match tokio_tungstenite::connect_async(url.as_str()).await {
            Ok((stream, _response)) => {
                backoff.reset();
                info!(url = %url, "live channel connected");
                if events.send(LiveEvent::Connected).is_err() {
                    return;
                }

                let (mut write, mut read) = stream.split();

                let exit = match send_event(&mut write, &ClientEvent::RequestOnlineSet).await {
                    Err(e) => {
                        warn!(error = %e, "failed to request online set");
                        Exit::Lost
                    }
                    Ok(()) => loop {
                        tokio::select! {
                            frame = read.next() => match frame {
                                Some(Ok(WsMessage::Text(text))) => match ServerEvent::from_json(&text) {
                                    Ok(event) => {
                                        if events.send(LiveEvent::Server(event)).is_err() {
                                            break Exit::Shutdown;
                                        }
                                    }
                                    Err(e) => warn!(error = %e, "undecodable server frame"),
                                },
                                Some(Ok(WsMessage::Close(_))) | None => break Exit::Lost,
                                Some(Ok(_)) => {}
                                Some(Err(e)) => {
                                    warn!(error = %e, "live channel error");
                                    break Exit::Lost;
                                }
                            },
                            command = outgoing.recv() => match command {
                                Some(event) => {
                                    if let Err(e) = send_event(&mut write, &event).await {
                                        warn!(error = %e, "live send failed");
                                        break Exit::Lost;
                                    }
                                }
                                None => {
                                    let _ = write.close().await;
                                    break Exit::Shutdown;
                                }
                            },
                        }
                    },
                };

                if exit == Exit::Shutdown || events.send(LiveEvent::Disconnected).is_err() {
                    info!("live channel closed");
                    return;
                }
            }
            Err(e) => {
                warn!(url = %url, error = %e, "live channel connection failed");
            }
        }

        let delay = backoff.next_delay();
        debug!(delay_ms = delay.as_millis() as u64, "reconnecting live channel");
        if !wait_for_retry(delay, &mut outgoing).await || events.is_closed() {
            return;
        }
    }
}

/// Sleep for `delay`, discarding events queued in the meantime. Returns
/// `false` once every sender is gone.
async fn wait_for_retry(delay: Duration, outgoing: &mut mpsc::UnboundedReceiver<ClientEvent>) -> bool {
    let sleep = tokio::time::sleep(delay);
    tokio::pin!(sleep);

    loop {
        tokio::select! {
            _ = &mut sleep => return true,
            command = outgoing.recv() => match command {
                Some(event) => debug!(?event, "live channel down, dropping event"),
                None => return false,
            },
        }
    }
}

async fn send_event<S>(sink: &mut S, event: &ClientEvent) -> Result<()>
where
    S: Sink<WsMessage, Error = tokio_tungstenite::tungstenite::Error> + Unpin,
{
    let json = event.to_json()?;
    sink.send(WsMessage::Text(json)).await?;
    Ok(())
}
