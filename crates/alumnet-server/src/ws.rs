//! WebSocket upgrade and per-connection event loop.

use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tracing::{debug, info, warn};

use alumnet_shared::protocol::ClientEvent;
use alumnet_shared::types::UserId;

use crate::api::AppState;
use crate::hub::Hub;

#[derive(Debug, Deserialize)]
pub struct ConnectParams {
    #[serde(rename = "userId")]
    pub user_id: Option<String>,
}

impl ConnectParams {
    fn user(self) -> Option<UserId> {
        self.user_id
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .map(UserId::from)
    }
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<ConnectParams>,
    State(state): State<AppState>,
) -> Response {
    let user = params.user();
    ws.on_upgrade(move |socket| ws_connection(socket, state.hub, user))
}

async fn ws_connection(socket: WebSocket, hub: Hub, user: Option<UserId>) {
    let (handle, mut events) = hub.open(user.clone());
    info!(conn = %handle, user = ?user.as_ref().map(UserId::as_str), "WebSocket connected");

    let (mut sink, mut stream) = socket.split();

    // Drains this connection's outbox in issue order. Ends when the hub drops
    // the outbox on close, or when the client goes away.
    let writer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            let json = match event.to_json() {
                Ok(json) => json,
                Err(e) => {
                    warn!(conn = %handle, error = %e, "failed to encode event");
                    continue;
                }
            };
            if sink.send(WsMessage::Text(json)).await.is_err() {
                break;
            }
        }
    });

    while let Some(frame) = stream.next().await {
        match frame {
            Ok(WsMessage::Text(text)) => match ClientEvent::from_json(&text) {
                Ok(event) => hub.handle_client_event(handle, user.as_ref(), event),
                Err(e) => {
                    warn!(conn = %handle, error = %e, "malformed client frame");
                    hub.reject(handle, format!("malformed event: {e}"));
                }
            },
            Ok(WsMessage::Close(_)) => break,
            // axum answers pings itself
            Ok(_) => {}
            Err(e) => {
                debug!(conn = %handle, error = %e, "WebSocket read error");
                break;
            }
        }
    }

    hub.close(handle);
    let _ = writer.await;
    info!(conn = %handle, "WebSocket disconnected");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use chrono::Utc;
    use tokio::net::TcpStream;
    use tokio::sync::Mutex;
    use tokio_tungstenite::tungstenite::Message as ClientFrame;
    use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

    use alumnet_shared::protocol::{ServerEvent, WireMessage};
    use alumnet_store::Database;

    use crate::api::build_router;
    use crate::config::ServerConfig;

    type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

    async fn start_server() -> (std::net::SocketAddr, Hub) {
        let state = AppState {
            db: Arc::new(Mutex::new(Database::open_in_memory().unwrap())),
            hub: Hub::new(),
            config: Arc::new(ServerConfig::default()),
        };
        let hub = state.hub.clone();
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, build_router(state)).await.unwrap();
        });
        (addr, hub)
    }

    async fn connect(addr: std::net::SocketAddr, user: &str) -> Client {
        let url = format!("ws://{addr}/ws?userId={user}");
        let (client, _) = tokio_tungstenite::connect_async(url).await.unwrap();
        client
    }

    async fn next_event(client: &mut Client) -> ServerEvent {
        loop {
            let frame = tokio::time::timeout(Duration::from_secs(5), client.next())
                .await
                .expect("no frame within 5s")
                .expect("socket closed")
                .unwrap();
            if let ClientFrame::Text(text) = frame {
                return ServerEvent::from_json(&text).unwrap();
            }
        }
    }

    fn online(users: &[&str]) -> ServerEvent {
        ServerEvent::OnlineSetChanged(users.iter().map(|u| UserId::from(*u)).collect())
    }

    #[tokio::test]
    async fn live_connections_over_a_real_socket() {
        let (addr, hub) = start_server().await;

        let mut alice = connect(addr, "a").await;
        assert_eq!(next_event(&mut alice).await, online(&["a"]));

        // A frame that does not decode is answered, not fatal.
        alice.send(ClientFrame::Text("{not json".into())).await.unwrap();
        assert!(matches!(next_event(&mut alice).await, ServerEvent::PushRejected { .. }));

        let mut bob = connect(addr, "b").await;
        assert_eq!(next_event(&mut alice).await, online(&["a", "b"]));
        assert_eq!(next_event(&mut bob).await, online(&["a", "b"]));

        let push = ClientEvent::PushMessage(WireMessage {
            id: Some("m-1".into()),
            receiver_id: Some(UserId::from("a")),
            text: Some("first".into()),
            created_at: Some(Utc::now()),
            ..Default::default()
        });
        bob.send(ClientFrame::Text(push.to_json().unwrap())).await.unwrap();
        let request = ClientEvent::RequestOnlineSet.to_json().unwrap();
        bob.send(ClientFrame::Text(request)).await.unwrap();

        // Events reach each socket in the order they were issued.
        match next_event(&mut alice).await {
            ServerEvent::NewMessage(wire) => {
                assert_eq!(wire.id.as_deref(), Some("m-1"));
                assert_eq!(wire.sender_id, Some(UserId::from("b")));
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(matches!(next_event(&mut bob).await, ServerEvent::SendAck(ack) if ack.success));
        assert_eq!(next_event(&mut bob).await, online(&["a", "b"]));

        bob.close(None).await.unwrap();
        assert_eq!(next_event(&mut alice).await, online(&["a"]));
        assert_eq!(hub.connection_count(), 1);
        assert!(!hub.online_users().contains(&UserId::from("b")));
    }

    #[test]
    fn blank_user_id_means_anonymous() {
        let blank = ConnectParams {
            user_id: Some("  ".into()),
        };
        assert_eq!(blank.user(), None);

        let none = ConnectParams { user_id: None };
        assert_eq!(none.user(), None);

        let some = ConnectParams {
            user_id: Some("65f1c0".into()),
        };
        assert_eq!(some.user(), Some(UserId::from("65f1c0")));
    }
}
