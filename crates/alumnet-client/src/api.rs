//! Request/response access to the message store.
//!
//! [`ChatApi`] is the seam the session talks through; [`HttpChatApi`] is the
//! reqwest implementation used against a real server.

use std::future::Future;

use reqwest::{Client, Response, Url};
use serde::Deserialize;
use tracing::{debug, warn};

use alumnet_shared::constants::SESSION_USER_HEADER;
use alumnet_shared::message::Message;
use alumnet_shared::protocol::{SendMessageRequest, WireMessage};
use alumnet_shared::types::{Partner, UserId};

use crate::error::{ClientError, Result};

pub trait ChatApi: Send + Sync {
    /// Everyone `viewer` can talk to, never including `viewer`.
    fn list_partners(&self, viewer: &UserId) -> impl Future<Output = Result<Vec<Partner>>> + Send;

    /// Both directions of the conversation, oldest first.
    fn fetch_history(
        &self,
        viewer: &UserId,
        counterpart: &UserId,
    ) -> impl Future<Output = Result<Vec<Message>>> + Send;

    /// Durable append. Returns the canonical stored record.
    fn post_message(
        &self,
        viewer: &UserId,
        receiver: &UserId,
        content: &str,
    ) -> impl Future<Output = Result<Message>> + Send;
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

pub struct HttpChatApi {
    client: Client,
    base: Url,
}

impl HttpChatApi {
    pub fn new(server_url: &str) -> Result<Self> {
        let base = Url::parse(server_url)
            .map_err(|e| ClientError::InvalidUrl(format!("{server_url}: {e}")))?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(ClientError::InvalidUrl(format!(
                "{server_url}: expected http or https"
            )));
        }
        Ok(Self {
            client: Client::new(),
            base,
        })
    }

    /// `segments` appended to the base path, each one percent-encoded.
    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| ClientError::InvalidUrl(self.base.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn check(resp: Response) -> Result<Response> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let message = match resp.json::<ErrorBody>().await {
            Ok(body) => body.error,
            Err(_) => status.canonical_reason().unwrap_or("request failed").to_string(),
        };
        Err(ClientError::Server {
            status: status.as_u16(),
            message,
        })
    }
}

impl ChatApi for HttpChatApi {
    async fn list_partners(&self, viewer: &UserId) -> Result<Vec<Partner>> {
        let url = self.endpoint(&["api", "messages", "users"])?;
        let resp = self
            .client
            .get(url)
            .header(SESSION_USER_HEADER, viewer.as_str())
            .send()
            .await?;
        let partners: Vec<Partner> = Self::check(resp).await?.json().await?;
        debug!(count = partners.len(), "fetched partners");
        Ok(partners)
    }

    async fn fetch_history(&self, viewer: &UserId, counterpart: &UserId) -> Result<Vec<Message>> {
        let url = self.endpoint(&["api", "messages", counterpart.as_str()])?;
        let resp = self
            .client
            .get(url)
            .header(SESSION_USER_HEADER, viewer.as_str())
            .send()
            .await?;
        let wire: Vec<WireMessage> = Self::check(resp).await?.json().await?;
        Ok(normalize_history(wire))
    }

    async fn post_message(&self, viewer: &UserId, receiver: &UserId, content: &str) -> Result<Message> {
        let url = self.endpoint(&["api", "messages", receiver.as_str()])?;
        let resp = self
            .client
            .post(url)
            .header(SESSION_USER_HEADER, viewer.as_str())
            .json(&SendMessageRequest::new(content))
            .send()
            .await?;
        let wire: WireMessage = Self::check(resp).await?.json().await?;
        Ok(wire.into_message()?)
    }
}

/// Convert history records, skipping any the server sent malformed.
fn normalize_history(wire: Vec<WireMessage>) -> Vec<Message> {
    wire.into_iter()
        .filter_map(|w| match w.into_message() {
            Ok(m) => Some(m),
            Err(e) => {
                warn!(error = %e, "skipping malformed history record");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn endpoints_encode_ids_and_keep_base_path() {
        let api = HttpChatApi::new("http://localhost:5001").unwrap();
        assert_eq!(
            api.endpoint(&["api", "messages", "users"]).unwrap().as_str(),
            "http://localhost:5001/api/messages/users"
        );
        assert_eq!(
            api.endpoint(&["api", "messages", "a b/c"]).unwrap().as_str(),
            "http://localhost:5001/api/messages/a%20b%2Fc"
        );

        let prefixed = HttpChatApi::new("https://alumni.example.org/chat/").unwrap();
        assert_eq!(
            prefixed.endpoint(&["api", "messages", "users"]).unwrap().as_str(),
            "https://alumni.example.org/chat/api/messages/users"
        );
    }

    #[test]
    fn rejects_non_http_urls() {
        assert!(matches!(
            HttpChatApi::new("ws://localhost:5001"),
            Err(ClientError::InvalidUrl(_))
        ));
        assert!(matches!(
            HttpChatApi::new("not a url"),
            Err(ClientError::InvalidUrl(_))
        ));
    }

    #[test]
    fn history_accepts_either_body_field_and_skips_broken_rows() {
        let now = Utc::now();
        let rows = vec![
            WireMessage {
                id: Some("m1".into()),
                sender_id: Some(UserId::from("a")),
                receiver_id: Some(UserId::from("b")),
                message: Some("legacy".into()),
                created_at: Some(now),
                ..Default::default()
            },
            WireMessage {
                id: Some("m2".into()),
                sender_id: Some(UserId::from("b")),
                receiver_id: Some(UserId::from("a")),
                text: Some("current".into()),
                created_at: Some(now),
                ..Default::default()
            },
            WireMessage {
                id: Some("m3".into()),
                sender_id: Some(UserId::from("b")),
                ..Default::default()
            },
        ];

        let messages = normalize_history(rows);
        let bodies: Vec<_> = messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(bodies, vec!["legacy", "current"]);
    }
}
