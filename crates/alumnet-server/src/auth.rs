//! Session identity for HTTP handlers.
//!
//! Authentication happens upstream; by the time a request reaches this
//! service the auth layer has put the caller's user id in
//! [`SESSION_USER_HEADER`].

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use alumnet_shared::constants::SESSION_USER_HEADER;
use alumnet_shared::types::UserId;

use crate::error::ServerError;

/// The authenticated caller.
#[derive(Debug, Clone)]
pub struct SessionUser(pub UserId);

#[async_trait]
impl<S> FromRequestParts<S> for SessionUser
where
    S: Send + Sync,
{
    type Rejection = ServerError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(SESSION_USER_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(|id| SessionUser(UserId::from(id)))
            .ok_or_else(|| ServerError::Unauthorized("no session user".into()))
    }
}
