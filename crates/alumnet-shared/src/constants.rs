/// Application name
pub const APP_NAME: &str = "alumnet";

/// Query parameter carrying the user id on the WebSocket handshake
pub const USER_ID_QUERY_PARAM: &str = "userId";

/// Header carrying the authenticated user id on HTTP requests.
/// Populated by the authentication layer in front of this service.
pub const SESSION_USER_HEADER: &str = "x-user-id";

/// Path of the WebSocket endpoint
pub const WS_PATH: &str = "/ws";

/// Default HTTP / WebSocket port (server)
pub const DEFAULT_HTTP_PORT: u16 = 5001;

/// Maximum message body length in characters
pub const MAX_MESSAGE_LEN: usize = 10_000;

/// Two messages from the same sender with the same content whose timestamps
/// differ by at most this many milliseconds are treated as the same message.
pub const DEDUP_TOLERANCE_MS: i64 = 1_000;

/// Prefix of client-synthesized message ids
pub const FALLBACK_ID_PREFIX: &str = "local";
