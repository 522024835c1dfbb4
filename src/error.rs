use reqwest::StatusCode;
use thiserror::Error;

/// Result alias used throughout the crate.
pub type ApiResult<T> = Result<T, ApiError>;

/// Error taxonomy for everything that can go wrong talking to the API.
///
/// `SessionExpired` is special: it is the only error that forces a session
/// teardown, and the only one the pipeline ever produces on behalf of a
/// request it absorbed into a refresh cycle. Everything else is surfaced
/// verbatim to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    /// No response was received at all (connection refused, DNS failure,
    /// timeout, or an unusable response body).
    #[error("unable to reach the server")]
    NetworkUnreachable,

    /// 401 on login or signup: the presented credentials were wrong.
    #[error("invalid email or password")]
    InvalidCredentials,

    /// Terminal refresh failure, or a 401 with no refresh token available.
    /// The session has been torn down by the time this is observed.
    #[error("session expired, please sign in again")]
    SessionExpired,

    /// The refresh endpoint rejected the refresh token.
    #[error("refresh token was rejected")]
    RefreshRejected,

    /// The validate endpoint rejected the access token.
    #[error("access token is no longer valid")]
    InvalidToken,

    /// 403
    #[error("you do not have permission to perform this action")]
    Forbidden,

    /// 404
    #[error("the requested resource was not found")]
    NotFound,

    /// 409, with the server-provided message when one was sent.
    #[error("conflict: {0}")]
    Conflict(String),

    /// 400 or 422, with the server-provided message when one was sent.
    #[error("validation failed: {0}")]
    ValidationFailed(String),

    /// 429
    #[error("too many requests, try again later")]
    RateLimited,

    /// Any 5xx.
    #[error("server error (status {0})")]
    ServerError(u16),

    /// Any status not covered by the variants above.
    #[error("unexpected status {0}")]
    UnknownStatus(u16),
}

impl ApiError {
    /// Map a non-success HTTP status to an error, pulling the server's
    /// `{"message": ...}` out of the body where the variant carries one.
    pub fn from_status(status: StatusCode, body: &str) -> Self {
        match status {
            StatusCode::UNAUTHORIZED => ApiError::InvalidCredentials,
            StatusCode::FORBIDDEN => ApiError::Forbidden,
            StatusCode::NOT_FOUND => ApiError::NotFound,
            StatusCode::CONFLICT => {
                ApiError::Conflict(server_message(body, "conflict occurred"))
            }
            StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
                ApiError::ValidationFailed(server_message(body, "validation failed"))
            }
            StatusCode::TOO_MANY_REQUESTS => ApiError::RateLimited,
            s if s.is_server_error() => ApiError::ServerError(s.as_u16()),
            s => ApiError::UnknownStatus(s.as_u16()),
        }
    }
}

/// Extract the `message` field from a JSON error body, falling back to a
/// fixed description when the body carries none.
fn server_message(body: &str, fallback: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(String::from))
        .unwrap_or_else(|| fallback.to_string())
}
