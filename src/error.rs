/// Boxed error type used at collaborator trait boundaries.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error("identity has neither canonical nor fallback id")]
    IdentityMissing,
    #[error("invalid or expired state token")]
    InvalidOrExpiredState,
    #[error("state token encoding failed: {0}")]
    StateEncode(String),
    #[error("credential store error: {0}")]
    Store(#[source] BoxError),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("brokerage API error ({status}): {detail}")]
    ApiResponse { status: u16, detail: String },
    #[error("access token unavailable: {0}")]
    TokenUnavailable(#[source] BoxError),
    #[error("session initialization failed: {0}")]
    Init(#[source] BoxError),
    #[error("recovery exhausted: {0}")]
    RecoveryExhausted(String),
    #[error("session not ready within {0:?}")]
    ReadyTimeout(std::time::Duration),
}
