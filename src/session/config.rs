use async_trait::async_trait;
use url::Url;

use crate::error::BoxError;
use crate::types::ClientId;

/// Per-session configuration, resolved at each initialization attempt.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Client id used to backfill a session missing its fallback identifier.
    pub client_id: Option<ClientId>,
    /// Base URL of the brokerage API.
    pub api_base: Url,
}

/// Consumer-provided configuration resolution.
#[async_trait]
pub trait ConfigResolver: Send + Sync {
    async fn resolve(&self) -> Result<SessionConfig, BoxError>;
}

/// Environment-backed resolver.
///
/// # Env vars
/// - `TRADEGATE_API_BASE` (required): brokerage API base URL
/// - `TRADEGATE_CLIENT_ID` (optional): fallback client id
pub struct EnvConfigResolver;

#[async_trait]
impl ConfigResolver for EnvConfigResolver {
    async fn resolve(&self) -> Result<SessionConfig, BoxError> {
        let api_base: Url = std::env::var("TRADEGATE_API_BASE")
            .map_err(|_| "TRADEGATE_API_BASE is required")?
            .parse()
            .map_err(|e| format!("TRADEGATE_API_BASE: {e}"))?;
        let client_id = std::env::var("TRADEGATE_CLIENT_ID")
            .ok()
            .filter(|s| !s.is_empty())
            .map(ClientId);
        Ok(SessionConfig { client_id, api_base })
    }
}
