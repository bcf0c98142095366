use std::time::Duration;

use pasetors::keys::{Generate, SymmetricKey};
use pasetors::version4::V4;

use super::error::ExchangeError;
use crate::state_token::StateCodec;

/// Shared broker settings used by both config and runtime state.
#[derive(Clone)]
pub(crate) struct BrokerSettings {
    pub(crate) auth_path: String,
    pub(crate) default_scope: Option<String>,
}

impl BrokerSettings {
    fn defaults() -> Self {
        Self {
            auth_path: "/auth".into(),
            default_scope: None,
        }
    }
}

/// Authorization exchange configuration.
///
/// Required field (`codec`) is a constructor parameter — no runtime
/// "missing field" errors.
///
/// Use [`from_env()`](BrokerConfig::from_env) for convention-based setup,
/// or [`new()`](BrokerConfig::new) with `with_*` methods for full control.
pub struct BrokerConfig {
    pub(super) codec: StateCodec,
    pub(super) settings: BrokerSettings,
}

impl BrokerConfig {
    /// Create config with the required state codec.
    #[must_use]
    pub fn new(codec: StateCodec) -> Self {
        Self {
            codec,
            settings: BrokerSettings::defaults(),
        }
    }

    /// Create config from environment variables.
    ///
    /// # Optional env vars
    /// - `TRADEGATE_STATE_KEY`: hex-encoded 32-byte state signing key;
    ///   an ephemeral key is generated when unset (in-flight authorizations
    ///   then do not survive a restart)
    /// - `TRADEGATE_STATE_TTL_SECS`: state token lifetime
    /// - `TRADEGATE_AUTH_PATH`: endpoint path prefix (default `/auth`)
    /// - `TRADEGATE_DEFAULT_SCOPE`: scope applied when the initiate request
    ///   carries none
    ///
    /// # Errors
    ///
    /// Returns [`ExchangeError::Config`] if a set variable fails to parse.
    pub fn from_env() -> Result<Self, ExchangeError> {
        let key = match std::env::var("TRADEGATE_STATE_KEY") {
            Ok(hex_key) => state_key_from_hex(&hex_key)?,
            Err(_) => SymmetricKey::<V4>::generate()
                .map_err(|e| ExchangeError::Config(format!("state key generation: {e}")))?,
        };

        let mut codec = StateCodec::new(key);
        if let Ok(raw) = std::env::var("TRADEGATE_STATE_TTL_SECS") {
            let secs: u64 = raw
                .parse()
                .map_err(|e| ExchangeError::Config(format!("TRADEGATE_STATE_TTL_SECS: {e}")))?;
            codec = codec.with_ttl(Duration::from_secs(secs));
        }

        let mut config = Self::new(codec);
        if let Ok(path) = std::env::var("TRADEGATE_AUTH_PATH") {
            config = config.with_auth_path(path);
        }
        if let Ok(scope) = std::env::var("TRADEGATE_DEFAULT_SCOPE") {
            config = config.with_default_scope(scope);
        }
        Ok(config)
    }

    #[must_use]
    pub fn with_auth_path(mut self, path: impl Into<String>) -> Self {
        self.settings.auth_path = path.into();
        self
    }

    #[must_use]
    pub fn with_default_scope(mut self, scope: impl Into<String>) -> Self {
        self.settings.default_scope = Some(scope.into());
        self
    }
}

/// Parses a hex-encoded 32-byte symmetric state key.
fn state_key_from_hex(hex_key: &str) -> Result<SymmetricKey<V4>, ExchangeError> {
    let bytes = hex::decode(hex_key)
        .map_err(|e| ExchangeError::Config(format!("TRADEGATE_STATE_KEY: invalid hex: {e}")))?;
    SymmetricKey::<V4>::from(&bytes).map_err(|_| {
        ExchangeError::Config(format!(
            "TRADEGATE_STATE_KEY: invalid key length: expected 32, got {}",
            bytes.len()
        ))
    })
}
