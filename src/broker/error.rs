use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

/// Errors surfaced by the authorization exchange endpoints.
///
/// Every endpoint maps its failure into exactly one of these; none of them
/// crosses the endpoint boundary unhandled.
#[derive(Debug, thiserror::Error)]
pub enum ExchangeError {
    /// Initiate request carried no resolvable client id.
    #[error("missing client_id")]
    MissingClientId,

    /// Callback request lacked the `state` or `code` query value.
    #[error("missing state or code parameter")]
    MissingParameters,

    /// State token failed verification or has expired.
    #[error("invalid or expired state")]
    InvalidOrExpiredState,

    /// Submitted approval payload is missing or incomplete.
    #[error("invalid authorization state: {0}")]
    InvalidState(&'static str),

    /// The one-time code could not be exchanged (cause logged, not surfaced).
    #[error("token exchange failed")]
    TokenExchangeFailed,

    /// The canonical user id could not be determined.
    #[error("could not determine user id")]
    NoUserId,

    /// The authorization provider reported an error of its own.
    #[error("authorization provider error: {0}")]
    Provider(String),

    /// A downstream API call failed.
    #[error("api error: {0}")]
    Api(String),

    /// Missing or invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// Anything unclassified.
    #[error("internal error")]
    Internal,
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    error_description: String,
}

impl ExchangeError {
    fn code(&self) -> &'static str {
        match self {
            Self::MissingClientId => "missing_client_id",
            Self::MissingParameters => "missing_parameters",
            Self::InvalidOrExpiredState => "invalid_or_expired_state",
            Self::InvalidState(_) => "invalid_state",
            Self::TokenExchangeFailed => "token_exchange_failed",
            Self::NoUserId => "no_user_id",
            Self::Provider(_) => "provider_error",
            Self::Api(_) => "api_error",
            Self::Config(_) => "config_error",
            Self::Internal => "internal_error",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::MissingClientId
            | Self::MissingParameters
            | Self::InvalidOrExpiredState
            | Self::InvalidState(_)
            | Self::Provider(_) => StatusCode::BAD_REQUEST,
            Self::TokenExchangeFailed | Self::NoUserId | Self::Api(_) => StatusCode::BAD_GATEWAY,
            Self::Config(_) | Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ExchangeError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "exchange internal error");
        }
        let body = ErrorBody {
            error: self.code(),
            error_description: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

impl From<crate::error::Error> for ExchangeError {
    fn from(e: crate::error::Error) -> Self {
        match e {
            crate::error::Error::InvalidOrExpiredState => Self::InvalidOrExpiredState,
            crate::error::Error::ApiResponse { status, detail } => {
                Self::Api(format!("{status}: {detail}"))
            }
            other => {
                tracing::error!(error = %other, "unclassified exchange failure");
                Self::Internal
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert_eq!(ExchangeError::MissingClientId.status(), StatusCode::BAD_REQUEST);
        assert_eq!(ExchangeError::MissingParameters.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ExchangeError::InvalidOrExpiredState.status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ExchangeError::TokenExchangeFailed.status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(ExchangeError::NoUserId.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(
            ExchangeError::Internal.status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn codes_are_stable() {
        assert_eq!(ExchangeError::MissingParameters.code(), "missing_parameters");
        assert_eq!(ExchangeError::InvalidState("scope").code(), "invalid_state");
        assert_eq!(
            ExchangeError::Provider("access_denied".into()).code(),
            "provider_error"
        );
    }

    #[test]
    fn core_error_conversion() {
        let e: ExchangeError = crate::error::Error::InvalidOrExpiredState.into();
        assert!(matches!(e, ExchangeError::InvalidOrExpiredState));

        let e: ExchangeError = crate::error::Error::IdentityMissing.into();
        assert!(matches!(e, ExchangeError::Internal));
    }
}
