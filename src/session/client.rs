use std::sync::Arc;

use url::Url;

use super::manager::TokenManager;
use crate::error::Error;

/// Brokerage API client bound to a session's token manager.
///
/// Holds no credential itself: every request asks the manager for a live
/// access token, so a refresh behind the manager is picked up transparently.
/// Rebuilt wholesale whenever the session fully reinitializes.
#[derive(Clone)]
pub struct ApiClient {
    base_url: Url,
    manager: Arc<dyn TokenManager>,
    http: reqwest::Client,
}

impl ApiClient {
    #[must_use]
    pub fn new(base_url: Url, manager: Arc<dyn TokenManager>) -> Self {
        Self {
            base_url,
            manager,
            http: reqwest::Client::new(),
        }
    }

    /// Use a custom HTTP client (for connection pool reuse or testing).
    #[must_use]
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http = client;
        self
    }

    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Resolve a path against the API base.
    ///
    /// # Errors
    ///
    /// Returns the underlying parse error for paths the base cannot absorb.
    pub fn endpoint(&self, path: &str) -> Result<Url, url::ParseError> {
        self.base_url.join(path)
    }

    /// GET a brokerage resource as JSON.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TokenUnavailable`] when the manager cannot produce a
    /// live token, [`Error::Http`] on network failure, or
    /// [`Error::ApiResponse`] when the brokerage answers non-success.
    pub async fn get_json(&self, url: Url) -> Result<serde_json::Value, Error> {
        let access_token = self
            .manager
            .get_access_token()
            .await
            .map_err(Error::TokenUnavailable)?;

        let response = self
            .http
            .get(url)
            .bearer_auth(access_token)
            .send()
            .await?;

        let response = Self::ensure_success(response).await?;
        response.json().await.map_err(Into::into)
    }

    /// Checks HTTP response status; returns the response on success or an
    /// error with details.
    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, Error> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let detail = response.text().await.unwrap_or_default();
        Err(Error::ApiResponse { status, detail })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BoxError;
    use crate::types::CredentialRecord;
    use async_trait::async_trait;

    struct StubManager;

    #[async_trait]
    impl TokenManager for StubManager {
        async fn initialize(&self) -> Result<(), BoxError> {
            Ok(())
        }

        async fn get_access_token(&self) -> Result<String, BoxError> {
            Ok("tok".into())
        }

        async fn exchange_code(
            &self,
            _code: &str,
            _state: &str,
        ) -> Result<CredentialRecord, BoxError> {
            Ok(CredentialRecord::new("tok"))
        }
    }

    #[test]
    fn endpoint_joins_against_base() {
        let client = ApiClient::new(
            "https://api.brokerage.example/v1/".parse().unwrap(),
            Arc::new(StubManager),
        );
        let url = client.endpoint("accounts/123").unwrap();
        assert_eq!(url.as_str(), "https://api.brokerage.example/v1/accounts/123");
    }

    #[tokio::test]
    async fn ensure_success_maps_error_status() {
        let response = axum::http::Response::builder()
            .status(503)
            .body("down for maintenance".to_string())
            .unwrap();
        let result = ApiClient::ensure_success(reqwest::Response::from(response)).await;
        assert!(matches!(
            result,
            Err(Error::ApiResponse { status: 503, ref detail }) if detail == "down for maintenance"
        ));
    }

    #[tokio::test]
    async fn ensure_success_passes_ok() {
        let response = axum::http::Response::builder()
            .status(200)
            .body(String::new())
            .unwrap();
        assert!(ApiClient::ensure_success(reqwest::Response::from(response)).await.is_ok());
    }
}
