//! HTTP client implementation

use reqwest::{header, Client, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, error};

use crate::authn::credentials::AccessToken;
use crate::errors::ConsoleError;

/// HTTP client for the records and deploy services
///
/// Both collaborators share one connection pool; each request addresses one
/// of the two base URLs and carries the caller's bearer token.
pub struct ApiClient {
    client: Client,
    records_base: String,
    deploy_base: String,
}

impl ApiClient {
    /// Create a new API client
    pub fn new(records_base: &str, deploy_base: &str) -> Result<Self, ConsoleError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            records_base: records_base.trim_end_matches('/').to_string(),
            deploy_base: deploy_base.trim_end_matches('/').to_string(),
        })
    }

    /// Build a records-service URL
    pub fn records_url(&self, path: &str) -> String {
        format!("{}{}", self.records_base, path)
    }

    /// Build a deploy-service URL
    pub fn deploy_url(&self, path: &str) -> String {
        format!("{}{}", self.deploy_base, path)
    }

    /// Make a GET request
    pub(crate) async fn get<T: DeserializeOwned>(
        &self,
        url: String,
        token: &AccessToken,
    ) -> Result<T, ConsoleError> {
        debug!("GET {}", url);

        let response = self
            .client
            .get(&url)
            .header(header::AUTHORIZATION, format!("Bearer {}", token.reveal()))
            .header(header::ACCEPT, "application/json")
            .send()
            .await?;

        Self::parse_response("GET", &url, response).await
    }

    /// Make a POST request
    pub(crate) async fn post<T: DeserializeOwned, B: Serialize>(
        &self,
        url: String,
        token: &AccessToken,
        body: &B,
    ) -> Result<T, ConsoleError> {
        debug!("POST {}", url);

        let response = self
            .client
            .post(&url)
            .header(header::AUTHORIZATION, format!("Bearer {}", token.reveal()))
            .header(header::ACCEPT, "application/json")
            .json(body)
            .send()
            .await?;

        Self::parse_response("POST", &url, response).await
    }

    /// Make a PUT request
    pub(crate) async fn put<T: DeserializeOwned, B: Serialize>(
        &self,
        url: String,
        token: &AccessToken,
        body: &B,
    ) -> Result<T, ConsoleError> {
        debug!("PUT {}", url);

        let response = self
            .client
            .put(&url)
            .header(header::AUTHORIZATION, format!("Bearer {}", token.reveal()))
            .header(header::ACCEPT, "application/json")
            .json(body)
            .send()
            .await?;

        Self::parse_response("PUT", &url, response).await
    }

    /// Make a DELETE request
    pub(crate) async fn delete<T: DeserializeOwned>(
        &self,
        url: String,
        token: &AccessToken,
    ) -> Result<T, ConsoleError> {
        debug!("DELETE {}", url);

        let response = self
            .client
            .delete(&url)
            .header(header::AUTHORIZATION, format!("Bearer {}", token.reveal()))
            .header(header::ACCEPT, "application/json")
            .send()
            .await?;

        Self::parse_response("DELETE", &url, response).await
    }

    /// Map a response to a typed body, or to the error the status calls for.
    ///
    /// 401 and 403 both mean the bearer token no longer works; the caller
    /// surfaces that to whoever owns the credentials.
    async fn parse_response<T: DeserializeOwned>(
        method: &str,
        url: &str,
        response: reqwest::Response,
    ) -> Result<T, ConsoleError> {
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!("HTTP {} {} failed: {} - {}", method, url, status, body);
            return Err(match status {
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                    ConsoleError::AuthExpired(format!("{}: {}", status, body))
                }
                StatusCode::NOT_FOUND => ConsoleError::NotFound(format!("{}: {}", url, body)),
                _ => ConsoleError::ApiError(format!("{}: {}", status, body)),
            });
        }

        let body = response.json().await?;
        Ok(body)
    }
}
