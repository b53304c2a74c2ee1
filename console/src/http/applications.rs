//! Application catalog API client

use serde::Deserialize;

use crate::authn::credentials::AccessToken;
use crate::errors::ConsoleError;
use crate::http::client::ApiClient;

/// Response for the application listing
#[derive(Debug, Clone, Deserialize)]
pub struct ApplicationListResponse {
    pub applications: Vec<String>,
}

/// Response for the per-application version listing
#[derive(Debug, Clone, Deserialize)]
pub struct VersionListResponse {
    pub versions: Vec<String>,
}

impl ApiClient {
    /// List the applications on offer
    pub async fn list_applications(
        &self,
        token: &AccessToken,
    ) -> Result<Vec<String>, ConsoleError> {
        let url = self.records_url("/v1/applications");
        let response: ApplicationListResponse = self.get(url, token).await?;
        Ok(response.applications)
    }

    /// List the versions available for one application
    pub async fn list_versions(
        &self,
        token: &AccessToken,
        application_name: &str,
    ) -> Result<Vec<String>, ConsoleError> {
        let url = self.records_url(&format!("/v1/applications/{}/versions", application_name));
        let response: VersionListResponse = self.get(url, token).await?;
        Ok(response.versions)
    }
}
