//! Schema API client

use crate::authn::credentials::AccessToken;
use crate::errors::ConsoleError;
use crate::http::client::ApiClient;
use crate::models::schema::AppSchema;

impl ApiClient {
    /// Fetch the configuration schema for one application version
    pub async fn fetch_schema(
        &self,
        token: &AccessToken,
        application_name: &str,
        version: &str,
    ) -> Result<AppSchema, ConsoleError> {
        let url = self.records_url(&format!("/v1/schema/{}/{}", application_name, version));
        self.get(url, token).await
    }
}
