//! Backend seam used by deployment sessions

use async_trait::async_trait;

use crate::authn::credentials::AccessToken;
use crate::errors::ConsoleError;
use crate::http::client::ApiClient;
use crate::http::deployments::{
    CreateDeploymentRequest, TriggerAccepted, TriggerDeployRequest, UpdateDeploymentRequest,
};
use crate::models::deployment::{DeploymentId, DeploymentStatus, Parameters};
use crate::models::schema::AppSchema;

/// The slice of backend behavior a session depends on
///
/// `ApiClient` is the production implementation; tests substitute stubs.
#[async_trait]
pub trait DeployApi: Send + Sync {
    async fn fetch_schema(
        &self,
        token: &AccessToken,
        application_name: &str,
        version: &str,
    ) -> Result<AppSchema, ConsoleError>;

    async fn fetch_parameters(
        &self,
        token: &AccessToken,
        id: DeploymentId,
    ) -> Result<Parameters, ConsoleError>;

    async fn create_deployment(
        &self,
        token: &AccessToken,
        request: &CreateDeploymentRequest,
    ) -> Result<DeploymentId, ConsoleError>;

    async fn update_parameters(
        &self,
        token: &AccessToken,
        id: DeploymentId,
        request: &UpdateDeploymentRequest,
    ) -> Result<DeploymentId, ConsoleError>;

    async fn trigger_deploy(
        &self,
        token: &AccessToken,
        id: DeploymentId,
        request: &TriggerDeployRequest,
    ) -> Result<TriggerAccepted, ConsoleError>;

    async fn fetch_status(
        &self,
        token: &AccessToken,
        id: DeploymentId,
    ) -> Result<DeploymentStatus, ConsoleError>;

    async fn list_versions(
        &self,
        token: &AccessToken,
        application_name: &str,
    ) -> Result<Vec<String>, ConsoleError>;
}

#[async_trait]
impl DeployApi for ApiClient {
    async fn fetch_schema(
        &self,
        token: &AccessToken,
        application_name: &str,
        version: &str,
    ) -> Result<AppSchema, ConsoleError> {
        ApiClient::fetch_schema(self, token, application_name, version).await
    }

    async fn fetch_parameters(
        &self,
        token: &AccessToken,
        id: DeploymentId,
    ) -> Result<Parameters, ConsoleError> {
        ApiClient::fetch_parameters(self, token, id).await
    }

    async fn create_deployment(
        &self,
        token: &AccessToken,
        request: &CreateDeploymentRequest,
    ) -> Result<DeploymentId, ConsoleError> {
        ApiClient::create_deployment(self, token, request).await
    }

    async fn update_parameters(
        &self,
        token: &AccessToken,
        id: DeploymentId,
        request: &UpdateDeploymentRequest,
    ) -> Result<DeploymentId, ConsoleError> {
        ApiClient::update_parameters(self, token, id, request).await
    }

    async fn trigger_deploy(
        &self,
        token: &AccessToken,
        id: DeploymentId,
        request: &TriggerDeployRequest,
    ) -> Result<TriggerAccepted, ConsoleError> {
        ApiClient::trigger_deploy(self, token, id, request).await
    }

    async fn fetch_status(
        &self,
        token: &AccessToken,
        id: DeploymentId,
    ) -> Result<DeploymentStatus, ConsoleError> {
        ApiClient::fetch_status(self, token, id).await
    }

    async fn list_versions(
        &self,
        token: &AccessToken,
        application_name: &str,
    ) -> Result<Vec<String>, ConsoleError> {
        ApiClient::list_versions(self, token, application_name).await
    }
}
