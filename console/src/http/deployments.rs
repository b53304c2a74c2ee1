//! Deployment records and deploy trigger API client
//!
//! Deployment records (parameters, status) live on the records service; the
//! actual deploy and uninstall triggers go to the deploy service. Both sides
//! key everything by the same deployment id.

use serde::{Deserialize, Serialize};

use crate::authn::credentials::AccessToken;
use crate::errors::ConsoleError;
use crate::http::client::ApiClient;
use crate::models::deployment::{
    DeploymentId, DeploymentStatus, DeploymentSummary, Parameters,
};

/// Body for creating a deployment record
#[derive(Debug, Clone, Serialize)]
pub struct CreateDeploymentRequest {
    pub application_name: String,
    pub version: String,
    pub username: String,
    pub parameters: Parameters,
}

/// Body for persisting edited parameters (and the targeted version)
#[derive(Debug, Clone, Serialize)]
pub struct UpdateDeploymentRequest {
    pub version: String,
    pub parameters: Parameters,
}

/// Body for the deploy trigger
#[derive(Debug, Clone, Serialize)]
pub struct TriggerDeployRequest {
    pub application_name: String,
    pub version: String,
    pub parameters: Parameters,
}

/// Responses that carry only a deployment id
#[derive(Debug, Clone, Deserialize)]
pub struct DeploymentIdResponse {
    pub deployment_id: DeploymentId,
}

/// Persisted parameters for one deployment
#[derive(Debug, Clone, Deserialize)]
pub struct ParametersResponse {
    pub parameters: Parameters,
}

/// Acknowledgement from the deploy service
#[derive(Debug, Clone, Deserialize)]
pub struct TriggerAccepted {
    pub deployment_id: DeploymentId,
    pub msg: String,
}

/// Per-owner deployment listing
#[derive(Debug, Clone, Deserialize)]
pub struct DeploymentListResponse {
    pub deployments: Vec<DeploymentSummary>,
}

impl ApiClient {
    /// Create a deployment record; returns the new identity
    pub async fn create_deployment(
        &self,
        token: &AccessToken,
        request: &CreateDeploymentRequest,
    ) -> Result<DeploymentId, ConsoleError> {
        let url = self.records_url("/v1/deployments");
        let response: DeploymentIdResponse = self.post(url, token, request).await?;
        Ok(response.deployment_id)
    }

    /// Fetch the persisted parameters for a deployment
    pub async fn fetch_parameters(
        &self,
        token: &AccessToken,
        id: DeploymentId,
    ) -> Result<Parameters, ConsoleError> {
        let url = self.records_url(&format!("/v1/deployments/{}/parameters", id));
        let response: ParametersResponse = self.get(url, token).await?;
        Ok(response.parameters)
    }

    /// Persist edited parameters (and the targeted version)
    pub async fn update_parameters(
        &self,
        token: &AccessToken,
        id: DeploymentId,
        request: &UpdateDeploymentRequest,
    ) -> Result<DeploymentId, ConsoleError> {
        let url = self.records_url(&format!("/v1/deployments/{}", id));
        let response: DeploymentIdResponse = self.put(url, token, request).await?;
        Ok(response.deployment_id)
    }

    /// Fetch the current status of a deployment
    pub async fn fetch_status(
        &self,
        token: &AccessToken,
        id: DeploymentId,
    ) -> Result<DeploymentStatus, ConsoleError> {
        let url = self.records_url(&format!("/v1/deployments/{}/status", id));
        self.get(url, token).await
    }

    /// List deployments owned by a user
    pub async fn list_deployments(
        &self,
        token: &AccessToken,
        owner: &str,
    ) -> Result<Vec<DeploymentSummary>, ConsoleError> {
        let url = self.records_url(&format!("/v1/deployments?owner={}", owner));
        let response: DeploymentListResponse = self.get(url, token).await?;
        Ok(response.deployments)
    }

    /// Delete a deployment record
    pub async fn delete_deployment(
        &self,
        token: &AccessToken,
        id: DeploymentId,
    ) -> Result<DeploymentId, ConsoleError> {
        let url = self.records_url(&format!("/v1/deployments/{}", id));
        let response: DeploymentIdResponse = self.delete(url, token).await?;
        Ok(response.deployment_id)
    }

    /// Ask the deploy service to launch the deployment
    pub async fn trigger_deploy(
        &self,
        token: &AccessToken,
        id: DeploymentId,
        request: &TriggerDeployRequest,
    ) -> Result<TriggerAccepted, ConsoleError> {
        let url = self.deploy_url(&format!("/v1/deployments/{}", id));
        self.post(url, token, request).await
    }

    /// Ask the deploy service to tear the deployment down
    pub async fn trigger_uninstall(
        &self,
        token: &AccessToken,
        id: DeploymentId,
    ) -> Result<TriggerAccepted, ConsoleError> {
        let url = self.deploy_url(&format!("/v1/deployments/{}", id));
        self.delete(url, token).await
    }
}
