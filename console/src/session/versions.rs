//! Version selection flow

use tracing::info;

use crate::authn::credentials::CredentialSource;
use crate::errors::ConsoleError;
use crate::http::api::DeployApi;

/// The short-lived "pick a version" dialog behind the version switch
///
/// Lists what the catalog offers for one application. The validated
/// selection is handed to
/// [`DeploySession::switch_version`](crate::session::controller::DeploySession::switch_version)
/// by the hosting view.
#[derive(Debug, Clone)]
pub struct VersionPicker {
    application_name: String,
    versions: Vec<String>,
}

impl VersionPicker {
    /// Open the picker: list the versions available for the application
    pub async fn open(
        api: &dyn DeployApi,
        credentials: &dyn CredentialSource,
        application_name: impl Into<String>,
    ) -> Result<Self, ConsoleError> {
        let application_name = application_name.into();
        let token = credentials.access_token().await?;
        let versions = api.list_versions(&token, &application_name).await?;

        info!(
            "{} versions available for {}",
            versions.len(),
            application_name
        );

        Ok(Self {
            application_name,
            versions,
        })
    }

    pub fn application_name(&self) -> &str {
        &self.application_name
    }

    /// Versions on offer, in catalog order
    pub fn versions(&self) -> &[String] {
        &self.versions
    }

    /// Validate a selection against the listed versions
    pub fn select(&self, version: &str) -> Result<&str, ConsoleError> {
        self.versions
            .iter()
            .find(|v| v.as_str() == version)
            .map(|v| v.as_str())
            .ok_or_else(|| {
                ConsoleError::ValidationError(format!(
                    "version {} is not available for {}",
                    version, self.application_name
                ))
            })
    }
}
