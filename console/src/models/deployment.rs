//! Deployment record and status models

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::schema::FieldValue;

/// Parameters persisted with a deployment: container name to field name to
/// value, exactly the shape the wire carries.
pub type Parameters = BTreeMap<String, BTreeMap<String, FieldValue>>;

/// Identity of a deployment record, stable across version switches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeploymentId(pub Uuid);

impl std::fmt::Display for DeploymentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::str::FromStr for DeploymentId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(DeploymentId(Uuid::parse_str(s)?))
    }
}

/// Lifecycle status reported by the records service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusKind {
    /// No report yet, or the worker has not picked the deploy up
    Unknown,
    InProcess,
    Success,
    Failed,
}

impl StatusKind {
    pub fn is_terminal(&self) -> bool {
        matches!(self, StatusKind::Success | StatusKind::Failed)
    }
}

/// Operator-facing details attached to a status report
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Status snapshot for one deployment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentStatus {
    pub status: StatusKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info: Option<StatusInfo>,
}

impl DeploymentStatus {
    pub fn unknown() -> Self {
        Self {
            status: StatusKind::Unknown,
            info: None,
        }
    }
}

/// One row in the per-owner deployment listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentSummary {
    pub deployment_id: DeploymentId,
    pub application_name: String,
    pub version: String,
}

/// The client's working view of a deployment record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentRecord {
    pub deployment_id: DeploymentId,
    pub application_name: String,
    pub version: String,
    pub parameters: Parameters,
}
