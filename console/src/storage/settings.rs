//! Settings file management

use serde::{Deserialize, Serialize};

use crate::logs::LogLevel;

/// Console settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Records service configuration (catalog, schemas, deployment records)
    #[serde(default)]
    pub records: RecordsSettings,

    /// Deploy service configuration (the trigger plane)
    #[serde(default)]
    pub deploy: DeploySettings,

    /// Seconds between deployment status polls
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Consecutive failed polls tolerated before the session gives up
    #[serde(default = "default_poll_failure_budget")]
    pub poll_failure_budget: u32,

    /// Mirror logs to a daily file under the storage layout
    #[serde(default)]
    pub log_to_file: bool,

    /// Emit logs as JSON
    #[serde(default)]
    pub json_logs: bool,
}

fn default_poll_interval() -> u64 {
    2
}

fn default_poll_failure_budget() -> u32 {
    30
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            records: RecordsSettings::default(),
            deploy: DeploySettings::default(),
            poll_interval_secs: default_poll_interval(),
            poll_failure_budget: default_poll_failure_budget(),
            log_to_file: false,
            json_logs: false,
        }
    }
}

/// Records service settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordsSettings {
    /// Base URL for the records service
    #[serde(default = "default_records_url")]
    pub base_url: String,
}

fn default_records_url() -> String {
    "http://localhost:8002".to_string()
}

impl Default for RecordsSettings {
    fn default() -> Self {
        Self {
            base_url: default_records_url(),
        }
    }
}

/// Deploy service settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploySettings {
    /// Base URL for the deploy service
    #[serde(default = "default_deploy_url")]
    pub base_url: String,
}

fn default_deploy_url() -> String {
    "http://localhost:8003".to_string()
}

impl Default for DeploySettings {
    fn default() -> Self {
        Self {
            base_url: default_deploy_url(),
        }
    }
}
