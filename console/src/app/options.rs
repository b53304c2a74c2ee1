//! Application configuration options

use std::time::Duration;

use crate::storage::settings::Settings;
use crate::workers::poller;

/// Main application options
#[derive(Debug, Clone)]
pub struct AppOptions {
    /// Records service base URL (catalog, schemas, deployment records)
    pub records_base_url: String,

    /// Deploy service base URL (the trigger plane)
    pub deploy_base_url: String,

    /// Status poller options
    pub poller: poller::Options,
}

impl Default for AppOptions {
    fn default() -> Self {
        Self {
            records_base_url: "http://localhost:8002".to_string(),
            deploy_base_url: "http://localhost:8003".to_string(),
            poller: poller::Options::default(),
        }
    }
}

impl AppOptions {
    /// Derive options from the settings file
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            records_base_url: settings.records.base_url.clone(),
            deploy_base_url: settings.deploy.base_url.clone(),
            poller: poller::Options {
                interval: Duration::from_secs(settings.poll_interval_secs.max(1)),
                max_consecutive_failures: settings.poll_failure_budget.max(1),
                ..Default::default()
            },
        }
    }
}
