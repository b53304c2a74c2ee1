//! Polling worker for deployment status

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tracing::{debug, info};

use crate::session::probe::{StatusProbe, Tick};
use crate::utils::{calc_exp_backoff, CooldownOptions};

/// Poller worker options
#[derive(Debug, Clone)]
pub struct Options {
    /// Fixed interval between status checks while things are healthy
    pub interval: Duration,

    /// Backoff schedule applied after consecutive failed checks
    pub cooldown: CooldownOptions,

    /// Consecutive failed checks tolerated before the worker gives up
    pub max_consecutive_failures: u32,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            cooldown: CooldownOptions::default(),
            max_consecutive_failures: 30,
        }
    }
}

/// Run the status poller until the deployment settles or the session goes away
///
/// `shutdown_signal` is the graceful exit; the owning session also aborts the
/// task, so a check between awaits is enough here.
pub async fn run<S, F>(
    options: &Options,
    probe: &mut StatusProbe,
    sleep_fn: S,
    mut shutdown_signal: Pin<Box<dyn Future<Output = ()> + Send>>,
) where
    S: Fn(Duration) -> F,
    F: Future<Output = ()>,
{
    info!(
        "Status poller starting for deployment {}",
        probe.deployment_id()
    );

    loop {
        let delay = match probe.err_streak() {
            0 => options.interval,
            streak => calc_exp_backoff(&options.cooldown, streak - 1),
        };

        // Check for shutdown
        tokio::select! {
            _ = &mut shutdown_signal => {
                info!("Status poller shutting down...");
                return;
            }
            _ = sleep_fn(delay) => {
                // Continue with poll
            }
        }

        debug!("Polling deployment status...");

        tokio::select! {
            _ = &mut shutdown_signal => {
                info!("Status poller shutting down...");
                return;
            }
            tick = probe.tick(options.max_consecutive_failures) => {
                match tick {
                    Tick::Continue => {}
                    Tick::Settled => {
                        info!(
                            "Deployment {} settled, poller stopping",
                            probe.deployment_id()
                        );
                        return;
                    }
                    Tick::Stale => {
                        info!("Poller superseded, stopping");
                        return;
                    }
                }
            }
        }
    }
}
