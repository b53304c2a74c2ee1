//! Poll-side status application with stale-result protection

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tracing::{debug, error, warn};

use crate::authn::credentials::CredentialSource;
use crate::errors::ConsoleError;
use crate::http::api::DeployApi;
use crate::models::deployment::{DeploymentId, DeploymentStatus, StatusInfo, StatusKind};
use crate::session::controller::SessionSnapshot;
use crate::session::fsm::{LifecycleEvent, LifecycleFsm};

/// Verdict of one poll tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// Keep polling: still in process, or a tolerated transport failure
    Continue,
    /// A terminal status was applied, or the failure budget ran out
    Settled,
    /// This poller no longer speaks for the session; stop without writing
    Stale,
}

/// Poll bookkeeping for one in-flight deployment
#[derive(Debug, Clone)]
pub struct PollState {
    pub last_attempted_at: DateTime<Utc>,
    pub last_succeeded_at: Option<DateTime<Utc>>,
    pub err_streak: u32,
}

impl Default for PollState {
    fn default() -> Self {
        Self {
            last_attempted_at: DateTime::<Utc>::MIN_UTC,
            last_succeeded_at: None,
            err_streak: 0,
        }
    }
}

/// One poller's handle on the session state it is allowed to write
///
/// Carries the generation it was spawned under. Any write is preceded by a
/// generation check under the lifecycle lock, so a result fetched for a
/// superseded deployment view is discarded instead of applied.
pub struct StatusProbe {
    api: Arc<dyn DeployApi>,
    credentials: Arc<dyn CredentialSource>,
    deployment_id: DeploymentId,
    fsm: Arc<RwLock<LifecycleFsm>>,
    watch_tx: Arc<watch::Sender<SessionSnapshot>>,
    live_generation: Arc<AtomicU64>,
    generation: u64,
    state: PollState,
}

impl StatusProbe {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        api: Arc<dyn DeployApi>,
        credentials: Arc<dyn CredentialSource>,
        deployment_id: DeploymentId,
        fsm: Arc<RwLock<LifecycleFsm>>,
        watch_tx: Arc<watch::Sender<SessionSnapshot>>,
        live_generation: Arc<AtomicU64>,
        generation: u64,
    ) -> Self {
        Self {
            api,
            credentials,
            deployment_id,
            fsm,
            watch_tx,
            live_generation,
            generation,
            state: PollState::default(),
        }
    }

    pub fn deployment_id(&self) -> DeploymentId {
        self.deployment_id
    }

    /// Consecutive failed polls so far
    pub fn err_streak(&self) -> u32 {
        self.state.err_streak
    }

    /// Fetch the status once and apply it, unless this probe went stale
    pub async fn tick(&mut self, max_consecutive_failures: u32) -> Tick {
        self.state.last_attempted_at = Utc::now();

        let token = match self.credentials.access_token().await {
            Ok(token) => token,
            Err(e) => return self.note_failure(max_consecutive_failures, e),
        };

        match self.api.fetch_status(&token, self.deployment_id).await {
            Ok(status) => {
                self.state.last_succeeded_at = Some(Utc::now());
                self.state.err_streak = 0;
                self.apply(status)
            }
            Err(e) => self.note_failure(max_consecutive_failures, e),
        }
    }

    /// Apply a fetched status to the session.
    ///
    /// The generation check and the snapshot write happen under the same
    /// lifecycle lock acquisition, so teardown's bump-then-lock barrier
    /// guarantees nothing lands after it.
    fn apply(&self, status: DeploymentStatus) -> Tick {
        let mut fsm = self.fsm.write().unwrap_or_else(|e| e.into_inner());

        if self.live_generation.load(Ordering::SeqCst) != self.generation {
            debug!(
                "dropping status for superseded view of deployment {}",
                self.deployment_id
            );
            return Tick::Stale;
        }

        let terminal = status.status.is_terminal();
        let event = match status.status {
            StatusKind::Success => LifecycleEvent::StatusSucceeded(status.info.clone()),
            StatusKind::Failed => LifecycleEvent::StatusFailed(status.info.clone()),
            // `unknown` while polling means the worker has not reported
            // yet; treat it as still in process.
            StatusKind::InProcess | StatusKind::Unknown => LifecycleEvent::StatusInProcess,
        };

        if let Err(reason) = fsm.process(event) {
            warn!("status update not applied: {}", reason);
            return Tick::Settled;
        }

        let phase = fsm.phase();
        self.watch_tx.send_modify(|snapshot| {
            snapshot.phase = phase;
            snapshot.status = status;
        });

        if terminal {
            Tick::Settled
        } else {
            Tick::Continue
        }
    }

    fn note_failure(&mut self, max_consecutive_failures: u32, err: ConsoleError) -> Tick {
        self.state.err_streak += 1;
        error!(
            "status poll for {} failed ({} of {} tolerated): {}",
            self.deployment_id, self.state.err_streak, max_consecutive_failures, err
        );

        if self.state.err_streak < max_consecutive_failures {
            return Tick::Continue;
        }

        // Budget exhausted: settle as failed rather than leave the session
        // polling an endpoint it cannot reach.
        let mut fsm = self.fsm.write().unwrap_or_else(|e| e.into_inner());

        if self.live_generation.load(Ordering::SeqCst) != self.generation {
            return Tick::Stale;
        }

        let info = StatusInfo {
            message: Some("lost contact with the deployment status endpoint".to_string()),
            detail: Some(err.to_string()),
        };
        let status = DeploymentStatus {
            status: StatusKind::Failed,
            info: Some(info.clone()),
        };

        if let Err(reason) = fsm.process(LifecycleEvent::StatusFailed(Some(info))) {
            warn!("poll give-up not applied: {}", reason);
            return Tick::Settled;
        }

        let phase = fsm.phase();
        self.watch_tx.send_modify(|snapshot| {
            snapshot.phase = phase;
            snapshot.status = status;
        });

        Tick::Settled
    }
}
