//! Deployment lifecycle controller
//!
//! One `DeploySession` stands behind one configuration view. It owns the
//! working copy of the form, the lifecycle FSM and the single status-polling
//! task, and publishes every observable change through a watch channel.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::authn::credentials::CredentialSource;
use crate::errors::ConsoleError;
use crate::form::state::FormState;
use crate::http::api::DeployApi;
use crate::http::deployments::{
    CreateDeploymentRequest, TriggerDeployRequest, UpdateDeploymentRequest,
};
use crate::models::deployment::{DeploymentId, DeploymentRecord, DeploymentStatus, StatusInfo};
use crate::models::schema::{AppSchema, FieldValue};
use crate::session::fsm::{LifecycleEvent, LifecycleFsm, LifecyclePhase};
use crate::session::probe::StatusProbe;
use crate::workers::poller;

/// What observers of a session see
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    /// Current form values
    pub form: FormState,

    /// Current lifecycle phase
    pub phase: LifecyclePhase,

    /// Latest known deployment status, including the last known one
    /// recovered when the view was entered
    pub status: DeploymentStatus,
}

/// Handle on the one live polling task
struct PollHandle {
    shutdown_tx: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

/// The configuration-and-deployment session behind one view
///
/// Drop or [`teardown`](Self::teardown) cancels everything the session
/// started; results that arrive for a torn-down or superseded view are
/// discarded, never applied.
pub struct DeploySession {
    api: Arc<dyn DeployApi>,
    credentials: Arc<dyn CredentialSource>,
    poller_options: poller::Options,
    application_name: String,
    version: String,
    deployment_id: Option<DeploymentId>,
    schema: AppSchema,
    form: FormState,
    fsm: Arc<RwLock<LifecycleFsm>>,
    watch_tx: Arc<watch::Sender<SessionSnapshot>>,
    live_generation: Arc<AtomicU64>,
    poll: Option<PollHandle>,
}

impl DeploySession {
    /// Enter a configuration view.
    ///
    /// Fetches the schema, and, when a deployment already exists, recovers
    /// its persisted parameters and last known status. The form starts total
    /// over the schema: persisted values win field-by-field, the schema
    /// fallbacks fill the rest.
    pub async fn initialize(
        api: Arc<dyn DeployApi>,
        credentials: Arc<dyn CredentialSource>,
        poller_options: poller::Options,
        application_name: impl Into<String>,
        version: impl Into<String>,
        deployment_id: Option<DeploymentId>,
    ) -> Result<Self, ConsoleError> {
        let application_name = application_name.into();
        let version = version.into();

        let token = credentials.access_token().await?;
        let schema = api
            .fetch_schema(&token, &application_name, &version)
            .await
            .map_err(|e| {
                ConsoleError::SchemaError(format!("{} {}: {}", application_name, version, e))
            })?;

        for finding in schema.validate() {
            warn!(
                "schema finding for {} {}: {}",
                application_name, version, finding
            );
        }

        let persisted = match deployment_id {
            Some(id) => match api.fetch_parameters(&token, id).await {
                Ok(parameters) => Some(parameters),
                Err(e) => {
                    // Not fatal; the form falls back to schema defaults
                    warn!("could not load persisted parameters for {}: {}", id, e);
                    None
                }
            },
            None => None,
        };

        let status = match deployment_id {
            Some(id) => match api.fetch_status(&token, id).await {
                Ok(status) => status,
                Err(e) => {
                    warn!("could not load last known status for {}: {}", id, e);
                    DeploymentStatus::unknown()
                }
            },
            None => DeploymentStatus::unknown(),
        };

        let form = FormState::init(&schema, persisted.as_ref());
        let (watch_tx, _) = watch::channel(SessionSnapshot {
            form: form.clone(),
            phase: LifecyclePhase::Idle,
            status,
        });

        info!(
            "session ready for {} {} ({} fields)",
            application_name,
            version,
            form.len()
        );

        Ok(Self {
            api,
            credentials,
            poller_options,
            application_name,
            version,
            deployment_id,
            schema,
            form,
            fsm: Arc::new(RwLock::new(LifecycleFsm::new())),
            watch_tx: Arc::new(watch_tx),
            live_generation: Arc::new(AtomicU64::new(0)),
            poll: None,
        })
    }

    /// Observe the session: form, phase and status, coalesced to latest
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.watch_tx.subscribe()
    }

    pub fn application_name(&self) -> &str {
        &self.application_name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn deployment_id(&self) -> Option<DeploymentId> {
        self.deployment_id
    }

    pub fn schema(&self) -> &AppSchema {
        &self.schema
    }

    pub fn form(&self) -> &FormState {
        &self.form
    }

    pub fn phase(&self) -> LifecyclePhase {
        self.fsm.read().unwrap_or_else(|e| e.into_inner()).phase()
    }

    /// Latest known status
    pub fn status(&self) -> DeploymentStatus {
        self.watch_tx.borrow().status.clone()
    }

    /// Terminal details from the last status report, if any
    pub fn terminal_info(&self) -> Option<StatusInfo> {
        self.fsm
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .info()
            .cloned()
    }

    /// Why the last submit bounced, if it did
    pub fn last_rejection(&self) -> Option<String> {
        self.fsm
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .rejection()
            .map(|r| r.to_string())
    }

    /// The client's working view of the deployment record
    pub fn record(&self) -> Option<DeploymentRecord> {
        self.deployment_id.map(|deployment_id| DeploymentRecord {
            deployment_id,
            application_name: self.application_name.clone(),
            version: self.version.clone(),
            parameters: self.form.parameters().clone(),
        })
    }

    /// Apply one user edit to the working form state
    pub fn edit(
        &mut self,
        container: &str,
        field: &str,
        value: FieldValue,
    ) -> Result<(), ConsoleError> {
        self.form = self.form.apply_edit(&self.schema, container, field, value)?;
        self.publish();
        Ok(())
    }

    /// Persist the parameters, trigger the deploy, start polling.
    ///
    /// Only valid from Idle. Failure anywhere before acceptance returns the
    /// session to Idle with the edits kept, and submit may be retried.
    pub async fn submit(&mut self) -> Result<(), ConsoleError> {
        {
            let mut fsm = self.fsm.write().unwrap_or_else(|e| e.into_inner());
            let phase = fsm.phase();
            if phase.is_in_flight() {
                return Err(ConsoleError::DeployInFlight);
            }
            if phase.is_terminal() {
                return Err(ConsoleError::LifecycleError(format!(
                    "cannot submit from {:?}",
                    phase
                )));
            }
            fsm.process(LifecycleEvent::Submit)
                .map_err(ConsoleError::LifecycleError)?;
        }
        self.publish();

        match self.persist_and_trigger().await {
            Ok(()) => {
                {
                    let mut fsm = self.fsm.write().unwrap_or_else(|e| e.into_inner());
                    fsm.process(LifecycleEvent::Accepted)
                        .map_err(ConsoleError::LifecycleError)?;
                }
                self.publish();
                self.start_polling();
                Ok(())
            }
            Err(e) => {
                {
                    let mut fsm = self.fsm.write().unwrap_or_else(|e| e.into_inner());
                    if let Err(reason) = fsm.process(LifecycleEvent::Rejected(e.to_string())) {
                        warn!("submit rejection not recorded: {}", reason);
                    }
                }
                self.publish();
                Err(e)
            }
        }
    }

    /// The submit's side effects: ensure a record exists, persist the
    /// parameters against it, then hand the deploy service the trigger.
    async fn persist_and_trigger(&mut self) -> Result<(), ConsoleError> {
        let token = self.credentials.access_token().await?;

        let deployment_id = match self.deployment_id {
            Some(id) => id,
            None => {
                // First deploy from this view: create the record that
                // carries the identity for this and later versions.
                let request = CreateDeploymentRequest {
                    application_name: self.application_name.clone(),
                    version: self.version.clone(),
                    username: self.credentials.username().to_string(),
                    parameters: self.form.parameters().clone(),
                };
                let id = self
                    .api
                    .create_deployment(&token, &request)
                    .await
                    .map_err(|e| {
                        ConsoleError::SubmitError(format!("creating deployment record: {}", e))
                    })?;
                info!("created deployment record {}", id);
                self.deployment_id = Some(id);
                id
            }
        };

        let update = UpdateDeploymentRequest {
            version: self.version.clone(),
            parameters: self.form.parameters().clone(),
        };
        self.api
            .update_parameters(&token, deployment_id, &update)
            .await
            .map_err(|e| ConsoleError::SubmitError(format!("persisting parameters: {}", e)))?;

        let trigger = TriggerDeployRequest {
            application_name: self.application_name.clone(),
            version: self.version.clone(),
            parameters: self.form.parameters().clone(),
        };
        let accepted = self
            .api
            .trigger_deploy(&token, deployment_id, &trigger)
            .await
            .map_err(|e| ConsoleError::SubmitError(format!("triggering deploy: {}", e)))?;

        info!("deploy accepted for {}: {}", deployment_id, accepted.msg);
        Ok(())
    }

    /// Spawn the status poller for the current deployment.
    ///
    /// At most one poller speaks for the session: a previous one, live or
    /// finished, is invalidated by a generation bump before the replacement
    /// is spawned.
    fn start_polling(&mut self) {
        if let Some(poll) = self.poll.take() {
            warn!("replacing a live status poller");
            self.live_generation.fetch_add(1, Ordering::SeqCst);
            let _ = poll.shutdown_tx.send(());
            poll.handle.abort();
        }

        let Some(deployment_id) = self.deployment_id else {
            warn!("no deployment identity to poll");
            return;
        };

        let mut probe = StatusProbe::new(
            self.api.clone(),
            self.credentials.clone(),
            deployment_id,
            self.fsm.clone(),
            self.watch_tx.clone(),
            self.live_generation.clone(),
            self.live_generation.load(Ordering::SeqCst),
        );
        let options = self.poller_options.clone();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let handle = tokio::spawn(async move {
            poller::run(
                &options,
                &mut probe,
                tokio::time::sleep,
                Box::pin(async move {
                    let _ = shutdown_rx.await;
                }),
            )
            .await;
        });

        self.poll = Some(PollHandle {
            shutdown_tx,
            handle,
        });
    }

    /// Re-target the same deployment at a different version of the same
    /// application.
    ///
    /// Keeps the deployment identity, re-reads what the backend persisted,
    /// re-seeds the form against the new schema (persisted values still win
    /// field-by-field; dropped fields vanish, new fields take their
    /// defaults) and resets the lifecycle to Idle. The last known status is
    /// left as it was.
    pub async fn switch_version(
        &mut self,
        version: impl Into<String>,
    ) -> Result<(), ConsoleError> {
        let version = version.into();

        if self.phase().is_in_flight() {
            return Err(ConsoleError::DeployInFlight);
        }

        let token = self.credentials.access_token().await?;
        let schema = self
            .api
            .fetch_schema(&token, &self.application_name, &version)
            .await
            .map_err(|e| {
                ConsoleError::SchemaError(format!(
                    "{} {}: {}",
                    self.application_name, version, e
                ))
            })?;

        for finding in schema.validate() {
            warn!(
                "schema finding for {} {}: {}",
                self.application_name, version, finding
            );
        }

        // Prefer what the backend has persisted; fall back to the local
        // working copy when the record is missing or unreadable.
        let persisted = match self.deployment_id {
            Some(id) => match self.api.fetch_parameters(&token, id).await {
                Ok(parameters) => parameters,
                Err(e) => {
                    warn!("could not reload persisted parameters for {}: {}", id, e);
                    self.form.parameters().clone()
                }
            },
            None => self.form.parameters().clone(),
        };

        {
            let mut fsm = self.fsm.write().unwrap_or_else(|e| e.into_inner());
            fsm.process(LifecycleEvent::Reset)
                .map_err(ConsoleError::LifecycleError)?;
        }

        info!(
            "switching {} from {} to {}",
            self.application_name, self.version, version
        );

        self.version = version;
        self.schema = schema;
        self.form = FormState::init(&self.schema, Some(&persisted));
        self.publish();
        Ok(())
    }

    /// Destroy the view: cancel the polling task and bar any in-flight
    /// result from writing.
    pub async fn teardown(mut self) {
        self.invalidate_poller().await;
        info!(
            "session for {} {} torn down",
            self.application_name, self.version
        );
    }

    async fn invalidate_poller(&mut self) {
        self.live_generation.fetch_add(1, Ordering::SeqCst);
        // Barrier: a probe mid-apply finishes under the lock before this
        // returns, and every later apply sees the bumped generation.
        drop(self.fsm.write().unwrap_or_else(|e| e.into_inner()));

        if let Some(poll) = self.poll.take() {
            let _ = poll.shutdown_tx.send(());
            poll.handle.abort();
            if let Err(e) = poll.handle.await {
                if !e.is_cancelled() {
                    warn!("status poller ended badly: {}", e);
                }
            }
        }
    }

    /// Push the session-owned slice of the snapshot (form and phase).
    ///
    /// Holds the lifecycle lock across the write so a concurrent poll
    /// result cannot interleave and get overwritten with an older phase.
    fn publish(&self) {
        let fsm = self.fsm.read().unwrap_or_else(|e| e.into_inner());
        let phase = fsm.phase();
        self.watch_tx.send_modify(|snapshot| {
            snapshot.form = self.form.clone();
            snapshot.phase = phase;
        });
    }
}

impl Drop for DeploySession {
    fn drop(&mut self) {
        // A dropped view must not leave its poller running
        self.live_generation.fetch_add(1, Ordering::SeqCst);
        if let Some(poll) = self.poll.take() {
            poll.handle.abort();
        }
    }
}
