//! Deployment session lifecycle tests
//!
//! Sessions run against a scripted backend stub under virtual time
//! (`start_paused`), so poll intervals and backoff cost nothing and every
//! schedule is deterministic.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::time::{sleep, timeout};
use tokio_test::{assert_err, assert_ok};
use uuid::Uuid;

use stevedore::authn::credentials::{AccessToken, StaticCredentials};
use stevedore::errors::ConsoleError;
use stevedore::http::api::DeployApi;
use stevedore::http::deployments::{
    CreateDeploymentRequest, TriggerAccepted, TriggerDeployRequest, UpdateDeploymentRequest,
};
use stevedore::models::deployment::{
    DeploymentId, DeploymentStatus, Parameters, StatusInfo, StatusKind,
};
use stevedore::models::schema::{AppSchema, Container, Field, FieldKind, FieldValue};
use stevedore::session::controller::{DeploySession, SessionSnapshot};
use stevedore::session::fsm::LifecyclePhase;
use stevedore::session::versions::VersionPicker;
use stevedore::workers::poller;

const TOKEN: &str = "tok-123";

fn creds() -> Arc<StaticCredentials> {
    Arc::new(StaticCredentials::new("casey", TOKEN))
}

fn field(name: &str, kind: FieldKind, default: Option<FieldValue>, values: &[&str]) -> Field {
    Field {
        name: name.to_string(),
        kind,
        default,
        hint: None,
        values: values.iter().map(|v| v.to_string()).collect(),
    }
}

fn schema_v1() -> AppSchema {
    AppSchema {
        application_name: "demo".to_string(),
        version: "1.0".to_string(),
        containers: vec![Container {
            name: "web".to_string(),
            env_vars: vec![
                field(
                    "LOG_LEVEL",
                    FieldKind::Enum,
                    Some(FieldValue::from("info")),
                    &["info", "debug"],
                ),
                field("DEBUG", FieldKind::Boolean, None, &[]),
                field(
                    "API_URL",
                    FieldKind::Text,
                    Some(FieldValue::from("https://api.internal")),
                    &[],
                ),
            ],
        }],
    }
}

/// 2.0 keeps LOG_LEVEL, drops DEBUG and API_URL, adds RETRIES
fn schema_v2() -> AppSchema {
    AppSchema {
        application_name: "demo".to_string(),
        version: "2.0".to_string(),
        containers: vec![Container {
            name: "web".to_string(),
            env_vars: vec![
                field(
                    "LOG_LEVEL",
                    FieldKind::Enum,
                    Some(FieldValue::from("info")),
                    &["info", "debug", "trace"],
                ),
                field("RETRIES", FieldKind::Text, Some(FieldValue::from("3")), &[]),
            ],
        }],
    }
}

fn in_process() -> DeploymentStatus {
    DeploymentStatus {
        status: StatusKind::InProcess,
        info: None,
    }
}

fn unknown() -> DeploymentStatus {
    DeploymentStatus::unknown()
}

fn success(message: &str) -> DeploymentStatus {
    DeploymentStatus {
        status: StatusKind::Success,
        info: Some(StatusInfo {
            message: Some(message.to_string()),
            detail: None,
        }),
    }
}

fn failed(message: &str) -> DeploymentStatus {
    DeploymentStatus {
        status: StatusKind::Failed,
        info: Some(StatusInfo {
            message: Some(message.to_string()),
            detail: None,
        }),
    }
}

/// Scripted backend double
struct StubApi {
    schemas: HashMap<String, AppSchema>,
    versions: Vec<String>,
    record_id: DeploymentId,
    persisted: Mutex<Option<Parameters>>,
    statuses: Mutex<VecDeque<Result<DeploymentStatus, ConsoleError>>>,
    fail_trigger: AtomicBool,
    fail_all_status: AtomicBool,
    create_calls: AtomicU32,
    update_calls: AtomicU32,
    trigger_calls: AtomicU32,
    status_calls: AtomicU32,
}

impl StubApi {
    fn new(schemas: Vec<AppSchema>) -> Arc<Self> {
        let versions = schemas.iter().map(|s| s.version.clone()).collect();
        let schemas = schemas
            .into_iter()
            .map(|s| (format!("{}/{}", s.application_name, s.version), s))
            .collect();

        Arc::new(Self {
            schemas,
            versions,
            record_id: DeploymentId(Uuid::new_v4()),
            persisted: Mutex::new(None),
            statuses: Mutex::new(VecDeque::new()),
            fail_trigger: AtomicBool::new(false),
            fail_all_status: AtomicBool::new(false),
            create_calls: AtomicU32::new(0),
            update_calls: AtomicU32::new(0),
            trigger_calls: AtomicU32::new(0),
            status_calls: AtomicU32::new(0),
        })
    }

    fn set_persisted(&self, parameters: Parameters) {
        *self.persisted.lock().unwrap() = Some(parameters);
    }

    fn persisted(&self) -> Option<Parameters> {
        self.persisted.lock().unwrap().clone()
    }

    fn queue_statuses(&self, statuses: Vec<Result<DeploymentStatus, ConsoleError>>) {
        self.statuses.lock().unwrap().extend(statuses);
    }

    fn status_calls(&self) -> u32 {
        self.status_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DeployApi for StubApi {
    async fn fetch_schema(
        &self,
        token: &AccessToken,
        application_name: &str,
        version: &str,
    ) -> Result<AppSchema, ConsoleError> {
        assert_eq!(token.reveal(), TOKEN);
        self.schemas
            .get(&format!("{}/{}", application_name, version))
            .cloned()
            .ok_or_else(|| ConsoleError::NotFound(format!("{} {}", application_name, version)))
    }

    async fn fetch_parameters(
        &self,
        token: &AccessToken,
        id: DeploymentId,
    ) -> Result<Parameters, ConsoleError> {
        assert_eq!(token.reveal(), TOKEN);
        assert_eq!(id, self.record_id);
        self.persisted
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| ConsoleError::NotFound("no persisted parameters".to_string()))
    }

    async fn create_deployment(
        &self,
        token: &AccessToken,
        request: &CreateDeploymentRequest,
    ) -> Result<DeploymentId, ConsoleError> {
        assert_eq!(token.reveal(), TOKEN);
        assert_eq!(request.username, "casey");
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        *self.persisted.lock().unwrap() = Some(request.parameters.clone());
        Ok(self.record_id)
    }

    async fn update_parameters(
        &self,
        token: &AccessToken,
        id: DeploymentId,
        request: &UpdateDeploymentRequest,
    ) -> Result<DeploymentId, ConsoleError> {
        assert_eq!(token.reveal(), TOKEN);
        assert_eq!(id, self.record_id);
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        *self.persisted.lock().unwrap() = Some(request.parameters.clone());
        Ok(id)
    }

    async fn trigger_deploy(
        &self,
        token: &AccessToken,
        id: DeploymentId,
        _request: &TriggerDeployRequest,
    ) -> Result<TriggerAccepted, ConsoleError> {
        assert_eq!(token.reveal(), TOKEN);
        self.trigger_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_trigger.load(Ordering::SeqCst) {
            return Err(ConsoleError::ApiError("503: deploy plane down".to_string()));
        }
        Ok(TriggerAccepted {
            deployment_id: id,
            msg: "deploy accepted".to_string(),
        })
    }

    async fn fetch_status(
        &self,
        token: &AccessToken,
        id: DeploymentId,
    ) -> Result<DeploymentStatus, ConsoleError> {
        assert_eq!(token.reveal(), TOKEN);
        assert_eq!(id, self.record_id);
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_all_status.load(Ordering::SeqCst) {
            return Err(ConsoleError::ApiError("connection refused".to_string()));
        }
        match self.statuses.lock().unwrap().pop_front() {
            Some(result) => result,
            None => Ok(in_process()),
        }
    }

    async fn list_versions(
        &self,
        token: &AccessToken,
        _application_name: &str,
    ) -> Result<Vec<String>, ConsoleError> {
        assert_eq!(token.reveal(), TOKEN);
        Ok(self.versions.clone())
    }
}

async fn start_session(
    api: &Arc<StubApi>,
    version: &str,
    deployment_id: Option<DeploymentId>,
) -> DeploySession {
    DeploySession::initialize(
        api.clone() as Arc<dyn DeployApi>,
        creds(),
        poller::Options::default(),
        "demo",
        version,
        deployment_id,
    )
    .await
    .expect("session should initialize")
}

/// Follow snapshots until the lifecycle reaches a terminal phase
async fn await_terminal(rx: &mut watch::Receiver<SessionSnapshot>) -> SessionSnapshot {
    timeout(Duration::from_secs(600), async {
        loop {
            {
                let snapshot = rx.borrow_and_update();
                if snapshot.phase.is_terminal() {
                    return snapshot.clone();
                }
            }
            rx.changed().await.expect("session closed before a verdict");
        }
    })
    .await
    .expect("no terminal phase before the timeout")
}

#[tokio::test]
async fn test_initialize_without_deployment() {
    let api = StubApi::new(vec![schema_v1()]);
    let session = start_session(&api, "1.0", None).await;

    assert_eq!(session.phase(), LifecyclePhase::Idle);
    assert_eq!(session.deployment_id(), None);
    assert!(session.record().is_none());
    assert_eq!(session.status().status, StatusKind::Unknown);

    // The form is total over the schema, seeded from defaults
    let form = session.form();
    assert_eq!(form.len(), 3);
    assert_eq!(form.get("web", "LOG_LEVEL"), Some(&FieldValue::from("info")));
    assert_eq!(form.get("web", "DEBUG"), Some(&FieldValue::Toggle(false)));

    // Nothing was fetched beyond the schema
    assert_eq!(api.status_calls(), 0);

    session.teardown().await;
}

#[tokio::test]
async fn test_initialize_recovers_persisted_parameters_and_status() {
    let api = StubApi::new(vec![schema_v1()]);
    let mut persisted = Parameters::new();
    persisted
        .entry("web".to_string())
        .or_default()
        .insert("LOG_LEVEL".to_string(), FieldValue::from("debug"));
    api.set_persisted(persisted);
    api.queue_statuses(vec![Ok(failed("image pull failed"))]);

    let session = start_session(&api, "1.0", Some(api.record_id)).await;

    // Persisted wins field-by-field; the rest falls back to defaults
    assert_eq!(
        session.form().get("web", "LOG_LEVEL"),
        Some(&FieldValue::from("debug"))
    );
    assert_eq!(
        session.form().get("web", "API_URL"),
        Some(&FieldValue::from("https://api.internal"))
    );

    // The last known status is surfaced without starting a poller
    let snapshot = session.subscribe().borrow().clone();
    assert_eq!(snapshot.status.status, StatusKind::Failed);
    assert_eq!(session.phase(), LifecyclePhase::Idle);
    assert_eq!(api.status_calls(), 1);

    session.teardown().await;
}

#[tokio::test(start_paused = true)]
async fn test_submit_creates_record_and_polls_to_success() {
    let api = StubApi::new(vec![schema_v1()]);
    api.queue_statuses(vec![
        Ok(in_process()),
        Ok(in_process()),
        Ok(in_process()),
        Ok(success("ok")),
    ]);

    let mut session = start_session(&api, "1.0", None).await;
    session
        .edit("web", "LOG_LEVEL", FieldValue::from("debug"))
        .unwrap();

    let mut rx = session.subscribe();
    assert_ok!(session.submit().await);

    let snapshot = await_terminal(&mut rx).await;
    assert_eq!(snapshot.phase, LifecyclePhase::Succeeded);
    assert_eq!(snapshot.status.status, StatusKind::Success);
    assert_eq!(
        snapshot.status.info.as_ref().unwrap().message.as_deref(),
        Some("ok")
    );
    // The form rode along unchanged
    assert_eq!(
        snapshot.form.get("web", "LOG_LEVEL"),
        Some(&FieldValue::from("debug"))
    );

    // First submit created the record, persisted, then triggered
    assert_eq!(api.create_calls.load(Ordering::SeqCst), 1);
    assert_eq!(api.update_calls.load(Ordering::SeqCst), 1);
    assert_eq!(api.trigger_calls.load(Ordering::SeqCst), 1);
    assert_eq!(session.deployment_id(), Some(api.record_id));

    // What was persisted is exactly the working form
    assert_eq!(api.persisted().as_ref(), Some(session.form().parameters()));

    // Terminal means the poller stopped
    assert_eq!(api.status_calls(), 4);
    sleep(Duration::from_secs(60)).await;
    assert_eq!(api.status_calls(), 4);

    assert_eq!(
        session.terminal_info().unwrap().message.as_deref(),
        Some("ok")
    );

    session.teardown().await;
}

#[tokio::test(start_paused = true)]
async fn test_poll_treats_unknown_as_in_process() {
    let api = StubApi::new(vec![schema_v1()]);
    api.queue_statuses(vec![Ok(unknown()), Ok(success("ok"))]);

    let mut session = start_session(&api, "1.0", None).await;
    let mut rx = session.subscribe();
    session.submit().await.unwrap();

    let snapshot = await_terminal(&mut rx).await;
    assert_eq!(snapshot.phase, LifecyclePhase::Succeeded);
    assert_eq!(api.status_calls(), 2);

    session.teardown().await;
}

#[tokio::test(start_paused = true)]
async fn test_submit_rejection_returns_to_idle_and_keeps_edits() {
    let api = StubApi::new(vec![schema_v1()]);
    api.fail_trigger.store(true, Ordering::SeqCst);

    let mut session = start_session(&api, "1.0", None).await;
    session
        .edit("web", "LOG_LEVEL", FieldValue::from("debug"))
        .unwrap();

    let err = session.submit().await.unwrap_err();
    assert!(matches!(err, ConsoleError::SubmitError(_)));

    // Back to Idle with the edits and the rejection reason kept
    assert_eq!(session.phase(), LifecyclePhase::Idle);
    assert_eq!(
        session.form().get("web", "LOG_LEVEL"),
        Some(&FieldValue::from("debug"))
    );
    let rejection = session.last_rejection().unwrap();
    assert!(rejection.contains("triggering deploy"));

    // The record was still created; a retry must not create another
    assert_eq!(session.deployment_id(), Some(api.record_id));

    api.fail_trigger.store(false, Ordering::SeqCst);
    api.queue_statuses(vec![Ok(success("ok"))]);

    let mut rx = session.subscribe();
    session.submit().await.expect("retry should be accepted");
    let snapshot = await_terminal(&mut rx).await;

    assert_eq!(snapshot.phase, LifecyclePhase::Succeeded);
    assert_eq!(api.create_calls.load(Ordering::SeqCst), 1);
    assert_eq!(api.trigger_calls.load(Ordering::SeqCst), 2);

    session.teardown().await;
}

#[tokio::test(start_paused = true)]
async fn test_submit_while_in_flight_is_rejected() {
    let api = StubApi::new(vec![schema_v1()]);
    // Empty queue: the stub reports in_process forever

    let mut session = start_session(&api, "1.0", None).await;
    assert_ok!(session.submit().await);
    assert_eq!(session.phase(), LifecyclePhase::Polling);

    let err = assert_err!(session.submit().await);
    assert!(matches!(err, ConsoleError::DeployInFlight));
    assert_eq!(session.phase(), LifecyclePhase::Polling);

    session.teardown().await;
}

#[tokio::test(start_paused = true)]
async fn test_switch_version_merges_persisted_over_new_schema() {
    let api = StubApi::new(vec![schema_v1(), schema_v2()]);
    api.queue_statuses(vec![Ok(success("deployed"))]);

    let mut session = start_session(&api, "1.0", None).await;
    session
        .edit("web", "LOG_LEVEL", FieldValue::from("debug"))
        .unwrap();

    let mut rx = session.subscribe();
    session.submit().await.unwrap();
    let snapshot = await_terminal(&mut rx).await;
    assert_eq!(snapshot.phase, LifecyclePhase::Succeeded);

    let id_before = session.deployment_id();
    session.switch_version("2.0").await.unwrap();

    // Same record, new version, lifecycle re-armed
    assert_eq!(session.deployment_id(), id_before);
    assert_eq!(session.version(), "2.0");
    assert_eq!(session.phase(), LifecyclePhase::Idle);

    // Persisted values win field-by-field; dropped fields vanish; new
    // fields take the new schema's defaults
    let form = session.form();
    assert_eq!(form.len(), 2);
    assert_eq!(form.get("web", "LOG_LEVEL"), Some(&FieldValue::from("debug")));
    assert_eq!(form.get("web", "RETRIES"), Some(&FieldValue::from("3")));
    assert_eq!(form.get("web", "API_URL"), None);

    // The last known status is left as it was
    let snapshot = session.subscribe().borrow().clone();
    assert_eq!(snapshot.status.status, StatusKind::Success);

    session.teardown().await;
}

#[tokio::test(start_paused = true)]
async fn test_switch_version_while_polling_is_rejected() {
    let api = StubApi::new(vec![schema_v1(), schema_v2()]);

    let mut session = start_session(&api, "1.0", None).await;
    assert_ok!(session.submit().await);

    let err = assert_err!(session.switch_version("2.0").await);
    assert!(matches!(err, ConsoleError::DeployInFlight));
    assert_eq!(session.version(), "1.0");
    assert_eq!(session.phase(), LifecyclePhase::Polling);

    session.teardown().await;
}

#[tokio::test(start_paused = true)]
async fn test_teardown_cancels_polling() {
    let api = StubApi::new(vec![schema_v1()]);
    // in_process forever; only teardown can stop this poller

    let mut session = start_session(&api, "1.0", None).await;
    let mut rx = session.subscribe();
    session.submit().await.unwrap();

    sleep(Duration::from_secs(5)).await;
    assert!(api.status_calls() >= 1);

    session.teardown().await;
    let calls_at_teardown = api.status_calls();

    // No further polls land after teardown, ever
    sleep(Duration::from_secs(120)).await;
    assert_eq!(api.status_calls(), calls_at_teardown);

    // The channel closed with the session: once the backlog is drained,
    // waiting for another change reports closure
    let last = rx.borrow_and_update().clone();
    assert!(!last.phase.is_terminal());
    assert!(rx.changed().await.is_err());
}

#[tokio::test(start_paused = true)]
async fn test_poll_failures_tolerated_until_success() {
    let api = StubApi::new(vec![schema_v1()]);
    api.queue_statuses(vec![
        Err(ConsoleError::ApiError("502: bad gateway".to_string())),
        Err(ConsoleError::ApiError("502: bad gateway".to_string())),
        Ok(success("recovered")),
    ]);

    let mut session = start_session(&api, "1.0", None).await;
    let mut rx = session.subscribe();
    session.submit().await.unwrap();

    let snapshot = await_terminal(&mut rx).await;
    assert_eq!(snapshot.phase, LifecyclePhase::Succeeded);
    assert_eq!(api.status_calls(), 3);

    session.teardown().await;
}

#[tokio::test(start_paused = true)]
async fn test_poll_gives_up_after_failure_budget() {
    let api = StubApi::new(vec![schema_v1()]);
    api.fail_all_status.store(true, Ordering::SeqCst);

    let mut session = DeploySession::initialize(
        api.clone() as Arc<dyn DeployApi>,
        creds(),
        poller::Options {
            max_consecutive_failures: 3,
            ..Default::default()
        },
        "demo",
        "1.0",
        None,
    )
    .await
    .unwrap();

    let mut rx = session.subscribe();
    session.submit().await.unwrap();

    let snapshot = await_terminal(&mut rx).await;
    assert_eq!(snapshot.phase, LifecyclePhase::Failed);
    assert_eq!(api.status_calls(), 3);

    let info = snapshot.status.info.unwrap();
    assert!(info.message.unwrap().contains("lost contact"));
    assert!(info.detail.unwrap().contains("connection refused"));

    session.teardown().await;
}

#[tokio::test]
async fn test_version_picker_lists_and_validates() {
    let api = StubApi::new(vec![schema_v1(), schema_v2()]);
    let creds = creds();

    let picker = VersionPicker::open(api.as_ref(), creds.as_ref(), "demo")
        .await
        .unwrap();

    assert_eq!(
        picker.versions().to_vec(),
        vec!["1.0".to_string(), "2.0".to_string()]
    );
    assert_eq!(picker.select("2.0").unwrap(), "2.0");
    assert!(picker.select("9.9").is_err());
}
