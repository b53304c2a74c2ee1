//! Console actions driven by the command line
//!
//! Each action is one user-facing verb: list the catalog, describe a
//! version's form, deploy, check status, delete. The deploy action drives a
//! full session and watches it to a terminal phase.

use std::sync::Arc;

use colored::Colorize;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::app::options::AppOptions;
use crate::authn::credentials::CredentialSource;
use crate::errors::ConsoleError;
use crate::form::render::{form_controls, InputControl};
use crate::http::api::DeployApi;
use crate::http::client::ApiClient;
use crate::models::deployment::{DeploymentId, DeploymentStatus, StatusKind};
use crate::models::schema::{AppSchema, FieldKind, FieldValue};
use crate::session::controller::{DeploySession, SessionSnapshot};
use crate::session::fsm::LifecyclePhase;
use crate::session::versions::VersionPicker;

/// Everything an action needs
pub struct RunContext {
    pub api: Arc<ApiClient>,
    pub credentials: Arc<dyn CredentialSource>,
    pub options: AppOptions,
}

impl RunContext {
    fn deploy_api(&self) -> Arc<dyn DeployApi> {
        self.api.clone() as Arc<dyn DeployApi>
    }
}

/// One `--set=container.field=value` assignment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetValue {
    pub container: String,
    pub field: String,
    pub raw: String,
}

/// Parse `container.field=value` assignments
pub fn parse_set_values(raw_values: &[String]) -> Result<Vec<SetValue>, ConsoleError> {
    let mut sets = Vec::new();

    for raw in raw_values {
        let (target, value) = raw.split_once('=').ok_or_else(|| {
            ConsoleError::ValidationError(format!(
                "--set expects container.field=value, got {:?}",
                raw
            ))
        })?;
        let (container, field) = target.split_once('.').ok_or_else(|| {
            ConsoleError::ValidationError(format!(
                "--set expects container.field=value, got {:?}",
                raw
            ))
        })?;
        if container.is_empty() || field.is_empty() {
            return Err(ConsoleError::ValidationError(format!(
                "--set expects container.field=value, got {:?}",
                raw
            )));
        }

        sets.push(SetValue {
            container: container.to_string(),
            field: field.to_string(),
            raw: value.to_string(),
        });
    }

    Ok(sets)
}

/// Turn a raw CLI string into the value the field's type calls for
fn coerce_value(schema: &AppSchema, set: &SetValue) -> Result<FieldValue, ConsoleError> {
    let field = schema.field(&set.container, &set.field).ok_or_else(|| {
        ConsoleError::ValidationError(format!("unknown field {}.{}", set.container, set.field))
    })?;

    match &field.kind {
        FieldKind::Boolean => match set.raw.as_str() {
            "true" => Ok(FieldValue::Toggle(true)),
            "false" => Ok(FieldValue::Toggle(false)),
            other => Err(ConsoleError::ValidationError(format!(
                "{}.{} is a toggle; expected true or false, got {:?}",
                set.container, set.field, other
            ))),
        },
        _ => Ok(FieldValue::Text(set.raw.clone())),
    }
}

/// List the applications on offer
pub async fn run_apps(ctx: &RunContext) -> Result<(), ConsoleError> {
    let token = ctx.credentials.access_token().await?;
    let applications = ctx.api.list_applications(&token).await?;

    if applications.is_empty() {
        println!("No applications available");
        return Ok(());
    }

    for application in applications {
        println!("{}", application);
    }
    Ok(())
}

/// List the versions available for one application
pub async fn run_versions(ctx: &RunContext, application_name: &str) -> Result<(), ConsoleError> {
    let picker = VersionPicker::open(
        ctx.api.as_ref(),
        ctx.credentials.as_ref(),
        application_name,
    )
    .await?;

    if picker.versions().is_empty() {
        println!("No versions available for {}", application_name);
        return Ok(());
    }

    for version in picker.versions() {
        println!("{}", version);
    }
    Ok(())
}

/// List deployments owned by the current user
pub async fn run_list(ctx: &RunContext) -> Result<(), ConsoleError> {
    let token = ctx.credentials.access_token().await?;
    let owner = ctx.credentials.username();
    let deployments = ctx.api.list_deployments(&token, owner).await?;

    if deployments.is_empty() {
        println!("No deployments for {}", owner);
        return Ok(());
    }

    for deployment in deployments {
        println!(
            "{}  {} {}",
            deployment.deployment_id, deployment.application_name, deployment.version
        );
    }
    Ok(())
}

/// Show the configuration form for one application version
pub async fn run_describe(
    ctx: &RunContext,
    application_name: &str,
    version: &str,
    deployment_id: Option<DeploymentId>,
) -> Result<(), ConsoleError> {
    let session = DeploySession::initialize(
        ctx.deploy_api(),
        ctx.credentials.clone(),
        ctx.options.poller.clone(),
        application_name,
        version,
        deployment_id,
    )
    .await?;

    println!(
        "{} {}",
        session.application_name().bold(),
        session.version()
    );
    print_controls(&session);

    session.teardown().await;
    Ok(())
}

fn print_controls(session: &DeploySession) {
    let mut last_container = String::new();

    for control in form_controls(session.schema(), session.form()) {
        if control.container != last_container {
            println!("{}", control.container.bold());
            last_container = control.container.clone();
        }

        let rendered = match &control.control {
            InputControl::Text { value } => format!("text    {:?}", value),
            InputControl::Toggle { on } => format!("toggle  {}", on),
            InputControl::Select { options, selected } => {
                format!("select  {:?} of {:?}", selected, options)
            }
        };

        match &control.hint {
            Some(hint) => println!("  {:<24} {}  ({})", control.field, rendered, hint.dimmed()),
            None => println!("  {:<24} {}", control.field, rendered),
        }
    }
}

/// Configure and deploy one application version, watching it to a verdict
pub async fn run_deploy(
    ctx: &RunContext,
    application_name: &str,
    version: &str,
    deployment_id: Option<DeploymentId>,
    sets: &[SetValue],
) -> Result<(), ConsoleError> {
    let mut session = DeploySession::initialize(
        ctx.deploy_api(),
        ctx.credentials.clone(),
        ctx.options.poller.clone(),
        application_name,
        version,
        deployment_id,
    )
    .await?;

    for set in sets {
        let value = coerce_value(session.schema(), set)?;
        session.edit(&set.container, &set.field, value)?;
    }

    print_controls(&session);

    let mut rx = session.subscribe();
    if let Err(e) = session.submit().await {
        session.teardown().await;
        return Err(e);
    }
    println!(
        "Deploy accepted for {} {}, watching status...",
        application_name, version
    );

    let verdict = tokio::select! {
        verdict = watch_to_verdict(&mut rx) => verdict,
        _ = tokio::signal::ctrl_c() => {
            warn!("interrupted, tearing the session down");
            session.teardown().await;
            return Err(ConsoleError::DeployError("interrupted while polling".to_string()));
        }
    };

    let deployment_id = session.deployment_id();
    session.teardown().await;

    match verdict {
        Some((LifecyclePhase::Succeeded, status)) => {
            println!("{}", "Deployment succeeded".green().bold());
            print_status_info(&status);
            Ok(())
        }
        Some((_, status)) => {
            println!("{}", "Deployment failed".red().bold());
            print_status_info(&status);
            Err(ConsoleError::DeployError(format!(
                "deployment {} failed",
                deployment_id.map(|id| id.to_string()).unwrap_or_default()
            )))
        }
        None => Err(ConsoleError::Internal(
            "session closed before a verdict".to_string(),
        )),
    }
}

/// Follow snapshots until the lifecycle reaches a terminal phase
async fn watch_to_verdict(
    rx: &mut watch::Receiver<SessionSnapshot>,
) -> Option<(LifecyclePhase, DeploymentStatus)> {
    loop {
        let snapshot = rx.borrow_and_update().clone();
        if snapshot.phase.is_terminal() {
            return Some((snapshot.phase, snapshot.status));
        }

        info!("deployment status: {:?}", snapshot.status.status);
        if rx.changed().await.is_err() {
            return None;
        }
    }
}

fn print_status_info(status: &DeploymentStatus) {
    if let Some(info) = &status.info {
        if let Some(message) = &info.message {
            println!("  {}", message);
        }
        if let Some(detail) = &info.detail {
            println!("  {}", detail.dimmed());
        }
    }
}

/// Print the current status of a deployment
pub async fn run_status(ctx: &RunContext, id: DeploymentId) -> Result<(), ConsoleError> {
    let token = ctx.credentials.access_token().await?;
    let status = ctx.api.fetch_status(&token, id).await?;

    let kind = match status.status {
        StatusKind::Success => "success".green().to_string(),
        StatusKind::Failed => "failed".red().to_string(),
        StatusKind::InProcess => "in_process".yellow().to_string(),
        StatusKind::Unknown => "unknown".dimmed().to_string(),
    };
    println!("{}  {}", id, kind);
    print_status_info(&status);
    Ok(())
}

/// Uninstall a deployment and delete its record
pub async fn run_delete(ctx: &RunContext, id: DeploymentId) -> Result<(), ConsoleError> {
    let token = ctx.credentials.access_token().await?;

    match ctx.api.trigger_uninstall(&token, id).await {
        Ok(accepted) => info!("uninstall accepted for {}: {}", id, accepted.msg),
        // The record may never have been deployed; deleting it still makes sense
        Err(ConsoleError::NotFound(_)) => {
            warn!("deploy service has nothing running for {}", id)
        }
        Err(e) => return Err(e),
    }

    ctx.api.delete_deployment(&token, id).await?;
    println!("Deleted {}", id);
    Ok(())
}
