//! Stevedore Console - Entry Point
//!
//! A console for configuring and launching deployments of pre-packaged
//! applications against the stevedore records and deploy services.

use std::collections::HashMap;
use std::env;
use std::sync::Arc;

use stevedore::app::options::AppOptions;
use stevedore::app::run::{
    parse_set_values, run_apps, run_delete, run_deploy, run_describe, run_list, run_status,
    run_versions, RunContext,
};
use stevedore::authn::credentials::StaticCredentials;
use stevedore::errors::ConsoleError;
use stevedore::http::client::ApiClient;
use stevedore::logs::{init_logging, LogOptions};
use stevedore::models::deployment::DeploymentId;
use stevedore::storage::layout::StorageLayout;
use stevedore::storage::settings::Settings;
use stevedore::utils::version_info;

use tracing::error;

#[tokio::main]
async fn main() {
    // Parse command line arguments
    let args: Vec<String> = env::args().collect();
    let mut cli_args: HashMap<String, String> = HashMap::new();
    let mut set_values: Vec<String> = Vec::new();

    for arg in args.iter().skip(1) {
        if let Some((key, value)) = arg.split_once('=') {
            // Handle --key=value format; --set may repeat
            let clean_key = key.trim_start_matches('-');
            if clean_key == "set" {
                set_values.push(value.to_string());
            } else {
                cli_args.insert(clean_key.to_string(), value.to_string());
            }
        } else if arg.starts_with("--") {
            // Handle standalone flags like --version
            let clean_key = arg.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), "true".to_string());
        }
    }

    // Print version and exit
    let version = version_info();
    if cli_args.contains_key("version") {
        println!("{}", serde_json::to_string_pretty(&version).unwrap());
        return;
    }

    if cli_args.contains_key("help") || cli_args.is_empty() {
        print_usage();
        return;
    }

    // Retrieve the settings file, if one exists
    let layout = StorageLayout::default();
    let settings_file = layout.settings_file();
    let settings = if settings_file.exists().await {
        match settings_file.read_json::<Settings>().await {
            Ok(settings) => settings,
            Err(e) => {
                eprintln!("Unable to read settings file: {}", e);
                return;
            }
        }
    } else {
        Settings::default()
    };

    // Initialize logging
    if settings.log_to_file {
        if let Err(e) = layout.logs_dir().create().await {
            eprintln!("Failed to create log directory: {e}");
        }
    }
    let log_options = LogOptions {
        log_level: cli_args
            .get("log-level")
            .and_then(|s| s.parse().ok())
            .unwrap_or_else(|| settings.log_level.clone()),
        log_dir: settings
            .log_to_file
            .then(|| layout.logs_dir().path().to_path_buf()),
        json_format: settings.json_logs,
        ..Default::default()
    };
    let _log_guard = match init_logging(log_options) {
        Ok(guard) => guard,
        Err(e) => {
            println!("Failed to initialize logging: {e}");
            None
        }
    };

    // Store credentials and exit
    if cli_args.contains_key("login") {
        if let Err(e) = login(&layout, &cli_args).await {
            error!("Login failed: {e}");
            std::process::exit(1);
        }
        println!("Credentials stored in {:?}", layout.credentials_file().path());
        return;
    }

    // Everything below talks to the services
    let credentials = match load_credentials(&layout).await {
        Ok(credentials) => Arc::new(credentials),
        Err(e) => {
            error!("Not logged in: {e}");
            error!("Run: stevedore --login --user=<name> --token=<bearer>");
            std::process::exit(1);
        }
    };

    let options = AppOptions::from_settings(&settings);
    let api = match ApiClient::new(&options.records_base_url, &options.deploy_base_url) {
        Ok(api) => Arc::new(api),
        Err(e) => {
            error!("Failed to build the API client: {e}");
            std::process::exit(1);
        }
    };
    let ctx = RunContext {
        api,
        credentials,
        options,
    };

    let result = dispatch(&ctx, &cli_args, &set_values).await;
    if let Err(e) = result {
        error!("{e}");
        std::process::exit(1);
    }
}

async fn dispatch(
    ctx: &RunContext,
    cli_args: &HashMap<String, String>,
    set_values: &[String],
) -> Result<(), ConsoleError> {
    if cli_args.contains_key("apps") {
        return run_apps(ctx).await;
    }

    if cli_args.contains_key("versions") {
        let app = require_arg(cli_args, "app")?;
        return run_versions(ctx, app).await;
    }

    if cli_args.contains_key("list") {
        return run_list(ctx).await;
    }

    if cli_args.contains_key("describe") {
        let app = require_arg(cli_args, "app")?;
        let version = require_arg(cli_args, "app-version")?;
        let id = optional_deployment_id(cli_args)?;
        return run_describe(ctx, app, version, id).await;
    }

    if cli_args.contains_key("deploy") {
        let app = require_arg(cli_args, "app")?;
        let version = require_arg(cli_args, "app-version")?;
        let id = optional_deployment_id(cli_args)?;
        let sets = parse_set_values(set_values)?;
        return run_deploy(ctx, app, version, id, &sets).await;
    }

    if cli_args.contains_key("status") {
        let id = require_deployment_id(cli_args)?;
        return run_status(ctx, id).await;
    }

    if cli_args.contains_key("delete") {
        let id = require_deployment_id(cli_args)?;
        return run_delete(ctx, id).await;
    }

    print_usage();
    Ok(())
}

fn require_arg<'a>(
    cli_args: &'a HashMap<String, String>,
    key: &str,
) -> Result<&'a str, ConsoleError> {
    cli_args
        .get(key)
        .map(|s| s.as_str())
        .ok_or_else(|| ConsoleError::ConfigError(format!("missing --{}=<value>", key)))
}

fn optional_deployment_id(
    cli_args: &HashMap<String, String>,
) -> Result<Option<DeploymentId>, ConsoleError> {
    match cli_args.get("deployment-id") {
        Some(raw) => raw
            .parse::<DeploymentId>()
            .map(Some)
            .map_err(|e| ConsoleError::ValidationError(format!("bad --deployment-id: {}", e))),
        None => Ok(None),
    }
}

fn require_deployment_id(cli_args: &HashMap<String, String>) -> Result<DeploymentId, ConsoleError> {
    optional_deployment_id(cli_args)?
        .ok_or_else(|| ConsoleError::ConfigError("missing --deployment-id=<uuid>".to_string()))
}

/// Store credentials from `--user` and `--token`
async fn login(
    layout: &StorageLayout,
    cli_args: &HashMap<String, String>,
) -> Result<(), ConsoleError> {
    let user = cli_args
        .get("user")
        .ok_or_else(|| ConsoleError::ConfigError("missing --user=<name>".to_string()))?;
    let token = cli_args
        .get("token")
        .ok_or_else(|| ConsoleError::ConfigError("missing --token=<bearer>".to_string()))?;

    let credentials_file = layout.credentials_file();
    credentials_file
        .write_json(&serde_json::json!({
            "username": user,
            "token": token,
        }))
        .await?;
    credentials_file.set_permissions_600().await?;
    Ok(())
}

/// Credentials come from the environment when set, else `credentials.json`
async fn load_credentials(layout: &StorageLayout) -> Result<StaticCredentials, ConsoleError> {
    if let (Ok(user), Ok(token)) = (env::var("STEVEDORE_USER"), env::var("STEVEDORE_TOKEN")) {
        return Ok(StaticCredentials::new(user, token));
    }

    let credentials_file = layout.credentials_file();
    if !credentials_file.exists().await {
        return Err(ConsoleError::CredentialsError(format!(
            "no credentials at {:?}",
            credentials_file.path()
        )));
    }
    credentials_file.read_json::<StaticCredentials>().await
}

fn print_usage() {
    println!("stevedore - configure and launch application deployments");
    println!();
    println!("Usage:");
    println!("  stevedore --login --user=<name> --token=<bearer>");
    println!("  stevedore --apps");
    println!("  stevedore --versions --app=<name>");
    println!("  stevedore --list");
    println!("  stevedore --describe --app=<name> --app-version=<version> [--deployment-id=<uuid>]");
    println!("  stevedore --deploy --app=<name> --app-version=<version> [--deployment-id=<uuid>] [--set=container.field=value ...]");
    println!("  stevedore --status --deployment-id=<uuid>");
    println!("  stevedore --delete --deployment-id=<uuid>");
    println!("  stevedore --version");
}
