//! voicegate supervisor binary.
//!
//! Runs the session handler and the token service together and stops both
//! when either exits or the operator sends SIGINT/SIGTERM.

use std::process::ExitCode;
use tracing_subscriber::EnvFilter;
use voicegate_supervisor::{config, Launch, ShutdownSignal, Supervisor};

fn resolve_config_path() -> (Option<String>, &'static str) {
    if let Some(path) = std::env::args()
        .nth(1)
        .filter(|value| !value.trim().is_empty())
    {
        return (Some(path), "cli-arg");
    }

    if let Ok(path) = std::env::var("VOICEGATE_CONFIG_PATH") {
        if !path.trim().is_empty() {
            return (Some(path), "env-var");
        }
    }

    (None, "default")
}

#[tokio::main]
async fn main() -> ExitCode {
    let (resolved_config_path, config_source) = resolve_config_path();
    let selected_config_path = resolved_config_path.as_deref().or(Some("voicegate.toml"));

    let config = match config::load_config(selected_config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("failed to load configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    let filter =
        EnvFilter::try_new(&config.logging.level).unwrap_or_else(|_| EnvFilter::new("info"));

    if config.logging.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    tracing::info!(
        source = config_source,
        path = selected_config_path.unwrap_or("<none>"),
        "resolved startup configuration path"
    );

    if let Err(e) = config.validate() {
        tracing::error!(error = %e, "refusing to start supervisor");
        return ExitCode::FAILURE;
    }

    let mut shutdown = match ShutdownSignal::install() {
        Ok(shutdown) => shutdown,
        Err(e) => {
            tracing::error!(error = %e, "failed to install signal handlers");
            return ExitCode::FAILURE;
        }
    };

    let launchers: Vec<Box<dyn Launch>> = config
        .process_specs()
        .into_iter()
        .map(|spec| Box::new(spec) as Box<dyn Launch>)
        .collect();

    tracing::info!(
        units = launchers.len(),
        grace_period_seconds = config.supervisor.grace_period_seconds,
        "starting voicegate"
    );

    let supervisor = Supervisor::new(config.grace_period());
    let outcome = supervisor
        .run(launchers, async move {
            shutdown.recv().await;
        })
        .await;

    for report in &outcome.units {
        tracing::info!(
            unit = %report.name,
            state = %report.state,
            pid = ?report.pid,
            exit = ?report.exit,
            "unit final state"
        );
    }

    match outcome.failure {
        None => {
            tracing::info!("voicegate shut down cleanly");
            ExitCode::SUCCESS
        }
        Some(failure) => {
            tracing::error!(unit = failure.unit(), "voicegate stopped: {failure}");
            ExitCode::FAILURE
        }
    }
}
