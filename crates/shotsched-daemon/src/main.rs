use std::sync::Arc;

use clap::{Parser, Subcommand};
use shotsched_core::config::ShotschedConfig;
use shotsched_scheduler::{ScheduledShot, ShotScheduler, ShotStatus, ShotStore, SystemClock};
use tracing::info;

mod device;

use device::HttpDeviceClient;

/// Scheduled-shot daemon: keeps queued preheat / profile runs alive across
/// restarts and fires them at their wall-clock time.
#[derive(Debug, Parser)]
#[command(name = "shotsched", version, about)]
struct Cli {
    /// Config file (default: $SHOTSCHED_CONFIG, then ~/.shotsched/shotsched.toml).
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Restore pending shots and run the scheduler until Ctrl-C (default).
    Run,
    /// Print the pending shots currently on disk as JSON.
    Inspect {
        /// Only show shots in this status (scheduled, preheating).
        #[arg(long)]
        status: Option<ShotStatus>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "shotsched_daemon=info,shotsched_scheduler=info".into()),
        )
        .init();

    let cli = Cli::parse();

    // load config: --config > SHOTSCHED_CONFIG env > ~/.shotsched/shotsched.toml
    let config_path = cli
        .config
        .clone()
        .or_else(|| std::env::var("SHOTSCHED_CONFIG").ok());
    let config = ShotschedConfig::load(config_path.as_deref()).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        ShotschedConfig::default()
    });

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run(config).await,
        Command::Inspect { status } => inspect(&config, status),
    }
}

async fn run(config: ShotschedConfig) -> anyhow::Result<()> {
    let store = ShotStore::open(&config.store.dir_path(), &config.store.file_name);
    let device = HttpDeviceClient::new(&config.device)?;
    info!(base_url = %config.device.base_url, "device client ready");

    let scheduler = ShotScheduler::new(
        &config.scheduler,
        store,
        Arc::new(device),
        Arc::new(SystemClock),
    );
    let report = scheduler.start()?;
    info!(
        restored = report.restored,
        expired = report.expired,
        "scheduler running; press Ctrl-C to stop"
    );

    tokio::signal::ctrl_c().await?;
    scheduler.stop();
    Ok(())
}

/// Read-only view of the store. Safe while a daemon is writing it.
fn inspect(config: &ShotschedConfig, status: Option<ShotStatus>) -> anyhow::Result<()> {
    let primary = config.store.dir_path().join(&config.store.file_name);
    let path = if primary.exists() {
        primary
    } else {
        ShotStore::fallback_dir().join(&config.store.file_name)
    };
    info!(path = %path.display(), "inspecting store");
    let shots = with_status(ShotStore::with_path(path).peek()?, status);
    println!("{}", serde_json::to_string_pretty(&shots)?);
    Ok(())
}

fn with_status(shots: Vec<ScheduledShot>, status: Option<ShotStatus>) -> Vec<ScheduledShot> {
    match status {
        Some(status) => shots.into_iter().filter(|s| s.status == status).collect(),
        None => shots,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use shotsched_scheduler::ShotId;

    fn shot(status: ShotStatus) -> ScheduledShot {
        ScheduledShot {
            id: ShotId::new(),
            profile_id: Some("p1".to_string()),
            scheduled_time: Utc::now(),
            preheat: true,
            status,
            created_at: Utc::now(),
            error: None,
            finished_at: None,
        }
    }

    #[test]
    fn inspect_parses_status_filter() {
        let cli = Cli::try_parse_from(["shotsched", "inspect", "--status", "preheating"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Command::Inspect {
                status: Some(ShotStatus::Preheating)
            })
        ));
        assert!(Cli::try_parse_from(["shotsched", "inspect", "--status", "missed"]).is_err());
    }

    #[test]
    fn status_filter_keeps_matching_shots() {
        let shots = vec![shot(ShotStatus::Scheduled), shot(ShotStatus::Preheating)];
        let preheating = with_status(shots.clone(), Some(ShotStatus::Preheating));
        assert_eq!(preheating, vec![shots[1].clone()]);
        assert_eq!(with_status(shots.clone(), None), shots);
    }
}
