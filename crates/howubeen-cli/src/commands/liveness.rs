use std::time::Duration;

use chrono::{DateTime, Utc};
use clap::Subcommand;
use tracing::info;

use super::{print_json, CmdResult, Context};

#[derive(Subcommand)]
pub enum LivenessAction {
    /// Run one sweep over all users
    Sweep {
        /// Evaluate as of this RFC 3339 time instead of now
        #[arg(long)]
        at: Option<DateTime<Utc>>,
    },
    /// Sweep on an interval until interrupted
    Watch {
        /// Minutes between sweeps (defaults to liveness.sweep_interval_minutes)
        #[arg(long)]
        interval_minutes: Option<u64>,
    },
    /// Show a user's current classification
    Status {
        /// User ID
        user: String,
    },
}

pub async fn run(ctx: &Context, action: LivenessAction) -> CmdResult {
    let monitor = ctx.monitor()?;
    match action {
        LivenessAction::Sweep { at } => {
            let report = monitor.sweep(at.unwrap_or_else(Utc::now)).await?;
            print_json(&report)?;
        }
        LivenessAction::Watch { interval_minutes } => {
            let interval = interval_minutes
                .map(|m| Duration::from_secs(m * 60))
                .unwrap_or_else(|| ctx.config.liveness.sweep_interval());
            info!(interval_secs = interval.as_secs(), "watching for inactivity");
            let shutdown = async {
                let _ = tokio::signal::ctrl_c().await;
            };
            monitor.run(interval, shutdown).await;
        }
        LivenessAction::Status { user } => match monitor.status(&user, Utc::now()).await? {
            Some(status) => print_json(&status)?,
            None => {
                eprintln!("unknown user: {user}");
                std::process::exit(1);
            }
        },
    }
    Ok(())
}
