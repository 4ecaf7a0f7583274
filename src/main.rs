use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use shiftsync::cli::{Cli, Command};
use shiftsync::config::ShiftSyncConfig;
use shiftsync::scrape::plan_units;
use shiftsync::state_machine::OrchestrationStatus;
use shiftsync::{demo, logging, ui};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let mut config = ShiftSyncConfig::load()?;
    cli.apply_overrides(&mut config);
    debug!(?config, "configuration loaded");

    match cli.command {
        Command::Plan { start, months } => {
            let units = plan_units(config.schedule_path.trim_end_matches('/'), start, months);
            ui::print_plan(&units);
        }
        Command::Demo => {
            let cancel = CancellationToken::new();
            let ctrl_c = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("interrupt received, cancelling run");
                    ctrl_c.cancel();
                }
            });

            let report = demo::run(&config, Arc::new(ui::RunProgress::new()), &cancel).await?;
            ui::print_report(&report);
            if report.status == OrchestrationStatus::Failed {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
