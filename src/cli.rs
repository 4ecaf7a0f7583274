//! Command-line interface built on clap.
//!
//! Subcommands are [`Command::Plan`] and [`Command::Demo`]. The global flags
//! override values from `shiftsync.toml`.

use clap::{Parser, Subcommand};

use crate::config::ShiftSyncConfig;
use crate::scrape::YearMonth;

/// Schedule import pipeline with a rate-limited external scraper.
#[derive(Debug, Parser)]
#[command(name = "shiftsync", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enables debug logging.
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,

    /// Concurrent scrape workers.
    #[arg(long, global = true)]
    pub workers: Option<usize>,

    /// Minimum milliseconds between two upstream requests.
    #[arg(long, global = true)]
    pub rate_limit_ms: Option<u64>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Prints the unit addresses a batch would fetch.
    Plan {
        /// First month, as YYYY-MM.
        #[arg(long)]
        start: YearMonth,

        /// Number of consecutive months.
        #[arg(long, default_value_t = 1)]
        months: usize,
    },

    /// Runs a full orchestration against a simulated upstream.
    Demo,
}

impl Cli {
    /// Applies the global flags on top of a loaded configuration.
    pub fn apply_overrides(&self, config: &mut ShiftSyncConfig) {
        if let Some(workers) = self.workers {
            config.max_workers = workers;
        }
        if let Some(ms) = self.rate_limit_ms {
            config.rate_limit_ms = ms;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_parses_plan_subcommand() {
        let cli = Cli::try_parse_from(["shiftsync", "plan", "--start", "2025-11", "--months", "3"])
            .unwrap();
        match cli.command {
            Command::Plan { start, months } => {
                assert_eq!(start, YearMonth::new(2025, 11).unwrap());
                assert_eq!(months, 3);
            }
            _ => panic!("expected Plan command"),
        }
    }

    #[test]
    fn cli_rejects_bad_month() {
        assert!(Cli::try_parse_from(["shiftsync", "plan", "--start", "2025-13"]).is_err());
        assert!(Cli::try_parse_from(["shiftsync", "plan"]).is_err());
    }

    #[test]
    fn cli_parses_global_flags() {
        let cli = Cli::try_parse_from([
            "shiftsync",
            "--workers",
            "2",
            "--rate-limit-ms",
            "50",
            "--verbose",
            "demo",
        ])
        .unwrap();
        assert!(cli.verbose);
        assert!(matches!(cli.command, Command::Demo));

        let mut config = ShiftSyncConfig::default();
        cli.apply_overrides(&mut config);
        assert_eq!(config.max_workers, 2);
        assert_eq!(config.rate_limit_ms, 50);
    }

    #[test]
    fn overrides_leave_unset_values() {
        let cli = Cli::try_parse_from(["shiftsync", "demo"]).unwrap();
        let mut config = ShiftSyncConfig::default();
        cli.apply_overrides(&mut config);
        assert_eq!(config.max_workers, 5);
        assert_eq!(config.rate_limit_ms, 1000);
    }

    #[test]
    fn cli_verify() {
        Cli::command().debug_assert();
    }
}
