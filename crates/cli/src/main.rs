//! Command-line runner for the conformance checker.
//!
//! One process drives the full check suite against each configured SUT in
//! order and writes three reports per SUT: an append-only text log, a CSV
//! with one row per assertion, and a JSON run summary.

use anyhow::Context;
use clap::Parser;
use conformance_engine::{Engine, Sut};
use conformance_ledger::{CsvTabularSink, FileTextSink, VerdictLedger};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;

use config::RunConfig;

/// Conformance checker CLI
#[derive(Parser)]
#[command(name = "redfish-conformance")]
#[command(about = "Conformance checker for Redfish-style services", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(
        short,
        long,
        env = "REDFISH_CONFORMANCE_CONFIG",
        default_value = "conformance.json"
    )]
    config: PathBuf,

    /// Report output directory (overrides the configured one)
    #[arg(short, long, env = "REDFISH_CONFORMANCE_REPORT_DIR")]
    report_dir: Option<PathBuf>,

    /// Log level
    #[arg(long, env = "REDFISH_CONFORMANCE_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Enable JSON logging
    #[arg(long, env = "REDFISH_CONFORMANCE_LOG_JSON")]
    json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| cli.log_level.clone().into());

    if cli.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    let mut run_config = RunConfig::load(&cli.config)?;
    if let Some(dir) = cli.report_dir {
        run_config.report_dir = dir;
    }
    std::fs::create_dir_all(&run_config.report_dir).with_context(|| {
        format!(
            "creating report directory {}",
            run_config.report_dir.display()
        )
    })?;

    let mut any_failed = false;
    for sut_config in run_config.suts {
        let display_name = sut_config.display_name.clone();

        // An unreachable SUT is logged and skipped; the remaining SUTs in
        // the list still run.
        let sut = match Sut::connect(sut_config).await {
            Ok(sut) => sut,
            Err(e) => {
                tracing::error!(sut = %display_name, error = %e, "could not connect, skipping");
                any_failed = true;
                continue;
            }
        };

        let file_stem = sanitize_file_stem(&display_name);
        let text_path = run_config.report_dir.join(format!("{file_stem}.log"));
        let csv_path = run_config.report_dir.join(format!("{file_stem}.csv"));
        let json_path = run_config.report_dir.join(format!("{file_stem}.json"));

        let text = FileTextSink::create(&text_path)
            .with_context(|| format!("creating text report {}", text_path.display()))?;
        let mut ledger = VerdictLedger::open(
            display_name.clone(),
            Box::new(text),
            Box::new(CsvTabularSink::new(csv_path)),
        );

        Engine::run(&sut, &mut ledger).await;
        let report = ledger.close_run();

        std::fs::write(&json_path, report.to_json()?)
            .with_context(|| format!("writing run summary {}", json_path.display()))?;
        println!("{}", report.summary_line());
        if report.tally.failed > 0 {
            any_failed = true;
        }
    }

    if any_failed {
        std::process::exit(1);
    }
    Ok(())
}

/// Report file stem derived from the display name.
fn sanitize_file_stem(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '-'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_stems_are_filesystem_safe() {
        assert_eq!(sanitize_file_stem("rack 1 (lab)"), "rack-1--lab-");
        assert_eq!(sanitize_file_stem("bmc-01"), "bmc-01");
    }
}
