//! Run configuration: the SUT list and report destination.

use anyhow::Context;
use conformance_types::SutConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};

fn default_report_dir() -> PathBuf {
    PathBuf::from("reports")
}

/// Top-level configuration file. One run drives every listed SUT in order.
#[derive(Debug, Deserialize)]
pub struct RunConfig {
    pub suts: Vec<SutConfig>,

    /// Directory receiving the text, CSV, and JSON reports.
    #[serde(default = "default_report_dir")]
    pub report_dir: PathBuf,
}

impl RunConfig {
    /// Loads the JSON run configuration. A missing or malformed file is a
    /// fatal startup error, never a silent default.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading configuration {}", path.display()))?;
        let config: RunConfig = serde_json::from_str(&contents)
            .with_context(|| format!("parsing configuration {}", path.display()))?;
        if config.suts.is_empty() {
            anyhow::bail!(
                "configuration {} lists no systems under test",
                path.display()
            );
        }
        Ok(config)
    }
}
