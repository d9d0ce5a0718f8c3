//! Structured run report for downstream tool consumption.
//!
//! A JSON document holding the effective configuration and the outcome of
//! every file in the batch, with per-stage row counts.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::liftover::TieBreak;
use crate::pipeline::{BatchSummary, FileResult, PipelineConfig};

/// Complete report of a batch run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// Tool version
    pub version: String,
    /// Timestamp of run (RFC 3339)
    pub timestamp: String,

    pub config: PipelineConfig,
    pub tie_break: TieBreak,

    pub totals: Totals,
    pub files: Vec<FileResult>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Totals {
    pub discovered: usize,
    pub completed: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl From<&BatchSummary> for Totals {
    fn from(s: &BatchSummary) -> Self {
        Totals {
            discovered: s.files.len(),
            completed: s.completed(),
            skipped: s.skipped(),
            failed: s.failed(),
        }
    }
}

impl RunReport {
    pub fn new(config: &PipelineConfig, tie_break: TieBreak, summary: &BatchSummary) -> Self {
        let timestamp = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .unwrap_or_default();
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp,
            config: config.clone(),
            tie_break,
            totals: Totals::from(summary),
            files: summary.files.clone(),
        }
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("failed to serialize run report")?;
        std::fs::write(path, json)
            .with_context(|| format!("failed to write run report {}", path.display()))?;
        tracing::info!("Wrote run report to {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembly::GenomeBuild;
    use crate::pipeline::{FileOutcome, FileReport};
    use std::path::PathBuf;

    fn summary() -> BatchSummary {
        BatchSummary {
            files: vec![
                FileResult {
                    file: PathBuf::from("a.txt"),
                    outcome: FileOutcome::Completed(FileReport {
                        raw_rows: 10,
                        reference_rows: 7,
                        ..FileReport::default()
                    }),
                },
                FileResult {
                    file: PathBuf::from("b.txt"),
                    outcome: FileOutcome::Skipped,
                },
            ],
        }
    }

    #[test]
    fn report_contains_config_and_outcomes() {
        let config = PipelineConfig::new(
            PathBuf::from("in"),
            PathBuf::from("out"),
            GenomeBuild::Hg38,
        );
        let report = RunReport::new(&config, TieBreak::default(), &summary());
        let json = serde_json::to_value(&report).unwrap();

        assert_eq!(json["config"]["input_build"], "hg38");
        assert_eq!(json["config"]["region"]["start"], 28_477_797);
        assert_eq!(json["tie_break"], "best-score");
        assert_eq!(json["totals"]["completed"], 1);
        assert_eq!(json["totals"]["skipped"], 1);
        assert_eq!(json["files"][0]["status"], "completed");
        assert_eq!(json["files"][0]["reference_rows"], 7);
        assert_eq!(json["files"][1]["status"], "skipped");
        assert!(!report.timestamp.is_empty());
    }

    #[test]
    fn writes_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        let config = PipelineConfig::new(
            PathBuf::from("in"),
            PathBuf::from("out"),
            GenomeBuild::Hg19,
        );
        RunReport::new(&config, TieBreak::First, &summary())
            .write(&path)
            .unwrap();
        let parsed: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(parsed["version"], env!("CARGO_PKG_VERSION"));
    }
}
