//! Per-file orchestration: discover inputs, skip finished files, and run
//! read -> clean -> harmonize -> filter -> export for the rest.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use rayon::prelude::*;
use serde::Serialize;

use crate::assembly::{Build, GenomeBuild, Hg19, Hg38};
use crate::clean::{CleanError, clean};
use crate::export::{OutputLayout, UploadOutcome, write_outputs};
use crate::filter::{ExclusionRegion, exclude_rare, exclude_region};
use crate::harmonize::harmonize;
use crate::liftover::ChainSet;
use crate::record::columns;
use crate::sumstats::read_table;

/// Immutable run configuration.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineConfig {
    pub input_dir: PathBuf,
    /// File extension (without the leading dot) of the tables to process;
    /// may span several parts, as in `txt.gz`.
    pub extension: String,
    pub input_build: GenomeBuild,
    /// Root of the three output directories.
    pub output_dir: PathBuf,
    pub region: ExclusionRegion,
    pub maf_threshold: f64,
    pub critical_columns: Vec<String>,
    /// Worker threads; 0 uses every core.
    pub threads: usize,
}

impl PipelineConfig {
    pub fn new(input_dir: PathBuf, output_dir: PathBuf, input_build: GenomeBuild) -> Self {
        Self {
            input_dir,
            extension: String::from("txt"),
            input_build,
            output_dir,
            region: ExclusionRegion::mhc(),
            maf_threshold: 0.01,
            critical_columns: columns::CRITICAL.iter().map(|c| c.to_string()).collect(),
            threads: 1,
        }
    }

    pub fn layout(&self) -> OutputLayout {
        OutputLayout::under(&self.output_dir)
    }
}

/// Row counts after each stage of one file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FileReport {
    pub raw_rows: usize,
    pub malformed_lines: usize,
    pub cleaned_rows: usize,
    pub dropped_rows: usize,
    /// Rows that failed to lift into hg19 (hg38 inputs only).
    pub reference_unmapped: usize,
    pub region_excluded: usize,
    pub rare_excluded: usize,
    pub reference_rows: usize,
    /// Rows that failed to lift into hg38 (hg19 inputs only).
    pub alternate_unmapped: usize,
    pub alternate_rows: usize,
    pub upload_written: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FileOutcome {
    Completed(FileReport),
    /// A previous run already produced the hg19 output.
    Skipped,
    FailedRead { error: String },
    FailedEmpty { raw_rows: usize },
    Unusable { reason: String },
    FailedExport { error: String },
}

impl FileOutcome {
    pub fn is_failure(&self) -> bool {
        !matches!(self, Self::Completed(_) | Self::Skipped)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileResult {
    pub file: PathBuf,
    #[serde(flatten)]
    pub outcome: FileOutcome,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub files: Vec<FileResult>,
}

impl BatchSummary {
    pub fn completed(&self) -> usize {
        self.count(|o| matches!(o, FileOutcome::Completed(_)))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, FileOutcome::Skipped))
    }

    pub fn failed(&self) -> usize {
        self.count(FileOutcome::is_failure)
    }

    fn count<F>(&self, predicate: F) -> usize
    where
        F: Fn(&FileOutcome) -> bool,
    {
        self.files.iter().filter(|f| predicate(&f.outcome)).count()
    }
}

pub struct Pipeline {
    config: PipelineConfig,
    layout: OutputLayout,
    chains: Arc<ChainSet>,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, chains: Arc<ChainSet>) -> Self {
        let layout = config.layout();
        Self {
            config,
            layout,
            chains,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Input files with the configured extension, sorted by name.
    pub fn discover(&self) -> Result<Vec<PathBuf>> {
        let dir = &self.config.input_dir;
        let entries = fs::read_dir(dir)
            .with_context(|| format!("failed to read input directory {}", dir.display()))?;

        let suffix = format!(".{}", self.config.extension);
        let mut files = Vec::new();
        for entry in entries {
            let path = entry
                .with_context(|| format!("failed to list input directory {}", dir.display()))?
                .path();
            let matches = path
                .file_name()
                .is_some_and(|name| name.to_string_lossy().ends_with(&suffix));
            if matches && path.is_file() {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    /// Process every discovered file. Per-file failures are recorded in the
    /// summary; only setup failures are returned as errors.
    pub fn run(&self) -> Result<BatchSummary> {
        self.layout.create_dirs()?;
        let files = self.discover()?;
        tracing::info!(
            files = files.len(),
            input = %self.config.input_dir.display(),
            build = %self.config.input_build,
            "starting batch"
        );

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.threads)
            .build()
            .context("failed to build worker pool")?;

        let files: Vec<FileResult> = pool.install(|| {
            files
                .par_iter()
                .map(|path| FileResult {
                    file: path.clone(),
                    outcome: self.process_file(path),
                })
                .collect()
        });
        Ok(BatchSummary { files })
    }

    pub fn process_file(&self, path: &Path) -> FileOutcome {
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let span = tracing::info_span!("file", name = %file_name);
        let _guard = span.enter();

        let paths = self.layout.paths_for(output_name(&file_name));
        if paths.is_complete() {
            tracing::info!("output already present; skipping");
            return FileOutcome::Skipped;
        }

        let outcome = match self.config.input_build {
            GenomeBuild::Hg19 => self.process_as::<Hg19>(path, output_name(&file_name)),
            GenomeBuild::Hg38 => self.process_as::<Hg38>(path, output_name(&file_name)),
        };
        match &outcome {
            FileOutcome::Completed(report) => tracing::info!(
                reference_rows = report.reference_rows,
                alternate_rows = report.alternate_rows,
                "finished"
            ),
            other => tracing::warn!(outcome = ?other, "file not processed"),
        }
        outcome
    }

    fn process_as<B: Build>(&self, path: &Path, name: &str) -> FileOutcome {
        let raw = match read_table(path) {
            Ok(raw) => raw,
            Err(e) => {
                return FileOutcome::FailedRead {
                    error: e.to_string(),
                };
            }
        };
        let mut report = FileReport {
            raw_rows: raw.rows.len(),
            malformed_lines: raw.malformed_lines,
            ..FileReport::default()
        };
        tracing::info!(
            rows = report.raw_rows,
            malformed = report.malformed_lines,
            "read table"
        );

        let cleaned = match clean::<B>(raw, &self.config.critical_columns) {
            Ok(cleaned) => cleaned,
            Err(CleanError::Empty { raw_rows }) => return FileOutcome::FailedEmpty { raw_rows },
            Err(e) => {
                return FileOutcome::Unusable {
                    reason: e.to_string(),
                };
            }
        };
        report.cleaned_rows = cleaned.table.len();
        report.dropped_rows = cleaned.dropped_rows;
        tracing::info!(
            kept = report.cleaned_rows,
            dropped = report.dropped_rows,
            "cleaned"
        );

        let harmonized = harmonize(cleaned.table, &self.chains);
        report.reference_unmapped = harmonized.lift.dropped();
        if B::TAG != GenomeBuild::Hg19 {
            tracing::info!(
                kept = harmonized.reference.len(),
                unmapped = harmonized.lift.unmapped,
                ambiguous = harmonized.lift.ambiguous,
                non_canonical = harmonized.lift.non_canonical,
                "lifted to hg19"
            );
        }

        let (reference, region_excluded) = exclude_region(harmonized.reference, &self.config.region);
        let (reference, rare_excluded) = exclude_rare(reference, self.config.maf_threshold);
        report.region_excluded = region_excluded;
        report.rare_excluded = rare_excluded;
        report.reference_rows = reference.len();
        tracing::info!(
            region = %self.config.region,
            region_excluded,
            rare_excluded,
            kept = report.reference_rows,
            "filtered"
        );

        let (alternate, lift) = harmonized.alternate.resolve(&reference, &self.chains);
        report.alternate_unmapped = lift.dropped();
        report.alternate_rows = alternate.len();
        if report.alternate_unmapped > 0 {
            tracing::info!(
                unmapped = report.alternate_unmapped,
                "rows without an hg38 position"
            );
        }

        let paths = self.layout.paths_for(name);
        match write_outputs(&paths, &reference, &alternate) {
            Ok(upload) => {
                report.upload_written = upload == UploadOutcome::Written;
                FileOutcome::Completed(report)
            }
            Err(e) => FileOutcome::FailedExport {
                error: format!("{e:#}"),
            },
        }
    }
}

/// Outputs are plain text, so a gzip suffix on the input is not carried over.
fn output_name(file_name: &str) -> &str {
    file_name.strip_suffix(".gz").unwrap_or(file_name)
}
