use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt};

use crate::{
    assembly::GenomeBuild,
    filter::ExclusionRegion,
    liftover::{ChainRegistry, ChainSet, TieBreak},
    pipeline::{BatchSummary, FileOutcome, Pipeline, PipelineConfig},
    record::columns,
    report::RunReport,
};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Clean GWAS summary statistics and harmonize them to hg19 and hg38",
    long_about = None
)]
struct Cli {
    /// Directory holding the summary-statistics tables
    #[arg(value_name = "INPUT_DIR", default_value = "./0.Raw/Fin")]
    input_dir: PathBuf,

    /// Extension of the tables to process
    #[arg(long, default_value = "txt")]
    extension: String,

    /// Genome build of the input coordinates
    #[arg(long, value_enum, default_value_t = GenomeBuild::Hg38)]
    input_build: GenomeBuild,

    /// Root directory for the 1.hg19, 2.hg38 and 3.FUMA outputs
    #[arg(long, value_name = "DIR", default_value = ".")]
    output_dir: PathBuf,

    /// Region to exclude, in hg19 coordinates (inclusive)
    #[arg(long, value_name = "CHROM:START-END", default_value_t = ExclusionRegion::mhc())]
    region: ExclusionRegion,

    /// Minimum minor allele frequency to keep
    #[arg(long, default_value_t = 0.01, value_parser = parse_maf_threshold)]
    maf_threshold: f64,

    /// Columns that must be non-missing for a row to be kept
    #[arg(long, value_delimiter = ',', default_values_t = columns::CRITICAL.map(String::from))]
    critical_columns: Vec<String>,

    /// How to choose between overlapping chain blocks
    #[arg(long, value_enum, default_value_t = TieBreak::BestScore)]
    tie_break: TieBreak,

    /// hg19 -> hg38 chain file. Downloaded from UCSC if omitted.
    #[arg(long, value_name = "CHAIN")]
    chain_hg19_to_hg38: Option<PathBuf>,

    /// hg38 -> hg19 chain file. Downloaded from UCSC if omitted.
    #[arg(long, value_name = "CHAIN")]
    chain_hg38_to_hg19: Option<PathBuf>,

    /// Where downloaded chain files are cached
    #[arg(long, value_name = "DIR")]
    chain_cache_dir: Option<PathBuf>,

    /// Worker threads (0 uses every core)
    #[arg(long, default_value_t = 1)]
    threads: usize,

    /// Write a JSON run report to this path
    #[arg(long, value_name = "FILE")]
    report: Option<PathBuf>,

    /// Logging verbosity (e.g. error, warn, info, debug)
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Cli {
    fn config(&self) -> PipelineConfig {
        PipelineConfig {
            input_dir: self.input_dir.clone(),
            extension: self.extension.trim_start_matches('.').to_string(),
            input_build: self.input_build,
            output_dir: self.output_dir.clone(),
            region: self.region.clone(),
            maf_threshold: self.maf_threshold,
            critical_columns: self.critical_columns.clone(),
            threads: self.threads,
        }
    }

    fn chains(&self) -> Result<ChainSet> {
        let mut registry = None;
        let mut resolve = |explicit: &Option<PathBuf>, source: GenomeBuild| -> Result<PathBuf> {
            if let Some(path) = explicit {
                return Ok(path.clone());
            }
            let registry = match &mut registry {
                Some(registry) => registry,
                None => registry.insert(ChainRegistry::new(self.chain_cache_dir.clone())?),
            };
            registry.chain_path(source, source.other())
        };
        let hg19_to_hg38 = resolve(&self.chain_hg19_to_hg38, GenomeBuild::Hg19)?;
        let hg38_to_hg19 = resolve(&self.chain_hg38_to_hg19, GenomeBuild::Hg38)?;
        ChainSet::load(&hg19_to_hg38, &hg38_to_hg19, self.tie_break)
    }
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level)?;

    let chains = cli.chains().context("failed to prepare liftover chains")?;
    let config = cli.config();
    let pipeline = Pipeline::new(config, Arc::new(chains));
    let summary = pipeline.run()?;
    print_summary(&summary);

    if let Some(path) = &cli.report {
        RunReport::new(pipeline.config(), cli.tie_break, &summary).write(path)?;
    }

    Ok(())
}

fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .ok();
    Ok(())
}

fn parse_maf_threshold(raw: &str) -> Result<f64, String> {
    let value: f64 = raw
        .parse()
        .map_err(|_| format!("'{raw}' is not a number"))?;
    if (0.0..=0.5).contains(&value) {
        Ok(value)
    } else {
        Err(format!("{value} is outside [0, 0.5]"))
    }
}

fn print_summary(summary: &BatchSummary) {
    println!(
        "Processed {total} files: {completed} completed, {skipped} already done, {failed} failed.",
        total = summary.files.len(),
        completed = summary.completed(),
        skipped = summary.skipped(),
        failed = summary.failed(),
    );

    for result in &summary.files {
        let name = result.file.display();
        match &result.outcome {
            FileOutcome::Completed(report) => {
                println!(
                    "  {name}: {raw} rows -> {hg19} hg19, {hg38} hg38 \
                     ({region} in region, {rare} rare)",
                    raw = report.raw_rows,
                    hg19 = report.reference_rows,
                    hg38 = report.alternate_rows,
                    region = report.region_excluded,
                    rare = report.rare_excluded,
                );
                if !report.upload_written {
                    println!("    upload table skipped: missing columns");
                }
            }
            FileOutcome::Skipped => {}
            FileOutcome::FailedRead { error } => println!("  {name}: unreadable ({error})"),
            FileOutcome::FailedEmpty { raw_rows } => {
                println!("  {name}: no rows left after cleaning ({raw_rows} read)")
            }
            FileOutcome::Unusable { reason } => println!("  {name}: unusable ({reason})"),
            FileOutcome::FailedExport { error } => println!("  {name}: export failed ({error})"),
        }
    }
}
