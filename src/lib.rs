#![doc = include_str!("../README.md")]

pub mod assembly;
pub mod clean;
pub mod cli;
pub mod export;
pub mod filter;
pub mod harmonize;
pub mod liftover;
pub mod pipeline;
pub mod record;
pub mod remote;
pub mod report;
pub mod smart_reader;
pub mod sumstats;

pub use assembly::{Build, GenomeBuild, Hg19, Hg38};
pub use liftover::{ChainMap, ChainSet, LiftoverError, TieBreak};
pub use pipeline::{BatchSummary, FileOutcome, FileReport, Pipeline, PipelineConfig};
pub use record::{Chromosome, Coordinate, Table, VariantRecord};
