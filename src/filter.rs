//! Exclusion-region and minor-allele-frequency filters.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use thiserror::Error;

use crate::assembly::{Build, Hg19};
use crate::record::{Chromosome, Coordinate, Table};

/// A closed interval `[start, end]` in hg19 coordinates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExclusionRegion {
    pub chromosome: Chromosome,
    pub start: u64,
    pub end: u64,
}

impl ExclusionRegion {
    pub const MHC_CHROMOSOME: u8 = 6;
    pub const MHC_START: u64 = 28_477_797;
    pub const MHC_END: u64 = 33_448_354;

    /// The extended MHC on hg19, chr6:28,477,797-33,448,354.
    pub fn mhc() -> Self {
        Self {
            chromosome: Chromosome::autosome(Self::MHC_CHROMOSOME),
            start: Self::MHC_START,
            end: Self::MHC_END,
        }
    }

    pub fn contains(&self, coordinate: &Coordinate) -> bool {
        coordinate.chromosome == self.chromosome
            && (self.start..=self.end).contains(&coordinate.position)
    }
}

impl Default for ExclusionRegion {
    fn default() -> Self {
        Self::mhc()
    }
}

impl fmt::Display for ExclusionRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}-{}", self.chromosome, self.start, self.end)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegionParseError {
    #[error("expected CHROM:START-END, got '{0}'")]
    Syntax(String),
    #[error("unknown chromosome '{0}'")]
    Chromosome(String),
    #[error("invalid bound '{0}'")]
    Bound(String),
    #[error("start {start} is after end {end}")]
    Reversed { start: u64, end: u64 },
}

impl FromStr for ExclusionRegion {
    type Err = RegionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let syntax = || RegionParseError::Syntax(s.to_string());
        let (chrom, range) = s.trim().split_once(':').ok_or_else(syntax)?;
        let (start, end) = range.split_once('-').ok_or_else(syntax)?;

        let chromosome =
            Chromosome::parse(chrom).ok_or_else(|| RegionParseError::Chromosome(chrom.to_string()))?;
        let bound = |raw: &str| {
            raw.trim()
                .replace(',', "")
                .parse::<u64>()
                .map_err(|_| RegionParseError::Bound(raw.to_string()))
        };
        let (start, end) = (bound(start)?, bound(end)?);
        if start > end {
            return Err(RegionParseError::Reversed { start, end });
        }

        Ok(Self {
            chromosome,
            start,
            end,
        })
    }
}

/// Remove rows inside `region`. Only hg19 tables are accepted, since the
/// region is defined in hg19 coordinates.
pub fn exclude_region(mut table: Table<Hg19>, region: &ExclusionRegion) -> (Table<Hg19>, usize) {
    let removed = table.retain_rows(|record| !region.contains(&record.coordinate));
    (table, removed)
}

/// Slack for `1 - eaf` rounding; `eaf = 0.9` gives a MAF of 0.09999999999999998.
pub const MAF_TOLERANCE: f64 = 1e-12;

pub fn minor_allele_frequency(eaf: f64) -> f64 {
    eaf.min(1.0 - eaf)
}

/// Remove rows whose minor allele frequency is strictly below `threshold`,
/// up to [`MAF_TOLERANCE`]. Rows without an allele frequency are kept.
pub fn exclude_rare<B: Build>(mut table: Table<B>, threshold: f64) -> (Table<B>, usize) {
    if !table.columns().contains(crate::record::columns::EAF) {
        tracing::warn!("no eaf column; skipping minor allele frequency filter");
        return (table, 0);
    }
    let removed = table.retain_rows(|record| {
        record
            .effect_allele_frequency
            .is_none_or(|eaf| minor_allele_frequency(eaf) + MAF_TOLERANCE >= threshold)
    });
    (table, removed)
}
