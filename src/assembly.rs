//! Genome assemblies and the marker types that tag a [`Table`](crate::record::Table)
//! with the coordinate system its positions are expressed in.

use std::fmt;

use clap::ValueEnum;
use serde::Serialize;

/// A reference genome coordinate system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GenomeBuild {
    /// GRCh37 / hg19. Region and frequency filtering happen in this build.
    #[value(name = "hg19", alias = "grch37")]
    Hg19,
    /// GRCh38 / hg38.
    #[value(name = "hg38", alias = "grch38")]
    Hg38,
}

impl GenomeBuild {
    pub fn other(self) -> Self {
        match self {
            Self::Hg19 => Self::Hg38,
            Self::Hg38 => Self::Hg19,
        }
    }

    /// Assembly name as used in UCSC file names (`hg19ToHg38.over.chain.gz`).
    pub fn ucsc_name(self) -> &'static str {
        match self {
            Self::Hg19 => "hg19",
            Self::Hg38 => "hg38",
        }
    }
}

impl fmt::Display for GenomeBuild {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.ucsc_name())
    }
}

/// Compile-time tag for the build a table's coordinates belong to.
pub trait Build: Send + Sync + 'static {
    const TAG: GenomeBuild;
}

/// Marker for hg19 coordinates.
#[derive(Debug)]
pub enum Hg19 {}

/// Marker for hg38 coordinates.
#[derive(Debug)]
pub enum Hg38 {}

impl Build for Hg19 {
    const TAG: GenomeBuild = GenomeBuild::Hg19;
}

impl Build for Hg38 {
    const TAG: GenomeBuild = GenomeBuild::Hg38;
}
