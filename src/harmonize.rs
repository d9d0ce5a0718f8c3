//! Build harmonization: produce the hg19 reference view of a table and,
//! after filtering, the matching hg38 view.
//!
//! Only the one liftover direction a file actually needs is ever run:
//! an hg38 input is lifted to hg19 and its hg38 view is restored from the
//! original coordinates; an hg19 input is used as-is and only the filtered
//! rows are lifted to hg38.

use serde::Serialize;

use crate::assembly::{Build, GenomeBuild, Hg19, Hg38};
use crate::liftover::{ChainMap, ChainSet, LiftoverError};
use crate::record::{Coordinate, Table, VariantRecord};

/// Rows lost in one liftover pass, by reason.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LiftStats {
    pub unmapped: usize,
    pub ambiguous: usize,
    pub non_canonical: usize,
}

impl LiftStats {
    pub fn dropped(&self) -> usize {
        self.unmapped + self.ambiguous + self.non_canonical
    }

    fn record(&mut self, error: LiftoverError) {
        match error {
            LiftoverError::Unmapped => self.unmapped += 1,
            LiftoverError::Ambiguous => self.ambiguous += 1,
            LiftoverError::ContigNotFound => self.non_canonical += 1,
        }
    }
}

/// Lift every row of `table` through `chain`, dropping rows that do not map.
/// The `original` coordinate of each row is left untouched.
pub fn lift_table<S: Build, T: Build>(table: Table<S>, chain: &ChainMap) -> (Table<T>, LiftStats) {
    let (columns, rows) = table.into_parts();
    let lifted: Vec<(VariantRecord, Result<Coordinate, LiftoverError>)> = rows
        .into_iter()
        .map(|record| {
            let mapped = chain.lift_coordinate(&record.coordinate);
            (record, mapped)
        })
        .collect();

    let mut stats = LiftStats::default();
    let mut kept = Vec::with_capacity(lifted.len());
    for (mut record, mapped) in lifted {
        match mapped {
            Ok(coordinate) => {
                record.coordinate = coordinate;
                kept.push(record);
            }
            Err(error) => {
                if error == LiftoverError::Ambiguous {
                    tracing::debug!(
                        coordinate = %record.coordinate,
                        "rejecting variant with ambiguous multi-mapping"
                    );
                }
                stats.record(error);
            }
        }
    }

    (Table::new(columns, kept), stats)
}

/// How the hg38 view will be produced once the reference view is filtered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlternatePlan {
    /// Input was hg38: put each row back at its original coordinate.
    Restore,
    /// Input was hg19: lift the filtered rows with the hg19 -> hg38 chain.
    Lift,
}

impl AlternatePlan {
    pub fn for_input(build: GenomeBuild) -> Self {
        match build {
            GenomeBuild::Hg38 => Self::Restore,
            GenomeBuild::Hg19 => Self::Lift,
        }
    }

    /// Produce the hg38 view of an already filtered reference table, so both
    /// views describe the same variants except rows that fail to lift.
    pub fn resolve(self, reference: &Table<Hg19>, chains: &ChainSet) -> (Table<Hg38>, LiftStats) {
        match self {
            Self::Restore => {
                let rows = reference
                    .rows()
                    .iter()
                    .map(|record| record.with_coordinate(record.original.clone()))
                    .collect();
                (
                    Table::new(reference.shared_columns(), rows),
                    LiftStats::default(),
                )
            }
            Self::Lift => lift_table(reference.clone(), chains.towards(GenomeBuild::Hg38)),
        }
    }
}

/// Result of [`harmonize`].
#[derive(Debug)]
pub struct Harmonized {
    /// The table in hg19 coordinates.
    pub reference: Table<Hg19>,
    pub alternate: AlternatePlan,
    /// Rows lost lifting to hg19.
    pub lift: LiftStats,
}

/// Bring a cleaned table into hg19 coordinates.
pub fn harmonize<B: Build>(table: Table<B>, chains: &ChainSet) -> Harmonized {
    let alternate = AlternatePlan::for_input(B::TAG);
    match B::TAG {
        GenomeBuild::Hg19 => {
            let (columns, rows) = table.into_parts();
            Harmonized {
                reference: Table::new(columns, rows),
                alternate,
                lift: LiftStats::default(),
            }
        }
        GenomeBuild::Hg38 => {
            let (reference, lift) = lift_table(table, chains.towards(GenomeBuild::Hg19));
            Harmonized {
                reference,
                alternate,
                lift,
            }
        }
    }
}
