//! Record cleaning: numeric coercion, completeness checks and coordinate
//! normalisation.

use std::collections::BTreeSet;
use std::sync::Arc;

use thiserror::Error;

use crate::assembly::Build;
use crate::record::{
    Chromosome, ColumnIndex, Table, VariantRecord, columns, is_missing_token, parse_frequency,
    parse_numeric, parse_position,
};
use crate::sumstats::RawTable;

/// Which of the requested critical columns a table actually has.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaCheck {
    Complete,
    /// Some critical columns are absent; only the present ones are checked.
    Partial { missing: BTreeSet<String> },
    /// None of the critical columns are present.
    Unusable,
}

pub fn check_schema(header: &[String], critical: &[String]) -> SchemaCheck {
    let missing: BTreeSet<String> = critical
        .iter()
        .filter(|column| !header.contains(column))
        .cloned()
        .collect();

    if missing.is_empty() {
        SchemaCheck::Complete
    } else if missing.len() == critical.iter().collect::<BTreeSet<_>>().len() {
        SchemaCheck::Unusable
    } else {
        SchemaCheck::Partial { missing }
    }
}

#[derive(Debug, Error)]
pub enum CleanError {
    #[error("none of the critical columns are present")]
    Unusable,
    #[error("coordinate column '{column}' is missing")]
    MissingCoordinates { column: &'static str },
    #[error("no rows left after cleaning ({raw_rows} read)")]
    Empty { raw_rows: usize },
}

/// A cleaned table and what it took to get there.
#[derive(Debug)]
pub struct Cleaned<B> {
    pub table: Table<B>,
    pub schema: SchemaCheck,
    pub raw_rows: usize,
    pub dropped_rows: usize,
}

/// Clean a raw table whose coordinates are in build `B`.
///
/// Numeric columns (`eaf beta se pval chr pos`) that fail to parse count as
/// missing, as do `eaf` values outside `[0, 1]`. Rows with a missing value in
/// any present critical column are dropped. Rows whose coordinates cannot be
/// parsed are always dropped since they cannot be lifted.
pub fn clean<B: Build>(raw: RawTable, critical: &[String]) -> Result<Cleaned<B>, CleanError> {
    let schema = check_schema(&raw.columns, critical);
    match &schema {
        SchemaCheck::Unusable => return Err(CleanError::Unusable),
        SchemaCheck::Partial { missing } => {
            tracing::warn!(
                missing = ?missing,
                "table lacks some critical columns; checking only those present"
            );
        }
        SchemaCheck::Complete => {}
    }

    let index = ColumnIndex::new(raw.columns)
        .map_err(|column| CleanError::MissingCoordinates { column })?;
    let checked: Vec<usize> = critical
        .iter()
        .filter_map(|column| index.position_of(column))
        .collect();

    let raw_rows = raw.rows.len();
    let rows: Vec<VariantRecord> = raw
        .rows
        .into_iter()
        .filter(|cells| checked.iter().all(|&i| cell_present(&index, i, &cells[i])))
        .filter_map(|cells| VariantRecord::from_cells(&index, cells))
        .collect();

    if rows.is_empty() {
        return Err(CleanError::Empty { raw_rows });
    }

    let dropped_rows = raw_rows - rows.len();
    Ok(Cleaned {
        table: Table::new(Arc::new(index), rows),
        schema,
        raw_rows,
        dropped_rows,
    })
}

fn cell_present(index: &ColumnIndex, column: usize, cell: &str) -> bool {
    if column == index.chromosome_index() {
        return Chromosome::parse(cell).is_some();
    }
    if column == index.position_index() {
        return parse_position(cell).is_some();
    }

    let name = index.names()[column].as_str();
    if name == columns::EAF {
        parse_frequency(cell).is_some()
    } else if columns::NUMERIC.contains(&name) {
        parse_numeric(cell).is_some()
    } else {
        !is_missing_token(cell)
    }
}
