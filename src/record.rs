//! Variant records and build-tagged variant tables.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use serde::Serialize;

use crate::assembly::{Build, GenomeBuild};

/// Input column names. Matching is case-sensitive.
pub mod columns {
    pub const SNP: &str = "SNP";
    pub const CHROMOSOME: &str = "chr";
    pub const POSITION: &str = "pos";
    pub const EFFECT_ALLELE: &str = "effect_allele";
    pub const OTHER_ALLELE: &str = "other_allele";
    pub const EAF: &str = "eaf";
    pub const BETA: &str = "beta";
    pub const STANDARD_ERROR: &str = "se";
    pub const P_VALUE: &str = "pval";
    pub const SAMPLE_SIZE: &str = "samplesize";

    /// Columns coerced to numbers before the completeness check.
    pub const NUMERIC: [&str; 6] = [EAF, BETA, STANDARD_ERROR, P_VALUE, CHROMOSOME, POSITION];

    /// Columns that must be non-missing for a row to be kept.
    pub const CRITICAL: [&str; 9] = [
        SNP,
        EFFECT_ALLELE,
        OTHER_ALLELE,
        EAF,
        BETA,
        STANDARD_ERROR,
        P_VALUE,
        CHROMOSOME,
        POSITION,
    ];
}

/// Spellings treated as a missing cell.
const MISSING_TOKENS: &[&str] = &[
    "", ".", "NA", "N/A", "n/a", "na", "NaN", "nan", "-nan", "-NaN", "NULL", "null", "None",
    "<NA>", "#N/A", "#NA", "#N/A N/A",
];

pub fn is_missing_token(raw: &str) -> bool {
    MISSING_TOKENS.contains(&raw.trim())
}

/// Parse a finite number. Anything else, including fused fields such as
/// `0.01230.456`, is missing.
pub fn parse_numeric(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if is_missing_token(trimmed) {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|value| value.is_finite())
}

/// An allele frequency in `[0, 1]`.
pub fn parse_frequency(raw: &str) -> Option<f64> {
    parse_numeric(raw).filter(|value| (0.0..=1.0).contains(value))
}

/// A 1-based position. Non-integral values are truncated toward zero.
pub fn parse_position(raw: &str) -> Option<u64> {
    let trimmed = raw.trim();
    if let Ok(position) = trimmed.parse::<u64>() {
        return (position >= 1).then_some(position);
    }
    let value = parse_numeric(trimmed)?.trunc();
    if value >= 1.0 && value <= u64::MAX as f64 {
        Some(value as u64)
    } else {
        None
    }
}

fn parse_count(raw: &str) -> Option<u64> {
    let value = parse_numeric(raw)?;
    (value >= 0.0 && value.fract() == 0.0 && value <= u64::MAX as f64).then_some(value as u64)
}

/// Chromosome name without a `chr` prefix: `"1"`..`"22"`, `"X"`, `"Y"`, `"MT"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Chromosome(String);

impl Chromosome {
    pub fn autosome(number: u8) -> Self {
        Self(number.to_string())
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        let token = ["chr", "CHR", "Chr"]
            .iter()
            .find_map(|prefix| trimmed.strip_prefix(prefix))
            .unwrap_or(trimmed);
        if token.is_empty() {
            return None;
        }

        if let Ok(value) = token.parse::<f64>() {
            let integral = value.is_finite() && value >= 1.0 && value.fract() == 0.0;
            return (integral && value <= f64::from(u32::MAX))
                .then(|| Self((value as u32).to_string()));
        }

        match token.to_ascii_uppercase().as_str() {
            "X" => Some(Self(String::from("X"))),
            "Y" => Some(Self(String::from("Y"))),
            "M" | "MT" => Some(Self(String::from("MT"))),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Name with the UCSC `chr` prefix, as used in chain files.
    pub fn ucsc_name(&self) -> String {
        if self.0 == "MT" {
            String::from("chrM")
        } else {
            format!("chr{}", self.0)
        }
    }
}

impl fmt::Display for Chromosome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A 1-based genomic coordinate.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Coordinate {
    pub chromosome: Chromosome,
    pub position: u64,
}

impl Coordinate {
    pub fn new(chromosome: Chromosome, position: u64) -> Self {
        Self {
            chromosome,
            position,
        }
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.chromosome, self.position)
    }
}

/// Header of a variant table, with the positions of the known columns resolved.
#[derive(Debug, Clone)]
pub struct ColumnIndex {
    names: Vec<String>,
    chromosome: usize,
    position: usize,
    snp: Option<usize>,
    effect_allele: Option<usize>,
    other_allele: Option<usize>,
    eaf: Option<usize>,
    beta: Option<usize>,
    standard_error: Option<usize>,
    p_value: Option<usize>,
    sample_size: Option<usize>,
}

impl ColumnIndex {
    /// Resolve the header. Fails with the name of the missing coordinate column
    /// when `chr` or `pos` is absent.
    pub fn new(names: Vec<String>) -> Result<Self, &'static str> {
        let find = |name: &str| names.iter().position(|column| column == name);
        let chromosome = find(columns::CHROMOSOME).ok_or(columns::CHROMOSOME)?;
        let position = find(columns::POSITION).ok_or(columns::POSITION)?;

        Ok(Self {
            chromosome,
            position,
            snp: find(columns::SNP),
            effect_allele: find(columns::EFFECT_ALLELE),
            other_allele: find(columns::OTHER_ALLELE),
            eaf: find(columns::EAF),
            beta: find(columns::BETA),
            standard_error: find(columns::STANDARD_ERROR),
            p_value: find(columns::P_VALUE),
            sample_size: find(columns::SAMPLE_SIZE),
            names,
        })
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn position_of(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|column| column == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position_of(name).is_some()
    }

    pub fn chromosome_index(&self) -> usize {
        self.chromosome
    }

    pub fn position_index(&self) -> usize {
        self.position
    }
}

/// One row of a summary-statistics table.
///
/// Typed fields are `None` only when their column is absent from the table or
/// the column is not critical and its cell could not be parsed.
#[derive(Debug, Clone, PartialEq)]
pub struct VariantRecord {
    /// Coordinate in the build of the table holding this record.
    pub coordinate: Coordinate,
    /// Coordinate as read from the input file, before any liftover.
    pub original: Coordinate,
    pub snp_id: Option<String>,
    pub effect_allele: Option<String>,
    pub other_allele: Option<String>,
    pub effect_allele_frequency: Option<f64>,
    pub beta: Option<f64>,
    pub standard_error: Option<f64>,
    pub p_value: Option<f64>,
    pub sample_size: Option<u64>,
    cells: Vec<String>,
}

impl VariantRecord {
    /// Build a record from raw cells. Returns `None` when the coordinate cells
    /// cannot be parsed.
    pub(crate) fn from_cells(columns: &ColumnIndex, cells: Vec<String>) -> Option<Self> {
        let chromosome = Chromosome::parse(&cells[columns.chromosome])?;
        let position = parse_position(&cells[columns.position])?;
        let coordinate = Coordinate::new(chromosome, position);

        let text = |index: Option<usize>| {
            index
                .map(|i| cells[i].trim())
                .filter(|cell| !is_missing_token(cell))
                .map(str::to_string)
        };
        let number = |index: Option<usize>| index.and_then(|i| parse_numeric(&cells[i]));

        Some(Self {
            original: coordinate.clone(),
            coordinate,
            snp_id: text(columns.snp),
            effect_allele: text(columns.effect_allele),
            other_allele: text(columns.other_allele),
            effect_allele_frequency: columns.eaf.and_then(|i| parse_frequency(&cells[i])),
            beta: number(columns.beta),
            standard_error: number(columns.standard_error),
            p_value: number(columns.p_value),
            sample_size: columns.sample_size.and_then(|i| parse_count(&cells[i])),
            cells,
        })
    }

    /// Raw cell text for a column, as read from the input.
    pub fn cell(&self, index: usize) -> Option<&str> {
        self.cells.get(index).map(String::as_str)
    }

    /// The same record placed at `coordinate`.
    pub(crate) fn with_coordinate(&self, coordinate: Coordinate) -> Self {
        Self {
            coordinate,
            ..self.clone()
        }
    }
}

/// An ordered set of records whose coordinates are all in build `B`.
pub struct Table<B> {
    columns: Arc<ColumnIndex>,
    rows: Vec<VariantRecord>,
    build: PhantomData<fn() -> B>,
}

impl<B> Clone for Table<B> {
    fn clone(&self) -> Self {
        Self {
            columns: Arc::clone(&self.columns),
            rows: self.rows.clone(),
            build: PhantomData,
        }
    }
}

impl<B> fmt::Debug for Table<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Table")
            .field("columns", &self.columns.names)
            .field("rows", &self.rows.len())
            .finish()
    }
}

impl<B: Build> Table<B> {
    /// Callers guarantee every record's `coordinate` is in build `B`.
    pub(crate) fn new(columns: Arc<ColumnIndex>, rows: Vec<VariantRecord>) -> Self {
        Self {
            columns,
            rows,
            build: PhantomData,
        }
    }

    pub(crate) fn into_parts(self) -> (Arc<ColumnIndex>, Vec<VariantRecord>) {
        (self.columns, self.rows)
    }

    pub fn build(&self) -> GenomeBuild {
        B::TAG
    }

    pub fn columns(&self) -> &ColumnIndex {
        &self.columns
    }

    pub(crate) fn shared_columns(&self) -> Arc<ColumnIndex> {
        Arc::clone(&self.columns)
    }

    pub fn rows(&self) -> &[VariantRecord] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Keep only rows matching `keep`; returns the number removed.
    pub fn retain_rows<F>(&mut self, keep: F) -> usize
    where
        F: FnMut(&VariantRecord) -> bool,
    {
        let before = self.rows.len();
        self.rows.retain(keep);
        before - self.rows.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chromosome_normalization() {
        assert_eq!(Chromosome::parse("chr1").unwrap().as_str(), "1");
        assert_eq!(Chromosome::parse("1.0").unwrap().as_str(), "1");
        assert_eq!(Chromosome::parse(" 22 ").unwrap().as_str(), "22");
        assert_eq!(Chromosome::parse("chrX").unwrap().as_str(), "X");
        assert_eq!(Chromosome::parse("y").unwrap().as_str(), "Y");
        assert_eq!(Chromosome::parse("chrM").unwrap().as_str(), "MT");
        assert!(Chromosome::parse("1.5").is_none());
        assert!(Chromosome::parse("0").is_none());
        assert!(Chromosome::parse("chr6_ssto_hap7").is_none());
        assert!(Chromosome::parse("NA").is_none());
        assert!(Chromosome::parse("").is_none());
    }

    #[test]
    fn ucsc_names() {
        assert_eq!(Chromosome::parse("6").unwrap().ucsc_name(), "chr6");
        assert_eq!(Chromosome::parse("MT").unwrap().ucsc_name(), "chrM");
    }

    #[test]
    fn numeric_coercion() {
        assert_eq!(parse_numeric("0.25"), Some(0.25));
        assert_eq!(parse_numeric("1e-8"), Some(1e-8));
        assert_eq!(parse_numeric("0.01230.456"), None);
        assert_eq!(parse_numeric("NA"), None);
        assert_eq!(parse_numeric("inf"), None);
        assert_eq!(parse_numeric("NaN"), None);
        assert_eq!(parse_frequency("1.2"), None);
        assert_eq!(parse_frequency("1"), Some(1.0));
    }

    #[test]
    fn position_coercion() {
        assert_eq!(parse_position("123"), Some(123));
        assert_eq!(parse_position("123.9"), Some(123));
        assert_eq!(parse_position("1.5e3"), Some(1500));
        assert_eq!(parse_position("123abc"), None);
        assert_eq!(parse_position("0"), None);
        assert_eq!(parse_position("-5"), None);
    }

    #[test]
    fn column_index_requires_coordinates() {
        let names = |list: &[&str]| list.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        assert_eq!(
            ColumnIndex::new(names(&["SNP", "pos"])).unwrap_err(),
            columns::CHROMOSOME
        );
        assert_eq!(
            ColumnIndex::new(names(&["SNP", "chr"])).unwrap_err(),
            columns::POSITION
        );
        let index = ColumnIndex::new(names(&["SNP", "chr", "pos"])).unwrap();
        assert_eq!(index.chromosome_index(), 1);
        assert_eq!(index.position_index(), 2);
    }

    #[test]
    fn record_keeps_original_coordinate() {
        let index = ColumnIndex::new(
            ["SNP", "chr", "pos", "eaf"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        )
        .unwrap();
        let cells = ["rs1", "chr2", "500.0", "0.2"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let record = VariantRecord::from_cells(&index, cells).unwrap();
        assert_eq!(record.coordinate.to_string(), "2:500");
        assert_eq!(record.original, record.coordinate);
        assert_eq!(record.effect_allele_frequency, Some(0.2));
        assert_eq!(record.cell(2), Some("500.0"));
        assert_eq!(record.beta, None);

        let moved = record.with_coordinate(Coordinate::new(Chromosome::autosome(2), 900));
        assert_eq!(moved.coordinate.position, 900);
        assert_eq!(moved.original, record.original);
        assert_eq!(moved.cell(0), Some("rs1"));
        assert_eq!(moved.cell(2), Some("500.0"));
    }
}
