use std::collections::HashMap;
use std::io::{self, BufRead};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use clap::ValueEnum;
use rust_lapper::{Interval, Lapper};
use serde::Serialize;
use thiserror::Error;
use url::Url;

use crate::assembly::GenomeBuild;
use crate::record::{Chromosome, Coordinate};
use crate::remote::download_to_path;
use crate::smart_reader::open_input;

/// Represents the strand of a genomic region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strand {
    Forward,
    Reverse,
}

impl Strand {
    fn from_token(token: &str) -> Option<Self> {
        match token {
            "+" => Some(Strand::Forward),
            "-" => Some(Strand::Reverse),
            _ => None,
        }
    }
}

/// Why a single coordinate could not be lifted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LiftoverError {
    /// No chain block covers this position
    #[error("no chain block covers the position")]
    Unmapped,
    /// Several chains cover the position and the tie-break cannot choose
    #[error("position maps ambiguously")]
    Ambiguous,
    /// The hit lands on a contig with no canonical chromosome name
    #[error("target contig is not a canonical chromosome")]
    ContigNotFound,
}

/// Chain construction failures. These abort the run.
#[derive(Debug, Error)]
pub enum ChainError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("line {line}: {message}")]
    Malformed { line: u64, message: String },
    #[error("chain file contains no alignment blocks")]
    Empty,
}

/// How to pick among several chain blocks covering one position.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TieBreak {
    /// Highest chain score wins; equal scores across different chains are ambiguous.
    #[default]
    BestScore,
    /// The block from the chain appearing first in the file wins.
    First,
}

/// A mapped segment in the destination genome.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ChainMapping {
    /// Chain ID (from chain header)
    chain_id: u64,
    /// Chain score (from chain header)
    chain_score: u64,
    /// Position of the chain within the file
    ordinal: u32,
    /// Destination chromosome ID (internal)
    dest_chrom_id: u32,
    /// Destination start (qStart)
    dest_start: u64,
    /// Destination strand (qStrand)
    dest_strand: Strand,
    /// Destination size (qSize) - needed for reverse strand coordinate correction
    dest_size: u64,
    /// Source start (tStart) - needed for offset calculation
    source_start: u64,
}

/// Parsed `chain` header line. Block offsets advance `t_start`/`q_start`.
struct Header {
    score: u64,
    t_name: String,
    t_start: u64,
    q_name: String,
    q_size: u64,
    q_strand: Strand,
    q_start: u64,
    chain_id: u64,
    ordinal: u32,
}

impl Header {
    // chain score tName tSize tStrand tStart tEnd qName qSize qStrand qStart qEnd [id]
    fn parse(fields: &[&str], line: u64, ordinal: u32) -> Result<Self, ChainError> {
        if fields.len() < 12 {
            return Err(malformed(
                line,
                format!("chain header has {} fields, expected 12 or 13", fields.len()),
            ));
        }
        let number = |index: usize, what: &str| {
            fields[index]
                .parse::<u64>()
                .map_err(|_| malformed(line, format!("invalid {what} '{}'", fields[index])))
        };
        let q_strand = Strand::from_token(fields[9])
            .ok_or_else(|| malformed(line, format!("invalid strand '{}'", fields[9])))?;
        let chain_id = match fields.get(12) {
            Some(_) => number(12, "chain id")?,
            None => u64::from(ordinal),
        };

        Ok(Self {
            score: number(1, "score")?,
            t_name: fields[2].to_string(),
            t_start: number(5, "tStart")?,
            q_name: fields[7].to_string(),
            q_size: number(8, "qSize")?,
            q_strand,
            q_start: number(10, "qStart")?,
            chain_id,
            ordinal,
        })
    }
}

fn malformed(line: u64, message: String) -> ChainError {
    ChainError::Malformed { line, message }
}

/// A map of genomic intervals from Source to Destination.
///
/// In UCSC chain terminology:
/// - Source = Target (tName)
/// - Destination = Query (qName)
pub struct ChainMap {
    /// Map from Source Chromosome -> IntervalTree of Mappings
    map: HashMap<String, Arc<Lapper<u64, ChainMapping>>>,
    /// Intern table for destination chromosomes
    target_chroms: Vec<String>,
    tie_break: TieBreak,
}

impl ChainMap {
    /// Load a (possibly gzip-compressed) chain file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ChainError> {
        Self::from_reader(open_input(path.as_ref())?)
    }

    /// Parse chain file content.
    pub fn from_reader<R: BufRead>(mut reader: R) -> Result<Self, ChainError> {
        let mut map: HashMap<String, Vec<Interval<u64, ChainMapping>>> = HashMap::new();
        let mut target_chroms: Vec<String> = Vec::new();
        let mut target_chrom_indices: HashMap<String, u32> = HashMap::new();
        let mut current: Option<Header> = None;
        let mut chains = 0u32;
        let mut blocks = 0usize;
        let mut line_no = 0u64;
        let mut line = String::new();

        loop {
            line.clear();
            if reader.read_line(&mut line)? == 0 {
                break;
            }
            line_no += 1;
            if line.trim().is_empty() || line.starts_with('#') {
                continue;
            }

            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields[0] == "chain" {
                current = Some(Header::parse(&fields, line_no, chains)?);
                chains += 1;
                continue;
            }

            // Data line: size [dt dq]
            let Some(header) = current.as_mut() else {
                return Err(malformed(line_no, String::from("alignment block before any chain header")));
            };
            if fields.len() != 1 && fields.len() != 3 {
                return Err(malformed(
                    line_no,
                    format!("alignment block has {} fields, expected 1 or 3", fields.len()),
                ));
            }
            let parse = |token: &str| {
                token
                    .parse::<u64>()
                    .map_err(|_| malformed(line_no, format!("invalid block value '{token}'")))
            };
            let size = parse(fields[0])?;

            let dest_chrom_id = *target_chrom_indices
                .entry(header.q_name.clone())
                .or_insert_with(|| {
                    target_chroms.push(header.q_name.clone());
                    (target_chroms.len() - 1) as u32
                });

            let mapping = ChainMapping {
                chain_id: header.chain_id,
                chain_score: header.score,
                ordinal: header.ordinal,
                dest_chrom_id,
                dest_start: header.q_start,
                dest_strand: header.q_strand,
                dest_size: header.q_size,
                source_start: header.t_start,
            };
            let (dt, dq) = if fields.len() == 3 {
                (parse(fields[1])?, parse(fields[2])?)
            } else {
                (0, 0)
            };
            let overflow = || malformed(line_no, String::from("block extends past 2^64"));
            let block_end = header.t_start.checked_add(size).ok_or_else(overflow)?;
            if size > 0 {
                map.entry(header.t_name.clone()).or_default().push(Interval {
                    start: header.t_start,
                    stop: block_end,
                    val: mapping,
                });
                blocks += 1;
            }

            header.t_start = block_end.checked_add(dt).ok_or_else(overflow)?;
            header.q_start = header
                .q_start
                .checked_add(size)
                .and_then(|q| q.checked_add(dq))
                .ok_or_else(overflow)?;
        }

        if blocks == 0 {
            return Err(ChainError::Empty);
        }

        // Insert both chr and non-chr aliases to avoid allocations in lift().
        let mut final_map: HashMap<String, Arc<Lapper<u64, ChainMapping>>> = HashMap::new();
        for (chrom, intervals) in map {
            let lapper = Arc::new(Lapper::new(intervals));
            let alias = match chrom.strip_prefix("chr") {
                Some(stripped) => stripped.to_string(),
                None => format!("chr{chrom}"),
            };
            final_map.insert(alias, Arc::clone(&lapper));
            final_map.insert(chrom, lapper);
        }

        Ok(Self {
            map: final_map,
            target_chroms,
            tie_break: TieBreak::default(),
        })
    }

    pub fn with_tie_break(mut self, tie_break: TieBreak) -> Self {
        self.tie_break = tie_break;
        self
    }

    pub fn tie_break(&self) -> TieBreak {
        self.tie_break
    }

    /// Lift a single coordinate (0-based) from source to destination.
    /// Returns (new_chrom, new_pos, strand) or an error if unmapped/ambiguous.
    pub fn lift(&self, chrom: &str, pos: u64) -> Result<(String, u64, Strand), LiftoverError> {
        let intervals = self
            .map
            .get(chrom)
            .or_else(|| self.map.get(chrom.trim_start_matches("chr")))
            .ok_or(LiftoverError::Unmapped)?;

        self.lift_with_intervals(intervals, pos)
    }

    /// Lift a 1-based coordinate; the result carries a canonical chromosome.
    pub fn lift_coordinate(&self, coordinate: &Coordinate) -> Result<Coordinate, LiftoverError> {
        let pos0 = coordinate
            .position
            .checked_sub(1)
            .ok_or(LiftoverError::Unmapped)?;
        let (chrom, new_pos0, _) = self.lift(&coordinate.chromosome.ucsc_name(), pos0)?;
        let chromosome = Chromosome::parse(&chrom).ok_or(LiftoverError::ContigNotFound)?;
        let position = new_pos0.checked_add(1).ok_or(LiftoverError::Unmapped)?;
        Ok(Coordinate::new(chromosome, position))
    }

    /// `None` when the coordinate does not map uniquely.
    pub fn map(&self, coordinate: &Coordinate) -> Option<Coordinate> {
        self.lift_coordinate(coordinate).ok()
    }

    fn lift_with_intervals(
        &self,
        intervals: &Lapper<u64, ChainMapping>,
        pos: u64,
    ) -> Result<(String, u64, Strand), LiftoverError> {
        let mut best: Option<&ChainMapping> = None;
        let mut tied = false;
        for hit in intervals.find(pos, pos.saturating_add(1)) {
            let candidate = &hit.val;
            match best {
                None => best = Some(candidate),
                Some(current) => match self.tie_break {
                    TieBreak::BestScore => {
                        if candidate.chain_score > current.chain_score {
                            best = Some(candidate);
                            tied = false;
                        } else if candidate.chain_score == current.chain_score
                            && candidate.chain_id != current.chain_id
                        {
                            tied = true;
                        }
                    }
                    TieBreak::First => {
                        if candidate.ordinal < current.ordinal {
                            best = Some(candidate);
                        }
                    }
                },
            }
        }

        let mapping = best.ok_or(LiftoverError::Unmapped)?;
        if tied {
            return Err(LiftoverError::Ambiguous);
        }

        let offset = pos - mapping.source_start;
        let dest_pos = mapping
            .dest_start
            .checked_add(offset)
            .ok_or(LiftoverError::Unmapped)?;
        let new_pos = match mapping.dest_strand {
            Strand::Forward => dest_pos,
            Strand::Reverse => mapping
                .dest_size
                .checked_sub(dest_pos)
                .and_then(|p| p.checked_sub(1))
                .ok_or(LiftoverError::Unmapped)?,
        };

        let dest_chrom = self
            .target_chroms
            .get(mapping.dest_chrom_id as usize)
            .cloned()
            .ok_or(LiftoverError::Unmapped)?;

        Ok((dest_chrom, new_pos, mapping.dest_strand))
    }
}

/// Both liftover directions, loaded once and shared read-only.
pub struct ChainSet {
    hg19_to_hg38: ChainMap,
    hg38_to_hg19: ChainMap,
}

impl ChainSet {
    pub fn new(hg19_to_hg38: ChainMap, hg38_to_hg19: ChainMap) -> Self {
        Self {
            hg19_to_hg38,
            hg38_to_hg19,
        }
    }

    pub fn load(
        hg19_to_hg38: &Path,
        hg38_to_hg19: &Path,
        tie_break: TieBreak,
    ) -> Result<Self> {
        let load = |path: &Path| {
            tracing::info!("loading chain file: {}", path.display());
            ChainMap::load(path)
                .map(|chain| chain.with_tie_break(tie_break))
                .with_context(|| format!("failed to load chain file {}", path.display()))
        };
        Ok(Self::new(load(hg19_to_hg38)?, load(hg38_to_hg19)?))
    }

    /// The chain whose destination is `target`.
    pub fn towards(&self, target: GenomeBuild) -> &ChainMap {
        match target {
            GenomeBuild::Hg38 => &self.hg19_to_hg38,
            GenomeBuild::Hg19 => &self.hg38_to_hg19,
        }
    }
}

const UCSC_LIFTOVER_BASE: &str = "https://hgdownload.soe.ucsc.edu/goldenPath";

/// Local cache of UCSC chain files.
pub struct ChainRegistry {
    cache_dir: PathBuf,
}

impl ChainRegistry {
    /// Use `cache_dir`, or the per-user cache directory when `None`.
    pub fn new(cache_dir: Option<PathBuf>) -> Result<Self> {
        let cache_dir = match cache_dir {
            Some(dir) => dir,
            None => directories::ProjectDirs::from("org", "sumstats_lift", "sumstats_lift")
                .ok_or_else(|| anyhow!("failed to determine cache directory"))?
                .cache_dir()
                .join("chains"),
        };
        std::fs::create_dir_all(&cache_dir)
            .with_context(|| format!("failed to create {}", cache_dir.display()))?;
        Ok(Self { cache_dir })
    }

    pub fn file_name(source: GenomeBuild, target: GenomeBuild) -> String {
        let target = target.ucsc_name();
        let mut capitalized = target[..1].to_ascii_uppercase();
        capitalized.push_str(&target[1..]);
        format!("{}To{}.over.chain.gz", source.ucsc_name(), capitalized)
    }

    /// Path of the cached chain, downloading it first if needed.
    pub fn chain_path(&self, source: GenomeBuild, target: GenomeBuild) -> Result<PathBuf> {
        anyhow::ensure!(source != target, "no chain needed from {source} to itself");
        let file_name = Self::file_name(source, target);
        let cache_path = self.cache_dir.join(&file_name);
        if !cache_path.exists() {
            let url = Url::parse(&format!(
                "{UCSC_LIFTOVER_BASE}/{}/liftOver/{file_name}",
                source.ucsc_name()
            ))?;
            tracing::info!("chain file not found locally. Downloading from {}", url);
            download_to_path(&url, &cache_path)?;
        }
        Ok(cache_path)
    }
}
