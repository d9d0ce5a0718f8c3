//! Writers for the three per-file outputs.

use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use flate2::Compression;
use flate2::write::GzEncoder;

use crate::assembly::{Build, Hg19, Hg38};
use crate::record::{Table, VariantRecord, columns};

pub const REFERENCE_DIR: &str = "1.hg19";
pub const ALTERNATE_DIR: &str = "2.hg38";
pub const UPLOAD_DIR: &str = "3.FUMA";
pub const UPLOAD_SUFFIX: &str = ".gz";
#[cfg(unix)]
const OUTPUT_MODE: u32 = 0o644;

/// Source column -> upload column.
pub const UPLOAD_COLUMNS: [(&str, &str); 9] = [
    (columns::SNP, "SNP"),
    (columns::CHROMOSOME, "CHR"),
    (columns::POSITION, "BP"),
    (columns::EFFECT_ALLELE, "A1"),
    (columns::OTHER_ALLELE, "A2"),
    (columns::P_VALUE, "P"),
    (columns::BETA, "BETA"),
    (columns::STANDARD_ERROR, "SE"),
    (columns::SAMPLE_SIZE, "N"),
];

/// Output directories for the hg19, hg38 and upload tables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLayout {
    pub reference_dir: PathBuf,
    pub alternate_dir: PathBuf,
    pub upload_dir: PathBuf,
}

impl OutputLayout {
    pub fn under(root: &Path) -> Self {
        Self {
            reference_dir: root.join(REFERENCE_DIR),
            alternate_dir: root.join(ALTERNATE_DIR),
            upload_dir: root.join(UPLOAD_DIR),
        }
    }

    pub fn create_dirs(&self) -> Result<()> {
        for dir in [&self.reference_dir, &self.alternate_dir, &self.upload_dir] {
            fs::create_dir_all(dir)
                .with_context(|| format!("failed to create output directory {}", dir.display()))?;
        }
        Ok(())
    }

    pub fn paths_for(&self, file_name: &str) -> OutputPaths {
        OutputPaths {
            reference: self.reference_dir.join(file_name),
            alternate: self.alternate_dir.join(file_name),
            upload: self.upload_dir.join(format!("{file_name}{UPLOAD_SUFFIX}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPaths {
    pub reference: PathBuf,
    pub alternate: PathBuf,
    pub upload: PathBuf,
}

impl OutputPaths {
    /// The hg19 table is written last, so its presence marks a finished file.
    pub fn is_complete(&self) -> bool {
        self.reference.is_file()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    Written,
    Skipped { missing: Vec<String> },
}

/// Outputs are created 0644 rather than the 0600 of temporary files.
#[cfg(unix)]
fn temp_builder() -> tempfile::Builder<'static, 'static> {
    use std::os::unix::fs::PermissionsExt;
    let mut builder = tempfile::Builder::new();
    builder.permissions(fs::Permissions::from_mode(OUTPUT_MODE));
    builder
}

#[cfg(not(unix))]
fn temp_builder() -> tempfile::Builder<'static, 'static> {
    tempfile::Builder::new()
}

/// Write to a temporary file beside `path` and rename it into place.
fn write_atomically<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut dyn Write) -> io::Result<()>,
{
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let temp = temp_builder()
        .tempfile_in(dir)
        .with_context(|| format!("failed to create temporary file in {}", dir.display()))?;
    let mut writer = BufWriter::new(temp);
    write(&mut writer).with_context(|| format!("failed to write {}", path.display()))?;
    let temp = writer
        .into_inner()
        .map_err(|e| e.into_error())
        .with_context(|| format!("failed to flush {}", path.display()))?;
    temp.persist(path)
        .map_err(|e| e.error)
        .with_context(|| format!("failed to move output into {}", path.display()))?;
    Ok(())
}

fn write_cell(
    out: &mut dyn Write,
    record: &VariantRecord,
    index: usize,
    (chrom, pos): (usize, usize),
) -> io::Result<()> {
    if index == chrom {
        write!(out, "{}", record.coordinate.chromosome)
    } else if index == pos {
        write!(out, "{}", record.coordinate.position)
    } else {
        out.write_all(record.cell(index).unwrap_or_default().as_bytes())
    }
}

fn write_rows<B: Build>(
    out: &mut dyn Write,
    table: &Table<B>,
    selected: &[usize],
    header: &[&str],
) -> io::Result<()> {
    let coordinates = (
        table.columns().chromosome_index(),
        table.columns().position_index(),
    );
    writeln!(out, "{}", header.join("\t"))?;
    for record in table.rows() {
        for (n, &index) in selected.iter().enumerate() {
            if n > 0 {
                out.write_all(b"\t")?;
            }
            write_cell(out, record, index, coordinates)?;
        }
        out.write_all(b"\n")?;
    }
    Ok(())
}

/// Tab-delimited table with every input column. Coordinates are written in
/// the table's build; other cells as read.
pub fn write_table<B: Build>(path: &Path, table: &Table<B>) -> Result<()> {
    let header: Vec<&str> = table.columns().names().iter().map(String::as_str).collect();
    let selected: Vec<usize> = (0..header.len()).collect();
    write_atomically(path, |out| write_rows(out, table, &selected, &header))
}

/// Gzipped upload table with the fixed renamed column subset. Skipped when
/// any source column is absent.
pub fn write_upload<B: Build>(path: &Path, table: &Table<B>) -> Result<UploadOutcome> {
    let missing: Vec<String> = UPLOAD_COLUMNS
        .iter()
        .filter(|(source, _)| !table.columns().contains(source))
        .map(|(source, _)| source.to_string())
        .collect();
    if !missing.is_empty() {
        return Ok(UploadOutcome::Skipped { missing });
    }

    let selected: Vec<usize> = UPLOAD_COLUMNS
        .iter()
        .filter_map(|(source, _)| table.columns().position_of(source))
        .collect();
    let header: Vec<&str> = UPLOAD_COLUMNS.iter().map(|(_, renamed)| *renamed).collect();

    write_atomically(path, |out| {
        let mut encoder = GzEncoder::new(out, Compression::default());
        write_rows(&mut encoder, table, &selected, &header)?;
        encoder.finish()?;
        Ok(())
    })?;
    Ok(UploadOutcome::Written)
}

/// Write all three outputs of one file from a single filtered snapshot. The
/// hg19 table goes last since it doubles as the completion marker.
pub fn write_outputs(
    paths: &OutputPaths,
    reference: &Table<Hg19>,
    alternate: &Table<Hg38>,
) -> Result<UploadOutcome> {
    let upload = write_upload(&paths.upload, reference)?;
    if let UploadOutcome::Skipped { missing } = &upload {
        tracing::warn!(missing = ?missing, "missing columns; skipping upload table");
    }
    write_table(&paths.alternate, alternate)?;
    write_table(&paths.reference, reference)?;
    Ok(upload)
}
