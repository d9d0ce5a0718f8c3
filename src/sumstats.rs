//! Reader for whitespace-delimited summary-statistics tables.

use std::io::{self, BufRead};
use std::path::Path;

use thiserror::Error;

use crate::smart_reader::open_input;

/// A table as read from disk: a header and rows of raw cells.
///
/// Every row has exactly as many cells as the header; short rows are padded
/// with empty (missing) cells.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
    /// Lines dropped because they had more fields than the header.
    pub malformed_lines: usize,
}

/// Errors that make a whole table unreadable.
#[derive(Debug, Error)]
pub enum ReadError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("table has no header line")]
    MissingHeader,
}

/// Errors on a single data line.
#[derive(Debug, Error)]
#[error("line {line}: {kind}")]
pub struct ParseError {
    pub line: u64,
    #[source]
    pub kind: ParseErrorKind,
}

#[derive(Debug, Error)]
pub enum ParseErrorKind {
    #[error("I/O error")]
    Io(#[from] io::Error),
    #[error("expected at most {expected} fields, found {found}")]
    FieldCount { expected: usize, found: usize },
}

/// Line-oriented reader. Call [`Reader::read_header`] first, then iterate rows.
pub struct Reader<R> {
    inner: R,
    line: u64,
    width: usize,
    buf: String,
}

impl<R> Reader<R>
where
    R: BufRead,
{
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            line: 0,
            width: 0,
            buf: String::new(),
        }
    }

    /// Read the first non-blank line as the header.
    pub fn read_header(&mut self) -> Result<Vec<String>, ReadError> {
        loop {
            self.buf.clear();
            if self.inner.read_line(&mut self.buf)? == 0 {
                return Err(ReadError::MissingHeader);
            }
            self.line += 1;
            let columns: Vec<String> = self.buf.split_whitespace().map(str::to_string).collect();
            if !columns.is_empty() {
                self.width = columns.len();
                return Ok(columns);
            }
        }
    }
}

impl<R> Iterator for Reader<R>
where
    R: BufRead,
{
    type Item = Result<Vec<String>, ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            self.buf.clear();
            match self.inner.read_line(&mut self.buf) {
                Ok(0) => return None,
                Ok(_) => {
                    self.line += 1;
                    let mut cells: Vec<String> =
                        self.buf.split_whitespace().map(str::to_string).collect();
                    if cells.is_empty() {
                        continue;
                    }
                    if cells.len() > self.width {
                        return Some(Err(ParseError {
                            line: self.line,
                            kind: ParseErrorKind::FieldCount {
                                expected: self.width,
                                found: cells.len(),
                            },
                        }));
                    }
                    cells.resize(self.width, String::new());
                    return Some(Ok(cells));
                }
                Err(e) => {
                    return Some(Err(ParseError {
                        line: self.line + 1,
                        kind: ParseErrorKind::Io(e),
                    }));
                }
            }
        }
    }
}

/// Read a whole table. Lines with too many fields are counted and skipped;
/// I/O failures abort.
pub fn parse_table<R: BufRead>(reader: R) -> Result<RawTable, ReadError> {
    let mut reader = Reader::new(reader);
    let columns = reader.read_header()?;
    let mut table = RawTable {
        columns,
        ..RawTable::default()
    };

    for result in reader {
        match result {
            Ok(cells) => table.rows.push(cells),
            Err(ParseError {
                kind: ParseErrorKind::Io(e),
                ..
            }) => return Err(ReadError::Io(e)),
            Err(e) => {
                table.malformed_lines += 1;
                tracing::debug!(error = %e, "skipping malformed line");
            }
        }
    }

    Ok(table)
}

/// Open (optionally gzip-compressed) `path` and read it as a table.
pub fn read_table(path: &Path) -> Result<RawTable, ReadError> {
    parse_table(open_input(path)?)
}
