//! Depth sample tables read from delimited text files
//!
//! A sample file is a delimited table with one header line followed by rows
//! of numeric cells: a depth column and the band reflectances measured at the
//! same location. Several files with identical columns are merged into one
//! [`SampleTable`].

mod discover;

pub use discover::{discover_in_folder, SAMPLE_EXTENSIONS};

use crate::error::{Error, Result};
use ::csv::{ReaderBuilder, StringRecord, Trim};
use ndarray::{s, Array2, ArrayView1};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Field separator of a sample file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Delimiter {
    #[default]
    Comma,
    Tab,
    Space,
    Semicolon,
}

impl Delimiter {
    pub const ALL: [Delimiter; 4] = [
        Delimiter::Comma,
        Delimiter::Tab,
        Delimiter::Space,
        Delimiter::Semicolon,
    ];

    pub fn byte(&self) -> u8 {
        match self {
            Delimiter::Comma => b',',
            Delimiter::Tab => b'\t',
            Delimiter::Space => b' ',
            Delimiter::Semicolon => b';',
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Delimiter::Comma => "Comma",
            Delimiter::Tab => "Tab",
            Delimiter::Space => "Space",
            Delimiter::Semicolon => "Semicolon",
        }
    }
}

impl FromStr for Delimiter {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "comma" | "," => Ok(Delimiter::Comma),
            "tab" | "\t" | "\\t" => Ok(Delimiter::Tab),
            "space" | " " => Ok(Delimiter::Space),
            "semicolon" | ";" => Ok(Delimiter::Semicolon),
            _ => Err(Error::invalid_parameter(
                "delimiter",
                s,
                "expected comma, tab, space or semicolon",
            )),
        }
    }
}

impl fmt::Display for Delimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How sample files are laid out.
///
/// Both row numbers are 1-based. `header_row` is the line holding column
/// names (earlier lines are skipped). `data_start_row` counts among the rows
/// after the header, so `1` means data begins right below it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleFormat {
    pub delimiter: Delimiter,
    pub header_row: usize,
    pub data_start_row: usize,
}

impl Default for SampleFormat {
    fn default() -> Self {
        Self {
            delimiter: Delimiter::Comma,
            header_row: 1,
            data_start_row: 1,
        }
    }
}

impl SampleFormat {
    fn validate(&self) -> Result<()> {
        if self.header_row == 0 {
            return Err(Error::invalid_parameter("header_row", 0, "rows are 1-based"));
        }
        if self.data_start_row == 0 {
            return Err(Error::invalid_parameter("data_start_row", 0, "rows are 1-based"));
        }
        Ok(())
    }
}

/// A file that contributed rows to a [`SampleTable`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleSource {
    pub path: PathBuf,
    pub bytes: u64,
    pub rows: usize,
}

/// Column-named table of sample values.
///
/// Empty or non-numeric cells are stored as NaN.
#[derive(Debug, Clone)]
pub struct SampleTable {
    columns: Vec<String>,
    data: Array2<f64>,
    sources: Vec<SampleSource>,
}

impl SampleTable {
    /// Build a table from column names and a `(rows, columns)` array
    pub fn new(columns: Vec<String>, data: Array2<f64>) -> Result<Self> {
        if columns.len() != data.ncols() {
            return Err(Error::SchemaMismatch(format!(
                "{} column names for {} data columns",
                columns.len(),
                data.ncols()
            )));
        }
        if let Some(name) = first_duplicate(&columns) {
            return Err(Error::SchemaMismatch(format!("duplicate column '{}'", name)));
        }
        Ok(Self {
            columns,
            data,
            sources: Vec::new(),
        })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn data(&self) -> &Array2<f64> {
        &self.data
    }

    pub fn n_rows(&self) -> usize {
        self.data.nrows()
    }

    pub fn n_columns(&self) -> usize {
        self.columns.len()
    }

    /// Position of a column by exact name
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Values of a named column
    pub fn column(&self, name: &str) -> Result<ArrayView1<'_, f64>> {
        let index = self
            .column_index(name)
            .ok_or_else(|| Error::SchemaMismatch(format!("no column named '{}'", name)))?;
        Ok(self.data.column(index))
    }

    /// Files the rows came from, in load order
    pub fn sources(&self) -> &[SampleSource] {
        &self.sources
    }

    /// Sum of the source file sizes in bytes
    pub fn total_bytes(&self) -> u64 {
        self.sources.iter().map(|s| s.bytes).sum()
    }

    /// The first `n` rows (all rows when the table is shorter)
    pub fn head(&self, n: usize) -> SampleTable {
        let n = n.min(self.n_rows());
        SampleTable {
            columns: self.columns.clone(),
            data: self.data.slice(s![..n, ..]).to_owned(),
            sources: self.sources.clone(),
        }
    }
}

impl fmt::Display for SampleTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.columns.join("\t"))?;
        for row in self.data.rows() {
            let cells: Vec<String> = row.iter().map(|v| format!("{}", v)).collect();
            writeln!(f, "{}", cells.join("\t"))?;
        }
        Ok(())
    }
}

fn first_duplicate(columns: &[String]) -> Option<&str> {
    columns
        .iter()
        .enumerate()
        .find(|(i, name)| columns[..*i].contains(*name))
        .map(|(_, name)| name.as_str())
}

/// One parsed file before merging
struct ParsedFile {
    columns: Vec<String>,
    rows: Vec<f64>,
    n_rows: usize,
}

/// Load and concatenate sample files.
///
/// Every file is parsed with the same layout and must carry the same column
/// names in the same order. Rows are appended in path order.
pub fn load_many<P: AsRef<Path>>(paths: &[P], format: &SampleFormat) -> Result<SampleTable> {
    format.validate()?;
    if paths.is_empty() {
        return Err(Error::invalid_parameter("paths", "[]", "no sample files given"));
    }

    let mut columns: Option<Vec<String>> = None;
    let mut cells = Vec::new();
    let mut sources = Vec::with_capacity(paths.len());

    for path in paths {
        let path = path.as_ref();
        let bytes = std::fs::metadata(path)
            .map_err(|e| Error::ingestion(path, e))?
            .len();
        let parsed = parse_file(path, format)?;

        match &columns {
            Some(expected) if *expected != parsed.columns => {
                return Err(Error::Parse {
                    path: path.to_path_buf(),
                    line: format.header_row as u64,
                    reason: format!(
                        "columns [{}] differ from [{}]",
                        parsed.columns.join(", "),
                        expected.join(", ")
                    ),
                });
            }
            _ => {}
        }
        if columns.is_none() {
            columns = Some(parsed.columns);
        }

        tracing::debug!(path = %path.display(), rows = parsed.n_rows, bytes, "loaded sample file");
        cells.extend(parsed.rows);
        sources.push(SampleSource {
            path: path.to_path_buf(),
            bytes,
            rows: parsed.n_rows,
        });
    }

    let columns = columns.unwrap_or_default();
    let n_rows = sources.iter().map(|s| s.rows).sum();
    let data = Array2::from_shape_vec((n_rows, columns.len()), cells)
        .map_err(|e| Error::Other(e.to_string()))?;

    tracing::info!(
        files = sources.len(),
        rows = n_rows,
        columns = columns.len(),
        "merged sample table"
    );

    Ok(SampleTable {
        columns,
        data,
        sources,
    })
}

fn parse_file(path: &Path, format: &SampleFormat) -> Result<ParsedFile> {
    let mut reader = ReaderBuilder::new()
        .delimiter(format.delimiter.byte())
        .has_headers(false)
        .flexible(true)
        .trim(Trim::All)
        .from_path(path)
        .map_err(|e| Error::ingestion(path, e))?;

    let collapse = format.delimiter == Delimiter::Space;
    let mut records = reader.records();

    let mut header = None;
    for _ in 0..format.header_row {
        header = records.next();
    }
    let header = match header {
        Some(record) => fields(record.map_err(|e| csv_error(path, e))?, collapse),
        None => {
            return Err(Error::Parse {
                path: path.to_path_buf(),
                line: format.header_row as u64,
                reason: "file ends before the header row".to_string(),
            })
        }
    };

    let columns: Vec<String> = header
        .iter()
        .enumerate()
        .map(|(i, name)| {
            if name.is_empty() {
                format!("column_{}", i + 1)
            } else {
                name.clone()
            }
        })
        .collect();
    if let Some(name) = first_duplicate(&columns) {
        return Err(Error::Parse {
            path: path.to_path_buf(),
            line: format.header_row as u64,
            reason: format!("duplicate column '{}'", name),
        });
    }

    let mut rows = Vec::new();
    let mut n_rows = 0;
    for record in records.skip(format.data_start_row - 1) {
        let record = record.map_err(|e| csv_error(path, e))?;
        let line = record.position().map(|p| p.line()).unwrap_or(0);
        let values = fields(record, collapse);
        if values.len() != columns.len() {
            return Err(Error::Parse {
                path: path.to_path_buf(),
                line,
                reason: format!("expected {} fields, found {}", columns.len(), values.len()),
            });
        }
        rows.extend(values.iter().map(|v| v.parse::<f64>().unwrap_or(f64::NAN)));
        n_rows += 1;
    }

    Ok(ParsedFile {
        columns,
        rows,
        n_rows,
    })
}

/// Record fields; runs of spaces count as one separator for space-delimited files
fn fields(record: StringRecord, collapse: bool) -> Vec<String> {
    record
        .iter()
        .filter(|f| !collapse || !f.is_empty())
        .map(str::to_string)
        .collect()
}

fn csv_error(path: &Path, e: ::csv::Error) -> Error {
    let line = e.position().map(|p| p.line()).unwrap_or(0);
    Error::Parse {
        path: path.to_path_buf(),
        line,
        reason: e.to_string(),
    }
}
