use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::Serialize;

use super::command::{self, resolve_delimiter};

/// Which way rows flow through a COPY.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Export,
    Import,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Export => f.write_str("TO"),
            Direction::Import => f.write_str("FROM"),
        }
    }
}

/// Delimited-text flavour selected by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    #[default]
    Csv,
    Tsv,
    Custom,
}

impl Format {
    pub fn as_str(&self) -> &'static str {
        match self {
            Format::Csv => "csv",
            Format::Tsv => "tsv",
            Format::Custom => "custom",
        }
    }
}

impl FromStr for Format {
    type Err = std::convert::Infallible;

    /// Unknown selectors fall back to CSV.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Ok(match value.trim().to_ascii_lowercase().as_str() {
            "tsv" => Format::Tsv,
            "custom" => Format::Custom,
            _ => Format::Csv,
        })
    }
}

/// Resolved delimited-text options shared by both directions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyDialect {
    pub format: Format,
    pub delimiter: char,
    pub header: bool,
    pub quote: Option<char>,
    /// `Some("")` is an explicit empty sentinel, distinct from `None`.
    pub null: Option<String>,
}

impl CopyDialect {
    pub fn new(format: Format, custom_delimiter: &str) -> Self {
        Self {
            format,
            delimiter: resolve_delimiter(format, custom_delimiter),
            header: false,
            quote: None,
            null: None,
        }
    }

    pub fn with_header(mut self, header: bool) -> Self {
        self.header = header;
        self
    }

    pub fn with_quote(mut self, quote: Option<char>) -> Self {
        self.quote = quote;
        self
    }

    pub fn with_null(mut self, null: Option<String>) -> Self {
        self.null = null;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportRequest {
    pub query: String,
    pub dialect: CopyDialect,
    pub encoding: Option<String>,
}

impl ExportRequest {
    pub fn new(query: impl Into<String>, dialect: CopyDialect) -> Self {
        Self {
            query: query.into(),
            dialect,
            encoding: None,
        }
    }

    pub fn with_encoding(mut self, encoding: Option<String>) -> Self {
        self.encoding = encoding.filter(|value| !value.is_empty());
        self
    }

    pub fn command(&self) -> String {
        command::copy_to_command(&self.query, &self.dialect, self.encoding.as_deref())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportRequest {
    pub table: String,
    /// Target columns in source order; empty means every column in table order.
    pub columns: Vec<String>,
    pub dialect: CopyDialect,
    pub dry_run: bool,
}

impl ImportRequest {
    pub fn new(table: impl Into<String>, dialect: CopyDialect) -> Self {
        Self {
            table: table.into(),
            columns: Vec::new(),
            dialect,
            dry_run: false,
        }
    }

    /// Keep only mapping entries with a non-empty target name.
    pub fn with_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = columns
            .into_iter()
            .map(Into::into)
            .filter(|column: &String| !column.trim().is_empty())
            .collect();
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn command(&self) -> String {
        command::copy_from_command(&self.table, &self.columns, &self.dialect)
    }
}

/// One fully described transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferRequest {
    Export(ExportRequest),
    Import(ImportRequest),
}

impl TransferRequest {
    pub fn direction(&self) -> Direction {
        match self {
            TransferRequest::Export(_) => Direction::Export,
            TransferRequest::Import(_) => Direction::Import,
        }
    }

    pub fn command(&self) -> String {
        match self {
            TransferRequest::Export(request) => request.command(),
            TransferRequest::Import(request) => request.command(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportOutcome {
    pub row_count: u64,
    pub byte_size: u64,
    pub elapsed: Duration,
    pub payload: Vec<u8>,
}

impl ExportOutcome {
    pub fn elapsed_ms(&self) -> u64 {
        self.elapsed.as_millis() as u64
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportOutcome {
    /// COPY FROM does not report a row count; this stays `None`.
    pub rows_imported: Option<u64>,
    pub byte_size: u64,
    pub elapsed: Duration,
    pub committed: bool,
}

impl ImportOutcome {
    pub fn elapsed_ms(&self) -> u64 {
        self.elapsed.as_millis() as u64
    }
}
