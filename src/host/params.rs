//! Parameter bag handed over by the hosting workflow engine.
//!
//! Field names and defaults follow the engine's camelCase conventions so a
//! saved node configuration deserializes unchanged. Converting the bag into a
//! request resolves every option before any connection is used.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::copy::{CopyDialect, ExportRequest, Format, ImportRequest};
use crate::error::{CopyError, CopyResult};

fn default_operation() -> String {
    "copyTo".to_string()
}

fn default_custom_delimiter() -> String {
    "|".to_string()
}

const fn default_true() -> bool {
    true
}

fn default_file_name() -> String {
    "export.csv".to_string()
}

fn default_binary_field() -> String {
    "data".to_string()
}

/// First character of an optional single-character option.
fn single_char(name: &str, value: Option<&str>) -> Option<char> {
    let value = value?;
    let mut chars = value.chars();
    let first = chars.next()?;
    if chars.next().is_some() {
        log::warn!("{name}: only the first character of {value:?} is used");
    }
    Some(first)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    CopyTo,
    CopyFrom,
}

impl FromStr for Operation {
    type Err = CopyError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "copyTo" => Ok(Operation::CopyTo),
            "copyFrom" => Ok(Operation::CopyFrom),
            other => Err(CopyError::UnsupportedOperation(other.to_string())),
        }
    }
}

/// Extra options for exports.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportOptions {
    #[serde(default)]
    pub quote_char: Option<String>,
    #[serde(default)]
    pub null_string: Option<String>,
    #[serde(default)]
    pub encoding: Option<String>,
}

/// Extra options for imports.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportOptions {
    #[serde(default)]
    pub quote_char: Option<String>,
    #[serde(default)]
    pub null_string: Option<String>,
    /// Accepted for compatibility; COPY has no per-row recovery.
    #[serde(default)]
    pub skip_errors: bool,
    #[serde(default)]
    pub dry_run: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ColumnTarget {
    #[serde(default)]
    pub target: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ColumnMapping {
    #[serde(default)]
    pub columns: Vec<ColumnTarget>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CopyParameters {
    #[serde(default = "default_operation")]
    pub operation: String,

    // COPY TO
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub output_format: String,
    #[serde(default = "default_custom_delimiter")]
    pub custom_delimiter: String,
    #[serde(default = "default_true")]
    pub include_header: bool,
    #[serde(default = "default_file_name")]
    pub file_name: String,
    #[serde(default = "default_binary_field")]
    pub binary_property_name: String,
    #[serde(default)]
    pub options: ExportOptions,

    // COPY FROM
    #[serde(default)]
    pub table_name: String,
    #[serde(default = "default_binary_field")]
    pub input_binary_field: String,
    #[serde(default)]
    pub input_format: String,
    #[serde(default = "default_custom_delimiter")]
    pub input_custom_delimiter: String,
    #[serde(default = "default_true")]
    pub has_header: bool,
    #[serde(default)]
    pub column_mapping: ColumnMapping,
    #[serde(default)]
    pub input_options: ImportOptions,
}

impl Default for CopyParameters {
    fn default() -> Self {
        Self {
            operation: default_operation(),
            query: String::new(),
            output_format: String::new(),
            custom_delimiter: default_custom_delimiter(),
            include_header: default_true(),
            file_name: default_file_name(),
            binary_property_name: default_binary_field(),
            options: ExportOptions::default(),
            table_name: String::new(),
            input_binary_field: default_binary_field(),
            input_format: String::new(),
            input_custom_delimiter: default_custom_delimiter(),
            has_header: default_true(),
            column_mapping: ColumnMapping::default(),
            input_options: ImportOptions::default(),
        }
    }
}

impl CopyParameters {
    pub fn operation(&self) -> CopyResult<Operation> {
        self.operation.parse()
    }

    pub fn output_format(&self) -> Format {
        Format::from_str(&self.output_format).unwrap_or_default()
    }

    pub fn input_format(&self) -> Format {
        Format::from_str(&self.input_format).unwrap_or_default()
    }

    pub fn export_request(&self) -> CopyResult<ExportRequest> {
        if self.query.trim().is_empty() {
            return Err(CopyError::InvalidParameter("query must not be empty".into()));
        }

        let dialect = CopyDialect::new(self.output_format(), &self.custom_delimiter)
            .with_header(self.include_header)
            .with_quote(single_char("quoteChar", self.options.quote_char.as_deref()))
            .with_null(self.options.null_string.clone());

        Ok(ExportRequest::new(self.query.clone(), dialect)
            .with_encoding(self.options.encoding.clone()))
    }

    pub fn import_request(&self) -> CopyResult<ImportRequest> {
        if self.table_name.trim().is_empty() {
            return Err(CopyError::InvalidParameter("tableName must not be empty".into()));
        }
        if self.input_options.skip_errors {
            log::warn!("copy from: skipErrors has no effect, COPY aborts on the first bad row");
        }

        let dialect = CopyDialect::new(self.input_format(), &self.input_custom_delimiter)
            .with_header(self.has_header)
            .with_quote(single_char(
                "quoteChar",
                self.input_options.quote_char.as_deref(),
            ))
            .with_null(self.input_options.null_string.clone());

        Ok(ImportRequest::new(self.table_name.clone(), dialect)
            .with_columns(
                self.column_mapping
                    .columns
                    .iter()
                    .map(|column| column.target.clone()),
            )
            .with_dry_run(self.input_options.dry_run))
    }
}
