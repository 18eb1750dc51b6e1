use std::collections::BTreeMap;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::copy::{ExportOutcome, Format, ImportOutcome};
use crate::error::{CopyError, CopyResult};

/// Binary attachment in the engine's base64 envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BinaryData {
    pub data: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_extension: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_size: Option<u64>,
}

impl BinaryData {
    pub fn from_bytes(bytes: &[u8], file_name: &str, mime_type: &str, extension: &str) -> Self {
        Self {
            data: STANDARD.encode(bytes),
            mime_type: Some(mime_type.to_string()),
            file_name: Some(file_name.to_string()),
            file_extension: Some(extension.to_string()),
            file_size: Some(bytes.len() as u64),
        }
    }

    pub fn decode(&self) -> CopyResult<Vec<u8>> {
        Ok(STANDARD.decode(self.data.trim())?)
    }
}

/// One input item from the engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InputItem {
    #[serde(default)]
    pub json: Value,
    #[serde(default)]
    pub binary: BTreeMap<String, BinaryData>,
}

impl InputItem {
    pub fn with_binary(field: impl Into<String>, data: BinaryData) -> Self {
        let mut binary = BTreeMap::new();
        binary.insert(field.into(), data);
        Self {
            json: Value::Object(Default::default()),
            binary,
        }
    }

    pub fn binary_field(&self, field: &str) -> CopyResult<&BinaryData> {
        self.binary
            .get(field)
            .ok_or_else(|| CopyError::MissingBinaryInput {
                field: field.to_string(),
            })
    }
}

/// One output item returned to the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputItem {
    pub json: Value,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub binary: BTreeMap<String, BinaryData>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportRecord {
    pub row_count: u64,
    pub file_size: u64,
    pub execution_time_ms: u64,
    pub file_name: String,
    pub format: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportRecord {
    pub success: bool,
    pub table: String,
    /// Never populated: COPY FROM does not report how many rows it loaded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rows_imported: Option<u64>,
    pub rows_skipped: u64,
    pub errors: Vec<String>,
    pub execution_time_ms: u64,
    pub dry_run: bool,
    pub committed: bool,
}

fn attachment_kind(format: Format) -> (&'static str, &'static str) {
    match format {
        Format::Csv => ("text/csv", "csv"),
        Format::Tsv | Format::Custom => ("text/tab-separated-values", "tsv"),
    }
}

impl OutputItem {
    pub fn export(
        outcome: &ExportOutcome,
        format: Format,
        file_name: &str,
        binary_property: &str,
    ) -> CopyResult<Self> {
        let record = ExportRecord {
            row_count: outcome.row_count,
            file_size: outcome.byte_size,
            execution_time_ms: outcome.elapsed_ms(),
            file_name: file_name.to_string(),
            format: format.as_str().to_string(),
        };
        let (mime_type, extension) = attachment_kind(format);

        let mut binary = BTreeMap::new();
        binary.insert(
            binary_property.to_string(),
            BinaryData::from_bytes(&outcome.payload, file_name, mime_type, extension),
        );

        Ok(Self {
            json: serde_json::to_value(record)?,
            binary,
        })
    }

    pub fn import(outcome: &ImportOutcome, table: &str, dry_run: bool) -> CopyResult<Self> {
        let record = ImportRecord {
            success: true,
            table: table.to_string(),
            rows_imported: outcome.rows_imported,
            rows_skipped: 0,
            errors: Vec::new(),
            execution_time_ms: outcome.elapsed_ms(),
            dry_run,
            committed: outcome.committed,
        };

        Ok(Self {
            json: serde_json::to_value(record)?,
            binary: BTreeMap::new(),
        })
    }
}
