//! COPY command text construction.
//!
//! Everything here is pure: a request is turned into its final command text
//! before any connection is touched. Table names, column names and queries are
//! interpolated as given; callers own that trust boundary.

use super::request::{CopyDialect, Format};

/// Delimiter used when a custom format is selected without a delimiter.
pub const FALLBACK_DELIMITER: char = '|';

/// Effective single-character delimiter for a format selector.
pub fn resolve_delimiter(format: Format, custom: &str) -> char {
    match format {
        Format::Tsv => '\t',
        Format::Custom => custom.chars().next().unwrap_or(FALLBACK_DELIMITER),
        Format::Csv => ',',
    }
}

/// Single-quoted SQL literal with embedded quotes doubled.
fn literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Ordered option clauses for the `WITH (...)` part of a COPY command.
pub fn copy_options(dialect: &CopyDialect, encoding: Option<&str>) -> Vec<String> {
    let mut options = vec![
        "FORMAT CSV".to_string(),
        format!("DELIMITER {}", literal(&dialect.delimiter.to_string())),
    ];
    if dialect.header {
        options.push("HEADER".to_string());
    }
    if let Some(quote) = dialect.quote {
        options.push(format!("QUOTE {}", literal(&quote.to_string())));
    }
    if let Some(null) = &dialect.null {
        options.push(format!("NULL {}", literal(null)));
    }
    if let Some(encoding) = encoding.filter(|value| !value.is_empty()) {
        options.push(format!("ENCODING {}", literal(encoding)));
    }
    options
}

pub fn copy_to_command(query: &str, dialect: &CopyDialect, encoding: Option<&str>) -> String {
    format!(
        "COPY ({}) TO STDOUT WITH ({})",
        query.trim(),
        copy_options(dialect, encoding).join(", ")
    )
}

pub fn copy_from_command(table: &str, columns: &[String], dialect: &CopyDialect) -> String {
    let targets: Vec<&str> = columns
        .iter()
        .map(|column| column.trim())
        .filter(|column| !column.is_empty())
        .collect();
    let column_clause = if targets.is_empty() {
        String::new()
    } else {
        format!(" ({})", targets.join(", "))
    };

    format!(
        "COPY {}{} FROM STDIN WITH ({})",
        table.trim(),
        column_clause,
        copy_options(dialect, None).join(", ")
    )
}
