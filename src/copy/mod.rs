//! Streaming COPY pipelines between delimited text and PostgreSQL tables.
//!
//! Main components:
//! - `command`: pure COPY command text construction and delimiter resolution
//! - `request`: resolved transfer requests and their outcomes
//! - `deadline`: per-transfer wall-clock limit
//! - `connection`: the connection seam and its sqlx implementation
//! - `export`: COPY TO STDOUT into an in-memory payload
//! - `import`: COPY FROM STDIN inside an explicit transaction
//!
//! Each export and each import gets its own deadline. Imports are
//! all-or-nothing: the server aborts on the first malformed row and the whole
//! transaction is rolled back.

pub mod command;
pub mod connection;
pub mod deadline;
pub mod export;
pub mod import;
pub mod request;

pub use command::{FALLBACK_DELIMITER, copy_options, resolve_delimiter};
pub use connection::{CopyConnection, CopyInSink, CopyOutStream, PgCopyConnection, release};
pub use deadline::Deadline;
pub use export::run_export;
pub use import::run_import;
pub use request::{
    CopyDialect, Direction, ExportOutcome, ExportRequest, Format, ImportOutcome, ImportRequest,
    TransferRequest,
};
