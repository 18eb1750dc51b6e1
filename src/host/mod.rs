//! Contract with the hosting workflow engine: parameter bag in, output items out.

pub mod items;
pub mod params;
pub mod runner;

pub use items::{BinaryData, ExportRecord, ImportRecord, InputItem, OutputItem};
pub use params::{CopyParameters, Operation};
pub use runner::{execute_items, run_invocation};
