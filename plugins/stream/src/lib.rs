//! In-process stream plugins.
//!
//! `streamreader` generates `sliceRecordCount` identical records per task
//! from a configured column list. `streamwriter` drains records, counting
//! them and optionally logging each one.

mod reader;
mod writer;

pub use reader::{ColumnSpec, StreamReader, StreamReaderParam};
pub use writer::{StreamWriter, StreamWriterParam};
