//! Relational-store reader and writer plugins.
//!
//! Both plugins are dialect-agnostic: connections come from a
//! [`QuerierFactory`](ferry_api::driver::QuerierFactory) or
//! [`ExecerFactory`](ferry_api::driver::ExecerFactory) supplied when the
//! plugin is constructed.

mod param;
mod reader;
mod writer;

#[cfg(test)]
mod mock;

pub use param::{ConnectionConfig, ParamConfig};
pub use reader::RdbmReader;
pub use writer::RdbmWriter;
