pub mod config;
mod convert;
pub mod driver;
pub mod error;
pub mod field;
pub mod plugin;
pub mod record;
pub mod split;
pub mod value;

pub use config::Configuration;
pub use error::{ErrorKind, PluginError};
pub use record::{Column, Record};
pub use value::{ColumnType, ColumnValue};
