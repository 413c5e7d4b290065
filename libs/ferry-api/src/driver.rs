//! Store-connection capabilities.
//!
//! The engine never talks to a store directly. Reader plugins get a
//! [`Querier`], writer plugins an [`Execer`], each built by a factory
//! injected at plugin construction and keyed by (dialect, parameter
//! configuration).

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::Configuration;
use crate::error::PluginError;
use crate::field::{DriverValue, Field, Scanner};

/// Table addressed by a plugin.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableParam {
    pub db: String,
    pub schema: String,
    pub name: String,
    /// Requested columns. Empty or `["*"]` means every column.
    #[serde(skip)]
    pub columns: Vec<String>,
}

impl TableParam {
    pub fn all_columns(&self) -> bool {
        self.columns.is_empty() || self.columns.iter().any(|c| c == "*")
    }
}

impl fmt::Display for TableParam {
    /// `db.schema.name`, skipping empty parts.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<&str> = [&self.db, &self.schema, &self.name]
            .into_iter()
            .map(String::as_str)
            .filter(|s| !s.is_empty())
            .collect();
        f.write_str(&parts.join("."))
    }
}

/// Result set of one query.
#[async_trait]
pub trait Rows: Send {
    fn fields(&self) -> &[Arc<dyn Field>];

    /// Advance to the next row. `Ok(false)` on exhaustion.
    async fn next(&mut self) -> Result<bool, PluginError>;

    /// Scan the current row positionally, one scanner per field.
    fn scan(&mut self, scanners: &mut [Box<dyn Scanner>]) -> Result<(), PluginError>;
}

#[async_trait]
pub trait Querier: Send {
    /// Column metadata of `table`; doubles as the connection check.
    async fn fetch_table(&mut self, table: &TableParam) -> Result<Vec<Arc<dyn Field>>, PluginError>;

    async fn query(&mut self, sql: &str) -> Result<Box<dyn Rows>, PluginError>;

    async fn close(&mut self) -> Result<(), PluginError>;
}

#[async_trait]
pub trait Execer: Send {
    async fn fetch_table(&mut self, table: &TableParam) -> Result<Vec<Arc<dyn Field>>, PluginError>;

    /// Run one statement, returning the affected row count.
    async fn exec(&mut self, sql: &str) -> Result<u64, PluginError>;

    /// Run `sql` once per bound row.
    async fn exec_batch(&mut self, sql: &str, rows: Vec<Vec<DriverValue>>) -> Result<u64, PluginError>;

    async fn close(&mut self) -> Result<(), PluginError>;
}

pub type QuerierFactory =
    Arc<dyn Fn(&str, &Configuration) -> Result<Box<dyn Querier>, PluginError> + Send + Sync>;

pub type ExecerFactory =
    Arc<dyn Fn(&str, &Configuration) -> Result<Box<dyn Execer>, PluginError> + Send + Sync>;
