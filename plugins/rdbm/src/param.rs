use std::sync::Arc;

use serde::Deserialize;

use ferry_api::driver::TableParam;
use ferry_api::field::Field;
use ferry_api::{Configuration, PluginError};

/// `parameter` of an rdbm reader or writer slice.
///
/// Every key is optional; absent keys take their defaults.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ParamConfig {
    pub username: String,
    pub password: String,
    pub connection: ConnectionConfig,
    /// Requested columns, `["*"]` or empty for all.
    pub column: Vec<String>,
    #[serde(rename = "where")]
    pub where_clause: String,
    /// Replaces the generated select statement when set.
    pub query_sql: String,
    /// Rows bound per `exec_batch` call.
    pub batch_size: usize,
    pub pre_sql: Vec<String>,
    pub post_sql: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    pub url: String,
    pub table: TableParam,
}

fn default_batch_size() -> usize {
    1000
}

impl Default for ParamConfig {
    fn default() -> Self {
        Self {
            username: String::new(),
            password: String::new(),
            connection: ConnectionConfig::default(),
            column: Vec::new(),
            where_clause: String::new(),
            query_sql: String::new(),
            batch_size: default_batch_size(),
            pre_sql: Vec::new(),
            post_sql: Vec::new(),
        }
    }
}

impl ParamConfig {
    pub fn from_parameter(parameter: &Configuration) -> Result<Self, PluginError> {
        let param: Self = parameter.decode("")?;
        if param.batch_size == 0 {
            return Err(PluginError::config("batchSize must be positive"));
        }
        Ok(param)
    }

    /// Table addressed by this parameter, carrying the requested columns.
    pub fn table(&self) -> TableParam {
        TableParam {
            columns: self.column.clone(),
            ..self.connection.table.clone()
        }
    }

    /// `querySql` if set, else `SELECT <fields> FROM <table> [WHERE ...]`.
    pub fn select_sql(&self, fields: &[Arc<dyn Field>]) -> String {
        if !self.query_sql.trim().is_empty() {
            return self.query_sql.clone();
        }
        let select = if fields.is_empty() {
            "*".to_string()
        } else {
            fields.iter().map(|f| f.select()).collect::<Vec<_>>().join(", ")
        };
        let mut sql = format!("SELECT {select} FROM {}", self.connection.table);
        if !self.where_clause.trim().is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&self.where_clause);
        }
        sql
    }

    /// `INSERT INTO <table> (<fields>) VALUES (<bind vars>)`.
    pub fn insert_sql(&self, fields: &[Arc<dyn Field>]) -> String {
        let columns: Vec<String> = fields.iter().map(|f| f.quoted()).collect();
        let binds: Vec<String> = fields
            .iter()
            .enumerate()
            .map(|(i, f)| f.bind_var(i + 1))
            .collect();
        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.connection.table,
            columns.join(", "),
            binds.join(", ")
        )
    }
}

/// Dialect of the plugin plus the decoded parameter of its slice.
pub(crate) fn resolve(
    plugin_conf: &Configuration,
    parameter: &Configuration,
) -> Result<(String, ParamConfig), PluginError> {
    let dialect = plugin_conf.get_string("dialect")?;
    let param = ParamConfig::from_parameter(parameter)?;
    Ok((dialect, param))
}
