//! In-memory drivers for tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use ferry_api::driver::{Execer, ExecerFactory, Querier, QuerierFactory, Rows, TableParam};
use ferry_api::field::{BaseField, BaseFieldType, DriverValue, Field, FieldType, GoFieldType, GoType, Scanner};
use ferry_api::{Configuration, PluginError};

pub struct MockField {
    base: BaseField,
}

impl MockField {
    pub fn new(name: &str, database_type: &str, go_type: GoType) -> Arc<dyn Field> {
        let field_type = GoFieldType::new(BaseFieldType::new(name, database_type), go_type);
        Arc::new(Self { base: BaseField::new(name, field_type) })
    }

    pub fn int64(name: &str) -> Arc<dyn Field> {
        Self::new(name, "BIGINT", GoType::Int64)
    }

    pub fn string(name: &str) -> Arc<dyn Field> {
        Self::new(name, "VARCHAR", GoType::String)
    }
}

impl Field for MockField {
    fn name(&self) -> &str {
        self.base.name()
    }

    fn quoted(&self) -> String {
        format!("`{}`", self.base.name())
    }

    fn bind_var(&self, _i: usize) -> String {
        "?".to_string()
    }

    fn field_type(&self) -> &dyn FieldType {
        self.base.field_type()
    }
}

/// Calls observed by the mocks, shared with the test.
#[derive(Debug, Default)]
pub struct Log {
    pub tables: Vec<TableParam>,
    pub queries: Vec<String>,
    pub execs: Vec<String>,
    pub batches: Vec<Vec<Vec<DriverValue>>>,
    pub closed: usize,
}

pub type SharedLog = Arc<Mutex<Log>>;

struct MockRows {
    fields: Vec<Arc<dyn Field>>,
    rows: VecDeque<Vec<DriverValue>>,
    current: Vec<DriverValue>,
    fetched: usize,
    next_err_at: Option<usize>,
}

#[async_trait]
impl Rows for MockRows {
    fn fields(&self) -> &[Arc<dyn Field>] {
        &self.fields
    }

    async fn next(&mut self) -> Result<bool, PluginError> {
        if self.next_err_at == Some(self.fetched) {
            return Err(PluginError::io(format!("fetch failed at row {}", self.fetched)));
        }
        self.fetched += 1;
        match self.rows.pop_front() {
            Some(row) => {
                self.current = row;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn scan(&mut self, scanners: &mut [Box<dyn Scanner>]) -> Result<(), PluginError> {
        if scanners.len() != self.current.len() {
            return Err(PluginError::conversion("scanner count mismatch"));
        }
        for (scanner, value) in scanners.iter_mut().zip(self.current.drain(..)) {
            scanner.scan(value)?;
        }
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct MockQuerier {
    pub fields: Vec<Arc<dyn Field>>,
    pub rows: Vec<Vec<DriverValue>>,
    /// `Rows::next` fails when asked for this row.
    pub next_err_at: Option<usize>,
    pub fetch_err: bool,
    pub query_err: bool,
    pub close_err: bool,
    pub log: SharedLog,
}

impl MockQuerier {
    pub fn factory(self) -> QuerierFactory {
        Arc::new(move |_: &str, _: &Configuration| Ok(Box::new(self.clone()) as Box<dyn Querier>))
    }
}

#[async_trait]
impl Querier for MockQuerier {
    async fn fetch_table(&mut self, table: &TableParam) -> Result<Vec<Arc<dyn Field>>, PluginError> {
        if self.fetch_err {
            return Err(PluginError::connection("fetch failed"));
        }
        self.log.lock().unwrap().tables.push(table.clone());
        Ok(self.fields.clone())
    }

    async fn query(&mut self, sql: &str) -> Result<Box<dyn Rows>, PluginError> {
        if self.query_err {
            return Err(PluginError::io("query failed"));
        }
        self.log.lock().unwrap().queries.push(sql.to_string());
        Ok(Box::new(MockRows {
            fields: self.fields.clone(),
            rows: self.rows.iter().cloned().collect(),
            current: Vec::new(),
            fetched: 0,
            next_err_at: self.next_err_at,
        }))
    }

    async fn close(&mut self) -> Result<(), PluginError> {
        self.log.lock().unwrap().closed += 1;
        if self.close_err {
            return Err(PluginError::connection("close failed"));
        }
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct MockExecer {
    pub fields: Vec<Arc<dyn Field>>,
    pub fetch_err: bool,
    pub exec_err: bool,
    /// `exec_batch` fails on this call, counting from zero.
    pub batch_fail_at: Option<usize>,
    pub log: SharedLog,
}

impl MockExecer {
    pub fn factory(self) -> ExecerFactory {
        Arc::new(move |_: &str, _: &Configuration| Ok(Box::new(self.clone()) as Box<dyn Execer>))
    }
}

#[async_trait]
impl Execer for MockExecer {
    async fn fetch_table(&mut self, table: &TableParam) -> Result<Vec<Arc<dyn Field>>, PluginError> {
        if self.fetch_err {
            return Err(PluginError::connection("fetch failed"));
        }
        self.log.lock().unwrap().tables.push(table.clone());
        Ok(self.fields.clone())
    }

    async fn exec(&mut self, sql: &str) -> Result<u64, PluginError> {
        if self.exec_err {
            return Err(PluginError::io("exec failed"));
        }
        self.log.lock().unwrap().execs.push(sql.to_string());
        Ok(0)
    }

    async fn exec_batch(&mut self, sql: &str, rows: Vec<Vec<DriverValue>>) -> Result<u64, PluginError> {
        let mut log = self.log.lock().unwrap();
        if self.exec_err || self.batch_fail_at == Some(log.batches.len()) {
            return Err(PluginError::io("exec failed"));
        }
        let n = rows.len() as u64;
        log.execs.push(sql.to_string());
        log.batches.push(rows);
        Ok(n)
    }

    async fn close(&mut self) -> Result<(), PluginError> {
        self.log.lock().unwrap().closed += 1;
        Ok(())
    }
}
