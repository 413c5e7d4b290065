use std::mem;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use ferry_api::driver::{Execer, ExecerFactory};
use ferry_api::field::{DriverValue, Field};
use ferry_api::plugin::{BaseJob, BaseTask, Job, RecordReceiver, Task, WriterPlugin, WriterTask};
use ferry_api::split::{ReplicaSplit, SplitStrategy};
use ferry_api::{Configuration, PluginError, Record};

use crate::param::{self, ParamConfig};

/// Writer into any relational store reachable through an [`Execer`].
pub struct RdbmWriter {
    plugin_conf: Configuration,
    new_execer: ExecerFactory,
}

impl RdbmWriter {
    pub fn new(name: &str, dialect: &str, new_execer: ExecerFactory) -> Self {
        Self {
            plugin_conf: Configuration::from_value(json!({ "name": name, "dialect": dialect })),
            new_execer,
        }
    }

    pub fn with_plugin_conf(plugin_conf: Configuration, new_execer: ExecerFactory) -> Self {
        Self { plugin_conf, new_execer }
    }
}

impl WriterPlugin for RdbmWriter {
    fn plugin_conf(&self) -> Configuration {
        self.plugin_conf.clone()
    }

    fn job(&self) -> Box<dyn Job> {
        Box::new(RdbmWriterJob::new(self.new_execer.clone()))
    }

    fn task(&self) -> Box<dyn WriterTask> {
        Box::new(RdbmWriterTask::new(self.new_execer.clone()))
    }
}

struct Opened {
    execer: Box<dyn Execer>,
    param: ParamConfig,
    fields: Vec<Arc<dyn Field>>,
}

async fn open(
    new_execer: &ExecerFactory,
    plugin_conf: &Configuration,
    parameter: &Configuration,
) -> Result<Opened, PluginError> {
    let (dialect, param) = param::resolve(plugin_conf, parameter)?;
    let mut execer = new_execer(&dialect, parameter)?;
    match execer.fetch_table(&param.table()).await {
        Ok(fields) => Ok(Opened { execer, param, fields }),
        Err(e) => {
            if let Err(close) = execer.close().await {
                tracing::warn!(error = %close, "close after failed fetch");
            }
            Err(e.with_context(param.connection.table.to_string()))
        }
    }
}

async fn close(execer: Option<Box<dyn Execer>>) -> Result<(), PluginError> {
    match execer {
        Some(mut e) => e.close().await,
        None => Ok(()),
    }
}

/// Run each statement in order, stopping at the first failure.
async fn exec_all(execer: &mut dyn Execer, statements: &[String]) -> Result<(), PluginError> {
    for sql in statements.iter().filter(|s| !s.trim().is_empty()) {
        tracing::info!(%sql, "rdbm writer statement");
        execer.exec(sql).await.map_err(|e| e.with_context(sql))?;
    }
    Ok(())
}

/// Bind a record positionally against the table's fields.
fn bind(fields: &[Arc<dyn Field>], record: &Record) -> Result<Vec<DriverValue>, PluginError> {
    if record.len() != fields.len() {
        return Err(PluginError::conversion(format!(
            "record has {} columns, table expects {}",
            record.len(),
            fields.len()
        )));
    }
    fields
        .iter()
        .zip(record.iter())
        .map(|(field, column)| {
            field
                .valuer(column.value())
                .value()
                .map_err(|e| PluginError::from(e).with_context(field.name()))
        })
        .collect()
}

struct RdbmWriterJob {
    base: BaseJob,
    new_execer: ExecerFactory,
    execer: Option<Box<dyn Execer>>,
    param: ParamConfig,
}

impl RdbmWriterJob {
    fn new(new_execer: ExecerFactory) -> Self {
        Self {
            base: BaseJob::default(),
            new_execer,
            execer: None,
            param: ParamConfig::default(),
        }
    }

    fn execer(&mut self) -> Result<&mut dyn Execer, PluginError> {
        match self.execer.as_mut() {
            Some(e) => Ok(e.as_mut()),
            None => Err(PluginError::state("writer job not initialized")),
        }
    }
}

#[async_trait]
impl Job for RdbmWriterJob {
    fn base(&self) -> &BaseJob {
        &self.base
    }

    fn base_mut(&mut self) -> &mut BaseJob {
        &mut self.base
    }

    async fn init(&mut self) -> Result<(), PluginError> {
        let parameter = self.base.parameter()?;
        let opened = open(&self.new_execer, self.base.plugin_conf(), &parameter).await?;
        self.execer = Some(opened.execer);
        self.param = opened.param;
        Ok(())
    }

    async fn prepare(&mut self) -> Result<(), PluginError> {
        let statements = self.param.pre_sql.clone();
        exec_all(self.execer()?, &statements).await
    }

    async fn split(&mut self, number: usize) -> Result<Vec<Configuration>, PluginError> {
        ReplicaSplit.split(self.base.plugin_job_conf(), number)
    }

    async fn post(&mut self) -> Result<(), PluginError> {
        let statements = self.param.post_sql.clone();
        exec_all(self.execer()?, &statements).await
    }

    async fn destroy(&mut self) -> Result<(), PluginError> {
        close(self.execer.take()).await
    }
}

struct RdbmWriterTask {
    base: BaseTask,
    new_execer: ExecerFactory,
    execer: Option<Box<dyn Execer>>,
    param: ParamConfig,
    fields: Vec<Arc<dyn Field>>,
}

impl RdbmWriterTask {
    fn new(new_execer: ExecerFactory) -> Self {
        Self {
            base: BaseTask::default(),
            new_execer,
            execer: None,
            param: ParamConfig::default(),
            fields: Vec::new(),
        }
    }
}

#[async_trait]
impl Task for RdbmWriterTask {
    fn base(&self) -> &BaseTask {
        &self.base
    }

    fn base_mut(&mut self) -> &mut BaseTask {
        &mut self.base
    }

    async fn init(&mut self) -> Result<(), PluginError> {
        let parameter = self.base.parameter()?;
        let opened = open(&self.new_execer, self.base.plugin_conf(), &parameter).await?;
        if opened.fields.is_empty() {
            if let Err(e) = close(Some(opened.execer)).await {
                tracing::warn!(error = %e, "close after empty fetch");
            }
            return Err(PluginError::config("no columns to write"));
        }
        self.execer = Some(opened.execer);
        self.param = opened.param;
        self.fields = opened.fields;
        Ok(())
    }

    async fn destroy(&mut self) -> Result<(), PluginError> {
        close(self.execer.take()).await
    }
}

#[async_trait]
impl WriterTask for RdbmWriterTask {
    async fn start_write(&mut self, receiver: &mut dyn RecordReceiver) -> Result<(), PluginError> {
        let task = self.base.task_id();
        let execer = self
            .execer
            .as_mut()
            .ok_or_else(|| PluginError::state("writer task not initialized"))?;

        let sql = self.param.insert_sql(&self.fields);
        let batch_size = self.param.batch_size;
        let mut batch = Vec::with_capacity(batch_size);
        let mut written = 0u64;
        while let Some(record) = receiver.get_from_reader().await? {
            batch.push(bind(&self.fields, &record)?);
            if batch.len() >= batch_size {
                written += execer.exec_batch(&sql, mem::take(&mut batch)).await?;
            }
        }
        if !batch.is_empty() {
            written += execer.exec_batch(&sql, batch).await?;
        }
        tracing::debug!(task, rows = written, "rdbm writer done");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use ferry_api::error::ChannelError;
    use ferry_api::{Column, ColumnValue, ErrorKind};
    use serde_json::Value;

    use super::*;
    use crate::mock::{MockExecer, MockField};

    struct QueueReceiver {
        records: VecDeque<Record>,
        end: Result<Option<Record>, ChannelError>,
    }

    impl QueueReceiver {
        fn new(records: Vec<Record>) -> Self {
            Self { records: records.into(), end: Ok(None) }
        }
    }

    #[async_trait]
    impl RecordReceiver for QueueReceiver {
        async fn get_from_reader(&mut self) -> Result<Option<Record>, ChannelError> {
            match self.records.pop_front() {
                Some(r) => Ok(Some(r)),
                None => self.end.clone(),
            }
        }

        fn shutdown(&mut self) {}
    }

    fn record(id: i64, name: Option<&str>) -> Record {
        let mut r = Record::new();
        r.add_column(Column::new("id", ColumnValue::from_big_int(id))).unwrap();
        let name = match name {
            Some(n) => ColumnValue::from_string(n),
            None => ColumnValue::nil(ferry_api::ColumnType::String),
        };
        r.add_column(Column::new("name", name)).unwrap();
        r
    }

    fn execer() -> MockExecer {
        MockExecer {
            fields: vec![MockField::int64("id"), MockField::string("name")],
            ..Default::default()
        }
    }

    fn writer(e: MockExecer) -> RdbmWriter {
        RdbmWriter::new("mysqlwriter", "mysql", e.factory())
    }

    fn slice(parameter: Value) -> Configuration {
        Configuration::from_value(json!({ "name": "mysqlwriter", "parameter": parameter }))
    }

    fn job(plugin: &RdbmWriter, plugin_conf: Configuration, slice: Configuration) -> Box<dyn Job> {
        let mut job = plugin.job();
        job.base_mut().set_plugin_conf(plugin_conf);
        job.base_mut().set_plugin_job_conf(slice);
        job
    }

    fn task(plugin: &RdbmWriter, parameter: Value) -> Box<dyn WriterTask> {
        let mut task = plugin.task();
        task.base_mut().set_plugin_conf(plugin.plugin_conf());
        task.base_mut().set_plugin_job_conf(slice(parameter));
        task
    }

    fn users(extra: Value) -> Value {
        let mut p = json!({ "connection": { "table": { "name": "users" } } });
        if let (Some(p), Value::Object(extra)) = (p.as_object_mut(), extra) {
            p.extend(extra);
        }
        p
    }

    #[tokio::test]
    async fn job_init() {
        let plugin = writer(execer());
        let conf = plugin.plugin_conf();

        assert!(job(&plugin, conf.clone(), slice(json!({}))).init().await.is_ok());

        let err = job(&plugin, Configuration::new(), slice(json!({}))).init().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);

        let no_parameter = Configuration::from_value(json!({ "name": "mysqlwriter" }));
        assert!(job(&plugin, conf.clone(), no_parameter).init().await.is_err());

        let err = job(&plugin, conf.clone(), slice(json!({ "username": 1 }))).init().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);

        let failing: ExecerFactory =
            Arc::new(|_: &str, _: &Configuration| Err(PluginError::connection("refused")));
        let plugin = RdbmWriter::new("mysqlwriter", "mysql", failing);
        let err = job(&plugin, plugin.plugin_conf(), slice(json!({}))).init().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Connection);

        let plugin = writer(MockExecer { fetch_err: true, ..execer() });
        assert!(job(&plugin, plugin.plugin_conf(), slice(json!({}))).init().await.is_err());
    }

    #[tokio::test]
    async fn job_runs_pre_and_post_statements() {
        let e = execer();
        let log = e.log.clone();
        let plugin = writer(e);
        let parameter = users(json!({
            "preSql": ["DELETE FROM users", " "],
            "postSql": ["ANALYZE users"]
        }));
        let s = slice(parameter);
        let mut job = job(&plugin, plugin.plugin_conf(), s.clone());
        job.init().await.unwrap();
        job.prepare().await.unwrap();
        assert_eq!(job.split(2).await.unwrap(), vec![s.clone(), s]);
        job.post().await.unwrap();
        job.destroy().await.unwrap();

        let log = log.lock().unwrap();
        assert_eq!(log.execs, ["DELETE FROM users", "ANALYZE users"]);
        assert_eq!(log.closed, 1);
    }

    #[tokio::test]
    async fn job_prepare_fails_on_statement_error() {
        let plugin = writer(MockExecer { exec_err: true, ..execer() });
        let mut job = job(&plugin, plugin.plugin_conf(), slice(users(json!({ "preSql": ["TRUNCATE users"] }))));
        job.init().await.unwrap();
        let err = job.prepare().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);
        assert!(err.message.starts_with("TRUNCATE users:"));
    }

    #[tokio::test]
    async fn start_write_batches_rows() {
        let e = execer();
        let log = e.log.clone();
        let plugin = writer(e);
        let mut task = task(&plugin, users(json!({ "batchSize": 2 })));
        task.init().await.unwrap();

        let records = vec![record(1, Some("a")), record(2, None), record(3, Some("c"))];
        task.start_write(&mut QueueReceiver::new(records)).await.unwrap();
        task.destroy().await.unwrap();

        let log = log.lock().unwrap();
        assert_eq!(log.execs, vec!["INSERT INTO users (`id`, `name`) VALUES (?, ?)"; 2]);
        assert_eq!(log.batches.len(), 2);
        assert_eq!(
            log.batches[0],
            vec![
                vec![DriverValue::Int64(1), DriverValue::String("a".into())],
                vec![DriverValue::Int64(2), DriverValue::Null],
            ]
        );
        assert_eq!(log.batches[1], vec![vec![DriverValue::Int64(3), DriverValue::String("c".into())]]);
        assert_eq!(log.closed, 1);
    }

    #[tokio::test]
    async fn start_write_rejects_unbindable_records() {
        let plugin = writer(execer());
        let mut task = task(&plugin, users(json!({})));
        task.init().await.unwrap();

        let mut short = Record::new();
        short.add_column(Column::new("id", ColumnValue::from_big_int(1))).unwrap();
        let err = task.start_write(&mut QueueReceiver::new(vec![short])).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conversion);

        let mut bad = Record::new();
        bad.add_column(Column::new("id", ColumnValue::from_string("one"))).unwrap();
        bad.add_column(Column::new("name", ColumnValue::from_string("x"))).unwrap();
        let err = task.start_write(&mut QueueReceiver::new(vec![bad])).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conversion);
        assert!(err.message.starts_with("id:"));
    }

    #[tokio::test]
    async fn start_write_stops_on_exec_or_channel_errors() {
        let plugin = writer(MockExecer { exec_err: true, ..execer() });
        let mut task = task(&plugin, users(json!({})));
        task.init().await.unwrap();
        let err = task.start_write(&mut QueueReceiver::new(vec![record(1, None)])).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);

        let e = execer();
        let log = e.log.clone();
        let plugin = writer(e);
        let mut task = self::task(&plugin, users(json!({})));
        task.init().await.unwrap();
        let mut receiver = QueueReceiver {
            records: vec![record(1, None)].into(),
            end: Err(ChannelError::Shutdown),
        };
        let err = task.start_write(&mut receiver).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Shutdown);
        assert!(log.lock().unwrap().batches.is_empty());
    }

    #[tokio::test]
    async fn start_write_stops_when_a_later_batch_fails() {
        let e = MockExecer { batch_fail_at: Some(1), ..execer() };
        let log = e.log.clone();
        let plugin = writer(e);
        let mut task = task(&plugin, users(json!({ "batchSize": 2 })));
        task.init().await.unwrap();

        let records = vec![record(1, Some("a")), record(2, None), record(3, Some("c"))];
        let err = task.start_write(&mut QueueReceiver::new(records)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);

        let log = log.lock().unwrap();
        assert_eq!(log.batches.len(), 1);
        assert_eq!(log.batches[0].len(), 2);
    }

    #[tokio::test]
    async fn task_init_requires_columns() {
        let plugin = writer(MockExecer::default());
        let mut task = task(&plugin, users(json!({})));
        assert_eq!(task.init().await.unwrap_err().kind(), ErrorKind::Config);
    }
}
