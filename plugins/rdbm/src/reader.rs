use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use ferry_api::driver::{Querier, QuerierFactory};
use ferry_api::field::{Field, Scanner};
use ferry_api::plugin::{BaseJob, BaseTask, Job, ReaderPlugin, ReaderTask, RecordSender, Task};
use ferry_api::split::{KeyRangeSplit, SplitStrategy};
use ferry_api::{Column, Configuration, PluginError};

use crate::param::{self, ParamConfig};

/// Reader over any relational store reachable through a [`Querier`].
pub struct RdbmReader {
    plugin_conf: Configuration,
    new_querier: QuerierFactory,
}

impl RdbmReader {
    /// `name` is the plugin name jobs refer to, `dialect` is handed to
    /// `new_querier` together with each slice's parameter.
    pub fn new(name: &str, dialect: &str, new_querier: QuerierFactory) -> Self {
        Self {
            plugin_conf: Configuration::from_value(json!({ "name": name, "dialect": dialect })),
            new_querier,
        }
    }

    /// Reader with an explicit plugin configuration.
    pub fn with_plugin_conf(plugin_conf: Configuration, new_querier: QuerierFactory) -> Self {
        Self { plugin_conf, new_querier }
    }
}

impl ReaderPlugin for RdbmReader {
    fn plugin_conf(&self) -> Configuration {
        self.plugin_conf.clone()
    }

    fn job(&self) -> Box<dyn Job> {
        Box::new(RdbmReaderJob::new(self.new_querier.clone()))
    }

    fn task(&self) -> Box<dyn ReaderTask> {
        Box::new(RdbmReaderTask::new(self.new_querier.clone()))
    }
}

/// Connected querier with the slice it serves and the fields it reported.
struct Opened {
    querier: Box<dyn Querier>,
    param: ParamConfig,
    fields: Vec<Arc<dyn Field>>,
}

async fn open(
    new_querier: &QuerierFactory,
    plugin_conf: &Configuration,
    parameter: &Configuration,
) -> Result<Opened, PluginError> {
    let (dialect, param) = param::resolve(plugin_conf, parameter)?;
    let mut querier = new_querier(&dialect, parameter)?;
    match querier.fetch_table(&param.table()).await {
        Ok(fields) => Ok(Opened { querier, param, fields }),
        Err(e) => {
            if let Err(close) = querier.close().await {
                tracing::warn!(error = %close, "close after failed fetch");
            }
            Err(e.with_context(param.connection.table.to_string()))
        }
    }
}

async fn close(querier: Option<Box<dyn Querier>>) -> Result<(), PluginError> {
    match querier {
        Some(mut q) => q.close().await,
        None => Ok(()),
    }
}

struct RdbmReaderJob {
    base: BaseJob,
    new_querier: QuerierFactory,
    querier: Option<Box<dyn Querier>>,
}

impl RdbmReaderJob {
    fn new(new_querier: QuerierFactory) -> Self {
        Self {
            base: BaseJob::default(),
            new_querier,
            querier: None,
        }
    }
}

#[async_trait]
impl Job for RdbmReaderJob {
    fn base(&self) -> &BaseJob {
        &self.base
    }

    fn base_mut(&mut self) -> &mut BaseJob {
        &mut self.base
    }

    async fn init(&mut self) -> Result<(), PluginError> {
        let parameter = self.base.parameter()?;
        let opened = open(&self.new_querier, self.base.plugin_conf(), &parameter).await?;
        tracing::debug!(
            table = %opened.param.connection.table,
            fields = opened.fields.len(),
            "rdbm reader job connected"
        );
        self.querier = Some(opened.querier);
        Ok(())
    }

    async fn split(&mut self, number: usize) -> Result<Vec<Configuration>, PluginError> {
        KeyRangeSplit.split(self.base.plugin_job_conf(), number)
    }

    async fn destroy(&mut self) -> Result<(), PluginError> {
        close(self.querier.take()).await
    }
}

struct RdbmReaderTask {
    base: BaseTask,
    new_querier: QuerierFactory,
    querier: Option<Box<dyn Querier>>,
    param: ParamConfig,
    fields: Vec<Arc<dyn Field>>,
}

impl RdbmReaderTask {
    fn new(new_querier: QuerierFactory) -> Self {
        Self {
            base: BaseTask::default(),
            new_querier,
            querier: None,
            param: ParamConfig::default(),
            fields: Vec::new(),
        }
    }
}

#[async_trait]
impl Task for RdbmReaderTask {
    fn base(&self) -> &BaseTask {
        &self.base
    }

    fn base_mut(&mut self) -> &mut BaseTask {
        &mut self.base
    }

    async fn init(&mut self) -> Result<(), PluginError> {
        let parameter = self.base.parameter()?;
        let opened = open(&self.new_querier, self.base.plugin_conf(), &parameter).await?;
        self.querier = Some(opened.querier);
        self.param = opened.param;
        self.fields = opened.fields;
        Ok(())
    }

    async fn destroy(&mut self) -> Result<(), PluginError> {
        close(self.querier.take()).await
    }
}

#[async_trait]
impl ReaderTask for RdbmReaderTask {
    async fn start_read(&mut self, sender: &mut dyn RecordSender) -> Result<(), PluginError> {
        let task = self.base.task_id();
        let querier = self
            .querier
            .as_mut()
            .ok_or_else(|| PluginError::state("reader task not initialized"))?;

        let sql = self.param.select_sql(&self.fields);
        tracing::debug!(task, %sql, "rdbm reader query");
        let mut rows = querier.query(&sql).await?;
        let fields = rows.fields().to_vec();
        let mut scanners: Vec<Box<dyn Scanner>> = fields.iter().map(|f| f.scanner()).collect();

        let mut read = 0u64;
        while rows.next().await? {
            let mut record = sender.create_record()?;
            rows.scan(&mut scanners)?;
            for (field, scanner) in fields.iter().zip(scanners.iter_mut()) {
                let value = scanner.take_column()?;
                record.add_column(Column::new(field.name(), value))?;
            }
            sender.send_writer(record).await?;
            read += 1;
        }
        sender.flush().await?;
        sender.terminate().await?;
        tracing::debug!(task, records = read, "rdbm reader done");
        Ok(())
    }
}
