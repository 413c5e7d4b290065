//! State enforcement around plugin jobs and tasks.
//!
//! Plugins implement the raw [`Job`] / [`Task`] traits; the engine only
//! ever drives them through [`ManagedJob`] / [`ManagedTask`], which reject
//! out-of-order calls with an `ErrorKind::State` error. Transitions only
//! move forward. A failed step parks the instance in `Failed`, from which
//! only `destroy` is allowed. `destroy` is bounded by a timeout and always
//! ends in `Destroyed`, even when it reports an error.

use std::time::Duration;

use ferry_api::Configuration;
use ferry_api::error::PluginError;
use ferry_api::plugin::{Job, ReaderTask, RecordReceiver, RecordSender, Task, WriterTask};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Created,
    Initialized,
    Split,
    Failed,
    Destroyed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Created,
    Initialized,
    Executing,
    Failed,
    Destroyed,
}

fn state_error<S: std::fmt::Debug>(name: &str, op: &str, state: S) -> PluginError {
    PluginError::state(format!("'{name}': cannot {op} in state {state:?}"))
}

async fn bounded_destroy<F>(name: &str, timeout: Duration, destroy: F) -> Result<(), PluginError>
where
    F: Future<Output = Result<(), PluginError>>,
{
    let result = match tokio::time::timeout(timeout, destroy).await {
        Ok(r) => r,
        Err(_) => Err(PluginError::io(format!("destroy timed out after {timeout:?}"))),
    };
    if let Err(e) = &result {
        tracing::warn!(plugin = %name, error = %e, "destroy failed");
    }
    result.map_err(|e| e.with_context(name))
}

// ═══════════════════════════════════════════════════════════════
//  Job
// ═══════════════════════════════════════════════════════════════

pub struct ManagedJob {
    name: String,
    job: Box<dyn Job>,
    state: JobState,
    destroy_timeout: Duration,
}

impl ManagedJob {
    /// Wrap a fresh job and hand it its plugin and content-slice configuration.
    pub fn new(
        name: impl Into<String>,
        mut job: Box<dyn Job>,
        plugin_conf: Configuration,
        plugin_job_conf: Configuration,
        destroy_timeout: Duration,
    ) -> Self {
        job.base_mut().set_plugin_conf(plugin_conf);
        job.base_mut().set_plugin_job_conf(plugin_job_conf);
        Self {
            name: name.into(),
            job,
            state: JobState::Created,
            destroy_timeout,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    fn require(&self, op: &str, allowed: &[JobState]) -> Result<(), PluginError> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(state_error(&self.name, op, self.state))
        }
    }

    fn settle<T>(&mut self, result: Result<T, PluginError>, next: JobState) -> Result<T, PluginError> {
        self.state = if result.is_ok() { next } else { JobState::Failed };
        result.map_err(|e| e.with_context(&self.name))
    }

    pub async fn init(&mut self) -> Result<(), PluginError> {
        self.require("init", &[JobState::Created])?;
        let result = self.job.init().await;
        self.settle(result, JobState::Initialized)
    }

    pub async fn prepare(&mut self) -> Result<(), PluginError> {
        self.require("prepare", &[JobState::Initialized])?;
        let result = self.job.prepare().await;
        self.settle(result, JobState::Initialized)
    }

    /// May be repeated; identical input gives identical output.
    pub async fn split(&mut self, number: usize) -> Result<Vec<Configuration>, PluginError> {
        self.require("split", &[JobState::Initialized, JobState::Split])?;
        let result = self.job.split(number).await;
        self.settle(result, JobState::Split)
    }

    pub async fn post(&mut self) -> Result<(), PluginError> {
        self.require("post", &[JobState::Split])?;
        let result = self.job.post().await;
        self.settle(result, JobState::Split)
    }

    pub async fn destroy(&mut self) -> Result<(), PluginError> {
        if self.state == JobState::Destroyed {
            return Err(state_error(&self.name, "destroy", self.state));
        }
        let result = bounded_destroy(&self.name, self.destroy_timeout, self.job.destroy()).await;
        self.state = JobState::Destroyed;
        result
    }
}

// ═══════════════════════════════════════════════════════════════
//  Task
// ═══════════════════════════════════════════════════════════════

pub struct ManagedTask<T: ?Sized + Task> {
    name: String,
    task: Box<T>,
    state: TaskState,
    destroy_timeout: Duration,
}

impl<T: ?Sized + Task> ManagedTask<T> {
    pub fn new(
        name: impl Into<String>,
        mut task: Box<T>,
        plugin_conf: Configuration,
        plugin_job_conf: Configuration,
        task_id: usize,
        destroy_timeout: Duration,
    ) -> Self {
        let base = task.base_mut();
        base.set_plugin_conf(plugin_conf);
        base.set_plugin_job_conf(plugin_job_conf);
        base.set_task_id(task_id);
        Self {
            name: name.into(),
            task,
            state: TaskState::Created,
            destroy_timeout,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    fn require(&self, op: &str, allowed: &[TaskState]) -> Result<(), PluginError> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(state_error(&self.name, op, self.state))
        }
    }

    fn settle(&mut self, result: Result<(), PluginError>, next: TaskState) -> Result<(), PluginError> {
        self.state = if result.is_ok() { next } else { TaskState::Failed };
        result.map_err(|e| e.with_context(&self.name))
    }

    pub async fn init(&mut self) -> Result<(), PluginError> {
        self.require("init", &[TaskState::Created])?;
        let result = self.task.init().await;
        self.settle(result, TaskState::Initialized)
    }

    pub async fn prepare(&mut self) -> Result<(), PluginError> {
        self.require("prepare", &[TaskState::Initialized])?;
        let result = self.task.prepare().await;
        self.settle(result, TaskState::Initialized)
    }

    pub async fn post(&mut self) -> Result<(), PluginError> {
        self.require("post", &[TaskState::Executing])?;
        let result = self.task.post().await;
        self.settle(result, TaskState::Executing)
    }

    pub async fn destroy(&mut self) -> Result<(), PluginError> {
        if self.state == TaskState::Destroyed {
            return Err(state_error(&self.name, "destroy", self.state));
        }
        let result = bounded_destroy(&self.name, self.destroy_timeout, self.task.destroy()).await;
        self.state = TaskState::Destroyed;
        result
    }

    fn begin(&mut self, op: &str) -> Result<(), PluginError> {
        self.require(op, &[TaskState::Initialized])?;
        self.state = TaskState::Executing;
        Ok(())
    }
}

impl ManagedTask<dyn ReaderTask> {
    pub async fn start_read(&mut self, sender: &mut dyn RecordSender) -> Result<(), PluginError> {
        self.begin("start_read")?;
        let result = self.task.start_read(sender).await;
        self.settle(result, TaskState::Executing)
    }
}

impl ManagedTask<dyn WriterTask> {
    pub async fn start_write(&mut self, receiver: &mut dyn RecordReceiver) -> Result<(), PluginError> {
        self.begin("start_write")?;
        let result = self.task.start_write(receiver).await;
        self.settle(result, TaskState::Executing)
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use ferry_api::ErrorKind;
    use ferry_api::plugin::{BaseJob, BaseTask};
    use ferry_api::record::Record;
    use ferry_api::error::ChannelError;

    use super::*;

    #[derive(Default)]
    struct ScriptedJob {
        base: BaseJob,
        fail_init: bool,
        hang_destroy: bool,
        destroyed: bool,
    }

    #[async_trait]
    impl Job for ScriptedJob {
        fn base(&self) -> &BaseJob {
            &self.base
        }

        fn base_mut(&mut self) -> &mut BaseJob {
            &mut self.base
        }

        async fn init(&mut self) -> Result<(), PluginError> {
            if self.fail_init {
                return Err(PluginError::connection("refused"));
            }
            Ok(())
        }

        async fn split(&mut self, number: usize) -> Result<Vec<Configuration>, PluginError> {
            Ok(vec![self.base.plugin_job_conf().clone(); number])
        }

        async fn destroy(&mut self) -> Result<(), PluginError> {
            if self.hang_destroy {
                std::future::pending::<()>().await;
            }
            self.destroyed = true;
            Ok(())
        }
    }

    fn managed(job: ScriptedJob) -> ManagedJob {
        ManagedJob::new(
            "scripted",
            Box::new(job),
            Configuration::new(),
            Configuration::new(),
            Duration::from_millis(50),
        )
    }

    #[tokio::test]
    async fn job_walks_forward() {
        let mut job = managed(ScriptedJob::default());
        job.init().await.unwrap();
        job.prepare().await.unwrap();
        assert_eq!(job.split(2).await.unwrap().len(), 2);
        assert_eq!(job.split(2).await.unwrap().len(), 2);
        job.post().await.unwrap();
        job.destroy().await.unwrap();
        assert_eq!(job.state(), JobState::Destroyed);
    }

    #[tokio::test]
    async fn job_rejects_out_of_order_calls() {
        let mut job = managed(ScriptedJob::default());
        assert_eq!(job.split(1).await.unwrap_err().kind(), ErrorKind::State);
        job.init().await.unwrap();
        assert_eq!(job.init().await.unwrap_err().kind(), ErrorKind::State);
        assert_eq!(job.post().await.unwrap_err().kind(), ErrorKind::State);

        job.destroy().await.unwrap();
        assert_eq!(job.init().await.unwrap_err().kind(), ErrorKind::State);
        assert_eq!(job.destroy().await.unwrap_err().kind(), ErrorKind::State);
    }

    #[tokio::test]
    async fn failed_init_still_destroys() {
        let mut job = managed(ScriptedJob {
            fail_init: true,
            ..Default::default()
        });
        let err = job.init().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Connection);
        assert_eq!(err.message, "scripted: refused");
        assert_eq!(job.state(), JobState::Failed);
        assert_eq!(job.split(1).await.unwrap_err().kind(), ErrorKind::State);

        job.destroy().await.unwrap();
        assert_eq!(job.state(), JobState::Destroyed);
    }

    #[tokio::test]
    async fn destroy_without_init() {
        let mut job = managed(ScriptedJob::default());
        job.destroy().await.unwrap();
        assert_eq!(job.state(), JobState::Destroyed);
    }

    #[tokio::test]
    async fn destroy_is_bounded() {
        let mut job = managed(ScriptedJob {
            hang_destroy: true,
            ..Default::default()
        });
        let err = job.destroy().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);
        assert_eq!(job.state(), JobState::Destroyed);
    }

    #[derive(Default)]
    struct CountingReader {
        base: BaseTask,
        rows: usize,
    }

    #[async_trait]
    impl Task for CountingReader {
        fn base(&self) -> &BaseTask {
            &self.base
        }

        fn base_mut(&mut self) -> &mut BaseTask {
            &mut self.base
        }

        async fn init(&mut self) -> Result<(), PluginError> {
            Ok(())
        }

        async fn destroy(&mut self) -> Result<(), PluginError> {
            Ok(())
        }
    }

    #[async_trait]
    impl ReaderTask for CountingReader {
        async fn start_read(&mut self, sender: &mut dyn RecordSender) -> Result<(), PluginError> {
            for _ in 0..self.rows {
                let r = sender.create_record()?;
                sender.send_writer(r).await?;
            }
            sender.flush().await?;
            Ok(sender.terminate().await?)
        }
    }

    #[derive(Default)]
    struct NullSender {
        sent: usize,
    }

    #[async_trait]
    impl RecordSender for NullSender {
        fn create_record(&mut self) -> Result<Record, ChannelError> {
            Ok(Record::new())
        }

        async fn send_writer(&mut self, _record: Record) -> Result<(), ChannelError> {
            self.sent += 1;
            Ok(())
        }

        async fn flush(&mut self) -> Result<(), ChannelError> {
            Ok(())
        }

        async fn terminate(&mut self) -> Result<(), ChannelError> {
            Ok(())
        }

        fn shutdown(&mut self) {}
    }

    #[tokio::test]
    async fn task_must_init_before_execute() {
        let reader: Box<dyn ReaderTask> = Box::new(CountingReader {
            rows: 2,
            ..Default::default()
        });
        let mut task = ManagedTask::new(
            "reader-0",
            reader,
            Configuration::new(),
            Configuration::new(),
            0,
            Duration::from_secs(1),
        );
        let mut sender = NullSender::default();
        assert_eq!(task.start_read(&mut sender).await.unwrap_err().kind(), ErrorKind::State);

        task.init().await.unwrap();
        task.start_read(&mut sender).await.unwrap();
        assert_eq!(sender.sent, 2);
        assert_eq!(task.state(), TaskState::Executing);
        assert_eq!(task.start_read(&mut sender).await.unwrap_err().kind(), ErrorKind::State);

        task.post().await.unwrap();
        task.destroy().await.unwrap();
        assert_eq!(task.init().await.unwrap_err().kind(), ErrorKind::State);
    }
}
