use async_trait::async_trait;
use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// The function a runner invokes on every tick
pub type TaskFn = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

/// A uniquely identified unit of recurring work
#[derive(Clone)]
pub struct TaskInvocation {
    pub id: String,
    pub func: TaskFn,
}

impl TaskInvocation {
    pub fn new(id: impl Into<String>, func: TaskFn) -> Self {
        Self {
            id: id.into(),
            func,
        }
    }
}

impl fmt::Debug for TaskInvocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskInvocation").field("id", &self.id).finish()
    }
}

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("scheduler is shut down, cannot register task {0}")]
    ShutDown(String),

    #[error("invalid schedule for task {id}: {reason}")]
    InvalidSchedule { id: String, reason: String },
}

/// Cadence of a scheduled task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Time between the start of consecutive runs
    #[serde(with = "humantime_serde")]
    pub frequency: Duration,
    /// Longest a single run may take before it is abandoned
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    #[serde(default, with = "humantime_serde")]
    pub initial_delay: Duration,
}

impl ScheduleConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.frequency.is_zero() {
            return Err("frequency must be greater than zero".to_string());
        }

        if self.timeout.is_zero() {
            return Err("timeout must be greater than zero".to_string());
        }

        Ok(())
    }
}

/// Invokes registered functions on its own cadence. Timing,
/// overlap and deadlines are entirely the runner's concern
#[async_trait]
pub trait TaskRunner: Send + Sync {
    async fn run(&self, task: TaskInvocation) -> Result<(), SchedulerError>;
}

/// Produces task runners from cadence descriptors
pub trait SchedulerService: Send + Sync {
    fn create_scheduled_task_runner(
        &self,
        schedule: &ScheduleConfig,
    ) -> Result<Arc<dyn TaskRunner>, SchedulerError>;
}

/// How a provider's read cycle gets driven
#[derive(Clone)]
pub enum TaskSchedule {
    /// Registered but never auto triggered, the embedding
    /// caller invokes reads itself
    Manual,
    Runner(Arc<dyn TaskRunner>),
}

impl fmt::Debug for TaskSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskSchedule::Manual => f.write_str("Manual"),
            TaskSchedule::Runner(_) => f.write_str("Runner"),
        }
    }
}
