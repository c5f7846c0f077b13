use crate::app::lifecycle::context::StartupContext;
use crate::app::lifecycle::pipeline::LifecycleTask;
use crate::core::scheduler::TokioScheduler;
use anyhow::Error;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

pub struct SchedulerTask;

#[async_trait]
impl LifecycleTask for SchedulerTask {
    fn name(&self) -> &'static str {
        "scheduler"
    }

    async fn run(&self, context: &StartupContext) -> Result<(), Error> {
        if !context.config()?.scheduler.enabled {
            info!("Scheduler disabled, per provider schedules are ignored");
            return Ok(());
        }

        context
            .scheduler
            .set(Arc::new(TokioScheduler::new()))
            .map_err(|_| anyhow::anyhow!("Scheduler already set on startup context"))
    }
}
