use crate::app::lifecycle::context::StartupContext;
use crate::app::lifecycle::pipeline::LifecycleTask;
use anyhow::Error;
use async_trait::async_trait;
use tracing::info;

pub struct StopSchedulerTask;

#[async_trait]
impl LifecycleTask for StopSchedulerTask {
    fn name(&self) -> &'static str {
        "stop_scheduler"
    }

    async fn run(&self, context: &StartupContext) -> Result<(), Error> {
        match context.scheduler.get() {
            Some(scheduler) => {
                info!("Stopping scheduled refresh tasks..");
                scheduler.shutdown().await;
                info!("Scheduler stopped");
            }
            None => {
                info!("Skipping scheduler shutdown, was never started");
            }
        }

        Ok(())
    }
}
