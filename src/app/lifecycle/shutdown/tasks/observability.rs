use crate::app::lifecycle::context::StartupContext;
use crate::app::lifecycle::pipeline::LifecycleTask;
use crate::core::observability;
use anyhow::Error;
use async_trait::async_trait;
use tracing::info;

pub struct ObservabilityShutdownTask;

#[async_trait]
impl LifecycleTask for ObservabilityShutdownTask {
    fn name(&self) -> &'static str {
        "observability_shutdown"
    }

    async fn run(&self, context: &StartupContext) -> Result<(), Error> {
        let Some(handle) = context.observability.lock().take() else {
            return Ok(());
        };

        info!("Shutting down observability");
        observability::shutdown(handle)
    }
}
