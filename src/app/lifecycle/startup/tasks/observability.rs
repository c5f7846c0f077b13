use crate::app::lifecycle::context::StartupContext;
use crate::app::lifecycle::pipeline::LifecycleTask;
use crate::core::observability;
use anyhow::Error;
use async_trait::async_trait;
use tracing::info;

pub struct ConfigureObservabilityTask;

#[async_trait]
impl LifecycleTask for ConfigureObservabilityTask {
    fn name(&self) -> &'static str {
        "observability"
    }

    async fn run(&self, context: &StartupContext) -> Result<(), Error> {
        let config = context.config()?;

        let handle = observability::init(&config.logging)?;
        *context.observability.lock() = Some(handle);

        info!("Hello world! Observability configured");

        Ok(())
    }
}
