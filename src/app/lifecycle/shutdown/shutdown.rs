use crate::app::lifecycle::pipeline::LifecyclePipeline;
use crate::app::lifecycle::shutdown::tasks::observability::ObservabilityShutdownTask;
use crate::app::lifecycle::shutdown::tasks::stop_scheduler::StopSchedulerTask;

/// Builds the shutdown pipeline, which takes the resulting `StartupContext`
/// which is responsible for attaching anything which may need shutdown
pub fn build_shutdown_pipeline() -> LifecyclePipeline {
    LifecyclePipeline::new("shutdown")
        .with(StopSchedulerTask)
        .with(ObservabilityShutdownTask)
}
