use crate::app::lifecycle::pipeline::LifecyclePipeline;
use crate::app::lifecycle::startup::tasks::config_load::ConfigLoadTask;
use crate::app::lifecycle::startup::tasks::connect::ConnectProvidersTask;
use crate::app::lifecycle::startup::tasks::observability::ConfigureObservabilityTask;
use crate::app::lifecycle::startup::tasks::providers::BuildProvidersTask;
use crate::app::lifecycle::startup::tasks::scheduler::SchedulerTask;
use std::path::PathBuf;

pub fn build_start_pipeline(cfg_path: PathBuf) -> LifecyclePipeline {
    LifecyclePipeline::new("startup")
        .with(ConfigLoadTask::new(cfg_path))
        .with(ConfigureObservabilityTask)
        .with(SchedulerTask)
        .with(BuildProvidersTask)
        .with(ConnectProvidersTask)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_startup_order() {
        let pipeline = build_start_pipeline(PathBuf::from("org-sync.yaml"));

        assert_eq!(
            pipeline.task_names(),
            vec!["config_load", "observability", "scheduler", "providers", "connect"]
        );
    }
}
