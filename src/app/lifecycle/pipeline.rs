use crate::app::lifecycle::context::StartupContext;
use anyhow::{Context, Error};
use async_trait::async_trait;
use tracing::{Instrument, info_span};

/// One step of startup or shutdown
#[async_trait]
pub trait LifecycleTask: Send + Sync {
    fn name(&self) -> &'static str;

    async fn run(&self, context: &StartupContext) -> Result<(), Error>;
}

/// Ordered list of lifecycle tasks, stopping at the first failure
pub struct LifecyclePipeline {
    name: &'static str,
    tasks: Vec<Box<dyn LifecycleTask>>,
}

impl LifecyclePipeline {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            tasks: Vec::new(),
        }
    }

    pub fn with(mut self, task: impl LifecycleTask + 'static) -> Self {
        self.tasks.push(Box::new(task));
        self
    }

    pub fn task_names(&self) -> Vec<&'static str> {
        self.tasks.iter().map(|t| t.name()).collect()
    }

    pub async fn run(&self, context: &StartupContext) -> Result<(), Error> {
        let pipeline_span = info_span!("lifecycle", pipeline = self.name);

        async {
            for task in &self.tasks {
                task.run(context)
                    .instrument(info_span!("lifecycle_task", task = task.name()))
                    .await
                    .with_context(|| format!("{} task {} failed", self.name, task.name()))?;
            }

            Ok(())
        }
        .instrument(pipeline_span)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    struct Step {
        name: &'static str,
        log: Arc<Mutex<Vec<&'static str>>>,
        fail: bool,
    }

    #[async_trait]
    impl LifecycleTask for Step {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn run(&self, _context: &StartupContext) -> Result<(), Error> {
            self.log.lock().push(self.name);
            if self.fail {
                anyhow::bail!("boom");
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_runs_in_order_and_stops_on_failure() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let step = |name, fail| Step {
            name,
            log: log.clone(),
            fail,
        };

        let pipeline = LifecyclePipeline::new("startup")
            .with(step("one", false))
            .with(step("two", true))
            .with(step("three", false));

        let err = pipeline.run(&StartupContext::default()).await.unwrap_err();

        assert_eq!(*log.lock(), vec!["one", "two"]);
        assert!(err.to_string().contains("startup task two failed"));
    }
}
