use crate::app::config::{DefaultSchedule, SyncConfig};
use crate::app::lifecycle::context::StartupContext;
use crate::app::lifecycle::pipeline::LifecycleTask;
use crate::core::providers::{PingIdentityEntityProvider, PingIdentityEntityProviderOptions};
use crate::core::scheduler::{SchedulerService, TaskSchedule, TokioScheduler};
use anyhow::Error;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

pub struct BuildProvidersTask;

/// Provider options derived from config plus whatever scheduler was started
pub fn provider_options(
    config: &SyncConfig,
    scheduler: Option<Arc<TokioScheduler>>,
) -> PingIdentityEntityProviderOptions {
    PingIdentityEntityProviderOptions {
        schedule: config.default_schedule.map(|schedule| match schedule {
            DefaultSchedule::Manual => TaskSchedule::Manual,
        }),
        scheduler: scheduler.map(|s| s as Arc<dyn SchedulerService>),
        ..Default::default()
    }
}

#[async_trait]
impl LifecycleTask for BuildProvidersTask {
    fn name(&self) -> &'static str {
        "providers"
    }

    async fn run(&self, context: &StartupContext) -> Result<(), Error> {
        let config = context.config()?;

        let options = provider_options(config, context.scheduler.get().cloned());
        let providers =
            PingIdentityEntityProvider::from_config(&config.provider_configs(), options)?;

        info!(count = providers.len(), "Built PingIdentity providers");

        context
            .providers
            .set(providers)
            .map_err(|_| anyhow::anyhow!("Providers already set on startup context"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const YAML: &str = r#"
default_schedule: manual
providers:
  scheduled:
    env_id: env-1
    client_id: cid
    client_secret: shh
    schedule:
      frequency: 1h
      timeout: 15m
  manual:
    env_id: env-2
    client_id: cid
    client_secret: shh
"#;

    #[tokio::test]
    async fn test_builds_one_provider_per_entry() {
        let config = SyncConfig::from_yaml(YAML).unwrap();
        let ctx = StartupContext::default();
        ctx.config.set(config).unwrap();
        ctx.scheduler.set(Arc::new(TokioScheduler::new())).unwrap();

        BuildProvidersTask.run(&ctx).await.unwrap();

        let ids: Vec<_> = ctx
            .providers
            .get()
            .unwrap()
            .iter()
            .map(|p| p.id().to_string())
            .collect();
        assert_eq!(ids, vec!["manual", "scheduled"]);
    }

    #[tokio::test]
    async fn test_missing_schedule_fails() {
        let yaml = YAML.replace("default_schedule: manual", "");
        let ctx = StartupContext::default();
        ctx.config.set(SyncConfig::from_yaml(&yaml).unwrap()).unwrap();

        let err = BuildProvidersTask.run(&ctx).await.unwrap_err();

        assert!(err.to_string().contains("PingIdentityEntityProvider:manual"));
    }
}
