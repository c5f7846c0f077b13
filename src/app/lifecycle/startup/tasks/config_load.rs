use crate::app::config::SyncConfig;
use crate::app::lifecycle::context::StartupContext;
use crate::app::lifecycle::pipeline::LifecycleTask;
use anyhow::{Context, Error};
use async_trait::async_trait;
use std::path::PathBuf;

pub struct ConfigLoadTask {
    path: PathBuf,
}

impl ConfigLoadTask {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

#[async_trait]
impl LifecycleTask for ConfigLoadTask {
    fn name(&self) -> &'static str {
        "config_load"
    }

    async fn run(&self, context: &StartupContext) -> Result<(), Error> {
        let config = SyncConfig::load(&self.path)
            .with_context(|| format!("failed to load config {}", self.path.display()))?;

        // logging is not configured yet, secrets are redacted by Debug
        println!("Config loaded from {}", self.path.display());
        println!("{:?}", config);

        context
            .config
            .set(config)
            .map_err(|_| anyhow::anyhow!("Config already set on startup context"))
    }
}
