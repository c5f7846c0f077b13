use crate::app::config::SyncConfig;
use crate::core::catalog::MemoryCatalog;
use crate::core::observability::ObservabilityHandle;
use crate::core::providers::PingIdentityEntityProvider;
use crate::core::scheduler::TokioScheduler;
use parking_lot::Mutex;
use std::sync::{Arc, OnceLock};

#[derive(Default)]
pub struct StartupContext {
    /// Snapshot of the config taken once loading succeeded
    pub config: OnceLock<SyncConfig>,

    /// Taken back out on shutdown to flush sinks
    pub observability: Mutex<Option<ObservabilityHandle>>,

    /// Drives every provider that carries its own schedule
    pub scheduler: OnceLock<Arc<TokioScheduler>>,

    /// Present only when the in process catalog is configured
    pub catalog: OnceLock<Arc<MemoryCatalog>>,

    pub providers: OnceLock<Vec<Arc<PingIdentityEntityProvider>>>,
}

impl StartupContext {
    pub fn config(&self) -> Result<&SyncConfig, anyhow::Error> {
        self.config
            .get()
            .ok_or_else(|| anyhow::anyhow!("Config not set on startup context"))
    }
}
