use crate::app::config::CatalogConfig;
use crate::app::lifecycle::context::StartupContext;
use crate::app::lifecycle::pipeline::LifecycleTask;
use crate::core::catalog::{
    EntityProvider, EntityProviderConnection, HttpCatalogConnection, MemoryCatalog,
};
use crate::core::providers::{PingIdentityEntityProvider, SanitizedError};
use anyhow::Error;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Hands every provider its catalog connection. Providers left without
/// an armed schedule get a single read here and none after
pub struct ConnectProvidersTask;

impl ConnectProvidersTask {
    fn connection_for(
        context: &StartupContext,
        catalog: &CatalogConfig,
        provider: &PingIdentityEntityProvider,
    ) -> Result<Arc<dyn EntityProviderConnection>, Error> {
        match catalog {
            CatalogConfig::Memory => {
                let catalog = context.catalog.get_or_init(MemoryCatalog::new);
                Ok(catalog.connection(provider.provider_name()))
            }
            CatalogConfig::Http {
                url,
                token,
                timeout,
            } => Ok(Arc::new(HttpCatalogConnection::new(
                url.clone(),
                token.clone(),
                provider.provider_name(),
                *timeout,
            )?)),
        }
    }
}

#[async_trait]
impl LifecycleTask for ConnectProvidersTask {
    fn name(&self) -> &'static str {
        "connect"
    }

    async fn run(&self, context: &StartupContext) -> Result<(), Error> {
        let config = context.config()?;
        let providers = context
            .providers
            .get()
            .ok_or_else(|| anyhow::anyhow!("Providers not built before connect"))?;

        if providers.is_empty() {
            warn!("No PingIdentity providers configured");
        }

        for provider in providers {
            let connection = Self::connection_for(context, &config.catalog, provider)?;
            provider.connect(connection).await?;

            if provider.is_armed() {
                info!(provider = provider.id(), "Connected, refresh scheduled");
                continue;
            }

            info!(provider = provider.id(), "Connected without schedule, reading once");
            if let Err(err) = provider.read().await {
                let sanitized = SanitizedError::from(&err);
                error!(
                    provider = provider.id(),
                    error.name = sanitized.name,
                    error.message = %sanitized.message,
                    error.stack = ?sanitized.stack,
                    error.status = ?sanitized.status,
                    "Initial PingIdentity read failed"
                );
            }
        }

        Ok(())
    }
}
