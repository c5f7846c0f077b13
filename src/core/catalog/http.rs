use crate::core::catalog::{CatalogError, EntityMutation, EntityProviderConnection};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;
use url::Url;

#[derive(Serialize)]
struct MutationEnvelope<'a> {
    provider: &'a str,
    mutation: &'a EntityMutation,
}

/// Ships mutations to a remote catalog as json. The remote end is
/// expected to apply full mutations atomically per provider
pub struct HttpCatalogConnection {
    client: Client,
    url: Url,
    token: Option<String>,
    provider: String,
}

impl HttpCatalogConnection {
    pub fn new(
        url: Url,
        token: Option<String>,
        provider: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, anyhow::Error> {
        let client = reqwest::ClientBuilder::new()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(5))
            .timeout(timeout)
            .gzip(true)
            .build()?;

        Ok(Self {
            client,
            url,
            token,
            provider: provider.into(),
        })
    }
}

#[async_trait]
impl EntityProviderConnection for HttpCatalogConnection {
    async fn apply_mutation(&self, mutation: EntityMutation) -> Result<(), CatalogError> {
        let envelope = MutationEnvelope {
            provider: &self.provider,
            mutation: &mutation,
        };

        let mut req = self.client.post(self.url.clone()).json(&envelope);
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }

        let res = req.send().await.map_err(CatalogError::Transport)?;

        // status only, the body is dropped unread
        if !res.status().is_success() {
            return Err(CatalogError::Status {
                status: res.status().as_u16(),
            });
        }

        debug!(
            "Catalog accepted {} entities for {}",
            mutation.entities().len(),
            self.provider
        );

        Ok(())
    }
}
