use crate::core::catalog::CatalogError;
use crate::core::pingidentity::ClientError;
use crate::core::scheduler::SchedulerError;
use std::error::Error as StdError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProviderError {
    /// No usable schedule or client could be resolved for a provider
    #[error("{reason} for PingIdentityEntityProvider:{id}")]
    Configuration { id: String, reason: String },

    #[error("{provider} is not initialized, connect must be called before read")]
    Uninitialized { provider: String },

    #[error("failed to register scheduled task for {provider}")]
    Schedule {
        provider: String,
        #[source]
        source: SchedulerError,
    },

    #[error(transparent)]
    Cycle(#[from] CycleError),
}

/// A read cycle failure, either side of the fetch/commit boundary
#[derive(Debug, Error)]
pub enum CycleError {
    #[error("failed to read users and groups from PingIdentity")]
    Fetch(#[source] ClientError),

    #[error("failed to commit PingIdentity entities to the catalog")]
    Commit(#[source] CatalogError),
}

impl ProviderError {
    pub fn name(&self) -> &'static str {
        match self {
            ProviderError::Configuration { .. } => "ConfigurationError",
            ProviderError::Uninitialized { .. } => "UninitializedError",
            ProviderError::Schedule { .. } => "SchedulerError",
            ProviderError::Cycle(CycleError::Fetch(_)) => "FetchError",
            ProviderError::Cycle(CycleError::Commit(_)) => "CommitError",
        }
    }

    /// Upstream http status, if the failure carried one
    pub fn status(&self) -> Option<u16> {
        match self {
            ProviderError::Cycle(CycleError::Fetch(e)) => e.status(),
            ProviderError::Cycle(CycleError::Commit(e)) => e.status(),
            _ => None,
        }
    }
}

/// The only shape in which a failed cycle is ever logged. Carries
/// error names and messages, never response payloads
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SanitizedError {
    pub name: &'static str,
    pub message: String,
    /// Messages of the underlying error sources, outermost first
    pub stack: Vec<String>,
    pub status: Option<u16>,
}

impl From<&ProviderError> for SanitizedError {
    fn from(err: &ProviderError) -> Self {
        let mut stack = Vec::new();
        let mut source = err.source();
        while let Some(cause) = source {
            stack.push(cause.to_string());
            source = cause.source();
        }

        SanitizedError {
            name: err.name(),
            message: err.to_string(),
            stack,
            status: err.status(),
        }
    }
}
