use crate::app::config::PingIdentityProviderConfig;
use crate::core::catalog::{
    DeferredEntity, EntityMutation, EntityProvider, EntityProviderConnection,
};
use crate::core::ids::{IdGenerator, UuidGenerator};
use crate::core::models::entity::Entity;
use crate::core::pingidentity::{
    GroupTransformer, IdentitySourceClient, PingIdentityClient, ReadOptions, ReadResult,
    UserTransformer, read_ping_identity,
};
use crate::core::providers::{CycleError, ProviderError, SanitizedError};
use crate::core::scheduler::{SchedulerService, TaskFn, TaskInvocation, TaskRunner, TaskSchedule};
use async_trait::async_trait;
use futures_util::future::BoxFuture;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{Instrument, error, info, info_span};

/// Kind prefix of every location key this provider emits
pub const PROVIDER_KIND: &str = "pingidentity";

const PROVIDER_CLASS: &str = "PingIdentityEntityProvider";

/// Builds the client used to talk to one configured PingOne environment
pub type ClientFactory = Arc<
    dyn Fn(&PingIdentityProviderConfig) -> Result<Arc<dyn IdentitySourceClient>, anyhow::Error>
        + Send
        + Sync,
>;

/// Location key scoping all entities of one provider instance
pub fn location_key(kind: &str, id: &str) -> String {
    format!("{kind}-org-provider:{id}")
}

#[derive(Clone, Default)]
pub struct PingIdentityEntityProviderOptions {
    /// Fallback when a provider has no schedule of its own, or no
    /// scheduler was supplied. `Manual` leaves reads to the caller
    pub schedule: Option<TaskSchedule>,
    /// Used together with a per provider schedule from config
    pub scheduler: Option<Arc<dyn SchedulerService>>,
    pub user_transformer: Option<UserTransformer>,
    pub group_transformer: Option<GroupTransformer>,
    /// Defaults to [`PingIdentityClient`]
    pub client_factory: Option<ClientFactory>,
    /// Defaults to random uuids
    pub id_generator: Option<Arc<dyn IdGenerator>>,
}

/// Counts and timings of one completed read cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadSummary {
    pub users: usize,
    pub groups: usize,
    pub read_duration: Duration,
    pub commit_duration: Duration,
}

struct ScheduledTask {
    runner: Arc<dyn TaskRunner>,
    invocation: TaskInvocation,
}

/// Ingests org data (users and groups) from one PingIdentity environment
/// and publishes them as a full replace snapshot once connected
pub struct PingIdentityEntityProvider {
    id: String,
    client: Arc<dyn IdentitySourceClient>,
    read_options: ReadOptions,
    id_generator: Arc<dyn IdGenerator>,
    connection: RwLock<Option<Arc<dyn EntityProviderConnection>>>,
    scheduled: Mutex<Option<ScheduledTask>>,
    armed: AtomicBool,
}

impl PingIdentityEntityProvider {
    /// One provider per config entry. Each resolves its schedule from,
    /// in order, the scheduler plus its own config schedule, then the
    /// fallback in `options`. Neither available is a configuration error
    pub fn from_config(
        configs: &[PingIdentityProviderConfig],
        options: PingIdentityEntityProviderOptions,
    ) -> Result<Vec<Arc<Self>>, ProviderError> {
        configs
            .iter()
            .map(|config| {
                let task_schedule = match (&options.scheduler, &config.schedule) {
                    (Some(scheduler), Some(schedule)) => TaskSchedule::Runner(
                        scheduler
                            .create_scheduled_task_runner(schedule)
                            .map_err(|e| ProviderError::Configuration {
                                id: config.id.clone(),
                                reason: e.to_string(),
                            })?,
                    ),
                    _ => options
                        .schedule
                        .clone()
                        .ok_or_else(|| ProviderError::Configuration {
                            id: config.id.clone(),
                            reason: "No schedule provided neither via code nor config"
                                .to_string(),
                        })?,
                };

                let client = match &options.client_factory {
                    Some(factory) => factory(config),
                    None => PingIdentityClient::new(config)
                        .map(|c| Arc::new(c) as Arc<dyn IdentitySourceClient>),
                }
                .map_err(|e| ProviderError::Configuration {
                    id: config.id.clone(),
                    reason: format!("Failed to create client ({e})"),
                })?;

                let provider = Arc::new(Self::new(config, client, &options));

                if let TaskSchedule::Runner(runner) = task_schedule {
                    provider.schedule(runner);
                }

                Ok(provider)
            })
            .collect()
    }

    pub fn new(
        config: &PingIdentityProviderConfig,
        client: Arc<dyn IdentitySourceClient>,
        options: &PingIdentityEntityProviderOptions,
    ) -> Self {
        Self {
            id: config.id.clone(),
            client,
            read_options: ReadOptions {
                user_query_size: config.user_query_size,
                group_query_size: config.group_query_size,
                user_transformer: options.user_transformer.clone(),
                group_transformer: options.group_transformer.clone(),
            },
            id_generator: options
                .id_generator
                .clone()
                .unwrap_or_else(|| Arc::new(UuidGenerator)),
            connection: RwLock::new(None),
            scheduled: Mutex::new(None),
            armed: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn location_key(&self) -> String {
        location_key(PROVIDER_KIND, &self.id)
    }

    pub fn is_connected(&self) -> bool {
        self.connection.read().is_some()
    }

    /// True once a scheduled task has been handed to its runner
    pub fn is_armed(&self) -> bool {
        self.armed.load(Ordering::Acquire)
    }

    /// Stores the connection and, the first time only, registers the
    /// scheduled task with its runner
    pub async fn connect(
        &self,
        connection: Arc<dyn EntityProviderConnection>,
    ) -> Result<(), ProviderError> {
        *self.connection.write() = Some(connection);

        let task = self.scheduled.lock().as_ref().map(|t| {
            (t.runner.clone(), t.invocation.clone())
        });

        let Some((runner, invocation)) = task else {
            return Ok(());
        };

        if self.armed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        runner.run(invocation).await.map_err(|source| {
            self.armed.store(false, Ordering::Release);
            ProviderError::Schedule {
                provider: self.provider_name(),
                source,
            }
        })
    }

    /// Runs one complete ingestion cycle: fetch, transform, then a
    /// single full mutation. Logs to whatever span is current
    pub async fn read(&self) -> Result<ReadSummary, ProviderError> {
        let connection = self
            .connection
            .read()
            .clone()
            .ok_or_else(|| ProviderError::Uninitialized {
                provider: self.provider_name(),
            })?;

        let progress = ReadProgress::start();

        let ReadResult { users, groups } = read_ping_identity(self.client.as_ref(), &self.read_options)
            .await
            .map_err(CycleError::Fetch)?;

        let progress = progress.mark_read_complete(users.len(), groups.len());

        let location_key = self.location_key();
        let entities = users
            .into_iter()
            .map(Entity::from)
            .chain(groups.into_iter().map(Entity::from))
            .map(|entity| DeferredEntity {
                location_key: location_key.clone(),
                entity,
            })
            .collect();

        connection
            .apply_mutation(EntityMutation::Full { entities })
            .await
            .map_err(CycleError::Commit)?;

        Ok(progress.mark_commit_complete())
    }

    /// Wraps `read` in a uniquely identified task for `task_runner`.
    /// Replaces any earlier registration, nothing runs until `connect`
    pub fn schedule(self: &Arc<Self>, task_runner: Arc<dyn TaskRunner>) {
        let task_id = format!("{}:refresh", self.provider_name());
        let provider = Arc::downgrade(self);

        let func: TaskFn = Arc::new({
            let task_id = task_id.clone();
            move || -> BoxFuture<'static, ()> {
                let provider = provider.clone();
                let task_id = task_id.clone();
                Box::pin(async move {
                    if let Some(provider) = provider.upgrade() {
                        provider.run_scheduled(&task_id).await;
                    }
                })
            }
        });

        *self.scheduled.lock() = Some(ScheduledTask {
            runner: task_runner,
            invocation: TaskInvocation::new(task_id, func),
        });
    }

    /// One scheduled invocation. Failures end here, logged without
    /// any response payloads, and wait for the next tick
    async fn run_scheduled(&self, task_id: &str) {
        // disabled spans never evaluate their fields
        let task_instance_id = self.id_generator.next_id();
        let span = info_span!(
            "org_sync",
            class = PROVIDER_CLASS,
            task_id = %task_id,
            task_instance_id = %task_instance_id,
        );

        async {
            if let Err(err) = self.read().await {
                let sanitized = SanitizedError::from(&err);
                error!(
                    error.name = sanitized.name,
                    error.message = %sanitized.message,
                    error.stack = ?sanitized.stack,
                    error.status = ?sanitized.status,
                    "Error while syncing PingIdentity users and groups"
                );
            }
        }
        .instrument(span)
        .await
    }
}

#[async_trait]
impl EntityProvider for PingIdentityEntityProvider {
    fn provider_name(&self) -> String {
        format!("{}:{}", PROVIDER_CLASS, self.id)
    }

    async fn connect(
        &self,
        connection: Arc<dyn EntityProviderConnection>,
    ) -> Result<(), anyhow::Error> {
        PingIdentityEntityProvider::connect(self, connection)
            .await
            .map_err(anyhow::Error::from)
    }
}

/// Times the fetch and commit phases of a read
struct ReadProgress {
    started: Instant,
}

struct CommitProgress {
    started: Instant,
    users: usize,
    groups: usize,
    read_duration: Duration,
}

impl ReadProgress {
    fn start() -> Self {
        info!("Reading PingIdentity users and groups");
        Self {
            started: Instant::now(),
        }
    }

    fn mark_read_complete(self, users: usize, groups: usize) -> CommitProgress {
        let read_duration = self.started.elapsed();
        info!(
            users,
            groups,
            "Read {} PingIdentity users and {} PingIdentity groups in {:.1} seconds. Committing...",
            users,
            groups,
            read_duration.as_secs_f64()
        );

        CommitProgress {
            started: Instant::now(),
            users,
            groups,
            read_duration,
        }
    }
}

impl CommitProgress {
    fn mark_commit_complete(self) -> ReadSummary {
        let commit_duration = self.started.elapsed();
        info!(
            "Committed {} PingIdentity users and {} PingIdentity groups in {:.1} seconds.",
            self.users,
            self.groups,
            commit_duration.as_secs_f64()
        );

        ReadSummary {
            users: self.users,
            groups: self.groups,
            read_duration: self.read_duration,
            commit_duration,
        }
    }
}
