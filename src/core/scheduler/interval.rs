use crate::core::scheduler::{
    ScheduleConfig, SchedulerError, SchedulerService, TaskInvocation, TaskRunner,
};
use async_trait::async_trait;
use dashmap::DashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, warn};

/// Tracks every spawned task loop so they can be replaced by id or
/// stopped together on shutdown
struct TaskRegistry {
    tasks: DashMap<String, JoinHandle<()>>,
    shutdown_tx: watch::Sender<bool>,
    stopped: AtomicBool,
}

/// In process scheduler backed by tokio timers
pub struct TokioScheduler {
    registry: Arc<TaskRegistry>,
}

impl TokioScheduler {
    pub fn new() -> Self {
        let (shutdown_tx, _) = watch::channel(false);

        Self {
            registry: Arc::new(TaskRegistry {
                tasks: DashMap::new(),
                shutdown_tx,
                stopped: AtomicBool::new(false),
            }),
        }
    }

    /// Ids of the task loops currently registered
    pub fn task_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .registry
            .tasks
            .iter()
            .map(|e| e.key().clone())
            .collect();
        ids.sort();
        ids
    }

    /// Stops every task loop. A run already in progress is allowed
    /// to finish, no new runs start afterwards
    pub async fn shutdown(&self) {
        self.registry.stopped.store(true, Ordering::Release);
        let _ = self.registry.shutdown_tx.send(true);

        let ids: Vec<String> = self.registry.tasks.iter().map(|e| e.key().clone()).collect();
        for id in ids {
            if let Some((_, handle)) = self.registry.tasks.remove(&id) {
                if let Err(e) = handle.await {
                    if !e.is_cancelled() {
                        warn!("Scheduled task {} ended abnormally: {}", id, e);
                    }
                }
            }
        }
    }
}

impl fmt::Debug for TokioScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokioScheduler")
            .field("tasks", &self.task_ids())
            .field("stopped", &self.registry.stopped.load(Ordering::Acquire))
            .finish()
    }
}

impl Default for TokioScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl SchedulerService for TokioScheduler {
    fn create_scheduled_task_runner(
        &self,
        schedule: &ScheduleConfig,
    ) -> Result<Arc<dyn TaskRunner>, SchedulerError> {
        schedule
            .validate()
            .map_err(|reason| SchedulerError::InvalidSchedule {
                id: "<runner>".to_string(),
                reason,
            })?;

        Ok(Arc::new(IntervalTaskRunner {
            schedule: schedule.clone(),
            registry: self.registry.clone(),
        }))
    }
}

/// Runs each registered function after `initial_delay` and then
/// every `frequency`. Runs of one task never overlap, a run that
/// outlasts the frequency causes the missed ticks to be skipped
pub struct IntervalTaskRunner {
    schedule: ScheduleConfig,
    registry: Arc<TaskRegistry>,
}

#[async_trait]
impl TaskRunner for IntervalTaskRunner {
    async fn run(&self, task: TaskInvocation) -> Result<(), SchedulerError> {
        if self.registry.stopped.load(Ordering::Acquire) {
            return Err(SchedulerError::ShutDown(task.id));
        }

        let id = task.id.clone();
        let schedule = self.schedule.clone();
        let mut shutdown_rx = self.registry.shutdown_tx.subscribe();

        let handle = tokio::spawn(async move {
            let start = Instant::now() + schedule.initial_delay;
            let mut ticker = tokio::time::interval_at(start, schedule.frequency);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        debug!("Running scheduled task {}", task.id);
                        if tokio::time::timeout(schedule.timeout, (task.func)()).await.is_err() {
                            warn!(
                                "Scheduled task {} timed out after {:?}",
                                task.id, schedule.timeout
                            );
                        }
                    },
                    _ = shutdown_rx.changed() => break,
                }
            }
        });

        // last registration for an id wins
        if let Some(previous) = self.registry.tasks.insert(id.clone(), handle) {
            debug!("Replacing scheduled task {}", id);
            previous.abort();
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::scheduler::TaskFn;
    use futures_util::future::BoxFuture;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn schedule(secs: u64) -> ScheduleConfig {
        ScheduleConfig {
            frequency: Duration::from_secs(secs),
            timeout: Duration::from_secs(secs),
            initial_delay: Duration::ZERO,
        }
    }

    fn counting_task(counter: Arc<AtomicUsize>) -> TaskFn {
        Arc::new(move || -> BoxFuture<'static, ()> {
            let counter = counter.clone();
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
            })
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_runs_on_cadence() {
        let scheduler = TokioScheduler::new();
        let runner = scheduler.create_scheduled_task_runner(&schedule(10)).unwrap();
        let count = Arc::new(AtomicUsize::new(0));

        runner
            .run(TaskInvocation::new("tick", counting_task(count.clone())))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_secs(35)).await;

        let runs = count.load(Ordering::SeqCst);
        assert!((3..=4).contains(&runs), "unexpected run count {runs}");
        assert_eq!(scheduler.task_ids(), vec!["tick".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_registering_same_id_replaces_task() {
        let scheduler = TokioScheduler::new();
        let runner = scheduler.create_scheduled_task_runner(&schedule(10)).unwrap();
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        runner
            .run(TaskInvocation::new("sync", counting_task(first.clone())))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_secs(15)).await;

        runner
            .run(TaskInvocation::new("sync", counting_task(second.clone())))
            .await
            .unwrap();
        let first_runs = first.load(Ordering::SeqCst);

        tokio::time::sleep(Duration::from_secs(30)).await;

        assert_eq!(first.load(Ordering::SeqCst), first_runs);
        assert!(second.load(Ordering::SeqCst) >= 2);
        assert_eq!(scheduler.task_ids().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_respects_initial_delay() {
        let scheduler = TokioScheduler::new();
        let runner = scheduler
            .create_scheduled_task_runner(&ScheduleConfig {
                initial_delay: Duration::from_secs(60),
                ..schedule(10)
            })
            .unwrap();
        let count = Arc::new(AtomicUsize::new(0));

        runner
            .run(TaskInvocation::new("late", counting_task(count.clone())))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(35)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_rejects_new_tasks() {
        let scheduler = TokioScheduler::new();
        let runner = scheduler.create_scheduled_task_runner(&schedule(10)).unwrap();
        let count = Arc::new(AtomicUsize::new(0));

        runner
            .run(TaskInvocation::new("a", counting_task(count.clone())))
            .await
            .unwrap();
        scheduler.shutdown().await;

        assert!(scheduler.task_ids().is_empty());
        let err = runner
            .run(TaskInvocation::new("b", counting_task(count)))
            .await
            .unwrap_err();
        assert!(matches!(err, SchedulerError::ShutDown(id) if id == "b"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_debug_lists_registered_tasks() {
        let scheduler = TokioScheduler::new();
        let runner = scheduler.create_scheduled_task_runner(&schedule(10)).unwrap();
        runner
            .run(TaskInvocation::new("refresh", counting_task(Arc::new(AtomicUsize::new(0)))))
            .await
            .unwrap();

        let rendered = format!("{:?}", scheduler);
        assert!(rendered.contains("\"refresh\""));
        assert!(rendered.contains("stopped: false"));
    }

    #[test]
    fn test_invalid_schedule_rejected() {
        let scheduler = TokioScheduler::new();
        assert!(scheduler.create_scheduled_task_runner(&schedule(0)).is_err());
    }
}
