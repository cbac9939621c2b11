//! Named periodic tasks with independent cancellation.
//!
//! Each task owns a child of the scheduler's cancellation token, so one task
//! can be stopped on its own and [`Scheduler::shutdown`] stops all of them.
//! Every tick runs in its own spawned task: an error or a panic in one tick
//! is logged and the schedule carries on.

use dashmap::DashMap;
use std::future::Future;
use std::time::Duration;
use tokio::time::{interval, sleep, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

/// Timing for one periodic task.
#[derive(Debug, Clone, Copy)]
pub struct Schedule {
    pub period: Duration,
    pub initial_delay: Duration,
}

impl Schedule {
    pub fn every(period: Duration) -> Self {
        Self {
            period,
            initial_delay: Duration::ZERO,
        }
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }
}

/// Owner of the process's background loops.
pub struct Scheduler {
    root: CancellationToken,
    tracker: TaskTracker,
    tasks: DashMap<String, CancellationToken>,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            root: CancellationToken::new(),
            tracker: TaskTracker::new(),
            tasks: DashMap::new(),
        }
    }

    /// Start running `job` on `schedule` under `name`.
    ///
    /// Ticks never overlap: the next tick is only awaited once the previous
    /// one has finished. If a tick overruns its period, the missed ticks are
    /// delayed rather than burst.
    pub fn spawn_periodic<F, Fut>(&self, name: &str, schedule: Schedule, job: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let token = self.root.child_token();
        if let Some(previous) = self.tasks.insert(name.to_string(), token.clone()) {
            warn!("Replacing periodic task {}", name);
            previous.cancel();
        }

        let name = name.to_string();
        info!(
            "Scheduling {} every {:?} (initial delay {:?})",
            name, schedule.period, schedule.initial_delay
        );

        self.tracker.spawn(async move {
            tokio::select! {
                _ = token.cancelled() => return,
                _ = sleep(schedule.initial_delay) => {}
            }

            let mut ticker = interval(schedule.period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                match tokio::spawn(job()).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => error!("Periodic task {} failed: {:#}", name, e),
                    Err(e) if e.is_panic() => error!("Periodic task {} panicked", name),
                    Err(e) => warn!("Periodic task {} tick aborted: {}", name, e),
                }
            }
            debug!("Periodic task {} stopped", name);
        });
    }

    /// Stop one task. Returns false if no task has that name.
    pub fn cancel(&self, name: &str) -> bool {
        match self.tasks.remove(name) {
            Some((_, token)) => {
                token.cancel();
                info!("Cancelled periodic task {}", name);
                true
            }
            None => false,
        }
    }

    /// Names of tasks that have not been cancelled.
    pub fn task_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tasks.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Cancel every task and wait for in-flight ticks to finish.
    pub async fn shutdown(&self) {
        info!("Stopping {} periodic tasks", self.tasks.len());
        self.root.cancel();
        self.tasks.clear();
        self.tracker.close();
        self.tracker.wait().await;
        info!("All periodic tasks stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;

    fn counting_job(counter: Arc<AtomicU64>) -> impl Fn() -> std::future::Ready<anyhow::Result<()>> {
        move || {
            counter.fetch_add(1, Ordering::SeqCst);
            std::future::ready(Ok(()))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticks_follow_period_and_initial_delay() {
        let scheduler = Scheduler::new();
        let counter = Arc::new(AtomicU64::new(0));
        scheduler.spawn_periodic(
            "count",
            Schedule::every(Duration::from_secs(10)).with_initial_delay(Duration::from_secs(5)),
            counting_job(counter.clone()),
        );

        sleep(Duration::from_secs(4)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        // First tick fires right after the initial delay, then every 10s.
        sleep(Duration::from_secs(27)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 3);

        scheduler.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_and_panics_do_not_stop_the_schedule() {
        let scheduler = Scheduler::new();
        let counter = Arc::new(AtomicU64::new(0));
        let c = counter.clone();
        scheduler.spawn_periodic("flaky", Schedule::every(Duration::from_secs(1)), move || {
            let n = c.fetch_add(1, Ordering::SeqCst);
            async move {
                match n % 3 {
                    0 => Err(anyhow::anyhow!("tick {} failed", n)),
                    1 => panic!("tick {} panicked", n),
                    _ => Ok(()),
                }
            }
        });

        sleep(Duration::from_millis(6_500)).await;
        assert!(counter.load(Ordering::SeqCst) >= 6);
        scheduler.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_only_the_named_task() {
        let scheduler = Scheduler::new();
        let walk = Arc::new(AtomicU64::new(0));
        let sweep = Arc::new(AtomicU64::new(0));
        scheduler.spawn_periodic("walk", Schedule::every(Duration::from_secs(1)), counting_job(walk.clone()));
        scheduler.spawn_periodic("sweep", Schedule::every(Duration::from_secs(1)), counting_job(sweep.clone()));
        assert_eq!(scheduler.task_names(), vec!["sweep".to_string(), "walk".to_string()]);

        sleep(Duration::from_millis(1_500)).await;
        assert!(scheduler.cancel("walk"));
        assert!(!scheduler.cancel("walk"));
        let walk_at_cancel = walk.load(Ordering::SeqCst);
        let sweep_at_cancel = sweep.load(Ordering::SeqCst);

        sleep(Duration::from_secs(5)).await;
        assert_eq!(walk.load(Ordering::SeqCst), walk_at_cancel);
        assert!(sweep.load(Ordering::SeqCst) > sweep_at_cancel);

        scheduler.shutdown().await;
        assert!(scheduler.task_names().is_empty());
    }
}
