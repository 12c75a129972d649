use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const STOP_GRACE_PERIOD: Duration = Duration::from_secs(3);

struct WorkerHandle {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// One background task per user, keyed by user id.
#[derive(Clone, Default)]
pub struct WorkerRegistry {
    workers: Arc<Mutex<HashMap<i32, WorkerHandle>>>,
}

impl WorkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawns the worker unless one is already running. Returns whether a new task was started.
    pub async fn start<F, Fut>(&self, user_id: i32, worker: F) -> bool
    where
        F: FnOnce(watch::Receiver<bool>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut workers = self.workers.lock().await;
        if let Some(existing) = workers.get(&user_id) {
            if !existing.task.is_finished() {
                debug!("Worker for user {user_id} is already running");
                return false;
            }
        }
        let (stop, stop_rx) = watch::channel(false);
        let task = tokio::spawn(worker(stop_rx));
        workers.insert(user_id, WorkerHandle { stop, task });
        info!("Started worker for user {user_id}");
        true
    }

    /// Signals the worker and waits up to the grace period before aborting it.
    pub async fn stop(&self, user_id: i32) -> bool {
        let handle = self.workers.lock().await.remove(&user_id);
        let Some(WorkerHandle { stop, mut task }) = handle else {
            return false;
        };
        let _ = stop.send(true);
        if tokio::time::timeout(STOP_GRACE_PERIOD, &mut task).await.is_err() {
            warn!("Worker for user {user_id} ignored the stop flag, aborting");
            task.abort();
        }
        info!("Stopped worker for user {user_id}");
        true
    }

    pub async fn is_active(&self, user_id: i32) -> bool {
        self.workers
            .lock()
            .await
            .get(&user_id)
            .map_or(false, |handle| !handle.task.is_finished())
    }

    pub async fn active_users(&self) -> Vec<i32> {
        let workers = self.workers.lock().await;
        let mut ids: Vec<i32> = workers
            .iter()
            .filter(|(_, handle)| !handle.task.is_finished())
            .map(|(id, _)| *id)
            .collect();
        ids.sort_unstable();
        ids
    }

    pub async fn stop_all(&self) {
        let ids: Vec<i32> = self.workers.lock().await.keys().copied().collect();
        futures::future::join_all(ids.into_iter().map(|id| self.stop(id))).await;
    }
}

/// Sleeps for `duration` unless the stop flag flips first. Returns true when the worker should exit.
pub async fn sleep_or_stop(stop: &mut watch::Receiver<bool>, duration: Duration) -> bool {
    if *stop.borrow() {
        return true;
    }
    tokio::select! {
        _ = tokio::time::sleep(duration) => *stop.borrow(),
        changed = stop.changed() => changed.is_err() || *stop.borrow(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;

    fn looping_worker(
        ticks: Arc<AtomicUsize>,
    ) -> impl FnOnce(watch::Receiver<bool>) -> futures::future::BoxFuture<'static, ()> {
        move |mut stop| {
            Box::pin(async move {
                loop {
                    ticks.fetch_add(1, Ordering::SeqCst);
                    if sleep_or_stop(&mut stop, Duration::from_secs(30)).await {
                        break;
                    }
                }
            })
        }
    }

    #[tokio::test]
    async fn test_start_is_idempotent_per_user() {
        let registry = WorkerRegistry::new();
        let ticks = Arc::new(AtomicUsize::new(0));
        assert!(registry.start(1, looping_worker(ticks.clone())).await);
        assert!(!registry.start(1, looping_worker(ticks.clone())).await);
        assert!(registry.start(2, looping_worker(ticks.clone())).await);
        assert_eq!(registry.active_users().await, vec![1, 2]);
        registry.stop_all().await;
        assert!(registry.active_users().await.is_empty());
    }

    #[tokio::test]
    async fn test_stop_interrupts_long_sleep() {
        let registry = WorkerRegistry::new();
        let ticks = Arc::new(AtomicUsize::new(0));
        registry.start(7, looping_worker(ticks.clone())).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(registry.is_active(7).await);

        let started = Instant::now();
        assert!(registry.stop(7).await);
        assert!(started.elapsed() < Duration::from_secs(1));
        assert!(!registry.is_active(7).await);
        assert_eq!(ticks.load(Ordering::SeqCst), 1);
        assert!(!registry.stop(7).await);
    }

    #[tokio::test]
    async fn test_finished_worker_can_be_restarted() {
        let registry = WorkerRegistry::new();
        registry.start(3, |_stop| async {}).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!registry.is_active(3).await);
        assert!(registry.start(3, |_stop| async {}).await);
    }

    #[tokio::test]
    async fn test_sleep_or_stop_sees_dropped_sender() {
        let (tx, mut rx) = watch::channel(false);
        drop(tx);
        assert!(sleep_or_stop(&mut rx, Duration::from_secs(30)).await);
    }
}
