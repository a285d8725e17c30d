use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};
use tokio::sync::Notify;

/// Counting join over the tile jobs of one run.
///
/// Every job is registered with [`CompletionBarrier::add`] before it is
/// dispatched and released exactly once, on success and failure alike.
/// [`CompletionBarrier::wait`] resolves once nothing is outstanding.
#[derive(Debug, Default)]
pub struct CompletionBarrier {
    pending: AtomicUsize,
    released: Notify,
}

impl CompletionBarrier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, jobs: usize) {
        self.pending.fetch_add(jobs, Ordering::AcqRel);
    }

    /// Releases one job.
    ///
    /// # Panics
    /// Panics if more jobs are released than were added.
    pub fn done(&self) {
        let before = self.pending.fetch_sub(1, Ordering::AcqRel);
        assert!(before > 0, "completion barrier released more jobs than were added");

        if before == 1 {
            self.released.notify_waiters();
        }
    }

    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    pub async fn wait(&self) {
        loop {
            // registered before the check so a release in between is not lost
            let released = self.released.notified();
            if self.pending() == 0 {
                return;
            }
            released.await;
        }
    }

    /// Registers one job and returns a guard that releases it when dropped.
    pub fn enter(self: &Arc<Self>) -> JobGuard {
        self.add(1);
        JobGuard {
            barrier: Arc::clone(self),
        }
    }
}

/// Releases its job on the barrier when dropped, whichever way the job ends.
#[derive(Debug)]
pub struct JobGuard {
    barrier: Arc<CompletionBarrier>,
}

impl Drop for JobGuard {
    fn drop(&mut self) {
        self.barrier.done();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn empty_barrier_is_open() {
        CompletionBarrier::new().wait().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn waits_for_every_job() {
        let barrier = Arc::new(CompletionBarrier::new());
        let guards: Vec<_> = (0..50).map(|_| barrier.enter()).collect();
        assert_eq!(barrier.pending(), 50);

        for (i, guard) in guards.into_iter().enumerate() {
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis((i % 7) as u64)).await;
                drop(guard);
            });
        }

        tokio::time::timeout(Duration::from_secs(5), barrier.wait())
            .await
            .expect("barrier never opened");
        assert_eq!(barrier.pending(), 0);
    }

    #[tokio::test]
    async fn guard_releases_on_panic() {
        let barrier = Arc::new(CompletionBarrier::new());
        let guard = barrier.enter();

        let handle = tokio::spawn(async move {
            let _guard = guard;
            panic!("worker blew up");
        });
        assert!(handle.await.is_err());

        barrier.wait().await;
    }

    #[test]
    #[should_panic]
    fn over_release_panics() {
        CompletionBarrier::new().done();
    }
}
