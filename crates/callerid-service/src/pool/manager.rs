//! Fixed-size pool of asynchronous workers sharing one FIFO queue.
//!
//! [`WorkerPool::spawn`] starts `n` [`worker_loop`] tasks that all pull from a
//! single unbounded queue, so at most `n` jobs run at once and the rest wait
//! in submission order. Submission never blocks.
//!
//! Shutdown is cooperative: the pool's [`CancellationToken`] is cancelled so
//! new submissions are refused, then one [`WorkRequest::Shutdown`] per worker
//! is queued behind the outstanding jobs. Workers therefore drain everything
//! already accepted before acknowledging. A job whose submission raced the
//! cancellation can land behind those markers; it is discarded and logged once
//! the workers are gone.

use super::worker::{JobHandler, SharedQueue, WorkRequest, worker_loop};
use callerid_core::Error;
use core::time::Duration;
use portable_atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::{
    sync::{Mutex, mpsc, oneshot},
    time::timeout,
};
use tokio_util::sync::CancellationToken;

/// A bounded set of workers executing jobs of type `J`.
pub struct WorkerPool<J> {
    name: &'static str,
    queue: mpsc::UnboundedSender<WorkRequest<J>>,
    receiver: SharedQueue<J>,
    workers: usize,
    pending: Arc<AtomicUsize>,
    shutdown_token: CancellationToken,
    shutdown_timeout: Duration,
}

impl<J: Send + 'static> WorkerPool<J> {
    /// Spawns `workers` tasks on the current Tokio runtime, all sharing
    /// `handler`.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn spawn<H: JobHandler<J>>(
        name: &'static str,
        workers: usize,
        handler: Arc<H>,
        shutdown_timeout: Duration,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let queue: SharedQueue<J> = Arc::new(Mutex::new(rx));
        let pending = Arc::new(AtomicUsize::new(0));

        for worker_id in 0..workers {
            tokio::spawn(worker_loop(
                name,
                worker_id,
                Arc::clone(&queue),
                Arc::clone(&handler),
                Arc::clone(&pending),
            ));
        }

        tracing::debug!(pool = name, workers, "Worker pool started");

        Self {
            name,
            queue: tx,
            receiver: queue,
            workers,
            pending,
            shutdown_token: CancellationToken::new(),
            shutdown_timeout,
        }
    }

    /// Number of workers, i.e. the maximum number of concurrently running
    /// jobs.
    pub const fn workers(&self) -> usize {
        self.workers
    }

    /// Jobs accepted but not yet finished, including running ones.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown_token.is_cancelled()
    }

    /// Queues a job for the next free worker.
    ///
    /// # Errors
    ///
    /// - [`Error::ServiceShutdown`] once [`shutdown`](Self::shutdown) has
    ///   started.
    /// - [`Error::ChannelError`] if the queue is closed.
    pub fn submit(&self, job: J) -> Result<(), Error> {
        if self.shutdown_token.is_cancelled() {
            return Err(Error::ServiceShutdown);
        }
        self.enqueue(job)
    }

    fn enqueue(&self, job: J) -> Result<(), Error> {
        let queued = self.pending.fetch_add(1, Ordering::AcqRel) + 1;
        if self.queue.send(WorkRequest::Run(job)).is_err() {
            self.pending.fetch_sub(1, Ordering::AcqRel);
            return Err(Error::ChannelError {
                context: format!("{} queue closed", self.name),
            });
        }

        if queued > self.workers {
            tracing::trace!(pool = self.name, queued, "All workers busy; job queued");
        }
        Ok(())
    }

    /// Stops accepting work, drains what was already accepted and waits for
    /// every worker to acknowledge.
    ///
    /// Each acknowledgement is awaited for at most the configured shutdown
    /// timeout. A worker that misses it is logged and left to finish in the
    /// background.
    pub async fn shutdown(&self) -> Result<(), Error> {
        tracing::info!(pool = self.name, "Refusing new jobs");
        self.shutdown_token.cancel();

        tracing::debug!(
            pool = self.name,
            pending = self.pending(),
            "Draining accepted jobs"
        );
        let mut acks = Vec::with_capacity(self.workers);

        for i in 0..self.workers {
            let (tx, rx) = oneshot::channel();
            if let Err(e) = self.queue.send(WorkRequest::Shutdown { response: tx }) {
                tracing::error!(pool = self.name, "Failed to send shutdown to worker {i}: {e}");
            } else {
                acks.push((i, rx));
            }
        }

        let wait = self.shutdown_timeout;
        let name = self.name;
        let timeout_futures = acks.into_iter().map(|(i, rx)| async move {
            match timeout(wait, rx).await {
                Ok(Ok(())) => {
                    tracing::trace!(pool = name, "Worker {i} shutdown acknowledged");
                }
                Ok(Err(e)) => {
                    tracing::error!(pool = name, "Worker {i} returned error: {e}");
                }
                Err(_) => {
                    tracing::warn!(pool = name, "Worker {i} shutdown timed out");
                }
            }
        });

        futures::future::join_all(timeout_futures).await;
        self.discard_late_jobs().await;

        tracing::info!(pool = self.name, "Worker pool shutdown complete");
        Ok(())
    }

    /// Removes jobs queued behind the shutdown markers, which no worker will
    /// ever run. Markers still waiting for a slow worker are put back.
    async fn discard_late_jobs(&self) {
        let Ok(mut queue) = timeout(self.shutdown_timeout, self.receiver.lock()).await else {
            tracing::warn!(pool = self.name, "Queue still busy; late jobs not checked");
            return;
        };

        let mut late = 0;
        let mut markers = Vec::new();
        while let Ok(work) = queue.try_recv() {
            match work {
                WorkRequest::Run(_) => late += 1,
                marker @ WorkRequest::Shutdown { .. } => markers.push(marker),
            }
        }
        drop(queue);

        for marker in markers {
            // The pool holds the receiver, so the queue cannot be closed.
            let _ = self.queue.send(marker);
        }

        if late > 0 {
            self.pending.fetch_sub(late, Ordering::AcqRel);
            tracing::warn!(pool = self.name, late, "Dropped jobs submitted during shutdown");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::future::Future;
    use tokio::time::sleep;

    #[derive(Default)]
    struct Tracking {
        running: AtomicUsize,
        peak: AtomicUsize,
        done: AtomicUsize,
    }

    impl JobHandler<u64> for Tracking {
        fn handle(&self, _worker_id: usize, delay_ms: u64) -> impl Future<Output = ()> + Send {
            async move {
                let now = self.running.fetch_add(1, Ordering::AcqRel) + 1;
                self.peak.fetch_max(now, Ordering::AcqRel);
                sleep(Duration::from_millis(delay_ms)).await;
                self.running.fetch_sub(1, Ordering::AcqRel);
                self.done.fetch_add(1, Ordering::AcqRel);
            }
        }
    }

    struct Panicky {
        done: AtomicUsize,
    }

    impl JobHandler<bool> for Panicky {
        fn handle(&self, _worker_id: usize, explode: bool) -> impl Future<Output = ()> + Send {
            async move {
                assert!(!explode, "job asked to panic");
                self.done.fetch_add(1, Ordering::AcqRel);
            }
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn never_exceeds_worker_count() {
        let handler = Arc::new(Tracking::default());
        let pool = WorkerPool::spawn("test", 2, Arc::clone(&handler), Duration::from_secs(3));

        for _ in 0..6 {
            pool.submit(30).unwrap();
        }
        pool.shutdown().await.unwrap();

        assert_eq!(handler.done.load(Ordering::Acquire), 6);
        assert!(handler.peak.load(Ordering::Acquire) <= 2);
        assert_eq!(pool.pending(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn refuses_work_after_shutdown() {
        let handler = Arc::new(Tracking::default());
        let pool = WorkerPool::spawn("test", 1, handler, Duration::from_secs(3));

        pool.shutdown().await.unwrap();

        assert!(pool.is_shutdown());
        assert!(matches!(pool.submit(1), Err(Error::ServiceShutdown)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn job_racing_shutdown_is_discarded() {
        let handler = Arc::new(Tracking::default());
        let pool = Arc::new(WorkerPool::spawn(
            "test",
            1,
            Arc::clone(&handler),
            Duration::from_secs(3),
        ));

        pool.submit(100).unwrap();
        let stopping = tokio::spawn({
            let pool = Arc::clone(&pool);
            async move { pool.shutdown().await }
        });
        sleep(Duration::from_millis(20)).await;
        assert!(pool.is_shutdown());

        // A submit that passed the cancellation check just before shutdown.
        pool.enqueue(5).unwrap();
        stopping.await.unwrap().unwrap();

        assert_eq!(handler.done.load(Ordering::Acquire), 1);
        assert_eq!(pool.pending(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn panicking_job_does_not_kill_worker() {
        let handler = Arc::new(Panicky {
            done: AtomicUsize::new(0),
        });
        let pool = WorkerPool::spawn("test", 1, Arc::clone(&handler), Duration::from_secs(3));

        pool.submit(true).unwrap();
        pool.submit(false).unwrap();
        pool.submit(false).unwrap();
        pool.shutdown().await.unwrap();

        assert_eq!(handler.done.load(Ordering::Acquire), 2);
    }
}
