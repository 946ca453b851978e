use futures::FutureExt;
use portable_atomic::{AtomicUsize, Ordering};
use std::{future::Future, panic::AssertUnwindSafe, sync::Arc};
use tokio::sync::{Mutex, mpsc, oneshot};

/// Message consumed by pool workers.
pub enum WorkRequest<J> {
    /// A unit of work to execute.
    Run(J),
    /// Ask the receiving worker to stop and acknowledge.
    Shutdown { response: oneshot::Sender<()> },
}

/// Queue shared by every worker of a pool. Whichever idle worker holds the
/// lock takes the next message, so work is handed out in submission order.
pub type SharedQueue<J> = Arc<Mutex<mpsc::UnboundedReceiver<WorkRequest<J>>>>;

/// Executes the jobs of one pool.
///
/// A handler is shared by all workers of its pool, so a pool of `n` workers
/// runs at most `n` invocations of [`handle`](Self::handle) concurrently.
pub trait JobHandler<J>: Send + Sync + 'static {
    fn handle(&self, worker_id: usize, job: J) -> impl Future<Output = ()> + Send;
}

/// Worker task that pulls [`WorkRequest`]s off a pool's shared queue.
///
/// Jobs run one at a time. A job that panics is logged and dropped; the
/// worker keeps serving the queue. The loop ends on
/// [`WorkRequest::Shutdown`] or when every sender is gone.
///
/// # Arguments
///
/// - `pool`: Pool name, used in logs.
/// - `worker_id`: Index of this worker within its pool.
/// - `queue`: Receiver shared with the other workers of the pool.
/// - `handler`: Executes each job.
/// - `pending`: Count of submitted jobs not yet finished; decremented here.
pub async fn worker_loop<J, H>(
    pool: &'static str,
    worker_id: usize,
    queue: SharedQueue<J>,
    handler: Arc<H>,
    pending: Arc<AtomicUsize>,
) where
    J: Send + 'static,
    H: JobHandler<J>,
{
    tracing::trace!(pool, "Worker {worker_id} started");

    loop {
        // The guard is dropped at the end of the statement, before the job
        // runs, so idle workers can wait on the queue meanwhile.
        let next = queue.lock().await.recv().await;
        let Some(work) = next else {
            tracing::debug!(pool, "Worker {worker_id} queue closed");
            break;
        };

        match work {
            WorkRequest::Run(job) => {
                let outcome = AssertUnwindSafe(handler.handle(worker_id, job))
                    .catch_unwind()
                    .await;
                pending.fetch_sub(1, Ordering::AcqRel);

                if outcome.is_err() {
                    tracing::error!(pool, "Worker {worker_id} job panicked; continuing");
                }
            }
            WorkRequest::Shutdown { response } => {
                tracing::debug!(pool, "Worker {worker_id} received shutdown signal");

                if response.send(()).is_err() {
                    tracing::error!(pool, "Worker {worker_id} failed to acknowledge shutdown");
                }
                break;
            }
        }
    }

    tracing::trace!(pool, "Worker {worker_id} stopped");
}
