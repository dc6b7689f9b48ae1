//! Fixed-size worker pool draining a shared FIFO queue.

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

/// A unit of work. Callers that need a result capture their own signalling
/// primitive (typically a oneshot sender) inside the closure.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Fixed pool of workers executing submitted jobs in FIFO order.
///
/// The queue is an unbounded channel; `submit` enqueues and returns
/// immediately. Workers share the receiving end behind a lock and take jobs
/// one at a time in submission order. Jobs run on the blocking thread pool so
/// a panicking job surfaces as a join error on the worker, which logs it and
/// keeps going — a single failing job never shrinks the pool.
pub struct WorkerPool {
    queue: mpsc::UnboundedSender<Job>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn new(worker_count: usize) -> Self {
        let (queue, receiver) = mpsc::unbounded_channel::<Job>();
        let receiver = Arc::new(Mutex::new(receiver));

        let workers = (0..worker_count.max(1))
            .map(|worker_id| {
                let receiver = Arc::clone(&receiver);
                tokio::spawn(async move {
                    loop {
                        // The queue lock is held only for the dequeue itself,
                        // so idle workers line up while busy ones run jobs.
                        let job = receiver.lock().await.recv().await;
                        let Some(job) = job else { break };

                        if let Err(e) = tokio::task::spawn_blocking(job).await {
                            tracing::error!(worker_id, error = %e, "job panicked");
                        }
                    }
                    tracing::debug!(worker_id, "worker stopped");
                })
            })
            .collect();

        Self { queue, workers }
    }

    /// Enqueues a job and returns immediately.
    pub fn submit(&self, job: Job) {
        // The receiver outlives the workers; send only fails after shutdown.
        if self.queue.send(job).is_err() {
            tracing::error!("job submitted after worker pool shutdown, dropping it");
        }
    }

    /// Closes the queue and waits for the workers to drain it and exit.
    pub async fn shutdown(self) {
        drop(self.queue);
        for worker in self.workers {
            let _ = worker.await;
        }
    }
}
