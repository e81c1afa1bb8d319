use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, SendTimeoutError, Sender};
use log::{debug, error, info, warn};
use tokio::sync::broadcast;

use crate::broadcast::document_progress::{DocumentPhase, DocumentProgressEvent};
use crate::error::WorkerError;
use crate::pipeline::progress::{BroadcastProgress, NoopProgress, ProgressEvent, ProgressReporter};
use crate::pipeline::DocumentWorker;
use crate::sanitize;
use crate::worker::job::{DocumentJob, DocumentOutcome};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Fixed set of threads running [`DocumentWorker::run`] over a bounded queue.
pub struct WorkerPool {
    job_sender: Sender<DocumentJob>,
    result_receiver: Receiver<DocumentOutcome>,
    workers: Vec<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
}

impl WorkerPool {
    pub fn new(worker: Arc<DocumentWorker>, worker_count: usize) -> Result<Self, WorkerError> {
        Self::with_progress_sender(worker, worker_count, None)
    }

    /// Starts `worker_count` threads (at least one). When a progress sender
    /// is given, every document reports its phases on it.
    pub fn with_progress_sender(
        worker: Arc<DocumentWorker>,
        worker_count: usize,
        progress_sender: Option<Arc<broadcast::Sender<DocumentProgressEvent>>>,
    ) -> Result<Self, WorkerError> {
        let worker_count = worker_count.max(1);
        let (job_sender, job_receiver) = bounded::<DocumentJob>(worker_count * 2);
        // Results are unbounded so a worker never blocks on a slow collector.
        let (result_sender, result_receiver) = unbounded::<DocumentOutcome>();
        let shutdown = Arc::new(AtomicBool::new(false));

        let mut workers = Vec::with_capacity(worker_count);

        for worker_id in 0..worker_count {
            let job_rx = job_receiver.clone();
            let result_tx = result_sender.clone();
            let shutdown_flag = Arc::clone(&shutdown);
            let document_worker = Arc::clone(&worker);
            let sender = progress_sender.clone();

            let handle = thread::Builder::new()
                .name(format!("batchdoc-worker-{}", worker_id))
                .spawn(move || {
                    run_worker(
                        worker_id,
                        job_rx,
                        result_tx,
                        shutdown_flag,
                        document_worker,
                        sender,
                    );
                })
                .map_err(|e| {
                    shutdown.store(true, Ordering::Relaxed);
                    WorkerError::SpawnFailed(e.to_string())
                })?;

            workers.push(handle);
        }

        info!("Started {} workers", worker_count);

        Ok(Self {
            job_sender,
            result_receiver,
            workers,
            shutdown,
        })
    }

    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Queues a job, waiting at most `timeout` for space.
    pub fn submit(&self, job: DocumentJob, timeout: Duration) -> Result<(), WorkerError> {
        if self.shutdown.load(Ordering::Relaxed) {
            return Err(WorkerError::ChannelClosed);
        }

        self.job_sender
            .send_timeout(job, timeout)
            .map_err(|e| match e {
                SendTimeoutError::Timeout(_) => WorkerError::DispatchTimeout,
                SendTimeoutError::Disconnected(_) => WorkerError::ChannelClosed,
            })
    }

    pub fn try_recv_result(&self) -> Option<DocumentOutcome> {
        self.result_receiver.try_recv().ok()
    }

    /// Waits at most `timeout` for the next outcome. `None` on timeout or
    /// when every worker has exited.
    pub fn recv_result_timeout(&self, timeout: Duration) -> Option<DocumentOutcome> {
        match self.result_receiver.recv_timeout(timeout) {
            Ok(outcome) => Some(outcome),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => {
                debug!("All workers have exited");
                None
            }
        }
    }

    pub fn shutdown(&self) {
        info!("Shutting down worker pool...");
        self.shutdown.store(true, Ordering::Relaxed);
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }

    /// Closes the queue and joins every worker.
    pub fn wait(self) {
        drop(self.job_sender);

        for (i, worker) in self.workers.into_iter().enumerate() {
            if let Err(e) = worker.join() {
                error!("Worker {} panicked: {:?}", i, e);
            } else {
                debug!("Worker {} finished", i);
            }
        }

        info!("All workers have stopped");
    }

    /// Signals shutdown and returns without joining. Workers stuck in an
    /// engine call finish their current document and exit on their own.
    pub fn abandon(self) {
        self.shutdown.store(true, Ordering::Relaxed);
        let busy = self.workers.iter().filter(|w| !w.is_finished()).count();
        if busy > 0 {
            warn!("Abandoning worker pool with {} workers still running", busy);
        }
    }
}

fn run_worker(
    worker_id: usize,
    job_receiver: Receiver<DocumentJob>,
    result_sender: Sender<DocumentOutcome>,
    shutdown: Arc<AtomicBool>,
    worker: Arc<DocumentWorker>,
    progress_sender: Option<Arc<broadcast::Sender<DocumentProgressEvent>>>,
) {
    debug!("Worker {} started", worker_id);

    loop {
        if shutdown.load(Ordering::Relaxed) {
            debug!("Worker {} received shutdown signal", worker_id);
            break;
        }

        match job_receiver.recv_timeout(POLL_INTERVAL) {
            Ok(job) => {
                if shutdown.load(Ordering::Relaxed) {
                    // Never lease a job that arrives after the deadline.
                    debug!("Worker {} dropping job after shutdown", worker_id);
                    break;
                }
                debug!("Worker {} processing document {}", worker_id, job.document_id);

                let outcome = match progress_sender {
                    Some(ref sender) => {
                        let progress = BroadcastProgress::new(
                            &job.batch_id,
                            &job.document_id,
                            &sanitize::redact_object_name(&job.source.object_name),
                            Arc::clone(sender),
                        );
                        progress.report(ProgressEvent::Phase {
                            phase: DocumentPhase::Queued,
                            message: "Document queued for processing".to_string(),
                        });
                        run_isolated(&worker, job, &progress)
                    }
                    None => run_isolated(&worker, job, &NoopProgress),
                };

                if let Err(e) = result_sender.send(outcome) {
                    error!("Worker {} failed to send result: {}", worker_id, e);
                    break;
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                continue;
            }
            Err(RecvTimeoutError::Disconnected) => {
                debug!("Worker {} job channel disconnected", worker_id);
                break;
            }
        }
    }

    debug!("Worker {} stopped", worker_id);
}

/// Runs one document, turning a panic into a failed outcome so it cannot
/// take the batch down with it.
fn run_isolated(
    worker: &DocumentWorker,
    job: DocumentJob,
    progress: &dyn ProgressReporter,
) -> DocumentOutcome {
    let retained = job.clone();
    match panic::catch_unwind(AssertUnwindSafe(|| worker.run(job, progress))) {
        Ok(outcome) => outcome,
        Err(payload) => worker.recover_from_panic(retained, &panic_message(&payload), progress),
    }
}

fn panic_message(payload: &Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
