//! Bounded worker pool.
//!
//! A producer task enqueues one job per (file, format) pair, in file-then-format order, onto a bounded queue. A
//! fixed number of worker tasks drain the queue and publish each result on the job's own oneshot channel. The
//! aggregator holds the receiving ends in canonical order, so it observes results in that order no matter which
//! worker finishes first.

use std::sync::Arc;

use shadertest_core::OutputFormat;
use shadertest_core::text::parse_flags_header;
use tokio::sync::{Mutex, mpsc, oneshot};

use super::interfaces::Invoker;
use super::job::{JobContext, JobResult, TestFile, WorkUnit, run_job};

/// Capacity of the shared work queue.
pub const QUEUE_CAPACITY: usize = 256;

struct Job {
    unit: WorkUnit,
    result: oneshot::Sender<JobResult>,
}

/// Pending results, one receiver per (file, format), in scheduling order.
pub struct ResultGrid {
    rows: Vec<Vec<oneshot::Receiver<JobResult>>>,
}

impl ResultGrid {
    pub fn from_rows(rows: Vec<Vec<oneshot::Receiver<JobResult>>>) -> Self {
        Self { rows }
    }

    pub fn into_rows(self) -> Vec<Vec<oneshot::Receiver<JobResult>>> {
        self.rows
    }
}

/// Spawn the producer and `workers` worker tasks on the current runtime.
///
/// Returns immediately; results arrive on the returned grid as jobs complete.
pub fn spawn<I: Invoker>(
    files: &[Arc<TestFile>],
    formats: &[OutputFormat],
    ctx: JobContext,
    invoker: Arc<I>,
    workers: usize,
) -> ResultGrid {
    let mut rows = Vec::with_capacity(files.len());
    let mut pending = Vec::with_capacity(files.len());
    for file in files {
        let mut row = Vec::with_capacity(formats.len());
        let mut senders = Vec::with_capacity(formats.len());
        for &format in formats {
            let (tx, rx) = oneshot::channel();
            row.push(rx);
            senders.push((format, tx));
        }
        rows.push(row);
        pending.push((Arc::clone(file), senders));
    }

    let (queue, receiver) = mpsc::channel::<Job>(QUEUE_CAPACITY);
    let receiver = Arc::new(Mutex::new(receiver));

    let workers = workers.max(1);
    tracing::debug!(workers, units = files.len() * formats.len(), "starting worker pool");
    for _ in 0..workers {
        let receiver = Arc::clone(&receiver);
        let ctx = ctx.clone();
        let invoker = Arc::clone(&invoker);
        tokio::spawn(async move {
            loop {
                // The guard is released as soon as a job has been taken.
                let next = receiver.lock().await.recv().await;
                let Some(job) = next else { break };
                let result = run_job(&job.unit, &ctx, invoker.as_ref()).await;
                // The aggregator may have stopped listening; the result is simply dropped then.
                let _ = job.result.send(result);
            }
        });
    }

    tokio::spawn(async move {
        for (file, senders) in pending {
            let flags = match tokio::fs::read_to_string(&file.path).await {
                Ok(source) => Arc::new(parse_flags_header(&source)),
                Err(e) => {
                    tracing::debug!(file = %file.key, error = %e, "could not read test for flags");
                    Arc::new(Vec::new())
                }
            };
            for (format, result) in senders {
                let unit = WorkUnit {
                    file: Arc::clone(&file),
                    format,
                    flags: Arc::clone(&flags),
                };
                if queue.send(Job { unit, result }).await.is_err() {
                    tracing::warn!("work queue closed before all jobs were scheduled");
                    return;
                }
            }
        }
        // Dropping `queue` closes it; workers exit once it is drained.
    });

    ResultGrid { rows }
}
