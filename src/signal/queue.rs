//! Serialized handler execution
//!
//! Network completions fulfill promises from whatever task performed the
//! I/O. A [`MainQueue`] funnels handler execution back onto one consumer so
//! state mutations stay serialized, the way a UI main loop would run them.
//! [`crate::signal::Promise::via`] builds the decorator on top of this.

use tokio::sync::mpsc;
use tracing::trace;

type Job = Box<dyn FnOnce() + Send>;

/// Cheap handle for dispatching jobs onto a serialized consumer.
#[derive(Clone)]
pub struct MainQueue {
    tx: mpsc::UnboundedSender<Job>,
}

/// Consumer side of a [`MainQueue`]; owns the job stream.
pub struct MainQueueRunner {
    rx: mpsc::UnboundedReceiver<Job>,
}

impl MainQueue {
    /// Create a queue together with its runner. The caller decides where the
    /// runner executes — tests typically [`MainQueueRunner::drain`] it
    /// manually for deterministic ordering.
    pub fn channel() -> (Self, MainQueueRunner) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, MainQueueRunner { rx })
    }

    /// Create a queue whose runner drains on a spawned tokio task.
    pub fn spawn() -> Self {
        let (queue, mut runner) = Self::channel();
        tokio::spawn(async move { runner.run().await });
        queue
    }

    /// Enqueue a job. Jobs run in FIFO order on the queue's consumer. Jobs
    /// dispatched after the runner is gone are dropped.
    pub fn dispatch(&self, job: impl FnOnce() + Send + 'static) {
        if self.tx.send(Box::new(job)).is_err() {
            trace!("main queue runner gone, dropping job");
        }
    }
}

impl MainQueueRunner {
    /// Run jobs until every queue handle has been dropped.
    pub async fn run(&mut self) {
        while let Some(job) = self.rx.recv().await {
            job();
        }
    }

    /// Synchronously run every job currently enqueued, returning the count.
    pub fn drain(&mut self) -> usize {
        let mut ran = 0;
        while let Ok(job) = self.rx.try_recv() {
            job();
            ran += 1;
        }
        ran
    }
}
