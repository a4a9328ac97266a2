//! Shared background-task pool.
//!
//! Queues never own threads. When a queue goes from empty to non-empty it hands a
//! drain task to a [`Spawn`] implementation; in production that is a [`TaskPool`]
//! shared by every device.

use crossbeam::channel::{self, Sender};
use parking_lot::Mutex;
use std::panic::{self, AssertUnwindSafe};
use std::thread::JoinHandle;
use tracing::{debug, error};

/// A unit of background work.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Something that can run a [`Task`] later, on another thread.
pub trait Spawn: Send + Sync {
    /// Hands `task` over for execution. A task that can no longer run is given
    /// back.
    fn spawn(&self, task: Task) -> Result<(), Task>;
}

/// Fixed set of worker threads fed by a crossbeam channel.
pub struct TaskPool {
    sender: Mutex<Option<Sender<Task>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl TaskPool {
    /// Starts `workers` threads (at least one).
    pub fn new(workers: usize) -> std::io::Result<Self> {
        let (tx, rx) = channel::unbounded::<Task>();
        let mut handles = Vec::with_capacity(workers.max(1));
        for n in 0..workers.max(1) {
            let rx = rx.clone();
            let handle = std::thread::Builder::new()
                .name(format!("lgmux-worker-{n}"))
                .spawn(move || {
                    while let Ok(task) = rx.recv() {
                        if panic::catch_unwind(AssertUnwindSafe(task)).is_err() {
                            error!(worker = n, "task panicked");
                        }
                    }
                    debug!(worker = n, "task pool worker exiting");
                })?;
            handles.push(handle);
        }
        Ok(Self {
            sender: Mutex::new(Some(tx)),
            workers: Mutex::new(handles),
        })
    }

    /// Stops accepting tasks, lets queued ones finish and joins the workers.
    pub fn shutdown(&self) {
        self.sender.lock().take();
        let handles: Vec<_> = self.workers.lock().drain(..).collect();
        let current = std::thread::current().id();
        for handle in handles {
            // The last reference can be released from inside a task.
            if handle.thread().id() == current {
                continue;
            }
            if handle.join().is_err() {
                error!("task pool worker panicked");
            }
        }
    }
}

impl Spawn for TaskPool {
    fn spawn(&self, task: Task) -> Result<(), Task> {
        let sender = self.sender.lock();
        match sender.as_ref() {
            Some(tx) => tx.send(task).map_err(|e| {
                error!("task pool channel closed, task rejected");
                e.into_inner()
            }),
            None => {
                error!("task pool is shut down, task rejected");
                Err(task)
            }
        }
    }
}

impl Drop for TaskPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Runs each task immediately on the spawning thread.
///
/// Deterministic; used by tests and single-shot tools.
#[derive(Clone, Copy, Debug, Default)]
pub struct InlineSpawn;

impl Spawn for InlineSpawn {
    fn spawn(&self, task: Task) -> Result<(), Task> {
        task();
        Ok(())
    }
}
