//! Serial execution context for channel handlers.

use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Sender};
use std::sync::{Mutex, PoisonError};
use std::thread::{self, JoinHandle, ThreadId};

type Task = Box<dyn FnOnce() + Send + 'static>;

/// A dedicated worker thread that runs tasks one at a time, in submission order.
///
/// A task that panics is logged and the worker keeps going.
pub struct TaskQueue {
    sender: Mutex<Option<Sender<Task>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    thread_id: ThreadId,
    name: String,
}

impl TaskQueue {
    /// Spawn the worker thread.
    pub fn spawn(name: impl Into<String>) -> std::io::Result<Self> {
        let name = name.into();
        let (sender, receiver) = mpsc::channel::<Task>();
        let worker = thread::Builder::new().name(name.clone()).spawn(move || {
            for task in receiver {
                if panic::catch_unwind(AssertUnwindSafe(task)).is_err() {
                    tracing::error!("task panicked on dispatch queue");
                }
            }
        })?;
        Ok(Self {
            sender: Mutex::new(Some(sender)),
            thread_id: worker.thread().id(),
            worker: Mutex::new(Some(worker)),
            name,
        })
    }

    /// Queue a task. Returns false once the queue is shut down.
    pub fn execute(&self, task: impl FnOnce() + Send + 'static) -> bool {
        let guard = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
        match guard.as_ref() {
            Some(sender) => sender.send(Box::new(task)).is_ok(),
            None => false,
        }
    }

    /// True when called from the worker thread itself.
    pub fn is_current(&self) -> bool {
        thread::current().id() == self.thread_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stop accepting tasks, drain the queue and wait for the worker.
    ///
    /// From the worker thread itself this only stops accepting tasks.
    pub fn shutdown(&self) {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if self.is_current() {
            return;
        }
        let worker = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(worker) = worker {
            let _ = worker.join();
        }
    }
}

impl Drop for TaskQueue {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for TaskQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskQueue").field("name", &self.name).finish()
    }
}
