//! Background work loops with LIFO queues.
//!
//! Every background stage (hashing, extraction) is a [`WorkerLoop`]: one
//! dedicated OS thread polling a [`WorkQueue`] and pushing each completed
//! item onto a crossbeam channel. The queue is a stack, so the most recently
//! requested item is always served first.
//!
//! # Cancellation
//!
//! The loop checks its [`ShutdownHandler`] once per iteration. An item that
//! is already running is never preempted; [`WorkerLoop::join`] waits for it.

use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::Sender;

use crate::signal::ShutdownHandler;

/// Sleep between polls of an empty queue.
pub const DEFAULT_IDLE_INTERVAL: Duration = Duration::from_millis(100);

/// A mutex-guarded stack of pending work.
#[derive(Debug)]
pub struct WorkQueue<T> {
    items: Mutex<Vec<T>>,
}

impl<T> Default for WorkQueue<T> {
    fn default() -> Self {
        Self {
            items: Mutex::new(Vec::new()),
        }
    }
}

impl<T> WorkQueue<T> {
    /// Create an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Push one item on top.
    pub fn push(&self, item: T) {
        self.lock().push(item);
    }

    /// Push items in iteration order; the last one is served first.
    pub fn push_all(&self, items: impl IntoIterator<Item = T>) {
        self.lock().extend(items);
    }

    /// Take the most recently pushed item.
    pub fn pop(&self) -> Option<T> {
        self.lock().pop()
    }

    /// Drop every pending item.
    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Number of pending items.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<T>> {
        // A panicking job never holds this lock, so the data is intact.
        self.items.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// One unit of background work.
pub trait Job: Send + 'static {
    /// Queued request type.
    type Input: Send + 'static;
    /// Reported result type.
    type Output: Send + 'static;

    /// Process one request. `None` drops it without a report.
    fn run(&mut self, input: Self::Input) -> Option<Self::Output>;
}

/// Run one consumption step: pop the newest item and process it.
///
/// Returns `None` when the queue was empty, otherwise the job's result.
pub fn run_once<J: Job>(job: &mut J, queue: &WorkQueue<J::Input>) -> Option<Option<J::Output>> {
    queue.pop().map(|input| job.run(input))
}

/// A background thread consuming a [`WorkQueue`] with a [`Job`].
pub struct WorkerLoop<J: Job> {
    name: String,
    queue: Arc<WorkQueue<J::Input>>,
    shutdown: ShutdownHandler,
    handle: Option<JoinHandle<()>>,
}

impl<J: Job> WorkerLoop<J> {
    /// Spawn the loop thread.
    ///
    /// Results go to `results`; the loop keeps running after the receiving
    /// side is dropped and simply discards them.
    pub fn spawn(
        name: &str,
        job: J,
        results: Sender<J::Output>,
        idle_interval: Duration,
    ) -> std::io::Result<Self> {
        Self::spawn_with_queue(name, job, Arc::new(WorkQueue::new()), results, idle_interval)
    }

    /// Spawn the loop over an existing (possibly pre-filled) queue.
    pub fn spawn_with_queue(
        name: &str,
        mut job: J,
        queue: Arc<WorkQueue<J::Input>>,
        results: Sender<J::Output>,
        idle_interval: Duration,
    ) -> std::io::Result<Self> {
        let shutdown = ShutdownHandler::new();
        let loop_queue = Arc::clone(&queue);
        let loop_shutdown = shutdown.clone();
        let thread_name = name.to_string();

        let handle = thread::Builder::new()
            .name(thread_name.clone())
            .spawn(move || {
                log::debug!("{}: started", thread_name);
                while !loop_shutdown.is_shutdown_requested() {
                    match run_once(&mut job, &loop_queue) {
                        Some(Some(output)) => {
                            if results.send(output).is_err() {
                                log::trace!("{}: result receiver dropped", thread_name);
                            }
                        }
                        Some(None) => {}
                        None => thread::sleep(idle_interval),
                    }
                }
                log::debug!("{}: stopped", thread_name);
            })?;

        Ok(Self {
            name: name.to_string(),
            queue,
            shutdown,
            handle: Some(handle),
        })
    }

    /// Queue one request.
    pub fn enqueue(&self, input: J::Input) {
        log::trace!("{}: enqueue ({} pending)", self.name, self.queue.len() + 1);
        self.queue.push(input);
    }

    /// Queue several requests; the last one is served first.
    pub fn enqueue_all(&self, inputs: impl IntoIterator<Item = J::Input>) {
        self.queue.push_all(inputs);
    }

    /// The shared queue.
    #[must_use]
    pub fn queue(&self) -> &Arc<WorkQueue<J::Input>> {
        &self.queue
    }

    /// Ask the loop to stop after the current item.
    pub fn interrupt(&self) {
        self.shutdown.request_shutdown();
    }

    /// Whether the thread is still alive.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Interrupt and wait for the thread to exit.
    pub fn join(&mut self) {
        self.interrupt();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("{}: worker thread panicked", self.name);
            }
        }
    }
}

impl<J: Job> Drop for WorkerLoop<J> {
    fn drop(&mut self) {
        self.join();
    }
}
