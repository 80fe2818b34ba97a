//! Loader thread pool for frame decoding.
//!
//! The thread count is the in-flight limit: at most `num_threads` loader calls
//! run at once, everything else waits in the FIFO job queue. Callers enqueue in
//! priority order (center frame first), so FIFO order is priority order.
//!
//! Cancellation is the caller's business: jobs check their epoch/disposed
//! token when they start and return early if stale.

use crossbeam_channel::{Receiver, Sender, unbounded};
use log::trace;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// How long `Drop` waits for running jobs before detaching the threads
const SHUTDOWN_TIMEOUT: Duration = Duration::from_millis(500);

/// Fixed-size worker pool fed by a shared channel.
pub struct Workers {
    sender: Option<Sender<Job>>,
    handles: Vec<thread::JoinHandle<()>>,
    queued: Arc<AtomicUsize>,
    active: Arc<AtomicUsize>,
}

impl std::fmt::Debug for Workers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workers")
            .field("threads", &self.handles.len())
            .field("queued", &self.queued())
            .field("active", &self.active())
            .finish()
    }
}

impl Workers {
    /// Spawn `num_threads` loader threads (at least one).
    pub fn new(num_threads: usize) -> Self {
        let num_threads = num_threads.max(1);
        let (sender, receiver) = unbounded::<Job>();
        let queued = Arc::new(AtomicUsize::new(0));
        let active = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::with_capacity(num_threads);
        for worker_id in 0..num_threads {
            let receiver: Receiver<Job> = receiver.clone();
            let queued = Arc::clone(&queued);
            let active = Arc::clone(&active);

            let handle = thread::Builder::new()
                .name(format!("playa-loader-{}", worker_id))
                .spawn(move || {
                    trace!("Loader {} started", worker_id);
                    // recv() fails once the pool drops its sender and the queue is drained
                    while let Ok(job) = receiver.recv() {
                        queued.fetch_sub(1, Ordering::AcqRel);
                        active.fetch_add(1, Ordering::AcqRel);
                        job();
                        active.fetch_sub(1, Ordering::AcqRel);
                    }
                    trace!("Loader {} stopped", worker_id);
                })
                .expect("Failed to spawn loader thread");

            handles.push(handle);
        }

        trace!("Workers initialized: {} threads", num_threads);

        Self {
            sender: Some(sender),
            handles,
            queued,
            active,
        }
    }

    /// Queue a job. Runs when a thread is free.
    pub fn execute<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let Some(sender) = &self.sender else {
            return;
        };
        self.queued.fetch_add(1, Ordering::AcqRel);
        if sender.send(Box::new(f)).is_err() {
            // All threads gone; nothing will run it
            self.queued.fetch_sub(1, Ordering::AcqRel);
        }
    }

    pub fn num_threads(&self) -> usize {
        self.handles.len()
    }

    /// Jobs waiting for a thread
    pub fn queued(&self) -> usize {
        self.queued.load(Ordering::Acquire)
    }

    /// Jobs currently running
    pub fn active(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }
}

impl Drop for Workers {
    fn drop(&mut self) {
        let num_threads = self.handles.len();
        trace!("Workers shutting down ({} threads)...", num_threads);

        // Closing the channel lets idle threads exit; queued jobs still drain,
        // which is cheap since they see the cancelled token
        self.sender.take();

        let deadline = Instant::now() + SHUTDOWN_TIMEOUT;
        for handle in std::mem::take(&mut self.handles) {
            while !handle.is_finished() {
                if Instant::now() >= deadline {
                    trace!("Shutdown timeout reached, detaching loader threads");
                    return;
                }
                thread::sleep(Duration::from_millis(1));
            }
            let _ = handle.join();
        }

        trace!("All {} loaders stopped", num_threads);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_jobs_run() {
        let workers = Workers::new(2);
        let (tx, rx) = crossbeam_channel::unbounded();
        for i in 0..10 {
            let tx = tx.clone();
            workers.execute(move || {
                tx.send(i).unwrap();
            });
        }
        let mut got: Vec<i32> = (0..10).map(|_| rx.recv_timeout(Duration::from_secs(5)).unwrap()).collect();
        got.sort();
        assert_eq!(got, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_concurrency_bounded_by_threads() {
        let workers = Workers::new(2);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(Mutex::new(0usize));
        let (tx, rx) = crossbeam_channel::unbounded();

        for _ in 0..8 {
            let running = Arc::clone(&running);
            let peak = Arc::clone(&peak);
            let tx = tx.clone();
            workers.execute(move || {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                {
                    let mut p = peak.lock().unwrap();
                    *p = (*p).max(now);
                }
                thread::sleep(Duration::from_millis(5));
                running.fetch_sub(1, Ordering::SeqCst);
                tx.send(()).unwrap();
            });
        }
        for _ in 0..8 {
            rx.recv_timeout(Duration::from_secs(5)).unwrap();
        }
        assert!(*peak.lock().unwrap() <= 2);
    }

    #[test]
    fn test_single_thread_is_fifo() {
        let workers = Workers::new(1);
        let order = Arc::new(Mutex::new(Vec::new()));
        let (tx, rx) = crossbeam_channel::unbounded();
        for i in 0..5 {
            let order = Arc::clone(&order);
            let tx = tx.clone();
            workers.execute(move || {
                order.lock().unwrap().push(i);
                tx.send(()).unwrap();
            });
        }
        for _ in 0..5 {
            rx.recv_timeout(Duration::from_secs(5)).unwrap();
        }
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    }
}
