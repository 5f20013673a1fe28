use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use taskd_catalog::TaskTemplate;

use crate::calibration::{busy_work, Calibration};

/// How often the sleep loop wakes to re-check the cancel flag, bounding
/// cancellation latency independent of how far away the next release is.
const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// A live periodic executor for one admitted task instance.
///
/// Owned exclusively by the Supervisor. The only datum shared with the
/// executor thread is `cancel`, a single-writer (Supervisor) /
/// single-reader (executor) atomic.
pub struct TaskInstance {
    pub id: u32,
    pub template: TaskTemplate,
    cancel: Arc<AtomicBool>,
    deadline_misses: Arc<AtomicU64>,
    thread: thread::Thread,
    handle: Option<JoinHandle<()>>,
}

impl TaskInstance {
    /// Spawns the executor thread and returns the handle the Supervisor
    /// tracks in its active-instance set.
    pub fn spawn(id: u32, template: TaskTemplate, calibration: Arc<Calibration>) -> Self {
        let cancel = Arc::new(AtomicBool::new(false));
        let deadline_misses = Arc::new(AtomicU64::new(0));

        let loop_template = template.clone();
        let loop_cancel = Arc::clone(&cancel);
        let loop_misses = Arc::clone(&deadline_misses);

        let handle = thread::Builder::new()
            .name(format!("taskd-exec-{id}"))
            .spawn(move || run(id, loop_template, calibration, loop_cancel, loop_misses))
            .expect("failed to spawn executor thread");

        TaskInstance {
            id,
            template,
            cancel,
            deadline_misses,
            thread: handle.thread().clone(),
            handle: Some(handle),
        }
    }

    /// Requests cancellation and wakes the executor immediately rather than
    /// waiting for its next poll.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
        self.thread.unpark();
    }

    /// Blocks until the executor has exited. The Supervisor calls this only
    /// after `cancel()`; a join that would exceed `2 * max_period` is a
    /// fatal condition the caller is responsible for timing out on.
    pub fn join(mut self) -> thread::Result<()> {
        self.handle.take().expect("join called twice").join()
    }

    /// Joins with a bound on how long to wait. `cancel()` must already have
    /// been called — this only waits for the thread to observe it. Polls
    /// `JoinHandle::is_finished` rather than a condvar because std gives no
    /// timed join; the instance's own `CANCEL_POLL_INTERVAL` upper-bounds how
    /// long a well-behaved executor can take to notice cancellation, so this
    /// poll interval only needs to be fine enough not to overshoot `timeout`
    /// by much.
    ///
    /// On timeout the join handle is dropped (the thread is left detached,
    /// not killed) — §4.E treats this as fatal, so the caller is expected to
    /// terminate the process rather than keep running with a leaked thread.
    pub fn join_bounded(mut self, timeout: Duration) -> Result<(), ExecutorJoinError> {
        let handle = self.handle.take().expect("join called twice");
        let deadline = Instant::now() + timeout;
        while !handle.is_finished() {
            if Instant::now() >= deadline {
                return Err(ExecutorJoinError::Timeout);
            }
            thread::sleep(Duration::from_millis(5));
        }
        handle.join().map_err(|_| ExecutorJoinError::Panicked)
    }

    pub fn deadline_misses(&self) -> u64 {
        self.deadline_misses.load(Ordering::Relaxed)
    }
}

fn run(
    id: u32,
    template: TaskTemplate,
    calibration: Arc<Calibration>,
    cancel: Arc<AtomicBool>,
    deadline_misses: Arc<AtomicU64>,
) {
    let iterations = calibration.iterations_for_wcet(template.wcet_ms);
    let period = Duration::from_millis(template.period_ms);

    loop {
        if cancel.load(Ordering::SeqCst) {
            break;
        }

        let release = Instant::now();
        let next = release + period;

        busy_work(iterations);

        if Instant::now() > next {
            deadline_misses.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(task_id = id, template = template.name, "deadline miss");
        }

        if cancel.load(Ordering::SeqCst) {
            break;
        }

        if !wait_until(next, &cancel) {
            break;
        }
    }

    tracing::debug!(task_id = id, "executor stopped");
}

/// Timed wait until `deadline`, polling `cancel` at least once per
/// [`CANCEL_POLL_INTERVAL`]. Returns `false` if cancellation was observed,
/// `true` if the deadline was reached normally. A spurious wakeup from
/// `park_timeout` is tolerated by simply re-evaluating the loop condition
/// and reasserting the remaining sleep.
fn wait_until(deadline: Instant, cancel: &AtomicBool) -> bool {
    loop {
        if cancel.load(Ordering::SeqCst) {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        let remaining = deadline - now;
        thread::park_timeout(remaining.min(CANCEL_POLL_INTERVAL));
    }
}

/// Failure returned by [`TaskInstance::join_bounded`].
#[derive(Debug, thiserror::Error)]
pub enum ExecutorJoinError {
    #[error("executor did not stop within the join deadline")]
    Timeout,
    #[error("executor thread panicked")]
    Panicked,
}
