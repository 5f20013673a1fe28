//! The Task Supervisor: the sole owner of the active-instance set.
//!
//! Everything here runs on a single thread. Admission decisions, identifier
//! allocation, and executor lifecycle all happen without a lock because
//! nothing outside this loop ever touches the active set — cross-thread
//! communication is limited to the bounded event queue in and the per-instance
//! cancel flag out (both owned by `taskd-protocol` / `taskd-executor`
//! respectively).

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use taskd_admission::{admit, AdmissionError};
use taskd_catalog::{Catalog, TaskTemplate};
use taskd_executor::{Calibration, ExecutorJoinError, TaskInstance};
use taskd_protocol::{Command, ErrorReason, Event, EventReceiver, Response};

/// How long the executor's join is given to complete once cancelled, as a
/// multiple of the longest period in the catalog (§4.E: "fatal on timeout
/// exceeding 2 * max_period").
const JOIN_TIMEOUT_PERIODS: u64 = 2;

/// Owns the active set of [`TaskInstance`]s and dispatches every dequeued
/// [`Event`] to completion before looking at the next one.
pub struct Supervisor {
    catalog: Arc<Catalog>,
    calibration: Arc<Calibration>,
    max_tasks: usize,
    join_timeout: Duration,
    active: HashMap<u32, TaskInstance>,
}

impl Supervisor {
    pub fn new(catalog: Arc<Catalog>, calibration: Arc<Calibration>, max_tasks: usize) -> Self {
        let max_period_ms = catalog.iter().map(|t| t.period_ms).max().unwrap_or(1);
        let join_timeout = Duration::from_millis(max_period_ms * JOIN_TIMEOUT_PERIODS);
        Supervisor {
            catalog,
            calibration,
            max_tasks,
            join_timeout,
            active: HashMap::new(),
        }
    }

    /// Number of currently-active (non-`Joined`) instances.
    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Drives the event loop: dequeues one [`Event`] at a time, dispatches
    /// it, and writes the reply back through its [`taskd_protocol::ReplySink`]
    /// before looking at the next event — this is what gives admission
    /// decisions sequential consistency (I3) and per-connection
    /// reply-before-next-request ordering.
    ///
    /// Returns once `shutdown` is observed set, after tearing down every
    /// remaining active instance — whether that flag was set by a `SHUTDOWN`
    /// command (handled inline, below) or externally (e.g. a signal handler).
    pub fn run(mut self, events: &EventReceiver, shutdown: &Arc<AtomicBool>, poll_interval: Duration) {
        while !shutdown.load(Ordering::SeqCst) {
            if let Some(event) = events.recv_timeout(poll_interval) {
                let Event { conn, cmd } = event;
                let response = self.dispatch(shutdown, cmd);
                conn.reply(response);
            }
        }
        self.shutdown_all();
    }

    fn dispatch(&mut self, shutdown: &Arc<AtomicBool>, cmd: Command) -> Response {
        match cmd {
            Command::Activate(name) => self.activate(&name),
            Command::Deactivate(id) => self.deactivate(id),
            Command::Shutdown => {
                shutdown.store(true, Ordering::SeqCst);
                self.shutdown_all();
                Response::Ok
            }
            Command::Invalid(reason) => Response::Err(reason),
        }
    }

    fn activate(&mut self, name: &str) -> Response {
        let active_templates: Vec<TaskTemplate> =
            self.active.values().map(|i| i.template.clone()).collect();

        match admit(&self.catalog, &active_templates, name, self.max_tasks) {
            Ok(template) => {
                let id = self
                    .allocate_id()
                    .expect("admit() already bounded the active set to max_tasks");
                tracing::info!(task_id = id, task = template.name, "task activated");
                let instance = TaskInstance::spawn(id, template, Arc::clone(&self.calibration));
                self.active.insert(id, instance);
                Response::Activated(id)
            }
            Err(err) => {
                tracing::debug!(task = name, error = %err, "activation rejected");
                Response::Err(map_admission_error(err))
            }
        }
    }

    fn deactivate(&mut self, id: u32) -> Response {
        match self.active.remove(&id) {
            Some(instance) => {
                instance.cancel();
                match instance.join_bounded(self.join_timeout) {
                    Ok(()) => {
                        tracing::info!(task_id = id, "task deactivated");
                        Response::Ok
                    }
                    Err(ExecutorJoinError::Timeout) => {
                        tracing::error!(
                            task_id = id,
                            timeout_ms = self.join_timeout.as_millis() as u64,
                            "executor failed to join within the fatal bound"
                        );
                        std::process::exit(1);
                    }
                    Err(ExecutorJoinError::Panicked) => {
                        tracing::error!(task_id = id, "executor thread panicked during join");
                        std::process::exit(1);
                    }
                }
            }
            None => Response::Err(ErrorReason::UnknownId),
        }
    }

    /// Cancels and joins every remaining active instance. Idempotent: safe
    /// to call again on an already-empty active set (the external-shutdown
    /// path in `run` always calls this after the loop exits, even if a
    /// `SHUTDOWN` command already drained it).
    ///
    /// Cancellation is fanned out to every instance before any join, so the
    /// bounded waits below overlap across instances instead of summing.
    fn shutdown_all(&mut self) {
        let instances: Vec<TaskInstance> = self.active.drain().map(|(_, inst)| inst).collect();
        for instance in &instances {
            instance.cancel();
        }
        for instance in instances {
            let id = instance.id;
            match instance.join_bounded(self.join_timeout) {
                Ok(()) => tracing::info!(task_id = id, "task deactivated during shutdown"),
                Err(err) => {
                    tracing::error!(task_id = id, error = %err, "executor failed to join during shutdown");
                    std::process::exit(1);
                }
            }
        }
    }

    /// Smallest unused identifier in `[1, max_tasks]`, per §4.E's
    /// deterministic allocation discipline (I1, I5, P1).
    fn allocate_id(&self) -> Option<u32> {
        (1..=self.max_tasks as u32).find(|candidate| !self.active.contains_key(candidate))
    }
}

fn map_admission_error(err: AdmissionError) -> ErrorReason {
    match err {
        AdmissionError::UnknownTask => ErrorReason::UnknownTask,
        AdmissionError::CapacityFull => ErrorReason::CapacityFull,
        AdmissionError::Unschedulable => ErrorReason::Unschedulable,
    }
}
