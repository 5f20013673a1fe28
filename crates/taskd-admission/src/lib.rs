//! Admission control: catalog resolution plus Response Time Analysis (RTA).
//!
//! `admit` is a pure function of the prospective task set — it owns no
//! state of its own, which makes it directly unit- and property-testable
//! without spinning up a supervisor or any threads.

use taskd_catalog::{Catalog, TaskTemplate};
use thiserror::Error;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionError {
    #[error("unknown task")]
    UnknownTask,
    #[error("prospective set would exceed capacity")]
    CapacityFull,
    #[error("prospective set is not schedulable")]
    Unschedulable,
}

/// Attempts to admit `name` into the set of `active` templates.
///
/// On success returns the resolved [`TaskTemplate`] so the caller (the
/// Supervisor) can spawn an executor for it without a second catalog lookup.
pub fn admit(
    catalog: &Catalog,
    active: &[TaskTemplate],
    name: &str,
    max_tasks: usize,
) -> Result<TaskTemplate, AdmissionError> {
    let candidate = catalog.lookup(name).ok_or(AdmissionError::UnknownTask)?.clone();

    if active.len() + 1 > max_tasks {
        return Err(AdmissionError::CapacityFull);
    }

    let mut prospective: Vec<TaskTemplate> = active.to_vec();
    prospective.push(candidate.clone());

    if is_schedulable(&prospective) {
        Ok(candidate)
    } else {
        Err(AdmissionError::Unschedulable)
    }
}

/// Runs RTA over every task in `set`, ordered by increasing priority number
/// (i.e. highest priority first). A task's response time only depends on
/// tasks strictly higher in priority, but admitting a new high-priority task
/// can push a previously-fine lower-priority task over its deadline, so every
/// task in the prospective set is re-checked rather than only the candidate.
fn is_schedulable(set: &[TaskTemplate]) -> bool {
    let mut ordered: Vec<&TaskTemplate> = set.iter().collect();
    ordered.sort_by_key(|t| t.priority);

    for (idx, task) in ordered.iter().enumerate() {
        let higher_priority = &ordered[..idx];
        match response_time(task, higher_priority) {
            Some(r) if r <= task.relative_deadline_ms => continue,
            _ => return false,
        }
    }
    true
}

/// Worst-case response time fixed-point iteration for a single task against
/// the tasks that can preempt it.
///
/// `R^(0) = wcet`, `R^(k+1) = wcet + sum(ceil(R^(k) / period_j) * wcet_j)`.
/// Terminates on convergence (schedulable) or once the candidate response
/// time exceeds the task's deadline (unschedulable).
fn response_time(task: &TaskTemplate, higher_priority: &[&TaskTemplate]) -> Option<u64> {
    let mut r = task.wcet_ms;
    loop {
        let interference: u64 = higher_priority
            .iter()
            .map(|hp| ceil_div(r, hp.period_ms) * hp.wcet_ms)
            .sum();
        let next = task.wcet_ms + interference;

        if next == r {
            return Some(r);
        }
        if next > task.relative_deadline_ms {
            return None;
        }
        r = next;
    }
}

fn ceil_div(a: u64, b: u64) -> u64 {
    (a + b - 1) / b
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template(name: &'static str, period: u64, deadline: u64, wcet: u64, priority: u32) -> TaskTemplate {
        TaskTemplate {
            name,
            period_ms: period,
            relative_deadline_ms: deadline,
            wcet_ms: wcet,
            priority,
        }
    }

    #[test]
    fn unknown_task_is_rejected() {
        let catalog = Catalog::builtin();
        let err = admit(&catalog, &[], "does-not-exist", 20).unwrap_err();
        assert_eq!(err, AdmissionError::UnknownTask);
    }

    #[test]
    fn empty_set_admits_first_task() {
        let catalog = Catalog::builtin();
        let t = admit(&catalog, &[], "t1", 20).unwrap();
        assert_eq!(t.name, "t1");
    }

    #[test]
    fn capacity_full_is_enforced() {
        let catalog = Catalog::builtin();
        let t1 = catalog.lookup("t1").unwrap().clone();
        let active = vec![t1; 2];
        let err = admit(&catalog, &active, "t2", 2).unwrap_err();
        assert_eq!(err, AdmissionError::CapacityFull);
    }

    #[test]
    fn grossly_overloaded_set_is_unschedulable() {
        // Three tasks each demanding full CPU at the same period cannot
        // possibly meet their own deadlines together.
        let t1 = template("a", 10, 10, 10, 0);
        let t2 = template("b", 10, 10, 10, 1);
        let set = vec![t1, t2];
        assert!(!is_schedulable(&set));
    }

    #[test]
    fn single_task_well_under_its_period_is_schedulable() {
        let t = template("solo", 100, 100, 5, 0);
        assert!(is_schedulable(&[t]));
    }

    #[test]
    fn lower_priority_addition_does_not_disturb_higher_priority_task() {
        let hi = template("hi", 20, 20, 5, 0);
        let lo = template("lo", 100, 100, 10, 1);
        assert!(is_schedulable(&[hi.clone(), lo]));
        assert_eq!(response_time(&hi, &[]), Some(5));
    }

    proptest::proptest! {
        #[test]
        fn response_time_never_shrinks_the_task_below_its_own_wcet(
            wcet in 1u64..50,
            period in 1u64..500,
        ) {
            let deadline = period;
            let t = template("p", period.max(wcet), deadline.max(wcet), wcet, 0);
            if let Some(r) = response_time(&t, &[]) {
                proptest::prop_assert!(r >= t.wcet_ms);
            }
        }
    }
}
