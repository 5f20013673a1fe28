use std::hint::black_box;
use std::time::{Duration, Instant};
use thiserror::Error;

/// How long the calibrator spends measuring. Chosen small enough that total
/// calibration is well under the 500ms budget even with scheduling jitter.
const CALIBRATION_WINDOW: Duration = Duration::from_millis(30);

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationError {
    #[error("calibration measured zero iterations per millisecond")]
    ZeroRate,
}

/// Reproducible (within ~20% on an unloaded host) measurement of how many
/// iterations of [`busy_work`]'s body execute per millisecond on this host.
/// Immutable after creation; shared read-only by every executor thread.
#[derive(Debug, Clone, Copy)]
pub struct Calibration {
    pub iters_per_ms: u64,
}

impl Calibration {
    /// Measures the host. Must run once, before the server starts accepting
    /// connections — the process must never serve traffic with a zero or
    /// missing calibration.
    pub fn measure() -> Result<Self, CalibrationError> {
        let mut counter: u64 = 0;
        let mut acc: u64 = 0;
        let start = Instant::now();

        while start.elapsed() < CALIBRATION_WINDOW {
            for _ in 0..1_000 {
                acc = lcg_step(acc);
                counter += 1;
            }
        }
        black_box(acc);

        let elapsed_ms = start.elapsed().as_millis().max(1) as u64;
        let iters_per_ms = counter / elapsed_ms;

        if iters_per_ms == 0 {
            return Err(CalibrationError::ZeroRate);
        }
        Ok(Calibration { iters_per_ms })
    }

    /// Maps a declared WCET to the iteration count an executor should run.
    pub fn iterations_for_wcet(&self, wcet_ms: u64) -> u64 {
        wcet_ms.saturating_mul(self.iters_per_ms)
    }
}

#[inline(always)]
fn lcg_step(x: u64) -> u64 {
    x.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1_442_695_040_888_963_407)
}

/// The calibrated busy body an executor runs once per release. Same
/// arithmetic as the calibrator so the iteration count means what the
/// calibration measured.
pub fn busy_work(iterations: u64) {
    let mut acc: u64 = 0;
    for i in 0..iterations {
        acc = lcg_step(acc ^ i);
    }
    black_box(acc);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn calibration_yields_a_positive_rate() {
        let cal = Calibration::measure().expect("host can be calibrated");
        assert!(cal.iters_per_ms > 0);
    }

    #[test]
    fn calibration_completes_well_under_budget() {
        let start = Instant::now();
        Calibration::measure().unwrap();
        assert!(start.elapsed() < Duration::from_millis(500));
    }

    #[test]
    fn iterations_for_wcet_scales_linearly() {
        let cal = Calibration { iters_per_ms: 1_000 };
        assert_eq!(cal.iterations_for_wcet(5), 5_000);
        assert_eq!(cal.iterations_for_wcet(0), 0);
    }
}
