//! CPU calibration and the periodic executor that runs one admitted task
//! instance until cancelled.

mod calibration;
mod instance;

pub use calibration::{busy_work, Calibration, CalibrationError};
pub use instance::{ExecutorJoinError, TaskInstance};
