//! Metering
//!
//! Level meters on the chain's input and output, peak hold for displays,
//! and the poller that feeds a display at a fixed cadence.

mod meter;
mod peak_hold;
mod poller;

pub use meter::{clamp_db, Meter, MeterReading, CEILING_DB, DEFAULT_SMOOTHING, FLOOR_DB};
pub use peak_hold::{PeakHold, DEFAULT_PEAK_HOLD};
pub use poller::{MeterDisplay, MeterPoller};
