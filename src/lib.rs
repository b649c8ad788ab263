//! Audio Expert - effect chain orchestration
//!
//! Drives a fixed chain of audio effects on a page-embedded media element
//! from a separate control surface:
//! 1. Chain orchestrator - owns engine nodes, topology and lifecycle
//! 2. Control bus - typed fire-and-forget commands and request/response reads
//! 3. State store - canonical snapshot, persisted and replayed on startup
//!
//! # Signal path
//!
//! source → gate → eq → compressor → pitchShift → gain → [mono] → [limiter]
//! → destination, with level meters on the source and on the tail.

pub mod bus;
pub mod cli;
pub mod config;
pub mod dsp;
pub mod engine;
pub mod error;
pub mod metering;
pub mod state;

pub use bus::{Command, ControlBus, Processor, Query, Response};
pub use config::{ChainConfig, Config};
pub use dsp::{AudioChain, ModuleKind};
pub use error::{AudioExpertError, Result};
pub use metering::{MeterDisplay, MeterPoller, MeterReading};
pub use state::{AudioStore, PersistedSnapshot};
