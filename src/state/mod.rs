//! State Management Module
//!
//! The persisted snapshot, durable storage backends, and the control-surface
//! store that keeps them in step with the processor.

mod snapshot;
mod storage;
mod store;

pub use snapshot::{
    CompressorState, EqState, GainState, GateState, LimiterState, MonoState, PersistedSnapshot,
    PitchShiftState, DEFAULT_VOLUME,
};
pub use storage::{FileStorage, MemoryStorage, StorageBackend};
pub use store::AudioStore;
