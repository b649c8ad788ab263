//! Level meter
//!
//! Wraps a smoothed level-sensing engine node. Meters are leaf taps: they
//! receive a signal but never feed anything downstream.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::engine::{AudioEngine, Endpoint, NodeId, NodeKind, NodeSpec};
use crate::error::Result;

/// "No signal" floor sentinel in dB
pub const FLOOR_DB: f32 = -60.0;

/// Top of the metered range in dB
pub const CEILING_DB: f32 = 0.0;

/// Default smoothing coefficient (strong smoothing)
pub const DEFAULT_SMOOTHING: f32 = 0.8;

/// Clamp a level into `[FLOOR_DB, CEILING_DB]`; NaN reads as the floor
#[inline]
pub fn clamp_db(db: f32) -> f32 {
    if db.is_nan() {
        FLOOR_DB
    } else {
        db.clamp(FLOOR_DB, CEILING_DB)
    }
}

/// Input and output levels of the chain
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MeterReading {
    pub input: f32,
    pub output: f32,
}

impl MeterReading {
    /// Build a reading, clamping both sides
    pub fn new(input: f32, output: f32) -> Self {
        Self {
            input: clamp_db(input),
            output: clamp_db(output),
        }
    }

    /// Reading reported when nothing is connected
    pub fn floor() -> Self {
        Self {
            input: FLOOR_DB,
            output: FLOOR_DB,
        }
    }
}

impl Default for MeterReading {
    fn default() -> Self {
        Self::floor()
    }
}

/// Engine-side level meter
pub struct Meter {
    engine: Arc<dyn AudioEngine>,
    node: NodeId,
    smoothing: f32,
    disposed: bool,
}

impl Meter {
    pub fn new(engine: Arc<dyn AudioEngine>, smoothing: f32) -> Result<Self> {
        let node = engine.create_node(&NodeSpec::new(NodeKind::Meter).with("smoothing", smoothing))?;
        Ok(Self {
            engine,
            node,
            smoothing,
            disposed: false,
        })
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn smoothing(&self) -> f32 {
        self.smoothing
    }

    /// Smoothed level in dB as the engine reports it
    pub fn get_value(&self) -> f32 {
        if self.disposed {
            return FLOOR_DB;
        }
        self.engine.read_level(self.node)
    }

    /// Level mapped from `FLOOR_DB..=CEILING_DB` to `0.0..=1.0`
    pub fn get_normalized_value(&self) -> f32 {
        (clamp_db(self.get_value()) - FLOOR_DB) / (CEILING_DB - FLOOR_DB)
    }

    /// Tap `source` into this meter
    pub fn connect(&self, source: Endpoint) -> Result<()> {
        self.engine.connect(source, Endpoint::Node(self.node))
    }

    pub fn disconnect(&self) {
        self.engine.disconnect(Endpoint::Node(self.node));
    }

    pub fn dispose(&mut self) {
        if !self.disposed {
            self.disconnect();
            self.engine.dispose_node(self.node);
            self.disposed = true;
        }
    }
}

impl std::fmt::Debug for Meter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Meter")
            .field("node", &self.node)
            .field("smoothing", &self.smoothing)
            .field("disposed", &self.disposed)
            .finish()
    }
}
