//! Noise Gate module
//!
//! Silences audio below a threshold. The engine gate exposes threshold and
//! smoothing as plain properties, so values are set rather than ramped.

use std::sync::Arc;

use super::module::{AudioModule, EngineApply, ModuleCore, ModuleKind, ParamSpec};
use crate::engine::AudioEngine;
use crate::error::Result;
use crate::impl_module_core;

/// Threshold low enough that the gate never closes
pub const GATE_OPEN_THRESHOLD_DB: f32 = -100.0;

/// Gate parameters
pub const GATE_PARAMS: &[ParamSpec] = &[
    ParamSpec {
        name: "threshold",
        engine_name: "threshold",
        min: -100.0,
        max: 0.0,
        default: -50.0,
        scale: 1.0,
        apply: EngineApply::Set,
    },
    ParamSpec {
        name: "smoothing",
        engine_name: "smoothing",
        min: 0.0,
        max: 1.0,
        default: 0.1,
        scale: 1.0,
        apply: EngineApply::Set,
    },
];

/// Noise gate (soft bypass: threshold drops to [`GATE_OPEN_THRESHOLD_DB`])
#[derive(Debug)]
pub struct GateModule {
    core: ModuleCore,
}

impl GateModule {
    pub fn new(engine: Arc<dyn AudioEngine>, ramp_time: f32) -> Result<Self> {
        Ok(Self {
            core: ModuleCore::new(ModuleKind::Gate, engine, ramp_time)?,
        })
    }
}

impl AudioModule for GateModule {
    impl_module_core!(core);

    fn bypass(&mut self, should_bypass: bool) -> Result<()> {
        self.core.set_bypassed(should_bypass);
        if should_bypass {
            self.core.set_neutral("threshold", GATE_OPEN_THRESHOLD_DB)
        } else {
            self.core.push_all()
        }
    }
}
