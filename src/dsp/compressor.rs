//! Dynamic range compressor module
//!
//! Attack and release are milliseconds at the control layer and seconds at
//! the engine (scale 0.001). Threshold, knee and ratio pass through.

use std::sync::Arc;

use super::module::{AudioModule, EngineApply, ModuleCore, ModuleKind, ParamSpec};
use crate::engine::AudioEngine;
use crate::error::Result;
use crate::impl_module_core;

/// Ratio at which the compressor is an identity
pub const TRANSPARENT_RATIO: f32 = 1.0;

/// Compressor parameters
pub const COMPRESSOR_PARAMS: &[ParamSpec] = &[
    ParamSpec {
        name: "threshold",
        engine_name: "threshold",
        min: -100.0,
        max: 0.0,
        default: -24.0,
        scale: 1.0,
        apply: EngineApply::Ramp,
    },
    ParamSpec {
        name: "knee",
        engine_name: "knee",
        min: 0.0,
        max: 40.0,
        default: 30.0,
        scale: 1.0,
        apply: EngineApply::Ramp,
    },
    ParamSpec {
        name: "ratio",
        engine_name: "ratio",
        min: 1.0,
        max: 20.0,
        default: 12.0,
        scale: 1.0,
        apply: EngineApply::Ramp,
    },
    ParamSpec {
        name: "attack",
        engine_name: "attack",
        min: 0.0,
        max: 1000.0,
        default: 3.0,
        scale: 0.001,
        apply: EngineApply::Ramp,
    },
    ParamSpec {
        name: "release",
        engine_name: "release",
        min: 0.0,
        max: 1000.0,
        default: 250.0,
        scale: 0.001,
        apply: EngineApply::Ramp,
    },
];

/// Compressor (soft bypass: ratio to 1:1)
#[derive(Debug)]
pub struct CompressorModule {
    core: ModuleCore,
}

impl CompressorModule {
    pub fn new(engine: Arc<dyn AudioEngine>, ramp_time: f32) -> Result<Self> {
        Ok(Self {
            core: ModuleCore::new(ModuleKind::Compressor, engine, ramp_time)?,
        })
    }
}

impl AudioModule for CompressorModule {
    impl_module_core!(core);

    fn bypass(&mut self, should_bypass: bool) -> Result<()> {
        self.core.set_bypassed(should_bypass);
        if should_bypass {
            self.core.ramp_neutral("ratio", TRANSPARENT_RATIO)
        } else {
            self.core.push_all()
        }
    }
}
