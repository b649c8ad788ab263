//! Pitch shift module
//!
//! Pitch is passed to the engine in semitones unchanged. Neither pitch nor
//! window size is rampable on the engine side.

use std::sync::Arc;

use super::module::{AudioModule, EngineApply, ModuleCore, ModuleKind, ParamSpec};
use crate::engine::AudioEngine;
use crate::error::Result;
use crate::impl_module_core;

pub const PITCH_SHIFT_PARAMS: &[ParamSpec] = &[
    ParamSpec {
        name: "pitch",
        engine_name: "pitch",
        min: -12.0,
        max: 12.0,
        default: 0.0,
        scale: 1.0,
        apply: EngineApply::Set,
    },
    ParamSpec {
        name: "windowSize",
        engine_name: "windowSize",
        min: 0.03,
        max: 0.5,
        default: 0.1,
        scale: 1.0,
        apply: EngineApply::Set,
    },
];

/// Pitch shifter (soft bypass: 0 semitones)
#[derive(Debug)]
pub struct PitchShiftModule {
    core: ModuleCore,
}

impl PitchShiftModule {
    pub fn new(engine: Arc<dyn AudioEngine>, ramp_time: f32) -> Result<Self> {
        Ok(Self {
            core: ModuleCore::new(ModuleKind::PitchShift, engine, ramp_time)?,
        })
    }
}

impl AudioModule for PitchShiftModule {
    impl_module_core!(core);

    fn bypass(&mut self, should_bypass: bool) -> Result<()> {
        self.core.set_bypassed(should_bypass);
        if should_bypass {
            self.core.set_neutral("pitch", 0.0)
        } else {
            self.core.push_all()
        }
    }
}
