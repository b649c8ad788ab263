//! Gain module
//!
//! Linear gain multiplier applied inside the graph, as opposed to the media
//! element volume which the orchestrator drives directly.

use std::sync::Arc;

use super::module::{AudioModule, EngineApply, ModuleCore, ModuleKind, ParamSpec};
use crate::engine::AudioEngine;
use crate::error::Result;
use crate::impl_module_core;

/// Unity gain
pub const UNITY_GAIN: f32 = 1.0;

pub const GAIN_PARAMS: &[ParamSpec] = &[ParamSpec {
    name: "gain",
    engine_name: "gain",
    min: 0.0,
    max: 5.0,
    default: UNITY_GAIN,
    scale: 1.0,
    apply: EngineApply::Ramp,
}];

/// Gain stage (soft bypass: unity)
#[derive(Debug)]
pub struct GainModule {
    core: ModuleCore,
}

impl GainModule {
    pub fn new(engine: Arc<dyn AudioEngine>, ramp_time: f32) -> Result<Self> {
        Ok(Self {
            core: ModuleCore::new(ModuleKind::Gain, engine, ramp_time)?,
        })
    }

    /// Current linear gain
    pub fn gain(&self) -> f32 {
        self.core.param("gain")
    }
}

impl AudioModule for GainModule {
    impl_module_core!(core);

    fn bypass(&mut self, should_bypass: bool) -> Result<()> {
        self.core.set_bypassed(should_bypass);
        if should_bypass {
            self.core.ramp_neutral("gain", UNITY_GAIN)
        } else {
            self.core.push_all()
        }
    }
}
