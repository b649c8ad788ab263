//! Three-band equalizer module
//!
//! Low/mid/high gains in dB plus the two crossover frequencies. The engine's
//! three-band EQ derives its mid band from the crossovers, so `midFreq` is
//! recorded for the control surface but has no engine counterpart.

use std::sync::Arc;

use super::module::{AudioModule, EngineApply, ModuleCore, ModuleKind, ParamSpec};
use crate::engine::AudioEngine;
use crate::error::Result;
use crate::impl_module_core;

/// Band gains driven to 0 dB on bypass
const BAND_PARAMS: [&str; 3] = ["low", "mid", "high"];

/// EQ parameters
pub const EQ_PARAMS: &[ParamSpec] = &[
    ParamSpec {
        name: "low",
        engine_name: "low",
        min: -12.0,
        max: 12.0,
        default: 0.0,
        scale: 1.0,
        apply: EngineApply::Ramp,
    },
    ParamSpec {
        name: "mid",
        engine_name: "mid",
        min: -12.0,
        max: 12.0,
        default: 0.0,
        scale: 1.0,
        apply: EngineApply::Ramp,
    },
    ParamSpec {
        name: "high",
        engine_name: "high",
        min: -12.0,
        max: 12.0,
        default: 0.0,
        scale: 1.0,
        apply: EngineApply::Ramp,
    },
    ParamSpec {
        name: "lowFreq",
        engine_name: "lowFrequency",
        min: 20.0,
        max: 500.0,
        default: 400.0,
        scale: 1.0,
        apply: EngineApply::Ramp,
    },
    ParamSpec {
        name: "midFreq",
        engine_name: "midFrequency",
        min: 400.0,
        max: 4000.0,
        default: 2500.0,
        scale: 1.0,
        apply: EngineApply::StoredOnly,
    },
    ParamSpec {
        name: "highFreq",
        engine_name: "highFrequency",
        min: 3000.0,
        max: 16000.0,
        default: 8000.0,
        scale: 1.0,
        apply: EngineApply::Ramp,
    },
];

/// Three-band EQ (soft bypass: band gains to 0 dB, crossovers untouched)
#[derive(Debug)]
pub struct EqModule {
    core: ModuleCore,
}

impl EqModule {
    pub fn new(engine: Arc<dyn AudioEngine>, ramp_time: f32) -> Result<Self> {
        Ok(Self {
            core: ModuleCore::new(ModuleKind::Eq, engine, ramp_time)?,
        })
    }
}

impl AudioModule for EqModule {
    impl_module_core!(core);

    fn bypass(&mut self, should_bypass: bool) -> Result<()> {
        self.core.set_bypassed(should_bypass);
        if should_bypass {
            for band in BAND_PARAMS {
                self.core.ramp_neutral(band, 0.0)?;
            }
            Ok(())
        } else {
            self.core.push_all()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::MockEngine;

    #[test]
    fn test_eq_bypass_flattens_bands() {
        let engine = MockEngine::shared();
        let mut eq = EqModule::new(engine.clone(), 0.05).unwrap();
        eq.update_param("low", 6.0).unwrap();
        eq.update_param("high", -3.5).unwrap();

        eq.set_active(false).unwrap();
        assert_eq!(engine.param(eq.node(), "low"), Some(0.0));
        assert_eq!(engine.param(eq.node(), "high"), Some(0.0));

        eq.set_active(true).unwrap();
        assert_eq!(engine.param(eq.node(), "low"), Some(6.0));
        assert_eq!(engine.param(eq.node(), "high"), Some(-3.5));
    }

    #[test]
    fn test_eq_frequency_ramps_use_engine_names() {
        let engine = MockEngine::shared();
        let mut eq = EqModule::new(engine.clone(), 0.05).unwrap();
        eq.update_param("lowFreq", 250.0).unwrap();
        let write = engine.writes().pop().unwrap();
        assert_eq!(write.param, "lowFrequency");
        assert_eq!(write.ramp, Some(0.05));
    }

    #[test]
    fn test_mid_freq_is_recorded_only() {
        let engine = MockEngine::shared();
        let mut eq = EqModule::new(engine.clone(), 0.05).unwrap();
        engine.clear_writes();
        eq.update_param("midFreq", 1200.0).unwrap();
        assert_eq!(eq.params()["midFreq"], 1200.0);
        assert!(engine.writes().is_empty());
    }

    #[test]
    fn test_eq_clamps_gain() {
        let engine = MockEngine::shared();
        let mut eq = EqModule::new(engine, 0.05).unwrap();
        eq.update_param("mid", 40.0).unwrap();
        assert_eq!(eq.params()["mid"], 12.0);
    }
}
