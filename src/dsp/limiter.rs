//! Limiter module
//!
//! The engine limiter fixes its threshold at construction. Threshold updates
//! are recorded and logged as an engine limitation; they never fail. The
//! orchestrator recreates the node from the recorded value the next time it
//! relinks. With no live parameter to neutralize, bypass here only marks
//! state and the orchestrator unlinks the node.

use std::sync::Arc;

use tracing::debug;

use super::module::{AudioModule, EngineApply, ModuleCore, ModuleKind, ParamSpec};
use crate::engine::AudioEngine;
use crate::error::Result;
use crate::impl_module_core;

pub const LIMITER_PARAMS: &[ParamSpec] = &[ParamSpec {
    name: "threshold",
    engine_name: "threshold",
    min: -20.0,
    max: 0.0,
    default: -3.0,
    scale: 1.0,
    apply: EngineApply::ConstructionOnly,
}];

/// Brickwall limiter (hard bypass)
#[derive(Debug)]
pub struct LimiterModule {
    core: ModuleCore,
}

impl LimiterModule {
    pub fn new(engine: Arc<dyn AudioEngine>, ramp_time: f32) -> Result<Self> {
        Ok(Self {
            core: ModuleCore::new(ModuleKind::Limiter, engine, ramp_time)?,
        })
    }
}

impl AudioModule for LimiterModule {
    impl_module_core!(core);

    fn bypass(&mut self, should_bypass: bool) -> Result<()> {
        self.core.set_bypassed(should_bypass);
        if should_bypass {
            debug!("Limiter bypassed; node leaves the signal path on the next relink");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::MockEngine;

    #[test]
    fn test_threshold_fixed_at_construction() {
        let engine = MockEngine::shared();
        let mut limiter = LimiterModule::new(engine.clone(), 0.05).unwrap();
        assert_eq!(engine.param(limiter.node(), "threshold"), Some(-3.0));

        limiter.update_param("threshold", -10.0).unwrap();
        assert_eq!(limiter.params()["threshold"], -10.0);
        assert_eq!(engine.param(limiter.node(), "threshold"), Some(-3.0));
        assert!(engine.writes().is_empty());
    }

    #[test]
    fn test_rebuild_uses_recorded_threshold() {
        let engine = MockEngine::shared();
        let mut limiter = LimiterModule::new(engine.clone(), 0.05).unwrap();
        let old = limiter.node();
        assert!(!limiter.refresh_node().unwrap());

        limiter.update_param("threshold", -10.0).unwrap();
        assert!(limiter.core().is_stale());
        assert!(limiter.refresh_node().unwrap());

        assert_ne!(limiter.node(), old);
        assert_eq!(engine.param(limiter.node(), "threshold"), Some(-10.0));
        assert_eq!(engine.live_count(), 1);
        assert!(!limiter.core().is_stale());
        assert!(!limiter.refresh_node().unwrap());
    }

    #[test]
    fn test_limiter_bypass_is_flag_only() {
        let engine = MockEngine::shared();
        let mut limiter = LimiterModule::new(engine.clone(), 0.05).unwrap();
        limiter.set_active(false).unwrap();
        assert!(limiter.is_bypassed());
        assert!(!limiter.is_active());
    }
}
