//! Stereo to mono mixdown module
//!
//! Summing channels cannot be undone by any parameter, so this module only
//! tracks its flags; the orchestrator relinks the chain around it when it is
//! switched off.

use std::sync::Arc;

use tracing::debug;

use super::module::{AudioModule, ModuleCore, ModuleKind, ParamSpec};
use crate::engine::AudioEngine;
use crate::error::Result;
use crate::impl_module_core;

/// Mono has no adjustable parameters
pub const MONO_PARAMS: &[ParamSpec] = &[];

/// Mono mixdown (hard bypass)
#[derive(Debug)]
pub struct MonoModule {
    core: ModuleCore,
}

impl MonoModule {
    pub fn new(engine: Arc<dyn AudioEngine>, ramp_time: f32) -> Result<Self> {
        Ok(Self {
            core: ModuleCore::new(ModuleKind::Mono, engine, ramp_time)?,
        })
    }
}

impl AudioModule for MonoModule {
    impl_module_core!(core);

    fn bypass(&mut self, should_bypass: bool) -> Result<()> {
        self.core.set_bypassed(should_bypass);
        debug!("Mono bypass={}; takes effect on next reconnect", should_bypass);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::MockEngine;

    #[test]
    fn test_mono_has_no_params() {
        let engine = MockEngine::shared();
        let mut mono = MonoModule::new(engine.clone(), 0.05).unwrap();
        assert!(mono.params().is_empty());
        assert!(mono.update_param("enabled", 1.0).is_err());
    }

    #[test]
    fn test_mono_bypass_touches_no_engine_params() {
        let engine = MockEngine::shared();
        let mut mono = MonoModule::new(engine.clone(), 0.05).unwrap();
        mono.set_active(true).unwrap();
        mono.set_active(false).unwrap();
        assert!(mono.is_bypassed());
        assert!(engine.writes().is_empty());
    }
}
