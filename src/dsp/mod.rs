//! Effect chain
//!
//! Seven fixed modules in processing order:
//! Gate → EQ → Compressor → PitchShift → Gain → Mono → Limiter
//!
//! Each module drives one engine node. The [`AudioChain`] orchestrator owns
//! the registry, the graph topology and the meters.

mod chain;
mod compressor;
mod eq;
mod gain;
mod gate;
mod limiter;
mod module;
mod mono;
mod pitch_shift;

use std::sync::Arc;

use crate::engine::AudioEngine;
use crate::error::Result;

pub use chain::{AudioChain, ChainPhase, VolumeState};
pub use compressor::CompressorModule;
pub use eq::EqModule;
pub use gain::GainModule;
pub use gate::GateModule;
pub use limiter::LimiterModule;
pub use module::{
    AudioModule, BypassMode, EngineApply, ModuleCore, ModuleDescriptor, ModuleKind, ModuleState,
    ParamSpec, CHAIN_ORDER,
};
pub use mono::MonoModule;
pub use pitch_shift::PitchShiftModule;

/// Build the module variant for `kind` with constructor defaults
pub fn create_module(
    kind: ModuleKind,
    engine: Arc<dyn AudioEngine>,
    ramp_time: f32,
) -> Result<Box<dyn AudioModule>> {
    let module: Box<dyn AudioModule> = match kind {
        ModuleKind::Gate => Box::new(GateModule::new(engine, ramp_time)?),
        ModuleKind::Eq => Box::new(EqModule::new(engine, ramp_time)?),
        ModuleKind::Compressor => Box::new(CompressorModule::new(engine, ramp_time)?),
        ModuleKind::PitchShift => Box::new(PitchShiftModule::new(engine, ramp_time)?),
        ModuleKind::Gain => Box::new(GainModule::new(engine, ramp_time)?),
        ModuleKind::Mono => Box::new(MonoModule::new(engine, ramp_time)?),
        ModuleKind::Limiter => Box::new(LimiterModule::new(engine, ramp_time)?),
    };
    Ok(module)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::MockEngine;

    #[test]
    fn test_create_module_for_every_kind() {
        let engine = MockEngine::shared();
        for kind in CHAIN_ORDER {
            let module = create_module(kind, engine.clone(), 0.05).unwrap();
            assert_eq!(module.kind(), kind);
            assert_eq!(module.is_active(), kind.default_active());
            assert_eq!(engine.nodes_of_kind(kind.node_kind()), vec![module.node()]);
        }
        assert_eq!(engine.live_count(), CHAIN_ORDER.len());
    }
}
