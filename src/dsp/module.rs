//! Module contract
//!
//! Every effect in the chain owns one engine node and implements
//! [`AudioModule`]. Kinds are an explicit enum rather than a type hierarchy:
//! the registry is keyed by [`ModuleKind`], whose declaration order is the
//! fixed processing order.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::engine::{AudioEngine, Endpoint, NodeId, NodeKind, NodeSpec};
use crate::error::{AudioExpertError, Result};

use super::{compressor, eq, gain, gate, limiter, mono, pitch_shift};

/// Effect kinds, declared in processing order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ModuleKind {
    Gate,
    Eq,
    Compressor,
    PitchShift,
    Gain,
    Mono,
    Limiter,
}

/// Fixed processing order from source to destination
pub const CHAIN_ORDER: [ModuleKind; 7] = [
    ModuleKind::Gate,
    ModuleKind::Eq,
    ModuleKind::Compressor,
    ModuleKind::PitchShift,
    ModuleKind::Gain,
    ModuleKind::Mono,
    ModuleKind::Limiter,
];

/// How a module is taken out of the signal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BypassMode {
    /// Parameters are driven to an identity configuration; graph unchanged
    Soft,
    /// No parameter value is an identity; the chain must relink around it
    Hard,
}

impl ModuleKind {
    /// Stable module id used on the wire and in storage
    pub fn id(&self) -> &'static str {
        match self {
            ModuleKind::Gate => "gate",
            ModuleKind::Eq => "eq",
            ModuleKind::Compressor => "compressor",
            ModuleKind::PitchShift => "pitchShift",
            ModuleKind::Gain => "gain",
            ModuleKind::Mono => "mono",
            ModuleKind::Limiter => "limiter",
        }
    }

    /// Resolve a module id
    pub fn from_id(id: &str) -> Result<Self> {
        CHAIN_ORDER
            .iter()
            .copied()
            .find(|kind| kind.id() == id)
            .ok_or_else(|| AudioExpertError::UnknownModule { id: id.to_string() })
    }

    /// Position in [`CHAIN_ORDER`]
    pub fn order_index(&self) -> usize {
        *self as usize
    }

    /// Soft when some parameter set makes the transform an identity
    pub fn bypass_mode(&self) -> BypassMode {
        match self {
            ModuleKind::Mono | ModuleKind::Limiter => BypassMode::Hard,
            _ => BypassMode::Soft,
        }
    }

    pub fn node_kind(&self) -> NodeKind {
        match self {
            ModuleKind::Gate => NodeKind::Gate,
            ModuleKind::Eq => NodeKind::Eq3,
            ModuleKind::Compressor => NodeKind::Compressor,
            ModuleKind::PitchShift => NodeKind::PitchShift,
            ModuleKind::Gain => NodeKind::Gain,
            ModuleKind::Mono => NodeKind::Mono,
            ModuleKind::Limiter => NodeKind::Limiter,
        }
    }

    /// Declared parameter set
    pub fn param_specs(&self) -> &'static [ParamSpec] {
        match self {
            ModuleKind::Gate => gate::GATE_PARAMS,
            ModuleKind::Eq => eq::EQ_PARAMS,
            ModuleKind::Compressor => compressor::COMPRESSOR_PARAMS,
            ModuleKind::PitchShift => pitch_shift::PITCH_SHIFT_PARAMS,
            ModuleKind::Gain => gain::GAIN_PARAMS,
            ModuleKind::Mono => mono::MONO_PARAMS,
            ModuleKind::Limiter => limiter::LIMITER_PARAMS,
        }
    }

    /// Validate `key` against the declared parameter set
    pub fn param_spec(&self, key: &str) -> Result<&'static ParamSpec> {
        self.param_specs()
            .iter()
            .find(|spec| spec.name == key)
            .ok_or_else(|| AudioExpertError::UnknownParam {
                module: self.id().to_string(),
                param: key.to_string(),
            })
    }

    /// Whether a freshly constructed module starts active
    pub fn default_active(&self) -> bool {
        matches!(
            self,
            ModuleKind::Eq | ModuleKind::Compressor | ModuleKind::Gain
        )
    }

    /// Constructor defaults, keyed by control-layer parameter name
    pub fn default_params(&self) -> BTreeMap<String, f32> {
        self.param_specs()
            .iter()
            .map(|spec| (spec.name.to_string(), spec.default))
            .collect()
    }

    /// Default state block
    pub fn default_state(&self) -> ModuleState {
        ModuleState {
            is_active: self.default_active(),
            params: self.default_params(),
        }
    }
}

impl fmt::Display for ModuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id())
    }
}

/// How a control-layer value reaches the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineApply {
    /// Ramped over the chain's ramp time
    Ramp,
    /// Set immediately; the engine exposes no rampable parameter
    Set,
    /// Recorded at the control layer only; the engine has no such control
    StoredOnly,
    /// Fixed at node construction; later updates are an engine limitation
    ConstructionOnly,
}

/// One declared parameter of a module kind
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamSpec {
    /// Control-layer name
    pub name: &'static str,
    /// Engine-side parameter name
    pub engine_name: &'static str,
    pub min: f32,
    pub max: f32,
    pub default: f32,
    /// Control units to engine units (ms → s is 0.001)
    pub scale: f32,
    pub apply: EngineApply,
}

impl ParamSpec {
    pub fn clamp(&self, value: f32) -> f32 {
        value.clamp(self.min, self.max)
    }

    pub fn to_engine(&self, value: f32) -> f32 {
        value * self.scale
    }
}

/// Full state of one module: active flag plus every parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleState {
    pub is_active: bool,
    pub params: BTreeMap<String, f32>,
}

/// Read-only view of a module
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleDescriptor {
    pub id: String,
    pub kind: ModuleKind,
    pub order_index: usize,
    pub is_active: bool,
    pub is_bypassed: bool,
    pub params: BTreeMap<String, f32>,
}

/// State and engine plumbing shared by every module variant
pub struct ModuleCore {
    kind: ModuleKind,
    engine: Arc<dyn AudioEngine>,
    node: NodeId,
    is_active: bool,
    is_bypassed: bool,
    params: BTreeMap<String, f32>,
    /// Construction-only values the live node was created with
    built: BTreeMap<String, f32>,
    ramp_time: f32,
    disposed: bool,
}

impl ModuleCore {
    /// Build the engine node with constructor defaults
    pub fn new(kind: ModuleKind, engine: Arc<dyn AudioEngine>, ramp_time: f32) -> Result<Self> {
        let params = kind.default_params();
        let node = engine.create_node(&Self::node_spec(kind, &params))?;
        debug!("Created {} module on node {}", kind, node);

        Ok(Self {
            kind,
            engine,
            node,
            is_active: kind.default_active(),
            is_bypassed: false,
            built: Self::construction_values(kind, &params),
            params,
            ramp_time,
            disposed: false,
        })
    }

    fn node_spec(kind: ModuleKind, params: &BTreeMap<String, f32>) -> NodeSpec {
        kind.param_specs()
            .iter()
            .filter(|p| p.apply != EngineApply::StoredOnly)
            .fold(NodeSpec::new(kind.node_kind()), |node_spec, p| {
                let value = params.get(p.name).copied().unwrap_or(p.default);
                node_spec.with(p.engine_name, p.to_engine(value))
            })
    }

    fn construction_values(kind: ModuleKind, params: &BTreeMap<String, f32>) -> BTreeMap<String, f32> {
        params
            .iter()
            .filter(|(name, _)| {
                kind.param_spec(name)
                    .map(|p| p.apply == EngineApply::ConstructionOnly)
                    .unwrap_or(false)
            })
            .map(|(name, value)| (name.clone(), *value))
            .collect()
    }

    /// Whether a stored construction-only value differs from the live node
    pub fn is_stale(&self) -> bool {
        !self.disposed && Self::construction_values(self.kind, &self.params) != self.built
    }

    /// Replace the node with one built from the stored parameters
    ///
    /// Only does work when [`is_stale`](Self::is_stale). The new node is
    /// unlinked; callers relink afterwards. Returns whether the node changed.
    pub fn rebuild_node(&mut self) -> Result<bool> {
        if !self.is_stale() {
            return Ok(false);
        }
        let node = self
            .engine
            .create_node(&Self::node_spec(self.kind, &self.params))?;
        self.engine.disconnect(Endpoint::Node(self.node));
        self.engine.dispose_node(self.node);
        info!("Rebuilt {} module on node {} (was {})", self.kind, node, self.node);

        self.node = node;
        self.built = Self::construction_values(self.kind, &self.params);
        Ok(true)
    }

    pub fn kind(&self) -> ModuleKind {
        self.kind
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn engine(&self) -> &dyn AudioEngine {
        self.engine.as_ref()
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }

    pub fn set_active_flag(&mut self, active: bool) {
        self.is_active = active;
    }

    pub fn is_bypassed(&self) -> bool {
        self.is_bypassed
    }

    pub fn set_bypassed(&mut self, bypassed: bool) {
        self.is_bypassed = bypassed;
    }

    pub fn params(&self) -> &BTreeMap<String, f32> {
        &self.params
    }

    /// Last stored value of a declared parameter
    pub fn param(&self, key: &str) -> f32 {
        self.params
            .get(key)
            .copied()
            .or_else(|| self.kind.param_spec(key).ok().map(|s| s.default))
            .unwrap_or(0.0)
    }

    /// Validate, clamp and record a value
    pub fn store(&mut self, key: &str, value: f32) -> Result<(&'static ParamSpec, f32)> {
        let spec = self.kind.param_spec(key)?;
        let value = self.checked(spec, value)?;
        self.params.insert(key.to_string(), value);
        Ok((spec, value))
    }

    /// Validate a whole parameter map without touching current state
    ///
    /// Keys absent from `incoming` keep their current value.
    pub fn stage(&self, incoming: &BTreeMap<String, f32>) -> Result<BTreeMap<String, f32>> {
        let mut staged = self.params.clone();
        for (key, value) in incoming {
            let spec = self.kind.param_spec(key)?;
            staged.insert(key.clone(), self.checked(spec, *value)?);
        }
        Ok(staged)
    }

    pub fn replace_params(&mut self, params: BTreeMap<String, f32>) {
        self.params = params;
    }

    fn checked(&self, spec: &ParamSpec, value: f32) -> Result<f32> {
        if value.is_nan() {
            return Err(AudioExpertError::InvalidValue {
                module: self.kind.id().to_string(),
                param: spec.name.to_string(),
                value,
            });
        }
        Ok(spec.clamp(value))
    }

    /// Send one control-layer value to the engine
    pub fn push(&self, spec: &ParamSpec, value: f32) -> Result<()> {
        match spec.apply {
            EngineApply::Ramp => self.engine.ramp_param(
                self.node,
                spec.engine_name,
                spec.to_engine(value),
                self.ramp_time,
            ),
            EngineApply::Set => {
                self.engine
                    .set_param(self.node, spec.engine_name, spec.to_engine(value))
            }
            EngineApply::StoredOnly => {
                debug!(
                    "{}.{} = {} recorded; no engine control",
                    self.kind, spec.name, value
                );
                Ok(())
            }
            EngineApply::ConstructionOnly => {
                let limitation = AudioExpertError::EngineLimitation {
                    module: self.kind.id().to_string(),
                    param: spec.name.to_string(),
                };
                warn!("{}; value {} applies when the node is next rebuilt", limitation, value);
                Ok(())
            }
        }
    }

    /// Push every live-applicable parameter from the stored snapshot
    pub fn push_all(&self) -> Result<()> {
        for spec in self.kind.param_specs() {
            if matches!(spec.apply, EngineApply::Ramp | EngineApply::Set) {
                self.push(spec, self.param(spec.name))?;
            }
        }
        Ok(())
    }

    /// Ramp an engine parameter to a neutral value, bypassing the store
    pub fn ramp_neutral(&self, engine_name: &str, value: f32) -> Result<()> {
        self.engine
            .ramp_param(self.node, engine_name, value, self.ramp_time)
    }

    /// Set an engine parameter to a neutral value, bypassing the store
    pub fn set_neutral(&self, engine_name: &str, value: f32) -> Result<()> {
        self.engine.set_param(self.node, engine_name, value)
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    fn release(&mut self) {
        if !self.disposed {
            self.engine.disconnect(Endpoint::Node(self.node));
            self.engine.dispose_node(self.node);
            self.disposed = true;
        }
    }
}

impl fmt::Debug for ModuleCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleCore")
            .field("kind", &self.kind)
            .field("node", &self.node)
            .field("is_active", &self.is_active)
            .field("is_bypassed", &self.is_bypassed)
            .field("params", &self.params)
            .finish()
    }
}

/// Common contract for every effect module
///
/// Variants supply `bypass`; everything else is shared through [`ModuleCore`].
pub trait AudioModule: Send + Sync {
    fn core(&self) -> &ModuleCore;

    fn core_mut(&mut self) -> &mut ModuleCore;

    /// Drive to neutral (`true`) or restore the stored snapshot (`false`)
    fn bypass(&mut self, should_bypass: bool) -> Result<()>;

    fn kind(&self) -> ModuleKind {
        self.core().kind()
    }

    fn node(&self) -> NodeId {
        self.core().node()
    }

    fn is_active(&self) -> bool {
        self.core().is_active()
    }

    fn is_bypassed(&self) -> bool {
        self.core().is_bypassed()
    }

    fn params(&self) -> &BTreeMap<String, f32> {
        self.core().params()
    }

    /// Record a value; push it live unless bypassed
    fn update_param(&mut self, key: &str, value: f32) -> Result<()> {
        let (spec, value) = self.core_mut().store(key, value)?;
        if self.is_bypassed() {
            return Ok(());
        }
        self.core().push(spec, value)
    }

    fn set_active(&mut self, active: bool) -> Result<()> {
        self.core_mut().set_active_flag(active);
        self.bypass(!active)
    }

    /// Apply active flag and parameters in one step
    ///
    /// Every key is validated before anything changes.
    fn apply_state(&mut self, state: &ModuleState) -> Result<()> {
        let staged = self.core().stage(&state.params)?;
        let core = self.core_mut();
        core.replace_params(staged);
        core.set_active_flag(state.is_active);

        if state.is_active {
            core.set_bypassed(false);
            core.push_all()
        } else {
            self.bypass(true)
        }
    }

    fn connect(&self, destination: Endpoint) -> Result<()> {
        self.core()
            .engine()
            .connect(Endpoint::Node(self.node()), destination)
    }

    fn disconnect(&self) {
        self.core().engine().disconnect(Endpoint::Node(self.node()));
    }

    /// Recreate the node if construction-only values changed; see
    /// [`ModuleCore::rebuild_node`]
    fn refresh_node(&mut self) -> Result<bool> {
        self.core_mut().rebuild_node()
    }

    fn dispose(&mut self) {
        self.core_mut().release();
    }

    fn state(&self) -> ModuleState {
        ModuleState {
            is_active: self.is_active(),
            params: self.params().clone(),
        }
    }

    fn descriptor(&self) -> ModuleDescriptor {
        let kind = self.kind();
        ModuleDescriptor {
            id: kind.id().to_string(),
            kind,
            order_index: kind.order_index(),
            is_active: self.is_active(),
            is_bypassed: self.is_bypassed(),
            params: self.params().clone(),
        }
    }
}

/// Helper macro implementing the `core`/`core_mut` accessors
#[macro_export]
macro_rules! impl_module_core {
    ($field:ident) => {
        fn core(&self) -> &$crate::dsp::ModuleCore {
            &self.$field
        }

        fn core_mut(&mut self) -> &mut $crate::dsp::ModuleCore {
            &mut self.$field
        }
    };
}
