//! Chain orchestrator
//!
//! Owns the module registry, the meters and the graph topology.
//!
//! Lifecycle: `Uninitialized → Initializing → Ready → Disposed`. A failed
//! initialization drops back to `Uninitialized` so it can be retried; a
//! disposed chain may be initialized again and gets a new node generation.
//! Concurrent `initialize` calls share one in-flight attempt: the engine is
//! started once and exactly one graph is built.
//!
//! Topology is always rebuilt from scratch:
//! source → [active hard modules and every soft module, in chain order]
//! → destination, with one meter tapping the source and one tapping the tail.

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use super::create_module;
use super::module::{AudioModule, BypassMode, ModuleDescriptor, ModuleKind, CHAIN_ORDER};
use crate::config::ChainConfig;
use crate::engine::{AudioEngine, Endpoint, MediaElement};
use crate::error::{AudioExpertError, Result};
use crate::metering::{Meter, MeterReading};
use crate::state::PersistedSnapshot;

type InitFuture = Shared<BoxFuture<'static, bool>>;

/// Observable lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ChainPhase {
    Uninitialized,
    Initializing,
    Ready,
    Disposed,
}

enum Phase {
    Uninitialized,
    Initializing(InitFuture),
    Ready,
    Disposed,
}

impl Phase {
    fn public(&self) -> ChainPhase {
        match self {
            Phase::Uninitialized => ChainPhase::Uninitialized,
            Phase::Initializing(_) => ChainPhase::Initializing,
            Phase::Ready => ChainPhase::Ready,
            Phase::Disposed => ChainPhase::Disposed,
        }
    }
}

/// Media element volume as the control surface sees it
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeState {
    /// Percent, 0-100
    pub value: f32,
    pub is_active: bool,
}

impl VolumeState {
    /// Volume written to the media element (0-1)
    pub fn element_volume(&self) -> f32 {
        if self.is_active {
            self.value / 100.0
        } else {
            0.0
        }
    }
}

impl Default for VolumeState {
    fn default() -> Self {
        Self {
            value: 100.0,
            is_active: true,
        }
    }
}

struct ChainInner {
    phase: Phase,
    modules: BTreeMap<ModuleKind, Box<dyn AudioModule>>,
    input_meter: Option<Meter>,
    output_meter: Option<Meter>,
    media: Option<Arc<dyn MediaElement>>,
    volume: VolumeState,
    topology: Vec<ModuleKind>,
    generation: u64,
    attempt: u64,
    reconnects: u64,
    hydrated: bool,
}

impl ChainInner {
    fn new() -> Self {
        Self {
            phase: Phase::Uninitialized,
            modules: BTreeMap::new(),
            input_meter: None,
            output_meter: None,
            media: None,
            volume: VolumeState::default(),
            topology: Vec::new(),
            generation: 0,
            attempt: 0,
            reconnects: 0,
            hydrated: false,
        }
    }

    fn ensure_ready(&self) -> Result<()> {
        match self.phase {
            Phase::Ready => Ok(()),
            Phase::Disposed => Err(AudioExpertError::Disposed),
            _ => Err(AudioExpertError::NotReady),
        }
    }

    fn module_mut(&mut self, kind: ModuleKind) -> Result<&mut Box<dyn AudioModule>> {
        self.modules.get_mut(&kind).ok_or(AudioExpertError::NotReady)
    }

    fn hard_states(&self) -> Vec<Option<bool>> {
        CHAIN_ORDER
            .iter()
            .filter(|kind| kind.bypass_mode() == BypassMode::Hard)
            .map(|kind| self.modules.get(kind).map(|m| m.is_active()))
            .collect()
    }

    /// Attach the source, create every module and both meters, then link
    fn build(
        &mut self,
        engine: &Arc<dyn AudioEngine>,
        config: &ChainConfig,
        media: Arc<dyn MediaElement>,
    ) -> Result<()> {
        engine.attach_source(media.as_ref())?;
        self.media = Some(media);

        for kind in CHAIN_ORDER {
            let module = create_module(kind, engine.clone(), config.ramp_time)?;
            let module = self.modules.entry(kind).or_insert(module);
            // Inactive-by-default modules start neutralized
            module.apply_state(&kind.default_state())?;
        }

        self.input_meter = Some(Meter::new(engine.clone(), config.meter_smoothing)?);
        self.output_meter = Some(Meter::new(engine.clone(), config.meter_smoothing)?);
        self.relink(engine.as_ref())
    }

    /// Unlink everything, recreate stale nodes, then link in chain order
    fn relink(&mut self, engine: &dyn AudioEngine) -> Result<()> {
        for module in self.modules.values_mut() {
            module.refresh_node()?;
        }
        engine.disconnect(Endpoint::Source);
        for module in self.modules.values() {
            module.disconnect();
        }

        if let Some(meter) = &self.input_meter {
            meter.connect(Endpoint::Source)?;
        }

        let mut tail = Endpoint::Source;
        let mut topology = Vec::with_capacity(CHAIN_ORDER.len());
        for kind in CHAIN_ORDER {
            let Some(module) = self.modules.get(&kind) else {
                continue;
            };
            if kind.bypass_mode() == BypassMode::Hard && !module.is_active() {
                continue;
            }
            let node = Endpoint::Node(module.node());
            engine.connect(tail, node)?;
            tail = node;
            topology.push(kind);
        }

        if let Some(meter) = &self.output_meter {
            meter.connect(tail)?;
        }
        engine.connect(tail, Endpoint::Destination)?;

        self.topology = topology;
        self.reconnects += 1;
        debug!(
            "Chain linked: source → {} → destination",
            self.topology
                .iter()
                .map(|k| k.id())
                .collect::<Vec<_>>()
                .join(" → ")
        );
        Ok(())
    }

    fn apply_volume(&self) {
        if let Some(media) = &self.media {
            media.set_volume(self.volume.element_volume());
        }
    }

    /// Dispose every node and release the source
    fn release(&mut self, engine: &dyn AudioEngine) {
        for module in self.modules.values_mut() {
            module.dispose();
        }
        self.modules.clear();
        for mut meter in [self.input_meter.take(), self.output_meter.take()]
            .into_iter()
            .flatten()
        {
            meter.dispose();
        }
        engine.detach_source();
        self.media = None;
        self.topology.clear();
        self.hydrated = false;
    }
}

/// Effect chain orchestrator
pub struct AudioChain {
    engine: Arc<dyn AudioEngine>,
    config: ChainConfig,
    inner: Arc<Mutex<ChainInner>>,
}

impl AudioChain {
    pub fn new(engine: Arc<dyn AudioEngine>, config: ChainConfig) -> Self {
        Self {
            engine,
            config,
            inner: Arc::new(Mutex::new(ChainInner::new())),
        }
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Build the graph around `media`; idempotent and single-flight
    ///
    /// Returns `true` once ready. Returns `false` when no media element is
    /// available, the engine fails to start, graph construction fails, or the
    /// chain is disposed while the attempt is in flight.
    pub async fn initialize(&self, media: Option<Arc<dyn MediaElement>>) -> bool {
        let pending = {
            let mut guard = self.inner.lock();
            let inner = &mut *guard;
            match inner.phase {
                Phase::Ready => return true,
                Phase::Initializing(ref pending) => pending.clone(),
                Phase::Uninitialized | Phase::Disposed => {
                    let Some(media) = media else {
                        warn!("No media element available; audio chain not initialized");
                        return false;
                    };
                    inner.attempt += 1;
                    let pending = Self::run_initialize(
                        self.engine.clone(),
                        self.inner.clone(),
                        self.config,
                        media,
                        inner.attempt,
                    )
                    .boxed()
                    .shared();
                    inner.phase = Phase::Initializing(pending.clone());
                    pending
                }
            }
        };
        pending.await
    }

    async fn run_initialize(
        engine: Arc<dyn AudioEngine>,
        inner: Arc<Mutex<ChainInner>>,
        config: ChainConfig,
        media: Arc<dyn MediaElement>,
        attempt: u64,
    ) -> bool {
        info!("Initializing audio chain for '{}'", media.id());
        let current = |guard: &ChainInner| {
            guard.attempt == attempt && matches!(guard.phase, Phase::Initializing(_))
        };

        if let Err(e) = engine.start().await {
            error!("Audio engine failed to start: {}", e);
            let mut guard = inner.lock();
            if current(&*guard) {
                guard.phase = Phase::Uninitialized;
            }
            return false;
        }

        let mut guard = inner.lock();
        if !current(&*guard) {
            info!("Audio chain disposed during initialization; graph not built");
            return false;
        }

        match guard.build(&engine, &config, media) {
            Ok(()) => {
                guard.phase = Phase::Ready;
                guard.generation += 1;
                info!(
                    "Audio chain ready (generation {}, {} modules)",
                    guard.generation,
                    guard.modules.len()
                );
                true
            }
            Err(e) => {
                error!("Audio chain initialization failed: {}", e);
                guard.release(engine.as_ref());
                guard.phase = Phase::Uninitialized;
                false
            }
        }
    }

    /// Tear down every node and cancel any in-flight initialization
    pub fn dispose(&self) {
        let mut inner = self.inner.lock();
        if matches!(inner.phase, Phase::Disposed) {
            return;
        }
        inner.attempt += 1;
        inner.release(self.engine.as_ref());
        inner.phase = Phase::Disposed;
        info!("Audio chain disposed");
    }

    // ========================================================================
    // Control
    // ========================================================================

    /// Update one parameter; never changes topology
    pub fn update_module_param(&self, kind: ModuleKind, param: &str, value: f32) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.ensure_ready()?;
        inner.module_mut(kind)?.update_param(param, value)?;
        debug!("{}.{} = {}", kind, param, value);
        Ok(())
    }

    /// Enable or bypass a module; hard-bypass kinds relink the chain
    pub fn toggle_module(&self, kind: ModuleKind, active: bool) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.ensure_ready()?;
        inner.module_mut(kind)?.set_active(active)?;
        if kind.bypass_mode() == BypassMode::Hard {
            inner.relink(self.engine.as_ref())?;
        }
        info!("{} {}", kind, if active { "enabled" } else { "bypassed" });
        Ok(())
    }

    /// Rebuild every link from current module states
    pub fn reconnect(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.ensure_ready()?;
        inner.relink(self.engine.as_ref())
    }

    /// Push a persisted snapshot into every module and the media element
    ///
    /// Idempotent. Relinks once if any hard-bypass module changed state or a
    /// construction-only value needs a fresh node. A module that rejects its
    /// block is logged and skipped; the first such error is returned after
    /// the rest have been applied.
    pub fn apply_stored_state(&self, snapshot: &PersistedSnapshot) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.ensure_ready()?;

        let before = inner.hard_states();
        let mut first_error = None;
        for kind in CHAIN_ORDER {
            let state = snapshot.module_state(kind);
            if let Err(e) = inner.module_mut(kind)?.apply_state(&state) {
                warn!("Failed to restore {}: {}", kind, e);
                first_error.get_or_insert(e);
            }
        }

        inner.volume = VolumeState {
            value: snapshot.volume.clamp(0.0, 100.0),
            is_active: snapshot.volume_active,
        };
        inner.apply_volume();

        let stale = inner.modules.values().any(|m| m.core().is_stale());
        if stale || inner.hard_states() != before {
            inner.relink(self.engine.as_ref())?;
        }
        inner.hydrated = true;
        info!("Stored state applied to audio chain");

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Set media element volume, percent
    pub fn set_volume(&self, value: f32) -> Result<()> {
        if value.is_nan() {
            return Err(AudioExpertError::InvalidValue {
                module: "volume".to_string(),
                param: "volume".to_string(),
                value,
            });
        }
        let mut inner = self.inner.lock();
        inner.ensure_ready()?;
        inner.volume.value = value.clamp(0.0, 100.0);
        inner.apply_volume();
        Ok(())
    }

    /// Mute (`false`) or restore (`true`) the media element
    pub fn toggle_volume(&self, active: bool) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.ensure_ready()?;
        inner.volume.is_active = active;
        inner.apply_volume();
        Ok(())
    }

    /// Current input/output levels; the floor when not ready
    pub fn get_meters(&self) -> MeterReading {
        let inner = self.inner.lock();
        if !matches!(inner.phase, Phase::Ready) {
            return MeterReading::floor();
        }
        match (&inner.input_meter, &inner.output_meter) {
            (Some(input), Some(output)) => MeterReading::new(input.get_value(), output.get_value()),
            _ => MeterReading::floor(),
        }
    }

    // ========================================================================
    // Inspection
    // ========================================================================

    pub fn phase(&self) -> ChainPhase {
        self.inner.lock().phase.public()
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.inner.lock().phase, Phase::Ready)
    }

    /// Whether stored state has been applied since the graph was built
    pub fn is_hydrated(&self) -> bool {
        self.inner.lock().hydrated
    }

    /// Successful initializations so far
    pub fn generation(&self) -> u64 {
        self.inner.lock().generation
    }

    /// Number of topology rebuilds, including the initial link
    pub fn reconnect_count(&self) -> u64 {
        self.inner.lock().reconnects
    }

    /// Modules currently linked between source and destination
    pub fn topology(&self) -> Vec<ModuleKind> {
        self.inner.lock().topology.clone()
    }

    pub fn volume(&self) -> VolumeState {
        self.inner.lock().volume
    }

    pub fn media_id(&self) -> Option<String> {
        self.inner
            .lock()
            .media
            .as_ref()
            .map(|media| media.id().to_string())
    }

    pub fn descriptor(&self, kind: ModuleKind) -> Option<ModuleDescriptor> {
        self.inner.lock().modules.get(&kind).map(|m| m.descriptor())
    }

    /// Descriptors in chain order
    pub fn descriptors(&self) -> Vec<ModuleDescriptor> {
        self.inner
            .lock()
            .modules
            .values()
            .map(|m| m.descriptor())
            .collect()
    }
}

impl std::fmt::Debug for AudioChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("AudioChain")
            .field("phase", &inner.phase.public())
            .field("topology", &inner.topology)
            .field("generation", &inner.generation)
            .finish()
    }
}
