//! Control-surface state store
//!
//! Holds the canonical [`PersistedSnapshot`]. Every action:
//! 1. updates the in-memory snapshot
//! 2. sends the matching bus command (fire-and-forget)
//! 3. queues the whole snapshot for one atomic write
//!
//! Commands and writes are queued while the snapshot lock is held, and a
//! single worker task performs the writes in queue order, so the stored value
//! always trails the latest mutation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use super::snapshot::PersistedSnapshot;
use super::storage::StorageBackend;
use crate::bus::{Command, ControlBus, Response};
use crate::dsp::ModuleKind;
use crate::error::{AudioExpertError, Result};

enum PersistRequest {
    Write(String),
    Flush(oneshot::Sender<()>),
}

pub struct AudioStore {
    snapshot: Mutex<PersistedSnapshot>,
    bus: ControlBus,
    storage: Arc<dyn StorageBackend>,
    key: String,
    persist_tx: mpsc::UnboundedSender<PersistRequest>,
    connected: AtomicBool,
}

impl AudioStore {
    /// Store with default state; spawns the persistence worker
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(bus: ControlBus, storage: Arc<dyn StorageBackend>, key: impl Into<String>) -> Self {
        let key = key.into();
        let (persist_tx, persist_rx) = mpsc::unbounded_channel();
        tokio::spawn(persist_worker(storage.clone(), key.clone(), persist_rx));

        Self {
            snapshot: Mutex::new(PersistedSnapshot::default()),
            bus,
            storage,
            key,
            persist_tx,
            connected: AtomicBool::new(false),
        }
    }

    /// Current snapshot
    pub fn snapshot(&self) -> PersistedSnapshot {
        self.snapshot.lock().clone()
    }

    /// Whether the most recent send reached a processor
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    // ========================================================================
    // Startup
    // ========================================================================

    /// Replace in-memory state with the stored snapshot
    ///
    /// Malformed blocks fall back to defaults; they are returned so callers
    /// can surface them.
    pub async fn load(&self) -> Result<Vec<AudioExpertError>> {
        let Some(raw) = self.storage.get(&self.key).await? else {
            debug!("No stored state under '{}'; using defaults", self.key);
            return Ok(Vec::new());
        };
        let (snapshot, errors) = PersistedSnapshot::parse_lenient(&raw);
        *self.snapshot.lock() = snapshot;
        info!("Loaded stored state ({} block(s) defaulted)", errors.len());
        Ok(errors)
    }

    /// Push the whole snapshot to the processor
    pub fn sync(&self) -> Response {
        let snapshot = self.snapshot.lock();
        self.dispatch(Command::ApplyStoredState(snapshot.clone()))
    }

    /// [`load`](Self::load) then [`sync`](Self::sync)
    pub async fn hydrate(&self) -> Result<Vec<AudioExpertError>> {
        let errors = self.load().await?;
        self.sync();
        Ok(errors)
    }

    /// Wait until every queued write has reached storage
    pub async fn flush(&self) {
        let (done, wait) = oneshot::channel();
        if self.persist_tx.send(PersistRequest::Flush(done)).is_ok() {
            let _ = wait.await;
        }
    }

    // ========================================================================
    // Actions
    // ========================================================================

    pub fn set_volume(&self, volume: f32) -> Result<()> {
        self.mutate(|s| Ok(Command::SetVolume(s.set_volume(volume))))
    }

    pub fn toggle_volume(&self, active: bool) -> Result<()> {
        self.mutate(|s| {
            s.volume_active = active;
            Ok(Command::ToggleVolume(active))
        })
    }

    pub fn set_gain(&self, gain: f32) -> Result<()> {
        self.update_param(ModuleKind::Gain, "gain", gain)
    }

    pub fn toggle_gain(&self, active: bool) -> Result<()> {
        self.toggle(ModuleKind::Gain, active)
    }

    pub fn update_compressor(&self, param: &str, value: f32) -> Result<()> {
        self.update_param(ModuleKind::Compressor, param, value)
    }

    pub fn toggle_compressor(&self, active: bool) -> Result<()> {
        self.toggle(ModuleKind::Compressor, active)
    }

    pub fn update_eq(&self, param: &str, value: f32) -> Result<()> {
        self.update_param(ModuleKind::Eq, param, value)
    }

    pub fn toggle_eq(&self, active: bool) -> Result<()> {
        self.toggle(ModuleKind::Eq, active)
    }

    pub fn update_gate(&self, param: &str, value: f32) -> Result<()> {
        self.update_param(ModuleKind::Gate, param, value)
    }

    pub fn toggle_gate(&self, active: bool) -> Result<()> {
        self.toggle(ModuleKind::Gate, active)
    }

    pub fn update_pitch_shift(&self, param: &str, value: f32) -> Result<()> {
        self.update_param(ModuleKind::PitchShift, param, value)
    }

    pub fn toggle_pitch_shift(&self, active: bool) -> Result<()> {
        self.toggle(ModuleKind::PitchShift, active)
    }

    pub fn toggle_mono(&self, active: bool) -> Result<()> {
        self.toggle(ModuleKind::Mono, active)
    }

    pub fn update_limiter(&self, param: &str, value: f32) -> Result<()> {
        self.update_param(ModuleKind::Limiter, param, value)
    }

    pub fn toggle_limiter(&self, active: bool) -> Result<()> {
        self.toggle(ModuleKind::Limiter, active)
    }

    /// Validate, store, send and persist one parameter
    ///
    /// Unknown keys and NaN are rejected before anything changes.
    pub fn update_param(&self, kind: ModuleKind, param: &str, value: f32) -> Result<()> {
        self.mutate(|s| {
            let value = s.set_param(kind, param, value)?;
            Command::set(kind, param, value)
        })
    }

    pub fn toggle(&self, kind: ModuleKind, active: bool) -> Result<()> {
        self.mutate(|s| {
            s.set_active(kind, active);
            Ok(Command::toggle(kind, active))
        })
    }

    /// Back to documented defaults, here and at the processor
    pub fn reset_to_defaults(&self) -> Result<()> {
        self.mutate(|s| {
            *s = PersistedSnapshot::default();
            Ok(Command::ResetAll)
        })
    }

    fn mutate<F>(&self, apply: F) -> Result<()>
    where
        F: FnOnce(&mut PersistedSnapshot) -> Result<Command>,
    {
        let mut snapshot = self.snapshot.lock();
        let mut next = snapshot.clone();
        let command = apply(&mut next)?;
        let json = next.to_json()?;
        *snapshot = next;

        // Neither call blocks; holding the guard keeps bus and storage order
        // equal to commit order across threads
        self.dispatch(command);
        self.persist(json);
        Ok(())
    }

    fn dispatch(&self, command: Command) -> Response {
        let response = self.bus.send(command);
        self.connected.store(response.success, Ordering::SeqCst);
        response
    }

    fn persist(&self, json: String) {
        if self.persist_tx.send(PersistRequest::Write(json)).is_err() {
            error!("Persistence worker stopped; state not saved");
        }
    }
}

impl std::fmt::Debug for AudioStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioStore")
            .field("key", &self.key)
            .field("connected", &self.is_connected())
            .finish()
    }
}

async fn persist_worker(
    storage: Arc<dyn StorageBackend>,
    key: String,
    mut rx: mpsc::UnboundedReceiver<PersistRequest>,
) {
    while let Some(request) = rx.recv().await {
        match request {
            PersistRequest::Write(json) => {
                if let Err(e) = storage.set(&key, &json).await {
                    warn!("Failed to persist state under '{}': {}", key, e);
                }
            }
            PersistRequest::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
    debug!("Persistence worker for '{}' stopped", key);
}
