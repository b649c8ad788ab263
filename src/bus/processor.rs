//! Page processor
//!
//! Explicit context object for the page side: owns the live [`AudioChain`],
//! lazily initializes it against the host's media element, and turns every
//! bus message into a `{success, error?}` response.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::{BusReceiver, Command, Envelope, Query, Response, Route};
use crate::config::ChainConfig;
use crate::dsp::AudioChain;
use crate::engine::{AudioEngine, MediaHost};
use crate::error::{AudioExpertError, Result};
use crate::metering::MeterReading;
use crate::state::{PersistedSnapshot, StorageBackend};

struct StoredState {
    backend: Arc<dyn StorageBackend>,
    key: String,
}

pub struct Processor {
    engine: Arc<dyn AudioEngine>,
    host: Arc<dyn MediaHost>,
    config: ChainConfig,
    storage: Option<StoredState>,
    chain: Mutex<Arc<AudioChain>>,
    skip_replay: AtomicBool,
}

impl Processor {
    pub fn new(engine: Arc<dyn AudioEngine>, host: Arc<dyn MediaHost>, config: ChainConfig) -> Self {
        let chain = Arc::new(AudioChain::new(engine.clone(), config));
        Self {
            engine,
            host,
            config,
            storage: None,
            chain: Mutex::new(chain),
            skip_replay: AtomicBool::new(false),
        }
    }

    /// Replay the snapshot stored under `key` after each initialization
    pub fn with_storage(mut self, backend: Arc<dyn StorageBackend>, key: impl Into<String>) -> Self {
        self.storage = Some(StoredState {
            backend,
            key: key.into(),
        });
        self
    }

    /// The live chain
    pub fn chain(&self) -> Arc<AudioChain> {
        self.chain.lock().clone()
    }

    /// Initialize the live chain if needed
    ///
    /// On a fresh success the stored snapshot is replayed, except right
    /// after a reset.
    pub async fn initialize(&self) -> bool {
        let chain = self.chain();
        if chain.is_ready() {
            return true;
        }

        let media = self.host.query_media_element();
        if !chain.initialize(media).await {
            return false;
        }

        if self.skip_replay.swap(false, Ordering::SeqCst) {
            debug!("Skipping stored state replay after reset");
        } else if !chain.is_hydrated() {
            self.replay_storage(&chain).await;
        }
        true
    }

    async fn replay_storage(&self, chain: &AudioChain) {
        let Some(storage) = &self.storage else {
            return;
        };
        let raw = match storage.backend.get(&storage.key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                debug!("No stored state under '{}'", storage.key);
                return;
            }
            Err(e) => {
                warn!("Failed to read stored state: {}", e);
                return;
            }
        };

        let (snapshot, _errors) = PersistedSnapshot::parse_lenient(&raw);
        if let Err(e) = chain.apply_stored_state(&snapshot) {
            warn!("Stored state only partly applied: {}", e);
        }
    }

    async fn ensure_ready(&self) -> Result<Arc<AudioChain>> {
        if self.initialize().await {
            return Ok(self.chain());
        }
        if self.host.query_media_element().is_none() {
            Err(AudioExpertError::NoMediaElement)
        } else {
            Err(AudioExpertError::EngineStart {
                reason: "audio chain failed to initialize".to_string(),
            })
        }
    }

    // ========================================================================
    // Message handling
    // ========================================================================

    /// Apply one control command; never panics, never returns `Err`
    pub async fn handle_command(&self, command: Command) -> Response {
        if command.route() == Route::Reset {
            return self.reset_all().await;
        }

        let chain = match self.ensure_ready().await {
            Ok(chain) => chain,
            Err(e) => {
                warn!("{} not applied: {}", command.name(), e);
                return Response::failed(&e);
            }
        };

        let result = match command.route() {
            Route::Volume(value) => chain.set_volume(value),
            Route::VolumeActive(active) => chain.toggle_volume(active),
            Route::Param { kind, param, value } => chain.update_module_param(kind, param, value),
            Route::Toggle { kind, active } => chain.toggle_module(kind, active),
            Route::Hydrate(snapshot) => chain.apply_stored_state(snapshot),
            Route::Reset => Ok(()),
        };
        if let Err(e) = &result {
            warn!("{} failed: {}", command.name(), e);
        }
        Response::from_result(result)
    }

    /// Answer a read; never initializes the chain
    pub fn handle_query(&self, query: Query) -> Response {
        match query {
            Query::GetMeters => {
                let chain = self.chain();
                if chain.is_ready() {
                    Response::ok().with_meters(chain.get_meters())
                } else {
                    Response::failed(&AudioExpertError::NotReady).with_meters(MeterReading::floor())
                }
            }
        }
    }

    /// Dispose the live chain and bring up a fresh one with defaults
    pub async fn reset_all(&self) -> Response {
        {
            let mut chain = self.chain.lock();
            chain.dispose();
            *chain = Arc::new(AudioChain::new(self.engine.clone(), self.config));
        }
        info!("Audio chain reset to defaults");

        self.skip_replay.store(true, Ordering::SeqCst);
        match self.ensure_ready().await {
            Ok(_) => Response::ok(),
            Err(e) => {
                warn!("Reset chain not initialized: {}", e);
                Response::failed(&e)
            }
        }
    }

    pub fn dispose(&self) {
        self.chain().dispose();
    }

    /// Process messages until every sender is gone
    ///
    /// Messages are handled one at a time, in arrival order.
    pub async fn serve(&self, mut rx: BusReceiver) {
        info!("Processor listening");
        while let Some(envelope) = rx.recv().await {
            match envelope {
                Envelope::Control { command, ack } => {
                    let response = self.handle_command(command).await;
                    if let Some(ack) = ack {
                        let _ = ack.send(response);
                    }
                }
                Envelope::Query { query, reply } => {
                    let _ = reply.send(self.handle_query(query));
                }
            }
        }
        info!("Control bus closed; processor stopping");
    }
}

impl std::fmt::Debug for Processor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Processor")
            .field("chain", &self.chain())
            .field("storage", &self.storage.as_ref().map(|s| &s.key))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::ParamUpdate;
    use crate::dsp::{ChainPhase, ModuleKind};
    use crate::engine::{MockEngine, MockMediaHost, NodeKind};
    use crate::state::MemoryStorage;

    fn processor(host: Arc<MockMediaHost>) -> (Arc<MockEngine>, Processor) {
        let engine = MockEngine::shared();
        let processor = Processor::new(engine.clone(), host, ChainConfig::default());
        (engine, processor)
    }

    #[tokio::test]
    async fn test_command_initializes_lazily() {
        let (engine, processor) = processor(MockMediaHost::with_element("video"));
        let response = processor.handle_command(Command::SetGain(2.0)).await;
        assert!(response.success);
        assert_eq!(engine.start_calls(), 1);
        assert_eq!(
            processor.chain().descriptor(ModuleKind::Gain).unwrap().params["gain"],
            2.0
        );
    }

    #[tokio::test]
    async fn test_command_without_media_fails() {
        let (_engine, processor) = processor(MockMediaHost::empty());
        let response = processor.handle_command(Command::ToggleEq(false)).await;
        assert!(!response.success);
        assert!(response.error.unwrap().starts_with("NO_MEDIA_ELEMENT"));
    }

    #[tokio::test]
    async fn test_meters_before_init_read_floor() {
        let (engine, processor) = processor(MockMediaHost::with_element("video"));
        let response = processor.handle_query(Query::GetMeters);
        assert!(!response.success);
        assert_eq!(response.meters, Some(MeterReading::floor()));
        assert_eq!(engine.start_calls(), 0);
    }

    #[tokio::test]
    async fn test_unknown_param_reported() {
        let (_engine, processor) = processor(MockMediaHost::with_element("video"));
        let response = processor
            .handle_command(Command::SetEq(ParamUpdate::new("q", 1.0)))
            .await;
        assert!(!response.success);
        assert!(response.error.unwrap().starts_with("UNKNOWN_PARAM"));
    }

    #[tokio::test]
    async fn test_storage_replayed_after_init() {
        let storage = Arc::new(MemoryStorage::new());
        let mut snapshot = PersistedSnapshot::default();
        snapshot.set_param(ModuleKind::Gain, "gain", 3.0).unwrap();
        storage
            .set("key", &snapshot.to_json().unwrap())
            .await
            .unwrap();

        let (_engine, processor) = processor(MockMediaHost::with_element("video"));
        let processor = processor.with_storage(storage, "key");
        assert!(processor.initialize().await);

        let chain = processor.chain();
        assert!(chain.is_hydrated());
        assert_eq!(chain.descriptor(ModuleKind::Gain).unwrap().params["gain"], 3.0);
    }

    #[tokio::test]
    async fn test_reset_skips_replay() {
        let storage = Arc::new(MemoryStorage::new());
        let mut snapshot = PersistedSnapshot::default();
        snapshot.set_param(ModuleKind::Gain, "gain", 3.0).unwrap();
        storage
            .set("key", &snapshot.to_json().unwrap())
            .await
            .unwrap();

        let (engine, processor) = processor(MockMediaHost::with_element("video"));
        let processor = processor.with_storage(storage, "key");
        assert!(processor.initialize().await);
        let first = processor.chain();

        assert!(processor.handle_command(Command::ResetAll).await.success);
        let second = processor.chain();

        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(first.phase(), ChainPhase::Disposed);
        assert_eq!(second.descriptor(ModuleKind::Gain).unwrap().params["gain"], 1.0);
        assert_eq!(engine.nodes_of_kind(NodeKind::Gain).len(), 1);
    }
}
