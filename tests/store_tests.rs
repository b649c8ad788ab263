//! State Store Integration Tests
//!
//! The control-surface store driving a live processor, and stored state
//! surviving into fresh chains.

use std::sync::Arc;

use audio_expert::bus::{Command, ControlBus, Envelope, Processor, Query};
use audio_expert::config::ChainConfig;
use audio_expert::dsp::{AudioChain, ModuleKind};
use audio_expert::engine::{MockEngine, MockMediaHost, NodeKind};
use audio_expert::state::{AudioStore, FileStorage, MemoryStorage, PersistedSnapshot, StorageBackend};
use pretty_assertions::assert_eq;
use tempfile::tempdir;

const KEY: &str = "audioExpertState";

struct Rig {
    engine: Arc<MockEngine>,
    processor: Arc<Processor>,
    bus: ControlBus,
}

fn rig(storage: Arc<dyn StorageBackend>) -> Rig {
    let engine = MockEngine::shared();
    let processor = Arc::new(
        Processor::new(
            engine.clone(),
            MockMediaHost::with_element("video-1"),
            ChainConfig::default(),
        )
        .with_storage(storage, KEY),
    );
    let bus = ControlBus::disconnected();
    let rx = bus.connect(32);
    tokio::spawn({
        let processor = processor.clone();
        async move { processor.serve(rx).await }
    });
    Rig {
        engine,
        processor,
        bus,
    }
}

/// Wait until the processor has drained everything sent so far
async fn settle(bus: &ControlBus) {
    bus.request(Query::GetMeters).await;
}

fn param(chain: &AudioChain, kind: ModuleKind, key: &str) -> f32 {
    chain.descriptor(kind).unwrap().params[key]
}

// === Store -> Processor ===

#[tokio::test]
async fn test_store_actions_reach_the_chain() {
    let storage = Arc::new(MemoryStorage::new());
    let rig = rig(storage.clone());
    let store = AudioStore::new(rig.bus.clone(), storage, KEY);

    store.set_gain(3.0).unwrap();
    store.update_compressor("ratio", 8.0).unwrap();
    store.update_eq("high", -4.0).unwrap();
    store.toggle_mono(true).unwrap();
    store.set_volume(40.0).unwrap();
    settle(&rig.bus).await;

    assert!(store.is_connected());
    let chain = rig.processor.chain();
    assert_eq!(param(&chain, ModuleKind::Gain, "gain"), 3.0);
    assert_eq!(param(&chain, ModuleKind::Compressor, "ratio"), 8.0);
    assert_eq!(param(&chain, ModuleKind::Eq, "high"), -4.0);
    assert!(chain.descriptor(ModuleKind::Mono).unwrap().is_active);
    assert!(chain.topology().contains(&ModuleKind::Mono));
    assert_eq!(chain.volume().value, 40.0);
}

#[tokio::test]
async fn test_store_reset_reaches_the_chain() {
    let storage = Arc::new(MemoryStorage::new());
    let rig = rig(storage.clone());
    let store = AudioStore::new(rig.bus.clone(), storage.clone(), KEY);

    store.set_gain(5.0).unwrap();
    store.toggle_limiter(true).unwrap();
    settle(&rig.bus).await;

    store.reset_to_defaults().unwrap();
    store.flush().await;
    settle(&rig.bus).await;

    let chain = rig.processor.chain();
    assert_eq!(param(&chain, ModuleKind::Gain, "gain"), 1.0);
    assert!(!chain.topology().contains(&ModuleKind::Limiter));
    assert_eq!(store.snapshot(), PersistedSnapshot::default());

    let stored = storage.get(KEY).await.unwrap().unwrap();
    assert_eq!(PersistedSnapshot::parse_lenient(&stored).0, PersistedSnapshot::default());
}

#[tokio::test]
async fn test_store_keeps_state_while_processor_is_away() {
    let storage = Arc::new(MemoryStorage::new());
    let bus = ControlBus::disconnected();
    let store = AudioStore::new(bus.clone(), storage.clone(), KEY);

    store.update_gate("threshold", -40.0).unwrap();
    store.toggle_gate(true).unwrap();
    assert!(!store.is_connected());
    assert_eq!(store.snapshot().gate.threshold, -40.0);

    // A processor shows up later and is brought up to date
    let engine = MockEngine::shared();
    let processor = Arc::new(Processor::new(
        engine,
        MockMediaHost::with_element("video-1"),
        ChainConfig::default(),
    ));
    let rx = bus.connect(8);
    tokio::spawn({
        let processor = processor.clone();
        async move { processor.serve(rx).await }
    });

    assert!(store.sync().success);
    assert!(store.is_connected());
    settle(&bus).await;

    let chain = processor.chain();
    let gate = chain.descriptor(ModuleKind::Gate).unwrap();
    assert!(gate.is_active);
    assert_eq!(gate.params["threshold"], -40.0);
}

// === Stored state -> fresh chains ===

#[tokio::test]
async fn test_processor_replays_stored_state_on_first_init() {
    let storage = Arc::new(MemoryStorage::new());
    {
        let offline = AudioStore::new(ControlBus::disconnected(), storage.clone(), KEY);
        offline.set_gain(2.5).unwrap();
        offline.update_pitch_shift("pitch", 7.0).unwrap();
        offline.toggle_pitch_shift(true).unwrap();
        offline.flush().await;
    }

    let rig = rig(storage);
    assert!(rig.processor.initialize().await);

    let chain = rig.processor.chain();
    assert!(chain.is_hydrated());
    assert_eq!(param(&chain, ModuleKind::Gain, "gain"), 2.5);
    let pitch = chain.descriptor(ModuleKind::PitchShift).unwrap();
    assert!(pitch.is_active);
    assert_eq!(pitch.params["pitch"], 7.0);
    assert_eq!(rig.engine.start_calls(), 1);
}

#[tokio::test]
async fn test_stored_limiter_threshold_reaches_the_engine() {
    let storage = Arc::new(MemoryStorage::new());
    {
        let offline = AudioStore::new(ControlBus::disconnected(), storage.clone(), KEY);
        offline.update_limiter("threshold", -10.0).unwrap();
        offline.toggle_limiter(true).unwrap();
        offline.flush().await;
    }

    let rig = rig(storage);
    assert!(rig.processor.initialize().await);

    let chain = rig.processor.chain();
    assert_eq!(param(&chain, ModuleKind::Limiter, "threshold"), -10.0);
    let limiters = rig.engine.nodes_of_kind(NodeKind::Limiter);
    assert_eq!(limiters.len(), 1);
    assert_eq!(rig.engine.param(limiters[0], "threshold"), Some(-10.0));
    assert_eq!(chain.topology().last(), Some(&ModuleKind::Limiter));
}

#[tokio::test]
async fn test_hydrate_from_file_with_malformed_block() {
    let temp = tempdir().unwrap();
    let storage = Arc::new(FileStorage::new(temp.path()));
    storage
        .set(
            KEY,
            r#"{
                "volume": 55,
                "volumeActive": true,
                "gain": {"value": 1.8, "isActive": true},
                "compressor": "corrupted",
                "eq": {"low": 3, "mid": 0, "high": 0, "isActive": true}
            }"#,
        )
        .await
        .unwrap();

    let rig = rig(Arc::new(MemoryStorage::new()));
    let store = AudioStore::new(rig.bus.clone(), storage, KEY);
    let errors = store.hydrate().await.unwrap();
    settle(&rig.bus).await;

    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].error_code(), "STATE_PARSE_FAILURE");

    let chain = rig.processor.chain();
    assert!(chain.is_hydrated());
    assert_eq!(chain.volume().value, 55.0);
    assert_eq!(param(&chain, ModuleKind::Gain, "gain"), 1.8);
    assert_eq!(param(&chain, ModuleKind::Eq, "low"), 3.0);
    assert_eq!(
        chain.descriptor(ModuleKind::Compressor).unwrap().params,
        ModuleKind::Compressor.default_params()
    );
}

#[tokio::test]
async fn test_file_storage_survives_a_new_store() {
    let temp = tempdir().unwrap();
    let storage: Arc<dyn StorageBackend> = Arc::new(FileStorage::new(temp.path()));

    let first = AudioStore::new(ControlBus::disconnected(), storage.clone(), KEY);
    first.update_limiter("threshold", -3.0).unwrap();
    first.toggle_limiter(true).unwrap();
    first.toggle_volume(false).unwrap();
    first.flush().await;
    let expected = first.snapshot();
    drop(first);

    let second = AudioStore::new(ControlBus::disconnected(), storage, KEY);
    assert!(second.load().await.unwrap().is_empty());
    assert_eq!(second.snapshot(), expected);
    assert!(!second.snapshot().volume_active);
}

#[tokio::test]
async fn test_last_write_wins_in_storage() {
    let storage = Arc::new(MemoryStorage::new());
    let store = AudioStore::new(ControlBus::disconnected(), storage.clone(), KEY);

    for ratio in [2.0, 4.0, 6.0, 8.0] {
        store.update_compressor("ratio", ratio).unwrap();
    }
    store.flush().await;

    let history = storage.history();
    assert_eq!(history.len(), 4);
    let stored = storage.get(KEY).await.unwrap().unwrap();
    assert_eq!(PersistedSnapshot::parse_lenient(&stored).0.compressor.ratio, 8.0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_actions_keep_storage_and_bus_in_step() {
    const THREADS: usize = 8;
    const ACTIONS: usize = 20;

    for round in 0..50 {
        let storage = Arc::new(MemoryStorage::new());
        let bus = ControlBus::disconnected();
        let mut rx = bus.connect(THREADS * ACTIONS);
        let store = AudioStore::new(bus, storage.clone(), KEY);

        std::thread::scope(|scope| {
            for thread in 0..THREADS {
                let store = &store;
                scope.spawn(move || {
                    for action in 0..ACTIONS {
                        store.set_volume((thread * ACTIONS + action) as f32 % 100.0).unwrap();
                    }
                });
            }
        });
        store.flush().await;

        let latest = store.snapshot();
        let stored = storage.get(KEY).await.unwrap().unwrap();
        assert_eq!(
            PersistedSnapshot::parse_lenient(&stored).0,
            latest,
            "storage diverged in round {}",
            round
        );

        let mut last_sent = None;
        while let Ok(envelope) = rx.try_recv() {
            if let Envelope::Control {
                command: Command::SetVolume(volume),
                ..
            } = envelope
            {
                last_sent = Some(volume);
            }
        }
        assert_eq!(last_sent, Some(latest.volume), "bus diverged in round {}", round);
    }
}
