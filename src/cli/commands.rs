//! CLI Command Implementations
//!
//! Offline commands edit the stored snapshot through an [`AudioStore`] with no
//! processor attached. `simulate` stands up a mock page and drives it over
//! the control bus.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use tracing::info;

use crate::bus::{Command, ControlBus, Processor};
use crate::config::Config;
use crate::dsp::ModuleKind;
use crate::engine::{MockEngine, MockMediaHost, NodeKind};
use crate::metering::{MeterDisplay, MeterPoller};
use crate::state::{AudioStore, FileStorage, StorageBackend};

/// Storage directory used when neither flag nor config names one
const DEFAULT_STORAGE_DIR: &str = ".audio-expert";

/// Resolve config and storage from the global flags
pub fn load_config(path: Option<&PathBuf>, storage_dir: Option<PathBuf>) -> Result<Config> {
    let mut config = match path {
        Some(path) => Config::load(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => Config::default(),
    };
    if storage_dir.is_some() {
        config.storage_dir = storage_dir;
    }
    Ok(config)
}

fn storage(config: &Config) -> Arc<dyn StorageBackend> {
    let dir = config
        .storage_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_STORAGE_DIR));
    Arc::new(FileStorage::new(dir))
}

async fn open_store(config: &Config, bus: ControlBus) -> Result<AudioStore> {
    let store = AudioStore::new(bus, storage(config), config.storage_key.clone());
    for warning in store.load().await.context("failed to read stored state")? {
        println!("warning: {}", warning);
    }
    Ok(store)
}

/// Print the stored snapshot as JSON
pub async fn show(config: &Config) -> Result<()> {
    let store = open_store(config, ControlBus::disconnected()).await?;
    println!("{}", serde_json::to_string_pretty(&store.snapshot())?);
    Ok(())
}

pub async fn set_volume(config: &Config, value: f32) -> Result<()> {
    let store = open_store(config, ControlBus::disconnected()).await?;
    store.set_volume(value)?;
    store.flush().await;
    println!("volume = {}", store.snapshot().volume);
    Ok(())
}

pub async fn set_param(config: &Config, module: &str, param: &str, value: f32) -> Result<()> {
    let kind = ModuleKind::from_id(module)?;
    let store = open_store(config, ControlBus::disconnected()).await?;
    store.update_param(kind, param, value)?;
    store.flush().await;

    let stored = store.snapshot().param(kind, param).unwrap_or(value);
    println!("{}.{} = {}", kind, param, stored);
    Ok(())
}

pub async fn toggle(config: &Config, module: &str, active: bool) -> Result<()> {
    let store = open_store(config, ControlBus::disconnected()).await?;
    if module == "volume" {
        store.toggle_volume(active)?;
    } else {
        store.toggle(ModuleKind::from_id(module)?, active)?;
    }
    store.flush().await;
    println!("{} {}", module, if active { "on" } else { "off" });
    Ok(())
}

pub async fn reset(config: &Config) -> Result<()> {
    let store = open_store(config, ControlBus::disconnected()).await?;
    store.reset_to_defaults()?;
    store.flush().await;
    println!("All modules reset to defaults");
    Ok(())
}

/// Run a mock page with the stored state and poll its meters
pub async fn simulate(config: &Config, ticks: usize) -> Result<()> {
    let storage = storage(config);
    let engine = MockEngine::shared();
    let host = MockMediaHost::with_element("simulated-player");

    let bus = ControlBus::disconnected();
    let rx = bus.connect(config.bus_capacity);
    let processor = Arc::new(
        Processor::new(engine.clone(), host, config.chain())
            .with_storage(storage.clone(), config.storage_key.clone()),
    );
    let server = tokio::spawn({
        let processor = processor.clone();
        async move { processor.serve(rx).await }
    });

    let store = AudioStore::new(bus.clone(), storage, config.storage_key.clone());
    store.load().await.context("failed to read stored state")?;
    let response = bus
        .send_with_ack(Command::ApplyStoredState(store.snapshot()))
        .await;
    if !response.success {
        bail!(
            "simulated page did not start: {}",
            response.error.unwrap_or_default()
        );
    }

    let chain = processor.chain();
    info!("Simulated page ready");
    println!(
        "chain: source → {} → destination",
        chain
            .topology()
            .iter()
            .map(|kind| kind.id())
            .collect::<Vec<_>>()
            .join(" → ")
    );

    let meters = engine.nodes_of_kind(NodeKind::Meter);
    let (mut poller, _display) = MeterPoller::new(bus.clone(), config.poll_interval(), config.peak_hold());
    let mut ticker = tokio::time::interval(config.poll_interval());
    for tick in 0..ticks {
        ticker.tick().await;
        let level = -24.0 + 12.0 * (tick as f32 * 0.7).sin();
        if let [input, output] = meters.as_slice() {
            engine.set_level(*input, level);
            engine.set_level(*output, level - 3.0);
        }
        let display = poller.poll_once(Instant::now()).await;
        println!("{:>4}  {}", tick, format_display(&display));
    }

    processor.dispose();
    bus.disconnect();
    drop(store);
    drop(poller);
    server.await.context("processor task failed")?;
    Ok(())
}

/// One line per poll: levels, held peaks, connectivity
pub fn format_display(display: &MeterDisplay) -> String {
    format!(
        "in {:>6.1} dB (peak {:>6.1})  out {:>6.1} dB (peak {:>6.1})  {}",
        display.input,
        display.input_peak,
        display.output,
        display.output_peak,
        if display.connected { "connected" } else { "not connected" }
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn config_in(dir: &std::path::Path) -> Config {
        Config {
            storage_dir: Some(dir.to_path_buf()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_offline_edits_persist() {
        let temp = tempdir().unwrap();
        let config = config_in(temp.path());

        set_param(&config, "compressor", "ratio", 4.0).await.unwrap();
        toggle(&config, "mono", true).await.unwrap();
        set_volume(&config, 70.0).await.unwrap();

        let store = open_store(&config, ControlBus::disconnected()).await.unwrap();
        let snapshot = store.snapshot();
        assert_eq!(snapshot.compressor.ratio, 4.0);
        assert!(snapshot.mono.is_active);
        assert_eq!(snapshot.volume, 70.0);
    }

    #[tokio::test]
    async fn test_unknown_module_rejected() {
        let temp = tempdir().unwrap();
        let config = config_in(temp.path());
        assert!(set_param(&config, "reverb", "mix", 0.5).await.is_err());
    }

    #[tokio::test]
    async fn test_simulate_runs() {
        let temp = tempdir().unwrap();
        let mut config = config_in(temp.path());
        config.poll_interval_ms = 1;
        simulate(&config, 3).await.unwrap();
    }

    #[test]
    fn test_format_display() {
        let line = format_display(&MeterDisplay::default());
        assert!(line.contains("-60.0"));
        assert!(line.ends_with("not connected"));
    }
}
