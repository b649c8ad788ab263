//! Persisted snapshot
//!
//! One composite object holding every module's state plus volume. It is the
//! only source of truth at initialization: live node values are derived from
//! it, never read back into it.
//!
//! Parsing is lenient per block. A malformed block falls back to its
//! defaults and is reported, without affecting the other blocks.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::dsp::{ModuleKind, ModuleState, CHAIN_ORDER};
use crate::error::{AudioExpertError, Result};

/// Default media volume, percent
pub const DEFAULT_VOLUME: f32 = 100.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GainState {
    pub value: f32,
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CompressorState {
    pub threshold: f32,
    pub knee: f32,
    pub ratio: f32,
    pub attack: f32,
    pub release: f32,
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EqState {
    pub low: f32,
    pub mid: f32,
    pub high: f32,
    pub low_freq: f32,
    pub mid_freq: f32,
    pub high_freq: f32,
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GateState {
    pub threshold: f32,
    pub smoothing: f32,
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PitchShiftState {
    pub pitch: f32,
    pub window_size: f32,
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MonoState {
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LimiterState {
    pub threshold: f32,
    pub is_active: bool,
}

impl Default for GainState {
    fn default() -> Self {
        Self {
            value: 1.0,
            is_active: true,
        }
    }
}

impl Default for CompressorState {
    fn default() -> Self {
        Self {
            threshold: -24.0,
            knee: 30.0,
            ratio: 12.0,
            attack: 3.0,
            release: 250.0,
            is_active: true,
        }
    }
}

impl Default for EqState {
    fn default() -> Self {
        Self {
            low: 0.0,
            mid: 0.0,
            high: 0.0,
            low_freq: 400.0,
            mid_freq: 2500.0,
            high_freq: 8000.0,
            is_active: true,
        }
    }
}

impl Default for GateState {
    fn default() -> Self {
        Self {
            threshold: -50.0,
            smoothing: 0.1,
            is_active: false,
        }
    }
}

impl Default for PitchShiftState {
    fn default() -> Self {
        Self {
            pitch: 0.0,
            window_size: 0.1,
            is_active: false,
        }
    }
}

impl Default for LimiterState {
    fn default() -> Self {
        Self {
            threshold: -3.0,
            is_active: false,
        }
    }
}

/// Everything the control surface persists
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PersistedSnapshot {
    /// Media element volume, percent (0-100)
    pub volume: f32,
    pub volume_active: bool,
    pub gain: GainState,
    pub compressor: CompressorState,
    pub eq: EqState,
    pub gate: GateState,
    pub pitch_shift: PitchShiftState,
    pub mono: MonoState,
    pub limiter: LimiterState,
}

impl Default for PersistedSnapshot {
    fn default() -> Self {
        Self {
            volume: DEFAULT_VOLUME,
            volume_active: true,
            gain: GainState::default(),
            compressor: CompressorState::default(),
            eq: EqState::default(),
            gate: GateState::default(),
            pitch_shift: PitchShiftState::default(),
            mono: MonoState::default(),
            limiter: LimiterState::default(),
        }
    }
}

impl PersistedSnapshot {
    // ========================================================================
    // Field access by module id
    // ========================================================================

    /// Active flag of a module block
    pub fn is_active(&self, kind: ModuleKind) -> bool {
        match kind {
            ModuleKind::Gate => self.gate.is_active,
            ModuleKind::Eq => self.eq.is_active,
            ModuleKind::Compressor => self.compressor.is_active,
            ModuleKind::PitchShift => self.pitch_shift.is_active,
            ModuleKind::Gain => self.gain.is_active,
            ModuleKind::Mono => self.mono.is_active,
            ModuleKind::Limiter => self.limiter.is_active,
        }
    }

    pub fn set_active(&mut self, kind: ModuleKind, active: bool) {
        let flag = match kind {
            ModuleKind::Gate => &mut self.gate.is_active,
            ModuleKind::Eq => &mut self.eq.is_active,
            ModuleKind::Compressor => &mut self.compressor.is_active,
            ModuleKind::PitchShift => &mut self.pitch_shift.is_active,
            ModuleKind::Gain => &mut self.gain.is_active,
            ModuleKind::Mono => &mut self.mono.is_active,
            ModuleKind::Limiter => &mut self.limiter.is_active,
        };
        *flag = active;
    }

    fn slot_mut(&mut self, kind: ModuleKind, key: &str) -> Option<&mut f32> {
        let slot = match (kind, key) {
            (ModuleKind::Gate, "threshold") => &mut self.gate.threshold,
            (ModuleKind::Gate, "smoothing") => &mut self.gate.smoothing,
            (ModuleKind::Eq, "low") => &mut self.eq.low,
            (ModuleKind::Eq, "mid") => &mut self.eq.mid,
            (ModuleKind::Eq, "high") => &mut self.eq.high,
            (ModuleKind::Eq, "lowFreq") => &mut self.eq.low_freq,
            (ModuleKind::Eq, "midFreq") => &mut self.eq.mid_freq,
            (ModuleKind::Eq, "highFreq") => &mut self.eq.high_freq,
            (ModuleKind::Compressor, "threshold") => &mut self.compressor.threshold,
            (ModuleKind::Compressor, "knee") => &mut self.compressor.knee,
            (ModuleKind::Compressor, "ratio") => &mut self.compressor.ratio,
            (ModuleKind::Compressor, "attack") => &mut self.compressor.attack,
            (ModuleKind::Compressor, "release") => &mut self.compressor.release,
            (ModuleKind::PitchShift, "pitch") => &mut self.pitch_shift.pitch,
            (ModuleKind::PitchShift, "windowSize") => &mut self.pitch_shift.window_size,
            (ModuleKind::Gain, "gain") => &mut self.gain.value,
            (ModuleKind::Limiter, "threshold") => &mut self.limiter.threshold,
            _ => return None,
        };
        Some(slot)
    }

    /// Stored value of a declared parameter
    pub fn param(&self, kind: ModuleKind, key: &str) -> Option<f32> {
        let value = match (kind, key) {
            (ModuleKind::Gate, "threshold") => self.gate.threshold,
            (ModuleKind::Gate, "smoothing") => self.gate.smoothing,
            (ModuleKind::Eq, "low") => self.eq.low,
            (ModuleKind::Eq, "mid") => self.eq.mid,
            (ModuleKind::Eq, "high") => self.eq.high,
            (ModuleKind::Eq, "lowFreq") => self.eq.low_freq,
            (ModuleKind::Eq, "midFreq") => self.eq.mid_freq,
            (ModuleKind::Eq, "highFreq") => self.eq.high_freq,
            (ModuleKind::Compressor, "threshold") => self.compressor.threshold,
            (ModuleKind::Compressor, "knee") => self.compressor.knee,
            (ModuleKind::Compressor, "ratio") => self.compressor.ratio,
            (ModuleKind::Compressor, "attack") => self.compressor.attack,
            (ModuleKind::Compressor, "release") => self.compressor.release,
            (ModuleKind::PitchShift, "pitch") => self.pitch_shift.pitch,
            (ModuleKind::PitchShift, "windowSize") => self.pitch_shift.window_size,
            (ModuleKind::Gain, "gain") => self.gain.value,
            (ModuleKind::Limiter, "threshold") => self.limiter.threshold,
            _ => return None,
        };
        Some(value)
    }

    /// Validate, clamp and store one parameter; returns the stored value
    pub fn set_param(&mut self, kind: ModuleKind, key: &str, value: f32) -> Result<f32> {
        let spec = kind.param_spec(key)?;
        if value.is_nan() {
            return Err(AudioExpertError::InvalidValue {
                module: kind.id().to_string(),
                param: key.to_string(),
                value,
            });
        }
        let value = spec.clamp(value);
        let slot = self
            .slot_mut(kind, key)
            .ok_or_else(|| AudioExpertError::UnknownParam {
                module: kind.id().to_string(),
                param: key.to_string(),
            })?;
        *slot = value;
        Ok(value)
    }

    /// Module state block in control-layer terms
    pub fn module_state(&self, kind: ModuleKind) -> ModuleState {
        let params = kind
            .param_specs()
            .iter()
            .filter_map(|spec| {
                self.param(kind, spec.name)
                    .map(|v| (spec.name.to_string(), v))
            })
            .collect();
        ModuleState {
            is_active: self.is_active(kind),
            params,
        }
    }

    /// Clamp the volume into 0-100
    pub fn set_volume(&mut self, volume: f32) -> f32 {
        self.volume = if volume.is_nan() {
            DEFAULT_VOLUME
        } else {
            volume.clamp(0.0, 100.0)
        };
        self.volume
    }

    // ========================================================================
    // Lenient parsing
    // ========================================================================

    /// Parse stored text; never fails
    ///
    /// Returns the snapshot plus one `StateParse` error per block that had
    /// to fall back to defaults.
    pub fn parse_lenient(raw: &str) -> (Self, Vec<AudioExpertError>) {
        match serde_json::from_str::<Value>(raw) {
            Ok(value) => Self::from_value_lenient(&value),
            Err(e) => (
                Self::default(),
                vec![AudioExpertError::StateParse {
                    module: "snapshot".to_string(),
                    reason: e.to_string(),
                }],
            ),
        }
    }

    /// Decode each block independently
    pub fn from_value_lenient(value: &Value) -> (Self, Vec<AudioExpertError>) {
        let mut errors = Vec::new();
        let Some(object) = value.as_object() else {
            errors.push(AudioExpertError::StateParse {
                module: "snapshot".to_string(),
                reason: format!("expected an object, got {}", value),
            });
            return (Self::default(), errors);
        };

        let mut snapshot = Self::default();
        let (volume, volume_active) = parse_volume(object.get("volume"), &mut errors);
        snapshot.volume = volume;
        snapshot.volume_active = match object.get("volumeActive") {
            Some(Value::Bool(active)) => *active,
            _ => volume_active,
        };
        snapshot.gain = block(object.get("gain"), "gain", &mut errors);
        snapshot.compressor = block(object.get("compressor"), "compressor", &mut errors);
        snapshot.eq = block(object.get("eq"), "eq", &mut errors);
        snapshot.gate = block(object.get("gate"), "gate", &mut errors);
        snapshot.pitch_shift = block(object.get("pitchShift"), "pitchShift", &mut errors);
        snapshot.mono = block(object.get("mono"), "mono", &mut errors);
        snapshot.limiter = block(object.get("limiter"), "limiter", &mut errors);

        for kind in CHAIN_ORDER {
            snapshot.clamp_block(kind);
        }

        for error in &errors {
            warn!("{}", error);
        }
        (snapshot, errors)
    }

    fn clamp_block(&mut self, kind: ModuleKind) {
        for spec in kind.param_specs() {
            if let Some(slot) = self.slot_mut(kind, spec.name) {
                *slot = if slot.is_nan() { spec.default } else { spec.clamp(*slot) };
            }
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

fn block<T: DeserializeOwned + Default>(
    value: Option<&Value>,
    module: &str,
    errors: &mut Vec<AudioExpertError>,
) -> T {
    match value {
        None | Some(Value::Null) => T::default(),
        Some(v) => serde_json::from_value(v.clone()).unwrap_or_else(|e| {
            errors.push(AudioExpertError::StateParse {
                module: module.to_string(),
                reason: e.to_string(),
            });
            T::default()
        }),
    }
}

/// Accepts a bare number or the older `{value, isActive}` shape
fn parse_volume(value: Option<&Value>, errors: &mut Vec<AudioExpertError>) -> (f32, bool) {
    match value {
        None | Some(Value::Null) => (DEFAULT_VOLUME, true),
        Some(Value::Number(n)) => match n.as_f64() {
            Some(v) => ((v as f32).clamp(0.0, 100.0), true),
            None => (DEFAULT_VOLUME, true),
        },
        Some(Value::Object(map)) => {
            let volume = map
                .get("value")
                .and_then(Value::as_f64)
                .map(|v| (v as f32).clamp(0.0, 100.0))
                .unwrap_or(DEFAULT_VOLUME);
            let active = map.get("isActive").and_then(Value::as_bool).unwrap_or(true);
            (volume, active)
        }
        Some(other) => {
            errors.push(AudioExpertError::StateParse {
                module: "volume".to_string(),
                reason: format!("expected a number, got {}", other),
            });
            (DEFAULT_VOLUME, true)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_defaults_match_module_defaults() {
        let snapshot = PersistedSnapshot::default();
        for kind in CHAIN_ORDER {
            assert_eq!(snapshot.module_state(kind), kind.default_state(), "{}", kind);
        }
    }

    #[test]
    fn test_schema_field_names() {
        let value = serde_json::to_value(PersistedSnapshot::default()).unwrap();
        assert_eq!(value["volume"], json!(100.0));
        assert_eq!(value["gain"]["isActive"], json!(true));
        assert_eq!(value["eq"]["lowFreq"], json!(400.0));
        assert_eq!(value["pitchShift"]["windowSize"], json!(0.1));
        assert_eq!(value["mono"], json!({"isActive": false}));
    }

    #[test]
    fn test_gain_value_maps_to_gain_param() {
        let mut snapshot = PersistedSnapshot::default();
        snapshot.set_param(ModuleKind::Gain, "gain", 2.0).unwrap();
        assert_eq!(snapshot.gain.value, 2.0);
        assert_eq!(snapshot.module_state(ModuleKind::Gain).params["gain"], 2.0);
    }

    #[test]
    fn test_set_param_rejects_unknown_key() {
        let mut snapshot = PersistedSnapshot::default();
        assert!(snapshot.set_param(ModuleKind::Compressor, "makeup", 3.0).is_err());
        assert_eq!(snapshot, PersistedSnapshot::default());
    }

    #[test]
    fn test_malformed_block_falls_back_alone() {
        let raw = json!({
            "volume": 40,
            "gain": {"value": 2, "isActive": true},
            "compressor": "garbage",
            "eq": {"low": 3}
        });
        let (snapshot, errors) = PersistedSnapshot::from_value_lenient(&raw);

        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].error_code(), "STATE_PARSE_FAILURE");
        assert_eq!(snapshot.compressor, CompressorState::default());
        assert_eq!(snapshot.gain.value, 2.0);
        assert_eq!(snapshot.volume, 40.0);
        assert_eq!(snapshot.eq.low, 3.0);
        assert_eq!(snapshot.eq.high_freq, 8000.0);
    }

    #[test]
    fn test_unparseable_text_yields_defaults() {
        let (snapshot, errors) = PersistedSnapshot::parse_lenient("{not json");
        assert_eq!(snapshot, PersistedSnapshot::default());
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn test_legacy_volume_object() {
        let raw = json!({"volume": {"value": 55, "isActive": false}});
        let (snapshot, errors) = PersistedSnapshot::from_value_lenient(&raw);
        assert!(errors.is_empty());
        assert_eq!(snapshot.volume, 55.0);
        assert!(!snapshot.volume_active);
    }

    #[test]
    fn test_out_of_range_values_clamped_on_load() {
        let raw = json!({"compressor": {"ratio": 400, "isActive": true}});
        let (snapshot, _) = PersistedSnapshot::from_value_lenient(&raw);
        assert_eq!(snapshot.compressor.ratio, 20.0);
    }
}
