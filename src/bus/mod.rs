//! Control bus
//!
//! Message passing between the control surface and the page processor. Two
//! traffic patterns are kept apart at the type level:
//! - [`Command`]: fire-and-forget control, optionally acknowledged
//! - [`Query`]: request/response reads (meter polling)
//!
//! Delivery is at-most-once. When no processor is listening the message is
//! dropped and the sender gets a failed [`Response`], never a panic.

mod processor;

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::dsp::ModuleKind;
use crate::error::{AudioExpertError, Result};
use crate::metering::MeterReading;
use crate::state::PersistedSnapshot;

pub use processor::Processor;

/// `{param, value}` payload of the `SET_*` commands
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamUpdate {
    pub param: String,
    pub value: f32,
}

impl ParamUpdate {
    pub fn new(param: impl Into<String>, value: f32) -> Self {
        Self {
            param: param.into(),
            value,
        }
    }
}

/// Fire-and-forget control messages, `{type, payload}` on the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Command {
    SetVolume(f32),
    ToggleVolume(bool),
    SetGain(f32),
    ToggleGain(bool),
    SetCompressor(ParamUpdate),
    SetEq(ParamUpdate),
    SetGate(ParamUpdate),
    SetPitchShift(ParamUpdate),
    SetLimiter(ParamUpdate),
    ToggleCompressor(bool),
    ToggleEq(bool),
    ToggleGate(bool),
    ToggleLimiter(bool),
    TogglePitchShift(bool),
    ToggleMono(bool),
    ResetAll,
    ApplyStoredState(PersistedSnapshot),
}

/// What a command does, independent of its wire shape
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Route<'a> {
    Volume(f32),
    VolumeActive(bool),
    Param {
        kind: ModuleKind,
        param: &'a str,
        value: f32,
    },
    Toggle {
        kind: ModuleKind,
        active: bool,
    },
    Reset,
    Hydrate(&'a PersistedSnapshot),
}

impl Command {
    /// Parameter update for a module
    ///
    /// Fails for modules with no parameters (mono).
    pub fn set(kind: ModuleKind, param: &str, value: f32) -> Result<Self> {
        kind.param_spec(param)?;
        let update = ParamUpdate::new(param, value);
        Ok(match kind {
            ModuleKind::Gain => Command::SetGain(value),
            ModuleKind::Compressor => Command::SetCompressor(update),
            ModuleKind::Eq => Command::SetEq(update),
            ModuleKind::Gate => Command::SetGate(update),
            ModuleKind::PitchShift => Command::SetPitchShift(update),
            ModuleKind::Limiter => Command::SetLimiter(update),
            ModuleKind::Mono => {
                return Err(AudioExpertError::UnknownParam {
                    module: kind.id().to_string(),
                    param: param.to_string(),
                })
            }
        })
    }

    /// Active toggle for a module
    pub fn toggle(kind: ModuleKind, active: bool) -> Self {
        match kind {
            ModuleKind::Gain => Command::ToggleGain(active),
            ModuleKind::Compressor => Command::ToggleCompressor(active),
            ModuleKind::Eq => Command::ToggleEq(active),
            ModuleKind::Gate => Command::ToggleGate(active),
            ModuleKind::PitchShift => Command::TogglePitchShift(active),
            ModuleKind::Mono => Command::ToggleMono(active),
            ModuleKind::Limiter => Command::ToggleLimiter(active),
        }
    }

    /// Dispatch table entry for this command
    pub fn route(&self) -> Route<'_> {
        match self {
            Command::SetVolume(value) => Route::Volume(*value),
            Command::ToggleVolume(active) => Route::VolumeActive(*active),
            Command::SetGain(value) => Route::Param {
                kind: ModuleKind::Gain,
                param: "gain",
                value: *value,
            },
            Command::SetCompressor(update) => param_route(ModuleKind::Compressor, update),
            Command::SetEq(update) => param_route(ModuleKind::Eq, update),
            Command::SetGate(update) => param_route(ModuleKind::Gate, update),
            Command::SetPitchShift(update) => param_route(ModuleKind::PitchShift, update),
            Command::SetLimiter(update) => param_route(ModuleKind::Limiter, update),
            Command::ToggleGain(active) => Route::Toggle {
                kind: ModuleKind::Gain,
                active: *active,
            },
            Command::ToggleCompressor(active) => Route::Toggle {
                kind: ModuleKind::Compressor,
                active: *active,
            },
            Command::ToggleEq(active) => Route::Toggle {
                kind: ModuleKind::Eq,
                active: *active,
            },
            Command::ToggleGate(active) => Route::Toggle {
                kind: ModuleKind::Gate,
                active: *active,
            },
            Command::ToggleLimiter(active) => Route::Toggle {
                kind: ModuleKind::Limiter,
                active: *active,
            },
            Command::TogglePitchShift(active) => Route::Toggle {
                kind: ModuleKind::PitchShift,
                active: *active,
            },
            Command::ToggleMono(active) => Route::Toggle {
                kind: ModuleKind::Mono,
                active: *active,
            },
            Command::ResetAll => Route::Reset,
            Command::ApplyStoredState(snapshot) => Route::Hydrate(snapshot),
        }
    }

    /// Wire type name
    pub fn name(&self) -> &'static str {
        match self {
            Command::SetVolume(_) => "SET_VOLUME",
            Command::ToggleVolume(_) => "TOGGLE_VOLUME",
            Command::SetGain(_) => "SET_GAIN",
            Command::ToggleGain(_) => "TOGGLE_GAIN",
            Command::SetCompressor(_) => "SET_COMPRESSOR",
            Command::SetEq(_) => "SET_EQ",
            Command::SetGate(_) => "SET_GATE",
            Command::SetPitchShift(_) => "SET_PITCH_SHIFT",
            Command::SetLimiter(_) => "SET_LIMITER",
            Command::ToggleCompressor(_) => "TOGGLE_COMPRESSOR",
            Command::ToggleEq(_) => "TOGGLE_EQ",
            Command::ToggleGate(_) => "TOGGLE_GATE",
            Command::ToggleLimiter(_) => "TOGGLE_LIMITER",
            Command::TogglePitchShift(_) => "TOGGLE_PITCH_SHIFT",
            Command::ToggleMono(_) => "TOGGLE_MONO",
            Command::ResetAll => "RESET_ALL",
            Command::ApplyStoredState(_) => "APPLY_STORED_STATE",
        }
    }
}

fn param_route(kind: ModuleKind, update: &ParamUpdate) -> Route<'_> {
    Route::Param {
        kind,
        param: update.param.as_str(),
        value: update.value,
    }
}

/// Request/response reads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Query {
    GetMeters,
}

/// `{success, error?}` envelope returned across the boundary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meters: Option<MeterReading>,
}

impl Response {
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
            meters: None,
        }
    }

    pub fn failed(error: &AudioExpertError) -> Self {
        Self {
            success: false,
            error: Some(error.to_envelope_message()),
            meters: None,
        }
    }

    pub fn from_result(result: Result<()>) -> Self {
        match result {
            Ok(()) => Self::ok(),
            Err(e) => Self::failed(&e),
        }
    }

    pub fn with_meters(mut self, meters: MeterReading) -> Self {
        self.meters = Some(meters);
        self
    }
}

/// In-process message as delivered to the processor
#[derive(Debug)]
pub enum Envelope {
    Control {
        command: Command,
        ack: Option<oneshot::Sender<Response>>,
    },
    Query {
        query: Query,
        reply: oneshot::Sender<Response>,
    },
}

/// Receiving half handed to [`Processor::serve`]
pub type BusReceiver = mpsc::Receiver<Envelope>;

/// Sending half, shared by the control surface
///
/// Starts out disconnected; [`ControlBus::connect`] stands up a receiver,
/// replacing any previous one.
#[derive(Clone, Default)]
pub struct ControlBus {
    sender: Arc<Mutex<Option<mpsc::Sender<Envelope>>>>,
}

impl ControlBus {
    /// Bus with no receiving context yet
    pub fn disconnected() -> Self {
        Self::default()
    }

    /// Open a receiving context; earlier receivers stop getting messages
    pub fn connect(&self, capacity: usize) -> BusReceiver {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        *self.sender.lock() = Some(tx);
        rx
    }

    /// Drop the receiving context
    pub fn disconnect(&self) {
        *self.sender.lock() = None;
    }

    pub fn has_receiver(&self) -> bool {
        self.sender
            .lock()
            .as_ref()
            .map(|tx| !tx.is_closed())
            .unwrap_or(false)
    }

    fn deliver(&self, envelope: Envelope) -> Result<()> {
        let sender = self.sender.lock().clone();
        let Some(tx) = sender else {
            return Err(AudioExpertError::CommunicationFailure {
                reason: "no receiving context".to_string(),
            });
        };
        tx.try_send(envelope)
            .map_err(|e| AudioExpertError::CommunicationFailure {
                reason: match e {
                    mpsc::error::TrySendError::Full(_) => "receiver is busy".to_string(),
                    mpsc::error::TrySendError::Closed(_) => "receiver is gone".to_string(),
                },
            })
    }

    /// Fire-and-forget; success only means the message was handed over
    pub fn send(&self, command: Command) -> Response {
        let name = command.name();
        match self.deliver(Envelope::Control { command, ack: None }) {
            Ok(()) => {
                debug!("Sent {}", name);
                Response::ok()
            }
            Err(e) => {
                if self.has_receiver() {
                    warn!("Dropped {}: {}", name, e);
                } else {
                    debug!("Dropped {}: {}", name, e);
                }
                Response::failed(&e)
            }
        }
    }

    /// Send and wait for the processor's outcome
    pub async fn send_with_ack(&self, command: Command) -> Response {
        let name = command.name();
        let (ack, done) = oneshot::channel();
        if let Err(e) = self.deliver(Envelope::Control {
            command,
            ack: Some(ack),
        }) {
            warn!("Dropped {}: {}", name, e);
            return Response::failed(&e);
        }
        done.await.unwrap_or_else(|_| {
            Response::failed(&AudioExpertError::CommunicationFailure {
                reason: format!("{} was not acknowledged", name),
            })
        })
    }

    /// Round-trip read
    pub async fn request(&self, query: Query) -> Response {
        let (reply, answer) = oneshot::channel();
        if let Err(e) = self.deliver(Envelope::Query { query, reply }) {
            debug!("{:?} unanswered: {}", query, e);
            return Response::failed(&e);
        }
        answer.await.unwrap_or_else(|_| {
            Response::failed(&AudioExpertError::CommunicationFailure {
                reason: format!("{:?} was not answered", query),
            })
        })
    }
}

impl std::fmt::Debug for ControlBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlBus")
            .field("connected", &self.has_receiver())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use test_case::test_case;

    #[test_case(Command::SetVolume(40.0), json!({"type": "SET_VOLUME", "payload": 40.0}) ; "set volume")]
    #[test_case(Command::ToggleMono(true), json!({"type": "TOGGLE_MONO", "payload": true}) ; "toggle mono")]
    #[test_case(
        Command::SetPitchShift(ParamUpdate::new("pitch", 3.0)),
        json!({"type": "SET_PITCH_SHIFT", "payload": {"param": "pitch", "value": 3.0}})
        ; "set pitch shift"
    )]
    #[test_case(Command::ResetAll, json!({"type": "RESET_ALL"}) ; "reset all")]
    fn test_wire_format(command: Command, expected: serde_json::Value) {
        assert_eq!(serde_json::to_value(&command).unwrap(), expected);
        let parsed: Command = serde_json::from_value(expected).unwrap();
        assert_eq!(parsed, command);
        assert_eq!(
            serde_json::to_value(&command).unwrap()["type"],
            json!(command.name())
        );
    }

    #[test]
    fn test_query_wire_format() {
        assert_eq!(
            serde_json::to_value(Query::GetMeters).unwrap(),
            json!({"type": "GET_METERS"})
        );
    }

    #[test]
    fn test_set_and_toggle_route_back_to_module() {
        for kind in crate::dsp::CHAIN_ORDER {
            assert_eq!(
                Command::toggle(kind, true).route(),
                Route::Toggle { kind, active: true }
            );
            if let Some(spec) = kind.param_specs().first() {
                let command = Command::set(kind, spec.name, 1.0).unwrap();
                assert_eq!(
                    command.route(),
                    Route::Param {
                        kind,
                        param: spec.name,
                        value: 1.0
                    }
                );
            }
        }
        assert!(Command::set(ModuleKind::Mono, "enabled", 1.0).is_err());
        assert!(Command::set(ModuleKind::Eq, "q", 1.0).is_err());
    }

    #[test]
    fn test_send_without_receiver_reports_failure() {
        let bus = ControlBus::disconnected();
        let response = bus.send(Command::ToggleEq(false));
        assert!(!response.success);
        assert!(response
            .error
            .unwrap()
            .starts_with("COMMUNICATION_FAILURE"));
    }

    #[tokio::test]
    async fn test_request_without_receiver_reports_failure() {
        let bus = ControlBus::disconnected();
        let response = bus.request(Query::GetMeters).await;
        assert!(!response.success);
        assert!(response.meters.is_none());
    }

    #[tokio::test]
    async fn test_dropped_receiver_is_not_connected() {
        let bus = ControlBus::disconnected();
        let rx = bus.connect(4);
        assert!(bus.has_receiver());
        drop(rx);
        assert!(!bus.has_receiver());
        assert!(!bus.send(Command::ResetAll).success);
    }

    #[tokio::test]
    async fn test_messages_arrive_in_send_order() {
        let bus = ControlBus::disconnected();
        let mut rx = bus.connect(8);
        bus.send(Command::SetGain(1.5));
        bus.send(Command::SetGain(2.5));

        for expected in [1.5, 2.5] {
            match rx.recv().await.unwrap() {
                Envelope::Control { command, .. } => {
                    assert_eq!(command, Command::SetGain(expected))
                }
                other => panic!("unexpected {:?}", other),
            }
        }
    }
}
