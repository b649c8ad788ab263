//! Audio Engine Module
//!
//! Contract for the external audio engine and host page:
//! - Typed node creation and graph wiring
//! - Parameter ramps and immediate sets
//! - Context start/resume (may wait on a user gesture)
//! - Level reads for metering
//!
//! The signal processing itself lives behind these traits. The orchestrator
//! only decides which nodes exist, how they are linked, and which values they
//! are driven to.

pub mod mock;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

pub use mock::{MockEngine, MockMedia, MockMediaHost, ParamWrite};

/// Opaque handle to an engine node
pub type NodeId = u64;

/// Primitive node types the engine knows how to build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NodeKind {
    Gain,
    Eq3,
    Compressor,
    Gate,
    PitchShift,
    Mono,
    Limiter,
    Meter,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NodeKind::Gain => "Gain",
            NodeKind::Eq3 => "EQ3",
            NodeKind::Compressor => "Compressor",
            NodeKind::Gate => "Gate",
            NodeKind::PitchShift => "PitchShift",
            NodeKind::Mono => "Mono",
            NodeKind::Limiter => "Limiter",
            NodeKind::Meter => "Meter",
        };
        write!(f, "{}", name)
    }
}

/// Construction request for a node: kind plus initial option values
///
/// Option names and units are the engine's, not the control layer's.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeSpec {
    pub kind: NodeKind,
    pub options: Vec<(&'static str, f32)>,
}

impl NodeSpec {
    pub fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            options: Vec::new(),
        }
    }

    /// Add a construction option
    pub fn with(mut self, name: &'static str, value: f32) -> Self {
        self.options.push((name, value));
        self
    }

    /// Look up a construction option by name
    pub fn option(&self, name: &str) -> Option<f32> {
        self.options
            .iter()
            .find(|(key, _)| *key == name)
            .map(|(_, value)| *value)
    }
}

/// One end of a graph connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// The attached media element source (chain head)
    Source,
    /// A node created through [`AudioEngine::create_node`]
    Node(NodeId),
    /// The engine output (chain tail)
    Destination,
}

/// External audio engine
///
/// Implementations must tolerate `disconnect` and `dispose_node` on handles
/// that are already disconnected or disposed.
#[async_trait]
pub trait AudioEngine: Send + Sync {
    /// Start or resume the processing context
    ///
    /// May suspend indefinitely until the host allows audio to start.
    async fn start(&self) -> Result<()>;

    /// Attach a media element as the graph's source endpoint
    fn attach_source(&self, media: &dyn MediaElement) -> Result<()>;

    /// Release the source endpoint
    fn detach_source(&self);

    /// Create a node of the requested kind
    fn create_node(&self, spec: &NodeSpec) -> Result<NodeId>;

    /// Link `from`'s output to `to`'s input
    fn connect(&self, from: Endpoint, to: Endpoint) -> Result<()>;

    /// Remove every outgoing link of `endpoint`
    fn disconnect(&self, endpoint: Endpoint);

    /// Move a parameter to `value` over `time_constant` seconds
    fn ramp_param(&self, node: NodeId, param: &str, value: f32, time_constant: f32) -> Result<()>;

    /// Set a parameter that the engine does not expose as rampable
    fn set_param(&self, node: NodeId, param: &str, value: f32) -> Result<()>;

    /// Smoothed signal level in dB (may be `-inf` on silence)
    fn read_level(&self, node: NodeId) -> f32;

    /// Release a node and all of its links
    fn dispose_node(&self, node: NodeId);
}

/// A playable media element on the host page
pub trait MediaElement: Send + Sync + fmt::Debug {
    /// Stable identifier of the element
    fn id(&self) -> &str;

    /// Element volume in 0..=1
    fn volume(&self) -> f32;

    fn set_volume(&self, volume: f32);
}

/// Host page collaborator: exposes at most one media element to attach
pub trait MediaHost: Send + Sync {
    fn query_media_element(&self) -> Option<Arc<dyn MediaElement>>;
}
