//! In-memory engine and host implementations
//!
//! No audio flows through these. They keep the node graph, parameter values
//! and level readings as plain data so orchestration can be driven and
//! inspected without a real audio backend. Used by the CLI simulator and the
//! test suites.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{AudioEngine, Endpoint, MediaElement, MediaHost, NodeId, NodeKind, NodeSpec};
use crate::error::{AudioExpertError, Result};

/// A node as the mock engine sees it
#[derive(Debug, Clone)]
pub struct MockNode {
    pub id: NodeId,
    pub kind: NodeKind,
    pub params: HashMap<String, f32>,
    pub disposed: bool,
}

/// One recorded parameter write
#[derive(Debug, Clone, PartialEq)]
pub struct ParamWrite {
    pub node: NodeId,
    pub param: String,
    pub value: f32,
    /// Ramp time constant, `None` for an immediate set
    pub ramp: Option<f32>,
}

#[derive(Debug, Default)]
struct MockState {
    next_id: NodeId,
    nodes: BTreeMap<NodeId, MockNode>,
    edges: Vec<(Endpoint, Endpoint)>,
    writes: Vec<ParamWrite>,
    levels: HashMap<NodeId, f32>,
    default_level: Option<f32>,
    source: Option<String>,
    start_calls: usize,
    fail_start: bool,
    fail_attach: bool,
    start_latency: Option<Duration>,
}

impl MockState {
    fn live(&self, node: NodeId) -> Result<&MockNode> {
        match self.nodes.get(&node) {
            Some(n) if !n.disposed => Ok(n),
            _ => Err(AudioExpertError::Engine {
                reason: format!("node {} does not exist or was disposed", node),
            }),
        }
    }

    fn check_endpoint(&self, endpoint: Endpoint) -> Result<()> {
        match endpoint {
            Endpoint::Source if self.source.is_none() => Err(AudioExpertError::Engine {
                reason: "no media source attached".to_string(),
            }),
            Endpoint::Node(id) => self.live(id).map(|_| ()),
            _ => Ok(()),
        }
    }

    fn write(&mut self, node: NodeId, param: &str, value: f32, ramp: Option<f32>) -> Result<()> {
        self.live(node)?;
        if let Some(n) = self.nodes.get_mut(&node) {
            n.params.insert(param.to_string(), value);
        }
        self.writes.push(ParamWrite {
            node,
            param: param.to_string(),
            value,
            ramp,
        });
        Ok(())
    }
}

/// Recording in-memory audio engine
#[derive(Debug, Default)]
pub struct MockEngine {
    state: Mutex<MockState>,
}

impl MockEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared handle, the shape the orchestrator consumes
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    // ========================================================================
    // Behaviour switches
    // ========================================================================

    /// Make `start()` fail as a suspended context would
    pub fn set_fail_start(&self, fail: bool) {
        self.state.lock().fail_start = fail;
    }

    /// Make `attach_source()` fail
    pub fn set_fail_attach(&self, fail: bool) {
        self.state.lock().fail_attach = fail;
    }

    /// Delay `start()` to widen the window for concurrent initializers
    pub fn set_start_latency(&self, latency: Duration) {
        self.state.lock().start_latency = Some(latency);
    }

    /// Level reported for one node
    pub fn set_level(&self, node: NodeId, db: f32) {
        self.state.lock().levels.insert(node, db);
    }

    /// Level reported for every node without an explicit level
    pub fn set_default_level(&self, db: f32) {
        self.state.lock().default_level = Some(db);
    }

    // ========================================================================
    // Inspection
    // ========================================================================

    pub fn start_calls(&self) -> usize {
        self.state.lock().start_calls
    }

    /// Number of nodes ever created, disposed or not
    pub fn created_count(&self) -> usize {
        self.state.lock().nodes.len()
    }

    /// Number of nodes not yet disposed
    pub fn live_count(&self) -> usize {
        self.state.lock().nodes.values().filter(|n| !n.disposed).count()
    }

    /// Live nodes of one kind, in creation order
    pub fn nodes_of_kind(&self, kind: NodeKind) -> Vec<NodeId> {
        self.state
            .lock()
            .nodes
            .values()
            .filter(|n| n.kind == kind && !n.disposed)
            .map(|n| n.id)
            .collect()
    }

    /// Current value of a node parameter (construction option or last write)
    pub fn param(&self, node: NodeId, name: &str) -> Option<f32> {
        self.state
            .lock()
            .nodes
            .get(&node)
            .and_then(|n| n.params.get(name).copied())
    }

    pub fn writes(&self) -> Vec<ParamWrite> {
        self.state.lock().writes.clone()
    }

    pub fn clear_writes(&self) {
        self.state.lock().writes.clear();
    }

    pub fn edges(&self) -> Vec<(Endpoint, Endpoint)> {
        self.state.lock().edges.clone()
    }

    pub fn source(&self) -> Option<String> {
        self.state.lock().source.clone()
    }

    /// Outgoing links of an endpoint
    pub fn outgoing(&self, from: Endpoint) -> Vec<Endpoint> {
        self.state
            .lock()
            .edges
            .iter()
            .filter(|(f, _)| *f == from)
            .map(|(_, t)| *t)
            .collect()
    }

    /// Kinds along the signal path from source to destination
    ///
    /// Meter taps are ignored. Returns `None` if the path forks, loops or
    /// never reaches the destination.
    pub fn signal_path(&self) -> Option<Vec<NodeKind>> {
        let state = self.state.lock();
        let is_meter = |endpoint: &Endpoint| match endpoint {
            Endpoint::Node(id) => state
                .nodes
                .get(id)
                .map(|n| n.kind == NodeKind::Meter)
                .unwrap_or(false),
            _ => false,
        };

        let mut path = Vec::new();
        let mut current = Endpoint::Source;
        for _ in 0..=state.nodes.len() {
            let next: Vec<Endpoint> = state
                .edges
                .iter()
                .filter(|(f, t)| *f == current && !is_meter(t))
                .map(|(_, t)| *t)
                .collect();
            if next.len() != 1 {
                return None;
            }
            match next[0] {
                Endpoint::Destination => return Some(path),
                Endpoint::Node(id) => {
                    path.push(state.nodes.get(&id)?.kind);
                    current = Endpoint::Node(id);
                }
                Endpoint::Source => return None,
            }
        }
        None
    }
}

#[async_trait]
impl AudioEngine for MockEngine {
    async fn start(&self) -> Result<()> {
        let (latency, fail) = {
            let mut state = self.state.lock();
            state.start_calls += 1;
            (state.start_latency, state.fail_start)
        };

        match latency {
            Some(delay) => tokio::time::sleep(delay).await,
            None => tokio::task::yield_now().await,
        }

        if fail {
            return Err(AudioExpertError::EngineStart {
                reason: "context suspended until user gesture".to_string(),
            });
        }
        Ok(())
    }

    fn attach_source(&self, media: &dyn MediaElement) -> Result<()> {
        let mut state = self.state.lock();
        if state.fail_attach {
            return Err(AudioExpertError::Engine {
                reason: format!("cannot create source for '{}'", media.id()),
            });
        }
        state.source = Some(media.id().to_string());
        Ok(())
    }

    fn detach_source(&self) {
        let mut state = self.state.lock();
        state.edges.retain(|(f, _)| *f != Endpoint::Source);
        state.source = None;
    }

    fn create_node(&self, spec: &NodeSpec) -> Result<NodeId> {
        let mut state = self.state.lock();
        state.next_id += 1;
        let id = state.next_id;
        let params = spec
            .options
            .iter()
            .map(|(name, value)| (name.to_string(), *value))
            .collect();
        state.nodes.insert(
            id,
            MockNode {
                id,
                kind: spec.kind,
                params,
                disposed: false,
            },
        );
        Ok(id)
    }

    fn connect(&self, from: Endpoint, to: Endpoint) -> Result<()> {
        let mut state = self.state.lock();
        state.check_endpoint(from)?;
        state.check_endpoint(to)?;
        if !state.edges.contains(&(from, to)) {
            state.edges.push((from, to));
        }
        Ok(())
    }

    fn disconnect(&self, endpoint: Endpoint) {
        self.state.lock().edges.retain(|(f, _)| *f != endpoint);
    }

    fn ramp_param(&self, node: NodeId, param: &str, value: f32, time_constant: f32) -> Result<()> {
        self.state
            .lock()
            .write(node, param, value, Some(time_constant))
    }

    fn set_param(&self, node: NodeId, param: &str, value: f32) -> Result<()> {
        self.state.lock().write(node, param, value, None)
    }

    fn read_level(&self, node: NodeId) -> f32 {
        let state = self.state.lock();
        state
            .levels
            .get(&node)
            .copied()
            .or(state.default_level)
            .unwrap_or(f32::NEG_INFINITY)
    }

    fn dispose_node(&self, node: NodeId) {
        let mut state = self.state.lock();
        let endpoint = Endpoint::Node(node);
        state.edges.retain(|(f, t)| *f != endpoint && *t != endpoint);
        if let Some(n) = state.nodes.get_mut(&node) {
            n.disposed = true;
        }
    }
}

/// Media element with an adjustable volume
#[derive(Debug)]
pub struct MockMedia {
    id: String,
    volume: Mutex<f32>,
}

impl MockMedia {
    pub fn new(id: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            id: id.into(),
            volume: Mutex::new(1.0),
        })
    }
}

impl MediaElement for MockMedia {
    fn id(&self) -> &str {
        &self.id
    }

    fn volume(&self) -> f32 {
        *self.volume.lock()
    }

    fn set_volume(&self, volume: f32) {
        *self.volume.lock() = volume.clamp(0.0, 1.0);
    }
}

/// Page with zero or one media element
#[derive(Debug, Default)]
pub struct MockMediaHost {
    element: Mutex<Option<Arc<MockMedia>>>,
}

impl MockMediaHost {
    /// Host that already has a media element
    pub fn with_element(id: &str) -> Arc<Self> {
        let host = Self::default();
        *host.element.lock() = Some(MockMedia::new(id));
        Arc::new(host)
    }

    /// Host whose page has no media yet
    pub fn empty() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_element(&self, media: Arc<MockMedia>) {
        *self.element.lock() = Some(media);
    }

    pub fn remove_element(&self) {
        *self.element.lock() = None;
    }

    pub fn element(&self) -> Option<Arc<MockMedia>> {
        self.element.lock().clone()
    }
}

impl MediaHost for MockMediaHost {
    fn query_media_element(&self) -> Option<Arc<dyn MediaElement>> {
        self.element
            .lock()
            .clone()
            .map(|m| m as Arc<dyn MediaElement>)
    }
}
