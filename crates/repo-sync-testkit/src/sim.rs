//! Deterministic discrete-event simulation of a full mesh of engines.
//!
//! Time is virtual and only moves when [`Simulation::step`] jumps to the
//! next engine timer or request expiry. Delivery is instantaneous and FIFO.
//! With seeded configs every run is bit-for-bit reproducible.

use std::collections::{BTreeMap, VecDeque};
use std::time::Duration;

use repo_sync_core::{ActionEntry, DigestValue, Name};
use repo_sync_protocol::memory::{ContentRouter, Delivery, RecordingTransport};
use repo_sync_protocol::{
    verify_all, ConvergenceResult, Result, SyncConfig, SyncEngine, SyncError, TransportOp,
};
use tracing::trace;

/// The engine type every simulated node runs.
pub type SimEngine = SyncEngine<RecordingTransport>;

/// Decides whether an operation issued by a node is lost.
pub type DropFilter = Box<dyn FnMut(&Name, &TransportOp) -> bool>;

/// One operation a node handed to the network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutedOp {
    pub at: Duration,
    pub from: Name,
    pub op: TransportOp,
    pub dropped: bool,
}

/// A simulated network of sync engines.
pub struct Simulation {
    now: Duration,
    nodes: BTreeMap<Name, SimEngine>,
    router: ContentRouter<Name>,
    inbox: VecDeque<Delivery<Name>>,
    drop_filter: Option<DropFilter>,
    history: Vec<RoutedOp>,
}

impl Simulation {
    pub fn new() -> Self {
        Self {
            now: Duration::ZERO,
            nodes: BTreeMap::new(),
            router: ContentRouter::new(),
            inbox: VecDeque::new(),
            drop_filter: None,
            history: Vec::new(),
        }
    }

    /// Start a node at the current virtual time.
    pub fn add_node(&mut self, config: SyncConfig) -> Result<Name> {
        let creator = config.creator_name()?;
        if self.nodes.contains_key(&creator) {
            return Err(SyncError::InvalidConfig(format!("duplicate creator {creator}")));
        }
        let mut engine = SyncEngine::new(config, RecordingTransport::new())?;
        engine.start(self.now)?;
        self.nodes.insert(creator.clone(), engine);
        self.flush()?;
        Ok(creator)
    }

    pub fn now(&self) -> Duration {
        self.now
    }

    pub fn node(&self, creator: &Name) -> Option<&SimEngine> {
        self.nodes.get(creator)
    }

    pub fn nodes(&self) -> impl Iterator<Item = (&Name, &SimEngine)> {
        self.nodes.iter()
    }

    fn node_mut(&mut self, creator: &Name) -> Result<&mut SimEngine> {
        self.nodes
            .get_mut(creator)
            .ok_or_else(|| SyncError::InvalidConfig(format!("no node {creator}")))
    }

    pub fn insert(&mut self, creator: &Name, target: Name) -> Result<ActionEntry> {
        let now = self.now;
        let action = self.node_mut(creator)?.insert(now, target)?;
        self.flush()?;
        Ok(action)
    }

    pub fn delete(&mut self, creator: &Name, target: Name) -> Result<ActionEntry> {
        let now = self.now;
        let action = self.node_mut(creator)?.delete(now, target)?;
        self.flush()?;
        Ok(action)
    }

    /// Cut or restore a node's link.
    pub fn set_link(&mut self, creator: &Name, up: bool) {
        self.router.set_link(creator.clone(), up);
    }

    /// Drop every operation for which `filter` returns true. A dropped
    /// request still times out at its sender; a dropped publication
    /// satisfies nobody.
    pub fn set_drop_filter<F>(&mut self, filter: F)
    where
        F: FnMut(&Name, &TransportOp) -> bool + 'static,
    {
        self.drop_filter = Some(Box::new(filter));
    }

    pub fn clear_drop_filter(&mut self) {
        self.drop_filter = None;
    }

    /// Everything routed so far, in order.
    pub fn history(&self) -> &[RoutedOp] {
        &self.history
    }

    /// Requests issued by `from` whose name starts with `prefix`.
    pub fn requests_from(&self, from: &Name, prefix: &Name) -> Vec<&Name> {
        self.history
            .iter()
            .filter(|r| &r.from == from)
            .filter_map(|r| match &r.op {
                TransportOp::Request { name, .. } if prefix.is_prefix_of(name) => Some(name),
                _ => None,
            })
            .collect()
    }

    /// Route every queued operation and deliver everything it causes.
    fn flush(&mut self) -> Result<()> {
        loop {
            let mut issued = Vec::new();
            for (creator, engine) in self.nodes.iter_mut() {
                for op in engine.transport_mut().take() {
                    issued.push((creator.clone(), op));
                }
            }
            if issued.is_empty() && self.inbox.is_empty() {
                return Ok(());
            }

            for (from, op) in issued {
                let dropped = match self.drop_filter.as_mut() {
                    Some(filter) => filter(&from, &op),
                    None => false,
                };
                self.history.push(RoutedOp {
                    at: self.now,
                    from: from.clone(),
                    op: op.clone(),
                    dropped,
                });
                let deliveries = match (&op, dropped) {
                    (TransportOp::Publish { .. }, true) => Vec::new(),
                    (_, true) => {
                        self.router.route(self.now, &from, op);
                        Vec::new()
                    }
                    (_, false) => self.router.route(self.now, &from, op),
                };
                self.inbox.extend(deliveries);
            }

            while let Some(Delivery { to, event }) = self.inbox.pop_front() {
                let now = self.now;
                if let Some(engine) = self.nodes.get_mut(&to) {
                    trace!(node = %to, ?event, "deliver");
                    engine.deliver(now, event)?;
                }
            }
        }
    }

    /// Earliest pending timer or request expiry.
    pub fn next_event(&self) -> Option<Duration> {
        self.nodes
            .values()
            .filter_map(SyncEngine::next_deadline)
            .chain(self.router.next_expiry())
            .min()
    }

    /// Advance to the next event and process everything due then.
    pub fn step(&mut self) -> Result<bool> {
        let Some(at) = self.next_event() else {
            return Ok(false);
        };
        self.now = self.now.max(at);
        let now = self.now;
        let timeouts = self.router.expire(now);
        self.inbox.extend(timeouts);
        for engine in self.nodes.values_mut() {
            engine.fire_timers(now)?;
        }
        self.flush()?;
        Ok(true)
    }

    /// Process every event up to and including `until`, then park the clock
    /// there.
    pub fn run_until(&mut self, until: Duration) -> Result<()> {
        while self.next_event().is_some_and(|at| at <= until) {
            self.step()?;
        }
        self.now = self.now.max(until);
        Ok(())
    }

    pub fn run_for(&mut self, duration: Duration) -> Result<()> {
        self.run_until(self.now + duration)
    }

    /// Step until every node has converged, or `deadline` passes. Returns the
    /// time convergence was first observed.
    pub fn run_until_converged(&mut self, deadline: Duration) -> Result<Option<Duration>> {
        loop {
            if self.converged() {
                return Ok(Some(self.now));
            }
            match self.next_event() {
                Some(at) if at <= deadline => {
                    self.step()?;
                }
                _ => return Ok(None),
            }
        }
    }

    /// Convergence of every node against the first one.
    pub fn verify(&self) -> Vec<ConvergenceResult> {
        let replicas: Vec<_> = self
            .nodes
            .values()
            .map(|engine| (engine.tree(), engine.index()))
            .collect();
        verify_all(&replicas)
    }

    pub fn converged(&self) -> bool {
        self.verify().iter().all(ConvergenceResult::is_converged)
    }

    pub fn roots(&self) -> Vec<(Name, DigestValue)> {
        self.nodes
            .iter()
            .map(|(creator, engine)| (creator.clone(), engine.root()))
            .collect()
    }
}

impl Default for Simulation {
    fn default() -> Self {
        Self::new()
    }
}
