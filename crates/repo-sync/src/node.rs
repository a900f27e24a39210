//! Async driver for one sync engine.
//!
//! A [`RepoNode`] owns its engine inside a single task. Transport events and
//! local commands arrive through one bounded inbox; engine timers are
//! served with `sleep_until` on the engine's next deadline. All mutations of
//! a node's state are therefore serialized through that task.

use std::time::Duration;

use bytes::Bytes;
use repo_sync_core::{ActionEntry, DigestValue, Name, ObjectStatus};
use repo_sync_protocol::{
    EngineStats, Inbound, SyncConfig, SyncEngine, SyncError, Transport, TransportOp,
};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

use crate::error::{RepoError, Result};

/// An operation issued by a node, addressed to whatever routes traffic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outbound {
    pub from: Name,
    pub op: TransportOp,
}

/// [`Transport`] that forwards every call over an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelTransport {
    creator: Name,
    outbound: mpsc::UnboundedSender<Outbound>,
}

impl ChannelTransport {
    pub fn new(creator: Name, outbound: mpsc::UnboundedSender<Outbound>) -> Self {
        Self { creator, outbound }
    }

    fn send(&self, op: TransportOp) -> std::result::Result<(), SyncError> {
        self.outbound
            .send(Outbound {
                from: self.creator.clone(),
                op,
            })
            .map_err(|_| SyncError::Transport("router has shut down".into()))
    }
}

impl Transport for ChannelTransport {
    fn register_prefix(&mut self, prefix: &Name) -> repo_sync_protocol::Result<()> {
        self.send(TransportOp::Register(prefix.clone()))
    }

    fn request(&mut self, name: Name, lifetime: Duration) -> repo_sync_protocol::Result<()> {
        self.send(TransportOp::Request { name, lifetime })
    }

    fn publish(
        &mut self,
        name: Name,
        payload: Bytes,
        freshness: Duration,
    ) -> repo_sync_protocol::Result<()> {
        self.send(TransportOp::Publish {
            name,
            payload,
            freshness,
        })
    }
}

/// A point-in-time view of a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeReport {
    pub creator: Name,
    pub root: DigestValue,
    pub synchronized: bool,
    /// `{creator -> last_seq}` in creator order.
    pub tree: Vec<(Name, u64)>,
    pub present_objects: usize,
    pub stats: EngineStats,
}

enum Command {
    Insert {
        target: Name,
        reply: oneshot::Sender<Result<ActionEntry>>,
    },
    Delete {
        target: Name,
        reply: oneshot::Sender<Result<ActionEntry>>,
    },
    Status {
        target: Name,
        reply: oneshot::Sender<ObjectStatus>,
    },
    Report {
        reply: oneshot::Sender<NodeReport>,
    },
    Shutdown,
}

/// Everything a node's task consumes.
enum NodeEvent {
    Inbound(Inbound),
    Command(Command),
}

/// Cloneable handle to a running node.
#[derive(Clone)]
pub struct NodeHandle {
    creator: Name,
    events: mpsc::Sender<NodeEvent>,
}

impl NodeHandle {
    pub fn creator(&self) -> &Name {
        &self.creator
    }

    /// Hand a transport event to the node.
    pub async fn deliver(&self, inbound: Inbound) -> Result<()> {
        self.events
            .send(NodeEvent::Inbound(inbound))
            .await
            .map_err(|_| RepoError::NodeStopped)
    }

    pub async fn insert(&self, target: Name) -> Result<ActionEntry> {
        let (reply, rx) = oneshot::channel();
        self.command(Command::Insert { target, reply }).await?;
        rx.await.map_err(|_| RepoError::NodeStopped)?
    }

    pub async fn delete(&self, target: Name) -> Result<ActionEntry> {
        let (reply, rx) = oneshot::channel();
        self.command(Command::Delete { target, reply }).await?;
        rx.await.map_err(|_| RepoError::NodeStopped)?
    }

    pub async fn status(&self, target: Name) -> Result<ObjectStatus> {
        let (reply, rx) = oneshot::channel();
        self.command(Command::Status { target, reply }).await?;
        rx.await.map_err(|_| RepoError::NodeStopped)
    }

    pub async fn report(&self) -> Result<NodeReport> {
        let (reply, rx) = oneshot::channel();
        self.command(Command::Report { reply }).await?;
        rx.await.map_err(|_| RepoError::NodeStopped)
    }

    /// Ask the node to stop after the events already queued.
    pub async fn shutdown(&self) -> Result<()> {
        self.command(Command::Shutdown).await
    }

    async fn command(&self, command: Command) -> Result<()> {
        self.events
            .send(NodeEvent::Command(command))
            .await
            .map_err(|_| RepoError::NodeStopped)
    }
}

/// One node: an engine plus its inbox.
pub struct RepoNode {
    engine: SyncEngine<ChannelTransport>,
    events: mpsc::Receiver<NodeEvent>,
    epoch: Instant,
}

impl RepoNode {
    /// Build a node whose transport calls go to `outbound`.
    pub fn new(
        config: SyncConfig,
        outbound: mpsc::UnboundedSender<Outbound>,
        inbox_capacity: usize,
    ) -> Result<(Self, NodeHandle)> {
        let creator = config.creator_name()?;
        let transport = ChannelTransport::new(creator.clone(), outbound);
        let engine = SyncEngine::new(config, transport)?;
        let (tx, rx) = mpsc::channel(inbox_capacity.max(1));
        let node = Self {
            engine,
            events: rx,
            epoch: Instant::now(),
        };
        let handle = NodeHandle {
            creator,
            events: tx,
        };
        Ok((node, handle))
    }

    fn now(&self) -> Duration {
        self.epoch.elapsed()
    }

    /// Run until shut down or until every handle is dropped.
    ///
    /// Returns an error only when the transport is gone.
    pub async fn run(mut self) -> Result<()> {
        let creator = self.engine.creator().clone();
        self.engine.start(self.now())?;
        info!(%creator, "node running");

        loop {
            let deadline = self.engine.next_deadline().map(|d| self.epoch + d);
            tokio::select! {
                event = self.events.recv() => {
                    let Some(event) = event else { break };
                    match event {
                        NodeEvent::Inbound(inbound) => {
                            let now = self.now();
                            self.engine.deliver(now, inbound)?;
                        }
                        NodeEvent::Command(Command::Shutdown) => break,
                        NodeEvent::Command(command) => self.handle_command(command),
                    }
                }
                _ = wait_until(deadline) => {
                    let now = self.now();
                    self.engine.fire_timers(now)?;
                }
            }
        }

        info!(%creator, stats = ?self.engine.stats(), "node stopped");
        Ok(())
    }

    fn handle_command(&mut self, command: Command) {
        let now = self.now();
        match command {
            Command::Insert { target, reply } => {
                let result = self.engine.insert(now, target).map_err(RepoError::from);
                if let Err(e) = &result {
                    warn!(error = %e, "insert failed");
                }
                let _ = reply.send(result);
            }
            Command::Delete { target, reply } => {
                let result = self.engine.delete(now, target).map_err(RepoError::from);
                let _ = reply.send(result);
            }
            Command::Status { target, reply } => {
                let _ = reply.send(self.engine.status(&target));
            }
            Command::Report { reply } => {
                let _ = reply.send(self.report());
            }
            Command::Shutdown => debug!("shutdown handled by run loop"),
        }
    }

    fn report(&self) -> NodeReport {
        NodeReport {
            creator: self.engine.creator().clone(),
            root: self.engine.root(),
            synchronized: self.engine.is_synchronized(),
            tree: self.engine.tree().seqs(),
            present_objects: self.engine.index().present_count(),
            stats: self.engine.stats().clone(),
        }
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
