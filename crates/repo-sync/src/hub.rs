//! In-memory hub connecting [`RepoNode`]s in one process.
//!
//! Every node forwards its transport calls to the hub, which routes them
//! with a [`ContentRouter`]: requests fan out to the other nodes serving a
//! matching prefix, publications satisfy outstanding requests once, and
//! unanswered requests time out after their lifetime.

use std::collections::BTreeMap;
use std::time::Duration;

use repo_sync_core::Name;
use repo_sync_protocol::memory::{ContentRouter, Delivery};
use repo_sync_protocol::SyncConfig;
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, trace};

use crate::error::{RepoError, Result};
use crate::node::{NodeHandle, Outbound, RepoNode};

/// Routes traffic between nodes attached to it.
pub struct MemoryHub {
    router: ContentRouter<Name>,
    nodes: BTreeMap<Name, NodeHandle>,
    outbound_tx: mpsc::UnboundedSender<Outbound>,
    outbound_rx: mpsc::UnboundedReceiver<Outbound>,
    epoch: Instant,
    inbox_capacity: usize,
}

impl MemoryHub {
    pub fn new() -> Self {
        Self::with_inbox_capacity(1024)
    }

    pub fn with_inbox_capacity(inbox_capacity: usize) -> Self {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        Self {
            router: ContentRouter::new(),
            nodes: BTreeMap::new(),
            outbound_tx,
            outbound_rx,
            epoch: Instant::now(),
            inbox_capacity,
        }
    }

    /// Create a node attached to this hub. The caller spawns
    /// [`RepoNode::run`].
    pub fn add_node(&mut self, config: SyncConfig) -> Result<(RepoNode, NodeHandle)> {
        let creator = config.creator_name()?;
        if self.nodes.contains_key(&creator) {
            return Err(RepoError::DuplicateNode(creator.to_uri()));
        }
        let (node, handle) = RepoNode::new(config, self.outbound_tx.clone(), self.inbox_capacity)?;
        self.nodes.insert(creator, handle.clone());
        Ok((node, handle))
    }

    /// Cut or restore a node's link. While down it neither sends nor
    /// receives.
    pub fn set_link(&mut self, node: &Name, up: bool) {
        self.router.set_link(node.clone(), up);
    }

    /// Time since the hub was created.
    pub fn elapsed(&self) -> Duration {
        self.epoch.elapsed()
    }

    /// Route traffic until every node has stopped.
    pub async fn run(self) -> Result<()> {
        let MemoryHub {
            mut router,
            nodes,
            outbound_tx,
            mut outbound_rx,
            epoch,
            ..
        } = self;
        drop(outbound_tx);

        loop {
            let expiry = router.next_expiry().map(|d| epoch + d);
            tokio::select! {
                outbound = outbound_rx.recv() => {
                    let Some(Outbound { from, op }) = outbound else { break };
                    trace!(%from, name = %op.name(), "routing");
                    let deliveries = router.route(epoch.elapsed(), &from, op);
                    dispatch(&nodes, deliveries).await;
                }
                _ = wait_until(expiry) => {
                    let deliveries = router.expire(epoch.elapsed());
                    dispatch(&nodes, deliveries).await;
                }
            }
        }
        debug!("hub stopped");
        Ok(())
    }
}

impl Default for MemoryHub {
    fn default() -> Self {
        Self::new()
    }
}

async fn dispatch(nodes: &BTreeMap<Name, NodeHandle>, deliveries: Vec<Delivery<Name>>) {
    for Delivery { to, event } in deliveries {
        if let Some(handle) = nodes.get(&to) {
            if handle.deliver(event).await.is_err() {
                trace!(node = %to, "dropping event for stopped node");
            }
        }
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use repo_sync_core::ObjectStatus;

    fn n(s: &str) -> Name {
        Name::parse(s).unwrap()
    }

    fn config(creator: &str, seed: u64) -> SyncConfig {
        SyncConfig::for_creator(creator).with_seed(seed)
    }

    async fn wait_for_status(handle: &NodeHandle, target: &Name, expected: ObjectStatus) -> bool {
        for _ in 0..200 {
            if handle.status(target.clone()).await.unwrap() == expected {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        false
    }

    #[tokio::test(start_paused = true)]
    async fn test_two_nodes_converge_through_hub() {
        let mut hub = MemoryHub::new();
        let (node_a, a) = hub.add_node(config("/repo/a", 1)).unwrap();
        let (node_b, b) = hub.add_node(config("/repo/b", 2)).unwrap();
        tokio::spawn(node_a.run());
        tokio::spawn(node_b.run());
        tokio::spawn(hub.run());

        a.insert(n("/x")).await.unwrap();
        b.insert(n("/y")).await.unwrap();

        assert!(wait_for_status(&b, &n("/x"), ObjectStatus::Existed).await);
        assert!(wait_for_status(&a, &n("/y"), ObjectStatus::Existed).await);

        let ra = a.report().await.unwrap();
        let rb = b.report().await.unwrap();
        assert_eq!(ra.root, rb.root);
        assert_eq!(ra.tree, vec![(n("/repo/a"), 1), (n("/repo/b"), 1)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_propagates() {
        let mut hub = MemoryHub::new();
        let (node_a, a) = hub.add_node(config("/repo/a", 3)).unwrap();
        let (node_b, b) = hub.add_node(config("/repo/b", 4)).unwrap();
        tokio::spawn(node_a.run());
        tokio::spawn(node_b.run());
        tokio::spawn(hub.run());

        a.insert(n("/x")).await.unwrap();
        assert!(wait_for_status(&b, &n("/x"), ObjectStatus::Existed).await);
        a.delete(n("/x")).await.unwrap();
        assert!(wait_for_status(&b, &n("/x"), ObjectStatus::Deleted).await);
    }

    #[tokio::test]
    async fn test_duplicate_creator_rejected() {
        let mut hub = MemoryHub::new();
        hub.add_node(config("/repo/a", 1)).unwrap();
        assert!(matches!(
            hub.add_node(config("/repo/a", 2)),
            Err(RepoError::DuplicateNode(_))
        ));
    }
}
