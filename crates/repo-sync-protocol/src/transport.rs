//! Transport abstraction for the sync engine.
//!
//! The engine talks to a pull-based named-content network: it registers the
//! prefixes it serves, expresses requests by name and publishes responses by
//! name. A published response satisfies each outstanding matching request at
//! most once. Everything that comes back (incoming requests, responses,
//! request timeouts) is handed to the engine as an [`Inbound`] event by
//! whoever drives it.
//!
//! The trait is synchronous: implementations queue operations, they never
//! block the engine.

use std::time::Duration;

use bytes::Bytes;
use repo_sync_core::Name;

use crate::error::Result;

/// Outgoing side of the named-content network.
pub trait Transport {
    /// Start receiving requests under `prefix`.
    fn register_prefix(&mut self, prefix: &Name) -> Result<()>;

    /// Express a request that expires after `lifetime`.
    fn request(&mut self, name: Name, lifetime: Duration) -> Result<()>;

    /// Publish a response under `name`.
    fn publish(&mut self, name: Name, payload: Bytes, freshness: Duration) -> Result<()>;
}

/// Events delivered to the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// A peer's request under one of our registered prefixes.
    Request(Name),
    /// A response to one of our requests.
    Response { name: Name, payload: Bytes },
    /// One of our requests expired unanswered.
    Timeout(Name),
}

/// One recorded transport call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportOp {
    Register(Name),
    Request {
        name: Name,
        lifetime: Duration,
    },
    Publish {
        name: Name,
        payload: Bytes,
        freshness: Duration,
    },
}

impl TransportOp {
    pub fn name(&self) -> &Name {
        match self {
            TransportOp::Register(name) => name,
            TransportOp::Request { name, .. } => name,
            TransportOp::Publish { name, .. } => name,
        }
    }
}

/// In-memory transports for tests and simulation.
pub mod memory {
    use super::*;
    use std::collections::{BTreeMap, BTreeSet};

    /// A transport that records every call for the caller to route.
    #[derive(Debug, Default, Clone)]
    pub struct RecordingTransport {
        ops: Vec<TransportOp>,
    }

    impl RecordingTransport {
        pub fn new() -> Self {
            Self::default()
        }

        /// Drain the recorded operations.
        pub fn take(&mut self) -> Vec<TransportOp> {
            std::mem::take(&mut self.ops)
        }

        pub fn ops(&self) -> &[TransportOp] {
            &self.ops
        }

        /// Names of recorded requests, in call order.
        pub fn requests(&self) -> Vec<&Name> {
            self.ops
                .iter()
                .filter_map(|op| match op {
                    TransportOp::Request { name, .. } => Some(name),
                    _ => None,
                })
                .collect()
        }

        /// Recorded publications, in call order.
        pub fn published(&self) -> Vec<(&Name, &Bytes)> {
            self.ops
                .iter()
                .filter_map(|op| match op {
                    TransportOp::Publish { name, payload, .. } => Some((name, payload)),
                    _ => None,
                })
                .collect()
        }

        pub fn clear(&mut self) {
            self.ops.clear();
        }
    }

    impl Transport for RecordingTransport {
        fn register_prefix(&mut self, prefix: &Name) -> Result<()> {
            self.ops.push(TransportOp::Register(prefix.clone()));
            Ok(())
        }

        fn request(&mut self, name: Name, lifetime: Duration) -> Result<()> {
            self.ops.push(TransportOp::Request { name, lifetime });
            Ok(())
        }

        fn publish(&mut self, name: Name, payload: Bytes, freshness: Duration) -> Result<()> {
            self.ops.push(TransportOp::Publish {
                name,
                payload,
                freshness,
            });
            Ok(())
        }
    }

    /// An event routed to one node.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct Delivery<N> {
        pub to: N,
        pub event: Inbound,
    }

    #[derive(Debug, Clone)]
    struct Interest<N> {
        from: N,
        name: Name,
        expires_at: Duration,
    }

    /// Routes recorded operations between nodes of a full mesh.
    ///
    /// Requests go to every other node that registered a matching prefix.
    /// Repeated requests from the same node for the same name share one
    /// outstanding interest (its expiry is refreshed). A publication
    /// satisfies every outstanding interest for exactly that name from other
    /// nodes, once. Nodes whose link is down neither send nor receive.
    /// Responses are not cached.
    #[derive(Debug, Clone)]
    pub struct ContentRouter<N> {
        prefixes: BTreeMap<N, Vec<Name>>,
        interests: Vec<Interest<N>>,
        down: BTreeSet<N>,
    }

    impl<N: Clone + Ord> Default for ContentRouter<N> {
        fn default() -> Self {
            Self {
                prefixes: BTreeMap::new(),
                interests: Vec::new(),
                down: BTreeSet::new(),
            }
        }
    }

    impl<N: Clone + Ord> ContentRouter<N> {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn register(&mut self, node: N, prefix: Name) {
            let prefixes = self.prefixes.entry(node).or_default();
            if !prefixes.contains(&prefix) {
                prefixes.push(prefix);
            }
        }

        pub fn set_link(&mut self, node: N, up: bool) {
            if up {
                self.down.remove(&node);
            } else {
                self.down.insert(node);
            }
        }

        pub fn is_up(&self, node: &N) -> bool {
            !self.down.contains(node)
        }

        /// Route one operation issued by `from` at `now`.
        pub fn route(&mut self, now: Duration, from: &N, op: TransportOp) -> Vec<Delivery<N>> {
            match op {
                TransportOp::Register(prefix) => {
                    self.register(from.clone(), prefix);
                    Vec::new()
                }
                TransportOp::Request { name, lifetime } => self.route_request(now, from, name, lifetime),
                TransportOp::Publish { name, payload, .. } => self.route_publish(from, name, payload),
            }
        }

        fn route_request(
            &mut self,
            now: Duration,
            from: &N,
            name: Name,
            lifetime: Duration,
        ) -> Vec<Delivery<N>> {
            let expires_at = now + lifetime;
            match self
                .interests
                .iter_mut()
                .find(|i| &i.from == from && i.name == name)
            {
                Some(existing) => existing.expires_at = expires_at,
                None => self.interests.push(Interest {
                    from: from.clone(),
                    name: name.clone(),
                    expires_at,
                }),
            }

            if !self.is_up(from) {
                return Vec::new();
            }
            self.prefixes
                .iter()
                .filter(|(node, prefixes)| {
                    *node != from
                        && !self.down.contains(*node)
                        && prefixes.iter().any(|p| p.is_prefix_of(&name))
                })
                .map(|(node, _)| Delivery {
                    to: node.clone(),
                    event: Inbound::Request(name.clone()),
                })
                .collect()
        }

        fn route_publish(&mut self, from: &N, name: Name, payload: Bytes) -> Vec<Delivery<N>> {
            if !self.is_up(from) {
                return Vec::new();
            }
            let mut deliveries = Vec::new();
            let down = &self.down;
            self.interests.retain(|interest| {
                let satisfied =
                    &interest.from != from && interest.name == name && !down.contains(&interest.from);
                if satisfied {
                    deliveries.push(Delivery {
                        to: interest.from.clone(),
                        event: Inbound::Response {
                            name: name.clone(),
                            payload: payload.clone(),
                        },
                    });
                }
                !satisfied
            });
            deliveries
        }

        /// Expire interests whose lifetime ended at or before `now`.
        pub fn expire(&mut self, now: Duration) -> Vec<Delivery<N>> {
            let mut deliveries = Vec::new();
            self.interests.retain(|interest| {
                let expired = interest.expires_at <= now;
                if expired {
                    deliveries.push(Delivery {
                        to: interest.from.clone(),
                        event: Inbound::Timeout(interest.name.clone()),
                    });
                }
                !expired
            });
            deliveries
        }

        /// Earliest interest expiry.
        pub fn next_expiry(&self) -> Option<Duration> {
            self.interests.iter().map(|i| i.expires_at).min()
        }

        pub fn pending_interests(&self) -> usize {
            self.interests.len()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::memory::{ContentRouter, Delivery, RecordingTransport};
    use super::*;

    fn n(s: &str) -> Name {
        Name::parse(s).unwrap()
    }

    fn secs(v: u64) -> Duration {
        Duration::from_secs(v)
    }

    fn router() -> ContentRouter<&'static str> {
        let mut router = ContentRouter::new();
        for node in ["a", "b", "c"] {
            router.register(node, n("/sync"));
        }
        router
    }

    #[test]
    fn test_recording_transport() {
        let mut t = RecordingTransport::new();
        t.register_prefix(&n("/sync")).unwrap();
        t.request(n("/sync/x"), secs(5)).unwrap();
        t.publish(n("/sync/y"), Bytes::from_static(b"p"), secs(1)).unwrap();
        assert_eq!(t.requests(), vec![&n("/sync/x")]);
        assert_eq!(t.published().len(), 1);
        assert_eq!(t.take().len(), 3);
        assert!(t.ops().is_empty());
    }

    #[test]
    fn test_request_broadcast_to_matching_peers() {
        let mut r = router();
        let out = r.route(
            secs(0),
            &"a",
            TransportOp::Request {
                name: n("/sync/d"),
                lifetime: secs(5),
            },
        );
        let targets: Vec<_> = out.iter().map(|d| d.to).collect();
        assert_eq!(targets, vec!["b", "c"]);

        let outside = r.route(
            secs(0),
            &"a",
            TransportOp::Request {
                name: n("/other/x"),
                lifetime: secs(5),
            },
        );
        assert!(outside.is_empty());
    }

    #[test]
    fn test_publish_satisfies_once() {
        let mut r = router();
        r.route(secs(0), &"a", TransportOp::Request { name: n("/sync/d"), lifetime: secs(5) });
        let publish = TransportOp::Publish {
            name: n("/sync/d"),
            payload: Bytes::from_static(b"x"),
            freshness: secs(1),
        };
        let first = r.route(secs(1), &"b", publish.clone());
        assert_eq!(
            first,
            vec![Delivery {
                to: "a",
                event: Inbound::Response {
                    name: n("/sync/d"),
                    payload: Bytes::from_static(b"x")
                }
            }]
        );
        assert!(r.route(secs(1), &"c", publish).is_empty());
    }

    #[test]
    fn test_aggregation_and_timeout() {
        let mut r = router();
        let req = TransportOp::Request {
            name: n("/sync/d"),
            lifetime: secs(5),
        };
        r.route(secs(0), &"a", req.clone());
        r.route(secs(2), &"a", req);
        assert_eq!(r.pending_interests(), 1);
        assert_eq!(r.next_expiry(), Some(secs(7)));
        assert!(r.expire(secs(6)).is_empty());
        let timeouts = r.expire(secs(7));
        assert_eq!(timeouts[0].event, Inbound::Timeout(n("/sync/d")));
    }

    #[test]
    fn test_down_link_isolates_node() {
        let mut r = router();
        r.set_link("c", false);
        let out = r.route(secs(0), &"a", TransportOp::Request { name: n("/sync/d"), lifetime: secs(5) });
        assert_eq!(out.len(), 1);

        let out = r.route(secs(0), &"c", TransportOp::Request { name: n("/sync/e"), lifetime: secs(5) });
        assert!(out.is_empty());
        r.set_link("c", true);
        assert!(r.is_up(&"c"));
    }
}
