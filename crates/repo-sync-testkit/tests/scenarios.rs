//! End-to-end scenarios over the simulated mesh.

use std::time::Duration;

use repo_sync_core::{ActionEntry, ActionKind, ActionName, Name, ObjectStatus};
use repo_sync_protocol::memory::RecordingTransport;
use repo_sync_protocol::{Inbound, SyncEngine, SyncMessage, SyncRequest, TransportOp};
use repo_sync_store::{empty_root, Snapshot};
use repo_sync_testkit::fixtures::{config, mesh, ms, name, secs};
use repo_sync_testkit::Simulation;

fn prefix() -> Name {
    name("/ndn/broadcast")
}

fn sync_name(digest: repo_sync_core::DigestValue) -> Name {
    SyncRequest::Sync(digest).to_name(&prefix()).unwrap()
}

fn fetch_name(creator: &str, seq: u64) -> Name {
    SyncRequest::Fetch {
        creator: name(creator),
        seq,
    }
    .to_name(&prefix())
    .unwrap()
}

/// Decoded sync-prefix publications from `from`, starting at history index `since`.
fn published_by(sim: &Simulation, from: &Name, since: usize) -> Vec<(Name, SyncMessage)> {
    sim.history()[since..]
        .iter()
        .filter(|r| &r.from == from && !r.dropped)
        .filter_map(|r| match &r.op {
            TransportOp::Publish { name, payload, .. } if prefix().is_prefix_of(name) => {
                Some((name.clone(), SyncMessage::decode(payload).unwrap()))
            }
            _ => None,
        })
        .collect()
}

fn fetch_requests(sim: &Simulation) -> usize {
    sim.history()
        .iter()
        .filter(|r| matches!(&r.op, TransportOp::Request { name, .. } if name.to_uri().contains("/fetch/")))
        .count()
}

#[test]
fn scenario_a_empty_nodes_agree_without_fetching() {
    let (mut sim, nodes) = mesh(2);
    sim.run_until(secs(5)).unwrap();

    for node in &nodes {
        let engine = sim.node(node).unwrap();
        assert!(engine.is_synchronized(), "{node} not synchronized");
        assert_eq!(engine.root(), empty_root());
    }
    assert_eq!(fetch_requests(&sim), 0);

    sim.run_until(secs(30)).unwrap();
    for node in &nodes {
        let engine = sim.node(node).unwrap();
        assert!(engine.stats().compactions >= 1);
        assert!(engine.snapshot().objects.is_empty());
    }
    assert_eq!(fetch_requests(&sim), 0);
}

#[test]
fn scenario_b_insert_propagates_through_diff_and_fetch() {
    let (mut sim, nodes) = mesh(2);
    let (a, b) = (&nodes[0], &nodes[1]);

    let action = sim.insert(a, name("/x")).unwrap();
    assert_eq!(action.seq(), 1);

    let replies = published_by(&sim, a, 0);
    assert!(replies.contains(&(
        sync_name(empty_root()),
        SyncMessage::ActionNames(vec![ActionName::new(a.clone(), 1)])
    )));
    assert!(sim
        .requests_from(b, &prefix())
        .contains(&&fetch_name("/repo/a", 1)));

    let node_b = sim.node(b).unwrap();
    assert_eq!(node_b.status(&name("/x")), ObjectStatus::Existed);
    assert_eq!(node_b.last_seq(a), 1);
    assert_eq!(node_b.root(), sim.node(a).unwrap().root());
    assert_eq!(node_b.stats().content_received, 1);
    assert_eq!(sim.node(a).unwrap().stats().content_served, 1);
    assert!(sim.converged());
}

#[test]
fn scenario_c_history_is_replayed_in_order() {
    let (mut sim, nodes) = mesh(2);
    let (a, b) = (nodes[0].clone(), nodes[1].clone());

    sim.set_link(&b, false);
    sim.insert(&a, name("/x")).unwrap();
    sim.delete(&a, name("/x")).unwrap();
    sim.set_link(&b, true);

    let second = fetch_name("/repo/a", 2);
    let mut dropped = false;
    sim.set_drop_filter(move |_, op| {
        let hit = !dropped && matches!(op, TransportOp::Publish { name, .. } if name == &second);
        dropped |= hit;
        hit
    });

    let mut seen_existed = false;
    while sim.now() < secs(60) {
        sim.step().unwrap();
        let node_b = sim.node(&b).unwrap();
        match node_b.status(&name("/x")) {
            ObjectStatus::Existed => {
                assert_eq!(node_b.last_seq(&a), 1);
                seen_existed = true;
            }
            ObjectStatus::Deleted => {
                assert_eq!(node_b.last_seq(&a), 2);
                break;
            }
            other => assert_eq!(other, ObjectStatus::None),
        }
    }
    assert!(seen_existed, "seq 1 was never applied on its own");
    assert_eq!(sim.node(&b).unwrap().status(&name("/x")), ObjectStatus::Deleted);

    let first_reply = published_by(&sim, &a, 0)
        .into_iter()
        .find(|(n, _)| n == &fetch_name("/repo/a", 1))
        .map(|(_, m)| m);
    match first_reply {
        Some(SyncMessage::Action(action)) => {
            assert_eq!(action.kind(), ActionKind::Insert);
            assert_eq!(action.target(), &name("/x"));
        }
        other => panic!("unexpected reply {other:?}"),
    }
}

#[test]
fn scenario_d_late_joiner_receives_snapshot() {
    let (mut sim, nodes) = mesh(2);
    let a = nodes[0].clone();
    sim.insert(&a, name("/x")).unwrap();
    sim.insert(&a, name("/y")).unwrap();
    sim.run_until(secs(60)).unwrap();

    let node_a = sim.node(&a).unwrap();
    assert!(node_a.stats().compactions >= 1);
    assert_eq!(node_a.tree().lookup(&a).unwrap().first_snapshot_seq, 2);
    assert!(node_a.log().is_empty());

    let mark = sim.history().len();
    let c = sim.add_node(config("/repo/c", 3)).unwrap();
    let converged = sim.run_until_converged(secs(180)).unwrap();
    assert!(converged.is_some(), "late joiner never converged");

    let node_c = sim.node(&c).unwrap();
    assert_eq!(node_c.last_seq(&a), 2);
    assert_eq!(node_c.status(&name("/x")), ObjectStatus::Existed);
    assert_eq!(node_c.status(&name("/y")), ObjectStatus::Existed);
    assert!(node_c.stats().snapshots_merged >= 1);
    assert_eq!(node_c.stats().actions_applied, 0);

    let mut compacted_replies = 0;
    for (publisher, _) in sim.roots() {
        for (reply_name, message) in published_by(&sim, &publisher, mark) {
            if let Ok(SyncRequest::Fetch { creator, seq }) = SyncRequest::parse(&prefix(), &reply_name) {
                if creator == a && seq <= 2 {
                    compacted_replies += 1;
                    assert!(
                        matches!(message, SyncMessage::Snapshot(_)),
                        "compacted seq {seq} answered with {message:?}"
                    );
                }
            }
        }
    }
    assert!(compacted_replies > 0);
}

fn engine(creator: &str) -> SyncEngine<RecordingTransport> {
    let mut engine = SyncEngine::new(config(creator, 9), RecordingTransport::new()).unwrap();
    engine.start(Duration::ZERO).unwrap();
    engine
}

fn remote(seq: u64, target: &str) -> ActionEntry {
    ActionEntry::new(name("/repo/a"), seq, ActionKind::Insert, name(target), 1)
}

fn respond(engine: &mut SyncEngine<RecordingTransport>, at: Duration, to: Name, message: SyncMessage) {
    let payload = message.encode().unwrap();
    engine
        .deliver(at, Inbound::Response { name: to, payload })
        .unwrap();
}

#[test]
fn scenario_e_abandoned_fetch_stalls_until_snapshot() {
    let a = name("/repo/a");
    let mut b = engine("/repo/b");

    let names = (1..=3).map(|seq| ActionName::new(a.clone(), seq)).collect();
    respond(&mut b, ms(10), sync_name(empty_root()), SyncMessage::ActionNames(names));
    respond(&mut b, ms(20), fetch_name("/repo/a", 1), SyncMessage::Action(remote(1, "/o/1")));
    assert_eq!(b.last_seq(&a), 1);

    let gap = fetch_name("/repo/a", 2);
    for i in 0..4 {
        b.deliver(ms(5_000 * (i + 1)), Inbound::Timeout(gap.clone())).unwrap();
    }
    let sent = b.transport().requests().into_iter().filter(|n| **n == gap).count();
    assert_eq!(sent, 4);
    assert_eq!(b.stats().fetches_abandoned, 1);
    assert_eq!(b.pipeline(&a).unwrap().current, 1);
    assert_eq!(b.last_seq(&a), 1);

    let snapshot = Snapshot {
        creator: a.clone(),
        version: 1,
        objects: vec![
            (name("/o/1"), ObjectStatus::Existed),
            (name("/o/2"), ObjectStatus::Existed),
            (name("/o/3"), ObjectStatus::Existed),
        ],
        tree: vec![(a.clone(), 3)],
    };
    respond(&mut b, ms(30_000), fetch_name("/repo/a", 3), SyncMessage::Snapshot(snapshot));
    assert_eq!(b.last_seq(&a), 3);
    assert_eq!(b.pipeline(&a).unwrap().current, 3);
    assert_eq!(b.status(&name("/o/2")), ObjectStatus::Existed);
}

#[test]
fn three_nodes_with_concurrent_writers_converge() {
    let (mut sim, nodes) = mesh(3);
    for (i, node) in nodes.iter().enumerate() {
        for j in 0..3 {
            sim.insert(node, name(&format!("/own/{i}/{j}"))).unwrap();
        }
    }
    sim.delete(&nodes[1], name("/own/1/0")).unwrap();

    let converged = sim.run_until_converged(secs(120)).unwrap();
    assert!(converged.is_some(), "{:?}", sim.verify());
    for (_, engine) in sim.nodes() {
        assert_eq!(engine.status(&name("/own/1/0")), ObjectStatus::Deleted);
        assert_eq!(engine.index().present_count(), 8);
        for node in &nodes {
            let expected = if node == &nodes[1] { 4 } else { 3 };
            assert_eq!(engine.last_seq(node), expected);
        }
    }
}

#[test]
fn partitioned_node_catches_up_after_heal() {
    let (mut sim, nodes) = mesh(2);
    let (a, b) = (nodes[0].clone(), nodes[1].clone());
    sim.set_link(&b, false);
    for i in 0..20 {
        sim.insert(&a, name(&format!("/batch/{i}"))).unwrap();
        sim.run_for(ms(250)).unwrap();
    }
    assert_eq!(sim.node(&b).unwrap().last_seq(&a), 0);

    sim.set_link(&b, true);
    let deadline = sim.now() + secs(120);
    assert!(sim.run_until_converged(deadline).unwrap().is_some());
    assert_eq!(sim.node(&b).unwrap().index().present_count(), 20);
}
