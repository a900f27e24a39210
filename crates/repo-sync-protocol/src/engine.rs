//! The sync engine.
//!
//! A synchronous state machine owning one repository's tree, logs, object
//! index, fetch pipelines and timers. It never blocks and never reads a
//! clock: the driver hands it the current time (an offset from the node's
//! epoch) with every call, feeds it [`Inbound`] events, and calls
//! [`SyncEngine::fire_timers`] when [`SyncEngine::next_deadline`] passes.
//!
//! ## Agreement state
//!
//! The node is `Synchronized` while peers keep asking with our own root.
//! Staying there for `compaction_hold` compacts the action log into a
//! snapshot. Any other SYNC digest, any FETCH or RECOVERY request, or any
//! change of our own root drops back to `Diverged` and cancels compaction.

use std::time::Duration;

use bytes::Bytes;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, info, trace, warn};

use repo_sync_core::{ActionEntry, ActionKind, ActionName, DigestValue, Name, ObjectStatus, SnapshotMerge};
use repo_sync_store::{
    ActionLog, DigestLog, ObjectIndex, SeenSnapshots, Snapshot, SnapshotKey, SyncTree,
};

use crate::config::SyncConfig;
use crate::error::{Result, SyncError};
use crate::fetch::{FetchPipelines, FetchPlan, PipelineState, Received, RetryBudget};
use crate::messages::{advertisements, SyncMessage};
use crate::namespace::SyncRequest;
use crate::pending::PendingRequestTable;
use crate::timer::TimerQueue;
use crate::transport::{Inbound, Transport};

/// Whether peers currently agree with our root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgreementState {
    Diverged,
    Synchronized,
}

/// Timer identities. Scheduling under a live label replaces it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TimerLabel {
    Heartbeat,
    Compaction,
    /// Delayed re-evaluation of a SYNC with an unrecognised digest.
    UnknownDigest(DigestValue),
    Recovery,
    ForgetSnapshot(SnapshotKey),
    TombstonePurge,
}

#[derive(Debug, Clone)]
enum TimerEvent {
    Heartbeat,
    Compaction,
    UnknownDigest { name: Name, digest: DigestValue },
    Recovery(DigestValue),
    ForgetSnapshot(SnapshotKey),
    TombstonePurge,
}

/// Counters for everything the engine sends, applies and drops.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineStats {
    pub syncs_sent: u64,
    pub sync_replies_sent: u64,
    pub fetches_sent: u64,
    pub fetch_replies_sent: u64,
    pub snapshots_sent: u64,
    pub recoveries_sent: u64,
    pub recovery_replies_sent: u64,
    pub local_actions: u64,
    pub actions_applied: u64,
    pub duplicates: u64,
    pub snapshots_merged: u64,
    pub content_requests: u64,
    pub content_received: u64,
    pub content_served: u64,
    pub fetches_abandoned: u64,
    pub content_abandoned: u64,
    pub malformed_dropped: u64,
    pub compactions: u64,
    pub tombstones_purged: u64,
}

/// One repository's sync state machine.
pub struct SyncEngine<T: Transport> {
    config: SyncConfig,
    creator: Name,
    sync_prefix: Name,
    data_prefix: Name,
    transport: T,
    rng: StdRng,

    tree: SyncTree,
    log: ActionLog,
    digests: DigestLog,
    index: ObjectIndex,
    snapshot: Snapshot,
    seen_snapshots: SeenSnapshots,

    pipelines: FetchPipelines,
    content_retries: RetryBudget<Name>,
    pending: PendingRequestTable,
    timers: TimerQueue<TimerLabel, TimerEvent>,

    state: AgreementState,
    outstanding_sync: Option<Name>,
    recovery_backoff: Duration,
    stats: EngineStats,
}

impl<T: Transport> SyncEngine<T> {
    /// Build an engine. Nothing is sent until [`SyncEngine::start`].
    pub fn new(config: SyncConfig, transport: T) -> Result<Self> {
        config.validate()?;
        let creator = config.creator_name()?;
        let sync_prefix = config.sync_prefix_name()?;
        let data_prefix = config.data_prefix_name()?;
        let rng = match config.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let tree = SyncTree::new();
        let index = ObjectIndex::new();
        let root = tree.root();
        let mut digests = DigestLog::new(config.digest_history_limit);
        digests.push(root);
        let snapshot = Snapshot::capture(creator.clone(), 0, &index, &tree);

        Ok(Self {
            pipelines: FetchPipelines::new(config.pipeline_window, config.fetch_retry_limit),
            content_retries: RetryBudget::new(config.fetch_retry_limit),
            pending: PendingRequestTable::new(config.pending_lifetime),
            recovery_backoff: config.recovery_backoff_start,
            log: ActionLog::new(root),
            seen_snapshots: SeenSnapshots::new(),
            timers: TimerQueue::new(),
            state: AgreementState::Diverged,
            outstanding_sync: None,
            stats: EngineStats::default(),
            creator,
            sync_prefix,
            data_prefix,
            transport,
            rng,
            tree,
            digests,
            index,
            snapshot,
            config,
        })
    }

    /// Register prefixes, send the first SYNC and arm periodic timers.
    pub fn start(&mut self, now: Duration) -> Result<()> {
        self.transport.register_prefix(&self.sync_prefix)?;
        self.transport.register_prefix(&self.data_prefix)?;
        if let Some(interval) = self.config.tombstone_purge_interval {
            self.timers
                .schedule(TimerLabel::TombstonePurge, now + interval, TimerEvent::TombstonePurge);
        }
        info!(creator = %self.creator, root = %self.tree.root(), "sync engine started");
        self.send_sync(now)
    }

    // ------------------------------------------------------------------
    // Local mutations
    // ------------------------------------------------------------------

    /// Record a local insert of `target`.
    pub fn insert(&mut self, now: Duration, target: Name) -> Result<ActionEntry> {
        self.local_action(now, target, ActionKind::Insert)
    }

    /// Record a local delete of `target`.
    pub fn delete(&mut self, now: Duration, target: Name) -> Result<ActionEntry> {
        if !self.config.model_deletions {
            return Err(SyncError::DeletionDisabled);
        }
        self.local_action(now, target, ActionKind::Delete)
    }

    fn local_action(&mut self, now: Duration, target: Name, kind: ActionKind) -> Result<ActionEntry> {
        let seq = self.tree.last_seq(&self.creator) + 1;
        let version = self.index.next_version(&target, kind);
        let action = ActionEntry::local(self.creator.clone(), target, kind, seq, version);

        if let Some(root) = self.tree.update(&self.creator, seq) {
            self.log.push(root, action.clone());
            self.digests.push(root);
        }
        let change = self.index.apply(&action, self.config.model_deletions);
        self.stats.local_actions += 1;
        debug!(
            creator = %self.creator,
            seq,
            ?kind,
            target = %action.target(),
            status = %change.after,
            "local action"
        );
        self.on_root_changed(now)?;
        Ok(action)
    }

    // ------------------------------------------------------------------
    // Inbound events
    // ------------------------------------------------------------------

    /// Process one transport event.
    pub fn deliver(&mut self, now: Duration, inbound: Inbound) -> Result<()> {
        self.pending.expire(now);
        match inbound {
            Inbound::Request(name) => self.on_request(now, name),
            Inbound::Response { name, payload } => self.on_response(now, name, payload),
            Inbound::Timeout(name) => self.on_timeout(name),
        }
    }

    fn on_request(&mut self, now: Duration, name: Name) -> Result<()> {
        if self.data_prefix.is_prefix_of(&name) {
            return self.serve_content(name);
        }
        if !self.sync_prefix.is_prefix_of(&name) {
            trace!(%name, "request outside served prefixes");
            return Ok(());
        }
        match SyncRequest::parse(&self.sync_prefix, &name) {
            Ok(SyncRequest::Sync(digest)) => self.on_sync_request(now, name, digest, false),
            Ok(SyncRequest::Fetch { creator, seq }) => self.on_fetch_request(name, &creator, seq),
            Ok(SyncRequest::Recovery(digest)) => self.on_recovery_request(name, digest),
            Err(e) => {
                debug!(%name, error = %e, "dropping request");
                self.stats.malformed_dropped += 1;
                Ok(())
            }
        }
    }

    fn on_sync_request(
        &mut self,
        now: Duration,
        name: Name,
        digest: DigestValue,
        delayed: bool,
    ) -> Result<()> {
        let root = self.tree.root();
        if digest == root {
            if self.state != AgreementState::Synchronized {
                self.state = AgreementState::Synchronized;
                self.timers.schedule(
                    TimerLabel::Compaction,
                    now + self.config.compaction_hold,
                    TimerEvent::Compaction,
                );
                debug!(creator = %self.creator, %root, "synchronized");
            }
            self.pending.insert(now, name, digest, false);
            return Ok(());
        }

        self.diverge();

        if let Some(diff) = self.log.diff_since(&digest) {
            let names: Vec<ActionName> = diff.iter().map(|r| r.action.action_name()).collect();
            if names.is_empty() {
                // Nothing to tell yet; answer once our root moves.
                self.pending.insert(now, name, digest, false);
                return Ok(());
            }
            self.pending.remove(&name);
            trace!(%name, actions = names.len(), "replying with diff");
            self.publish_message(name.clone(), &SyncMessage::ActionNames(names))?;
            self.stats.sync_replies_sent += 1;
            if self.outstanding_sync.as_ref() == Some(&name) {
                self.send_sync(now)?;
            }
            return Ok(());
        }

        if !delayed {
            self.pending.insert(now, name.clone(), digest, true);
            let wait = self.config.unknown_digest_wait.sample(&mut self.rng);
            self.timers.schedule(
                TimerLabel::UnknownDigest(digest),
                now + wait,
                TimerEvent::UnknownDigest { name, digest },
            );
            trace!(%digest, ?wait, "unknown digest, waiting");
            return Ok(());
        }

        if self.pending.remove(&name).is_none() {
            trace!(%name, "unknown-digest request already answered or expired");
            return Ok(());
        }
        self.recovery_backoff = self.config.recovery_backoff_start;
        self.send_recovery(now, digest)
    }

    fn on_fetch_request(&mut self, name: Name, creator: &Name, seq: u64) -> Result<()> {
        self.diverge();
        let compacted = self
            .tree
            .lookup(creator)
            .is_some_and(|entry| entry.is_compacted(seq));
        if compacted {
            trace!(%creator, seq, version = self.snapshot.version, "serving snapshot");
            let message = SyncMessage::Snapshot(self.snapshot.clone());
            self.publish_message(name, &message)?;
            self.stats.snapshots_sent += 1;
            return Ok(());
        }
        match self.log.find_by_action_name(creator, seq) {
            Some(action) => {
                let message = SyncMessage::Action(action.clone());
                self.publish_message(name, &message)?;
                self.stats.fetch_replies_sent += 1;
            }
            None => debug!(%creator, seq, "no record for fetch"),
        }
        Ok(())
    }

    fn on_recovery_request(&mut self, name: Name, digest: DigestValue) -> Result<()> {
        self.diverge();
        if !self.digests.contains(&digest) && !self.log.contains_digest(&digest) {
            trace!(%digest, "recovery for unknown digest ignored");
            return Ok(());
        }
        let names: Vec<ActionName> = self
            .tree
            .iter()
            .filter(|(_, entry)| entry.last_seq > 0)
            .map(|(creator, entry)| ActionName::new(creator.clone(), entry.last_seq))
            .collect();
        debug!(%digest, creators = names.len(), "replying to recovery");
        self.publish_message(name, &SyncMessage::ActionNames(names))?;
        self.stats.recovery_replies_sent += 1;
        Ok(())
    }

    fn serve_content(&mut self, name: Name) -> Result<()> {
        let target = name.sub_name(self.data_prefix.len(), name.len());
        if !self.index.status(&target).is_present() {
            return Ok(());
        }
        let payload = Bytes::from(target.to_uri());
        self.transport
            .publish(name, payload, self.config.response_freshness)?;
        self.stats.content_served += 1;
        Ok(())
    }

    fn on_response(&mut self, now: Duration, name: Name, payload: Bytes) -> Result<()> {
        if self.data_prefix.is_prefix_of(&name) {
            self.content_retries.clear(&name);
            self.stats.content_received += 1;
            return Ok(());
        }
        let request = match SyncRequest::parse(&self.sync_prefix, &name) {
            Ok(request) => request,
            Err(e) => {
                debug!(%name, error = %e, "response to unknown request");
                return Ok(());
            }
        };
        let message = match SyncMessage::decode(&payload) {
            Ok(message) => message,
            Err(e) => {
                warn!(%name, error = %e, "dropping malformed response");
                self.stats.malformed_dropped += 1;
                return Ok(());
            }
        };
        match request {
            SyncRequest::Sync(_) => self.on_sync_response(now, name, message),
            SyncRequest::Recovery(_) => self.on_recovery_response(now, name, message),
            SyncRequest::Fetch { .. } => self.on_fetch_response(now, message),
        }
    }

    fn on_sync_response(&mut self, now: Duration, name: Name, message: SyncMessage) -> Result<()> {
        self.pending.remove(&name);
        let kind = message.message_type();
        let SyncMessage::ActionNames(names) = message else {
            let e = SyncError::UnexpectedMessage(format!("{kind:?} answering {name}"));
            debug!(error = %e, "ignoring sync response");
            return Ok(());
        };
        for ad in advertisements(&names, &self.creator) {
            let known = self.tree.lookup(&ad.creator).map(|e| e.last_seq);
            let plan = self.pipelines.plan_for_sync(&ad, known);
            self.execute_plan(now, &ad.creator, plan)?;
        }
        if self.outstanding_sync.as_ref() == Some(&name) {
            self.timers.schedule(
                TimerLabel::Heartbeat,
                now + self.config.heartbeat,
                TimerEvent::Heartbeat,
            );
        }
        Ok(())
    }

    fn on_recovery_response(&mut self, now: Duration, name: Name, message: SyncMessage) -> Result<()> {
        self.timers.cancel(&TimerLabel::Recovery);
        self.pending.remove(&name);
        let SyncMessage::ActionNames(names) = message else {
            debug!(%name, "recovery answered with a non-name message");
            return Ok(());
        };
        for ad in advertisements(&names, &self.creator) {
            let known = self.tree.lookup(&ad.creator).map(|e| e.last_seq);
            let plan = self.pipelines.plan_for_recovery(&ad, known);
            self.execute_plan(now, &ad.creator, plan)?;
        }
        Ok(())
    }

    fn on_fetch_response(&mut self, now: Duration, message: SyncMessage) -> Result<()> {
        match message {
            SyncMessage::Action(action) => self.on_fetched_action(now, action),
            SyncMessage::Snapshot(snapshot) => self.merge_snapshot(now, snapshot),
            SyncMessage::ActionNames(_) => {
                debug!("fetch answered with an action-name list");
                Ok(())
            }
        }
    }

    fn on_fetched_action(&mut self, now: Duration, action: ActionEntry) -> Result<()> {
        let creator = action.creator().clone();
        if creator == self.creator {
            trace!(seq = action.seq(), "skipping own action");
            return Ok(());
        }
        let last = self.tree.last_seq(&creator);
        match self.pipelines.on_action(action, last) {
            Received::Duplicate => self.stats.duplicates += 1,
            Received::Buffered { retransmit } => {
                for seq in retransmit {
                    self.send_fetch(&creator, seq)?;
                }
            }
            Received::Applied { ready, requests } => {
                for action in ready {
                    self.apply_remote(now, action)?;
                }
                for seq in requests {
                    self.send_fetch(&creator, seq)?;
                }
                self.after_data(now)?;
            }
        }
        Ok(())
    }

    fn on_timeout(&mut self, name: Name) -> Result<()> {
        if self.data_prefix.is_prefix_of(&name) {
            return self.request_content(name);
        }
        match SyncRequest::parse(&self.sync_prefix, &name) {
            Ok(SyncRequest::Fetch { creator, seq }) => {
                if self.tree.last_seq(&creator) >= seq {
                    return Ok(());
                }
                trace!(%creator, seq, "fetch timed out, retrying");
                self.send_fetch(&creator, seq)
            }
            // Peers retry on their own heartbeat; the recovery timer handles recovery.
            Ok(_) => Ok(()),
            Err(e) => {
                debug!(%name, error = %e, "timeout for unknown request");
                Ok(())
            }
        }
    }

    // ------------------------------------------------------------------
    // Applying remote state
    // ------------------------------------------------------------------

    fn execute_plan(&mut self, now: Duration, creator: &Name, plan: FetchPlan) -> Result<()> {
        if plan.new_creator && self.tree.add_node(creator) {
            debug!(%creator, "tracking new creator");
            self.digests.push(self.tree.root());
            self.on_root_changed(now)?;
        }
        for seq in plan.requests {
            self.send_fetch(creator, seq)?;
        }
        Ok(())
    }

    fn apply_remote(&mut self, now: Duration, action: ActionEntry) -> Result<()> {
        let Some(root) = self.tree.update(action.creator(), action.seq()) else {
            self.stats.duplicates += 1;
            return Ok(());
        };
        self.digests.push(root);
        let change = self.index.apply(&action, self.config.model_deletions);
        trace!(
            creator = %action.creator(),
            seq = action.seq(),
            target = %action.target(),
            before = %change.before,
            after = %change.after,
            "applied action"
        );
        if action.kind() == ActionKind::Insert && change.changed() && change.after.is_present() {
            let name = self.content_name(action.target());
            self.request_content(name)?;
        }
        self.log.push(root, action);
        self.stats.actions_applied += 1;
        self.on_root_changed(now)
    }

    fn merge_snapshot(&mut self, now: Duration, snapshot: Snapshot) -> Result<()> {
        if snapshot.creator == self.creator {
            return Ok(());
        }
        let key = snapshot.key();
        if !self.seen_snapshots.insert(key.clone()) {
            trace!(creator = %key.creator, version = key.version, "snapshot already merged");
            return Ok(());
        }
        self.timers.schedule(
            TimerLabel::ForgetSnapshot(key.clone()),
            now + self.config.snapshot_memory,
            TimerEvent::ForgetSnapshot(key),
        );
        self.stats.snapshots_merged += 1;
        debug!(
            from = %snapshot.creator,
            version = snapshot.version,
            objects = snapshot.objects.len(),
            creators = snapshot.tree.len(),
            "merging snapshot"
        );

        for (name, incoming) in &snapshot.objects {
            match self.index.merge(name, *incoming) {
                SnapshotMerge::Fetch(_) => {
                    let content = self.content_name(name);
                    self.request_content(content)?;
                }
                SnapshotMerge::MarkDeleted => trace!(%name, "tombstoned from snapshot"),
                SnapshotMerge::Keep => {}
            }
        }

        let mut root_changed = false;
        for (creator, seq) in &snapshot.tree {
            if creator == &self.creator {
                continue;
            }
            let last = self.tree.last_seq(creator);
            let ready = self.pipelines.on_snapshot_seq(creator, *seq, last);
            if let Some(root) = self.tree.update(creator, *seq) {
                self.digests.push(root);
                root_changed = true;
            }
            for action in ready {
                self.apply_remote(now, action)?;
            }
        }
        if root_changed {
            self.on_root_changed(now)?;
        }
        self.after_data(now)
    }

    /// Our root moved: leave agreement and answer parked SYNC requests that
    /// can now be answered.
    fn on_root_changed(&mut self, now: Duration) -> Result<()> {
        self.diverge();
        let root = self.tree.root();
        let log = &self.log;
        let ready = self
            .pending
            .take_where(now, |p| !p.unknown || p.digest == root || log.contains_digest(&p.digest));
        for request in ready {
            self.on_sync_request(now, request.name, request.digest, false)?;
        }
        Ok(())
    }

    /// After applying fetched data, re-issue our SYNC at once if every
    /// pipeline has drained and the live SYNC names an old root.
    fn after_data(&mut self, now: Duration) -> Result<()> {
        if !self.pipelines.is_idle() {
            return Ok(());
        }
        let current = SyncRequest::Sync(self.tree.root()).to_name(&self.sync_prefix)?;
        if self.outstanding_sync.as_ref() != Some(&current) {
            self.send_sync(now)?;
        }
        Ok(())
    }

    fn diverge(&mut self) {
        if self.state == AgreementState::Synchronized {
            debug!(creator = %self.creator, "diverged");
        }
        self.state = AgreementState::Diverged;
        self.timers.cancel(&TimerLabel::Compaction);
    }

    // ------------------------------------------------------------------
    // Outgoing requests
    // ------------------------------------------------------------------

    fn send_sync(&mut self, now: Duration) -> Result<()> {
        let name = SyncRequest::Sync(self.tree.root()).to_name(&self.sync_prefix)?;
        self.transport
            .request(name.clone(), self.config.request_lifetime)?;
        self.outstanding_sync = Some(name);
        self.stats.syncs_sent += 1;
        let jitter = self.config.heartbeat_jitter.sample(&mut self.rng);
        self.timers.schedule(
            TimerLabel::Heartbeat,
            now + self.config.heartbeat + jitter,
            TimerEvent::Heartbeat,
        );
        Ok(())
    }

    fn send_fetch(&mut self, creator: &Name, seq: u64) -> Result<()> {
        let name = SyncRequest::Fetch {
            creator: creator.clone(),
            seq,
        }
        .to_name(&self.sync_prefix)?;
        if !self.pipelines.try_attempt(creator, seq) {
            let e = SyncError::FetchRetryExhausted {
                name: name.to_uri(),
                attempts: self.config.fetch_retry_limit,
            };
            warn!(error = %e, "abandoning fetch");
            self.stats.fetches_abandoned += 1;
            return Ok(());
        }
        self.transport.request(name, self.config.request_lifetime)?;
        self.stats.fetches_sent += 1;
        Ok(())
    }

    fn send_recovery(&mut self, now: Duration, digest: DigestValue) -> Result<()> {
        let name = SyncRequest::Recovery(digest).to_name(&self.sync_prefix)?;
        if self.recovery_backoff < self.config.recovery_backoff_cap {
            let jitter = self.config.recovery_jitter.sample(&mut self.rng);
            self.timers.schedule(
                TimerLabel::Recovery,
                now + self.recovery_backoff + jitter,
                TimerEvent::Recovery(digest),
            );
            self.recovery_backoff *= 2;
        } else {
            self.timers.cancel(&TimerLabel::Recovery);
        }
        debug!(%digest, backoff = ?self.recovery_backoff, "sending recovery");
        self.transport.request(name, self.config.request_lifetime)?;
        self.stats.recoveries_sent += 1;
        Ok(())
    }

    fn content_name(&self, target: &Name) -> Name {
        self.data_prefix.clone().join(target)
    }

    fn request_content(&mut self, name: Name) -> Result<()> {
        if !self.content_retries.try_consume(name.clone()) {
            warn!(%name, attempts = self.config.fetch_retry_limit, "abandoning content request");
            self.stats.content_abandoned += 1;
            return Ok(());
        }
        self.transport.request(name, self.config.request_lifetime)?;
        self.stats.content_requests += 1;
        Ok(())
    }

    fn publish_message(&mut self, name: Name, message: &SyncMessage) -> Result<()> {
        let payload = message.encode()?;
        self.transport
            .publish(name, payload, self.config.response_freshness)
    }

    // ------------------------------------------------------------------
    // Timers
    // ------------------------------------------------------------------

    /// Earliest timer deadline.
    pub fn next_deadline(&self) -> Option<Duration> {
        self.timers.next_deadline()
    }

    pub fn has_timer(&self, label: &TimerLabel) -> bool {
        self.timers.is_scheduled(label)
    }

    /// Deadline of the timer under `label`.
    pub fn timer_deadline(&self, label: &TimerLabel) -> Option<Duration> {
        self.timers.deadline(label)
    }

    /// Run every timer due at or before `now`.
    pub fn fire_timers(&mut self, now: Duration) -> Result<()> {
        while let Some((_, event)) = self.timers.pop_due(now) {
            match event {
                TimerEvent::Heartbeat => self.send_sync(now)?,
                TimerEvent::Compaction => self.compact(),
                TimerEvent::UnknownDigest { name, digest } => {
                    self.on_sync_request(now, name, digest, true)?
                }
                TimerEvent::Recovery(digest) => self.send_recovery(now, digest)?,
                TimerEvent::ForgetSnapshot(key) => self.seen_snapshots.forget(&key),
                TimerEvent::TombstonePurge => {
                    let purged = self.index.purge_tombstones();
                    self.stats.tombstones_purged += purged as u64;
                    if let Some(interval) = self.config.tombstone_purge_interval {
                        self.timers.schedule(
                            TimerLabel::TombstonePurge,
                            now + interval,
                            TimerEvent::TombstonePurge,
                        );
                    }
                }
            }
        }
        Ok(())
    }

    /// Collapse the action log into a fresh snapshot.
    fn compact(&mut self) {
        let root = self.tree.root();
        self.log.reset(root);
        let version = self.snapshot.version + 1;
        self.snapshot = Snapshot::capture(self.creator.clone(), version, &self.index, &self.tree);
        self.tree.update_for_snapshot();
        self.pipelines.reset_after_compaction();
        self.content_retries.clear_all();
        self.stats.compactions += 1;
        info!(creator = %self.creator, version, %root, "compacted action log");
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub fn creator(&self) -> &Name {
        &self.creator
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn root(&self) -> DigestValue {
        self.tree.root()
    }

    pub fn status(&self, target: &Name) -> ObjectStatus {
        self.index.status(target)
    }

    pub fn last_seq(&self, creator: &Name) -> u64 {
        self.tree.last_seq(creator)
    }

    pub fn tree(&self) -> &SyncTree {
        &self.tree
    }

    pub fn index(&self) -> &ObjectIndex {
        &self.index
    }

    pub fn log(&self) -> &ActionLog {
        &self.log
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    pub fn state(&self) -> AgreementState {
        self.state
    }

    pub fn is_synchronized(&self) -> bool {
        self.state == AgreementState::Synchronized
    }

    pub fn pipeline(&self, creator: &Name) -> Option<PipelineState> {
        self.pipelines.state(creator)
    }

    /// Name of the live own SYNC request.
    pub fn outstanding_sync(&self) -> Option<&Name> {
        self.outstanding_sync.as_ref()
    }

    pub fn pending_requests(&self) -> usize {
        self.pending.len()
    }

    pub fn stats(&self) -> &EngineStats {
        &self.stats
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }
}
