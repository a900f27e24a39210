//! Pipelined, in-order fetching of remote creators' actions.
//!
//! For every remote creator the engine tracks three high-water marks:
//! `current` (highest seq applied contiguously), `sending` (highest seq
//! requested) and `final` (highest seq believed to exist). At most `window`
//! fetches run ahead of `current`. Responses may arrive in any order; out of
//! order actions wait in a seq-sorted buffer until the gap before them fills.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::hash::Hash;

use repo_sync_core::{ActionEntry, Name};
use tracing::debug;

use crate::messages::Advertisement;

/// Bounded retry accounting for requests keyed by `K`.
#[derive(Debug, Clone)]
pub struct RetryBudget<K> {
    limit: u32,
    counts: HashMap<K, u32>,
}

impl<K: Eq + Hash> RetryBudget<K> {
    pub fn new(limit: u32) -> Self {
        Self {
            limit,
            counts: HashMap::new(),
        }
    }

    /// Count one more attempt for `key`. Returns `false` once the limit has
    /// been reached; the key is forgotten at that point.
    pub fn try_consume(&mut self, key: K) -> bool {
        let count = self.counts.get(&key).copied().unwrap_or(0);
        if count >= self.limit {
            self.counts.remove(&key);
            return false;
        }
        self.counts.insert(key, count + 1);
        true
    }

    pub fn attempts(&self, key: &K) -> u32 {
        self.counts.get(key).copied().unwrap_or(0)
    }

    pub fn clear(&mut self, key: &K) {
        self.counts.remove(key);
    }

    pub fn retain<F: FnMut(&K) -> bool>(&mut self, mut keep: F) {
        self.counts.retain(|k, _| keep(k));
    }

    pub fn clear_all(&mut self) {
        self.counts.clear();
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }
}

/// Per-creator high-water marks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PipelineState {
    pub current: u64,
    pub sending: u64,
    pub final_seq: u64,
}

#[derive(Debug, Clone, Default)]
struct CreatorPipeline {
    state: PipelineState,
    buffer: BTreeMap<u64, ActionEntry>,
    retransmitted: HashSet<u64>,
}

impl CreatorPipeline {
    fn starting_at(last: u64) -> Self {
        Self {
            state: PipelineState {
                current: last,
                sending: last,
                final_seq: last,
            },
            ..Self::default()
        }
    }

    fn is_idle(&self) -> bool {
        self.state.sending <= self.state.current && self.buffer.is_empty()
    }

    /// Pop every buffered action that is now contiguous with `current`.
    fn drain_ready(&mut self, ready: &mut Vec<ActionEntry>) {
        while let Some(action) = self.buffer.remove(&(self.state.current + 1)) {
            self.state.current += 1;
            ready.push(action);
        }
    }
}

/// What to request after an advertisement.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FetchPlan {
    /// The creator was unknown; the caller must start tracking it.
    pub new_creator: bool,
    /// Sequence numbers to fetch, ascending.
    pub requests: Vec<u64>,
}

/// What happened to a fetched action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Received {
    /// Already applied or already buffered.
    Duplicate,
    /// These actions are now in order and must be applied, followed by the
    /// listed top-up fetches.
    Applied {
        ready: Vec<ActionEntry>,
        requests: Vec<u64>,
    },
    /// Buffered behind a gap; retransmit these missing seqs.
    Buffered { retransmit: Vec<u64> },
}

/// Fetch pipelines for every remote creator.
#[derive(Debug, Clone)]
pub struct FetchPipelines {
    window: u64,
    creators: HashMap<Name, CreatorPipeline>,
    retries: RetryBudget<(Name, u64)>,
}

impl FetchPipelines {
    pub fn new(window: u64, retry_limit: u32) -> Self {
        Self {
            window: window.max(1),
            creators: HashMap::new(),
            retries: RetryBudget::new(retry_limit),
        }
    }

    pub fn state(&self, creator: &Name) -> Option<PipelineState> {
        self.creators.get(creator).map(|p| p.state)
    }

    /// Seqs buffered for `creator`, ascending.
    pub fn buffered(&self, creator: &Name) -> Vec<u64> {
        self.creators
            .get(creator)
            .map(|p| p.buffer.keys().copied().collect())
            .unwrap_or_default()
    }

    /// Whether nothing is in flight or buffered for any creator.
    pub fn is_idle(&self) -> bool {
        self.creators.values().all(CreatorPipeline::is_idle)
    }

    fn pipeline_mut(&mut self, creator: &Name, known_last: u64) -> &mut CreatorPipeline {
        let pipeline = self
            .creators
            .entry(creator.clone())
            .or_insert_with(|| CreatorPipeline::starting_at(known_last));
        pipeline.state.current = pipeline.state.current.max(known_last);
        pipeline.state.sending = pipeline.state.sending.max(pipeline.state.current);
        pipeline
    }

    fn start_new(&mut self, creator: &Name, upto: u64, final_seq: u64) -> FetchPlan {
        let mut pipeline = CreatorPipeline::starting_at(0);
        pipeline.state.final_seq = final_seq;
        pipeline.state.sending = upto;
        self.creators.insert(creator.clone(), pipeline);
        FetchPlan {
            new_creator: true,
            requests: (1..=upto).collect(),
        }
    }

    /// Plan fetches for one entry of a SYNC reply (a diff).
    ///
    /// `known_last` is the tree's last seq for the creator, `None` if the
    /// tree does not know it yet.
    pub fn plan_for_sync(&mut self, ad: &Advertisement, known_last: Option<u64>) -> FetchPlan {
        let window = self.window;
        let Some(last) = known_last else {
            return self.start_new(&ad.creator, window.min(ad.final_seq), ad.final_seq);
        };

        let pipeline = self.pipeline_mut(&ad.creator, last);
        let state = &mut pipeline.state;
        state.final_seq = state.final_seq.max(ad.final_seq);
        if last >= ad.seq || state.sending >= ad.seq {
            return FetchPlan::default();
        }
        if state.sending > state.current {
            // The pipeline in flight will reach this seq on its own.
            return FetchPlan::default();
        }
        let upto = (state.current + window).min(ad.seq);
        let requests = (state.current + 1..=upto).collect();
        state.sending = upto;
        FetchPlan {
            new_creator: false,
            requests,
        }
    }

    /// Plan fetches for one entry of a RECOVERY reply (a full creator table).
    ///
    /// Unlike the SYNC variant this repairs stalled pipelines: missing seqs
    /// below a buffered action, or requests that were abandoned, are asked
    /// for again with a fresh retry budget.
    pub fn plan_for_recovery(&mut self, ad: &Advertisement, known_last: Option<u64>) -> FetchPlan {
        let window = self.window;
        let Some(last) = known_last else {
            return self.start_new(&ad.creator, window.min(ad.seq), ad.final_seq);
        };

        let pipeline = self.pipeline_mut(&ad.creator, last);
        pipeline.state.final_seq = pipeline.state.final_seq.max(ad.final_seq);
        if last >= ad.seq {
            return FetchPlan::default();
        }

        let state = pipeline.state;
        let requests: Vec<u64> = if state.sending <= state.current {
            let upto = (state.current + window).min(state.final_seq);
            pipeline.state.sending = upto;
            (state.current + 1..=upto).collect()
        } else if let Some(&head) = pipeline.buffer.keys().next() {
            (state.current + 1..head).collect()
        } else {
            (state.current + 1..=state.sending).collect()
        };

        for seq in &requests {
            pipeline.retransmitted.remove(seq);
        }
        for seq in &requests {
            self.retries.clear(&(ad.creator.clone(), *seq));
        }
        FetchPlan {
            new_creator: false,
            requests,
        }
    }

    /// Accept a fetched action.
    pub fn on_action(&mut self, action: ActionEntry, known_last: u64) -> Received {
        let creator = action.creator().clone();
        let seq = action.seq();
        let window = self.window;
        self.retries.clear(&(creator.clone(), seq));

        let pipeline = self.pipeline_mut(&creator, known_last);
        pipeline.retransmitted.remove(&seq);
        if seq > pipeline.state.final_seq {
            debug!(%creator, seq, previous = pipeline.state.final_seq, "seq beyond advertised final, advancing");
            pipeline.state.final_seq = seq;
        }

        let current = pipeline.state.current;
        if seq <= current {
            return Received::Duplicate;
        }

        if seq == current + 1 {
            let mut ready = vec![action];
            pipeline.state.current = seq;
            pipeline.drain_ready(&mut ready);

            let state = &mut pipeline.state;
            let upto = (state.current + window).min(state.final_seq);
            let start = state.sending.max(state.current) + 1;
            let requests: Vec<u64> = (start..=upto).collect();
            state.sending = state.sending.max(upto).max(state.current);
            return Received::Applied { ready, requests };
        }

        if pipeline.buffer.contains_key(&seq) {
            return Received::Duplicate;
        }
        pipeline.buffer.insert(seq, action);
        let head = pipeline.buffer.keys().next().copied().unwrap_or(seq);
        let retransmit = (current + 1..head)
            .filter(|s| pipeline.retransmitted.insert(*s))
            .collect();
        pipeline.state.sending = pipeline.state.sending.max(head - 1);
        Received::Buffered { retransmit }
    }

    /// A snapshot says `creator` is at least at `seq`. Returns buffered
    /// actions that became contiguous and must be applied.
    pub fn on_snapshot_seq(&mut self, creator: &Name, seq: u64, known_last: u64) -> Vec<ActionEntry> {
        let pipeline = self.pipeline_mut(creator, known_last);
        let state = &mut pipeline.state;
        state.current = state.current.max(seq);
        state.sending = state.sending.max(seq);
        state.final_seq = state.final_seq.max(seq);

        let current = state.current;
        pipeline.buffer.retain(|s, _| *s > current);
        pipeline.retransmitted.retain(|s| *s > current);
        let mut ready = Vec::new();
        pipeline.drain_ready(&mut ready);

        let current = pipeline.state.current;
        self.retries
            .retain(|(c, s)| c != creator || *s > current);
        ready
    }

    /// Count a fetch attempt for `(creator, seq)`. `false` means the retry
    /// limit is reached and the fetch must be abandoned.
    pub fn try_attempt(&mut self, creator: &Name, seq: u64) -> bool {
        self.retries.try_consume((creator.clone(), seq))
    }

    pub fn attempts(&self, creator: &Name, seq: u64) -> u32 {
        self.retries.attempts(&(creator.clone(), seq))
    }

    /// Forget buffers and retry state after a compaction.
    pub fn reset_after_compaction(&mut self) {
        for pipeline in self.creators.values_mut() {
            pipeline.buffer.clear();
            pipeline.retransmitted.clear();
            pipeline.state.sending = pipeline.state.current;
        }
        self.retries.clear_all();
    }
}
