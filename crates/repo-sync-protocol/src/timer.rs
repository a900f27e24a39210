//! Labeled timer queue.
//!
//! Every timer carries a label. Scheduling under a label that is already
//! pending replaces the earlier instance, so there is never more than one
//! live timer per label. Deadlines are offsets from the owner's epoch.

use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;
use std::time::Duration;

struct Scheduled<E> {
    deadline: Duration,
    id: u64,
    event: E,
}

/// Priority queue of `(label, deadline, event)` entries.
pub struct TimerQueue<L, E> {
    next_id: u64,
    by_deadline: BTreeMap<(Duration, u64), L>,
    by_label: HashMap<L, Scheduled<E>>,
}

impl<L, E> TimerQueue<L, E>
where
    L: Clone + Eq + Hash,
{
    pub fn new() -> Self {
        Self {
            next_id: 0,
            by_deadline: BTreeMap::new(),
            by_label: HashMap::new(),
        }
    }

    /// Schedule `event` at `deadline` under `label`, replacing any pending
    /// timer with the same label. Returns the replaced event.
    pub fn schedule(&mut self, label: L, deadline: Duration, event: E) -> Option<E> {
        let replaced = self.cancel(&label);
        let id = self.next_id;
        self.next_id += 1;
        self.by_deadline.insert((deadline, id), label.clone());
        self.by_label.insert(
            label,
            Scheduled {
                deadline,
                id,
                event,
            },
        );
        replaced
    }

    /// Cancel the timer under `label`, returning its event.
    pub fn cancel(&mut self, label: &L) -> Option<E> {
        let scheduled = self.by_label.remove(label)?;
        self.by_deadline.remove(&(scheduled.deadline, scheduled.id));
        Some(scheduled.event)
    }

    pub fn is_scheduled(&self, label: &L) -> bool {
        self.by_label.contains_key(label)
    }

    /// Deadline of the timer under `label`.
    pub fn deadline(&self, label: &L) -> Option<Duration> {
        self.by_label.get(label).map(|s| s.deadline)
    }

    /// Earliest pending deadline.
    pub fn next_deadline(&self) -> Option<Duration> {
        self.by_deadline.keys().next().map(|(deadline, _)| *deadline)
    }

    /// Pop the earliest timer whose deadline is at or before `now`. Timers
    /// with equal deadlines pop in scheduling order.
    pub fn pop_due(&mut self, now: Duration) -> Option<(L, E)> {
        let (&(deadline, id), _) = self.by_deadline.iter().next()?;
        if deadline > now {
            return None;
        }
        let label = self.by_deadline.remove(&(deadline, id))?;
        let scheduled = self.by_label.remove(&label)?;
        Some((label, scheduled.event))
    }

    pub fn len(&self) -> usize {
        self.by_label.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_label.is_empty()
    }
}

impl<L, E> Default for TimerQueue<L, E>
where
    L: Clone + Eq + Hash,
{
    fn default() -> Self {
        Self::new()
    }
}
