//! Application timers fired by the tick loop.
//!
//! Due timers fire earliest deadline first; equal deadlines fire in
//! registration order. A periodic timer is re-armed as soon as it returns,
//! with a deadline past the current tick, so it fires at most once per tick
//! and can still be cancelled by a later callback.

use super::context::ServiceContext;
use crate::error::Result;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::fmt;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

impl fmt::Display for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "timer-{}", self.0)
    }
}

pub type TimerCallback = Box<dyn FnMut(&mut ServiceContext<'_>) -> Result<()> + Send>;

pub(crate) struct TimerEntry {
    pub(crate) id: TimerId,
    pub(crate) deadline: Instant,
    pub(crate) period: Option<Duration>,
    pub(crate) callback: TimerCallback,
}

#[derive(Default)]
pub(crate) struct TimerQueue {
    // Stale heap keys (cancelled or re-armed timers) are skipped on pop.
    heap: BinaryHeap<Reverse<(Instant, TimerId)>>,
    entries: HashMap<TimerId, TimerEntry>,
    next_id: u64,
    firing: Option<TimerId>,
    firing_cancelled: bool,
}

impl TimerQueue {
    pub(crate) fn schedule(
        &mut self,
        delay: Duration,
        period: Option<Duration>,
        callback: TimerCallback,
    ) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id += 1;
        let entry = TimerEntry {
            id,
            deadline: Instant::now() + delay,
            period,
            callback,
        };
        self.insert(entry);
        id
    }

    fn insert(&mut self, entry: TimerEntry) {
        self.heap.push(Reverse((entry.deadline, entry.id)));
        self.entries.insert(entry.id, entry);
    }

    /// Cancel a pending timer, or the one currently firing.
    pub(crate) fn cancel(&mut self, id: TimerId) -> bool {
        if self.firing == Some(id) {
            self.firing_cancelled = true;
            return true;
        }
        self.entries.remove(&id).is_some()
    }

    /// Take the earliest timer due at `now` and mark it as firing.
    pub(crate) fn pop_due(&mut self, now: Instant) -> Option<TimerEntry> {
        while let Some(Reverse((deadline, id))) = self.heap.peek().copied() {
            if deadline > now {
                return None;
            }
            self.heap.pop();
            let live = self
                .entries
                .get(&id)
                .is_some_and(|entry| entry.deadline == deadline);
            if live {
                self.firing = Some(id);
                self.firing_cancelled = false;
                return self.entries.remove(&id);
            }
        }
        None
    }

    /// Finish the firing timer, re-arming it if periodic and not cancelled.
    ///
    /// The next deadline follows the previous one, skipping missed periods,
    /// and always lies after `now`.
    pub(crate) fn finish(&mut self, mut entry: TimerEntry, now: Instant) {
        let cancelled = self.firing_cancelled;
        self.firing = None;
        self.firing_cancelled = false;
        let Some(period) = entry.period.filter(|_| !cancelled) else {
            return;
        };
        let period = period.max(Duration::from_micros(1));
        entry.deadline += period;
        if entry.deadline <= now {
            entry.deadline = now + period;
        }
        self.insert(entry);
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn clear(&mut self) {
        self.heap.clear();
        self.entries.clear();
    }
}
