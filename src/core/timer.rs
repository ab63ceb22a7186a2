// src/core/timer.rs

//! Timer wheel of the single-threaded reactor.
//!
//! Handlers arm timers with `add` and get back a handle suitable for
//! `cancel`; cancellation is lazy (the heap entry is skipped when it
//! surfaces). Zero-delay timers are the uniform mechanism for "call me back
//! on the next tick" continuations.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::time::{Duration, Instant};

use crate::core::events::Recallee;
use crate::core::model::{CompId, SiaId, SgId};

/// Opaque handle returned by `TimerWheel::add`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerHandle(pub u64);

/// Work scheduled for a later (possibly immediate) reactor tick.
#[derive(Debug, Clone, PartialEq)]
pub enum TimerKind {
    ClusterStartup,
    CompInstantiate(CompId),
    CompCleanup(CompId),
    HealthcheckPeriod(CompId, String),
    HealthcheckDuration(CompId, String),
    /// Deferred continuation: a requested SI HA state that needed no
    /// component round-trip is confirmed on the next tick.
    HaStateAssumed(SiaId),
    /// Deferred continuation: no dependent workload needed deactivation.
    DependentsDeactivated(SgId),
    /// Drain one entry of an entity's deferred FIFO.
    RecallDeferred(Recallee),
}

#[derive(Debug)]
pub struct TimerWheel {
    heap: BinaryHeap<Reverse<(Instant, u64)>>,
    entries: HashMap<u64, TimerKind>,
    next_id: u64,
}

impl Default for TimerWheel {
    fn default() -> Self {
        Self::new()
    }
}

impl TimerWheel {
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            entries: HashMap::new(),
            next_id: 1,
        }
    }

    /// Arms a timer; `Duration::ZERO` schedules for the next tick.
    pub fn add(&mut self, delay: Duration, kind: TimerKind) -> TimerHandle {
        let id = self.next_id;
        self.next_id += 1;
        self.entries.insert(id, kind);
        self.heap.push(Reverse((Instant::now() + delay, id)));
        TimerHandle(id)
    }

    /// Cancels a pending timer. Returns whether it was still pending.
    pub fn cancel(&mut self, handle: TimerHandle) -> bool {
        self.entries.remove(&handle.0).is_some()
    }

    /// The deadline of the earliest still-armed timer.
    pub fn next_deadline(&mut self) -> Option<Instant> {
        while let Some(Reverse((deadline, id))) = self.heap.peek().copied() {
            if self.entries.contains_key(&id) {
                return Some(deadline);
            }
            self.heap.pop();
        }
        None
    }

    /// Pops the earliest timer whose deadline has passed.
    pub fn pop_due(&mut self, now: Instant) -> Option<(TimerHandle, TimerKind)> {
        while let Some(Reverse((deadline, id))) = self.heap.peek().copied() {
            if !self.entries.contains_key(&id) {
                self.heap.pop();
                continue;
            }
            if deadline > now {
                return None;
            }
            self.heap.pop();
            let kind = self.entries.remove(&id)?;
            return Some((TimerHandle(id), kind));
        }
        None
    }

    pub fn pending(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_delay_timer_is_immediately_due() {
        let mut wheel = TimerWheel::new();
        wheel.add(Duration::ZERO, TimerKind::ClusterStartup);
        let (_, kind) = wheel.pop_due(Instant::now()).unwrap();
        assert_eq!(kind, TimerKind::ClusterStartup);
        assert!(wheel.pop_due(Instant::now()).is_none());
    }

    #[test]
    fn cancelled_timer_never_fires() {
        let mut wheel = TimerWheel::new();
        let h = wheel.add(Duration::ZERO, TimerKind::ClusterStartup);
        assert!(wheel.cancel(h));
        assert!(!wheel.cancel(h));
        assert!(wheel.pop_due(Instant::now()).is_none());
        assert_eq!(wheel.pending(), 0);
    }

    #[test]
    fn timers_fire_in_deadline_order() {
        let mut wheel = TimerWheel::new();
        wheel.add(Duration::from_secs(60), TimerKind::ClusterStartup);
        wheel.add(Duration::ZERO, TimerKind::CompInstantiate(CompId(0)));
        let (_, kind) = wheel.pop_due(Instant::now()).unwrap();
        assert_eq!(kind, TimerKind::CompInstantiate(CompId(0)));
        // The far-future timer is not due yet.
        assert!(wheel.pop_due(Instant::now()).is_none());
        assert_eq!(wheel.pending(), 1);
    }
}
