//! Monotonic simulated time and the priority queue of future timed events.
//!
//! Grounded on the event-ordering discipline of the teacher's
//! `engine::Event`/`Merger` (same `Ord`-by-time-then-tiebreak idiom), but
//! this is a plain single-threaded priority queue: the kernel described by
//! this crate has exactly one writer (the maestro), so there is no need for
//! the teacher's cross-thread merge machinery here.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// A point in simulated time, in seconds.
pub type Time = f64;

/// Opaque handle to a scheduled event, returned by [`EventSet::schedule`]
/// and accepted by [`EventSet::cancel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventHandle(u64);

struct TimedEvent {
    date: Time,
    seq: u64,
    callback: Option<Box<dyn FnOnce()>>,
}

impl TimedEvent {
    fn is_cancelled(&self) -> bool {
        self.callback.is_none()
    }
}

impl Ord for TimedEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; we want the smallest date (and, for a
        // tie, the smallest sequence number, i.e. insertion order) first.
        other
            .date
            .partial_cmp(&self.date)
            .unwrap_or(Ordering::Equal)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}
impl PartialOrd for TimedEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl PartialEq for TimedEvent {
    fn eq(&self, other: &Self) -> bool {
        self.date == other.date && self.seq == other.seq
    }
}
impl Eq for TimedEvent {}

/// Monotonic simulated clock plus its event queue.
///
/// Only the maestro ever advances the clock or pops due events; actors
/// observe `now()` but never mutate it.
pub struct EventSet {
    now: Time,
    heap: BinaryHeap<TimedEvent>,
    next_seq: u64,
}

impl Default for EventSet {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSet {
    /// Builds an event set with the clock at time zero.
    pub fn new() -> EventSet {
        EventSet {
            now: 0.0,
            heap: BinaryHeap::new(),
            next_seq: 0,
        }
    }

    /// The current simulated time.
    pub fn now(&self) -> Time {
        self.now
    }

    /// Schedules `callback` to fire at `date`. `date` may be in the past
    /// relative to `now()`, in which case it fires on the very next
    /// `pop_due` call — firing order for events with the same date is
    /// insertion order.
    pub fn schedule(&mut self, date: Time, callback: impl FnOnce() + 'static) -> EventHandle {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(TimedEvent {
            date,
            seq,
            callback: Some(Box::new(callback)),
        });
        EventHandle(seq)
    }

    /// Cancels a previously scheduled event. A no-op if it already fired or
    /// was already cancelled.
    pub fn cancel(&mut self, handle: EventHandle) {
        // BinaryHeap has no arbitrary-removal API; tombstone it instead and
        // let pop_due skip it when it surfaces.
        for event in self.heap.iter_mut() {
            // `iter_mut` on BinaryHeap does exist precisely for in-place
            // mutation that doesn't change the ordering key (`date`/`seq`
            // stay untouched; only the payload is cleared).
            if event.seq == handle.0 {
                event.callback = None;
                return;
            }
        }
    }

    /// The date of the next pending (non-cancelled) event, or `+inf` if
    /// none remain.
    pub fn next_due(&self) -> Time {
        self.heap
            .iter()
            .filter(|e| !e.is_cancelled())
            .map(|e| e.date)
            .fold(Time::INFINITY, Time::min)
    }

    /// Advances the clock to `min(now, date)` for every event due at or
    /// before `date`, firing each callback exactly once, in date order
    /// (ties broken by insertion order). Callbacks scheduled by a firing
    /// callback for a date `<= date` are processed within the same pass.
    pub fn pop_due(&mut self, date: Time) {
        while let Some(top) = self.heap.peek() {
            if top.date > date {
                break;
            }
            let event = self.heap.pop().expect("just peeked");
            if let Some(callback) = event.callback {
                self.now = event.date.max(self.now);
                callback();
            }
        }
        self.now = self.now.max(date);
    }

    /// True if no events remain pending.
    pub fn is_empty(&self) -> bool {
        self.heap.iter().all(|e| e.is_cancelled())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn fires_in_date_order() {
        let order = Rc::new(RefCell::new(Vec::new()));
        let mut events = EventSet::new();

        let o = order.clone();
        events.schedule(2.0, move || o.borrow_mut().push(2));
        let o = order.clone();
        events.schedule(1.0, move || o.borrow_mut().push(1));
        let o = order.clone();
        events.schedule(1.0, move || o.borrow_mut().push(10)); // same date, later insert

        events.pop_due(10.0);
        assert_eq!(*order.borrow(), vec![1, 10, 2]);
        assert_eq!(events.now(), 2.0);
    }

    #[test]
    fn cancel_is_skipped() {
        let order = Rc::new(RefCell::new(Vec::new()));
        let mut events = EventSet::new();

        let o = order.clone();
        let h = events.schedule(1.0, move || o.borrow_mut().push(1));
        let o = order.clone();
        events.schedule(2.0, move || o.borrow_mut().push(2));

        events.cancel(h);
        events.pop_due(10.0);
        assert_eq!(*order.borrow(), vec![2]);
    }

    #[test]
    fn reentrant_schedule_same_pass() {
        let order = Rc::new(RefCell::new(Vec::new()));
        let mut events = EventSet::new();

        let o = order.clone();
        let events_ptr: *mut EventSet = &mut events;
        events.schedule(1.0, move || {
            o.borrow_mut().push(1);
            // SAFETY: test-only re-entrant insert into the same EventSet,
            // standing in for a callback that mutates kernel state used by
            // a later schedule() call in the same maestro pass.
            let events = unsafe { &mut *events_ptr };
            let o2 = o.clone();
            events.schedule(1.5, move || o2.borrow_mut().push(2));
        });

        events.pop_due(10.0);
        assert_eq!(*order.borrow(), vec![1, 2]);
    }

    #[test]
    fn clock_monotonic_across_passes() {
        let mut events = EventSet::new();
        events.schedule(5.0, || {});
        events.pop_due(5.0);
        assert_eq!(events.now(), 5.0);
        events.pop_due(3.0); // should not move time backwards
        assert_eq!(events.now(), 5.0);
    }
}
