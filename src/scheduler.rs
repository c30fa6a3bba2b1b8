//! One-shot wake-ups for every running timer.
//!
//! Each running timer owns at most one live [`TickToken`]. Stopping a timer
//! drops its token, which turns the queued wake-up into a stale entry that
//! is discarded when it comes due instead of being removed from the heap.

use std::{
    cmp::Reverse,
    collections::BinaryHeap,
    time::{Duration, Instant},
};

use crate::timer::{Timer, TimerId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TickToken(u64);

/// A scheduled tick. `due` is the logical target of the tick, not the time
/// it ends up firing at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Wakeup {
    pub due: Instant,
    // tokens are handed out in arming order, so equal deadlines fire in the
    // order they were armed
    pub token: TickToken,
    pub timer_id: TimerId,
}

#[derive(Debug, Default)]
pub struct Scheduler {
    queue: BinaryHeap<Reverse<Wakeup>>,
    next_token: u64,
}

impl Scheduler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the next tick of a running timer, replacing any tick it
    /// already had. Returns the delay until the tick is due.
    ///
    /// The target is always `last_target + interval`, so late ticks don't
    /// push the following ones back.
    pub fn arm(&mut self, timer: &mut Timer, now: Instant) -> Duration {
        let last_target = *timer.last_target.get_or_insert(now);
        let due = last_target + timer.interval();
        let token = TickToken(self.next_token);
        self.next_token += 1;
        timer.pending = Some(token);
        self.queue.push(Reverse(Wakeup {
            due,
            token,
            timer_id: timer.id,
        }));
        let delay = due.saturating_duration_since(now);
        log::trace!("timer {} armed, due in {delay:?}", timer.id);
        delay
    }

    /// Earliest queued deadline, stale entries included.
    #[must_use]
    pub fn next_due(&self) -> Option<Instant> {
        self.queue.peek().map(|Reverse(wakeup)| wakeup.due)
    }

    /// Pop the earliest wake-up if it is due at `now`.
    pub fn pop_due(&mut self, now: Instant) -> Option<Wakeup> {
        match self.queue.peek() {
            Some(Reverse(wakeup)) if wakeup.due <= now => {
                self.queue.pop().map(|Reverse(wakeup)| wakeup)
            }
            _ => None,
        }
    }

    /// Whether a wake-up still belongs to the timer it was armed for.
    #[must_use]
    pub fn is_live(wakeup: &Wakeup, timer: &Timer) -> bool {
        timer.running && timer.pending == Some(wakeup.token)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Drop every queued wake-up.
    pub fn clear(&mut self) {
        self.queue.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timer::TimerConfig;

    fn running(id: TimerId, interval_ms: u64, now: Instant) -> Timer {
        let mut timer = Timer::new(id, TimerConfig::new(interval_ms));
        timer.start(now).unwrap();
        timer
    }

    #[test]
    fn arm_targets_previous_target_not_now() {
        let start = Instant::now();
        let mut scheduler = Scheduler::new();
        let mut timer = running(1, 1_000, start);
        // firing late doesn't move the next target
        let late = start + Duration::from_millis(1_250);
        timer.last_target = Some(start + Duration::from_millis(1_000));
        let delay = scheduler.arm(&mut timer, late);
        assert_eq!(delay, Duration::from_millis(750));
        assert_eq!(scheduler.next_due(), Some(start + Duration::from_millis(2_000)));
    }

    #[test]
    fn overdue_arms_with_zero_delay() {
        let start = Instant::now();
        let mut scheduler = Scheduler::new();
        let mut timer = running(1, 100, start);
        let delay = scheduler.arm(&mut timer, start + Duration::from_millis(500));
        assert_eq!(delay, Duration::ZERO);
        assert!(scheduler.pop_due(start + Duration::from_millis(500)).is_some());
    }

    #[test]
    fn pops_in_deadline_then_arming_order() {
        let start = Instant::now();
        let mut scheduler = Scheduler::new();
        let mut a = running(1, 200, start);
        let mut b = running(2, 100, start);
        let mut c = running(3, 100, start);
        scheduler.arm(&mut a, start);
        scheduler.arm(&mut b, start);
        scheduler.arm(&mut c, start);

        assert!(scheduler.pop_due(start + Duration::from_millis(99)).is_none());
        let now = start + Duration::from_millis(200);
        let order: Vec<_> = std::iter::from_fn(|| scheduler.pop_due(now))
            .map(|w| w.timer_id)
            .collect();
        assert_eq!(order, vec![2, 3, 1]);
        assert!(scheduler.is_empty());
    }

    #[test]
    fn stopping_makes_wakeup_stale() {
        let start = Instant::now();
        let mut scheduler = Scheduler::new();
        let mut timer = running(1, 100, start);
        scheduler.arm(&mut timer, start);
        timer.stop();
        let wakeup = scheduler.pop_due(start + Duration::from_millis(100)).unwrap();
        assert!(!Scheduler::is_live(&wakeup, &timer));
    }

    #[test]
    fn rearming_invalidates_previous_token() {
        let start = Instant::now();
        let mut scheduler = Scheduler::new();
        let mut timer = running(1, 100, start);
        scheduler.arm(&mut timer, start);
        scheduler.arm(&mut timer, start);
        let now = start + Duration::from_millis(100);
        let first = scheduler.pop_due(now).unwrap();
        let second = scheduler.pop_due(now).unwrap();
        assert!(!Scheduler::is_live(&first, &timer));
        assert!(Scheduler::is_live(&second, &timer));
    }
}
