//! Cancellable fixed-cadence poll schedule.
//!
//! The viewer has two callback sources: the render frame and one poll timer
//! per connected vehicle. Instead of a fire-and-forget periodic task, each
//! vehicle owns a `PollTimer` that the driver asks "which polls are due at
//! time `now`?". Cancelling the timer is deterministic: a cancelled timer
//! never reports another poll.
//!
//! ```text
//! t:     0    100   200   300   400 ms
//! poll:  |     |     |     |     |
//! frame: | | | | | | | | | | | | | |   (any number of frames per poll)
//! ```

use std::time::Duration;
use tracing::debug;

/// Ticks this far behind are dropped and the schedule restarts from `now`.
const MAX_BACKLOG: u32 = 10;

#[derive(Debug, Clone)]
pub struct PollTimer {
    interval: Duration,
    next_due: Duration,
    active: bool,
    fired: u64,
}

impl PollTimer {
    /// Starts a schedule whose first tick is due at `now + interval`.
    pub fn new(interval: Duration, now: Duration) -> Self {
        let interval = interval.max(Duration::from_millis(1));
        Self {
            interval,
            next_due: now + interval,
            active: true,
            fired: 0,
        }
    }

    /// Consumes one due tick. Call in a loop to drain every tick that is
    /// due at `now`.
    pub fn take_due(&mut self, now: Duration) -> bool {
        if !self.active || now < self.next_due {
            return false;
        }

        let behind = now.saturating_sub(self.next_due);
        if behind > self.interval * MAX_BACKLOG {
            debug!(
                "Poll schedule {:?} behind, resynchronising",
                behind
            );
            self.next_due = now + self.interval;
        } else {
            self.next_due += self.interval;
        }

        self.fired += 1;
        true
    }

    pub fn cancel(&mut self) {
        self.active = false;
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn next_due(&self) -> Duration {
        self.next_due
    }

    /// Number of ticks consumed so far.
    pub fn fired_count(&self) -> u64 {
        self.fired
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    fn drain(timer: &mut PollTimer, now: Duration) -> u32 {
        let mut n = 0;
        while timer.take_due(now) {
            n += 1;
        }
        n
    }

    #[test]
    fn test_multiple_ticks_between_frames() {
        let mut timer = PollTimer::new(ms(100), ms(0));

        assert_eq!(drain(&mut timer, ms(50)), 0);
        assert_eq!(drain(&mut timer, ms(100)), 1);
        assert_eq!(drain(&mut timer, ms(350)), 2);
        assert_eq!(timer.next_due(), ms(400));
        assert_eq!(timer.fired_count(), 3);
    }

    #[test]
    fn test_cancel_is_final() {
        let mut timer = PollTimer::new(ms(100), ms(0));
        timer.cancel();

        assert!(!timer.is_active());
        assert_eq!(drain(&mut timer, ms(10_000)), 0);
    }

    #[test]
    fn test_long_stall_resynchronises() {
        let mut timer = PollTimer::new(ms(100), ms(0));

        // One tick for the stall instead of a burst of 50
        assert_eq!(drain(&mut timer, ms(5_000)), 1);
        assert_eq!(timer.next_due(), ms(5_100));
    }
}
