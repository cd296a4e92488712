use std::time::{Duration, Instant};

/// Single-shot timer that coalesces a burst of triggers into one firing.
///
/// Arming while already armed keeps the existing deadline, so a steady
/// stream of triggers still fires once per interval.
#[derive(Debug, Clone)]
pub struct SortDebouncer {
    interval: Duration,
    deadline: Option<Instant>,
}

impl SortDebouncer {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            deadline: None,
        }
    }

    pub fn arm(&mut self, now: Instant) {
        if self.deadline.is_none() {
            self.deadline = Some(now + self.interval);
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    /// Disarms and returns `true` once the deadline has passed.
    pub fn fire_if_due(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }
}
