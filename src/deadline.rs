//! Wall-clock budgets for subprocess work.
//!
//! A [`Deadline`] is an optional cutoff instant. `Deadline::none()` means
//! "wait forever" and keeps the happy path free of timer bookkeeping.

use std::time::{Duration, Instant};

#[derive(Clone, Copy, Debug)]
pub struct Deadline {
    cutoff: Option<Instant>,
}

impl Deadline {
    pub fn none() -> Self {
        Self { cutoff: None }
    }

    pub fn after(budget: Duration) -> Self {
        Self { cutoff: Some(Instant::now() + budget) }
    }

    /// Budget scaled by the amount of work. `per_item` of zero disables the
    /// deadline entirely, items of zero still gets one unit so a degenerate
    /// call cannot produce an instant timeout.
    pub fn per_item(per_item: Duration, items: usize) -> Self {
        if per_item.is_zero() {
            return Self::none();
        }
        let units = u32::try_from(items.max(1)).unwrap_or(u32::MAX);
        Self::after(per_item * units)
    }

    pub fn expired(&self) -> bool {
        match self.cutoff {
            Some(cutoff) => Instant::now() >= cutoff,
            None => false,
        }
    }

    /// Time left on the budget. `None` means unbounded.
    pub fn remaining(&self) -> Option<Duration> {
        self.cutoff.map(|cutoff| cutoff.saturating_duration_since(Instant::now()))
    }
}
