use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Timestamps of the most recent restarts of one child.
///
/// Holds at most `max_restarts + 1` entries, which is enough to tell
/// whether the budget inside any window was exceeded.
#[derive(Debug, Clone)]
pub(crate) struct RestartHistory {
	stamps: VecDeque<Instant>,
	capacity: usize,
}

impl RestartHistory {
	pub(crate) fn new(max_restarts: usize) -> Self {
		let capacity = max_restarts.saturating_add(1);
		Self {
			stamps: VecDeque::with_capacity(capacity),
			capacity,
		}
	}

	pub(crate) fn record(&mut self, now: Instant) {
		if self.stamps.len() == self.capacity {
			self.stamps.pop_front();
		}
		self.stamps.push_back(now);
	}

	/// Restarts recorded in `[now - window, now]`.
	pub(crate) fn count_within(&self, now: Instant, window: Duration) -> usize {
		match now.checked_sub(window) {
			Some(start) => self.stamps.iter().filter(|stamp| **stamp >= start).count(),
			None => self.stamps.len(),
		}
	}
}
