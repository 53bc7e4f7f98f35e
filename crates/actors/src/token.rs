use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Runtime-unique actor identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ActorId(u64);

impl ActorId {
	/// Returns the raw id value.
	pub const fn get(self) -> u64 {
		self.0
	}
}

impl fmt::Display for ActorId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "#{}", self.0)
	}
}

/// Identity of one watch installed with [`crate::ActorContext::watch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WatchId(u64);

/// Correlation id of one request/reply exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(u64);

impl fmt::Display for RequestId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "req-{}", self.0)
	}
}

/// Monotonic id source shared by everything spawned from one runtime.
#[derive(Debug, Default, Clone)]
pub(crate) struct IdClock {
	next: Arc<AtomicU64>,
}

impl IdClock {
	pub fn new() -> Self {
		Self::default()
	}

	fn next(&self) -> u64 {
		self.next.fetch_add(1, Ordering::AcqRel).wrapping_add(1)
	}

	pub fn actor(&self) -> ActorId {
		ActorId(self.next())
	}

	pub fn watch(&self) -> WatchId {
		WatchId(self.next())
	}

	pub fn request(&self) -> RequestId {
		RequestId(self.next())
	}
}
