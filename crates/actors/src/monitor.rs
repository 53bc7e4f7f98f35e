use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::ActorError;

/// Counter sink fed by the runtime for one actor identity.
///
/// A monitor survives restarts: the supervisor carries it over to the
/// replacement actor and calls [`ActorMonitor::add_restart`].
pub trait ActorMonitor: Send + Sync + 'static {
	/// A message was consumed by receive.
	fn add_message(&self) {}

	/// A message was skipped by a selective receive and left in the mailbox.
	fn skipped_message(&self) {}

	/// A selective receive started.
	fn reset_skipped(&self) {}

	/// The supervised actor was restarted.
	fn add_restart(&self) {}

	/// The actor died.
	fn add_death(&self, _cause: Option<&ActorError>) {}

	/// The actor is gone for good and no further counts will arrive.
	fn stop(&self) {}

	/// Returns current counter values.
	fn snapshot(&self) -> MonitorSnapshot {
		MonitorSnapshot::default()
	}
}

/// Point-in-time monitor counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MonitorSnapshot {
	pub messages: u64,
	pub skipped: u64,
	pub restarts: u64,
	pub deaths: u64,
	pub last_death: Option<String>,
	pub stopped: bool,
}

/// Builds a monitor for an actor being registered under `name`.
pub type MonitorFactory = Arc<dyn Fn(&str) -> Arc<dyn ActorMonitor> + Send + Sync>;

/// Default in-memory monitor backed by atomics.
#[derive(Debug, Default)]
pub struct CounterMonitor {
	messages: AtomicU64,
	skipped: AtomicU64,
	restarts: AtomicU64,
	deaths: AtomicU64,
	last_death: Mutex<Option<String>>,
	stopped: AtomicBool,
}

impl CounterMonitor {
	pub fn new() -> Self {
		Self::default()
	}

	/// Factory producing a fresh counter monitor per registered actor.
	pub fn factory() -> MonitorFactory {
		Arc::new(|_name: &str| Arc::new(CounterMonitor::new()) as Arc<dyn ActorMonitor>)
	}
}

impl ActorMonitor for CounterMonitor {
	fn add_message(&self) {
		self.messages.fetch_add(1, Ordering::Relaxed);
	}

	fn skipped_message(&self) {
		self.skipped.fetch_add(1, Ordering::Relaxed);
	}

	fn reset_skipped(&self) {
		self.skipped.store(0, Ordering::Relaxed);
	}

	fn add_restart(&self) {
		self.restarts.fetch_add(1, Ordering::Relaxed);
	}

	fn add_death(&self, cause: Option<&ActorError>) {
		self.deaths.fetch_add(1, Ordering::Relaxed);
		*self.last_death.lock() = cause.map(ToString::to_string);
	}

	fn stop(&self) {
		self.stopped.store(true, Ordering::Release);
	}

	fn snapshot(&self) -> MonitorSnapshot {
		MonitorSnapshot {
			messages: self.messages.load(Ordering::Relaxed),
			skipped: self.skipped.load(Ordering::Relaxed),
			restarts: self.restarts.load(Ordering::Relaxed),
			deaths: self.deaths.load(Ordering::Relaxed),
			last_death: self.last_death.lock().clone(),
			stopped: self.stopped.load(Ordering::Acquire),
		}
	}
}
