use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::ActorError;

/// Terminal state of an actor as seen by joiners.
enum CompletionState {
	/// Actor has not died yet.
	Running,
	/// Actor died; `None` is a natural death.
	Done(Option<ActorError>),
}

/// Join coordination for one actor.
///
/// Written exactly once by the death routine. Any number of joiners may wait
/// concurrently, each with or without a deadline.
pub(crate) struct Completion {
	state: Mutex<CompletionState>,
	done: Notify,
}

impl Completion {
	pub(crate) fn new() -> Self {
		Self {
			state: Mutex::new(CompletionState::Running),
			done: Notify::new(),
		}
	}

	/// Records the death cause. Returns false if already completed.
	pub(crate) fn finish(&self, cause: Option<ActorError>) -> bool {
		let mut st = self.state.lock();
		if matches!(*st, CompletionState::Done(_)) {
			return false;
		}
		*st = CompletionState::Done(cause);
		drop(st);
		self.done.notify_waiters();
		true
	}

	pub(crate) fn is_done(&self) -> bool {
		matches!(*self.state.lock(), CompletionState::Done(_))
	}

	/// Returns the death outcome once complete.
	pub(crate) fn outcome(&self) -> Option<Result<(), ActorError>> {
		match &*self.state.lock() {
			CompletionState::Running => None,
			CompletionState::Done(None) => Some(Ok(())),
			CompletionState::Done(Some(cause)) => Some(Err(cause.clone())),
		}
	}

	/// Waits for the actor to die. Multiple callers are safe.
	pub(crate) async fn join_forever(&self) -> Result<(), ActorError> {
		loop {
			// Create Notified before checking state so a finish() in between is not lost.
			let notified = self.done.notified();
			if let Some(outcome) = self.outcome() {
				return outcome;
			}
			notified.await;
		}
	}

	/// Waits with a deadline. Returns `None` if the actor is still alive at the deadline.
	pub(crate) async fn join_with_timeout(&self, timeout: Duration) -> Option<Result<(), ActorError>> {
		let deadline = tokio::time::Instant::now() + timeout;
		loop {
			let notified = self.done.notified();
			if let Some(outcome) = self.outcome() {
				return Some(outcome);
			}
			tokio::select! {
				_ = notified => continue,
				_ = tokio::time::sleep_until(deadline) => return self.outcome(),
			}
		}
	}
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests {
	use std::sync::Arc;

	use super::*;
	use crate::Execution;
	use crate::spawn::spawn_task;

	#[tokio::test]
	async fn concurrent_joiners_all_observe_cause() {
		let completion = Arc::new(Completion::new());
		let mut joiners = Vec::new();
		for _ in 0..4 {
			let completion = Arc::clone(&completion);
			joiners.push(spawn_task(Execution::Task, async move { completion.join_forever().await }));
		}
		tokio::time::sleep(Duration::from_millis(10)).await;
		assert!(completion.finish(Some(ActorError::msg("boom"))));

		for joiner in joiners {
			let outcome = joiner.await.unwrap();
			assert_eq!(outcome.unwrap_err().to_string(), "boom");
		}
	}

	#[tokio::test]
	async fn finish_is_single_fire() {
		let completion = Completion::new();
		assert!(completion.finish(None));
		assert!(!completion.finish(Some(ActorError::Interrupted)));
		assert!(matches!(completion.outcome(), Some(Ok(()))));
	}

	#[tokio::test]
	async fn join_with_timeout_expires_while_running() {
		let completion = Completion::new();
		assert!(completion.join_with_timeout(Duration::from_millis(20)).await.is_none());
		assert!(!completion.is_done());
	}
}
