use std::sync::Arc;

use parking_lot::Mutex;

/// Replacement provider consulted at behavior checkpoints.
///
/// Returning `Some` swaps the running value for the new one while the
/// actor keeps its identity and mailbox. `current` is mutable so state can
/// be moved into the replacement.
pub trait Upgrade<T>: Send + Sync + 'static {
	fn upgrade(&self, current: &mut T) -> Option<T>;
}

impl<T, U: Upgrade<T> + ?Sized> Upgrade<T> for Arc<U> {
	fn upgrade(&self, current: &mut T) -> Option<T> {
		(**self).upgrade(current)
	}
}

type Migration<T> = Box<dyn FnOnce(&mut T) -> T + Send>;

/// Upgrade provider fed from outside the actor.
///
/// Share it with the actor through an `Arc`, then [`StagedUpgrade::stage`] a
/// migration; the actor applies it at its next checkpoint.
pub struct StagedUpgrade<T> {
	staged: Mutex<Option<Migration<T>>>,
}

impl<T> Default for StagedUpgrade<T> {
	fn default() -> Self {
		Self { staged: Mutex::new(None) }
	}
}

impl<T> StagedUpgrade<T> {
	pub fn new() -> Self {
		Self::default()
	}

	/// Stages a migration, replacing any not yet applied.
	pub fn stage(&self, migrate: impl FnOnce(&mut T) -> T + Send + 'static) {
		*self.staged.lock() = Some(Box::new(migrate));
	}

	pub fn is_staged(&self) -> bool {
		self.staged.lock().is_some()
	}
}

impl<T: 'static> Upgrade<T> for StagedUpgrade<T> {
	fn upgrade(&self, current: &mut T) -> Option<T> {
		let migrate = self.staged.lock().take()?;
		Some(migrate(current))
	}
}
