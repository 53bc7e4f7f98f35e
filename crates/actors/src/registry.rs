use std::collections::HashMap;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::actor::{ActorRef, AnyActorRef};
use crate::error::RegistrationError;
use crate::monitor::MonitorFactory;
use crate::token::ActorId;
use crate::Result;

/// Snapshot of one registry entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActorRecord {
	pub name: String,
	pub actor: ActorId,
	pub remote: bool,
	pub done: bool,
	pub mailbox_len: usize,
}

/// Name table of one [`crate::Runtime`].
///
/// Entries are removed by the death routine, so a name is free again as
/// soon as its actor dies.
pub struct Registry {
	table: Mutex<HashMap<String, AnyActorRef>>,
	changed: Notify,
	monitors: Option<MonitorFactory>,
}

impl Registry {
	pub(crate) fn new(monitors: Option<MonitorFactory>) -> Self {
		Self {
			table: Mutex::new(HashMap::new()),
			changed: Notify::new(),
			monitors,
		}
	}

	/// Binds `name` to `actor`.
	///
	/// Registering the same actor twice is a no-op. A name held by another
	/// live local actor is refused; dead or remote holders are replaced.
	/// Unnamed actors take `name`; named ones must match it.
	pub fn register(&self, name: &str, actor: AnyActorRef) -> Result<(), RegistrationError> {
		let mut table = self.table.lock();
		self.register_locked(&mut table, name, actor)
	}

	/// Binds an actor under the name it already carries.
	pub fn register_named(&self, actor: AnyActorRef) -> Result<(), RegistrationError> {
		let name = actor.name().ok_or(RegistrationError::Unnamed)?.to_string();
		self.register(&name, actor)
	}

	fn register_locked(&self, table: &mut HashMap<String, AnyActorRef>, name: &str, actor: AnyActorRef) -> Result<(), RegistrationError> {
		if let Some(current) = actor.name()
			&& current != name
		{
			return Err(RegistrationError::NameMismatch {
				current: current.to_string(),
				requested: name.to_string(),
			});
		}
		if let Some(existing) = table.get(name) {
			if existing.id() == actor.id() {
				return Ok(());
			}
			if !existing.is_remote() && !existing.is_done() {
				return Err(RegistrationError::NameTaken(name.to_string()));
			}
			tracing::info!(name, previous = %existing, actor = %actor, "registry.reregister");
		}

		actor.shared().set_name(name)?;
		actor.shared().set_registered(true);
		if let Some(factory) = &self.monitors
			&& actor.monitor().is_none()
		{
			actor.set_monitor(Some(factory(name)));
		}
		tracing::debug!(name, actor = %actor, "registry.register");
		table.insert(name.to_string(), actor);
		self.changed.notify_waiters();
		Ok(())
	}

	/// Removes the entry for `actor`. Returns false if it was not registered.
	pub fn unregister(&self, actor: &AnyActorRef) -> bool {
		let Some(name) = actor.name() else {
			return false;
		};
		self.unregister_id(name, actor.id())
	}

	/// Removes `name` only if it is still bound to `id`.
	pub(crate) fn unregister_id(&self, name: &str, id: ActorId) -> bool {
		let mut table = self.table.lock();
		match table.get(name) {
			Some(existing) if existing.id() == id => {
				existing.shared().set_registered(false);
				table.remove(name);
				tracing::debug!(name, actor = %id, "registry.unregister");
				true
			}
			_ => false,
		}
	}

	/// Non-blocking lookup.
	pub fn try_get_actor(&self, name: &str) -> Option<AnyActorRef> {
		self.table.lock().get(name).cloned()
	}

	/// Waits until `name` is registered. `None` when `timeout` passes first.
	pub async fn get_actor(&self, name: &str, timeout: Option<Duration>) -> Option<AnyActorRef> {
		let deadline = timeout.map(|timeout| tokio::time::Instant::now() + timeout);
		loop {
			let notified = self.changed.notified();
			if let Some(actor) = self.try_get_actor(name) {
				return Some(actor);
			}
			match deadline {
				None => notified.await,
				Some(deadline) => {
					if tokio::time::timeout_at(deadline, notified).await.is_err() {
						return self.try_get_actor(name);
					}
				}
			}
		}
	}

	/// Typed [`Registry::try_get_actor`]. `None` if absent or of another message type.
	pub fn try_get<M: Send + 'static>(&self, name: &str) -> Option<ActorRef<M>> {
		self.try_get_actor(name)?.downcast()
	}

	/// Typed [`Registry::get_actor`].
	pub async fn get<M: Send + 'static>(&self, name: &str, timeout: Option<Duration>) -> Option<ActorRef<M>> {
		self.get_actor(name, timeout).await?.downcast()
	}

	/// Returns the actor under `name`, creating and registering one if absent.
	///
	/// Check, create and register happen under one lock, so racing callers
	/// never spawn twice. `factory` must not touch this registry.
	pub fn get_or_register_actor<F>(&self, name: &str, factory: F) -> Result<AnyActorRef>
	where
		F: FnOnce() -> Result<AnyActorRef>,
	{
		let mut table = self.table.lock();
		if let Some(existing) = table.get(name)
			&& !existing.is_done()
		{
			return Ok(existing.clone());
		}
		let actor = factory()?;
		self.register_locked(&mut table, name, actor.clone())?;
		Ok(actor)
	}

	/// Entries sorted by name.
	pub fn snapshot(&self) -> Vec<ActorRecord> {
		let mut records: Vec<_> = self
			.table
			.lock()
			.iter()
			.map(|(name, actor)| ActorRecord {
				name: name.clone(),
				actor: actor.id(),
				remote: actor.is_remote(),
				done: actor.is_done(),
				mailbox_len: actor.mailbox_len(),
			})
			.collect();
		records.sort_by(|a, b| a.name.cmp(&b.name));
		records
	}

	pub fn len(&self) -> usize {
		self.table.lock().len()
	}

	pub fn is_empty(&self) -> bool {
		self.table.lock().is_empty()
	}
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests {
	use std::time::Duration;

	use super::*;
	use crate::{Runtime, RuntimeConfig};

	#[tokio::test]
	async fn register_is_idempotent_for_the_same_actor() {
		let rt = Runtime::new();
		let temp = rt.temp_actor();
		rt.registry().register("svc", temp.as_any()).unwrap();
		rt.registry().register("svc", temp.as_any()).unwrap();
		assert_eq!(rt.registry().len(), 1);
		assert_eq!(temp.as_any().name(), Some("svc"));
	}

	#[tokio::test]
	async fn second_live_actor_is_refused() {
		let rt = Runtime::new();
		let first = rt.temp_actor();
		let second = rt.temp_actor();
		rt.registry().register("svc", first.as_any()).unwrap();
		assert_eq!(
			rt.registry().register("svc", second.as_any()),
			Err(RegistrationError::NameTaken("svc".to_string()))
		);
	}

	#[tokio::test]
	async fn refused_registration_leaves_the_actor_unnamed() {
		let rt = Runtime::new();
		let holder = rt.temp_actor();
		let loser = rt.temp_actor();
		rt.registry().register("svc", holder.as_any()).unwrap();
		assert!(rt.registry().register("svc", loser.as_any()).is_err());
		assert_eq!(loser.as_any().name(), None);

		rt.registry().register("other", loser.as_any()).unwrap();
		assert_eq!(loser.as_any().name(), Some("other"));
		assert_eq!(rt.registry().try_get_actor("svc").unwrap().id(), holder.as_any().id());
	}

	#[tokio::test]
	async fn named_actor_cannot_take_another_name() {
		let rt = Runtime::new();
		let temp = rt.temp_actor();
		rt.registry().register("a", temp.as_any()).unwrap();
		assert!(matches!(
			rt.registry().register("b", temp.as_any()),
			Err(RegistrationError::NameMismatch { .. })
		));
	}

	#[tokio::test]
	async fn death_frees_the_name() {
		let rt = Runtime::new();
		let first = rt.temp_actor();
		let first_any = first.as_any();
		rt.registry().register("svc", first_any.clone()).unwrap();
		drop(first);
		assert!(first_any.is_done());
		assert!(rt.registry().try_get_actor("svc").is_none());

		let second = rt.temp_actor();
		rt.registry().register("svc", second.as_any()).unwrap();
	}

	#[tokio::test]
	async fn get_actor_waits_for_registration() {
		let rt = Runtime::new();
		let waiter = {
			let rt = rt.clone();
			crate::spawn::spawn_task(crate::Execution::Task, async move {
				rt.registry().get_actor("late", Some(Duration::from_secs(5))).await.map(|a| a.id())
			})
		};
		tokio::time::sleep(Duration::from_millis(20)).await;
		let temp = rt.temp_actor();
		rt.registry().register("late", temp.as_any()).unwrap();
		assert_eq!(waiter.await.unwrap(), Some(temp.as_any().id()));
	}

	#[tokio::test]
	async fn get_actor_times_out() {
		let rt = Runtime::new();
		assert!(rt.registry().get_actor("nobody", Some(Duration::from_millis(20))).await.is_none());
	}

	#[tokio::test]
	async fn get_or_register_creates_once() {
		let rt = Runtime::new();
		let temp = rt.temp_actor();
		let mut calls = 0;
		let a = rt
			.registry()
			.get_or_register_actor("once", || {
				calls += 1;
				Ok(temp.as_any())
			})
			.unwrap();
		let b = rt
			.registry()
			.get_or_register_actor("once", || {
				calls += 1;
				Ok(temp.as_any())
			})
			.unwrap();
		assert_eq!(a, b);
		assert_eq!(calls, 1);
	}

	#[tokio::test]
	async fn registration_attaches_a_monitor_by_default() {
		let rt = Runtime::new();
		let temp = rt.temp_actor();
		assert!(temp.as_any().monitor().is_none());
		rt.registry().register("watched", temp.as_any()).unwrap();
		assert!(temp.as_any().monitor().is_some());

		let records = rt.registry().snapshot();
		assert_eq!(records.len(), 1);
		assert_eq!(records[0].name, "watched");
		assert!(!records[0].done);
	}

	#[tokio::test]
	async fn monitors_can_be_switched_off() {
		let config = RuntimeConfig {
			monitor_registered: false,
			..RuntimeConfig::default()
		};
		let rt = Runtime::with_config(config);
		let temp = rt.temp_actor();
		rt.registry().register("quiet", temp.as_any()).unwrap();
		assert!(temp.as_any().monitor().is_none());
	}
}
