use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::actor::lifecycle::Listener;
use crate::actor::{AnyActorRef, ExitMessage, LifecycleMessage};
use crate::behaviors::request_reply::Response;
use crate::completion::Completion;
use crate::error::RegistrationError;
use crate::mailbox::{Envelope, Mailbox, MailboxSpec};
use crate::monitor::ActorMonitor;
use crate::runtime::{Runtime, WeakRuntime};
use crate::token::{ActorId, WatchId};
use crate::{ActorError, Result};

/// Rebuilds a fresh actor from the spec that produced the current one.
pub(crate) type Respawn = Arc<dyn Fn(&Runtime, Option<&str>) -> Result<AnyActorRef> + Send + Sync>;

/// Identity state shared by an actor and every ref to it. Outlives the cell.
pub(crate) struct ActorShared {
	pub(crate) id: ActorId,
	name: OnceLock<String>,
	registered: AtomicBool,
	monitor: Mutex<Option<Arc<dyn ActorMonitor>>>,
	pub(crate) completion: Completion,
	respawn: Option<Respawn>,
}

impl ActorShared {
	pub(crate) fn new(id: ActorId, name: Option<String>, respawn: Option<Respawn>) -> Arc<Self> {
		let slot = OnceLock::new();
		if let Some(name) = name {
			let _ = slot.set(name);
		}
		Arc::new(Self {
			id,
			name: slot,
			registered: AtomicBool::new(false),
			monitor: Mutex::new(None),
			completion: Completion::new(),
			respawn,
		})
	}

	pub(crate) fn name(&self) -> Option<&str> {
		self.name.get().map(String::as_str)
	}

	/// Sets the name if unset. Fails when already set to a different name.
	pub(crate) fn set_name(&self, name: &str) -> Result<(), RegistrationError> {
		let current = self.name.get_or_init(|| name.to_string());
		if current == name {
			Ok(())
		} else {
			Err(RegistrationError::NameMismatch {
				current: current.clone(),
				requested: name.to_string(),
			})
		}
	}

	pub(crate) fn is_registered(&self) -> bool {
		self.registered.load(Ordering::Acquire)
	}

	pub(crate) fn set_registered(&self, registered: bool) {
		self.registered.store(registered, Ordering::Release);
	}

	pub(crate) fn monitor(&self) -> Option<Arc<dyn ActorMonitor>> {
		self.monitor.lock().clone()
	}

	pub(crate) fn set_monitor(&self, monitor: Option<Arc<dyn ActorMonitor>>) {
		*self.monitor.lock() = monitor;
	}

	pub(crate) fn respawn(&self) -> Option<&Respawn> {
		self.respawn.as_ref()
	}

	/// Death cause once dead, as recorded by the death routine.
	pub(crate) fn death_cause(&self) -> Option<ActorError> {
		match self.completion.outcome() {
			Some(Err(cause)) => Some(cause),
			_ => None,
		}
	}
}

struct LifecycleState {
	/// `Some` once dead; the inner option is the cause.
	death: Option<Option<ActorError>>,
	listeners: Vec<Listener>,
	observed: Vec<AnyActorRef>,
}

/// Mutable control block of a live actor.
pub(crate) struct ActorCore {
	me: Weak<dyn AnyCell>,
	pub(crate) runtime: WeakRuntime,
	dead: AtomicBool,
	lifecycle: Mutex<LifecycleState>,
	thrown: Mutex<Option<ActorError>>,
	pub(crate) interrupt: CancellationToken,
}

impl ActorCore {
	fn new(me: Weak<dyn AnyCell>, runtime: WeakRuntime) -> Self {
		Self {
			me,
			runtime,
			dead: AtomicBool::new(false),
			lifecycle: Mutex::new(LifecycleState {
				death: None,
				listeners: Vec::new(),
				observed: Vec::new(),
			}),
			thrown: Mutex::new(None),
			interrupt: CancellationToken::new(),
		}
	}

	pub(crate) fn is_dead(&self) -> bool {
		self.dead.load(Ordering::Acquire)
	}

	/// Adds a listener, or hands back the death cause if already dead.
	pub(crate) fn add_listener(&self, listener: Listener) -> std::result::Result<(), Option<ActorError>> {
		let mut life = self.lifecycle.lock();
		if let Some(cause) = &life.death {
			return Err(cause.clone());
		}
		life.listeners.push(listener);
		Ok(())
	}

	pub(crate) fn remove_link(&self, peer: ActorId) {
		self.lifecycle
			.lock()
			.listeners
			.retain(|l| !(matches!(l, Listener::Link(_)) && l.observer().id() == peer));
	}

	pub(crate) fn remove_watch(&self, id: WatchId) {
		self.lifecycle.lock().listeners.retain(|l| l.watch_id() != Some(id));
	}

	/// Removes every listener whose observer is `observer`.
	pub(crate) fn remove_listeners_of(&self, observer: ActorId) {
		self.lifecycle.lock().listeners.retain(|l| l.observer().id() != observer);
	}

	pub(crate) fn has_link(&self, peer: ActorId) -> bool {
		self.lifecycle
			.lock()
			.listeners
			.iter()
			.any(|l| matches!(l, Listener::Link(_)) && l.observer().id() == peer)
	}

	#[cfg(test)]
	pub(crate) fn listener_count(&self) -> usize {
		self.lifecycle.lock().listeners.len()
	}

	pub(crate) fn add_observed(&self, observed: AnyActorRef) {
		let mut life = self.lifecycle.lock();
		if !life.observed.contains(&observed) {
			life.observed.push(observed);
		}
	}

	/// Stores an error to be raised at the next receive. Last writer wins.
	pub(crate) fn set_thrown(&self, err: ActorError) {
		*self.thrown.lock() = Some(err);
	}

	pub(crate) fn take_thrown(&self) -> Option<ActorError> {
		self.thrown.lock().take()
	}
}

/// Type-erased view of an actor cell used by refs, listeners and the runtime arena.
pub(crate) trait AnyCell: Send + Sync + 'static {
	fn shared(&self) -> &Arc<ActorShared>;

	fn core(&self) -> &ActorCore;

	fn push_lifecycle(&self, msg: LifecycleMessage);

	fn push_response(&self, response: Response);

	fn wake(&self);

	fn mailbox_len(&self) -> usize;

	fn clear_mailbox(&self);

	fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;

	fn me(&self) -> AnyActorRef {
		AnyActorRef::local(Arc::clone(self.shared()), self.core().me.clone())
	}
}

/// Heap home of one actor: identity, control block and mailbox.
pub(crate) struct ActorCell<M> {
	shared: Arc<ActorShared>,
	core: ActorCore,
	pub(crate) mailbox: Mailbox<M>,
}

impl<M: Send + 'static> ActorCell<M> {
	pub(crate) fn new(shared: Arc<ActorShared>, mailbox: MailboxSpec, runtime: WeakRuntime) -> Arc<Self> {
		Arc::new_cyclic(|weak: &Weak<Self>| {
			let me: Weak<dyn AnyCell> = weak.clone();
			Self {
				shared,
				core: ActorCore::new(me, runtime),
				mailbox: Mailbox::new(mailbox),
			}
		})
	}
}

impl<M: Send + 'static> AnyCell for ActorCell<M> {
	fn shared(&self) -> &Arc<ActorShared> {
		&self.shared
	}

	fn core(&self) -> &ActorCore {
		&self.core
	}

	fn push_lifecycle(&self, msg: LifecycleMessage) {
		self.mailbox.push_system(Envelope::Lifecycle(msg));
	}

	fn push_response(&self, response: Response) {
		self.mailbox.push_system(Envelope::Response(response));
	}

	fn wake(&self) {
		self.mailbox.wake();
	}

	fn mailbox_len(&self) -> usize {
		self.mailbox.len()
	}

	fn clear_mailbox(&self) {
		self.mailbox.clear();
	}

	fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
		self
	}
}

/// Links `cell` with `other` in both directions.
///
/// If either side is already dead the survivor gets the exit notification
/// right away instead of a listener.
pub(crate) fn link(cell: &dyn AnyCell, other: &AnyActorRef) -> Result<()> {
	if other.is_remote() {
		return Err(ActorError::Remote("link"));
	}
	let me = cell.me();
	if me == *other {
		return Ok(());
	}
	if cell.core().add_listener(Listener::Link(other.clone())).is_err() {
		return Ok(());
	}
	let peer_cause = match other.upgrade() {
		Some(peer) => peer.core().add_listener(Listener::Link(me)).err(),
		None => Some(other.death_cause()),
	};
	if let Some(cause) = peer_cause {
		cell.core().remove_link(other.id());
		cell.push_lifecycle(LifecycleMessage::Exit(ExitMessage {
			actor: other.clone(),
			cause,
			watch: None,
		}));
	}
	tracing::trace!(actor = %cell.me(), peer = %other, "actor.link");
	Ok(())
}

pub(crate) fn unlink(cell: &dyn AnyCell, other: &AnyActorRef) {
	cell.core().remove_link(other.id());
	if let Some(peer) = other.upgrade() {
		peer.core().remove_link(cell.shared().id);
	}
}

/// Installs a one-way watch of `other` by `cell` under `id`.
pub(crate) fn watch(cell: &dyn AnyCell, other: &AnyActorRef, id: WatchId) -> Result<()> {
	if other.is_remote() {
		return Err(ActorError::Remote("watch"));
	}
	let listener = Listener::Watch { observer: cell.me(), id };
	let dead_cause = match other.upgrade() {
		Some(peer) => peer.core().add_listener(listener).err(),
		None => Some(other.death_cause()),
	};
	match dead_cause {
		Some(cause) => cell.push_lifecycle(LifecycleMessage::Exit(ExitMessage {
			actor: other.clone(),
			cause,
			watch: Some(id),
		})),
		None => cell.core().add_observed(other.clone()),
	}
	Ok(())
}

pub(crate) fn unwatch(other: &AnyActorRef, id: WatchId) {
	if let Some(peer) = other.upgrade() {
		peer.core().remove_watch(id);
	}
}

/// Runs the death routine once. Returns false if the actor was already dead.
///
/// Unregisters the name and releases joiners before any listener is told,
/// so observers already see the actor as done. Then notifies every
/// listener and drops reverse link listeners and this actor's own watches.
pub(crate) fn die(cell: &dyn AnyCell, cause: Option<ActorError>) -> bool {
	let core = cell.core();
	let shared = cell.shared();
	let (listeners, observed) = {
		let mut life = core.lifecycle.lock();
		if life.death.is_some() {
			return false;
		}
		life.death = Some(cause.clone());
		core.dead.store(true, Ordering::Release);
		(std::mem::take(&mut life.listeners), std::mem::take(&mut life.observed))
	};

	let me = cell.me();
	tracing::debug!(actor = %me, cause = ?cause, listeners = listeners.len(), "actor.exit");

	let runtime = core.runtime.upgrade();
	if shared.is_registered()
		&& let (Some(runtime), Some(name)) = (&runtime, shared.name())
	{
		runtime.registry().unregister_id(name, shared.id);
	}
	if let Some(monitor) = shared.monitor() {
		monitor.add_death(cause.as_ref());
	}
	shared.completion.finish(cause.clone());

	for listener in listeners {
		let exit = ExitMessage {
			actor: me.clone(),
			cause: cause.clone(),
			watch: listener.watch_id(),
		};
		let observer = listener.observer();
		if !observer.deliver_lifecycle(LifecycleMessage::Exit(exit)) {
			tracing::debug!(actor = %me, observer = %observer, "actor.exit.observer_gone");
		}
		if let Listener::Link(peer) = &listener
			&& let Some(peer) = peer.upgrade()
		{
			peer.core().remove_listeners_of(shared.id);
		}
	}
	for other in observed {
		if let Some(other) = other.upgrade() {
			other.core().remove_listeners_of(shared.id);
		}
	}

	cell.clear_mailbox();
	if let Some(runtime) = runtime {
		runtime.remove_actor(shared.id);
	}
	true
}
