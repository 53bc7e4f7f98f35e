use std::time::Duration;

use crate::actor::cell::Respawn;
use crate::actor::{Actor, ActorSpec, AnyActorRef};
use crate::runtime::respawner;
use crate::supervisor::restart_history::RestartHistory;
use crate::supervisor::strategy::ChildMode;
use crate::token::WatchId;

#[derive(Clone)]
enum ChildStart {
	Spawn(Respawn),
	Adopt(AnyActorRef),
}

/// Configuration of one supervised child.
///
/// Defaults: [`ChildMode::Permanent`], at most 3 restarts per 5 seconds,
/// and the runtime's shutdown deadline.
#[derive(Clone)]
pub struct ChildSpec {
	pub(crate) id: String,
	start: ChildStart,
	pub(crate) mode: ChildMode,
	pub(crate) max_restarts: usize,
	pub(crate) window: Duration,
	pub(crate) shutdown_deadline: Option<Duration>,
}

impl ChildSpec {
	/// A child started, and restarted, from `spec`. Unnamed actors take `id` as their name.
	pub fn new<A: Actor>(id: impl Into<String>, spec: ActorSpec<A>) -> Self {
		Self::with_start(id.into(), ChildStart::Spawn(respawner(spec)))
	}

	/// Places an already running actor under supervision.
	///
	/// The id defaults to the actor's name. Restarts rebuild it from the
	/// spec it was spawned with.
	pub fn adopt(actor: impl Into<AnyActorRef>) -> Self {
		let actor = actor.into();
		let id = match actor.name() {
			Some(name) => name.to_string(),
			None => actor.id().to_string(),
		};
		Self::with_start(id, ChildStart::Adopt(actor))
	}

	fn with_start(id: String, start: ChildStart) -> Self {
		Self {
			id,
			start,
			mode: ChildMode::default(),
			max_restarts: 3,
			window: Duration::from_secs(5),
			shutdown_deadline: None,
		}
	}

	#[must_use]
	pub fn id(mut self, id: impl Into<String>) -> Self {
		self.id = id.into();
		self
	}

	#[must_use]
	pub fn mode(mut self, mode: ChildMode) -> Self {
		self.mode = mode;
		self
	}

	/// Gives up once more than `max_restarts` restarts happen within `window`.
	#[must_use]
	pub fn restart_budget(mut self, max_restarts: usize, window: Duration) -> Self {
		self.max_restarts = max_restarts;
		self.window = window;
		self
	}

	/// Time a child gets to stop before it is interrupted.
	#[must_use]
	pub fn shutdown_deadline(mut self, deadline: Duration) -> Self {
		self.shutdown_deadline = Some(deadline);
		self
	}

	pub(crate) fn adopted(&self) -> Option<&AnyActorRef> {
		match &self.start {
			ChildStart::Adopt(actor) => Some(actor),
			ChildStart::Spawn(_) => None,
		}
	}

	/// Factory used for restarts. Adopted actors lend theirs.
	pub(crate) fn factory(&self) -> Option<Respawn> {
		match &self.start {
			ChildStart::Spawn(respawn) => Some(respawn.clone()),
			ChildStart::Adopt(actor) => actor.shared().respawn().cloned(),
		}
	}
}

impl std::fmt::Debug for ChildSpec {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ChildSpec")
			.field("id", &self.id)
			.field("mode", &self.mode)
			.field("max_restarts", &self.max_restarts)
			.field("window", &self.window)
			.field("adopted", &self.adopted().map(AnyActorRef::id))
			.finish()
	}
}

/// Snapshot of one child for [`crate::supervisor::SupervisorRef::children`].
#[derive(Debug, Clone)]
pub struct ChildInfo {
	pub id: String,
	pub actor: Option<AnyActorRef>,
	pub mode: ChildMode,
	pub restarts: u64,
}

/// Supervisor-side state of one child slot.
pub(crate) struct ChildEntry {
	pub(crate) spec: ChildSpec,
	pub(crate) factory: Option<Respawn>,
	pub(crate) actor: Option<AnyActorRef>,
	pub(crate) watch: Option<WatchId>,
	pub(crate) history: RestartHistory,
	pub(crate) restarts: u64,
}

impl ChildEntry {
	pub(crate) fn new(spec: ChildSpec) -> Self {
		Self {
			factory: spec.factory(),
			history: RestartHistory::new(spec.max_restarts),
			spec,
			actor: None,
			watch: None,
			restarts: 0,
		}
	}

	pub(crate) fn info(&self) -> ChildInfo {
		ChildInfo {
			id: self.spec.id.clone(),
			actor: self.actor.clone(),
			mode: self.spec.mode,
			restarts: self.restarts,
		}
	}
}
