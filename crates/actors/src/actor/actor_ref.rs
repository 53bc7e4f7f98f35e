use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;

use crate::actor::cell::{ActorCell, ActorShared, AnyCell};
use crate::actor::LifecycleMessage;
use crate::behaviors::request_reply::Response;
use crate::mailbox::PushOutcome;
use crate::monitor::ActorMonitor;
use crate::runtime::Runtime;
use crate::token::ActorId;
use crate::{ActorError, Result};

/// Transport hook for refs whose actor lives elsewhere.
///
/// A remote ref behaves like a local one for sending; link, watch and
/// lifecycle delivery are not available through it.
#[async_trait]
pub trait RemotePort<M: Send + 'static>: Send + Sync + 'static {
	/// Delivers a message, waiting on transport backpressure if needed.
	async fn send(&self, msg: M);

	/// Delivers a message without waiting. Returns false if it was not accepted.
	fn try_send(&self, msg: M) -> bool;
}

enum Target<M> {
	Local(Weak<ActorCell<M>>),
	Remote(Arc<dyn RemotePort<M>>),
}

impl<M> Clone for Target<M> {
	fn clone(&self) -> Self {
		match self {
			Self::Local(cell) => Self::Local(Weak::clone(cell)),
			Self::Remote(port) => Self::Remote(Arc::clone(port)),
		}
	}
}

/// Typed, cloneable address of an actor.
///
/// Equality and hashing use the actor id only. A ref outlives its actor:
/// after death, sends are dropped and lifecycle queries report the outcome.
pub struct ActorRef<M> {
	shared: Arc<ActorShared>,
	target: Target<M>,
}

impl<M> Clone for ActorRef<M> {
	fn clone(&self) -> Self {
		Self {
			shared: Arc::clone(&self.shared),
			target: self.target.clone(),
		}
	}
}

impl<M: Send + 'static> ActorRef<M> {
	pub(crate) fn local(shared: Arc<ActorShared>, cell: Weak<ActorCell<M>>) -> Self {
		Self {
			shared,
			target: Target::Local(cell),
		}
	}

	pub(crate) fn remote(shared: Arc<ActorShared>, port: Arc<dyn RemotePort<M>>) -> Self {
		Self {
			shared,
			target: Target::Remote(port),
		}
	}

	pub fn id(&self) -> ActorId {
		self.shared.id
	}

	pub fn name(&self) -> Option<&str> {
		self.shared.name()
	}

	pub fn is_remote(&self) -> bool {
		matches!(self.target, Target::Remote(_))
	}

	fn live_cell(&self) -> Option<Arc<ActorCell<M>>> {
		match &self.target {
			Target::Local(cell) => cell.upgrade().filter(|cell| !cell.core().is_dead()),
			Target::Remote(_) => None,
		}
	}

	/// Sends a message. Never fails to the sender.
	///
	/// Waits for capacity only when the target's mailbox uses
	/// [`crate::OverflowPolicy::Block`]. Messages to dead actors are dropped.
	pub async fn send(&self, msg: M) {
		match &self.target {
			Target::Remote(port) => port.send(msg).await,
			Target::Local(_) => match self.live_cell() {
				Some(cell) => {
					let outcome = cell.mailbox.push(msg).await;
					self.after_push(&cell, outcome);
				}
				None => self.lost(),
			},
		}
	}

	/// Sends without waiting. Returns true if the message was enqueued.
	pub fn try_send(&self, msg: M) -> bool {
		match &self.target {
			Target::Remote(port) => port.try_send(msg),
			Target::Local(_) => match self.live_cell() {
				Some(cell) => match cell.mailbox.try_push(msg) {
					Ok(outcome) => self.after_push(&cell, outcome),
					Err(_) => false,
				},
				None => {
					self.lost();
					false
				}
			},
		}
	}

	fn after_push(&self, cell: &ActorCell<M>, outcome: PushOutcome) -> bool {
		match outcome {
			PushOutcome::Enqueued => true,
			PushOutcome::Displaced => {
				tracing::trace!(actor = %self, "actor.mailbox.displaced");
				true
			}
			PushOutcome::Dropped => {
				tracing::trace!(actor = %self, "actor.mailbox.dropped");
				false
			}
			PushOutcome::Overflow => {
				tracing::debug!(actor = %self, "actor.mailbox.overflow");
				cell.core().set_thrown(ActorError::MailboxFull(self.id()));
				cell.wake();
				false
			}
		}
	}

	fn lost(&self) {
		tracing::debug!(actor = %self, "actor.send.lost");
	}

	/// Returns a type-erased ref to the same actor.
	pub fn as_any(&self) -> AnyActorRef {
		match &self.target {
			Target::Local(cell) => {
				let cell: Weak<dyn AnyCell> = Weak::clone(cell) as Weak<dyn AnyCell>;
				AnyActorRef::local(Arc::clone(&self.shared), cell)
			}
			Target::Remote(_) => AnyActorRef {
				shared: Arc::clone(&self.shared),
				cell: None,
			},
		}
	}

	/// Number of queued envelopes, or zero once dead.
	pub fn mailbox_len(&self) -> usize {
		self.live_cell().map_or(0, |cell| cell.mailbox.len())
	}
}

impl<M: Clone + Send + 'static> ActorRef<M> {
	/// Copies the user messages currently queued, oldest first.
	pub fn mailbox_snapshot(&self) -> Vec<M> {
		self.live_cell().map_or_else(Vec::new, |cell| cell.mailbox.snapshot())
	}
}

impl<M> ActorRef<M> {
	fn shared(&self) -> &ActorShared {
		&self.shared
	}

	pub fn is_done(&self) -> bool {
		self.shared().completion.is_done()
	}

	/// Death cause once dead. `None` while alive or after a natural death.
	pub fn death_cause(&self) -> Option<ActorError> {
		self.shared().death_cause()
	}

	/// Waits for the actor to die. `Ok` for a natural death.
	pub async fn join(&self) -> Result<()> {
		self.shared().completion.join_forever().await
	}

	/// Like [`ActorRef::join`] with a deadline. `None` if still alive when it passes.
	pub async fn join_timeout(&self, timeout: Duration) -> Option<Result<()>> {
		self.shared().completion.join_with_timeout(timeout).await
	}
}

impl<M: Send + 'static> ActorRef<M> {
	/// Raises `err` inside the actor at its next receive. Last writer wins.
	pub fn throw_in(&self, err: ActorError) {
		self.as_any().throw_in(err);
	}

	/// Asks the actor to stop gracefully.
	pub fn shutdown(&self) {
		self.as_any().shutdown();
	}
}

impl<M> PartialEq for ActorRef<M> {
	fn eq(&self, other: &Self) -> bool {
		self.shared.id == other.shared.id
	}
}

impl<M> Eq for ActorRef<M> {}

impl<M> Hash for ActorRef<M> {
	fn hash<H: Hasher>(&self, state: &mut H) {
		self.shared.id.hash(state);
	}
}

impl<M> fmt::Display for ActorRef<M> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		display_actor(&self.shared, f)
	}
}

impl<M> fmt::Debug for ActorRef<M> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ActorRef")
			.field("id", &self.shared.id)
			.field("name", &self.shared.name())
			.field("remote", &matches!(self.target, Target::Remote(_)))
			.finish()
	}
}

fn display_actor(shared: &ActorShared, f: &mut fmt::Formatter<'_>) -> fmt::Result {
	match shared.name() {
		Some(name) => write!(f, "{name}{}", shared.id),
		None => write!(f, "{}", shared.id),
	}
}

/// Type-erased actor address used for lifecycle plumbing, the registry and supervision.
#[derive(Clone)]
pub struct AnyActorRef {
	shared: Arc<ActorShared>,
	cell: Option<Weak<dyn AnyCell>>,
}

impl AnyActorRef {
	pub(crate) fn local(shared: Arc<ActorShared>, cell: Weak<dyn AnyCell>) -> Self {
		Self { shared, cell: Some(cell) }
	}

	pub fn id(&self) -> ActorId {
		self.shared.id
	}

	pub fn name(&self) -> Option<&str> {
		self.shared.name()
	}

	pub fn is_remote(&self) -> bool {
		self.cell.is_none()
	}

	pub fn is_done(&self) -> bool {
		self.shared.completion.is_done()
	}

	/// Death cause once dead. `None` while alive or after a natural death.
	pub fn death_cause(&self) -> Option<ActorError> {
		self.shared.death_cause()
	}

	pub async fn join(&self) -> Result<()> {
		self.shared.completion.join_forever().await
	}

	pub async fn join_timeout(&self, timeout: Duration) -> Option<Result<()>> {
		self.shared.completion.join_with_timeout(timeout).await
	}

	/// Recovers the typed ref. `None` if the actor is gone or `M` is not its message type.
	pub fn downcast<M: Send + 'static>(&self) -> Option<ActorRef<M>> {
		let cell = self.upgrade()?.into_any().downcast::<ActorCell<M>>().ok()?;
		Some(ActorRef::local(Arc::clone(&self.shared), Arc::downgrade(&cell)))
	}

	/// Raises `err` inside the actor at its next receive. Last writer wins.
	pub fn throw_in(&self, err: ActorError) {
		match self.upgrade() {
			Some(cell) if !cell.core().is_dead() => {
				cell.core().set_thrown(err);
				cell.wake();
			}
			_ => tracing::debug!(actor = %self, "actor.throw_in.lost"),
		}
	}

	/// Asks the actor to stop gracefully.
	pub fn shutdown(&self) {
		self.shutdown_from(None);
	}

	pub(crate) fn shutdown_from(&self, from: Option<AnyActorRef>) {
		if !self.deliver_lifecycle(LifecycleMessage::Shutdown { from }) {
			tracing::debug!(actor = %self, "actor.shutdown.lost");
		}
	}

	/// Cancels the actor's execution at its next suspension point.
	pub(crate) fn interrupt(&self) {
		if let Some(cell) = self.upgrade() {
			cell.core().interrupt.cancel();
		}
	}

	/// Number of queued envelopes, or zero once gone.
	pub fn mailbox_len(&self) -> usize {
		self.upgrade().map_or(0, |cell| cell.mailbox_len())
	}

	pub fn monitor(&self) -> Option<Arc<dyn ActorMonitor>> {
		self.shared.monitor()
	}

	pub fn set_monitor(&self, monitor: Option<Arc<dyn ActorMonitor>>) {
		self.shared.set_monitor(monitor);
	}

	pub(crate) fn shared(&self) -> &Arc<ActorShared> {
		&self.shared
	}

	pub(crate) fn upgrade(&self) -> Option<Arc<dyn AnyCell>> {
		self.cell.as_ref()?.upgrade()
	}

	/// Pushes a lifecycle envelope. Returns false if the actor is gone.
	pub(crate) fn deliver_lifecycle(&self, msg: LifecycleMessage) -> bool {
		match self.upgrade() {
			Some(cell) if !cell.core().is_dead() => {
				cell.push_lifecycle(msg);
				true
			}
			_ => false,
		}
	}

	/// Pushes a response envelope. Returns false if the actor is gone.
	pub(crate) fn deliver_response(&self, response: Response) -> bool {
		match self.upgrade() {
			Some(cell) if !cell.core().is_dead() => {
				cell.push_response(response);
				true
			}
			_ => false,
		}
	}

	/// Builds a replacement actor from the spec that produced this one.
	pub(crate) fn respawn(&self, runtime: &Runtime, name: Option<&str>) -> Option<Result<AnyActorRef>> {
		let respawn = self.shared.respawn()?;
		Some(respawn(runtime, name))
	}
}

impl<M: Send + 'static> From<&ActorRef<M>> for AnyActorRef {
	fn from(actor: &ActorRef<M>) -> Self {
		actor.as_any()
	}
}

impl From<&AnyActorRef> for AnyActorRef {
	fn from(actor: &AnyActorRef) -> Self {
		actor.clone()
	}
}

impl PartialEq for AnyActorRef {
	fn eq(&self, other: &Self) -> bool {
		self.shared.id == other.shared.id
	}
}

impl Eq for AnyActorRef {}

impl Hash for AnyActorRef {
	fn hash<H: Hasher>(&self, state: &mut H) {
		self.shared.id.hash(state);
	}
}

impl fmt::Display for AnyActorRef {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		display_actor(&self.shared, f)
	}
}

impl fmt::Debug for AnyActorRef {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("AnyActorRef")
			.field("id", &self.shared.id)
			.field("name", &self.shared.name())
			.finish()
	}
}
