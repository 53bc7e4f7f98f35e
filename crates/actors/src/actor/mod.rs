//! Actor identity, lifecycle and execution.
//!
//! An actor is a [`Actor::run`] future paired with a mailbox. It is started
//! from an [`ActorSpec`] by [`crate::Runtime::spawn`], addressed through
//! [`ActorRef`]/[`AnyActorRef`], and observed through links and watches.

mod actor_ref;
pub(crate) mod cell;
mod context;
mod lifecycle;
mod temp;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

pub use actor_ref::{ActorRef, AnyActorRef, RemotePort};
pub use context::ActorContext;
pub use lifecycle::{ExitMessage, LifecycleMessage};
pub use temp::TempActor;

use crate::mailbox::MailboxSpec;
use crate::{Execution, Result};

/// A unit of isolated execution driven by its mailbox.
///
/// `run` completing with `Ok` is a natural death; returning `Err` or
/// panicking records the error as the death cause. Returning
/// [`crate::ActorError::ShutdownRequested`] (as receive does after a
/// shutdown request) also counts as a natural death.
#[async_trait]
pub trait Actor: Send + 'static {
	type Msg: Send + 'static;
	type Output: Send + 'static;

	async fn run(&mut self, cx: &mut ActorContext<Self::Msg>) -> Result<Self::Output>;
}

/// Builder spec for one actor.
///
/// The factory is called once per start, so the same spec can rebuild the
/// actor after a supervised restart.
pub struct ActorSpec<A: Actor> {
	pub(crate) name: Option<String>,
	pub(crate) execution: Execution,
	pub(crate) mailbox: Option<MailboxSpec>,
	pub(crate) register: bool,
	pub(crate) factory: Arc<dyn Fn() -> A + Send + Sync>,
}

impl<A: Actor> Clone for ActorSpec<A> {
	fn clone(&self) -> Self {
		Self {
			name: self.name.clone(),
			execution: self.execution,
			mailbox: self.mailbox,
			register: self.register,
			factory: Arc::clone(&self.factory),
		}
	}
}

impl<A: Actor> ActorSpec<A> {
	/// Creates a spec for a named actor.
	pub fn new(name: impl Into<String>, factory: impl Fn() -> A + Send + Sync + 'static) -> Self {
		Self {
			name: Some(name.into()),
			..Self::anonymous(factory)
		}
	}

	/// Creates a spec for an actor without a name.
	pub fn anonymous(factory: impl Fn() -> A + Send + Sync + 'static) -> Self {
		Self {
			name: None,
			execution: Execution::default(),
			mailbox: None,
			register: false,
			factory: Arc::new(factory),
		}
	}

	/// Selects the execution context.
	#[must_use]
	pub fn execution(mut self, execution: Execution) -> Self {
		self.execution = execution;
		self
	}

	/// Overrides the runtime's default mailbox configuration.
	#[must_use]
	pub fn mailbox(mut self, mailbox: MailboxSpec) -> Self {
		self.mailbox = Some(mailbox);
		self
	}

	/// Registers the actor under its name when it starts.
	#[must_use]
	pub fn register(mut self) -> Self {
		self.register = true;
		self
	}

	pub(crate) fn with_default_name(mut self, name: Option<&str>) -> Self {
		if self.name.is_none() {
			self.name = name.map(str::to_string);
		}
		self
	}
}

/// Owner handle returned by [`crate::Runtime::spawn`].
pub struct ActorHandle<A: Actor> {
	actor: ActorRef<A::Msg>,
	output: Arc<Mutex<Option<A::Output>>>,
}

impl<A: Actor> ActorHandle<A> {
	pub(crate) fn new(actor: ActorRef<A::Msg>, output: Arc<Mutex<Option<A::Output>>>) -> Self {
		Self { actor, output }
	}

	pub fn actor_ref(&self) -> &ActorRef<A::Msg> {
		&self.actor
	}

	pub fn as_any(&self) -> AnyActorRef {
		self.actor.as_any()
	}

	/// Waits for the actor to die and returns its output.
	///
	/// `Ok(None)` is a natural death without output, such as a graceful shutdown.
	pub async fn join(&self) -> Result<Option<A::Output>> {
		self.actor.join().await?;
		Ok(self.output.lock().take())
	}

	/// Like [`ActorHandle::join`] with a deadline. `None` if still alive when it passes.
	pub async fn join_timeout(&self, timeout: Duration) -> Option<Result<Option<A::Output>>> {
		match self.actor.join_timeout(timeout).await? {
			Ok(()) => Some(Ok(self.output.lock().take())),
			Err(cause) => Some(Err(cause)),
		}
	}
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests;
