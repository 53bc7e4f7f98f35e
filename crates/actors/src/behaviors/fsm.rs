//! State-machine actors built from state objects.
//!
//! Each state runs with full access to the actor context (it usually
//! receives selectively) and returns the state to continue with.

use std::sync::Arc;

use async_trait::async_trait;

use crate::actor::{Actor, ActorContext, ActorHandle, ActorSpec};
use crate::behaviors::upgrade::Upgrade;
use crate::mailbox::MailboxSpec;
use crate::runtime::Runtime;
use crate::{Execution, Result};

/// One state of a state machine.
#[async_trait]
pub trait FsmState<M: Send + 'static>: Send + 'static {
	async fn run(self: Box<Self>, cx: &mut ActorContext<M>) -> Result<Transition<M>>;

	/// Label used in trace events.
	fn name(&self) -> &'static str {
		std::any::type_name::<Self>()
	}
}

/// Outcome of one state.
pub enum Transition<M> {
	Next(Box<dyn FsmState<M>>),
	Terminate,
}

impl<M: Send + 'static> Transition<M> {
	pub fn next(state: impl FsmState<M>) -> Self {
		Self::Next(Box::new(state))
	}
}

pub type BoxedState<M> = Box<dyn FsmState<M>>;

/// Actor running states until one returns [`Transition::Terminate`].
pub struct FsmActor<M> {
	state: Option<BoxedState<M>>,
	upgrade: Option<Arc<dyn Upgrade<BoxedState<M>>>>,
}

#[async_trait]
impl<M: Send + 'static> Actor for FsmActor<M> {
	type Msg = M;
	type Output = ();

	async fn run(&mut self, cx: &mut ActorContext<M>) -> Result<()> {
		loop {
			let Some(mut state) = self.state.take() else {
				return Ok(());
			};
			if !cx.is_running() {
				return Ok(());
			}
			if let Some(upgrade) = &self.upgrade
				&& let Some(next) = upgrade.upgrade(&mut state)
			{
				tracing::info!(actor = %cx.as_any(), from = state.name(), to = next.name(), "fsm.upgrade");
				state = next;
			}
			tracing::trace!(actor = %cx.as_any(), state = state.name(), "fsm.state");
			match state.run(cx).await {
				Ok(Transition::Next(next)) => self.state = Some(next),
				Ok(Transition::Terminate) => return Ok(()),
				Err(err) if err.is_natural() => return Ok(()),
				Err(err) => return Err(err),
			}
		}
	}
}

/// Builder for a state-machine actor.
pub struct FsmSpec<M> {
	name: Option<String>,
	initial: Arc<dyn Fn() -> BoxedState<M> + Send + Sync>,
	upgrade: Option<Arc<dyn Upgrade<BoxedState<M>>>>,
	execution: Execution,
	mailbox: Option<MailboxSpec>,
	register: bool,
}

impl<M: Send + 'static> FsmSpec<M> {
	/// `initial` builds the first state on every start.
	pub fn new(name: impl Into<String>, initial: impl Fn() -> BoxedState<M> + Send + Sync + 'static) -> Self {
		Self {
			name: Some(name.into()),
			..Self::anonymous(initial)
		}
	}

	pub fn anonymous(initial: impl Fn() -> BoxedState<M> + Send + Sync + 'static) -> Self {
		Self {
			name: None,
			initial: Arc::new(initial),
			upgrade: None,
			execution: Execution::default(),
			mailbox: None,
			register: false,
		}
	}

	/// Provider asked before each state runs.
	#[must_use]
	pub fn upgrade(mut self, upgrade: Arc<dyn Upgrade<BoxedState<M>>>) -> Self {
		self.upgrade = Some(upgrade);
		self
	}

	#[must_use]
	pub fn execution(mut self, execution: Execution) -> Self {
		self.execution = execution;
		self
	}

	#[must_use]
	pub fn mailbox(mut self, mailbox: MailboxSpec) -> Self {
		self.mailbox = Some(mailbox);
		self
	}

	#[must_use]
	pub fn register(mut self) -> Self {
		self.register = true;
		self
	}

	pub fn actor_spec(&self) -> ActorSpec<FsmActor<M>> {
		let initial = Arc::clone(&self.initial);
		let upgrade = self.upgrade.clone();
		let build = move || FsmActor {
			state: Some(initial()),
			upgrade: upgrade.clone(),
		};
		let mut spec = match &self.name {
			Some(name) => ActorSpec::new(name.clone(), build),
			None => ActorSpec::anonymous(build),
		}
		.execution(self.execution);
		if let Some(mailbox) = self.mailbox {
			spec = spec.mailbox(mailbox);
		}
		if self.register {
			spec = spec.register();
		}
		spec
	}

	pub fn spawn(&self, runtime: &Runtime) -> Result<ActorHandle<FsmActor<M>>> {
		runtime.spawn(self.actor_spec())
	}
}
