//! Supervision trees.
//!
//! A supervisor is an actor that watches its children and restarts them
//! according to a [`RestartStrategy`] and each child's [`ChildMode`] and
//! restart budget. When a budget is exhausted the supervisor stops all
//! children and dies with [`ActorError::Escalated`], which its own
//! supervisor then sees as an abnormal child death.

mod child;
mod restart_history;
mod strategy;

use std::fmt;
use std::time::{Duration, Instant};

use async_trait::async_trait;

pub use child::{ChildInfo, ChildSpec};
pub use strategy::{ChildMode, RestartStrategy};

use crate::actor::{Actor, ActorContext, ActorRef, ActorSpec, AnyActorRef, ExitMessage};
use crate::behaviors::ReplyTo;
use crate::error::SupervisorError;
use crate::mailbox::MailboxSpec;
use crate::runtime::Runtime;
use crate::supervisor::child::ChildEntry;
use crate::supervisor::strategy::Plan;
use crate::{ActorError, Execution, Result};

/// Mailbox message of a supervisor.
pub enum SupervisorMessage {
	AddChild { from: ReplyTo<AnyActorRef>, spec: ChildSpec },
	GetChild { from: ReplyTo<Option<AnyActorRef>>, id: String },
	RemoveChild { from: ReplyTo<bool>, id: String, terminate: bool },
	Children { from: ReplyTo<Vec<ChildInfo>> },
	ChildDied(ExitMessage),
}

impl fmt::Debug for SupervisorMessage {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::AddChild { spec, .. } => f.debug_struct("AddChild").field("spec", spec).finish_non_exhaustive(),
			Self::GetChild { id, .. } => f.debug_struct("GetChild").field("id", id).finish_non_exhaustive(),
			Self::RemoveChild { id, terminate, .. } => f
				.debug_struct("RemoveChild")
				.field("id", id)
				.field("terminate", terminate)
				.finish_non_exhaustive(),
			Self::Children { .. } => f.write_str("Children"),
			Self::ChildDied(exit) => f.debug_tuple("ChildDied").field(&exit.actor).finish(),
		}
	}
}

type Cx = ActorContext<SupervisorMessage>;

/// The supervisor actor. Its child table is owned by its run future.
pub struct SupervisorActor {
	strategy: RestartStrategy,
	initial: Vec<ChildSpec>,
	children: Vec<ChildEntry>,
}

#[async_trait]
impl Actor for SupervisorActor {
	type Msg = SupervisorMessage;
	type Output = ();

	async fn run(&mut self, cx: &mut Cx) -> Result<()> {
		cx.set_lifecycle_handler(|exit| Some(SupervisorMessage::ChildDied(exit)));
		let result = self.serve(cx).await;
		if let Err(err) = &result
			&& !err.is_natural()
		{
			tracing::warn!(supervisor = %cx.as_any(), cause = %err, "supervisor.terminate");
		}
		self.shutdown_children(cx).await;
		match result {
			Err(err) if err.is_natural() => Ok(()),
			other => other,
		}
	}
}

impl SupervisorActor {
	async fn serve(&mut self, cx: &mut Cx) -> Result<()> {
		for spec in std::mem::take(&mut self.initial) {
			self.add_child(spec, cx)?;
		}
		while cx.is_running() {
			match cx.receive().await? {
				SupervisorMessage::AddChild { from, spec } => match self.add_child(spec, cx) {
					Ok(actor) => {
						from.reply(actor);
					}
					Err(err) => {
						from.reply_error(err);
					}
				},
				SupervisorMessage::GetChild { from, id } => {
					from.reply(self.find(&id).and_then(|i| self.children[i].actor.clone()));
				}
				SupervisorMessage::RemoveChild { from, id, terminate } => {
					let removed = self.remove_child(&id, terminate, cx).await;
					from.reply(removed);
				}
				SupervisorMessage::Children { from } => {
					from.reply(self.children.iter().map(ChildEntry::info).collect());
				}
				SupervisorMessage::ChildDied(exit) => self.child_died(exit, cx).await?,
			}
		}
		Ok(())
	}

	fn find(&self, id: &str) -> Option<usize> {
		self.children.iter().position(|c| c.spec.id == id)
	}

	fn add_child(&mut self, spec: ChildSpec, cx: &mut Cx) -> Result<AnyActorRef> {
		if self.find(&spec.id).is_some() {
			return Err(SupervisorError::DuplicateId(spec.id).into());
		}
		if let Some(actor) = spec.adopted()
			&& self.children.iter().any(|c| c.actor.as_ref() == Some(actor))
		{
			return Err(SupervisorError::DuplicateActor(actor.id()).into());
		}

		let mut entry = ChildEntry::new(spec);
		let actor = match entry.spec.adopted() {
			Some(actor) => actor.clone(),
			None => start(&entry, cx.runtime())?,
		};
		entry.watch = Some(cx.watch(&actor)?);
		entry.actor = Some(actor.clone());
		tracing::debug!(supervisor = %cx.as_any(), child = %entry.spec.id, actor = %actor, "supervisor.child.add");
		self.children.push(entry);
		Ok(actor)
	}

	async fn remove_child(&mut self, id: &str, terminate: bool, cx: &mut Cx) -> bool {
		let Some(index) = self.find(id) else {
			return false;
		};
		if terminate {
			self.shutdown_child(index, false, cx).await;
		} else {
			let entry = &mut self.children[index];
			if let (Some(actor), Some(watch)) = (&entry.actor, entry.watch.take()) {
				cx.unwatch(actor, watch);
			}
		}
		self.children.remove(index);
		tracing::debug!(supervisor = %cx.as_any(), child = id, terminate, "supervisor.child.remove");
		true
	}

	async fn child_died(&mut self, exit: ExitMessage, cx: &mut Cx) -> Result<()> {
		let dead = exit.actor.id();
		let Some(index) = self
			.children
			.iter()
			.position(|c| c.watch.is_some() && c.watch == exit.watch && c.actor.as_ref().map(AnyActorRef::id) == Some(dead))
		else {
			tracing::trace!(supervisor = %cx.as_any(), actor = %exit.actor, "supervisor.child.stale_exit");
			return Ok(());
		};
		let entry = &mut self.children[index];
		entry.watch = None;
		let id = entry.spec.id.clone();
		let cause = exit.cause;
		tracing::debug!(
			supervisor = %cx.as_any(),
			child = %id,
			actor = %exit.actor,
			cause = ?cause,
			strategy = self.strategy.as_str(),
			"supervisor.child.died"
		);

		match self.strategy.plan(entry.spec.mode, cause.is_none(), index) {
			Plan::One => self.try_restart(&id, Some(cause.is_none()), cx).await,
			Plan::From(first) => {
				let ids: Vec<String> = self.children[first..].iter().map(|c| c.spec.id.clone()).collect();
				for i in first..self.children.len() {
					self.shutdown_child(i, true, cx).await;
				}
				for other in ids {
					let death = (other == id).then_some(cause.is_none());
					self.try_restart(&other, death, cx).await?;
				}
				Ok(())
			}
			Plan::GiveUp => Err(self.give_up(&id, cx)),
		}
	}

	/// Restart routine for one child slot. `Err` means the supervisor gives up.
	///
	/// `death` is `Some(natural)` for the child whose death is being handled
	/// and `None` for siblings restarted along with it.
	async fn try_restart(&mut self, id: &str, death: Option<bool>, cx: &mut Cx) -> Result<()> {
		let Some(index) = self.find(id) else {
			return Ok(());
		};
		match self.children[index].spec.mode {
			ChildMode::Temporary => {
				if death.is_none() {
					self.shutdown_child(index, false, cx).await;
				}
				self.children.remove(index);
				tracing::debug!(supervisor = %cx.as_any(), child = id, "supervisor.child.temporary_removed");
				Ok(())
			}
			ChildMode::Transient if death == Some(true) => {
				self.children.remove(index);
				tracing::debug!(supervisor = %cx.as_any(), child = id, "supervisor.child.transient_removed");
				Ok(())
			}
			ChildMode::Permanent | ChildMode::Transient => {
				self.shutdown_child(index, true, cx).await;
				let now = Instant::now();
				let entry = &mut self.children[index];
				entry.history.record(now);
				let recent = entry.history.count_within(now, entry.spec.window);
				if recent > entry.spec.max_restarts {
					tracing::warn!(
						supervisor = %cx.as_any(),
						child = id,
						recent,
						max_restarts = entry.spec.max_restarts,
						"supervisor.child.budget_exhausted"
					);
					return Err(self.give_up(id, cx));
				}
				if let Err(err) = self.restart(index, cx) {
					tracing::warn!(supervisor = %cx.as_any(), child = id, error = %err, "supervisor.child.restart_failed");
					return Err(self.give_up(id, cx));
				}
				Ok(())
			}
		}
	}

	fn restart(&mut self, index: usize, cx: &mut Cx) -> Result<()> {
		let entry = &mut self.children[index];
		let old = entry.actor.take();
		let actor = start(entry, cx.runtime())?;
		if let Some(monitor) = old.as_ref().and_then(AnyActorRef::monitor) {
			actor.set_monitor(Some(monitor));
		}
		if let Some(monitor) = actor.monitor() {
			monitor.add_restart();
		}
		entry.watch = Some(cx.watch(&actor)?);
		entry.restarts += 1;
		tracing::info!(
			supervisor = %cx.as_any(),
			child = %entry.spec.id,
			previous = ?old.as_ref().map(AnyActorRef::id),
			actor = %actor,
			restarts = entry.restarts,
			"supervisor.child.restart"
		);
		entry.actor = Some(actor);
		Ok(())
	}

	fn give_up(&self, id: &str, cx: &Cx) -> ActorError {
		tracing::warn!(supervisor = %cx.as_any(), child = id, "supervisor.give_up");
		ActorError::Escalated { child: id.to_string() }
	}

	/// Stops one child: unwatch, ask it to shut down, then join.
	///
	/// A child that outlives its deadline is interrupted and joined again;
	/// if it still does not stop it is detached. Unless a restart follows,
	/// the slot forgets the actor and its monitor is stopped.
	async fn shutdown_child(&mut self, index: usize, before_restart: bool, cx: &mut Cx) {
		let deadline = self.children[index]
			.spec
			.shutdown_deadline
			.unwrap_or_else(|| cx.runtime().config().shutdown_deadline());
		let entry = &mut self.children[index];
		let Some(actor) = entry.actor.clone() else {
			return;
		};
		if let Some(watch) = entry.watch.take() {
			cx.unwatch(&actor, watch);
		}
		if !actor.is_done() {
			actor.shutdown_from(Some(cx.as_any()));
		}
		let (supervisor, runtime) = (cx.as_any(), cx.runtime().clone());
		let detached = !join_child(&actor, deadline, &supervisor, &runtime).await;
		if detached || !before_restart {
			if let Some(monitor) = actor.monitor() {
				monitor.stop();
			}
		}
		if !before_restart {
			entry.actor = None;
		}
	}

	async fn shutdown_children(&mut self, cx: &mut Cx) {
		for index in (0..self.children.len()).rev() {
			self.shutdown_child(index, false, cx).await;
		}
		self.children.clear();
	}
}

/// Starts a fresh actor for `entry`, named after the slot if its spec is unnamed.
fn start(entry: &ChildEntry, runtime: &Runtime) -> Result<AnyActorRef> {
	let factory = entry
		.factory
		.as_ref()
		.ok_or_else(|| SupervisorError::NotRestartable(entry.spec.id.clone()))?;
	factory(runtime, Some(&entry.spec.id))
}

/// Joins a stopping child. Returns false if it had to be detached.
async fn join_child(actor: &AnyActorRef, deadline: Duration, supervisor: &AnyActorRef, runtime: &Runtime) -> bool {
	if actor.join_timeout(deadline).await.is_some() {
		return true;
	}
	tracing::debug!(%supervisor, actor = %actor, "supervisor.child.interrupt");
	actor.interrupt();
	if actor.join_timeout(deadline).await.is_some() {
		return true;
	}
	tracing::warn!(%supervisor, actor = %actor, "supervisor.child.detached");
	runtime.registry().unregister(actor);
	false
}

/// Builder for a supervisor actor.
pub struct SupervisorSpec {
	name: Option<String>,
	strategy: RestartStrategy,
	children: Vec<ChildSpec>,
	execution: Execution,
	mailbox: Option<MailboxSpec>,
	register: bool,
}

impl SupervisorSpec {
	pub fn new(name: impl Into<String>, strategy: RestartStrategy) -> Self {
		Self {
			name: Some(name.into()),
			..Self::anonymous(strategy)
		}
	}

	pub fn anonymous(strategy: RestartStrategy) -> Self {
		Self {
			name: None,
			strategy,
			children: Vec::new(),
			execution: Execution::default(),
			mailbox: None,
			register: false,
		}
	}

	/// Adds a child started together with the supervisor, in order.
	#[must_use]
	pub fn child(mut self, child: ChildSpec) -> Self {
		self.children.push(child);
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

	/// Actor spec for starting the supervisor directly or under another supervisor.
	pub fn actor_spec(&self) -> ActorSpec<SupervisorActor> {
		let strategy = self.strategy;
		let children = self.children.clone();
		let build = move || SupervisorActor {
			strategy,
			initial: children.clone(),
			children: Vec::new(),
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

	pub fn spawn(&self, runtime: &Runtime) -> Result<SupervisorRef> {
		let handle = runtime.spawn(self.actor_spec())?;
		Ok(SupervisorRef::new(handle.actor_ref().clone(), runtime.clone()))
	}
}

/// Client for a running supervisor.
#[derive(Clone)]
pub struct SupervisorRef {
	actor: ActorRef<SupervisorMessage>,
	runtime: Runtime,
}

impl fmt::Debug for SupervisorRef {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_tuple("SupervisorRef").field(&self.actor).finish()
	}
}

impl SupervisorRef {
	pub fn new(actor: ActorRef<SupervisorMessage>, runtime: Runtime) -> Self {
		Self { actor, runtime }
	}

	pub fn actor_ref(&self) -> &ActorRef<SupervisorMessage> {
		&self.actor
	}

	pub fn as_any(&self) -> AnyActorRef {
		self.actor.as_any()
	}

	/// Starts or adopts a child and returns its actor.
	pub async fn add_child(&self, spec: ChildSpec) -> Result<AnyActorRef> {
		self.runtime.call(&self.actor, |from| SupervisorMessage::AddChild { from, spec }).await
	}

	/// Current actor of the child slot `id`.
	pub async fn get_child(&self, id: impl Into<String>) -> Result<Option<AnyActorRef>> {
		let id = id.into();
		self.runtime.call(&self.actor, |from| SupervisorMessage::GetChild { from, id }).await
	}

	/// Removes a child slot, stopping its actor when `terminate` is set.
	pub async fn remove_child(&self, id: impl Into<String>, terminate: bool) -> Result<bool> {
		let id = id.into();
		self.runtime
			.call(&self.actor, |from| SupervisorMessage::RemoveChild { from, id, terminate })
			.await
	}

	pub async fn children(&self) -> Result<Vec<ChildInfo>> {
		self.runtime.call(&self.actor, |from| SupervisorMessage::Children { from }).await
	}

	pub fn shutdown(&self) {
		self.actor.shutdown();
	}

	pub async fn join(&self) -> Result<()> {
		self.actor.join().await
	}
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests;
