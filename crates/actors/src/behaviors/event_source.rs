//! Publish/subscribe actor holding a list of event handlers.

use std::fmt;

use async_trait::async_trait;

use crate::actor::{Actor, ActorContext, ActorRef, ActorSpec};
use crate::behaviors::{Behavior, ReplyTo, run_behavior};
use crate::mailbox::MailboxSpec;
use crate::runtime::Runtime;
use crate::{ActorError, Execution, Result};

/// Receives every event published by an event source.
pub trait EventHandler<E>: Send + 'static {
	fn handle_event(&mut self, event: &E);
}

impl<E, F> EventHandler<E> for F
where
	F: FnMut(&E) + Send + 'static,
{
	fn handle_event(&mut self, event: &E) {
		self(event);
	}
}

/// Identifies an installed handler for later removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(u64);

impl fmt::Display for HandlerId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "handler-{}", self.0)
	}
}

/// Mailbox message of an event source.
pub enum EventSourceMessage<E> {
	AddHandler { from: ReplyTo<HandlerId>, handler: Box<dyn EventHandler<E>> },
	RemoveHandler { from: ReplyTo<bool>, id: HandlerId },
	Notify(E),
}

/// Actor fanning events out to its handlers in installation order.
pub struct EventSourceActor<E> {
	handlers: Vec<(HandlerId, Box<dyn EventHandler<E>>)>,
	next_id: u64,
}

impl<E> Default for EventSourceActor<E> {
	fn default() -> Self {
		Self {
			handlers: Vec::new(),
			next_id: 0,
		}
	}
}

#[async_trait]
impl<E: Send + 'static> Actor for EventSourceActor<E> {
	type Msg = EventSourceMessage<E>;
	type Output = ();

	async fn run(&mut self, cx: &mut ActorContext<EventSourceMessage<E>>) -> Result<()> {
		run_behavior(self, cx).await
	}
}

#[async_trait]
impl<E: Send + 'static> Behavior for EventSourceActor<E> {
	type Msg = EventSourceMessage<E>;

	async fn handle(&mut self, msg: EventSourceMessage<E>, cx: &mut ActorContext<EventSourceMessage<E>>) -> Result<()> {
		match msg {
			EventSourceMessage::AddHandler { from, handler } => {
				self.next_id += 1;
				let id = HandlerId(self.next_id);
				self.handlers.push((id, handler));
				tracing::trace!(actor = %cx.as_any(), handler = %id, "event_source.add_handler");
				from.reply(id);
			}
			EventSourceMessage::RemoveHandler { from, id } => {
				let before = self.handlers.len();
				self.handlers.retain(|(h, _)| *h != id);
				from.reply(self.handlers.len() != before);
			}
			EventSourceMessage::Notify(event) => {
				for (_, handler) in &mut self.handlers {
					handler.handle_event(&event);
				}
			}
		}
		Ok(())
	}

	async fn on_terminate(&mut self, _cause: Option<&ActorError>, _cx: &mut ActorContext<EventSourceMessage<E>>) {
		self.handlers.clear();
	}
}

/// Builder for an event source actor.
pub struct EventSourceSpec {
	name: Option<String>,
	execution: Execution,
	mailbox: Option<MailboxSpec>,
	register: bool,
}

impl EventSourceSpec {
	pub fn new(name: impl Into<String>) -> Self {
		Self {
			name: Some(name.into()),
			..Self::anonymous()
		}
	}

	pub fn anonymous() -> Self {
		Self {
			name: None,
			execution: Execution::default(),
			mailbox: None,
			register: false,
		}
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

	pub fn actor_spec<E: Send + 'static>(&self) -> ActorSpec<EventSourceActor<E>> {
		let mut spec = match &self.name {
			Some(name) => ActorSpec::new(name.clone(), EventSourceActor::default),
			None => ActorSpec::anonymous(EventSourceActor::default),
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

	pub fn spawn<E: Send + 'static>(&self, runtime: &Runtime) -> Result<EventSourceRef<E>> {
		let handle = runtime.spawn(self.actor_spec::<E>())?;
		Ok(EventSourceRef::new(handle.actor_ref().clone(), runtime.clone()))
	}
}

/// Typed client for a running event source.
pub struct EventSourceRef<E> {
	actor: ActorRef<EventSourceMessage<E>>,
	runtime: Runtime,
}

impl<E> Clone for EventSourceRef<E> {
	fn clone(&self) -> Self {
		Self {
			actor: self.actor.clone(),
			runtime: self.runtime.clone(),
		}
	}
}

impl<E: Send + 'static> EventSourceRef<E> {
	pub fn new(actor: ActorRef<EventSourceMessage<E>>, runtime: Runtime) -> Self {
		Self { actor, runtime }
	}

	pub fn actor_ref(&self) -> &ActorRef<EventSourceMessage<E>> {
		&self.actor
	}

	/// Installs a handler and returns its id once the source accepted it.
	pub async fn add_handler(&self, handler: impl EventHandler<E>) -> Result<HandlerId> {
		let handler: Box<dyn EventHandler<E>> = Box::new(handler);
		self.runtime
			.call(&self.actor, |from| EventSourceMessage::AddHandler { from, handler })
			.await
	}

	/// Removes a handler. Returns false if it was not installed.
	pub async fn remove_handler(&self, id: HandlerId) -> Result<bool> {
		self.runtime
			.call(&self.actor, |from| EventSourceMessage::RemoveHandler { from, id })
			.await
	}

	/// Publishes an event without waiting for handlers to run.
	pub async fn notify(&self, event: E) {
		self.actor.send(EventSourceMessage::Notify(event)).await;
	}

	pub fn shutdown(&self) {
		self.actor.shutdown();
	}

	pub async fn join(&self) -> Result<()> {
		self.actor.join().await
	}
}
