//! Generic call/cast server.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::actor::{Actor, ActorContext, ActorRef, ActorSpec, ExitMessage};
use crate::behaviors::upgrade::Upgrade;
use crate::behaviors::{Behavior, ReplyTo, run_behavior};
use crate::mailbox::MailboxSpec;
use crate::runtime::Runtime;
use crate::{ActorError, Execution, Result};

/// Context type handed to [`ServerHandler`] hooks.
pub type ServerContext<H> = ActorContext<ServerMessage<H>>;

/// User logic of a server actor.
#[async_trait]
pub trait ServerHandler: Send + Sized + 'static {
	type Call: Send + 'static;
	type Reply: Send + 'static;
	type Cast: Send + 'static;

	async fn init(&mut self, _cx: &mut ServerContext<Self>) -> Result<()> {
		Ok(())
	}

	/// Handles a request.
	///
	/// `Ok(Some(reply))` answers right away. `Ok(None)` defers: keep a clone
	/// of `from` and reply later. `Err` is sent back to the caller as an
	/// error reply and the server keeps running.
	async fn handle_call(&mut self, from: &ReplyTo<Self::Reply>, request: Self::Call, cx: &mut ServerContext<Self>) -> Result<Option<Self::Reply>>;

	/// Handles a fire-and-forget message. `Err` stops the server.
	async fn handle_cast(&mut self, _msg: Self::Cast, _cx: &mut ServerContext<Self>) -> Result<()> {
		Ok(())
	}

	/// Death of an actor this server watches.
	async fn handle_exit(&mut self, _exit: ExitMessage, _cx: &mut ServerContext<Self>) -> Result<()> {
		Ok(())
	}

	/// Fires each time the idle timeout passes without a message.
	async fn handle_timeout(&mut self, _cx: &mut ServerContext<Self>) -> Result<()> {
		Ok(())
	}

	async fn terminate(&mut self, _cause: Option<&ActorError>, _cx: &mut ServerContext<Self>) {}
}

/// Mailbox message of a server actor.
pub enum ServerMessage<H: ServerHandler> {
	Call { from: ReplyTo<H::Reply>, request: H::Call },
	Cast(H::Cast),
	Exit(ExitMessage),
}

impl<H: ServerHandler> fmt::Debug for ServerMessage<H> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Call { from, .. } => f.debug_struct("Call").field("request", &from.id()).finish_non_exhaustive(),
			Self::Cast(_) => f.write_str("Cast"),
			Self::Exit(exit) => f.debug_tuple("Exit").field(&exit.actor).finish(),
		}
	}
}

/// Actor running a [`ServerHandler`].
pub struct ServerActor<H: ServerHandler> {
	handler: H,
	idle_timeout: Option<Duration>,
	upgrade: Option<Arc<dyn Upgrade<H>>>,
}

#[async_trait]
impl<H: ServerHandler> Actor for ServerActor<H> {
	type Msg = ServerMessage<H>;
	type Output = ();

	async fn run(&mut self, cx: &mut ServerContext<H>) -> Result<()> {
		cx.set_idle_timeout(self.idle_timeout);
		cx.set_lifecycle_handler(|exit| Some(ServerMessage::Exit(exit)));
		run_behavior(self, cx).await
	}
}

#[async_trait]
impl<H: ServerHandler> Behavior for ServerActor<H> {
	type Msg = ServerMessage<H>;

	async fn on_start(&mut self, cx: &mut ServerContext<H>) -> Result<()> {
		self.handler.init(cx).await
	}

	async fn handle(&mut self, msg: ServerMessage<H>, cx: &mut ServerContext<H>) -> Result<()> {
		match msg {
			ServerMessage::Call { from, request } => match self.handler.handle_call(&from, request, cx).await {
				Ok(Some(reply)) => {
					from.reply(reply);
				}
				Ok(None) => {}
				Err(err) => {
					tracing::debug!(actor = %cx.as_any(), request = %from.id(), error = %err, "server.call.failed");
					from.reply_error(err);
				}
			},
			ServerMessage::Cast(msg) => self.handler.handle_cast(msg, cx).await?,
			ServerMessage::Exit(exit) => self.handler.handle_exit(exit, cx).await?,
		}
		Ok(())
	}

	async fn on_idle(&mut self, cx: &mut ServerContext<H>) -> Result<()> {
		self.handler.handle_timeout(cx).await
	}

	async fn on_terminate(&mut self, cause: Option<&ActorError>, cx: &mut ServerContext<H>) {
		self.handler.terminate(cause, cx).await;
	}

	fn check_upgrade(&mut self) {
		if let Some(upgrade) = &self.upgrade
			&& let Some(next) = upgrade.upgrade(&mut self.handler)
		{
			tracing::info!(handler = std::any::type_name::<H>(), "server.upgrade");
			self.handler = next;
		}
	}
}

/// Builder for a server actor.
pub struct ServerSpec<H: ServerHandler> {
	name: Option<String>,
	factory: Arc<dyn Fn() -> H + Send + Sync>,
	idle_timeout: Option<Duration>,
	upgrade: Option<Arc<dyn Upgrade<H>>>,
	execution: Execution,
	mailbox: Option<MailboxSpec>,
	register: bool,
}

impl<H: ServerHandler> ServerSpec<H> {
	pub fn new(name: impl Into<String>, factory: impl Fn() -> H + Send + Sync + 'static) -> Self {
		Self {
			name: Some(name.into()),
			..Self::anonymous(factory)
		}
	}

	pub fn anonymous(factory: impl Fn() -> H + Send + Sync + 'static) -> Self {
		Self {
			name: None,
			factory: Arc::new(factory),
			idle_timeout: None,
			upgrade: None,
			execution: Execution::default(),
			mailbox: None,
			register: false,
		}
	}

	/// Calls [`ServerHandler::handle_timeout`] whenever no message arrives for `timeout`.
	#[must_use]
	pub fn idle_timeout(mut self, timeout: Duration) -> Self {
		self.idle_timeout = Some(timeout);
		self
	}

	#[must_use]
	pub fn upgrade(mut self, upgrade: Arc<dyn Upgrade<H>>) -> Self {
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

	/// Actor spec for starting the server directly or under a supervisor.
	pub fn actor_spec(&self) -> ActorSpec<ServerActor<H>> {
		let factory = Arc::clone(&self.factory);
		let idle_timeout = self.idle_timeout;
		let upgrade = self.upgrade.clone();
		let build = move || ServerActor {
			handler: factory(),
			idle_timeout,
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

	pub fn spawn(&self, runtime: &Runtime) -> Result<ServerRef<H>> {
		let handle = runtime.spawn(self.actor_spec())?;
		Ok(ServerRef::new(handle.actor_ref().clone(), runtime.clone()))
	}
}

/// Typed client for a running server.
pub struct ServerRef<H: ServerHandler> {
	actor: ActorRef<ServerMessage<H>>,
	runtime: Runtime,
}

impl<H: ServerHandler> Clone for ServerRef<H> {
	fn clone(&self) -> Self {
		Self {
			actor: self.actor.clone(),
			runtime: self.runtime.clone(),
		}
	}
}

impl<H: ServerHandler> fmt::Debug for ServerRef<H> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_tuple("ServerRef").field(&self.actor).finish()
	}
}

impl<H: ServerHandler> ServerRef<H> {
	/// Wraps a ref obtained elsewhere, for example from the registry.
	pub fn new(actor: ActorRef<ServerMessage<H>>, runtime: Runtime) -> Self {
		Self { actor, runtime }
	}

	pub fn actor_ref(&self) -> &ActorRef<ServerMessage<H>> {
		&self.actor
	}

	/// Calls from outside any actor, with the runtime's default timeout.
	pub async fn call(&self, request: H::Call) -> Result<H::Reply> {
		self.runtime.call(&self.actor, |from| ServerMessage::Call { from, request }).await
	}

	pub async fn call_timeout(&self, request: H::Call, timeout: Duration) -> Result<H::Reply> {
		self.runtime
			.call_timeout(&self.actor, timeout, |from| ServerMessage::Call { from, request })
			.await
	}

	/// Calls from inside another actor, using that actor's identity.
	pub async fn call_from<M: Send + 'static>(&self, cx: &mut ActorContext<M>, request: H::Call) -> Result<H::Reply> {
		cx.call(&self.actor, |from| ServerMessage::Call { from, request }).await
	}

	pub async fn cast(&self, msg: H::Cast) {
		self.actor.send(ServerMessage::Cast(msg)).await;
	}

	pub fn shutdown(&self) {
		self.actor.shutdown();
	}

	pub async fn join(&self) -> Result<()> {
		self.actor.join().await
	}
}
