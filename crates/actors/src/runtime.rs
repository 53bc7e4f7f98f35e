use std::collections::HashMap;
use std::convert::Infallible;
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;

use crate::actor::cell::{self, ActorCell, ActorShared, AnyCell, Respawn};
use crate::actor::{Actor, ActorContext, ActorHandle, ActorRef, ActorSpec, AnyActorRef, RemotePort, TempActor};
use crate::behaviors::request_reply::ReplyTo;
use crate::config::RuntimeConfig;
use crate::error::RegistrationError;
use crate::mailbox::MailboxSpec;
use crate::monitor::{CounterMonitor, MonitorFactory};
use crate::registry::Registry;
use crate::spawn::{self, join_error_panic_message, spawn_task};
use crate::token::{ActorId, IdClock};
use crate::{ActorError, Execution, Result};

struct RuntimeInner {
	config: RuntimeConfig,
	ids: IdClock,
	registry: Registry,
	/// Strong owners of every live cell. Refs and listeners only hold weak pointers.
	actors: Mutex<HashMap<ActorId, Arc<dyn AnyCell>>>,
}

/// Explicit runtime context: id allocation, registry and the live-actor arena.
///
/// Cheap to clone. Every actor context carries one, so a runtime stays
/// alive while any of its actors runs.
#[derive(Clone)]
pub struct Runtime {
	inner: Arc<RuntimeInner>,
}

/// Non-owning runtime handle held by actor cells.
#[derive(Clone)]
pub(crate) struct WeakRuntime(Weak<RuntimeInner>);

impl WeakRuntime {
	pub(crate) fn upgrade(&self) -> Option<Runtime> {
		self.0.upgrade().map(|inner| Runtime { inner })
	}
}

/// Builder for a [`Runtime`].
#[derive(Default)]
pub struct RuntimeBuilder {
	config: RuntimeConfig,
	monitors: Option<MonitorFactory>,
}

impl RuntimeBuilder {
	#[must_use]
	pub fn config(mut self, config: RuntimeConfig) -> Self {
		self.config = config;
		self
	}

	/// Monitor factory applied to actors when they register. Overrides
	/// [`RuntimeConfig::monitor_registered`].
	#[must_use]
	pub fn monitor_factory(mut self, factory: MonitorFactory) -> Self {
		self.monitors = Some(factory);
		self
	}

	pub fn build(self) -> Runtime {
		let monitors = self
			.monitors
			.or_else(|| self.config.monitor_registered.then(CounterMonitor::factory));
		Runtime {
			inner: Arc::new(RuntimeInner {
				config: self.config,
				ids: IdClock::new(),
				registry: Registry::new(monitors),
				actors: Mutex::new(HashMap::new()),
			}),
		}
	}
}

impl Default for Runtime {
	fn default() -> Self {
		Self::new()
	}
}

impl fmt::Debug for Runtime {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Runtime")
			.field("live_actors", &self.live_actors())
			.field("registered", &self.inner.registry.len())
			.finish()
	}
}

impl Runtime {
	pub fn new() -> Self {
		Self::builder().build()
	}

	pub fn with_config(config: RuntimeConfig) -> Self {
		Self::builder().config(config).build()
	}

	pub fn builder() -> RuntimeBuilder {
		RuntimeBuilder::default()
	}

	pub fn config(&self) -> &RuntimeConfig {
		&self.inner.config
	}

	pub fn registry(&self) -> &Registry {
		&self.inner.registry
	}

	pub(crate) fn ids(&self) -> &IdClock {
		&self.inner.ids
	}

	pub(crate) fn downgrade(&self) -> WeakRuntime {
		WeakRuntime(Arc::downgrade(&self.inner))
	}

	/// Starts an actor from `spec`.
	///
	/// The actor is registered (if the spec asks for it) before it first
	/// runs, so it can be looked up as soon as this returns.
	pub fn spawn<A: Actor>(&self, spec: ActorSpec<A>) -> Result<ActorHandle<A>> {
		let id = self.inner.ids.actor();
		let shared = ActorShared::new(id, spec.name.clone(), Some(respawner(spec.clone())));
		let mailbox = spec.mailbox.unwrap_or_else(|| self.inner.config.mailbox());
		let cell = ActorCell::<A::Msg>::new(Arc::clone(&shared), mailbox, self.downgrade());
		self.insert_actor(Arc::clone(&cell) as Arc<dyn AnyCell>);

		if spec.register {
			let registered = match shared.name() {
				Some(name) => self.inner.registry.register(name, cell.me()),
				None => Err(RegistrationError::Unnamed),
			};
			if let Err(err) = registered {
				let err = ActorError::from(err);
				cell::die(&*cell, Some(err.clone()));
				return Err(err);
			}
		}

		let actor_ref = ActorRef::local(Arc::clone(&shared), Arc::downgrade(&cell));
		let output = Arc::new(Mutex::new(None));
		let thread_name = match shared.name() {
			Some(name) => format!("{}-{name}", self.inner.config.thread_name_prefix),
			None => format!("{}-{}", self.inner.config.thread_name_prefix, id.get()),
		};
		let cx = ActorContext::new(Arc::clone(&cell), self.clone());
		let driver = drive((spec.factory)(), cx, Arc::clone(&output), spec.execution);
		if let Err(err) = spawn::launch(spec.execution, thread_name, driver) {
			let err = ActorError::Spawn(err.to_string());
			cell::die(&*cell, Some(err.clone()));
			return Err(err);
		}
		Ok(ActorHandle::new(actor_ref, output))
	}

	/// Creates a caller identity for request/reply from outside any actor.
	pub fn temp_actor(&self) -> TempActor {
		let shared = ActorShared::new(self.inner.ids.actor(), None, None);
		let cell = ActorCell::<Infallible>::new(shared, MailboxSpec::unbounded(), self.downgrade());
		self.insert_actor(Arc::clone(&cell) as Arc<dyn AnyCell>);
		TempActor::new(ActorContext::new(cell, self.clone()))
	}

	/// One-shot call from outside any actor, through a throwaway [`TempActor`].
	pub async fn call<T, R>(&self, target: &ActorRef<T>, build: impl FnOnce(ReplyTo<R>) -> T + Send) -> Result<R>
	where
		T: Send + 'static,
		R: Send + 'static,
	{
		let mut temp = self.temp_actor();
		temp.call(target, build).await
	}

	pub async fn call_timeout<T, R>(&self, target: &ActorRef<T>, timeout: Duration, build: impl FnOnce(ReplyTo<R>) -> T + Send) -> Result<R>
	where
		T: Send + 'static,
		R: Send + 'static,
	{
		let mut temp = self.temp_actor();
		temp.call_timeout(target, timeout, build).await
	}

	/// Builds a ref whose sends go through `port`.
	pub fn remote_ref<M: Send + 'static>(&self, name: impl Into<String>, port: Arc<dyn RemotePort<M>>) -> ActorRef<M> {
		let shared = ActorShared::new(self.inner.ids.actor(), Some(name.into()), None);
		ActorRef::remote(shared, port)
	}

	/// Number of actors not yet dead, temp actors included.
	pub fn live_actors(&self) -> usize {
		self.inner.actors.lock().len()
	}

	/// Refs to every live actor, in id order.
	pub fn actors(&self) -> Vec<AnyActorRef> {
		let mut actors: Vec<_> = self.inner.actors.lock().values().map(|cell| cell.me()).collect();
		actors.sort_by_key(AnyActorRef::id);
		actors
	}

	/// Asks every live actor to stop and waits up to `deadline` in total.
	///
	/// Actors still running at the deadline are interrupted; any that
	/// ignore the interrupt too are detached and marked dead. Returns the
	/// number detached.
	pub async fn shutdown(&self, deadline: Duration) -> usize {
		let cells: Vec<Arc<dyn AnyCell>> = self.inner.actors.lock().values().cloned().collect();
		tracing::debug!(actors = cells.len(), "runtime.shutdown");
		for cell in &cells {
			cell.me().shutdown();
		}

		let until = tokio::time::Instant::now() + deadline;
		let mut detached = 0;
		for cell in &cells {
			let actor = cell.me();
			let remaining = until.saturating_duration_since(tokio::time::Instant::now());
			if actor.join_timeout(remaining).await.is_some() {
				continue;
			}
			actor.interrupt();
			if actor.join_timeout(deadline).await.is_none() {
				tracing::warn!(actor = %actor, "runtime.shutdown.detached");
				cell::die(&**cell, Some(ActorError::Interrupted));
				detached += 1;
			}
		}
		detached
	}

	pub(crate) fn insert_actor(&self, cell: Arc<dyn AnyCell>) {
		self.inner.actors.lock().insert(cell.shared().id, cell);
	}

	pub(crate) fn remove_actor(&self, id: ActorId) {
		let removed = self.inner.actors.lock().remove(&id);
		drop(removed);
	}
}

/// Factory starting a fresh actor from `spec`, optionally naming an unnamed one.
pub(crate) fn respawner<A: Actor>(spec: ActorSpec<A>) -> Respawn {
	Arc::new(move |runtime: &Runtime, name: Option<&str>| {
		runtime.spawn(spec.clone().with_default_name(name)).map(|handle| handle.as_any())
	})
}

/// Runs one actor to completion and performs its death routine.
///
/// The actor body runs in its own task so a panic is caught as a
/// [`tokio::task::JoinError`] and recorded as the death cause.
async fn drive<A: Actor>(mut actor: A, mut cx: ActorContext<A::Msg>, output: Arc<Mutex<Option<A::Output>>>, execution: Execution) {
	let cell = Arc::clone(cx.cell());
	let token = cell.core().interrupt.clone();
	tracing::debug!(actor = %cell.me(), execution = execution.as_str(), "actor.start");

	let body = spawn_task(execution, async move {
		tokio::select! {
			biased;
			_ = token.cancelled() => Err(ActorError::Interrupted),
			res = actor.run(&mut cx) => res,
		}
	});

	let cause = match body.await {
		Ok(Ok(value)) => {
			*output.lock() = Some(value);
			None
		}
		Ok(Err(err)) if err.is_natural() => None,
		Ok(Err(err)) => Some(err),
		Err(err) => Some(match join_error_panic_message(err) {
			Some(msg) => ActorError::Panicked(msg),
			None => ActorError::Interrupted,
		}),
	};
	cell::die(&*cell, cause);
}
