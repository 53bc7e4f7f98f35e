use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::actor::cell::{self, ActorCell, AnyCell};
use crate::actor::{ActorRef, AnyActorRef, ExitMessage, LifecycleMessage};
use crate::behaviors::request_reply::ReplyTo;
use crate::error::CallError;
use crate::mailbox::Envelope;
use crate::runtime::Runtime;
use crate::token::{ActorId, WatchId};
use crate::{ActorError, Result};

type LifecycleHandler<M> = Box<dyn FnMut(ExitMessage) -> Option<M> + Send>;

#[derive(Debug, Clone, Copy)]
enum Wait {
	Forever,
	Until(Instant),
	Never,
}

/// Loop control shared by the behavior layer.
#[derive(Debug, Clone, Copy)]
struct BehaviorControl {
	running: bool,
	idle_timeout: Option<Duration>,
}

/// The running actor's view of itself: mailbox, lifecycle and runtime.
///
/// Only the actor's own execution context holds one, which keeps the
/// mailbox single-consumer.
pub struct ActorContext<M> {
	cell: Arc<ActorCell<M>>,
	runtime: Runtime,
	lifecycle_handler: Option<LifecycleHandler<M>>,
	control: BehaviorControl,
	call_timeout: Option<Duration>,
}

fn take_user<M>(envelope: Envelope<M>) -> std::result::Result<M, Envelope<M>> {
	match envelope {
		Envelope::User(msg) => Ok(msg),
		other => Err(other),
	}
}

impl<M: Send + 'static> ActorContext<M> {
	pub(crate) fn new(cell: Arc<ActorCell<M>>, runtime: Runtime) -> Self {
		let call_timeout = runtime.config().call_timeout();
		Self {
			cell,
			runtime,
			lifecycle_handler: None,
			control: BehaviorControl {
				running: true,
				idle_timeout: None,
			},
			call_timeout,
		}
	}

	pub(crate) fn cell(&self) -> &Arc<ActorCell<M>> {
		&self.cell
	}

	pub fn id(&self) -> ActorId {
		self.cell.shared().id
	}

	pub fn name(&self) -> Option<&str> {
		self.cell.shared().name()
	}

	pub fn runtime(&self) -> &Runtime {
		&self.runtime
	}

	pub fn self_ref(&self) -> ActorRef<M> {
		ActorRef::local(Arc::clone(self.cell.shared()), Arc::downgrade(&self.cell))
	}

	pub fn as_any(&self) -> AnyActorRef {
		self.cell.me()
	}

	/// Routes watch notifications into the mailbox as user messages.
	///
	/// Returning `None` consumes the notification. Without a handler every
	/// watch notification is consumed.
	pub fn set_lifecycle_handler(&mut self, handler: impl FnMut(ExitMessage) -> Option<M> + Send + 'static) {
		self.lifecycle_handler = Some(Box::new(handler));
	}

	pub fn clear_lifecycle_handler(&mut self) {
		self.lifecycle_handler = None;
	}

	/// Registers this actor in the runtime registry under `name`.
	pub fn register(&self, name: &str) -> Result<()> {
		self.runtime.registry().register(name, self.as_any())?;
		Ok(())
	}

	/// Removes this actor's registry entry, if any.
	pub fn unregister(&self) -> bool {
		self.runtime.registry().unregister(&self.as_any())
	}

	/// Links this actor with `other`: each dies with a link error when the other dies.
	pub fn link(&self, other: impl Into<AnyActorRef>) -> Result<()> {
		cell::link(&*self.cell, &other.into())
	}

	pub fn unlink(&self, other: impl Into<AnyActorRef>) {
		cell::unlink(&*self.cell, &other.into());
	}

	/// Watches `other`. Its death arrives as an [`ExitMessage`] carrying the returned id.
	pub fn watch(&self, other: impl Into<AnyActorRef>) -> Result<WatchId> {
		let id = self.runtime.ids().watch();
		cell::watch(&*self.cell, &other.into(), id)?;
		Ok(id)
	}

	pub fn unwatch(&self, other: impl Into<AnyActorRef>, id: WatchId) {
		cell::unwatch(&other.into(), id);
	}

	/// Raises a pending thrown-in error, if any.
	pub fn checkpoint(&self) -> Result<()> {
		match self.cell.core().take_thrown() {
			Some(err) => Err(err),
			None => Ok(()),
		}
	}

	/// Default timeout for [`ActorContext::call`]. `None` waits forever.
	pub fn set_default_call_timeout(&mut self, timeout: Option<Duration>) {
		self.call_timeout = timeout;
	}

	/// Returns false once a shutdown was requested or [`ActorContext::stop`] was called.
	pub fn is_running(&self) -> bool {
		self.control.running
	}

	/// Ends the behavior loop after the current message.
	pub fn stop(&mut self) {
		self.control.running = false;
	}

	/// Idle timeout used by behavior loops between messages.
	pub fn idle_timeout(&self) -> Option<Duration> {
		self.control.idle_timeout
	}

	pub fn set_idle_timeout(&mut self, timeout: Option<Duration>) {
		self.control.idle_timeout = timeout;
	}

	/// Receives the next message in arrival order.
	pub async fn receive(&mut self) -> Result<M> {
		loop {
			if let Some(msg) = self.scan(Wait::Forever, false, None, take_user).await? {
				return Ok(msg);
			}
		}
	}

	/// Receives the next message, or `None` once `timeout` passes.
	pub async fn receive_timeout(&mut self, timeout: Duration) -> Result<Option<M>> {
		if timeout.is_zero() {
			return self.try_receive().await;
		}
		self.scan(Wait::Until(Instant::now() + timeout), false, None, take_user).await
	}

	/// Receives a message only if one is already queued.
	pub async fn try_receive(&mut self) -> Result<Option<M>> {
		self.scan(Wait::Never, false, None, take_user).await
	}

	/// Receives the first queued message `select` maps to `Some`, leaving the
	/// others in place and in order.
	pub async fn receive_select<T, F>(&mut self, select: F) -> Result<T>
	where
		T: Send,
		F: FnMut(&M) -> Option<T> + Send,
	{
		let mut pick = selector(select);
		loop {
			if let Some(value) = self.scan(Wait::Forever, true, None, &mut pick).await? {
				return Ok(value);
			}
		}
	}

	pub async fn receive_select_timeout<T, F>(&mut self, timeout: Duration, select: F) -> Result<Option<T>>
	where
		T: Send,
		F: FnMut(&M) -> Option<T> + Send,
	{
		let wait = if timeout.is_zero() { Wait::Never } else { Wait::Until(Instant::now() + timeout) };
		self.scan(wait, true, None, selector(select)).await
	}

	pub async fn try_receive_select<T, F>(&mut self, select: F) -> Result<Option<T>>
	where
		T: Send,
		F: FnMut(&M) -> Option<T> + Send,
	{
		self.scan(Wait::Never, true, None, selector(select)).await
	}

	/// Receives the first queued message matching `pred`.
	pub async fn receive_matching<F>(&mut self, pred: F) -> Result<M>
	where
		F: FnMut(&M) -> bool + Send,
	{
		let mut pick = matcher(pred);
		loop {
			if let Some(msg) = self.scan(Wait::Forever, true, None, &mut pick).await? {
				return Ok(msg);
			}
		}
	}

	pub async fn receive_matching_timeout<F>(&mut self, timeout: Duration, pred: F) -> Result<Option<M>>
	where
		F: FnMut(&M) -> bool + Send,
	{
		let wait = if timeout.is_zero() { Wait::Never } else { Wait::Until(Instant::now() + timeout) };
		self.scan(wait, true, None, matcher(pred)).await
	}

	/// Sends a request built around a fresh [`ReplyTo`] and waits for its reply.
	///
	/// The caller is linked to the callee for the duration of the call, so a
	/// callee death surfaces as [`CallError::CalleeDied`]. Other messages that
	/// arrive meanwhile stay queued. Uses the default call timeout.
	pub async fn call<T, R>(&mut self, target: &ActorRef<T>, build: impl FnOnce(ReplyTo<R>) -> T + Send) -> Result<R>
	where
		T: Send + 'static,
		R: Send + 'static,
	{
		let timeout = self.call_timeout;
		self.call_inner(target, build, timeout).await
	}

	pub async fn call_timeout<T, R>(&mut self, target: &ActorRef<T>, timeout: Duration, build: impl FnOnce(ReplyTo<R>) -> T + Send) -> Result<R>
	where
		T: Send + 'static,
		R: Send + 'static,
	{
		self.call_inner(target, build, Some(timeout)).await
	}

	async fn call_inner<T, R>(&mut self, target: &ActorRef<T>, build: impl FnOnce(ReplyTo<R>) -> T + Send, timeout: Option<Duration>) -> Result<R>
	where
		T: Send + 'static,
		R: Send + 'static,
	{
		let callee = target.as_any();
		if callee.id() == self.id() {
			return Err(CallError::SelfCall.into());
		}
		let _link = if !callee.is_remote() && !self.cell.core().has_link(callee.id()) {
			cell::link(&*self.cell, &callee)?;
			Some(CallLink {
				cell: Arc::clone(&self.cell),
				callee: callee.clone(),
			})
		} else {
			None
		};

		let id = self.runtime.ids().request();
		target.send(build(ReplyTo::new(id, self.as_any()))).await;
		tracing::trace!(caller = %self.as_any(), callee = %callee, request = %id, "actor.call");

		let wait = match timeout {
			Some(timeout) => Wait::Until(Instant::now() + timeout),
			None => Wait::Forever,
		};
		let response = loop {
			let picked = self
				.scan(wait, true, Some(callee.id()), |envelope| match envelope {
					Envelope::Response(response) if response.id == id => Ok(response),
					other => Err(other),
				})
				.await;
			match picked {
				Ok(Some(response)) => break Ok(response),
				Ok(None) if matches!(wait, Wait::Forever) => continue,
				Ok(None) => break Err(ActorError::from(CallError::Timeout(timeout.unwrap_or_default()))),
				Err(err) => break Err(err),
			}
		};

		response?.into_result()
	}

	/// Core mailbox scan shared by every receive flavor.
	///
	/// Envelopes are taken one at a time after `cursor`; lifecycle envelopes
	/// are filtered, rejected envelopes go back in sequence order and the
	/// cursor moves past them. Blocking happens only after the whole queue
	/// was scanned.
	async fn scan<T, F>(&mut self, wait: Wait, selective: bool, callee: Option<ActorId>, mut pick: F) -> Result<Option<T>>
	where
		T: Send,
		F: FnMut(Envelope<M>) -> std::result::Result<T, Envelope<M>> + Send,
	{
		let cell = Arc::clone(&self.cell);
		let monitor = cell.shared().monitor();
		if selective && let Some(monitor) = &monitor {
			monitor.reset_skipped();
		}

		let mut cursor = None;
		loop {
			self.checkpoint()?;
			let notified = cell.mailbox.notified();
			while let Some((seq, envelope)) = cell.mailbox.take_after(cursor) {
				let envelope = match envelope {
					Envelope::Lifecycle(msg) => {
						let filtered = self.filter_lifecycle(msg, callee);
						match filtered {
							Ok(Some(mapped)) => Envelope::User(mapped),
							Ok(None) => {
								cell.mailbox.release(seq);
								continue;
							}
							Err(err) => {
								cell.mailbox.release(seq);
								return Err(err);
							}
						}
					}
					other => other,
				};
				match pick(envelope) {
					Ok(value) => {
						cell.mailbox.release(seq);
						if let Some(monitor) = &monitor {
							monitor.add_message();
						}
						return Ok(Some(value));
					}
					Err(Envelope::Response(response)) => {
						cell.mailbox.release(seq);
						tracing::trace!(actor = %cell.me(), request = %response.id, "actor.response.stale");
					}
					Err(envelope) => {
						cell.mailbox.put_back(seq, envelope);
						cursor = Some(seq);
						if let Some(monitor) = &monitor {
							monitor.skipped_message();
						}
					}
				}
			}

			match wait {
				Wait::Never => return Ok(None),
				Wait::Forever => notified.await,
				Wait::Until(deadline) => {
					if tokio::time::timeout_at(deadline, notified).await.is_err() {
						self.checkpoint()?;
						return Ok(None);
					}
				}
			}
		}
	}

	fn filter_lifecycle(&mut self, msg: LifecycleMessage, callee: Option<ActorId>) -> Result<Option<M>> {
		match msg {
			LifecycleMessage::Shutdown { from } => {
				tracing::debug!(actor = %self.as_any(), from = ?from.as_ref().map(AnyActorRef::id), "actor.shutdown.requested");
				self.control.running = false;
				Err(ActorError::ShutdownRequested)
			}
			LifecycleMessage::Exit(exit) => {
				let dead = exit.actor.id();
				self.cell.core().remove_listeners_of(dead);
				if exit.is_link() {
					let cause = exit.cause.map(Box::new);
					if callee == Some(dead) {
						return Err(CallError::CalleeDied { actor: dead, cause }.into());
					}
					return Err(ActorError::LinkedActorDied { actor: dead, cause });
				}
				Ok(self.lifecycle_handler.as_mut().and_then(|handler| handler(exit)))
			}
		}
	}
}

/// Link held for the duration of one call. Dropping it unlinks, so a
/// cancelled call leaves the callee unlinked.
struct CallLink<M: Send + 'static> {
	cell: Arc<ActorCell<M>>,
	callee: AnyActorRef,
}

impl<M: Send + 'static> Drop for CallLink<M> {
	fn drop(&mut self) {
		cell::unlink(&*self.cell, &self.callee);
	}
}

fn selector<M, T>(mut select: impl FnMut(&M) -> Option<T> + Send) -> impl FnMut(Envelope<M>) -> std::result::Result<T, Envelope<M>> + Send {
	move |envelope| match envelope {
		Envelope::User(msg) => match select(&msg) {
			Some(value) => Ok(value),
			None => Err(Envelope::User(msg)),
		},
		other => Err(other),
	}
}

fn matcher<M>(mut pred: impl FnMut(&M) -> bool + Send) -> impl FnMut(Envelope<M>) -> std::result::Result<M, Envelope<M>> + Send {
	move |envelope| match envelope {
		Envelope::User(msg) if pred(&msg) => Ok(msg),
		other => Err(other),
	}
}
