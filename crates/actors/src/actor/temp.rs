use std::convert::Infallible;
use std::time::Duration;

use crate::actor::cell;
use crate::actor::{ActorContext, ActorRef, AnyActorRef};
use crate::behaviors::request_reply::ReplyTo;
use crate::Result;

/// Short-lived actor identity for code running outside any actor.
///
/// Lets plain async code take part in request/reply: the callee sees a
/// normal caller ref and links to it for the duration of the call. The
/// identity dies when the `TempActor` is dropped.
pub struct TempActor {
	cx: ActorContext<Infallible>,
}

impl TempActor {
	pub(crate) fn new(cx: ActorContext<Infallible>) -> Self {
		Self { cx }
	}

	pub fn as_any(&self) -> AnyActorRef {
		self.cx.as_any()
	}

	pub fn actor_ref(&self) -> ActorRef<Infallible> {
		self.cx.self_ref()
	}

	/// See [`ActorContext::call`].
	pub async fn call<T, R>(&mut self, target: &ActorRef<T>, build: impl FnOnce(ReplyTo<R>) -> T + Send) -> Result<R>
	where
		T: Send + 'static,
		R: Send + 'static,
	{
		self.cx.call(target, build).await
	}

	/// See [`ActorContext::call_timeout`].
	pub async fn call_timeout<T, R>(&mut self, target: &ActorRef<T>, timeout: Duration, build: impl FnOnce(ReplyTo<R>) -> T + Send) -> Result<R>
	where
		T: Send + 'static,
		R: Send + 'static,
	{
		self.cx.call_timeout(target, timeout, build).await
	}
}

impl Drop for TempActor {
	fn drop(&mut self) {
		cell::die(&**self.cx.cell(), None);
	}
}
