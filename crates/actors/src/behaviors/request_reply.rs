use std::any::Any;
use std::fmt;
use std::marker::PhantomData;

use crate::actor::AnyActorRef;
use crate::error::CallError;
use crate::token::RequestId;
use crate::{ActorError, Result};

/// Reply envelope routed back to a waiting caller.
pub(crate) struct Response {
	pub(crate) id: RequestId,
	payload: std::result::Result<Box<dyn Any + Send>, ActorError>,
}

impl Response {
	/// Unpacks the reply as `R`. Error replies surface as [`CallError::Failed`].
	pub(crate) fn into_result<R: 'static>(self) -> Result<R> {
		match self.payload {
			Ok(value) => match value.downcast::<R>() {
				Ok(value) => Ok(*value),
				Err(_) => Err(CallError::UnexpectedReply.into()),
			},
			Err(err) => Err(CallError::Failed(Box::new(err)).into()),
		}
	}
}

/// Return address of one request, carried inside the request message.
///
/// Replying is fire-and-forget: if the caller has died or stopped waiting,
/// the reply is dropped. A handler may keep the `ReplyTo` and answer later.
pub struct ReplyTo<R> {
	id: RequestId,
	caller: AnyActorRef,
	_reply: PhantomData<fn(R)>,
}

impl<R> Clone for ReplyTo<R> {
	fn clone(&self) -> Self {
		Self {
			id: self.id,
			caller: self.caller.clone(),
			_reply: PhantomData,
		}
	}
}

impl<R> fmt::Debug for ReplyTo<R> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ReplyTo").field("id", &self.id).field("caller", &self.caller).finish()
	}
}

impl<R: Send + 'static> ReplyTo<R> {
	pub(crate) fn new(id: RequestId, caller: AnyActorRef) -> Self {
		Self {
			id,
			caller,
			_reply: PhantomData,
		}
	}

	pub fn id(&self) -> RequestId {
		self.id
	}

	/// The actor waiting for the reply.
	pub fn caller(&self) -> &AnyActorRef {
		&self.caller
	}

	/// Sends the value to the caller. Returns false if nobody can receive it.
	pub fn reply(&self, value: R) -> bool {
		self.deliver(Ok(Box::new(value)))
	}

	/// Fails the caller's request with `err`.
	pub fn reply_error(&self, err: ActorError) -> bool {
		self.deliver(Err(err))
	}

	fn deliver(&self, payload: std::result::Result<Box<dyn Any + Send>, ActorError>) -> bool {
		let delivered = self.caller.deliver_response(Response { id: self.id, payload });
		if !delivered {
			tracing::debug!(caller = %self.caller, request = %self.id, "actor.reply.lost");
		}
		delivered
	}
}
