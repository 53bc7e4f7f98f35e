//! Message-passing protocols layered on [`crate::Actor`]: request/reply,
//! generic servers, event sources and state machines.

pub mod event_source;
pub mod fsm;
pub(crate) mod request_reply;
pub mod server;
pub mod upgrade;

use async_trait::async_trait;

pub use request_reply::ReplyTo;

use crate::actor::ActorContext;
use crate::{ActorError, Result};

/// Hooks of a receive-loop behavior.
#[async_trait]
pub(crate) trait Behavior: Send + 'static {
	type Msg: Send + 'static;

	async fn on_start(&mut self, _cx: &mut ActorContext<Self::Msg>) -> Result<()> {
		Ok(())
	}

	async fn handle(&mut self, msg: Self::Msg, cx: &mut ActorContext<Self::Msg>) -> Result<()>;

	/// No message arrived within the context's idle timeout.
	async fn on_idle(&mut self, _cx: &mut ActorContext<Self::Msg>) -> Result<()> {
		Ok(())
	}

	async fn on_terminate(&mut self, _cause: Option<&ActorError>, _cx: &mut ActorContext<Self::Msg>) {}

	/// Called at the top of every loop iteration.
	fn check_upgrade(&mut self) {}
}

/// Runs `behavior` until it stops, is shut down or fails.
///
/// A graceful stop or shutdown request calls the terminate hook without a
/// cause and returns `Ok`; a failure calls it with the cause and returns it.
pub(crate) async fn run_behavior<B: Behavior>(behavior: &mut B, cx: &mut ActorContext<B::Msg>) -> Result<()> {
	match receive_loop(behavior, cx).await {
		Ok(()) => {
			behavior.on_terminate(None, cx).await;
			Ok(())
		}
		Err(err) if err.is_natural() => {
			behavior.on_terminate(None, cx).await;
			Ok(())
		}
		Err(err) => {
			tracing::debug!(actor = %cx.as_any(), cause = %err, "behavior.terminate");
			behavior.on_terminate(Some(&err), cx).await;
			Err(err)
		}
	}
}

async fn receive_loop<B: Behavior>(behavior: &mut B, cx: &mut ActorContext<B::Msg>) -> Result<()> {
	behavior.on_start(cx).await?;
	while cx.is_running() {
		behavior.check_upgrade();
		let msg = match cx.idle_timeout() {
			Some(timeout) => match cx.receive_timeout(timeout).await? {
				Some(msg) => msg,
				None => {
					behavior.on_idle(cx).await?;
					continue;
				}
			},
			None => cx.receive().await?,
		};
		behavior.handle(msg, cx).await?;
	}
	Ok(())
}
