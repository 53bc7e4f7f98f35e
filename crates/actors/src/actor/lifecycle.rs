use crate::actor::AnyActorRef;
use crate::token::WatchId;
use crate::ActorError;

/// System message delivered to an actor's mailbox by the runtime.
#[derive(Debug, Clone)]
pub enum LifecycleMessage {
	/// An observed actor died.
	Exit(ExitMessage),
	/// Graceful stop request, usually from a supervisor.
	Shutdown { from: Option<AnyActorRef> },
}

/// Notification that an observed actor died.
///
/// `watch` is `None` for link notifications, which are raised as errors from
/// receive, and `Some` for watch notifications, which go to the lifecycle
/// handler.
#[derive(Debug, Clone)]
pub struct ExitMessage {
	pub actor: AnyActorRef,
	pub cause: Option<ActorError>,
	pub watch: Option<WatchId>,
}

impl ExitMessage {
	/// Returns true when this notification comes from a link.
	pub fn is_link(&self) -> bool {
		self.watch.is_none()
	}
}

/// Observer installed on an actor by link or watch.
#[derive(Debug, Clone)]
pub(crate) enum Listener {
	Link(AnyActorRef),
	Watch { observer: AnyActorRef, id: WatchId },
}

impl Listener {
	pub(crate) fn observer(&self) -> &AnyActorRef {
		match self {
			Self::Link(observer) | Self::Watch { observer, .. } => observer,
		}
	}

	pub(crate) fn watch_id(&self) -> Option<WatchId> {
		match self {
			Self::Link(_) => None,
			Self::Watch { id, .. } => Some(*id),
		}
	}
}
