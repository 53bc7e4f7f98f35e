/// Execution context an actor runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Execution {
	/// Lightweight task on the ambient tokio runtime.
	#[default]
	Task,
	/// Dedicated named OS thread driving a single-threaded runtime.
	Thread,
}

impl Execution {
	pub(crate) const fn as_str(self) -> &'static str {
		match self {
			Self::Task => "task",
			Self::Thread => "thread",
		}
	}
}
