use std::any::Any;
use std::future::Future;
use std::sync::OnceLock;

use tokio::task::{JoinError, JoinHandle};

use crate::Execution;

fn runtime_handle() -> tokio::runtime::Handle {
	if let Ok(handle) = tokio::runtime::Handle::try_current() {
		return handle;
	}

	static GLOBAL_RT: OnceLock<tokio::runtime::Runtime> = OnceLock::new();
	let runtime = GLOBAL_RT.get_or_init(|| {
		tokio::runtime::Builder::new_multi_thread()
			.enable_all()
			.worker_threads(2)
			.thread_name("strand-actors-global")
			.build()
			.expect("failed to build strand-actors global tokio runtime")
	});
	runtime.handle().clone()
}

/// Spawns an async task on the current runtime, or on the shared fallback runtime
/// when called from outside one.
pub fn spawn_task<F>(execution: Execution, fut: F) -> JoinHandle<F::Output>
where
	F: Future + Send + 'static,
	F::Output: Send + 'static,
{
	tracing::trace!(execution = execution.as_str(), "actor.spawn_task");
	runtime_handle().spawn(fut)
}

/// Spawns a dedicated named OS thread.
pub fn spawn_named_thread<F, R>(execution: Execution, name: impl Into<String>, f: F) -> std::io::Result<std::thread::JoinHandle<R>>
where
	F: FnOnce() -> R + Send + 'static,
	R: Send + 'static,
{
	tracing::trace!(execution = execution.as_str(), "actor.spawn_named_thread");
	std::thread::Builder::new().name(name.into()).spawn(f)
}

/// Starts a driver future on the requested execution context.
///
/// `Thread` builds a current-thread runtime and blocks a new OS thread on the
/// future, so nested [`spawn_task`] calls land on that thread's runtime.
pub(crate) fn launch<F>(execution: Execution, thread_name: String, fut: F) -> std::io::Result<()>
where
	F: Future<Output = ()> + Send + 'static,
{
	match execution {
		Execution::Task => {
			drop(spawn_task(execution, fut));
			Ok(())
		}
		Execution::Thread => {
			let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build()?;
			spawn_named_thread(execution, thread_name, move || runtime.block_on(fut))?;
			Ok(())
		}
	}
}

/// Extracts the panic message carried by a [`JoinError`], if the task panicked.
pub fn join_error_panic_message(err: JoinError) -> Option<String> {
	if !err.is_panic() {
		return None;
	}
	Some(panic_payload_message(err.into_panic()))
}

fn panic_payload_message(payload: Box<dyn Any + Send>) -> String {
	match payload.downcast::<&'static str>() {
		Ok(msg) => (*msg).to_string(),
		Err(payload) => match payload.downcast::<String>() {
			Ok(msg) => *msg,
			Err(_) => "<non-string panic payload>".to_string(),
		},
	}
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
#[path = "panic_tests.rs"]
mod panic_tests;
