#![cfg_attr(test, allow(unused_crate_dependencies))]
//! Actor runtime with selective-receive mailboxes and supervision trees.
//!
//! Actors are futures paired with a mailbox, started from an [`ActorSpec`]
//! by an explicit [`Runtime`]. They communicate by message, observe each
//! other through links and watches, and die exactly once with an optional
//! cause.
//!
//! # Main Types
//!
//! - [`Runtime`] - id allocation, the [`Registry`] and the live-actor arena
//! - [`ActorContext`] - an actor's own view: receive, link, watch, call
//! - [`ActorRef`] / [`AnyActorRef`] - typed and type-erased addresses
//! - [`behaviors`] - request/reply servers, event sources and state machines
//! - [`supervisor`] - restart engine for trees of actors
//!
//! # Example
//!
//! ```no_run
//! use strand_actors::{Actor, ActorContext, ActorSpec, Result, Runtime};
//!
//! struct Printer;
//!
//! #[async_trait::async_trait]
//! impl Actor for Printer {
//! 	type Msg = String;
//! 	type Output = ();
//!
//! 	async fn run(&mut self, cx: &mut ActorContext<String>) -> Result<()> {
//! 		loop {
//! 			let line = cx.receive().await?;
//! 			println!("{line}");
//! 		}
//! 	}
//! }
//!
//! # async fn demo() -> Result<()> {
//! let runtime = Runtime::new();
//! let printer = runtime.spawn(ActorSpec::new("printer", || Printer).register())?;
//! printer.actor_ref().send("hello".to_string()).await;
//! printer.actor_ref().shutdown();
//! printer.join().await?;
//! # Ok(())
//! # }
//! ```

mod actor;
pub mod behaviors;
mod completion;
mod config;
mod error;
mod execution;
mod mailbox;
mod monitor;
mod registry;
mod runtime;
mod spawn;
pub mod supervisor;
mod token;

pub use actor::{Actor, ActorContext, ActorHandle, ActorRef, ActorSpec, AnyActorRef, ExitMessage, LifecycleMessage, RemotePort, TempActor};
pub use behaviors::ReplyTo;
pub use config::RuntimeConfig;
pub use error::{ActorError, CallError, ConfigError, RegistrationError, Result, SupervisorError};
pub use execution::Execution;
pub use mailbox::{MailboxSpec, OverflowPolicy};
pub use monitor::{ActorMonitor, CounterMonitor, MonitorFactory, MonitorSnapshot};
pub use registry::{ActorRecord, Registry};
pub use runtime::{Runtime, RuntimeBuilder};
pub use spawn::{join_error_panic_message, spawn_named_thread, spawn_task};
pub use token::{ActorId, RequestId, WatchId};
