use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::token::ActorId;

/// Result alias used across the actor runtime.
pub type Result<T, E = ActorError> = std::result::Result<T, E>;

/// Failure raised inside an actor or recorded as its death cause.
///
/// Death causes are shared with every lifecycle listener, so the type is
/// cheaply cloneable. User errors are wrapped in [`ActorError::Custom`] or
/// built from text with [`ActorError::msg`].
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum ActorError {
	#[error("{0}")]
	Custom(Arc<dyn std::error::Error + Send + Sync>),

	#[error("{0}")]
	Message(String),

	#[error("actor panicked: {0}")]
	Panicked(String),

	#[error("actor interrupted")]
	Interrupted,

	#[error("linked actor {actor} died{}", describe_cause(.cause))]
	LinkedActorDied { actor: ActorId, cause: Option<Box<ActorError>> },

	#[error("mailbox of actor {0} overflowed")]
	MailboxFull(ActorId),

	#[error("shutdown requested")]
	ShutdownRequested,

	#[error("supervisor gave up restarting child {child}")]
	Escalated { child: String },

	#[error(transparent)]
	Call(#[from] CallError),

	#[error(transparent)]
	Registration(#[from] RegistrationError),

	#[error(transparent)]
	Supervisor(#[from] SupervisorError),

	#[error("remote actor refs do not support {0}")]
	Remote(&'static str),

	#[error("failed to start actor: {0}")]
	Spawn(String),
}

impl ActorError {
	/// Builds an error from a plain message.
	pub fn msg(text: impl Into<String>) -> Self {
		Self::Message(text.into())
	}

	/// Wraps any error type.
	pub fn custom<E>(err: E) -> Self
	where
		E: std::error::Error + Send + Sync + 'static,
	{
		Self::Custom(Arc::new(err))
	}

	/// Returns true for errors that end an actor without counting as a failure.
	pub fn is_natural(&self) -> bool {
		matches!(self, Self::ShutdownRequested)
	}
}

/// Failure of a request/reply exchange.
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum CallError {
	#[error("call timed out after {0:?}")]
	Timeout(Duration),

	#[error("callee {actor} died{}", describe_cause(.cause))]
	CalleeDied { actor: ActorId, cause: Option<Box<ActorError>> },

	#[error("callee replied with an error: {0}")]
	Failed(Box<ActorError>),

	#[error("reply did not match the requested type")]
	UnexpectedReply,

	#[error("an actor cannot call itself")]
	SelfCall,
}

/// Failure to bind a name in the registry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum RegistrationError {
	#[error("name {0:?} is registered to another live actor")]
	NameTaken(String),

	#[error("actor is named {current:?} and cannot be registered as {requested:?}")]
	NameMismatch { current: String, requested: String },

	#[error("actor has no name to register under")]
	Unnamed,
}

/// Failure of a supervisor child-table operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum SupervisorError {
	#[error("supervisor already has a child with id {0:?}")]
	DuplicateId(String),

	#[error("supervisor already supervises actor {0}")]
	DuplicateActor(ActorId),

	#[error("child {0:?} cannot be restarted: its actor is gone and no factory is known")]
	NotRestartable(String),
}

/// Failure to load a [`crate::RuntimeConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("failed to parse runtime config: {0}")]
	Parse(#[from] toml::de::Error),

	#[error("invalid runtime config: {0}")]
	Invalid(String),
}

fn describe_cause(cause: &Option<Box<ActorError>>) -> String {
	match cause {
		Some(cause) => format!(": {cause}"),
		None => String::new(),
	}
}
