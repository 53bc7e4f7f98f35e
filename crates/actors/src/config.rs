use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::mailbox::{MailboxSpec, OverflowPolicy};

/// Runtime-wide defaults.
///
/// Loadable from TOML; every key is optional:
///
/// ```toml
/// mailbox_capacity = 1024
/// overflow = "displace"
/// call_timeout_ms = 5000
/// shutdown_deadline_ms = 2000
/// thread_name_prefix = "svc"
/// monitor_registered = false
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeConfig {
	/// Default mailbox bound. `None` means unbounded.
	pub mailbox_capacity: Option<usize>,
	/// Default overflow policy for bounded mailboxes.
	pub overflow: OverflowPolicy,
	/// Default timeout for calls that do not pass one. `None` waits forever.
	pub call_timeout_ms: Option<u64>,
	/// Default time a supervisor waits for a child to stop before interrupting it.
	pub shutdown_deadline_ms: u64,
	/// Prefix for OS thread names of thread-backed actors.
	pub thread_name_prefix: String,
	/// Attach a [`crate::CounterMonitor`] to actors when they register. On by default.
	pub monitor_registered: bool,
}

impl Default for RuntimeConfig {
	fn default() -> Self {
		Self {
			mailbox_capacity: None,
			overflow: OverflowPolicy::default(),
			call_timeout_ms: None,
			shutdown_deadline_ms: 5_000,
			thread_name_prefix: "strand".to_string(),
			monitor_registered: true,
		}
	}
}

impl RuntimeConfig {
	/// Parses a TOML document.
	pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
		let config: Self = toml::from_str(text)?;
		config.validate()?;
		Ok(config)
	}

	fn validate(&self) -> Result<(), ConfigError> {
		if self.mailbox_capacity == Some(0) {
			return Err(ConfigError::Invalid("mailbox_capacity must be > 0".to_string()));
		}
		if self.shutdown_deadline_ms == 0 {
			return Err(ConfigError::Invalid("shutdown_deadline_ms must be > 0".to_string()));
		}
		Ok(())
	}

	/// Mailbox spec applied to actors that do not configure their own.
	pub fn mailbox(&self) -> MailboxSpec {
		let spec = match self.mailbox_capacity {
			Some(capacity) => MailboxSpec::bounded(capacity),
			None => MailboxSpec::unbounded(),
		};
		spec.policy(self.overflow)
	}

	pub fn call_timeout(&self) -> Option<Duration> {
		self.call_timeout_ms.map(Duration::from_millis)
	}

	pub fn shutdown_deadline(&self) -> Duration {
		Duration::from_millis(self.shutdown_deadline_ms)
	}
}

#[cfg(test)]
mod tests {
	use pretty_assertions::assert_eq;

	use super::*;

	#[test]
	fn empty_document_yields_defaults() {
		let config = RuntimeConfig::from_toml_str("").unwrap();
		assert_eq!(config, RuntimeConfig::default());
		assert_eq!(config.mailbox(), MailboxSpec::unbounded());
		assert_eq!(config.call_timeout(), None);
	}

	#[test]
	fn parses_all_keys() {
		let config = RuntimeConfig::from_toml_str(
			r#"
mailbox_capacity = 16
overflow = "block"
call_timeout_ms = 250
shutdown_deadline_ms = 100
thread_name_prefix = "svc"
monitor_registered = false
"#,
		)
		.unwrap();
		assert_eq!(config.mailbox(), MailboxSpec::bounded(16).policy(OverflowPolicy::Block));
		assert_eq!(config.call_timeout(), Some(Duration::from_millis(250)));
		assert_eq!(config.shutdown_deadline(), Duration::from_millis(100));
		assert_eq!(config.thread_name_prefix, "svc");
		assert!(!config.monitor_registered);
	}

	#[test]
	fn rejects_zero_capacity_and_unknown_keys() {
		assert!(matches!(RuntimeConfig::from_toml_str("mailbox_capacity = 0"), Err(ConfigError::Invalid(_))));
		assert!(matches!(RuntimeConfig::from_toml_str("bogus = 1"), Err(ConfigError::Parse(_))));
	}
}
