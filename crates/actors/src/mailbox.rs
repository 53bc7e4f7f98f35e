use std::collections::VecDeque;

use parking_lot::Mutex;
use serde::Deserialize;
use tokio::sync::Notify;
use tokio::sync::futures::Notified;

use crate::actor::LifecycleMessage;
use crate::behaviors::request_reply::Response;

/// What a full bounded mailbox does with an incoming user message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
	/// Drop the message and raise [`crate::ActorError::MailboxFull`] inside the receiving actor.
	#[default]
	Throw,
	/// Drop the incoming message silently.
	Drop,
	/// Drop the oldest queued user message to make room.
	Displace,
	/// Make `send` wait for capacity. `try_send` reports failure instead.
	Block,
}

/// Mailbox sizing and overflow configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MailboxSpec {
	pub(crate) capacity: Option<usize>,
	pub(crate) policy: OverflowPolicy,
}

impl MailboxSpec {
	/// Creates a bounded mailbox spec.
	///
	/// # Panics
	///
	/// Panics if `capacity` is zero.
	#[must_use]
	pub fn bounded(capacity: usize) -> Self {
		assert!(capacity > 0, "mailbox capacity must be > 0");
		Self {
			capacity: Some(capacity),
			policy: OverflowPolicy::default(),
		}
	}

	/// Creates an unbounded mailbox spec.
	#[must_use]
	pub fn unbounded() -> Self {
		Self {
			capacity: None,
			policy: OverflowPolicy::default(),
		}
	}

	/// Sets the overflow policy. Ignored by unbounded mailboxes.
	#[must_use]
	pub fn policy(mut self, policy: OverflowPolicy) -> Self {
		self.policy = policy;
		self
	}

	pub fn capacity(&self) -> Option<usize> {
		self.capacity
	}
}

impl Default for MailboxSpec {
	fn default() -> Self {
		Self::unbounded()
	}
}

/// One queued item. Lifecycle and response envelopes bypass capacity.
pub(crate) enum Envelope<M> {
	User(M),
	Lifecycle(LifecycleMessage),
	Response(Response),
}

impl<M> Envelope<M> {
	fn is_user(&self) -> bool {
		matches!(self, Self::User(_))
	}
}

/// Outcome of a non-waiting user enqueue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PushOutcome {
	Enqueued,
	/// The oldest user message was dropped to make room.
	Displaced,
	/// The incoming message was dropped.
	Dropped,
	/// The incoming message was dropped and the owner must be told.
	Overflow,
}

struct Slot<M> {
	seq: u64,
	/// Counts against capacity. Lifecycle envelopes mapped to user messages do not.
	counted: bool,
	envelope: Envelope<M>,
}

/// The envelope the consumer currently holds outside the queue.
struct Held {
	seq: u64,
	counted: bool,
	displaced: bool,
}

struct MailboxState<M> {
	queue: VecDeque<Slot<M>>,
	next_seq: u64,
	/// Counted user messages, the held one included.
	users: usize,
	held: Option<Held>,
}

impl<M> MailboxState<M> {
	fn append(&mut self, envelope: Envelope<M>) {
		let counted = envelope.is_user();
		let seq = self.next_seq;
		self.next_seq += 1;
		if counted {
			self.users += 1;
		}
		self.queue.push_back(Slot { seq, counted, envelope });
	}

	/// Drops the oldest counted user message, which may be the held one.
	fn displace_oldest(&mut self) {
		let queued = self.queue.iter().position(|slot| slot.counted);
		let queued_seq = queued.map(|index| self.queue[index].seq);
		if let Some(held) = self.held.as_mut()
			&& held.counted
			&& !held.displaced
			&& queued_seq.is_none_or(|seq| held.seq < seq)
		{
			held.displaced = true;
			self.users -= 1;
			return;
		}
		if let Some(index) = queued {
			let _ = self.queue.remove(index);
			self.users -= 1;
		}
	}
}

/// Single-consumer, multi-producer actor mailbox.
///
/// Every envelope carries a sequence number. The consumer takes one envelope
/// at a time for inspection and either releases it or puts it back, where it
/// is reinserted by sequence number. A held user message keeps its capacity
/// slot until released.
pub(crate) struct Mailbox<M> {
	capacity: Option<usize>,
	policy: OverflowPolicy,
	state: Mutex<MailboxState<M>>,
	notify_recv: Notify,
	notify_send: Notify,
}

impl<M> Mailbox<M> {
	pub(crate) fn new(spec: MailboxSpec) -> Self {
		Self {
			capacity: spec.capacity,
			policy: spec.policy,
			state: Mutex::new(MailboxState {
				queue: VecDeque::with_capacity(spec.capacity.unwrap_or(16).min(1024)),
				next_seq: 0,
				users: 0,
				held: None,
			}),
			notify_recv: Notify::new(),
			notify_send: Notify::new(),
		}
	}

	/// Non-waiting enqueue honoring the overflow policy.
	///
	/// Returns the message back only when the policy is `Block` and the mailbox is full.
	pub(crate) fn try_push(&self, msg: M) -> Result<PushOutcome, M> {
		let mut state = self.state.lock();
		let full = self.capacity.is_some_and(|cap| state.users >= cap);
		if !full {
			state.append(Envelope::User(msg));
			drop(state);
			self.notify_recv.notify_one();
			return Ok(PushOutcome::Enqueued);
		}

		match self.policy {
			OverflowPolicy::Throw => Ok(PushOutcome::Overflow),
			OverflowPolicy::Drop => Ok(PushOutcome::Dropped),
			OverflowPolicy::Block => Err(msg),
			OverflowPolicy::Displace => {
				state.displace_oldest();
				state.append(Envelope::User(msg));
				drop(state);
				self.notify_recv.notify_one();
				Ok(PushOutcome::Displaced)
			}
		}
	}

	/// Enqueue that waits for capacity under the `Block` policy.
	pub(crate) async fn push(&self, mut msg: M) -> PushOutcome {
		loop {
			// Register before the capacity check so a release in between is not lost.
			let notified = self.notify_send.notified();
			match self.try_push(msg) {
				Ok(outcome) => return outcome,
				Err(back) => msg = back,
			}
			notified.await;
		}
	}

	/// Appends a lifecycle or response envelope regardless of capacity.
	pub(crate) fn push_system(&self, envelope: Envelope<M>) {
		debug_assert!(!envelope.is_user(), "user messages must go through try_push");
		self.state.lock().append(envelope);
		self.notify_recv.notify_one();
	}

	/// Takes the first envelope queued after `cursor` and holds it.
	///
	/// The caller must follow up with [`Mailbox::release`] or [`Mailbox::put_back`]
	/// before taking the next one.
	pub(crate) fn take_after(&self, cursor: Option<u64>) -> Option<(u64, Envelope<M>)> {
		let mut state = self.state.lock();
		debug_assert!(state.held.is_none(), "one envelope is held at a time");
		let index = match cursor {
			Some(cursor) => state.queue.partition_point(|slot| slot.seq <= cursor),
			None => 0,
		};
		let slot = state.queue.remove(index)?;
		state.held = Some(Held {
			seq: slot.seq,
			counted: slot.counted,
			displaced: false,
		});
		Some((slot.seq, slot.envelope))
	}

	/// Consumes the held envelope, freeing its capacity slot.
	pub(crate) fn release(&self, seq: u64) {
		let mut state = self.state.lock();
		let Some(held) = state.held.take_if(|held| held.seq == seq) else {
			return;
		};
		if held.counted && !held.displaced {
			state.users -= 1;
			drop(state);
			self.notify_send.notify_one();
		}
	}

	/// Returns the held envelope to its place in sequence order.
	///
	/// A held user message displaced meanwhile is dropped instead.
	pub(crate) fn put_back(&self, seq: u64, envelope: Envelope<M>) {
		let mut state = self.state.lock();
		let Some(held) = state.held.take_if(|held| held.seq == seq) else {
			return;
		};
		if held.displaced {
			return;
		}
		let index = state.queue.partition_point(|slot| slot.seq < seq);
		state.queue.insert(
			index,
			Slot {
				seq,
				counted: held.counted,
				envelope,
			},
		);
	}

	/// Future resolving on the next enqueue or [`Mailbox::wake`].
	pub(crate) fn notified(&self) -> Notified<'_> {
		self.notify_recv.notified()
	}

	/// Wakes a consumer blocked in receive without enqueueing anything.
	pub(crate) fn wake(&self) {
		self.notify_recv.notify_one();
	}

	/// Number of queued envelopes, system envelopes included.
	pub(crate) fn len(&self) -> usize {
		self.state.lock().queue.len()
	}

	/// Drops every queued envelope and forgets the held one.
	pub(crate) fn clear(&self) {
		let mut state = self.state.lock();
		state.queue.clear();
		state.users = 0;
		state.held = None;
		drop(state);
		self.notify_send.notify_waiters();
	}
}

impl<M: Clone> Mailbox<M> {
	/// Copies the queued user messages in order.
	pub(crate) fn snapshot(&self) -> Vec<M> {
		self.state
			.lock()
			.queue
			.iter()
			.filter_map(|slot| match &slot.envelope {
				Envelope::User(msg) => Some(msg.clone()),
				_ => None,
			})
			.collect()
	}
}
