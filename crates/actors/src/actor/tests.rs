use std::sync::Arc;
use std::time::Duration;

use super::cell::{self, AnyCell};
use super::*;
use crate::error::CallError;
use crate::mailbox::OverflowPolicy;
use crate::runtime::Runtime;
use crate::token::WatchId;
use crate::{ActorError, ReplyTo};

const WAIT: Duration = Duration::from_secs(5);

/// Collects `count` messages in the order they are received.
struct Collector {
	count: usize,
}

#[async_trait]
impl Actor for Collector {
	type Msg = u32;
	type Output = Vec<u32>;

	async fn run(&mut self, cx: &mut ActorContext<u32>) -> Result<Vec<u32>> {
		let mut seen = Vec::with_capacity(self.count);
		while seen.len() < self.count {
			seen.push(cx.receive().await?);
		}
		Ok(seen)
	}
}

/// Waits for one message, then fails or finishes as told.
struct Victim;

#[derive(Debug)]
enum Fate {
	Fail,
	Panic,
	Finish,
}

#[async_trait]
impl Actor for Victim {
	type Msg = Fate;
	type Output = ();

	async fn run(&mut self, cx: &mut ActorContext<Fate>) -> Result<()> {
		match cx.receive().await? {
			Fate::Fail => Err(ActorError::msg("victim failed")),
			Fate::Panic => panic!("kaboom"),
			Fate::Finish => Ok(()),
		}
	}
}

/// Runs a closure as the actor body.
struct Script<M, O, F> {
	body: Option<F>,
	_types: std::marker::PhantomData<fn(M) -> O>,
}

fn script<M, O, F>(body: F) -> ActorSpec<Script<M, O, F>>
where
	M: Send + 'static,
	O: Send + 'static,
	F: for<'a> FnOnce(&'a mut ActorContext<M>) -> futures_like::BoxFuture<'a, Result<O>> + Clone + Send + Sync + 'static,
{
	ActorSpec::anonymous(move || Script {
		body: Some(body.clone()),
		_types: std::marker::PhantomData,
	})
}

#[async_trait]
impl<M, O, F> Actor for Script<M, O, F>
where
	M: Send + 'static,
	O: Send + 'static,
	F: for<'a> FnOnce(&'a mut ActorContext<M>) -> futures_like::BoxFuture<'a, Result<O>> + Clone + Send + Sync + 'static,
{
	type Msg = M;
	type Output = O;

	async fn run(&mut self, cx: &mut ActorContext<M>) -> Result<O> {
		match self.body.take() {
			Some(body) => body(cx).await,
			None => Err(ActorError::msg("script already ran")),
		}
	}
}

mod futures_like {
	use std::future::Future;
	use std::pin::Pin;

	pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
}

#[tokio::test]
async fn messages_from_one_sender_arrive_in_order() {
	let rt = Runtime::new();
	let handle = rt.spawn(ActorSpec::anonymous(|| Collector { count: 100 })).unwrap();
	for n in 0..100 {
		handle.actor_ref().send(n).await;
	}
	let seen = tokio::time::timeout(WAIT, handle.join()).await.unwrap().unwrap().unwrap();
	assert_eq!(seen, (0..100).collect::<Vec<_>>());
}

#[tokio::test]
async fn selective_receive_leaves_skipped_messages_in_order() {
	let rt = Runtime::new();
	let handle = rt
		.spawn(script(|cx: &mut ActorContext<u32>| {
			Box::pin(async move {
				let mut seen = vec![cx.receive_matching(|m| *m == 3).await?];
				while let Some(m) = cx.try_receive().await? {
					seen.push(m);
				}
				Ok::<_, ActorError>(seen)
			})
		}))
		.unwrap();
	let actor = handle.actor_ref();
	for n in [1, 2, 4, 3] {
		actor.send(n).await;
	}
	let seen = tokio::time::timeout(WAIT, handle.join()).await.unwrap().unwrap().unwrap();
	assert_eq!(seen, vec![3, 1, 2, 4]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn selective_receive_keeps_order_under_concurrent_sends() {
	const N: u32 = 400;
	let rt = Runtime::new();
	let handle = rt
		.spawn(script(|cx: &mut ActorContext<u32>| {
			Box::pin(async move {
				let mut evens = Vec::new();
				while evens.len() < (N / 2) as usize {
					evens.push(cx.receive_matching(|m| m % 2 == 0).await?);
				}
				let mut odds = Vec::new();
				while odds.len() < (N / 2) as usize {
					odds.push(cx.receive().await?);
				}
				Ok::<_, ActorError>((evens, odds))
			})
		}))
		.unwrap();
	let actor = handle.actor_ref().clone();
	for n in 0..N {
		actor.send(n).await;
		if n % 16 == 0 {
			tokio::task::yield_now().await;
		}
	}
	let (evens, odds) = tokio::time::timeout(WAIT, handle.join()).await.unwrap().unwrap().unwrap();
	assert_eq!(evens, (0..N).step_by(2).collect::<Vec<_>>());
	assert_eq!(odds, (1..N).step_by(2).collect::<Vec<_>>());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn displacing_sends_during_a_scan_keep_skipped_order() {
	let rt = Runtime::new();
	let go = Arc::new(tokio::sync::Notify::new());
	let paused = Arc::new(tokio::sync::Notify::new());
	let resume = Arc::new(std::sync::Barrier::new(2));
	let (go_rx, paused_tx, resume_rx) = (Arc::clone(&go), Arc::clone(&paused), Arc::clone(&resume));
	let spec = script(move |cx: &mut ActorContext<u32>| {
		Box::pin(async move {
			go_rx.notified().await;
			let mut held_once = false;
			let picked = cx
				.receive_select(|m: &u32| {
					if *m == 2 && !held_once {
						held_once = true;
						paused_tx.notify_one();
						resume_rx.wait();
					}
					(*m == 5).then_some(*m)
				})
				.await?;
			let mut rest = Vec::new();
			while let Some(m) = cx.try_receive().await? {
				rest.push(m);
			}
			Ok::<_, ActorError>((picked, rest))
		})
	})
	.mailbox(MailboxSpec::bounded(3).policy(OverflowPolicy::Displace));
	let handle = rt.spawn(spec).unwrap();
	let actor = handle.actor_ref();
	for n in 1..=3 {
		assert!(actor.try_send(n));
	}
	go.notify_one();

	// 2 is held by the scan: 4 displaces 1, 5 displaces the held 2.
	tokio::time::timeout(WAIT, paused.notified()).await.unwrap();
	assert!(actor.try_send(4));
	assert!(actor.try_send(5));
	assert!(actor.mailbox_len() <= 3);
	resume.wait();

	let (picked, rest) = tokio::time::timeout(WAIT, handle.join()).await.unwrap().unwrap().unwrap();
	assert_eq!(picked, 5);
	assert_eq!(rest, vec![3, 4]);
}

#[tokio::test]
async fn receive_select_maps_the_picked_message() {
	let rt = Runtime::new();
	let handle = rt
		.spawn(script(|cx: &mut ActorContext<String>| {
			Box::pin(async move {
				let len = cx.receive_select(|m: &String| m.starts_with('x').then_some(m.len())).await?;
				let rest = cx.receive().await?;
				Ok::<_, ActorError>((len, rest))
			})
		}))
		.unwrap();
	handle.actor_ref().send("skip".to_string()).await;
	handle.actor_ref().send("xyz".to_string()).await;
	let out = tokio::time::timeout(WAIT, handle.join()).await.unwrap().unwrap().unwrap();
	assert_eq!(out, (3, "skip".to_string()));
}

#[tokio::test]
async fn receive_timeout_returns_none_when_idle() {
	let rt = Runtime::new();
	let handle = rt
		.spawn(script(|cx: &mut ActorContext<u32>| {
			Box::pin(async move {
				let idle = cx.receive_timeout(Duration::from_millis(20)).await?;
				let instant = cx.receive_timeout(Duration::ZERO).await?;
				Ok::<_, ActorError>((idle, instant))
			})
		}))
		.unwrap();
	let out = tokio::time::timeout(WAIT, handle.join()).await.unwrap().unwrap().unwrap();
	assert_eq!(out, (None, None));
}

#[tokio::test]
async fn natural_error_and_panic_causes() {
	let rt = Runtime::new();

	let failed = rt.spawn(ActorSpec::anonymous(|| Victim)).unwrap();
	failed.actor_ref().send(Fate::Fail).await;
	let err = failed.join().await.unwrap_err();
	assert_eq!(err.to_string(), "victim failed");

	let panicked = rt.spawn(ActorSpec::anonymous(|| Victim)).unwrap();
	panicked.actor_ref().send(Fate::Panic).await;
	match panicked.join().await {
		Err(ActorError::Panicked(msg)) => assert_eq!(msg, "kaboom"),
		other => panic!("expected panic cause, got {other:?}"),
	}

	let finished = rt.spawn(ActorSpec::anonymous(|| Victim)).unwrap();
	finished.actor_ref().send(Fate::Finish).await;
	assert_eq!(finished.join().await.unwrap(), Some(()));

	let stopped = rt.spawn(ActorSpec::anonymous(|| Victim)).unwrap();
	stopped.actor_ref().shutdown();
	assert_eq!(stopped.join().await.unwrap(), None);
	assert!(stopped.actor_ref().death_cause().is_none());
}

#[tokio::test]
async fn death_is_recorded_once() {
	let rt = Runtime::new();
	let handle = rt.spawn(ActorSpec::anonymous(|| Victim)).unwrap();
	let actor = handle.as_any();
	handle.actor_ref().send(Fate::Fail).await;
	assert!(actor.join().await.is_err());

	actor.throw_in(ActorError::msg("late"));
	actor.shutdown();
	assert!(handle.actor_ref().is_done());
	assert_eq!(actor.death_cause().unwrap().to_string(), "victim failed");
	assert_eq!(actor.join().await.unwrap_err().to_string(), "victim failed");
	// Sends after death are dropped.
	assert!(!handle.actor_ref().try_send(Fate::Finish));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn racing_deaths_notify_watchers_once() {
	let rt = Runtime::new();
	let target = rt.spawn(ActorSpec::anonymous(|| Victim)).unwrap();
	let watched = target.as_any();
	let ready = Arc::new(tokio::sync::Notify::new());
	let ready_tx = Arc::clone(&ready);
	let watcher = rt
		.spawn(script(move |cx: &mut ActorContext<Observed>| {
			Box::pin(async move {
				cx.set_lifecycle_handler(|exit| Some(Observed::Exit(exit)));
				cx.watch(&watched)?;
				ready_tx.notify_one();
				let Observed::Exit(first) = cx.receive().await?;
				let extra = cx.receive_timeout(Duration::from_millis(50)).await?;
				Ok::<_, ActorError>((first.cause.map(|c| c.to_string()), extra.is_none()))
			})
		}))
		.unwrap();
	tokio::time::timeout(WAIT, ready.notified()).await.unwrap();

	let target_cell = target.as_any().upgrade().unwrap();
	let barrier = std::sync::Barrier::new(8);
	let winners = std::thread::scope(|scope| {
		let racers: Vec<_> = (0..8)
			.map(|i| {
				let (target_cell, barrier) = (&target_cell, &barrier);
				scope.spawn(move || {
					barrier.wait();
					cell::die(&**target_cell, Some(ActorError::msg(format!("racer {i}"))))
				})
			})
			.collect();
		racers.into_iter().map(|racer| racer.join().is_ok_and(|won| won)).filter(|&won| won).count()
	});
	assert_eq!(winners, 1);

	let (cause, no_second_exit) = tokio::time::timeout(WAIT, watcher.join()).await.unwrap().unwrap().unwrap();
	assert!(no_second_exit);
	assert_eq!(cause, target.actor_ref().death_cause().map(|c| c.to_string()));
	assert!(cause.unwrap().starts_with("racer "));
}

#[tokio::test]
async fn death_clears_the_survivors_link_to_it() {
	let rt = Runtime::new();
	let peer = rt.spawn(ActorSpec::anonymous(|| Victim)).unwrap();
	let target = peer.as_any();
	let linker = rt
		.spawn(script(move |cx: &mut ActorContext<()>| {
			Box::pin(async move {
				cx.link(&target)?;
				let linked_before = cx.cell().core().has_link(target.id());
				target.downcast::<Fate>().unwrap().send(Fate::Fail).await;
				let _ = target.join().await;
				// The exit notification stays queued while the link goes away.
				let cell = cx.cell();
				let cleared = tokio::time::timeout(Duration::from_secs(2), async {
					while cell.core().has_link(target.id()) {
						tokio::time::sleep(Duration::from_millis(5)).await;
					}
				})
				.await
				.is_ok();
				Ok::<_, ActorError>((linked_before, cleared))
			})
		}))
		.unwrap();
	let (before, cleared) = tokio::time::timeout(WAIT, linker.join()).await.unwrap().unwrap().unwrap();
	assert!(before);
	assert!(cleared);
}

#[tokio::test]
async fn finished_watcher_leaves_no_listener_behind() {
	let rt = Runtime::new();
	let watched = rt.spawn(ActorSpec::anonymous(|| Victim)).unwrap();
	let target = watched.as_any();
	let target_cell = target.upgrade().unwrap();
	let watcher = rt
		.spawn(script(move |cx: &mut ActorContext<()>| {
			Box::pin(async move {
				cx.watch(&target)?;
				cx.watch(&target)?;
				Ok::<_, ActorError>(())
			})
		}))
		.unwrap();
	tokio::time::timeout(WAIT, watcher.join()).await.unwrap().unwrap();
	tokio::time::timeout(WAIT, async {
		while target_cell.core().listener_count() > 0 {
			tokio::time::sleep(Duration::from_millis(5)).await;
		}
	})
	.await
	.expect("watch listeners were not removed");
	assert!(!watched.actor_ref().is_done());
}

#[tokio::test]
async fn throw_in_surfaces_at_receive() {
	let rt = Runtime::new();
	let handle = rt.spawn(ActorSpec::anonymous(|| Collector { count: 10 })).unwrap();
	handle.as_any().throw_in(ActorError::msg("poke"));
	let err = tokio::time::timeout(WAIT, handle.join()).await.unwrap().unwrap_err();
	assert_eq!(err.to_string(), "poke");
}

#[tokio::test]
async fn link_propagates_death_both_ways() {
	let rt = Runtime::new();

	let peer = rt.spawn(ActorSpec::anonymous(|| Victim)).unwrap();
	let target = peer.actor_ref().clone();
	let linker = rt
		.spawn(script(move |cx: &mut ActorContext<()>| {
			Box::pin(async move {
				cx.link(&target)?;
				target.send(Fate::Fail).await;
				cx.receive().await?;
				Ok::<_, ActorError>(())
			})
		}))
		.unwrap();
	match tokio::time::timeout(WAIT, linker.join()).await.unwrap() {
		Err(ActorError::LinkedActorDied { actor, cause }) => {
			assert_eq!(actor, peer.actor_ref().id());
			assert_eq!(cause.unwrap().to_string(), "victim failed");
		}
		other => panic!("expected link death, got {other:?}"),
	}

	// The other direction: the linking side dies and takes the peer with it.
	let peer = rt.spawn(ActorSpec::anonymous(|| Victim)).unwrap();
	let target = peer.as_any();
	let linker = rt
		.spawn(script(move |cx: &mut ActorContext<()>| {
			Box::pin(async move {
				cx.link(&target)?;
				Err::<(), ActorError>(ActorError::msg("linker failed"))
			})
		}))
		.unwrap();
	assert!(linker.join().await.is_err());
	match tokio::time::timeout(WAIT, peer.join()).await.unwrap() {
		Err(ActorError::LinkedActorDied { actor, .. }) => assert_eq!(actor, linker.actor_ref().id()),
		other => panic!("expected link death, got {other:?}"),
	}
}

#[tokio::test]
async fn linking_a_dead_actor_notifies_immediately() {
	let rt = Runtime::new();
	let dead = rt.spawn(ActorSpec::anonymous(|| Victim)).unwrap();
	dead.actor_ref().send(Fate::Finish).await;
	dead.join().await.unwrap();

	let target = dead.as_any();
	let linker = rt
		.spawn(script(move |cx: &mut ActorContext<()>| {
			Box::pin(async move {
				cx.link(&target)?;
				cx.receive().await
			})
		}))
		.unwrap();
	match tokio::time::timeout(WAIT, linker.join()).await.unwrap() {
		Err(ActorError::LinkedActorDied { cause, .. }) => assert!(cause.is_none()),
		other => panic!("expected link death, got {other:?}"),
	}
}

#[derive(Debug)]
enum Observed {
	Exit(ExitMessage),
}

#[tokio::test]
async fn each_watch_gets_its_own_notification() {
	let rt = Runtime::new();
	let watched = rt.spawn(ActorSpec::anonymous(|| Victim)).unwrap();
	let target = watched.as_any();
	let watcher = rt
		.spawn(script(move |cx: &mut ActorContext<Observed>| {
			Box::pin(async move {
				cx.set_lifecycle_handler(|exit| Some(Observed::Exit(exit)));
				let first = cx.watch(&target)?;
				let second = cx.watch(&target)?;
				target.shutdown();
				let mut seen: Vec<(Option<WatchId>, bool)> = Vec::new();
				for _ in 0..2 {
					let Observed::Exit(exit) = cx.receive().await?;
					assert_eq!(exit.actor, target);
					seen.push((exit.watch, exit.cause.is_none()));
				}
				Ok::<_, ActorError>((first, second, seen))
			})
		}))
		.unwrap();
	let (first, second, seen) = tokio::time::timeout(WAIT, watcher.join()).await.unwrap().unwrap().unwrap();
	assert_ne!(first, second);
	assert_eq!(seen, vec![(Some(first), true), (Some(second), true)]);
}

#[tokio::test]
async fn unwatch_drops_the_notification() {
	let rt = Runtime::new();
	let watched = rt.spawn(ActorSpec::anonymous(|| Victim)).unwrap();
	let target = watched.as_any();
	let watcher = rt
		.spawn(script(move |cx: &mut ActorContext<Observed>| {
			Box::pin(async move {
				cx.set_lifecycle_handler(|exit| Some(Observed::Exit(exit)));
				let id = cx.watch(&target)?;
				cx.unwatch(&target, id);
				target.shutdown();
				target.join().await?;
				Ok::<_, ActorError>(cx.receive_timeout(Duration::from_millis(30)).await?.is_none())
			})
		}))
		.unwrap();
	assert!(tokio::time::timeout(WAIT, watcher.join()).await.unwrap().unwrap().unwrap());
}

#[tokio::test]
async fn thread_execution_runs_on_a_named_thread() {
	let rt = Runtime::new();
	let spec = script(|_cx: &mut ActorContext<()>| {
		Box::pin(async move { Ok::<_, ActorError>(std::thread::current().name().map(str::to_string)) })
	})
	.with_default_name(Some("threaded"))
	.execution(Execution::Thread);
	let handle = rt.spawn(spec).unwrap();
	let name = tokio::time::timeout(WAIT, handle.join()).await.unwrap().unwrap().unwrap();
	assert_eq!(name.as_deref(), Some("strand-threaded"));
}

#[derive(Debug)]
enum Req {
	Echo { from: ReplyTo<u32>, value: u32 },
	Die { from: ReplyTo<u32> },
	Ignore { from: ReplyTo<u32> },
}

struct Callee;

#[async_trait]
impl Actor for Callee {
	type Msg = Req;
	type Output = ();

	async fn run(&mut self, cx: &mut ActorContext<Req>) -> Result<()> {
		let mut ignored = Vec::new();
		loop {
			match cx.receive().await? {
				Req::Echo { from, value } => {
					from.reply(value);
				}
				Req::Die { .. } => return Err(ActorError::msg("callee crashed")),
				Req::Ignore { from } => ignored.push(from),
			}
		}
	}
}

#[tokio::test]
async fn call_round_trip_and_failures() {
	let rt = Runtime::new();
	let callee = rt.spawn(ActorSpec::anonymous(|| Callee)).unwrap();
	let target = callee.actor_ref();

	let echoed = rt.call(target, |from| Req::Echo { from, value: 7 }).await.unwrap();
	assert_eq!(echoed, 7);

	let timed_out = rt
		.call_timeout(target, Duration::from_millis(20), |from| Req::Ignore { from })
		.await
		.unwrap_err();
	assert!(matches!(timed_out, ActorError::Call(CallError::Timeout(_))));

	let died = rt.call(target, |from| Req::Die { from }).await.unwrap_err();
	match died {
		ActorError::Call(CallError::CalleeDied { actor, cause }) => {
			assert_eq!(actor, target.id());
			assert_eq!(cause.unwrap().to_string(), "callee crashed");
		}
		other => panic!("expected callee death, got {other:?}"),
	}
}

#[tokio::test]
async fn cancelled_outside_call_leaves_the_callee_running() {
	let rt = Runtime::new();
	let callee = rt.spawn(ActorSpec::anonymous(|| Callee)).unwrap();
	let target = callee.actor_ref();

	let abandoned = tokio::time::timeout(Duration::from_millis(20), rt.call(target, |from| Req::Ignore { from })).await;
	assert!(abandoned.is_err());
	assert_eq!(target.as_any().upgrade().unwrap().core().listener_count(), 0);

	tokio::time::sleep(Duration::from_millis(20)).await;
	assert!(!target.is_done());
	assert_eq!(rt.call(target, |from| Req::Echo { from, value: 9 }).await.unwrap(), 9);
}

#[tokio::test]
async fn call_keeps_unrelated_messages_queued() {
	let rt = Runtime::new();
	let callee = rt.spawn(ActorSpec::anonymous(|| Callee)).unwrap();
	let target = callee.actor_ref().clone();
	let caller = rt
		.spawn(script(move |cx: &mut ActorContext<u32>| {
			Box::pin(async move {
				let me = cx.self_ref();
				me.send(1).await;
				let reply = cx.call(&target, |from| Req::Echo { from, value: 42 }).await?;
				let queued = cx.try_receive().await?;
				let self_call = cx.call(&me, |_from: ReplyTo<u32>| 0).await;
				Ok::<_, ActorError>((reply, queued, matches!(self_call, Err(ActorError::Call(CallError::SelfCall)))))
			})
		}))
		.unwrap();
	let out = tokio::time::timeout(WAIT, caller.join()).await.unwrap().unwrap().unwrap();
	assert_eq!(out, (42, Some(1), true));
}

#[tokio::test]
async fn temp_actor_dies_when_dropped() {
	let rt = Runtime::new();
	let temp = rt.temp_actor();
	let identity = temp.as_any();
	assert!(!identity.is_done());
	drop(temp);
	assert!(identity.is_done());
	assert!(identity.death_cause().is_none());
}
