use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::*;
use crate::monitor::{ActorMonitor, CounterMonitor};

#[derive(Debug)]
enum Cmd {
	Fail,
	Finish,
}

struct Worker;

#[async_trait]
impl Actor for Worker {
	type Msg = Cmd;
	type Output = ();

	async fn run(&mut self, cx: &mut ActorContext<Cmd>) -> Result<()> {
		loop {
			match cx.receive().await? {
				Cmd::Fail => return Err(ActorError::msg("boom")),
				Cmd::Finish => return Ok(()),
			}
		}
	}
}

fn worker(id: &str) -> ChildSpec {
	ChildSpec::new(id, ActorSpec::anonymous(|| Worker))
}

async fn child(sup: &SupervisorRef, id: &str) -> Option<AnyActorRef> {
	sup.get_child(id).await.unwrap()
}

async fn send(actor: &AnyActorRef, cmd: Cmd) {
	actor.downcast::<Cmd>().expect("worker ref").send(cmd).await;
}

/// Waits until slot `id` holds an actor other than `old`, or is gone (`None`).
async fn next_child(sup: &SupervisorRef, id: &str, old: &AnyActorRef) -> Option<AnyActorRef> {
	tokio::time::timeout(Duration::from_secs(5), async {
		loop {
			match child(sup, id).await {
				Some(actor) if actor != *old => return Some(actor),
				Some(_) => tokio::time::sleep(Duration::from_millis(5)).await,
				None => return None,
			}
		}
	})
	.await
	.expect("supervisor did not react in time")
}

async fn wait_removed(sup: &SupervisorRef, id: &str) {
	tokio::time::timeout(Duration::from_secs(5), async {
		while child(sup, id).await.is_some() {
			tokio::time::sleep(Duration::from_millis(5)).await;
		}
	})
	.await
	.expect("child was not removed in time");
}

#[tokio::test]
async fn permanent_child_is_restarted_with_its_slot_name() {
	let rt = Runtime::new();
	let sup = SupervisorSpec::new("sup", RestartStrategy::OneForOne)
		.child(worker("w"))
		.spawn(&rt)
		.unwrap();

	let first = child(&sup, "w").await.unwrap();
	assert_eq!(first.name(), Some("w"));
	send(&first, Cmd::Fail).await;

	let second = next_child(&sup, "w", &first).await.unwrap();
	assert_eq!(second.name(), Some("w"));
	assert_eq!(first.death_cause().unwrap().to_string(), "boom");

	let info = sup.children().await.unwrap();
	assert_eq!(info.len(), 1);
	assert_eq!(info[0].restarts, 1);
}

#[tokio::test]
async fn restart_leaves_no_listeners_on_the_old_actor() {
	let rt = Runtime::new();
	let sup = SupervisorSpec::new("tidy", RestartStrategy::OneForOne)
		.child(worker("w"))
		.spawn(&rt)
		.unwrap();

	let first = child(&sup, "w").await.unwrap();
	let first_cell = first.upgrade().unwrap();
	assert_eq!(first_cell.core().listener_count(), 1);
	send(&first, Cmd::Fail).await;

	let second = next_child(&sup, "w", &first).await.unwrap();
	assert_eq!(first_cell.core().listener_count(), 0);
	assert_eq!(second.upgrade().unwrap().core().listener_count(), 1);
}

#[tokio::test]
async fn restart_budget_gives_up_on_third_death_in_window() {
	let rt = Runtime::new();
	let sup = SupervisorSpec::new("budget", RestartStrategy::OneForOne)
		.child(worker("w").restart_budget(2, Duration::from_secs(10)))
		.spawn(&rt)
		.unwrap();

	let mut current = child(&sup, "w").await.unwrap();
	for _ in 0..2 {
		send(&current, Cmd::Fail).await;
		current = next_child(&sup, "w", &current).await.unwrap();
	}
	send(&current, Cmd::Fail).await;

	let outcome = tokio::time::timeout(Duration::from_secs(5), sup.join()).await.unwrap();
	match outcome {
		Err(ActorError::Escalated { child }) => assert_eq!(child, "w"),
		other => panic!("expected escalation, got {other:?}"),
	}
}

#[tokio::test]
async fn temporary_child_is_never_restarted() {
	let rt = Runtime::new();
	let sup = SupervisorSpec::anonymous(RestartStrategy::OneForOne)
		.child(worker("t").mode(ChildMode::Temporary))
		.spawn(&rt)
		.unwrap();

	let actor = child(&sup, "t").await.unwrap();
	send(&actor, Cmd::Fail).await;
	wait_removed(&sup, "t").await;
	assert!(sup.children().await.unwrap().is_empty());
	assert!(!sup.actor_ref().is_done());
}

#[tokio::test]
async fn transient_child_restarts_only_on_failure() {
	let rt = Runtime::new();
	let sup = SupervisorSpec::anonymous(RestartStrategy::OneForOne)
		.child(worker("tr").mode(ChildMode::Transient))
		.spawn(&rt)
		.unwrap();

	let first = child(&sup, "tr").await.unwrap();
	send(&first, Cmd::Fail).await;
	let second = next_child(&sup, "tr", &first).await.unwrap();

	send(&second, Cmd::Finish).await;
	wait_removed(&sup, "tr").await;
}

#[tokio::test]
async fn all_for_one_restarts_every_child() {
	let rt = Runtime::new();
	let sup = SupervisorSpec::anonymous(RestartStrategy::AllForOne)
		.child(worker("a"))
		.child(worker("b"))
		.spawn(&rt)
		.unwrap();

	let a = child(&sup, "a").await.unwrap();
	let b = child(&sup, "b").await.unwrap();
	send(&b, Cmd::Fail).await;

	let new_b = next_child(&sup, "b", &b).await.unwrap();
	let new_a = next_child(&sup, "a", &a).await.unwrap();
	assert_ne!(new_a, a);
	assert_ne!(new_b, b);
	assert!(a.join_timeout(Duration::from_secs(1)).await.unwrap().is_ok());
}

#[tokio::test]
async fn rest_for_one_restarts_later_children_only() {
	let rt = Runtime::new();
	let sup = SupervisorSpec::anonymous(RestartStrategy::RestForOne)
		.child(worker("a"))
		.child(worker("b"))
		.child(worker("c"))
		.spawn(&rt)
		.unwrap();

	let a = child(&sup, "a").await.unwrap();
	let b = child(&sup, "b").await.unwrap();
	let c = child(&sup, "c").await.unwrap();
	send(&b, Cmd::Fail).await;

	next_child(&sup, "b", &b).await.unwrap();
	next_child(&sup, "c", &c).await.unwrap();
	assert_eq!(child(&sup, "a").await.unwrap(), a);
	assert!(!a.is_done());

	let ids: Vec<_> = sup.children().await.unwrap().into_iter().map(|c| c.id).collect();
	assert_eq!(ids, vec!["a", "b", "c"]);
}

#[tokio::test]
async fn escalate_strategy_dies_on_abnormal_death() {
	let rt = Runtime::new();
	let sup = SupervisorSpec::anonymous(RestartStrategy::Escalate)
		.child(worker("w"))
		.child(worker("other"))
		.spawn(&rt)
		.unwrap();

	let other = child(&sup, "other").await.unwrap();
	let w = child(&sup, "w").await.unwrap();
	send(&w, Cmd::Fail).await;

	let outcome = tokio::time::timeout(Duration::from_secs(5), sup.join()).await.unwrap();
	assert!(matches!(outcome, Err(ActorError::Escalated { .. })));
	// Giving up stops the remaining children.
	assert!(other.join_timeout(Duration::from_secs(1)).await.is_some());
}

#[tokio::test]
async fn escalation_reaches_the_parent_supervisor() {
	let rt = Runtime::new();
	let inner = SupervisorSpec::anonymous(RestartStrategy::Escalate).child(worker("leaf"));
	let outer = SupervisorSpec::new("outer", RestartStrategy::OneForOne)
		.child(ChildSpec::new("inner", inner.actor_spec()))
		.spawn(&rt)
		.unwrap();

	let inner_actor = child(&outer, "inner").await.unwrap();
	let inner_ref = SupervisorRef::new(inner_actor.downcast().unwrap(), rt.clone());
	let leaf = child(&inner_ref, "leaf").await.unwrap();
	send(&leaf, Cmd::Fail).await;

	let restarted = next_child(&outer, "inner", &inner_actor).await.unwrap();
	assert!(matches!(inner_actor.death_cause(), Some(ActorError::Escalated { .. })));
	let restarted = SupervisorRef::new(restarted.downcast().unwrap(), rt.clone());
	assert!(child(&restarted, "leaf").await.is_some());
}

#[tokio::test]
async fn add_and_remove_children_at_runtime() {
	let rt = Runtime::new();
	let sup = SupervisorSpec::anonymous(RestartStrategy::OneForOne).spawn(&rt).unwrap();

	let actor = sup.add_child(worker("x")).await.unwrap();
	let err = sup.add_child(worker("x")).await.unwrap_err();
	match err {
		ActorError::Call(crate::error::CallError::Failed(inner)) => {
			assert!(matches!(*inner, ActorError::Supervisor(SupervisorError::DuplicateId(_))));
		}
		other => panic!("unexpected error: {other:?}"),
	}

	assert!(sup.remove_child("x", true).await.unwrap());
	assert!(actor.join_timeout(Duration::from_secs(1)).await.unwrap().is_ok());
	assert!(!sup.remove_child("x", true).await.unwrap());
	assert!(sup.children().await.unwrap().is_empty());
}

#[tokio::test]
async fn adopted_actor_is_rebuilt_from_its_spec() {
	let rt = Runtime::new();
	let handle = rt.spawn(ActorSpec::new("adoptee", || Worker)).unwrap();
	let sup = SupervisorSpec::anonymous(RestartStrategy::OneForOne).spawn(&rt).unwrap();

	let adopted = sup.add_child(ChildSpec::adopt(handle.actor_ref())).await.unwrap();
	assert_eq!(adopted, handle.as_any());
	assert!(sup.add_child(ChildSpec::adopt(handle.actor_ref()).id("again")).await.is_err());

	send(&adopted, Cmd::Fail).await;
	let replacement = next_child(&sup, "adoptee", &adopted).await.unwrap();
	assert_eq!(replacement.name(), Some("adoptee"));
}

#[tokio::test]
async fn monitor_survives_restart() {
	let rt = Runtime::new();
	let sup = SupervisorSpec::anonymous(RestartStrategy::OneForOne)
		.child(worker("m"))
		.spawn(&rt)
		.unwrap();

	let first = child(&sup, "m").await.unwrap();
	let monitor: Arc<dyn ActorMonitor> = Arc::new(CounterMonitor::new());
	first.set_monitor(Some(Arc::clone(&monitor)));
	send(&first, Cmd::Fail).await;

	let second = next_child(&sup, "m", &first).await.unwrap();
	let carried = second.monitor().unwrap();
	assert!(Arc::ptr_eq(&carried, &monitor));
	let snap = monitor.snapshot();
	assert_eq!(snap.restarts, 1);
	assert_eq!(snap.deaths, 1);
	assert_eq!(snap.last_death.as_deref(), Some("boom"));
}

#[tokio::test]
async fn shutdown_stops_children() {
	let rt = Runtime::new();
	let sup = SupervisorSpec::anonymous(RestartStrategy::OneForOne)
		.child(worker("a"))
		.child(worker("b"))
		.spawn(&rt)
		.unwrap();
	let a = child(&sup, "a").await.unwrap();
	let b = child(&sup, "b").await.unwrap();

	sup.shutdown();
	sup.join().await.unwrap();
	assert!(a.is_done());
	assert!(b.is_done());
	assert!(a.death_cause().is_none());
}

struct Stubborn;

#[async_trait]
impl Actor for Stubborn {
	type Msg = ();
	type Output = ();

	async fn run(&mut self, _cx: &mut ActorContext<()>) -> Result<()> {
		std::future::pending::<()>().await;
		Ok(())
	}
}

#[tokio::test]
async fn unresponsive_child_is_interrupted() {
	let rt = Runtime::new();
	let sup = SupervisorSpec::anonymous(RestartStrategy::OneForOne)
		.child(ChildSpec::new("stubborn", ActorSpec::anonymous(|| Stubborn)).shutdown_deadline(Duration::from_millis(20)))
		.spawn(&rt)
		.unwrap();
	let stubborn = child(&sup, "stubborn").await.unwrap();

	assert!(sup.remove_child("stubborn", true).await.unwrap());
	assert!(matches!(stubborn.death_cause(), Some(ActorError::Interrupted)));
}
