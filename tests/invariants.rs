//! Cross-cutting invariants that aren't specific to any one scenario:
//! determinism, resource conservation, idempotent sealing, and actor
//! bookkeeping, all driven through the public `Engine`/`lmm` API.

use simkernel::actor::ThisActor;
use simkernel::lmm::{SharingPolicy, System};
use simkernel::routing::strategy::ClusterRoutingStrategy;
use simkernel::Engine;
use std::rc::Rc;
use std::sync::{Arc, Mutex};

fn engine() -> Engine {
    Engine::new(simkernel::logger::null_logger(), "root", Box::new(ClusterRoutingStrategy::new("backbone")))
}

fn run_ping_once() -> (f64, Vec<u64>) {
    let mut eng = engine();
    eng.add_host("h1", "root", vec![1e9], 1).unwrap();
    eng.add_host("h2", "root", vec![1e9], 1).unwrap();
    eng.add_link("backbone", 100_000_000.0, 0.001);
    eng.seal_zone("root").unwrap();

    let trace = Arc::new(Mutex::new(Vec::new()));

    let recv_trace = trace.clone();
    eng.spawn_actor(
        "receiver",
        "h2",
        Rc::new(move || {
            let trace = recv_trace.clone();
            Box::new(move |me: ThisActor| {
                me.recv("m").unwrap();
                trace.lock().unwrap().push(me.pid());
            })
        }),
    );
    let send_trace = trace.clone();
    eng.spawn_actor(
        "sender",
        "h1",
        Rc::new(move || {
            let trace = send_trace.clone();
            Box::new(move |me: ThisActor| {
                me.send("m", 1_000_000.0).unwrap();
                trace.lock().unwrap().push(me.pid());
            })
        }),
    );
    eng.run_until_no_work();
    (eng.now(), trace.lock().unwrap().clone())
}

#[test]
fn repeated_runs_of_the_same_platform_are_bit_identical() {
    let (time_a, trace_a) = run_ping_once();
    let (time_b, trace_b) = run_ping_once();
    assert_eq!(time_a, time_b);
    assert_eq!(trace_a, trace_b);
}

#[test]
fn clock_never_decreases_across_successive_run_until_calls() {
    let mut eng = engine();
    eng.add_host("h1", "root", vec![1e9], 1).unwrap();
    eng.seal_zone("root").unwrap();
    eng.spawn_actor(
        "napper",
        "h1",
        Rc::new(|| {
            Box::new(|me: ThisActor| {
                me.sleep_for(1.0).unwrap();
                me.sleep_for(1.0).unwrap();
            })
        }),
    );

    let mut last = eng.now();
    for deadline in [0.5, 1.0, 1.5, 2.0, 10.0] {
        eng.run_until(deadline);
        assert!(eng.now() >= last);
        last = eng.now();
    }
}

#[test]
fn spawned_actor_is_recorded_on_its_host_exactly_once() {
    let mut eng = engine();
    eng.add_host("h1", "root", vec![1e9], 1).unwrap();
    eng.seal_zone("root").unwrap();

    let pid = eng.spawn_actor(
        "long-sleeper",
        "h1",
        Rc::new(|| Box::new(|me: ThisActor| me.sleep_for(100.0).unwrap())),
    );

    let resident = eng.host("h1").unwrap().actors.clone();
    assert_eq!(resident.iter().filter(|&&p| p == pid).count(), 1);
}

#[test]
fn sealing_a_zone_twice_is_a_no_op() {
    let mut eng = engine();
    eng.add_host("h1", "root", vec![1e9], 1).unwrap();
    assert!(eng.seal_zone("root").is_ok());
    assert!(eng.seal_zone("root").is_ok());
}

#[test]
fn turning_a_host_off_then_on_with_no_restartable_actors_leaves_it_idle() {
    let mut eng = engine();
    eng.add_host("h1", "root", vec![1e9], 1).unwrap();
    eng.seal_zone("root").unwrap();

    eng.spawn_actor("plain", "h1", Rc::new(|| Box::new(|me: ThisActor| { let _ = me.sleep_for(1000.0); })));
    eng.turn_off_host("h1");
    eng.turn_on_host("h1");

    assert!(eng.host("h1").unwrap().actors.is_empty());
}

#[test]
fn max_min_fair_share_conserves_capacity_and_starves_nobody() {
    let mut sys = System::new();
    let bottleneck = sys.add_constraint(100.0, SharingPolicy::Shared);
    let v1 = sys.add_variable(1.0, None);
    let v2 = sys.add_variable(1.0, None);
    let v3 = sys.add_variable(1.0, Some(10.0));
    sys.expand(v1, bottleneck, 1.0);
    sys.expand(v2, bottleneck, 1.0);
    sys.expand(v3, bottleneck, 1.0);

    sys.solve();

    let total: f64 = [v1, v2, v3].iter().map(|&v| sys.rate(v)).sum();
    assert!(total <= 100.0 + 1e-6);
    assert!(sys.rate(v1) > 0.0);
    assert!(sys.rate(v2) > 0.0);
    assert!(sys.rate(v3) > 0.0);
    // v3's bound saturates first, leaving the remaining 90.0 split evenly.
    assert!((sys.rate(v3) - 10.0).abs() < 1e-6);
    assert!((sys.rate(v1) - 45.0).abs() < 1e-6);
    assert!((sys.rate(v2) - 45.0).abs() < 1e-6);
}

#[test]
fn send_completion_time_matches_latency_plus_transfer_time_formula() {
    let mut eng = engine();
    eng.add_host("h1", "root", vec![1e9], 1).unwrap();
    eng.add_host("h2", "root", vec![1e9], 1).unwrap();
    eng.add_link("backbone", 40_000_000.0, 0.002);
    eng.seal_zone("root").unwrap();

    eng.spawn_actor("receiver", "h2", Rc::new(|| Box::new(|me: ThisActor| me.recv("m").unwrap())));
    eng.spawn_actor("sender", "h1", Rc::new(|| Box::new(|me: ThisActor| me.send("m", 4_000_000.0).unwrap())));
    eng.run_until_no_work();

    let expected = 0.002 + 4_000_000.0 / 40_000_000.0;
    assert!((eng.now() - expected).abs() < 1e-6);
}
