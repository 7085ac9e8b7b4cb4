//! End-to-end scenarios, driven entirely through `Engine`'s public API,
//! matching the literal walkthroughs used to validate the kernel.

use simkernel::actor::ThisActor;
use simkernel::errors::SimcallError;
use simkernel::resource::profile::Profile;
use simkernel::routing::route::Route;
use simkernel::routing::strategy::{ClusterRoutingStrategy, FullRoutingStrategy};
use simkernel::Engine;
use std::rc::Rc;
use std::sync::{Arc, Mutex};

fn engine() -> Engine {
    Engine::new(simkernel::logger::null_logger(), "root", Box::new(ClusterRoutingStrategy::new("backbone")))
}

fn close(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-6
}

#[test]
fn two_host_ping_completes_at_latency_plus_transfer_time() {
    let mut eng = engine();
    eng.add_host("h1", "root", vec![1e9], 1).unwrap();
    eng.add_host("h2", "root", vec![1e9], 1).unwrap();
    eng.add_link("backbone", 100_000_000.0, 0.001);
    eng.seal_zone("root").unwrap();

    eng.spawn_actor("receiver", "h2", Rc::new(|| Box::new(|me: ThisActor| me.recv("m").unwrap())));
    eng.spawn_actor("sender", "h1", Rc::new(|| Box::new(|me: ThisActor| me.send("m", 1_000_000.0).unwrap())));
    eng.run_until_no_work();

    assert!(close(eng.now(), 0.011));
}

#[test]
fn concurrent_transfers_on_the_same_link_share_bandwidth_evenly() {
    let mut eng = engine();
    eng.add_host("h1", "root", vec![1e9], 1).unwrap();
    eng.add_host("h2", "root", vec![1e9], 1).unwrap();
    eng.add_link("backbone", 100_000_000.0, 0.001);
    eng.seal_zone("root").unwrap();

    for i in 0..2 {
        let mbox = format!("m{}", i);
        let recv_mbox = mbox.clone();
        eng.spawn_actor(
            format!("receiver-{}", i),
            "h2",
            Rc::new(move || {
                let mbox = recv_mbox.clone();
                Box::new(move |me: ThisActor| me.recv(&mbox).unwrap())
            }),
        );
        eng.spawn_actor(
            format!("sender-{}", i),
            "h1",
            Rc::new(move || {
                let mbox = mbox.clone();
                Box::new(move |me: ThisActor| me.send(&mbox, 10_000_000.0).unwrap())
            }),
        );
    }
    eng.run_until_no_work();

    assert!(close(eng.now(), 0.201));
}

#[test]
fn receiving_host_failure_mid_transfer_throws_host_failure() {
    let mut eng = engine();
    eng.add_host("h1", "root", vec![1e9], 1).unwrap();
    eng.add_host("h2", "root", vec![1e9], 1).unwrap();
    eng.add_link("backbone", 10_000_000.0, 0.001);
    eng.seal_zone("root").unwrap();

    eng.spawn_actor("receiver", "h2", Rc::new(|| Box::new(|me: ThisActor| { let _ = me.recv("m"); })));

    let observed: Arc<Mutex<Option<Result<(), SimcallError>>>> = Arc::new(Mutex::new(None));
    let writer = observed.clone();
    eng.spawn_actor(
        "sender",
        "h1",
        Rc::new(move || {
            let writer = writer.clone();
            Box::new(move |me: ThisActor| {
                let result = me.send("m", 10_000_000.0);
                *writer.lock().unwrap() = Some(result);
            })
        }),
    );

    eng.set_host_state_profile("h2", Profile::parse("0.5 0\n").unwrap());
    eng.run_until_no_work();

    assert!(close(eng.now(), 0.5));
    match observed.lock().unwrap().as_ref().unwrap() {
        Err(SimcallError::HostFailure(host)) => assert_eq!(host, "h2"),
        other => panic!("expected HostFailure, got {:?}", other),
    }
}

#[test]
fn actors_sleeping_the_same_duration_wake_in_pid_order() {
    let mut eng = engine();
    eng.add_host("h1", "root", vec![1e9], 2).unwrap();
    eng.seal_zone("root").unwrap();

    let wake_order = Arc::new(Mutex::new(Vec::new()));

    let a_order = wake_order.clone();
    let a_pid = eng.spawn_actor(
        "a",
        "h1",
        Rc::new(move || {
            let order = a_order.clone();
            Box::new(move |me: ThisActor| {
                me.sleep_for(1.0).unwrap();
                order.lock().unwrap().push(me.pid());
            })
        }),
    );
    let b_order = wake_order.clone();
    let b_pid = eng.spawn_actor(
        "b",
        "h1",
        Rc::new(move || {
            let order = b_order.clone();
            Box::new(move |me: ThisActor| {
                me.sleep_for(1.0).unwrap();
                order.lock().unwrap().push(me.pid());
            })
        }),
    );
    assert!(a_pid < b_pid);

    eng.run_until_no_work();

    assert!(close(eng.now(), 1.0));
    assert_eq!(*wake_order.lock().unwrap(), vec![a_pid, b_pid]);
}

#[test]
fn auto_restarting_actor_reappears_with_a_fresh_pid_after_reboot() {
    let mut eng = engine();
    eng.add_host("h1", "root", vec![1e9], 1).unwrap();
    eng.seal_zone("root").unwrap();

    let original_pid = eng.spawn_actor_auto_restart(
        "looper",
        "h1",
        Rc::new(|| {
            Box::new(|me: ThisActor| loop {
                if me.sleep_for(1.0).is_err() {
                    return;
                }
            })
        }),
    );

    eng.set_host_state_profile("h1", Profile::parse("10 0\n20 1\n").unwrap());
    eng.run_until(25.0);

    let resident = eng.host("h1").unwrap().actors.clone();
    assert_eq!(resident.len(), 1);
    assert!(resident[0] > original_pid);
}

#[test]
fn bypass_route_overrides_the_hierarchical_default_latency() {
    let mut root_strategy = FullRoutingStrategy::new();
    root_strategy.add_route("z1", "z2", Route::single_link("wan", true), true);

    let mut eng = Engine::new(simkernel::logger::null_logger(), "z0", Box::new(root_strategy));
    eng.add_link("wan", 1_000_000.0, 0.010);

    eng.create_zone("z1", "z0", Box::new(ClusterRoutingStrategy::new("z1-backbone"))).unwrap();
    eng.add_host("h1", "z1", vec![1e9], 1).unwrap();
    eng.seal_zone("z1").unwrap();

    eng.create_zone("z2", "z0", Box::new(ClusterRoutingStrategy::new("z2-backbone"))).unwrap();
    eng.add_host("h2", "z2", vec![1e9], 1).unwrap();
    eng.seal_zone("z2").unwrap();

    let (_, default_latency) = {
        eng.seal_zone("z0").unwrap();
        eng.routing().get_global_route("h1", "h2").unwrap()
    };
    assert!(close(default_latency, 0.010));

    eng.add_link("bypass", 1_000_000.0, 0.001);
    eng.routing_mut()
        .add_bypass_route("z0", "h1", "h2", Route::single_link("bypass", true))
        .unwrap();

    let (route, latency) = eng.routing().get_global_route("h1", "h2").unwrap();
    assert_eq!(route.links.len(), 1);
    assert!(close(latency, 0.001));
}
