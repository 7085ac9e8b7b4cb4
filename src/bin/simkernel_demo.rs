//! Command-line runner for the kernel's canned example scenarios, in the
//! style of `rustasim-dcsim`'s own `main.rs`: parse flags with `docopt`,
//! build a platform, run it to completion, print what happened.

use docopt::Docopt;
use serde::Deserialize;
use simkernel::actor::ThisActor;
use simkernel::errors::SimcallError;
use simkernel::resource::profile::Profile;
use simkernel::routing::strategy::{ClusterRoutingStrategy, FullRoutingStrategy};
use simkernel::Engine;
use std::rc::Rc;
use std::sync::{Arc, Mutex};

const USAGE: &str = "
simkernel demo scenarios.

Usage:
    simkernel-demo --scenario NAME
    simkernel-demo --help

Options:
    -h, --help           Show this message.
    -s, --scenario NAME  One of: ping, contention, host-failure,
                         sleep-ordering, auto-restart, bypass-route.
";

#[derive(Debug, Deserialize)]
struct Args {
    flag_help: bool,
    flag_scenario: String,
}

fn main() {
    let args: Args = Docopt::new(USAGE).and_then(|d| d.deserialize()).unwrap_or_else(|e| e.exit());

    if args.flag_help {
        print!("{}", USAGE);
        return;
    }

    let logger = simkernel::logger::root_logger();
    match args.flag_scenario.as_str() {
        "ping" => run_ping(logger),
        "contention" => run_contention(logger),
        "host-failure" => run_host_failure(logger),
        "sleep-ordering" => run_sleep_ordering(logger),
        "auto-restart" => run_auto_restart(logger),
        "bypass-route" => run_bypass_route(logger),
        other => {
            eprintln!("unknown scenario '{}'\n\n{}", other, USAGE);
            std::process::exit(1);
        }
    }
}

/// Scenario 1: a single ping completes at `latency + bytes/bandwidth`.
fn run_ping(logger: slog::Logger) {
    let mut engine = Engine::new(logger, "root", Box::new(ClusterRoutingStrategy::new("backbone")));
    engine.add_host("h1", "root", vec![1e9], 1).unwrap();
    engine.add_host("h2", "root", vec![1e9], 1).unwrap();
    engine.add_link("backbone", 100_000_000.0, 0.001);
    engine.seal_zone("root").unwrap();

    engine.spawn_actor(
        "receiver",
        "h2",
        Rc::new(|| {
            Box::new(|me: ThisActor| {
                me.recv("m").unwrap();
                println!("h2: ping received at t={:.6}", me.now());
            })
        }),
    );
    engine.spawn_actor(
        "sender",
        "h1",
        Rc::new(|| {
            Box::new(|me: ThisActor| {
                me.send("m", 1_000_000.0).unwrap();
                println!("h1: ping delivered at t={:.6}", me.now());
            })
        }),
    );
    engine.run_until_no_work();
    println!("ping done at t={:.6} (expected 0.011000)", engine.now());
}

/// Scenario 2: two concurrent transfers halve the link's bandwidth each.
fn run_contention(logger: slog::Logger) {
    let mut engine = Engine::new(logger, "root", Box::new(ClusterRoutingStrategy::new("backbone")));
    engine.add_host("h1", "root", vec![1e9], 1).unwrap();
    engine.add_host("h2", "root", vec![1e9], 1).unwrap();
    engine.add_link("backbone", 100_000_000.0, 0.001);
    engine.seal_zone("root").unwrap();

    for i in 0..2 {
        let mbox = format!("m{}", i);
        let recv_mbox = mbox.clone();
        engine.spawn_actor(
            format!("receiver-{}", i),
            "h2",
            Rc::new(move || {
                let mbox = recv_mbox.clone();
                Box::new(move |me: ThisActor| {
                    me.recv(&mbox).unwrap();
                    println!("flow {}: completed at t={:.6}", mbox, me.now());
                })
            }),
        );
        engine.spawn_actor(
            format!("sender-{}", i),
            "h1",
            Rc::new(move || {
                let mbox = mbox.clone();
                Box::new(move |me: ThisActor| {
                    me.send(&mbox, 10_000_000.0).unwrap();
                })
            }),
        );
    }
    engine.run_until_no_work();
    println!("contention done at t={:.6} (expected 0.201000)", engine.now());
}

/// Scenario 3: the receiving host dies mid-transfer, so the sender's
/// `wait()` observes `HostFailure` instead of completing.
fn run_host_failure(logger: slog::Logger) {
    let mut engine = Engine::new(logger, "root", Box::new(ClusterRoutingStrategy::new("backbone")));
    engine.add_host("h1", "root", vec![1e9], 1).unwrap();
    engine.add_host("h2", "root", vec![1e9], 1).unwrap();
    engine.add_link("backbone", 10_000_000.0, 0.001);
    engine.seal_zone("root").unwrap();

    engine.spawn_actor(
        "receiver",
        "h2",
        Rc::new(|| Box::new(|me: ThisActor| { let _ = me.recv("m"); })),
    );
    let outcome: Arc<Mutex<Option<Result<(), SimcallError>>>> = Arc::new(Mutex::new(None));
    let outcome_writer = outcome.clone();
    engine.spawn_actor(
        "sender",
        "h1",
        Rc::new(move || {
            let outcome_writer = outcome_writer.clone();
            Box::new(move |me: ThisActor| {
                let result = me.send("m", 10_000_000.0);
                println!("h1: send() returned {:?} at t={:.6}", result, me.now());
                *outcome_writer.lock().unwrap() = Some(result);
            })
        }),
    );

    engine.set_host_state_profile("h2", Profile::parse("0.5 0\n").unwrap());
    engine.run_until_no_work();
    println!("stopped at t={:.6} (expected HostFailure at 0.500000)", engine.now());
    println!("sender observed: {:?}", outcome.lock().unwrap());
}

/// Scenario 4: two actors sleeping the same duration wake in pid order.
fn run_sleep_ordering(logger: slog::Logger) {
    let mut engine = Engine::new(logger, "root", Box::new(ClusterRoutingStrategy::new("backbone")));
    engine.add_host("h1", "root", vec![1e9], 2).unwrap();
    engine.seal_zone("root").unwrap();

    for name in ["a", "b"] {
        engine.spawn_actor(
            name,
            "h1",
            Rc::new(|| {
                Box::new(|me: ThisActor| {
                    me.sleep_for(1.0).unwrap();
                    println!("{}: after sleep at t={:.6}", me.pid(), me.now());
                })
            }),
        );
    }
    engine.run_until_no_work();
    println!("sleep-ordering done at t={:.6} (expected 1.000000)", engine.now());
}

/// Scenario 5: an auto-restarting actor is recreated with a fresh pid
/// once its host reboots.
fn run_auto_restart(logger: slog::Logger) {
    let mut engine = Engine::new(logger, "root", Box::new(ClusterRoutingStrategy::new("backbone")));
    engine.add_host("h1", "root", vec![1e9], 1).unwrap();
    engine.seal_zone("root").unwrap();

    let pid = engine.spawn_actor_auto_restart(
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
    println!("original pid: {}", pid);

    engine.set_host_state_profile("h1", Profile::parse("10 0\n20 1\n").unwrap());
    engine.run_until(30.0);

    let survivors: Vec<_> = engine.host("h1").map(|h| h.actors.clone()).unwrap_or_default();
    println!("pids resident at t={:.6}: {:?} (expect single pid > {})", engine.now(), survivors, pid);
}

/// Scenario 6: a bypass route between two zones overrides their parent's
/// default (higher-latency) path.
fn run_bypass_route(logger: slog::Logger) {
    let mut full = FullRoutingStrategy::new();
    full.add_route("z1", "z2", simkernel::routing::route::Route::single_link("z0-backbone", true), true);
    let mut engine = Engine::new(logger, "z0", Box::new(full));
    engine.add_link("z0-backbone", 1_000_000.0, 0.010);

    engine.create_zone("z1", "z0", Box::new(ClusterRoutingStrategy::new("z1-backbone"))).unwrap();
    engine.add_host("h1", "z1", vec![1e9], 1).unwrap();
    engine.seal_zone("z1").unwrap();

    engine.create_zone("z2", "z0", Box::new(ClusterRoutingStrategy::new("z2-backbone"))).unwrap();
    engine.add_host("h2", "z2", vec![1e9], 1).unwrap();
    engine.seal_zone("z2").unwrap();

    engine.add_link("bypass", 1_000_000.0, 0.001);
    engine
        .routing_mut()
        .add_bypass_route("z0", "h1", "h2", simkernel::routing::route::Route::single_link("bypass", true))
        .unwrap();
    engine.seal_zone("z0").unwrap();

    let (_, latency) = engine.routing().get_global_route("h1", "h2").unwrap();
    println!("h1->h2 route latency: {:.6} (expected 0.001000, default would be 0.010000)", latency);
}
