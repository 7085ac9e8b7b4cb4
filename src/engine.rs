//! The maestro: owns every piece of simulated state and drives the main
//! loop described in spec ยง4.9 — run ready actors, dispatch their
//! simcalls, solve the LMM system, advance the clock to the next event,
//! wake whoever that unblocks, repeat.

use crate::actor::{ActorFactory, ActorImpl, Context, ContextFactory, ThreadContextFactory};
use crate::activity::{comm::CommImpl, exec::ExecImpl, io::IoImpl, sleep::SleepImpl};
use crate::activity::{ActivityImpl, ActivityKind, ActivityState};
use crate::clock::{self, Time};
use crate::config::SimulationConfig;
use crate::errors::{PlatformResult, SimcallError};
use crate::host::Host;
use crate::lmm;
use crate::mailbox::{Mailbox, RecvMatch, SendMatch};
use crate::resource::profile::{Profile, ProfileCursor};
use crate::resource::{Cpu, Disk, Resource, SplitDuplexLink};
use crate::routing::{self, RoutingEngine, RoutingStrategy};
use crate::simcall::{SimcallOutcome, SimcallResult};
use crate::{ActivityId, Pid};
use slog::debug;
use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

/// Which resource a [`ProfileDriver`] mutates as it walks its profile.
enum ProfileTarget {
    HostSpeed(String),
    HostState(String),
    LinkBandwidth(String),
    LinkState(String),
}

/// One profile file attached to a resource, plus the cursor tracking how
/// far it has been walked and the date of its next due event (spec ยง6:
/// `<date> <value>` events, absolute for speed, fractional for bandwidth,
/// boolean for state).
struct ProfileDriver {
    target: ProfileTarget,
    profile: Profile,
    cursor: ProfileCursor,
    next_due: crate::clock::Time,
}

/// Owns every host, link, disk, actor, activity and mailbox in one flat,
/// name/id-keyed namespace — no `Rc`/`Weak` graphs, so the whole thing can
/// be built and torn down freely in tests (spec ยง9).
pub struct Engine {
    logger: slog::Logger,
    clock: clock::EventSet,
    lmm: lmm::System,
    /// Infinite-capacity constraint every `Sleep` activity binds to, so its
    /// rate is always exactly 1.0 (spec ยง4.4).
    sleep_constraint: lmm::ConstraintId,
    routing: RoutingEngine,
    hosts: HashMap<String, Host>,
    links: HashMap<String, SplitDuplexLink>,
    mailboxes: HashMap<String, Mailbox>,
    actors: HashMap<Pid, ActorImpl>,
    activities: HashMap<ActivityId, ActivityImpl>,
    activity_by_variable: HashMap<lmm::VariableId, ActivityId>,
    /// Actors blocked in `join()` on a pid that hasn't exited yet.
    joiners: HashMap<Pid, Vec<ActivityId>>,
    /// Actors blocked in `suspend()`, by the activity token their suspend
    /// resolves once `resume_actor` is called on them.
    suspended: HashMap<Pid, ActivityId>,
    profile_drivers: Vec<ProfileDriver>,
    /// Pids due for `kill_actor` once the next `solve_and_advance` pass
    /// runs. Populated by `clock`-scheduled callbacks from `set_kill_time`,
    /// which (unlike `Engine` methods) cannot themselves hold `&mut Engine`
    /// since the `EventSet` they run from is itself owned by `Engine`.
    pending_kills: Rc<RefCell<Vec<Pid>>>,
    config: SimulationConfig,
    context_factory: Box<dyn ContextFactory>,
    next_pid: Pid,
    next_activity_id: ActivityId,
    ready: VecDeque<Pid>,
    pending_results: HashMap<Pid, SimcallResult>,
}

impl Engine {
    /// Builds an empty engine with a single root netzone named `root_zone`,
    /// routed by `strategy`.
    pub fn new(logger: slog::Logger, root_zone: impl Into<String>, strategy: Box<dyn RoutingStrategy>) -> Engine {
        Engine::with_config(logger, root_zone, strategy, SimulationConfig::default())
    }

    /// Like `new`, but with an explicit [`SimulationConfig`] instead of its
    /// defaults (e.g. a wall-clock budget for CI runs on a stuck platform).
    pub fn with_config(logger: slog::Logger, root_zone: impl Into<String>, strategy: Box<dyn RoutingStrategy>, config: SimulationConfig) -> Engine {
        let mut lmm = lmm::System::new();
        let sleep_constraint = lmm.add_constraint(f64::INFINITY, lmm::SharingPolicy::FatPipe);
        Engine {
            logger,
            clock: clock::EventSet::new(),
            lmm,
            sleep_constraint,
            routing: RoutingEngine::new(root_zone, strategy),
            hosts: HashMap::new(),
            links: HashMap::new(),
            mailboxes: HashMap::new(),
            actors: HashMap::new(),
            activities: HashMap::new(),
            activity_by_variable: HashMap::new(),
            joiners: HashMap::new(),
            suspended: HashMap::new(),
            profile_drivers: Vec::new(),
            pending_kills: Rc::new(RefCell::new(Vec::new())),
            context_factory: Box::new(ThreadContextFactory),
            next_pid: 1,
            next_activity_id: 1,
            ready: VecDeque::new(),
            pending_results: HashMap::new(),
        }
    }

    pub fn now(&self) -> Time {
        self.clock.now()
    }

    pub fn logger(&self) -> &slog::Logger {
        &self.logger
    }

    // -- platform construction -------------------------------------------------

    pub fn create_zone(&mut self, name: impl Into<String>, parent: &str, strategy: Box<dyn RoutingStrategy>) -> PlatformResult<()> {
        self.routing.create_zone(name, parent, strategy)
    }

    pub fn seal_zone(&mut self, zone: &str) -> PlatformResult<()> {
        self.routing.seal(zone)
    }

    pub fn add_host(&mut self, name: impl Into<String>, zone: &str, pstates: Vec<f64>, core_count: u32) -> PlatformResult<()> {
        let name = name.into();
        self.routing.create_host_netpoint(name.clone(), zone)?;
        let cpu = Cpu::new(&mut self.lmm, name.clone(), pstates, core_count, crate::resource::ResourceSharing::Shared);
        self.hosts.insert(name.clone(), Host::new(name, cpu, zone));
        Ok(())
    }

    pub fn add_disk(&mut self, host: &str, disk_name: impl Into<String>, read_bw: f64, write_bw: f64) {
        let disk = Disk::new(&mut self.lmm, disk_name, read_bw, write_bw);
        if let Some(h) = self.hosts.get_mut(host) {
            h.add_disk(disk);
        }
    }

    pub fn add_link(&mut self, name: impl Into<String>, bandwidth: f64, latency: f64) -> String {
        let name = name.into();
        let link = SplitDuplexLink::new(&mut self.lmm, name.clone(), bandwidth, latency);
        self.routing.register_link_latency(name.clone(), latency);
        self.links.insert(name.clone(), link);
        name
    }

    pub fn link_mut(&mut self, name: &str) -> Option<&mut SplitDuplexLink> {
        self.links.get_mut(name)
    }

    /// Attaches a speed-availability profile to a host's cpu: each event's
    /// value is a fraction of peak speed (spec ยง6).
    pub fn set_host_speed_profile(&mut self, host: impl Into<String>, profile: Profile) {
        self.add_profile_driver(ProfileTarget::HostSpeed(host.into()), profile);
    }

    /// Attaches an on/off-state profile to a host: nonzero means on.
    pub fn set_host_state_profile(&mut self, host: impl Into<String>, profile: Profile) {
        self.add_profile_driver(ProfileTarget::HostState(host.into()), profile);
    }

    /// Attaches a bandwidth-availability profile to a link: each event's
    /// value is a fraction of peak bandwidth, applied to both directions of
    /// the split-duplex pair.
    pub fn set_link_bandwidth_profile(&mut self, link: impl Into<String>, profile: Profile) {
        self.add_profile_driver(ProfileTarget::LinkBandwidth(link.into()), profile);
    }

    /// Attaches an on/off-state profile to a link.
    pub fn set_link_state_profile(&mut self, link: impl Into<String>, profile: Profile) {
        self.add_profile_driver(ProfileTarget::LinkState(link.into()), profile);
    }

    fn add_profile_driver(&mut self, target: ProfileTarget, profile: Profile) {
        let cursor = profile.cursor();
        let next_due = cursor.peek(&profile).map(|(d, _)| d).unwrap_or(crate::clock::Time::INFINITY);
        self.profile_drivers.push(ProfileDriver {
            target,
            profile,
            cursor,
            next_due,
        });
    }

    /// Smallest `next_due` across every attached profile driver, or `+inf`.
    fn next_profile_due(&self) -> crate::clock::Time {
        self.profile_drivers
            .iter()
            .map(|d| d.next_due)
            .fold(crate::clock::Time::INFINITY, crate::clock::Time::min)
    }

    /// Applies every profile driver whose next event is due at or before
    /// `now`, in driver order, looping a driver forward through any events
    /// whose dates have all already elapsed (e.g. a fast `LOOPAFTER`
    /// profile during a large `Δ`).
    fn apply_due_profile_events(&mut self, now: crate::clock::Time) {
        for i in 0..self.profile_drivers.len() {
            loop {
                let due = self.profile_drivers[i].next_due;
                if due > now || !due.is_finite() {
                    break;
                }
                let value = match self.profile_drivers[i].cursor.advance(&self.profile_drivers[i].profile) {
                    Some((_, v)) => v,
                    None => {
                        self.profile_drivers[i].next_due = crate::clock::Time::INFINITY;
                        break;
                    }
                };
                self.apply_profile_value(i, value);
                self.profile_drivers[i].next_due = self.profile_drivers[i]
                    .cursor
                    .peek(&self.profile_drivers[i].profile)
                    .map(|(d, _)| d)
                    .unwrap_or(crate::clock::Time::INFINITY);
            }
        }
    }

    fn apply_profile_value(&mut self, driver_index: usize, value: f64) {
        match &self.profile_drivers[driver_index].target {
            ProfileTarget::HostSpeed(host) => {
                let host = host.clone();
                if let Some(h) = self.hosts.get_mut(&host) {
                    h.cpu.apply_speed_scale(&mut self.lmm, value);
                }
            }
            ProfileTarget::HostState(host) => {
                let host = host.clone();
                if value > 0.0 {
                    self.turn_on_host(&host);
                } else {
                    self.turn_off_host(&host);
                }
            }
            ProfileTarget::LinkBandwidth(link) => {
                let link = link.clone();
                if let Some(l) = self.links.get_mut(&link) {
                    l.apply_bandwidth_scale(&mut self.lmm, value);
                }
            }
            ProfileTarget::LinkState(link) => {
                let link = link.clone();
                if let Some(l) = self.links.get_mut(&link) {
                    if value > 0.0 {
                        l.turn_on(&mut self.lmm);
                    } else {
                        l.turn_off(&mut self.lmm);
                    }
                }
            }
        }
    }

    pub fn routing(&self) -> &RoutingEngine {
        &self.routing
    }

    pub fn routing_mut(&mut self) -> &mut RoutingEngine {
        &mut self.routing
    }

    pub fn host(&self, name: &str) -> Option<&Host> {
        self.hosts.get(name)
    }

    pub fn host_mut(&mut self, name: &str) -> Option<&mut Host> {
        self.hosts.get_mut(name)
    }

    /// Powers a host off: cancels every activity touching it, delivers
    /// `HostFailure` to every resident actor's current blocking call,
    /// zeroes its cpu/disk constraints, shuts down every VM pinned to it,
    /// and prunes its boot roster down to the `auto_restart` subset.
    /// Resident actors with `auto_restart` set are re-created once the
    /// host is turned back on (spec ยง4.6).
    pub fn turn_off_host(&mut self, name: &str) {
        let (resident, vms) = match self.hosts.get(name) {
            Some(h) if h.is_on => (h.actors.clone(), h.vms.clone()),
            _ => return,
        };
        for vm in &vms {
            self.turn_off_host(vm);
        }
        if let Some(host) = self.hosts.get_mut(name) {
            host.cpu.turn_off(&mut self.lmm);
            let disk_names: Vec<String> = host.disks.keys().cloned().collect();
            for d in disk_names {
                host.disks.get_mut(&d).unwrap().turn_off(&mut self.lmm);
            }
            host.is_on = false;
        }
        self.fail_activities_touching_host(name);
        for pid in resident {
            self.force_fail_actor(pid, SimcallError::HostFailure(name.to_string()));
        }
        if let Some(host) = self.hosts.get_mut(name) {
            host.prune_boot_roster();
        }
        debug!(self.logger, "host turned off"; "host" => name);
    }

    pub fn turn_on_host(&mut self, name: &str) {
        let restart_roster: Vec<(String, ActorFactory)> = match self.hosts.get_mut(name) {
            Some(host) if !host.is_on => {
                host.is_on = true;
                host.cpu.turn_on(&mut self.lmm);
                let disk_names: Vec<String> = host.disks.keys().cloned().collect();
                for d in disk_names {
                    host.disks.get_mut(&d).unwrap().turn_on(&mut self.lmm);
                }
                host.actors_at_boot.iter().map(|e| (e.name.clone(), e.factory.clone())).collect()
            }
            _ => return,
        };
        for (actor_name, factory) in restart_roster {
            self.spawn_actor(actor_name, name, factory);
        }
    }

    // -- actors -----------------------------------------------------------

    /// Creates a new actor on `host`, running the body produced by
    /// `factory`, and gives it its first turn on the next `run_until`
    /// pass.
    pub fn spawn_actor(&mut self, name: impl Into<String>, host: impl Into<String>, factory: ActorFactory) -> Pid {
        let name = name.into();
        let host = host.into();
        let pid = self.next_pid;
        self.next_pid += 1;
        let mut actor = ActorImpl::new(pid, 0, name.clone(), host.clone());
        let body = factory();
        let engine_ptr: *mut Engine = self;
        let context = self.context_factory.create(engine_ptr, pid, body);
        actor.context = Some(context);
        self.actors.insert(pid, actor);
        if let Some(h) = self.hosts.get_mut(&host) {
            h.add_actor(pid);
            h.record_boot_entry(name, factory, false);
        }
        self.ready.push_back(pid);
        pid
    }

    /// Like [`Engine::spawn_actor`], but the boot-roster entry is marked
    /// `auto_restart`: if the host later reboots, this actor is recreated
    /// from scratch (spec ยง8's auto-restart scenario).
    pub fn spawn_actor_auto_restart(&mut self, name: impl Into<String>, host: impl Into<String>, factory: ActorFactory) -> Pid {
        let pid = self.spawn_actor(name, host.into(), factory);
        if let Some(actor) = self.actors.get_mut(&pid) {
            if let Some(h) = self.hosts.get_mut(&actor.host) {
                if let Some(entry) = h.actors_at_boot.last_mut() {
                    entry.auto_restart = true;
                }
            }
        }
        pid
    }

    pub(crate) fn actor_mut(&mut self, pid: Pid) -> Option<&mut ActorImpl> {
        self.actors.get_mut(&pid)
    }

    fn actor_host(&self, pid: Pid) -> String {
        self.actors[&pid].host.clone()
    }

    pub(crate) fn take_simcall_result(&mut self, pid: Pid) -> SimcallResult {
        self.pending_results.remove(&pid).unwrap_or(SimcallResult::Unit)
    }

    pub(crate) fn mark_wannadie(&mut self, pid: Pid) {
        if let Some(actor) = self.actors.get_mut(&pid) {
            actor.flags.wannadie = true;
        }
    }

    // -- run loop -----------------------------------------------------------

    /// Runs until no actor can make further progress and no event or
    /// activity remains pending.
    pub fn run_until_no_work(&mut self) {
        self.run_until(Time::INFINITY);
    }

    /// Runs until simulated time reaches `deadline`, or (if reached first)
    /// until no further progress is possible, or (if
    /// `config.wallclock_budget` is set) until that much real time has
    /// elapsed, in case the platform is stuck spinning without advancing
    /// simulated time.
    pub fn run_until(&mut self, deadline: Time) {
        let start = std::time::Instant::now();
        loop {
            self.drain_ready_queue();
            if self.only_daemons_remain() {
                let daemons: Vec<Pid> = self.actors.keys().copied().filter(|&pid| pid != 0).collect();
                for pid in daemons {
                    self.kill_actor(pid);
                }
                self.drain_ready_queue();
                break;
            }
            if self.clock.now() >= deadline {
                break;
            }
            if self.ready.is_empty() && self.clock.is_empty() && self.activities.is_empty() {
                break;
            }
            if let Some(budget) = self.config.wallclock_budget {
                if start.elapsed() >= budget {
                    debug!(self.logger, "run_until: wall-clock budget exceeded, giving up"; "budget_secs" => budget.as_secs_f64());
                    break;
                }
            }
            if !self.solve_and_advance(deadline) {
                break;
            }
        }
    }

    /// True once every actor still alive besides the maestro is flagged
    /// `daemon` (spec ยง9): a daemon never by itself keeps a simulation
    /// running once all the ordinary actors it was serving are gone.
    fn only_daemons_remain(&self) -> bool {
        let mut saw_any = false;
        for actor in self.actors.values() {
            if actor.is_maestro() {
                continue;
            }
            saw_any = true;
            if !actor.flags.daemon {
                return false;
            }
        }
        saw_any
    }

    /// Resumes every ready actor and dispatches its simcall, in pid order
    /// for determinism, repeating until nothing more becomes ready without
    /// simulated time advancing (spec ยง4.9's "run all ready actors" step).
    fn drain_ready_queue(&mut self) {
        while !self.ready.is_empty() {
            let mut batch: Vec<Pid> = self.ready.drain(..).collect();
            batch.sort_unstable();
            batch.dedup();
            for pid in &batch {
                if self.actors.contains_key(pid) {
                    self.resume_actor(*pid);
                }
            }
            for pid in batch {
                if self.actors.contains_key(&pid) {
                    self.handle_resumed_actor(pid);
                }
            }
        }
    }

    fn resume_actor(&self, pid: Pid) {
        if let Some(actor) = self.actors.get(&pid) {
            if let Some(context) = &actor.context {
                context.resume();
            }
        }
    }

    fn handle_resumed_actor(&mut self, pid: Pid) {
        let finished = self.actors[&pid].context.as_ref().map(|c| c.is_finished()).unwrap_or(true);
        if finished {
            self.finish_actor(pid);
            return;
        }
        let simcall = match self.actors.get_mut(&pid).and_then(|a| a.pending_simcall.take()) {
            Some(s) => s,
            None => return,
        };
        let outcome = (simcall.code)(self, simcall.issuer);
        match outcome {
            SimcallOutcome::Answered(result) => {
                self.pending_results.insert(pid, result);
                self.ready.push_back(pid);
            }
            SimcallOutcome::Blocked(activity_id) => {
                if let Some(activity) = self.activities.get_mut(&activity_id) {
                    if !activity.waiting_actors.contains(&pid) {
                        activity.waiting_actors.push(pid);
                    }
                }
                if let Some(actor) = self.actors.get_mut(&pid) {
                    if !actor.waiting_synchros.contains(&activity_id) {
                        actor.waiting_synchros.push(activity_id);
                    }
                    if !actor.activities.contains(&activity_id) {
                        actor.activities.push(activity_id);
                    }
                }
            }
        }
    }

    fn finish_actor(&mut self, pid: Pid) {
        if let Some(actor) = self.actors.get_mut(&pid) {
            let hooks = actor.take_on_exit_hooks();
            for hook in hooks {
                hook(true);
            }
        }
        if let Some(join_ids) = self.joiners.remove(&pid) {
            for id in join_ids {
                self.force_complete_activity(id);
            }
        }
        if let Some(mut actor) = self.actors.remove(&pid) {
            if let Some(timer) = actor.kill_timer.take() {
                self.clock.cancel(timer);
            }
            if let Some(host) = self.hosts.get_mut(&actor.host) {
                host.remove_actor(pid);
            }
            debug!(self.logger, "actor finished"; "pid" => pid, "name" => actor.name);
        }
    }

    fn force_complete_activity(&mut self, id: ActivityId) {
        if let Some(mut activity) = self.activities.remove(&id) {
            if activity.state.is_terminal() {
                self.activities.insert(id, activity);
                return;
            }
            if let Some(vid) = activity.variable.take() {
                self.lmm.remove_variable(vid);
                self.activity_by_variable.remove(&vid);
            }
            activity.state = ActivityState::Done;
            let waiters = activity.take_waiters();
            self.detach_waiters(&waiters, id);
            self.ready.extend(waiters);
        }
    }

    fn detach_waiters(&mut self, waiters: &[Pid], id: ActivityId) {
        for pid in waiters {
            if let Some(actor) = self.actors.get_mut(pid) {
                actor.waiting_synchros.retain(|&x| x != id);
            }
        }
    }

    /// Forcibly answers `pid`'s current blocking call with `reason`,
    /// regardless of what activity it was waiting on. This is the only way
    /// Thread-mode can interrupt an actor parked on a condvar: it cannot
    /// reach into native code, only inject the answer the actor's next
    /// `trap()` read will observe.
    fn force_fail_actor(&mut self, pid: Pid, reason: SimcallError) {
        if let Some(actor) = self.actors.get_mut(&pid) {
            for id in std::mem::take(&mut actor.waiting_synchros) {
                if let Some(a) = self.activities.get_mut(&id) {
                    a.waiting_actors.retain(|&p| p != pid);
                }
            }
        } else {
            return;
        }
        self.pending_results.insert(pid, SimcallResult::Failure(reason));
        self.ready.push_back(pid);
    }

    fn fail_activities_touching_host(&mut self, host: &str) {
        let failing: Vec<ActivityId> = self
            .activities
            .iter()
            .filter(|(_, a)| activity_touches_host(a, host))
            .map(|(id, _)| *id)
            .collect();
        for id in failing {
            if let Some(mut activity) = self.activities.remove(&id) {
                if let Some(vid) = activity.variable.take() {
                    self.lmm.remove_variable(vid);
                    self.activity_by_variable.remove(&vid);
                }
                activity.fail(SimcallError::HostFailure(host.to_string()));
                let waiters = activity.take_waiters();
                self.detach_waiters(&waiters, id);
                self.ready.extend(waiters);
            }
        }
    }

    /// Solves the LMM system, advances the clock by the smallest of "next
    /// scheduled event", "next activity completion", "next comm's latency
    /// window elapsing" and "distance to `deadline`", accounts every
    /// running activity for that much progress, and wakes whoever that
    /// finishes. Returns `false` when there is nothing left that could
    /// ever make progress.
    fn solve_and_advance(&mut self, deadline: Time) -> bool {
        self.lmm.solve();
        let now = self.clock.now();
        let event_delta = self.clock.next_due() - now;
        let work_delta = self.lmm.next_event_delta(|vid| self.remaining_for_variable(vid));
        let profile_delta = self.next_profile_due() - now;
        let latency_delta = self
            .activities
            .values()
            .filter(|a| a.state == ActivityState::Started && a.latency_remaining > 0.0)
            .map(|a| a.latency_remaining)
            .fold(f64::INFINITY, f64::min);
        let mut delta = event_delta.min(work_delta).min(profile_delta).min(latency_delta);
        let deadline_delta = deadline - now;
        if deadline_delta < delta {
            delta = deadline_delta;
        }
        if !delta.is_finite() {
            return false;
        }
        delta = delta.max(0.0);
        let completed = self.account_all(delta);
        self.clock.pop_due(now + delta);
        self.apply_due_profile_events(now + delta);
        let due_kills: Vec<Pid> = self.pending_kills.borrow_mut().drain(..).collect();
        for pid in due_kills {
            self.kill_actor(pid);
        }
        for id in completed {
            if let Some(mut activity) = self.activities.remove(&id) {
                let waiters = activity.take_waiters();
                self.detach_waiters(&waiters, id);
                self.ready.extend(waiters);
            }
        }
        true
    }

    /// Remaining work for `next_event_delta`. Activities still in their
    /// latency window draw rate 0 (they're deactivated, see
    /// `CommImpl::spawn_matched`), so `next_event_delta` already skips
    /// them; the latency deadline itself is tracked separately in
    /// `solve_and_advance`.
    fn remaining_for_variable(&self, vid: lmm::VariableId) -> Option<f64> {
        self.activity_by_variable.get(&vid).and_then(|id| self.activities.get(id)).map(|a| a.remaining)
    }

    fn account_all(&mut self, delta: f64) -> Vec<ActivityId> {
        let mut completed = Vec::new();
        let ids: Vec<ActivityId> = self
            .activities
            .iter()
            .filter(|(_, a)| a.variable.is_some())
            .map(|(id, _)| *id)
            .collect();
        for id in ids {
            let vid = self.activities[&id].variable.unwrap();
            let was_in_latency = self.activities[&id].latency_remaining > 0.0;
            let rate = self.lmm.rate(vid);
            let finished = self.activities.get_mut(&id).unwrap().account(rate, delta);
            if was_in_latency && self.activities[&id].latency_remaining <= 0.0 {
                self.lmm.reactivate(vid);
            }
            if finished {
                self.lmm.remove_variable(vid);
                self.activity_by_variable.remove(&vid);
                completed.push(id);
            }
        }
        completed
    }

    fn register_activity(&mut self, activity: ActivityImpl) -> ActivityId {
        let id = self.next_activity_id;
        self.next_activity_id += 1;
        if let Some(vid) = activity.variable {
            self.activity_by_variable.insert(vid, id);
        }
        self.activities.insert(id, activity);
        id
    }

    fn mailbox_mut(&mut self, name: &str) -> &mut Mailbox {
        self.mailboxes.entry(name.to_string()).or_insert_with(|| Mailbox::new(name))
    }

    /// Whichever of an unmatched comm placeholder's two host fields is
    /// already filled in — `dst_host` for a queued recv, `src_host` for a
    /// queued send.
    fn comm_host(&self, token: ActivityId) -> String {
        match &self.activities[&token].kind {
            ActivityKind::Comm(c) if !c.dst_host.is_empty() => c.dst_host.clone(),
            ActivityKind::Comm(c) => c.src_host.clone(),
            _ => unreachable!("comm_host called on a non-comm activity"),
        }
    }

    /// Resolves the route between `src_host` and `dst_host`, spawns the
    /// real LMM-bound transfer, and replaces the placeholder activity at
    /// `token` in place, preserving whichever waiters it had already
    /// accumulated.
    fn upgrade_comm_activity(&mut self, token: ActivityId, src_host: String, dst_host: String, size_bytes: f64, mailbox_name: &str) {
        let (route, latency) = self
            .routing
            .get_global_route(&src_host, &dst_host)
            .expect("a matched send/recv pair must have a resolvable route");
        let constraints: Vec<lmm::ConstraintId> = route
            .links
            .iter()
            .map(|rl| self.links[&rl.link_name].directional(rl.forward).constraint())
            .collect();
        let mut activity = CommImpl::spawn_matched(
            &mut self.lmm,
            format!("comm-{}", token),
            src_host,
            dst_host,
            mailbox_name,
            size_bytes,
            &constraints,
            latency,
        );
        if let Some(old) = self.activities.get(&token) {
            activity.waiting_actors = old.waiting_actors.clone();
        }
        if let Some(vid) = activity.variable {
            self.activity_by_variable.insert(vid, token);
        }
        self.activities.insert(token, activity);
    }

    // -- simcalls, called from inside a filed `Simcall`'s closure -----------

    pub(crate) fn simcall_execute(&mut self, pid: Pid, flops: f64) -> SimcallOutcome {
        let host = self.actor_host(pid);
        let constraint = self.hosts[&host].cpu.constraint();
        let activity = ExecImpl::sequential(&mut self.lmm, format!("exec-{}", pid), host.clone(), flops, constraint);
        SimcallOutcome::Blocked(self.register_activity(activity))
    }

    pub(crate) fn simcall_sleep(&mut self, pid: Pid, duration: f64) -> SimcallOutcome {
        let host = self.actor_host(pid);
        let activity = SleepImpl::new(&mut self.lmm, format!("sleep-{}", pid), host.clone(), duration, self.sleep_constraint);
        SimcallOutcome::Blocked(self.register_activity(activity))
    }

    pub(crate) fn simcall_io(&mut self, pid: Pid, disk_name: &str, write: bool, size_bytes: f64) -> SimcallOutcome {
        let host = self.actor_host(pid);
        let constraint = match self.hosts.get(&host).and_then(|h| h.disks.get(disk_name)) {
            Some(disk) => disk.constraint_for(write),
            None => return SimcallOutcome::Answered(SimcallResult::Failure(SimcallError::HostFailure(host))),
        };
        let activity = IoImpl::new(&mut self.lmm, format!("io-{}", pid), host.clone(), disk_name, write, size_bytes, constraint);
        SimcallOutcome::Blocked(self.register_activity(activity))
    }

    pub(crate) fn simcall_send(&mut self, pid: Pid, mailbox_name: &str, size_bytes: f64) -> SimcallOutcome {
        let host = self.actor_host(pid);
        let token = self.next_activity_id;
        self.next_activity_id += 1;
        let send_match = self.mailbox_mut(mailbox_name).post_send(token);
        match send_match {
            SendMatch::Queued => {
                let kind = ActivityKind::Comm(CommImpl {
                    src_host: host,
                    dst_host: String::new(),
                    mailbox: mailbox_name.to_string(),
                    size_bytes,
                    phase: crate::activity::comm::CommPhase::SrcReady,
                });
                self.activities.insert(token, ActivityImpl::new(format!("send-{}", token), kind, size_bytes));
                SimcallOutcome::Blocked(token)
            }
            SendMatch::Recv(recv_token) => {
                let dst_host = self.comm_host(recv_token);
                self.upgrade_comm_activity(recv_token, host, dst_host, size_bytes, mailbox_name);
                SimcallOutcome::Blocked(recv_token)
            }
            SendMatch::EagerReceiver(receiver_pid) => {
                let dst_host = self.actor_host(receiver_pid);
                let kind = ActivityKind::Comm(CommImpl {
                    src_host: host.clone(),
                    dst_host: String::new(),
                    mailbox: mailbox_name.to_string(),
                    size_bytes,
                    phase: crate::activity::comm::CommPhase::SrcReady,
                });
                self.activities.insert(token, ActivityImpl::new(format!("send-{}", token), kind, size_bytes));
                self.upgrade_comm_activity(token, host, dst_host, size_bytes, mailbox_name);
                SimcallOutcome::Blocked(token)
            }
        }
    }

    pub(crate) fn simcall_recv(&mut self, pid: Pid, mailbox_name: &str) -> SimcallOutcome {
        let host = self.actor_host(pid);
        let token = self.next_activity_id;
        self.next_activity_id += 1;
        let recv_match = self.mailbox_mut(mailbox_name).post_recv(token);
        match recv_match {
            RecvMatch::Queued => {
                let kind = ActivityKind::Comm(CommImpl {
                    src_host: String::new(),
                    dst_host: host,
                    mailbox: mailbox_name.to_string(),
                    size_bytes: 0.0,
                    phase: crate::activity::comm::CommPhase::DstReady,
                });
                self.activities.insert(token, ActivityImpl::new(format!("recv-{}", token), kind, 0.0));
                SimcallOutcome::Blocked(token)
            }
            RecvMatch::Send(send_token) => {
                let src_host = self.comm_host(send_token);
                let size_bytes = self.activities[&send_token].remaining;
                self.upgrade_comm_activity(send_token, src_host, host, size_bytes, mailbox_name);
                SimcallOutcome::Blocked(send_token)
            }
            RecvMatch::AlreadyRunning(send_token) => SimcallOutcome::Blocked(send_token),
        }
    }

    pub(crate) fn simcall_join(&mut self, pid: Pid, target: Pid, timeout: Option<f64>) -> SimcallOutcome {
        if !self.actors.contains_key(&target) {
            return SimcallOutcome::Answered(SimcallResult::Unit);
        }
        let host = self.actor_host(pid);
        let duration = timeout.unwrap_or(f64::INFINITY);
        let activity = SleepImpl::new(&mut self.lmm, format!("join-{}-{}", pid, target), host, duration, self.sleep_constraint);
        let token = self.register_activity(activity);
        self.joiners.entry(target).or_default().push(token);
        SimcallOutcome::Blocked(token)
    }

    pub(crate) fn simcall_kill(&mut self, _pid: Pid, target: Pid) -> SimcallOutcome {
        self.kill_actor(target);
        SimcallOutcome::Answered(SimcallResult::Unit)
    }

    /// Forcibly terminates `target` right away. Spec ยง9/DESIGN.md: Thread-mode
    /// can only reach into an actor while it is blocked inside `trap()`, so a
    /// blocked target is answered with `ForcefulKill` and torn down the next
    /// time the scheduler resumes it, the same mechanism `turn_off_host` uses
    /// to fail activities touching a dead host.
    pub fn kill_actor(&mut self, target: Pid) {
        if !self.actors.contains_key(&target) || target == 0 {
            return;
        }
        self.mark_wannadie(target);
        if let Some(timer) = self.actors.get_mut(&target).and_then(|a| a.kill_timer.take()) {
            self.clock.cancel(timer);
        }
        self.force_fail_actor(target, SimcallError::ForcefulKill(format!("actor {} killed", target)));
    }

    pub(crate) fn simcall_suspend(&mut self, pid: Pid) -> SimcallOutcome {
        let host = self.actor_host(pid);
        let activity = SleepImpl::new(&mut self.lmm, format!("suspend-{}", pid), host, f64::INFINITY, self.sleep_constraint);
        let token = self.register_activity(activity);
        self.suspended.insert(pid, token);
        if let Some(actor) = self.actors.get_mut(&pid) {
            actor.flags.suspended = true;
        }
        SimcallOutcome::Blocked(token)
    }

    pub(crate) fn simcall_resume_actor(&mut self, target: Pid) -> SimcallOutcome {
        if let Some(token) = self.suspended.remove(&target) {
            self.force_complete_activity(token);
        }
        if let Some(actor) = self.actors.get_mut(&target) {
            actor.flags.suspended = false;
        }
        SimcallOutcome::Answered(SimcallResult::Unit)
    }

    pub(crate) fn simcall_set_daemon(&mut self, pid: Pid, daemon: bool) -> SimcallOutcome {
        if let Some(actor) = self.actors.get_mut(&pid) {
            actor.flags.daemon = daemon;
        }
        SimcallOutcome::Answered(SimcallResult::Unit)
    }

    /// Schedules `target` to be killed at simulated time `date`, replacing
    /// any kill timer already set for it. The callback only pushes `target`
    /// into `pending_kills`, which `solve_and_advance` drains right after
    /// `clock.pop_due` - `EventSet`'s callbacks are `'static` closures that
    /// cannot themselves borrow the `Engine` that owns the clock.
    pub fn set_kill_time(&mut self, target: Pid, date: Time) {
        if !self.actors.contains_key(&target) {
            return;
        }
        if let Some(old) = self.actors.get_mut(&target).and_then(|a| a.kill_timer.take()) {
            self.clock.cancel(old);
        }
        let sink = self.pending_kills.clone();
        let handle = self.clock.schedule(date, move || sink.borrow_mut().push(target));
        if let Some(actor) = self.actors.get_mut(&target) {
            actor.kill_timer = Some(handle);
        }
    }

    /// Starts a sequential exec without blocking the issuer, handing back
    /// the activity's token (spec ยง6's asynchronous variants).
    pub(crate) fn simcall_exec_async(&mut self, pid: Pid, flops: f64) -> SimcallOutcome {
        let host = self.actor_host(pid);
        let constraint = self.hosts[&host].cpu.constraint();
        let activity = ExecImpl::sequential(&mut self.lmm, format!("exec-async-{}", pid), host, flops, constraint);
        let token = self.register_activity(activity);
        if let Some(actor) = self.actors.get_mut(&pid) {
            if !actor.activities.contains(&token) {
                actor.activities.push(token);
            }
        }
        SimcallOutcome::Answered(SimcallResult::NewActivity(token))
    }

    /// Couples flops on several hosts and bytes over the links between them
    /// into a single rate-coupled activity (spec ยง4.4/ยง6's `parallel_execute`).
    pub(crate) fn simcall_parallel_execute(
        &mut self,
        pid: Pid,
        host_flops: Vec<(String, f64)>,
        host_comms: Vec<(String, String, f64)>,
    ) -> SimcallOutcome {
        let hosts: Vec<(String, f64, lmm::ConstraintId)> = host_flops
            .into_iter()
            .filter_map(|(h, flops)| self.hosts.get(&h).map(|host| (h.clone(), flops, host.cpu.constraint())))
            .collect();
        if hosts.is_empty() {
            return SimcallOutcome::Answered(SimcallResult::Failure(SimcallError::HostFailure(
                "parallel_execute needs at least one live host".into(),
            )));
        }
        let total_flops: f64 = hosts.iter().map(|(_, f, _)| f).sum();
        let mut links = Vec::new();
        for (src, dst, bytes) in host_comms {
            let route = match self.routing.get_global_route(&src, &dst) {
                Ok((route, _latency)) => route,
                Err(_) => continue,
            };
            let coeff = if total_flops > 0.0 { bytes / total_flops } else { 0.0 };
            for rl in &route.links {
                let constraint = self.links[&rl.link_name].directional(rl.forward).constraint();
                links.push((constraint, coeff));
            }
        }
        let activity = ExecImpl::parallel(&mut self.lmm, format!("parallel-exec-{}", pid), hosts, links);
        let token = self.register_activity(activity);
        if let Some(actor) = self.actors.get_mut(&pid) {
            if !actor.activities.contains(&token) {
                actor.activities.push(token);
            }
        }
        SimcallOutcome::Blocked(token)
    }

    /// Blocks until `token` reaches a terminal state, consuming it. Answers
    /// immediately (as success) if the token is unknown — either it was
    /// already consumed by an earlier `wait`/`test`, or completed and was
    /// purged before anyone asked after it.
    pub(crate) fn simcall_wait(&mut self, token: ActivityId) -> SimcallOutcome {
        match self.activities.get(&token) {
            None => SimcallOutcome::Answered(SimcallResult::Unit),
            Some(a) if a.state.is_terminal() => self.consume_terminal_activity(token),
            Some(_) => SimcallOutcome::Blocked(token),
        }
    }

    /// Non-blocking activity poll: true once `token` has reached a terminal
    /// state (spec ยง6's `test`). Safe to call directly from `ThisActor`
    /// without trapping, the same way `now()` reads the clock directly —
    /// the calling actor holds its turn the whole time.
    pub(crate) fn test_activity(&self, token: ActivityId) -> bool {
        self.activities.get(&token).map(|a| a.state.is_terminal()).unwrap_or(true)
    }

    /// Cancels an in-flight activity, waking anyone already blocked on it
    /// with `SimcallError::Cancel`.
    pub(crate) fn simcall_cancel(&mut self, token: ActivityId) -> SimcallOutcome {
        if let Some(activity) = self.activities.get_mut(&token) {
            if let Some(vid) = activity.variable.take() {
                self.lmm.remove_variable(vid);
                self.activity_by_variable.remove(&vid);
            }
            activity.cancel();
        }
        SimcallOutcome::Answered(SimcallResult::Unit)
    }

    fn consume_terminal_activity(&mut self, token: ActivityId) -> SimcallOutcome {
        match self.activities.remove(&token) {
            Some(activity) => match activity.failure {
                Some(err) => SimcallOutcome::Answered(SimcallResult::Failure(err)),
                None => SimcallOutcome::Answered(SimcallResult::Unit),
            },
            None => SimcallOutcome::Answered(SimcallResult::Unit),
        }
    }

    /// True if `mailbox` has a send already queued, without consuming it
    /// (spec ยง6's `iprobe`).
    pub fn iprobe(&mut self, mailbox: &str) -> bool {
        self.mailbox_mut(mailbox).has_pending_send()
    }

    /// Registers a pseudo-actor for code running on a thread the kernel did
    /// not spawn (spec ยง2's "attach"/"detach", kept from
    /// `original_source/src/kernel/actor/ActorImpl.cpp`). The returned pid
    /// has no `Context`, so the scheduler never resumes it; it exists only
    /// so attached code can own mailboxes/activities and appear in host
    /// actor lists like any other actor.
    pub fn attach(&mut self, name: impl Into<String>, host: impl Into<String>) -> Pid {
        let name = name.into();
        let host = host.into();
        let pid = self.next_pid;
        self.next_pid += 1;
        let mut actor = ActorImpl::new(pid, 0, name, host.clone());
        actor.attached = true;
        self.actors.insert(pid, actor);
        if let Some(h) = self.hosts.get_mut(&host) {
            h.add_actor(pid);
        }
        pid
    }

    /// Unregisters a pid created by `attach`, running its `on_exit` hooks
    /// and removing it from its host's actor list.
    pub fn detach(&mut self, pid: Pid) {
        if self.actors.get(&pid).map(|a| a.attached).unwrap_or(false) {
            self.finish_actor(pid);
        }
    }

    /// Creates a VM: a host pinned onto a physical host's cpu/actor
    /// namespace, sharing its compute capacity (spec ยง2's VM support).
    pub fn create_vm(&mut self, name: impl Into<String>, physical_host: &str, core_count: u32) -> PlatformResult<()> {
        let zone = self
            .hosts
            .get(physical_host)
            .map(|h| h.zone.clone())
            .ok_or_else(|| crate::errors::PlatformError::UnknownNetpoint(physical_host.to_string()))?;
        let peak = self.hosts[physical_host].cpu.peak() / self.hosts[physical_host].cpu.core_count().max(1) as f64;
        let cpu = Cpu::new(&mut self.lmm, name.into(), vec![peak], core_count, crate::resource::ResourceSharing::Shared);
        let mut vm = Host::new(cpu.name().to_string(), cpu, zone);
        vm.pinned_on = Some(physical_host.to_string());
        let vm_name = vm.name.clone();
        self.hosts.insert(vm_name.clone(), vm);
        if let Some(h) = self.hosts.get_mut(physical_host) {
            h.add_vm(vm_name);
        }
        Ok(())
    }
}

fn activity_touches_host(a: &ActivityImpl, host: &str) -> bool {
    match &a.kind {
        ActivityKind::Exec(e) => e.host_flops.iter().any(|(h, _, _)| h == host),
        ActivityKind::Comm(c) => c.src_host == host || c.dst_host == host,
        ActivityKind::Sleep(s) => s.host == host,
        ActivityKind::Io(i) => i.host == host,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::strategy::ClusterRoutingStrategy;

    fn test_engine() -> Engine {
        Engine::new(crate::logger::null_logger(), "root", Box::new(ClusterRoutingStrategy::new("backbone")))
    }

    #[test]
    fn sleeping_actor_wakes_after_its_duration() {
        let mut engine = test_engine();
        engine.add_host("h1", "root", vec![1e9], 1).unwrap();
        engine.seal_zone("root").unwrap();
        engine.spawn_actor("napper", "h1", std::rc::Rc::new(|| {
            Box::new(|me: crate::actor::ThisActor| {
                me.sleep_for(2.0).unwrap();
            })
        }));
        engine.run_until_no_work();
        assert!((engine.now() - 2.0).abs() < 1e-6);
    }

    #[test]
    fn two_hosts_exchange_a_message() {
        let mut engine = test_engine();
        engine.add_host("h1", "root", vec![1e9], 1).unwrap();
        engine.add_host("h2", "root", vec![1e9], 1).unwrap();
        engine.add_link("backbone", 1_000_000.0, 0.001);
        engine.seal_zone("root").unwrap();

        engine.spawn_actor("receiver", "h2", std::rc::Rc::new(|| {
            Box::new(|me: crate::actor::ThisActor| {
                me.recv("mbox").unwrap();
            })
        }));
        engine.spawn_actor("sender", "h1", std::rc::Rc::new(|| {
            Box::new(|me: crate::actor::ThisActor| {
                me.send("mbox", 10_000.0).unwrap();
            })
        }));
        engine.run_until_no_work();
        assert!(engine.now() > 0.0);
    }
}
