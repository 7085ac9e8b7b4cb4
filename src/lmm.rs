//! Linear max-min constraint system.
//!
//! Variables are activities; constraints are resources. `solve()` computes,
//! for every variable, an instantaneous fair-share rate, by progressive
//! filling: repeatedly find the variable that would need the least
//! additional rate to saturate *some* constraint it touches, raise every
//! still-growing variable on that constraint to that rate, remove the
//! constraint from further consideration, and repeat on the residual
//! system. This is the textbook progressive-filling algorithm for max-min
//! fairness; see spec ยง4.2 for the exact contract this must satisfy.

use std::collections::HashMap;

/// Numeric tolerance used throughout rate comparisons. Below this, two
/// rates are considered equal and a rate is clamped to zero. Mirrors
/// `sg_precision_timing` from the system this crate is modeled on.
pub const PRECISION: f64 = 1e-9;

/// How a constraint's capacity is shared among the variables bound to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SharingPolicy {
    /// Capacity is divided max-min fair among all bound variables.
    Shared,
    /// Capacity is *not* shared: every bound variable may use up to the
    /// full capacity (the aggregate is the max, not the sum, of demands).
    FatPipe,
    /// Like `Shared`, but the aggregated demand passes through a callback
    /// before being compared to capacity (e.g. TCP-model degradation
    /// curves). Negative outputs are clamped to zero.
    NonLinear,
    /// Like `Shared`, but each variable is additionally capped by a
    /// per-variable rate recorded alongside the constraint (used for
    /// per-host WiFi rate caps).
    Wifi,
}

/// A resource-side node in the bipartite variable/constraint graph.
pub struct Constraint {
    id: usize,
    capacity: f64,
    policy: SharingPolicy,
    nonlinear_cb: Option<Box<dyn Fn(f64) -> f64>>,
    /// `(variable_id -> per-variable rate cap)`, consulted only under
    /// `SharingPolicy::Wifi`.
    per_variable_cap: HashMap<usize, f64>,
}

impl std::fmt::Debug for Constraint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Constraint")
            .field("id", &self.id)
            .field("capacity", &self.capacity)
            .field("policy", &self.policy)
            .finish()
    }
}

impl Constraint {
    /// Sets (overwrites) the capacity of this constraint. A sealed resource
    /// should never call this on a static parameter; profile-driven
    /// updates (on/off, bandwidth degradation) are the intended caller.
    pub fn set_capacity(&mut self, capacity: f64) {
        self.capacity = capacity.max(0.0);
    }

    /// Current capacity.
    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    /// Records a per-variable rate cap, used by `SharingPolicy::Wifi`.
    pub fn set_variable_cap(&mut self, variable: VariableId, cap: f64) {
        self.per_variable_cap.insert(variable.0, cap);
    }
}

/// A variable-side node: one in-flight activity.
#[derive(Debug)]
struct Variable {
    id: usize,
    weight: f64,
    /// Optional user-set rate cap (a bound the activity may not exceed
    /// regardless of what the constraints would otherwise allow).
    bound: Option<f64>,
    /// `(constraint_id, coefficient)` — how much of each bound constraint's
    /// capacity one unit of this variable's rate consumes.
    edges: Vec<(usize, f64)>,
    active: bool,
    rate: f64,
}

/// Opaque handle to a variable registered with a [`System`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VariableId(usize);

/// Opaque handle to a constraint registered with a [`System`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConstraintId(usize);

/// The bipartite variable/constraint graph plus the solver.
#[derive(Default)]
pub struct System {
    constraints: Vec<Constraint>,
    variables: Vec<Variable>,
}

impl System {
    /// An empty system.
    pub fn new() -> System {
        System::default()
    }

    /// Registers a new constraint (resource) with the given capacity and
    /// sharing policy.
    pub fn add_constraint(&mut self, capacity: f64, policy: SharingPolicy) -> ConstraintId {
        let id = self.constraints.len();
        self.constraints.push(Constraint {
            id,
            capacity: capacity.max(0.0),
            policy,
            nonlinear_cb: None,
            per_variable_cap: HashMap::new(),
        });
        ConstraintId(id)
    }

    /// Installs the nonlinear transform for a `NonLinear` constraint.
    pub fn set_nonlinear_callback(
        &mut self,
        constraint: ConstraintId,
        cb: impl Fn(f64) -> f64 + 'static,
    ) {
        self.constraints[constraint.0].nonlinear_cb = Some(Box::new(cb));
    }

    /// Mutable access to a constraint, e.g. for profile-driven capacity
    /// changes or WiFi per-host caps.
    pub fn constraint_mut(&mut self, constraint: ConstraintId) -> &mut Constraint {
        &mut self.constraints[constraint.0]
    }

    /// Read-only access to a constraint.
    pub fn constraint(&self, constraint: ConstraintId) -> &Constraint {
        &self.constraints[constraint.0]
    }

    /// Registers a new variable (activity) with the given weight (priority:
    /// higher weight wins a proportionally larger share) and optional rate
    /// bound.
    pub fn add_variable(&mut self, weight: f64, bound: Option<f64>) -> VariableId {
        let id = self.variables.len();
        self.variables.push(Variable {
            id,
            weight,
            bound,
            edges: Vec::new(),
            active: true,
            rate: 0.0,
        });
        VariableId(id)
    }

    /// Binds `variable` to `constraint` with the given per-unit-rate
    /// consumption coefficient.
    pub fn expand(&mut self, variable: VariableId, constraint: ConstraintId, coefficient: f64) {
        self.variables[variable.0].edges.push((constraint.0, coefficient));
    }

    /// Removes a variable from the system entirely (the activity finished
    /// or was cancelled).
    pub fn remove_variable(&mut self, variable: VariableId) {
        self.variables[variable.0].active = false;
        self.variables[variable.0].edges.clear();
    }

    /// Marks a variable inactive without forgetting its edges (used when an
    /// activity is paused, e.g. during network latency countdown, and will
    /// be reactivated later via [`System::reactivate`]).
    pub fn deactivate(&mut self, variable: VariableId) {
        self.variables[variable.0].active = false;
        self.variables[variable.0].rate = 0.0;
    }

    /// Reactivates a previously-deactivated variable so it competes again.
    pub fn reactivate(&mut self, variable: VariableId) {
        self.variables[variable.0].active = true;
    }

    /// Current rate of a variable, as of the last `solve()`.
    pub fn rate(&self, variable: VariableId) -> f64 {
        self.variables[variable.0].rate
    }

    /// Runs progressive filling over the current graph, updating every
    /// active variable's rate. Returns the set of constraints that ended up
    /// saturated.
    pub fn solve(&mut self) -> Vec<ConstraintId> {
        for v in &mut self.variables {
            if v.active {
                v.rate = 0.0;
            }
        }

        // number of still-growing variables bound to each constraint
        let mut remaining_users: Vec<usize> = vec![0; self.constraints.len()];
        for v in &self.variables {
            if !v.active {
                continue;
            }
            for &(cid, _) in &v.edges {
                remaining_users[cid] += 1;
            }
        }

        let mut saturated = vec![false; self.constraints.len()];
        let mut growing: Vec<bool> = self.variables.iter().map(|v| v.active).collect();
        let mut saturated_ids = Vec::new();

        loop {
            // Find the (variable, delta-rate) pair that would saturate the
            // tightest constraint first, among variables still growing.
            let mut best: Option<(f64, usize)> = None; // (delta rate, variable id)

            for v in &self.variables {
                if !growing[v.id] {
                    continue;
                }
                let mut limit = v.bound.map(|b| b - v.rate).unwrap_or(f64::INFINITY);

                for &(cid, coeff) in &v.edges {
                    if saturated[cid] || coeff <= 0.0 {
                        continue;
                    }
                    let c = &self.constraints[cid];
                    let share_left = match c.policy {
                        SharingPolicy::FatPipe => c.capacity - per_constraint_max(self, cid),
                        _ => {
                            let used = per_constraint_sum(self, cid);
                            let capacity = match c.policy {
                                SharingPolicy::NonLinear => {
                                    nonlinear_capacity(c, used + remaining_users[cid] as f64 * 0.0)
                                }
                                _ => c.capacity,
                            };
                            capacity - used
                        }
                    };
                    let n = remaining_users[cid].max(1) as f64;
                    let mut allowed_delta = (share_left / n) / coeff;
                    if c.policy == SharingPolicy::Wifi {
                        if let Some(&cap) = c.per_variable_cap.get(&v.id) {
                            allowed_delta = allowed_delta.min((cap - v.rate).max(0.0) / coeff.max(1e-15));
                        }
                    }
                    if allowed_delta < limit {
                        limit = allowed_delta;
                    }
                }

                if limit.is_finite() {
                    match best {
                        Some((best_delta, best_id)) => {
                            if limit + PRECISION < best_delta
                                || ((limit - best_delta).abs() <= PRECISION && v.id < best_id)
                            {
                                best = Some((limit, v.id));
                            }
                        }
                        None => best = Some((limit, v.id)),
                    }
                }
            }

            let (delta, saturator) = match best {
                Some(pair) => pair,
                None => break, // no variable can grow further (all unbounded or none left)
            };
            let delta = delta.max(0.0);

            // raise every growing variable's rate by `delta`
            for v in &mut self.variables {
                if growing[v.id] {
                    v.rate = (v.rate + delta).max(0.0);
                    if v.rate < PRECISION {
                        v.rate = 0.0;
                    }
                }
            }

            // stop growing the variable that just hit its own bound
            if self.variables[saturator]
                .bound
                .map(|b| (self.variables[saturator].rate - b).abs() <= PRECISION)
                .unwrap_or(false)
            {
                growing[saturator] = false;
            }

            // saturate every constraint now at capacity
            for cid in 0..self.constraints.len() {
                if saturated[cid] {
                    continue;
                }
                let c = &self.constraints[cid];
                let used = match c.policy {
                    SharingPolicy::FatPipe => per_constraint_max(self, cid),
                    _ => per_constraint_sum(self, cid),
                };
                let capacity = match c.policy {
                    SharingPolicy::NonLinear => nonlinear_capacity(c, used),
                    _ => c.capacity,
                };
                if capacity - used <= PRECISION {
                    saturated[cid] = true;
                    saturated_ids.push(ConstraintId(cid));
                    for v in &self.variables {
                        if !growing[v.id] {
                            continue;
                        }
                        if v.edges.iter().any(|&(c2, coeff)| c2 == cid && coeff > 0.0) {
                            growing[v.id] = false;
                        }
                    }
                }
            }

            if !growing.iter().any(|&g| g) {
                break;
            }
        }

        for v in &mut self.variables {
            if v.active && v.rate < PRECISION {
                v.rate = 0.0;
            }
        }

        saturated_ids
    }

    /// Smallest `delta > 0` such that, at current rates, some variable
    /// with remaining work `w` (`remaining_work[i]`) would complete, i.e.
    /// `delta = min(remaining / rate)` over active variables with
    /// `rate > 0`. Callers combine this with the event set's `next_due()`.
    pub fn next_event_delta(&self, remaining_work: impl Fn(VariableId) -> Option<f64>) -> f64 {
        let mut min_delta = f64::INFINITY;
        for v in &self.variables {
            if !v.active || v.rate <= PRECISION {
                continue;
            }
            if let Some(remaining) = remaining_work(VariableId(v.id)) {
                let delta = remaining / v.rate;
                if delta < min_delta {
                    min_delta = delta;
                }
            }
        }
        min_delta
    }
}

fn per_constraint_sum(system: &System, cid: usize) -> f64 {
    system
        .variables
        .iter()
        .filter(|v| v.active)
        .flat_map(|v| v.edges.iter().map(move |&(c, coeff)| (c, coeff, v.rate)))
        .filter(|&(c, _, _)| c == cid)
        .map(|(_, coeff, rate)| coeff * rate)
        .sum()
}

fn per_constraint_max(system: &System, cid: usize) -> f64 {
    system
        .variables
        .iter()
        .filter(|v| v.active)
        .flat_map(|v| v.edges.iter().map(move |&(c, coeff)| (c, coeff, v.rate)))
        .filter(|&(c, _, _)| c == cid)
        .map(|(_, coeff, rate)| coeff * rate)
        .fold(0.0, f64::max)
}

fn nonlinear_capacity(c: &Constraint, used: f64) -> f64 {
    let raw = match &c.nonlinear_cb {
        Some(cb) => cb(used.max(c.capacity)),
        None => c.capacity,
    };
    raw.max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_equal_variables_split_capacity() {
        let mut sys = System::new();
        let link = sys.add_constraint(100.0, SharingPolicy::Shared);
        let a = sys.add_variable(1.0, None);
        let b = sys.add_variable(1.0, None);
        sys.expand(a, link, 1.0);
        sys.expand(b, link, 1.0);

        sys.solve();
        assert!((sys.rate(a) - 50.0).abs() < 1e-6);
        assert!((sys.rate(b) - 50.0).abs() < 1e-6);
    }

    #[test]
    fn bound_caps_a_variable_below_its_fair_share() {
        let mut sys = System::new();
        let link = sys.add_constraint(100.0, SharingPolicy::Shared);
        let a = sys.add_variable(1.0, Some(10.0));
        let b = sys.add_variable(1.0, None);
        sys.expand(a, link, 1.0);
        sys.expand(b, link, 1.0);

        sys.solve();
        assert!((sys.rate(a) - 10.0).abs() < 1e-6);
        assert!((sys.rate(b) - 90.0).abs() < 1e-6);
    }

    #[test]
    fn fatpipe_is_not_shared() {
        let mut sys = System::new();
        let link = sys.add_constraint(100.0, SharingPolicy::FatPipe);
        let a = sys.add_variable(1.0, None);
        let b = sys.add_variable(1.0, None);
        sys.expand(a, link, 1.0);
        sys.expand(b, link, 1.0);

        sys.solve();
        assert!((sys.rate(a) - 100.0).abs() < 1e-6);
        assert!((sys.rate(b) - 100.0).abs() < 1e-6);
    }

    #[test]
    fn single_bottleneck_shared_by_three_unequal_paths() {
        // a only touches the bottleneck; b and c also touch their own
        // unconstrained link, so all three should converge to an equal
        // share of the bottleneck.
        let mut sys = System::new();
        let bottleneck = sys.add_constraint(90.0, SharingPolicy::Shared);
        let free = sys.add_constraint(1000.0, SharingPolicy::Shared);
        let a = sys.add_variable(1.0, None);
        let b = sys.add_variable(1.0, None);
        let c = sys.add_variable(1.0, None);
        sys.expand(a, bottleneck, 1.0);
        sys.expand(b, bottleneck, 1.0);
        sys.expand(b, free, 1.0);
        sys.expand(c, bottleneck, 1.0);
        sys.expand(c, free, 1.0);

        sys.solve();
        assert!((sys.rate(a) - 30.0).abs() < 1e-6);
        assert!((sys.rate(b) - 30.0).abs() < 1e-6);
        assert!((sys.rate(c) - 30.0).abs() < 1e-6);
    }

    #[test]
    fn no_starvation_when_unsaturated() {
        let mut sys = System::new();
        let link = sys.add_constraint(100.0, SharingPolicy::Shared);
        let a = sys.add_variable(1.0, None);
        sys.expand(a, link, 1.0);
        sys.solve();
        assert!(sys.rate(a) > 0.0);
    }

    #[test]
    fn nonlinear_negative_output_is_clamped() {
        let mut sys = System::new();
        let link = sys.add_constraint(100.0, SharingPolicy::NonLinear);
        sys.set_nonlinear_callback(link, |_used| -5.0);
        let a = sys.add_variable(1.0, None);
        sys.expand(a, link, 1.0);
        sys.solve();
        assert_eq!(sys.rate(a), 0.0);
    }

    #[test]
    fn removed_variable_does_not_compete() {
        let mut sys = System::new();
        let link = sys.add_constraint(100.0, SharingPolicy::Shared);
        let a = sys.add_variable(1.0, None);
        let b = sys.add_variable(1.0, None);
        sys.expand(a, link, 1.0);
        sys.expand(b, link, 1.0);
        sys.remove_variable(a);
        sys.solve();
        assert!((sys.rate(b) - 100.0).abs() < 1e-6);
    }
}
