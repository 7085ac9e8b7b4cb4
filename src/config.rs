//! Global numeric knobs for a simulation run, analogous to
//! `rustasim-dcsim`'s `SimConfig`: built once, handed to [`crate::Engine`]
//! at construction, and left immutable for the run's lifetime.

use crate::resource::ResourceSharing;

/// Tie-break rule the LMM solver uses when progressive filling saturates
/// more than one constraint in the same round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TieBreak {
    /// Lowest `ConstraintId` wins (this crate's default, and the only rule
    /// [`crate::lmm::System::solve`] currently implements).
    LowestId,
    /// Round-robin across rounds, starting from whichever constraint
    /// saturated last. Not yet implemented; reserved for a future solver
    /// pass that needs to avoid always favoring the same constraint under
    /// a tie.
    RoundRobin,
}

/// Simulation-wide parameters.
///
/// Mirrors `rustasim-dcsim::SimConfig`'s role (time limit, topology and
/// link defaults baked in once at setup) but sized for this kernel's
/// knobs instead of a fixed datacenter topology.
#[derive(Debug, Clone)]
pub struct SimulationConfig {
    /// Below this gap, two `Time` values are treated as equal (spec's
    /// `sg_precision_timing`, default `1e-9`, matching [`crate::lmm::PRECISION`]).
    pub precision_timing: f64,
    /// How the solver breaks ties between simultaneously-saturated
    /// constraints.
    pub tie_break: TieBreak,
    /// Sharing policy assumed for a link or cpu whose platform description
    /// does not name one explicitly.
    pub default_sharing: ResourceSharing,
    /// Wall-clock deadline past which `run_until_no_work` gives up instead
    /// of spinning forever on a stuck platform (`None` means no limit).
    pub wallclock_budget: Option<std::time::Duration>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        SimulationConfig {
            precision_timing: crate::lmm::PRECISION,
            tie_break: TieBreak::LowestId,
            default_sharing: ResourceSharing::Shared,
            wallclock_budget: None,
        }
    }
}

impl SimulationConfig {
    /// Starts a builder from this crate's defaults.
    pub fn builder() -> SimulationConfigBuilder {
        SimulationConfigBuilder::default()
    }
}

/// Builds a [`SimulationConfig`] one field at a time, in the style of
/// `rustasim-dcsim`'s builder-backed model objects (`ServerBuilder`,
/// `RouterBuilder`).
#[derive(Debug, Clone, Default)]
pub struct SimulationConfigBuilder {
    config: OptionalFields,
}

#[derive(Debug, Clone, Default)]
struct OptionalFields {
    precision_timing: Option<f64>,
    tie_break: Option<TieBreak>,
    default_sharing: Option<ResourceSharing>,
    wallclock_budget: Option<std::time::Duration>,
}

impl SimulationConfigBuilder {
    /// Overrides `sg_precision_timing`.
    pub fn precision_timing(mut self, value: f64) -> Self {
        self.config.precision_timing = Some(value);
        self
    }

    /// Overrides the LMM tie-break rule.
    pub fn tie_break(mut self, value: TieBreak) -> Self {
        self.config.tie_break = Some(value);
        self
    }

    /// Overrides the default sharing policy assumed for unannotated
    /// resources.
    pub fn default_sharing(mut self, value: ResourceSharing) -> Self {
        self.config.default_sharing = Some(value);
        self
    }

    /// Sets a wall-clock deadline for `run_until_no_work`.
    pub fn wallclock_budget(mut self, value: std::time::Duration) -> Self {
        self.config.wallclock_budget = Some(value);
        self
    }

    /// Finishes the builder, falling back to [`SimulationConfig::default`]
    /// for every field left unset.
    pub fn build(self) -> SimulationConfig {
        let defaults = SimulationConfig::default();
        SimulationConfig {
            precision_timing: self.config.precision_timing.unwrap_or(defaults.precision_timing),
            tie_break: self.config.tie_break.unwrap_or(defaults.tie_break),
            default_sharing: self.config.default_sharing.unwrap_or(defaults.default_sharing),
            wallclock_budget: self.config.wallclock_budget.or(defaults.wallclock_budget),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_overrides_only_named_fields() {
        let config = SimulationConfig::builder().precision_timing(1e-6).build();
        assert_eq!(config.precision_timing, 1e-6);
        assert_eq!(config.tie_break, TieBreak::LowestId);
    }

    #[test]
    fn default_matches_lmm_precision_constant() {
        let config = SimulationConfig::default();
        assert_eq!(config.precision_timing, crate::lmm::PRECISION);
    }
}
