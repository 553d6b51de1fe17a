//! The simulation driver: owns the landscape, rules, and targets, and
//! applies probabilistic transitions timestep by timestep.
use std::collections::{BTreeMap, HashSet};

use rand::RngCore;
use tracing::{debug, info};

use crate::engine::adjacency::AdjacencyCache;
use crate::engine::events::{EventSink, SimEvent, SimEventKind};
use crate::engine::growth::AREA_TOLERANCE;
use crate::engine::output::{AverageProbabilities, OutputOptions, TimestepOutput};
use crate::error::{Error, Result};
use crate::grid::{CellId, Landscape, StratumId, TransitionGroupId};
use crate::math;
use crate::random;
use crate::rules::{RuleSet, TargetPool};

/// Configuration for a simulation run.
#[non_exhaustive]
#[derive(Debug, Clone)]
pub struct SimulationConfig {
    /// First timestep of each iteration.
    pub min_timestep: i32,
    /// Last timestep of each iteration, inclusive.
    pub max_timestep: i32,
    /// Output buffers to maintain.
    pub output: OutputOptions,
}

impl SimulationConfig {
    pub fn new(min_timestep: i32, max_timestep: i32) -> Self {
        Self {
            min_timestep,
            max_timestep,
            output: OutputOptions::default(),
        }
    }

    pub fn with_output(mut self, output: OutputOptions) -> Self {
        self.output = output;
        self
    }

    /// Validates the configuration, returning an error if invalid.
    pub fn validate(&self) -> Result<()> {
        if self.min_timestep > self.max_timestep {
            return Err(Error::InvalidConfig(format!(
                "min_timestep {} exceeds max_timestep {}",
                self.min_timestep, self.max_timestep
            )));
        }
        if self.output.average_probability_frequency < 1 {
            return Err(Error::InvalidConfig(
                "average_probability_frequency must be >= 1".into(),
            ));
        }
        Ok(())
    }
}

/// A runnable simulation: one landscape, one rule set, one target pool.
///
/// Parallel iterations are achieved by independent `Simulation` values,
/// each with its own RNG; nothing here is shared mutable state.
pub struct Simulation {
    pub(crate) config: SimulationConfig,
    pub(crate) landscape: Landscape,
    pub(crate) rules: RuleSet,
    pub(crate) targets: TargetPool,
    pub(crate) adjacency: AdjacencyCache,
    pub(crate) averages: AverageProbabilities,
    pub(crate) group_order: Vec<TransitionGroupId>,
}

impl Simulation {
    /// Builds a simulation after validating the configuration and
    /// finalizing the rule set's derived indices.
    pub fn new(
        config: SimulationConfig,
        landscape: Landscape,
        mut rules: RuleSet,
        targets: TargetPool,
    ) -> Result<Self> {
        config.validate()?;
        rules.finalize();
        let group_order = rules.definitions.transition_group_ids();
        Ok(Self {
            config,
            landscape,
            rules,
            targets,
            adjacency: AdjacencyCache::new(),
            averages: AverageProbabilities::new(),
            group_order,
        })
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn landscape(&self) -> &Landscape {
        &self.landscape
    }

    pub fn landscape_mut(&mut self) -> &mut Landscape {
        &mut self.landscape
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    pub fn targets(&self) -> &TargetPool {
        &self.targets
    }

    pub fn targets_mut(&mut self) -> &mut TargetPool {
        &mut self.targets
    }

    pub fn averages(&self) -> &AverageProbabilities {
        &self.averages
    }

    pub(crate) fn adjacency(&self) -> &AdjacencyCache {
        &self.adjacency
    }

    /// Runs every timestep of one iteration. The transition group order
    /// is shuffled once per iteration.
    pub fn run_iteration(
        &mut self,
        iteration: i32,
        rng: &mut dyn RngCore,
        sink: &mut dyn EventSink,
    ) -> Vec<TimestepOutput> {
        info!(
            "iteration {}: timesteps {}..={}",
            iteration, self.config.min_timestep, self.config.max_timestep
        );

        let mut order = self.rules.definitions.transition_group_ids();
        random::shuffle(&mut order, rng);
        self.group_order = order;

        if sink.wants(SimEventKind::RunStarted) {
            sink.send(SimEvent::RunStarted {
                iteration,
                min_timestep: self.config.min_timestep,
                max_timestep: self.config.max_timestep,
            });
        }

        let mut outputs = Vec::new();
        for timestep in self.config.min_timestep..=self.config.max_timestep {
            outputs.push(self.run_timestep(iteration, timestep, rng, sink));
        }

        if sink.wants(SimEventKind::RunFinished) {
            sink.send(SimEvent::RunFinished { iteration });
        }

        outputs
    }

    /// Runs a single timestep and returns its output buffers.
    pub fn run_timestep(
        &mut self,
        iteration: i32,
        timestep: i32,
        rng: &mut dyn RngCore,
        sink: &mut dyn EventSink,
    ) -> TimestepOutput {
        if sink.wants(SimEventKind::TimestepStarted) {
            sink.send(SimEvent::TimestepStarted { iteration, timestep });
        }

        self.targets.reset_remaining();
        self.adjacency
            .refresh(&self.landscape, &self.rules, timestep, self.config.min_timestep);

        let mut output = TimestepOutput::allocate(
            &self.config.output,
            &self.rules,
            self.landscape.topology().n_cells(),
        );

        self.apply_probabilistic_transitions(iteration, timestep, &mut output, rng, sink);

        if self.config.output.average_probability {
            self.accumulate_average_probabilities(iteration, timestep);
            let frequency = self.config.output.average_probability_frequency;
            if (timestep - self.config.min_timestep) % frequency == 0
                || timestep == self.config.max_timestep
            {
                output.average_probabilities = Some(self.averages.averages());
            }
        }

        if sink.wants(SimEventKind::TimestepFinished) {
            sink.send(SimEvent::TimestepFinished {
                iteration,
                timestep,
                transitioned_cells: output.transitioned_cells,
            });
        }

        output
    }

    /// Applies the timestep's probabilistic transitions for every group.
    ///
    /// All stratum cell orders are shuffled before any group runs, so no
    /// group sees a positionally biased order. Groups without a size
    /// distribution or patch prioritization take the per-cell Bernoulli
    /// path; everything else goes through patch growth.
    fn apply_probabilistic_transitions(
        &mut self,
        iteration: i32,
        timestep: i32,
        output: &mut TimestepOutput,
        rng: &mut dyn RngCore,
        sink: &mut dyn EventSink,
    ) {
        self.landscape.shuffle_stratum_cells(rng);

        let order = self.group_order.clone();
        for group_id in order {
            let (is_inert, has_patch) = match self.rules.definitions.transition_group(group_id) {
                Some(group) => (
                    group.primary_transition_types.is_empty(),
                    group.patch_prioritization.is_some(),
                ),
                None => (true, false),
            };
            if is_inert {
                debug!("group {group_id}: no primary transition types; skipping");
                if sink.wants(SimEventKind::Warning) {
                    sink.send(SimEvent::Warning {
                        context: format!("group:{group_id}"),
                        message: "group has no primary transition types; skipping".into(),
                    });
                }
                continue;
            }

            self.reset_transition_target_multipliers(group_id, iteration, timestep);

            let has_size = self.rules.size_distributions.has_distribution(group_id);
            if !has_size && !has_patch {
                debug!("group {group_id}: per-cell transitions");
                for cell_id in self.landscape.cell_ids() {
                    self.apply_transitions_by_cell(
                        cell_id, iteration, timestep, group_id, output, rng, sink,
                    );
                }
            } else {
                debug!("group {group_id}: patch growth");
                let mut transitioned: HashSet<CellId> = HashSet::new();
                for stratum_id in self.landscape.stratum_ids() {
                    self.process_group_stratum(
                        stratum_id,
                        group_id,
                        iteration,
                        timestep,
                        &mut transitioned,
                        output,
                        rng,
                        sink,
                    );
                }
            }
        }
    }

    /// The degenerate path: an independent Bernoulli draw per cell, no
    /// frontier growth.
    #[allow(clippy::too_many_arguments)]
    fn apply_transitions_by_cell(
        &mut self,
        cell_id: CellId,
        iteration: i32,
        timestep: i32,
        group_id: TransitionGroupId,
        output: &mut TimestepOutput,
        rng: &mut dyn RngCore,
        sink: &mut dyn EventSink,
    ) {
        let probability = self.cell_probability(cell_id, group_id, iteration, timestep);
        if probability <= 0.0 {
            return;
        }

        let draw = random::rand01(rng);
        if draw >= probability {
            return;
        }

        let Some(pathway) =
            self.select_transition_pathway(cell_id, group_id, iteration, timestep, rng)
        else {
            return;
        };

        let transition_type_id = self.rules.pathways.pathway(pathway).transition_type_id;
        let exceeded = {
            let cell = self
                .landscape
                .cell(cell_id)
                .expect("cell ids come from the landscape");
            self.attribute_target_exceeded(cell, transition_type_id, iteration, timestep)
        };
        if exceeded {
            return;
        }

        self.commit_transition(
            cell_id, pathway, group_id, iteration, timestep, &mut None, output, sink,
        );
    }

    /// Runs the patch growth state machine for one (stratum, group).
    #[allow(clippy::too_many_arguments)]
    fn process_group_stratum(
        &mut self,
        stratum_id: StratumId,
        group_id: TransitionGroupId,
        iteration: i32,
        timestep: i32,
        transitioned: &mut HashSet<CellId>,
        output: &mut TimestepOutput,
        rng: &mut dyn RngCore,
        sink: &mut dyn EventSink,
    ) {
        let mut patches =
            self.fill_transition_patches(transitioned, stratum_id, group_id, iteration, timestep);

        let (mut initiation, expected_area, max_probability) =
            self.create_initiation_cells(transitioned, stratum_id, group_id, iteration, timestep);

        if expected_area <= 0.0 || max_probability <= 0.0 {
            return;
        }

        let amount_per_cell = self.landscape.amount_per_cell();
        let secondary_ids: Vec<Option<StratumId>> = std::iter::once(None)
            .chain(self.landscape.secondary_stratum_ids().map(Some))
            .collect();
        let tertiary_ids: Vec<Option<StratumId>> = std::iter::once(None)
            .chain(self.landscape.tertiary_stratum_ids().map(Some))
            .collect();
        let attribute_types = self
            .rules
            .transition_attributes
            .attribute_types_for_group(group_id);

        let group_has_target = self.targets.has_target(
            group_id,
            stratum_id,
            &secondary_ids,
            &tertiary_ids,
            &attribute_types,
            iteration,
            timestep,
        );
        let maximize_area_fidelity = self
            .rules
            .size_prioritizations
            .maximize_fidelity_to_total_area(group_id, stratum_id, iteration, timestep);

        // One Monte-Carlo stopping draw for the whole stratum/group pass.
        let stop_draw = random::rand01(rng);
        let mut expected = expected_area;

        while math::gt_eps(expected / amount_per_cell, stop_draw, AREA_TOLERANCE)
            && !initiation.is_empty()
        {
            let events = self.create_transition_event_list(
                stratum_id, group_id, iteration, timestep, expected, rng,
            );

            expected = self.generate_transition_events(
                events,
                transitioned,
                &mut initiation,
                &mut patches,
                stratum_id,
                group_id,
                iteration,
                timestep,
                max_probability,
                expected,
                output,
                rng,
                sink,
            );

            if !group_has_target {
                if !maximize_area_fidelity {
                    break;
                }
            } else if self.targets.attribute_targets_met(
                stratum_id,
                &secondary_ids,
                &tertiary_ids,
                &attribute_types,
                iteration,
                timestep,
            ) {
                break;
            }
        }
    }

    /// Recomputes the steering multiplier of every target registered for
    /// the group so that the group's expected area tracks the remaining
    /// target amount.
    fn reset_transition_target_multipliers(
        &mut self,
        group_id: TransitionGroupId,
        iteration: i32,
        timestep: i32,
    ) {
        let indices = self
            .targets
            .transition_target_indices_for_group(group_id)
            .to_vec();
        if indices.is_empty() {
            return;
        }

        for &index in &indices {
            self.targets.transition_target_at_mut(index).multiplier = 1.0;
        }

        let amount_per_cell = self.landscape.amount_per_cell();
        let mut updates = Vec::with_capacity(indices.len());
        for &index in &indices {
            let (scope_stratum, scope_secondary, scope_tertiary, remaining, disabled) = {
                let target = self.targets.transition_target_at(index);
                (
                    target.stratum_id,
                    target.secondary_stratum_id,
                    target.tertiary_stratum_id,
                    target.remaining,
                    target.disabled,
                )
            };
            if disabled {
                continue;
            }

            let mut expected = 0.0;
            for cell_id in self.landscape.cell_ids() {
                let in_scope = {
                    let cell = self
                        .landscape
                        .cell(cell_id)
                        .expect("cell ids come from the landscape");
                    scope_stratum.is_none_or(|s| s == cell.stratum_id)
                        && scope_secondary.is_none_or(|s| Some(s) == cell.secondary_stratum_id)
                        && scope_tertiary.is_none_or(|s| Some(s) == cell.tertiary_stratum_id)
                };
                if in_scope {
                    expected += self
                        .cell_probability_non_truncated(cell_id, group_id, iteration, timestep)
                        * amount_per_cell;
                }
            }

            let multiplier = if remaining <= 0.0 {
                0.0
            } else if expected > 0.0 {
                remaining / expected
            } else {
                1.0
            };
            updates.push((index, multiplier));
        }

        for (index, multiplier) in updates {
            self.targets.transition_target_at_mut(index).multiplier = multiplier;
        }
    }

    /// One timestep's truncated probabilities for every active group,
    /// folded into the running averages.
    fn accumulate_average_probabilities(&mut self, iteration: i32, timestep: i32) {
        let n_cells = self.landscape.topology().n_cells();
        let group_ids: Vec<TransitionGroupId> = self
            .rules
            .definitions
            .transition_groups()
            .filter(|g| !g.primary_transition_types.is_empty())
            .map(|g| g.id)
            .collect();

        let mut per_group = BTreeMap::new();
        for group_id in group_ids {
            let mut values = vec![0.0; n_cells];
            for cell_id in self.landscape.cell_ids() {
                values[cell_id] = self.cell_probability(cell_id, group_id, iteration, timestep);
            }
            per_group.insert(group_id, values);
        }
        self.averages.accumulate(per_group);
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;
    use crate::engine::events::VecSink;
    use crate::grid::{Cell, GridTopology};
    use crate::rules::{
        AutocorrelationSpread, Definitions, PathwayAutocorrelation, TargetPrioritization,
        TransitionGroup, TransitionPathway, TransitionSizeDistribution, TransitionTarget,
        TransitionType,
    };

    const GROUP: TransitionGroupId = 10;
    const TYPE: i32 = 1;

    fn definitions() -> Definitions {
        let mut defs = Definitions::new();
        defs.add_transition_type(TransitionType::new(TYPE, "disturbance"));
        defs.add_transition_group(TransitionGroup::new(GROUP, "disturbance-group"));
        defs.add_group_membership(TYPE, GROUP, true);
        defs
    }

    fn rules_with_probability(probability: f64) -> RuleSet {
        let mut rules = RuleSet::new(definitions());
        rules
            .pathways
            .add(TransitionPathway::new(100, TYPE, probability).with_destination(Some(200)));
        rules
    }

    /// A landscape where every cell starts in state class 100 and the
    /// stratum is chosen per cell id.
    fn landscape_with(
        rows: usize,
        cols: usize,
        rules: &RuleSet,
        stratum_of: impl Fn(CellId) -> StratumId,
    ) -> Landscape {
        let mut landscape = Landscape::new(GridTopology::new(rows, cols, 1.0), 1.0);
        for id in 0..rows * cols {
            let mut cell = Cell::new(id, stratum_of(id), 100);
            rules.pathways.fill_cell_transitions(&mut cell);
            landscape.insert_cell(cell);
        }
        landscape
    }

    fn whole_landscape_bin(rules: &mut RuleSet, size: f64) {
        rules.size_distributions.add(
            GROUP,
            None,
            None,
            None,
            TransitionSizeDistribution::new(size, size, 1.0).unwrap(),
        );
    }

    fn transitioned_cells(sink: &VecSink) -> Vec<(CellId, StratumId)> {
        sink.as_slice()
            .iter()
            .filter_map(|e| match e {
                SimEvent::CellTransitioned {
                    cell_id, stratum_id, ..
                } => Some((*cell_id, *stratum_id)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn config_validation_rejects_inverted_timesteps() {
        assert!(SimulationConfig::new(5, 1).validate().is_err());
        assert!(SimulationConfig::new(1, 5).validate().is_ok());
    }

    #[test]
    fn fixed_seed_runs_are_identical() {
        let run = |seed: u64| -> Vec<(CellId, StratumId)> {
            let mut rules = rules_with_probability(0.4);
            whole_landscape_bin(&mut rules, 3.0);
            let landscape = landscape_with(6, 6, &rules, |_| 1);
            let mut sim = Simulation::new(
                SimulationConfig::new(1, 5),
                landscape,
                rules,
                TargetPool::new(),
            )
            .unwrap();
            let mut rng = StdRng::seed_from_u64(seed);
            let mut sink = VecSink::new();
            sim.run_iteration(1, &mut rng, &mut sink);
            transitioned_cells(&sink)
        };

        let a = run(1234);
        let b = run(1234);
        assert_eq!(a, b);
        assert!(!a.is_empty());

        let c = run(99);
        assert_ne!(a, c);
    }

    #[test]
    fn group_without_size_distribution_or_patches_is_bernoulli() {
        let rules = rules_with_probability(1.0);
        let landscape = landscape_with(4, 4, &rules, |_| 1);
        let mut sim = Simulation::new(
            SimulationConfig::new(1, 1),
            landscape,
            rules,
            TargetPool::new(),
        )
        .unwrap();

        let mut rng = StdRng::seed_from_u64(7);
        let mut sink = VecSink::new();
        let outputs = sim.run_iteration(1, &mut rng, &mut sink);

        // Probability 1.0: every cell transitions independently.
        assert_eq!(outputs[0].transitioned_cells, 16);
        // No frontier growth occurs on this path.
        assert!(sink
            .as_slice()
            .iter()
            .all(|e| !matches!(e, SimEvent::PatchGrown { .. })));
        // All cells moved to the destination state and have no options
        // left.
        assert!(sim
            .landscape()
            .cells()
            .all(|c| c.state_class_id == 200 && c.transitions.is_empty()));
    }

    #[test]
    fn committed_area_stays_within_expected_area() {
        let mut rules = rules_with_probability(0.5);
        whole_landscape_bin(&mut rules, 4.0);
        let landscape = landscape_with(6, 6, &rules, |_| 1);
        let mut sim = Simulation::new(
            SimulationConfig::new(1, 1),
            landscape,
            rules,
            TargetPool::new(),
        )
        .unwrap();

        // Expected area before the run: 36 cells x 0.5 x 1.0 area.
        let expected: f64 = (0..36)
            .map(|id| sim.cell_probability_non_truncated(id, GROUP, 1, 1))
            .sum();
        assert!((expected - 18.0).abs() < 1e-9);

        let mut rng = StdRng::seed_from_u64(11);
        let mut sink = VecSink::new();
        let outputs = sim.run_iteration(1, &mut rng, &mut sink);

        let committed = outputs[0].transitioned_cells as f64;
        assert!(
            committed <= expected + 1.0,
            "committed {committed} exceeds expected {expected} by more than one cell"
        );
    }

    #[test]
    fn grown_patches_are_contiguous() {
        let mut rules = rules_with_probability(1.0);
        // One event the size of a quarter of the landscape.
        whole_landscape_bin(&mut rules, 16.0);
        let landscape = landscape_with(8, 8, &rules, |_| 1);
        let mut sim = Simulation::new(
            SimulationConfig::new(1, 1),
            landscape,
            rules,
            TargetPool::new(),
        )
        .unwrap();

        let mut rng = StdRng::seed_from_u64(5);
        let mut sink = VecSink::new();
        sim.run_iteration(1, &mut rng, &mut sink);

        // Reconstruct patch membership: each PatchGrown closes the run of
        // CellTransitioned events since the previous one.
        let mut patches: Vec<Vec<CellId>> = Vec::new();
        let mut current: Vec<CellId> = Vec::new();
        for event in sink.as_slice() {
            match event {
                SimEvent::CellTransitioned { cell_id, .. } => current.push(*cell_id),
                SimEvent::PatchGrown { cells, .. } => {
                    assert_eq!(current.len(), *cells);
                    patches.push(std::mem::take(&mut current));
                }
                _ => {}
            }
        }
        assert!(!patches.is_empty());

        // Every patch with at least two cells must be 8-connected.
        let topology = GridTopology::new(8, 8, 1.0);
        for patch in patches.iter().filter(|p| p.len() > 1) {
            let members: std::collections::BTreeSet<CellId> = patch.iter().copied().collect();
            let mut reached = std::collections::BTreeSet::from([patch[0]]);
            let mut queue = vec![patch[0]];
            while let Some(id) = queue.pop() {
                for direction in crate::grid::CompassDirection::ALL {
                    if let Some(n) = topology.neighbor(id, direction) {
                        if members.contains(&n) && reached.insert(n) {
                            queue.push(n);
                        }
                    }
                }
            }
            assert_eq!(reached.len(), members.len(), "patch {patch:?} is split");
        }
    }

    #[test]
    fn same_primary_stratum_autocorrelation_rejects_foreign_cells() {
        let run = |with_autocorrelation: bool| -> Vec<(CellId, StratumId)> {
            let mut rules = rules_with_probability(1.0);
            whole_landscape_bin(&mut rules, 4.0);
            if with_autocorrelation {
                rules
                    .autocorrelation
                    .add(
                        GROUP,
                        None,
                        None,
                        None,
                        None,
                        None,
                        PathwayAutocorrelation::new(
                            false,
                            AutocorrelationSpread::ToSamePrimaryStratum,
                        ),
                    )
                    .unwrap();
            }
            // Only stratum 1 cells may initiate; stratum 2 can only be
            // reached by growth.
            rules
                .spatial_initiation_multipliers
                .add(
                    GROUP,
                    None,
                    None,
                    vec![1.0, 1.0, 1.0, 1.0, 0.0, 0.0, 0.0, 0.0],
                )
                .unwrap();

            let landscape = landscape_with(1, 8, &rules, |id| if id < 4 { 1 } else { 2 });
            let mut sim = Simulation::new(
                SimulationConfig::new(1, 1),
                landscape,
                rules,
                TargetPool::new(),
            )
            .unwrap();

            let mut rng = StdRng::seed_from_u64(42);
            let mut sink = VecSink::new();
            sim.run_iteration(1, &mut rng, &mut sink);
            transitioned_cells(&sink)
        };

        let constrained = run(true);
        assert!(!constrained.is_empty());
        for (cell_id, stratum_id) in &constrained {
            assert_eq!(*stratum_id, 1, "cell {cell_id} is outside stratum 1");
            assert!(*cell_id < 4);
        }
    }

    #[test]
    fn probability_override_zero_blocks_all_transitions() {
        let rules = rules_with_probability(1.0);
        let mut targets = TargetPool::new();
        targets
            .add_transition_target(
                TransitionTarget::new(GROUP, 100.0)
                    .with_prioritization(TargetPrioritization::probability_override(0.0).unwrap()),
                None,
                None,
            )
            .unwrap();

        let landscape = landscape_with(3, 3, &rules, |_| 1);
        let mut sim =
            Simulation::new(SimulationConfig::new(1, 2), landscape, rules, targets).unwrap();

        let mut rng = StdRng::seed_from_u64(3);
        let mut sink = VecSink::new();
        let outputs = sim.run_iteration(1, &mut rng, &mut sink);
        assert!(outputs.iter().all(|o| o.transitioned_cells == 0));
    }

    #[test]
    fn probability_override_one_forces_certain_transition() {
        let rules = rules_with_probability(0.05);
        let mut targets = TargetPool::new();
        targets
            .add_transition_target(
                TransitionTarget::new(GROUP, 100.0)
                    .with_prioritization(TargetPrioritization::probability_override(1.0).unwrap()),
                None,
                None,
            )
            .unwrap();

        let landscape = landscape_with(3, 3, &rules, |_| 1);
        let mut sim =
            Simulation::new(SimulationConfig::new(1, 1), landscape, rules, targets).unwrap();

        assert_eq!(sim.cell_probability(0, GROUP, 1, 1), 1.0);

        let mut rng = StdRng::seed_from_u64(3);
        let mut sink = VecSink::new();
        let outputs = sim.run_iteration(1, &mut rng, &mut sink);
        assert_eq!(outputs[0].transitioned_cells, 9);
    }

    #[test]
    fn non_truncated_probability_exceeds_one_but_decisions_clamp() {
        let mut rules = RuleSet::new(definitions());
        rules
            .pathways
            .add(TransitionPathway::new(100, TYPE, 0.8).with_destination(Some(200)));
        rules
            .pathways
            .add(TransitionPathway::new(100, TYPE, 0.6).with_destination(Some(200)));
        let landscape = landscape_with(1, 1, &rules, |_| 1);
        let sim = Simulation::new(
            SimulationConfig::new(1, 1),
            landscape,
            rules,
            TargetPool::new(),
        )
        .unwrap();

        let unclamped = sim.cell_probability_non_truncated(0, GROUP, 1, 1);
        assert!((unclamped - 1.4).abs() < 1e-12);
        assert_eq!(sim.cell_probability(0, GROUP, 1, 1), 1.0);
    }

    #[test]
    fn transition_target_steers_committed_area() {
        let mut rules = rules_with_probability(1.0);
        whole_landscape_bin(&mut rules, 1.0);
        let mut targets = TargetPool::new();
        targets
            .add_transition_target(TransitionTarget::new(GROUP, 3.0), None, None)
            .unwrap();

        let landscape = landscape_with(5, 5, &rules, |_| 1);
        let mut sim =
            Simulation::new(SimulationConfig::new(1, 1), landscape, rules, targets).unwrap();

        let mut rng = StdRng::seed_from_u64(17);
        let mut sink = VecSink::new();
        let outputs = sim.run_iteration(1, &mut rng, &mut sink);

        // The steering multiplier scales 25 cells of probability 1.0 down
        // to an expected area of 3; commitments stay within a cell of it.
        let committed = outputs[0].transitioned_cells;
        assert!(
            (1..=4).contains(&committed),
            "committed {committed}, wanted about 3"
        );
    }

    #[test]
    fn run_emits_lifecycle_events_in_order() {
        let rules = rules_with_probability(0.0);
        let landscape = landscape_with(2, 2, &rules, |_| 1);
        let mut sim = Simulation::new(
            SimulationConfig::new(1, 2),
            landscape,
            rules,
            TargetPool::new(),
        )
        .unwrap();

        let mut rng = StdRng::seed_from_u64(1);
        let mut sink = VecSink::new();
        sim.run_iteration(4, &mut rng, &mut sink);

        let kinds: Vec<SimEventKind> = sink.as_slice().iter().map(|e| e.kind()).collect();
        assert_eq!(
            kinds,
            vec![
                SimEventKind::RunStarted,
                SimEventKind::TimestepStarted,
                SimEventKind::TimestepFinished,
                SimEventKind::TimestepStarted,
                SimEventKind::TimestepFinished,
                SimEventKind::RunFinished,
            ]
        );
    }

    #[test]
    fn average_probabilities_accumulate_when_enabled() {
        let rules = rules_with_probability(0.25);
        let landscape = landscape_with(2, 2, &rules, |_| 1);
        let config = SimulationConfig::new(1, 2).with_output(OutputOptions {
            average_probability: true,
            ..OutputOptions::default()
        });
        let mut sim = Simulation::new(config, landscape, rules, TargetPool::new()).unwrap();

        let mut rng = StdRng::seed_from_u64(1);
        let outputs = sim.run_iteration(1, &mut rng, &mut ());
        assert_eq!(sim.averages().timesteps(), 2);
        let snapshot = outputs[1].average_probabilities.as_ref().unwrap();
        let values = snapshot.get(&GROUP).unwrap();
        // Untransitioned cells keep probability 0.25 across timesteps.
        assert!(values.iter().all(|v| (0.0..=0.25).contains(v)));
    }

    #[test]
    fn transitioned_pixels_record_map_ids() {
        let rules = rules_with_probability(1.0);
        let landscape = landscape_with(2, 2, &rules, |_| 1);
        let config = SimulationConfig::new(1, 1).with_output(OutputOptions {
            raster_transitions: true,
            ..OutputOptions::default()
        });
        let mut sim = Simulation::new(config, landscape, rules, TargetPool::new()).unwrap();

        let mut rng = StdRng::seed_from_u64(1);
        let outputs = sim.run_iteration(1, &mut rng, &mut ());
        let pixels = outputs[0].transitioned_pixels.get(&GROUP).unwrap();
        assert!(pixels.iter().all(|p| *p == TYPE));
    }
}
