//! The spatial patch growth algorithm.
//!
//! Per (stratum, group, timestep) the engine accumulates expected area,
//! batches transition events with sizes drawn from the configured
//! distribution, selects initiation cells, and grows each patch outward
//! through a likelihood-ordered frontier until the event target, the
//! group's expected area, or its targets are satisfied.
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};

use rand::RngCore;

use crate::engine::events::{EventSink, SimEvent, SimEventKind};
use crate::engine::output::TimestepOutput;
use crate::engine::runner::Simulation;
use crate::grid::topology::CompassDirection;
use crate::grid::{CellId, StratumId, TransitionGroupId};
use crate::math;
use crate::random;
use crate::rules::{AutocorrelationSpread, PatchPrioritizationKind, PatchSet, SizePrioritization};

/// Tolerance for the Monte-Carlo stopping comparisons.
pub(crate) const AREA_TOLERANCE: f64 = 0.000001;

/// Frontier expansion order: orthogonal neighbors before diagonals.
const GROW_DIRECTIONS: [CompassDirection; 8] = [
    CompassDirection::North,
    CompassDirection::East,
    CompassDirection::South,
    CompassDirection::West,
    CompassDirection::Northeast,
    CompassDirection::Southeast,
    CompassDirection::Southwest,
    CompassDirection::Northwest,
];

/// One intended patch with a target area, consumed as patches are grown
/// or pruned.
#[derive(Debug, Clone, Copy)]
pub struct TransitionEvent {
    pub target_amount: f64,
}

/// A target patch size drawn from the size distribution.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SizeDraw {
    pub minimum: f64,
    pub maximum: f64,
    pub target: f64,
}

/// A frontier candidate awaiting expansion.
#[derive(Debug, Clone, Copy)]
struct FrontierRecord {
    cell_id: CellId,
    travel_time: f64,
    likelihood: f64,
    seq: u64,
}

impl PartialEq for FrontierRecord {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for FrontierRecord {}

impl PartialOrd for FrontierRecord {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FrontierRecord {
    /// Highest likelihood first; ties broken by lower travel time, then
    /// insertion order.
    fn cmp(&self, other: &Self) -> Ordering {
        self.likelihood
            .total_cmp(&other.likelihood)
            .then_with(|| other.travel_time.total_cmp(&self.travel_time))
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Likelihood-ordered frontier of grow candidates, scoped to one patch.
#[derive(Debug, Default)]
pub(crate) struct Frontier {
    heap: BinaryHeap<FrontierRecord>,
    next_seq: u64,
}

impl Frontier {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, cell_id: CellId, travel_time: f64, likelihood: f64) {
        self.heap.push(FrontierRecord {
            cell_id,
            travel_time,
            likelihood,
            seq: self.next_seq,
        });
        self.next_seq += 1;
    }

    fn pop(&mut self) -> Option<(CellId, f64)> {
        self.heap.pop().map(|r| (r.cell_id, r.travel_time))
    }

    pub(crate) fn len(&self) -> usize {
        self.heap.len()
    }
}

/// Initiation candidates: constant-time membership plus uniform random
/// index draws.
#[derive(Debug, Default)]
pub(crate) struct IndexedCellSet {
    ids: Vec<CellId>,
    positions: HashMap<CellId, usize>,
}

impl IndexedCellSet {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&mut self, id: CellId) {
        if self.positions.contains_key(&id) {
            return;
        }
        self.positions.insert(id, self.ids.len());
        self.ids.push(id);
    }

    pub(crate) fn remove(&mut self, id: CellId) {
        if let Some(pos) = self.positions.remove(&id) {
            self.ids.swap_remove(pos);
            if pos < self.ids.len() {
                self.positions.insert(self.ids[pos], pos);
            }
        }
    }

    pub(crate) fn at(&self, index: usize) -> CellId {
        self.ids[index]
    }

    pub(crate) fn len(&self) -> usize {
        self.ids.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub(crate) fn clear(&mut self) {
        self.ids.clear();
        self.positions.clear();
    }
}

/// Removes the pending event whose target size is nearest to the grown
/// amount, keeping the realized size distribution faithful despite the
/// shortfall. Ties go to the later event.
pub(crate) fn remove_nearest_sized_event(events: &mut Vec<TransitionEvent>, grown_amount: f64) {
    if events.is_empty() {
        return;
    }
    let mut remove_at = 0;
    let mut best = f64::MAX;
    for (index, event) in events.iter().enumerate() {
        let difference = (grown_amount - event.target_amount).abs();
        if difference <= best {
            remove_at = index;
            best = difference;
        }
    }
    events.remove(remove_at);
}

impl Simulation {
    /// Builds the initiation candidate set for a (stratum, group) and
    /// returns it with the group's expected area and the maximum
    /// initiation-adjusted cell probability (clamped to 1.0).
    ///
    /// Expected area accumulates the **non-truncated** probability so that
    /// over-100% cells contribute their true expected area; the clamp is
    /// applied only to the tracked maximum used for rejection sampling.
    pub(crate) fn create_initiation_cells(
        &self,
        transitioned: &HashSet<CellId>,
        stratum_id: StratumId,
        group_id: TransitionGroupId,
        iteration: i32,
        timestep: i32,
    ) -> (IndexedCellSet, f64, f64) {
        let amount_per_cell = self.landscape.amount_per_cell();
        let mut cells = IndexedCellSet::new();
        let mut expected_area = 0.0;
        let mut max_probability = 0.0;

        for &cell_id in self.landscape.stratum_cell_ids(stratum_id) {
            if transitioned.contains(&cell_id) {
                continue;
            }
            let mut probability =
                self.cell_probability_non_truncated(cell_id, group_id, iteration, timestep);
            expected_area += probability * amount_per_cell;

            // The initiation multiplier weighs candidate selection but
            // never the expected area.
            probability *= self.rules.spatial_initiation_multipliers.get(
                cell_id,
                group_id,
                iteration,
                timestep,
            );
            if probability > max_probability {
                max_probability = probability.min(1.0);
            }
            if probability > 0.0 {
                cells.insert(cell_id);
            }
        }

        (cells, expected_area, max_probability)
    }

    /// Draws an initiation cell by rejection sampling weighted by
    /// probability. The acceptance threshold rises with the number of
    /// cells checked, guaranteeing termination as candidates are
    /// exhausted. The selected cell is removed from the candidate set.
    pub(crate) fn select_initiation_cell(
        &self,
        cells: &mut IndexedCellSet,
        group_id: TransitionGroupId,
        iteration: i32,
        timestep: i32,
        max_probability: f64,
        rng: &mut dyn RngCore,
    ) -> Option<CellId> {
        debug_assert!(max_probability > 0.0);
        if cells.is_empty() {
            return None;
        }

        let mut checked = 0usize;
        loop {
            checked += 1;
            let candidate = cells.at(random::rand_index(rng, cells.len()));

            let mut probability = self.cell_probability(candidate, group_id, iteration, timestep);
            probability *= self.rules.spatial_initiation_multipliers.get(
                candidate,
                group_id,
                iteration,
                timestep,
            );
            probability /= max_probability;

            let floor = checked as f64 / cells.len() as f64;
            if probability < floor {
                probability = floor;
            }

            let draw = random::rand01(rng);
            if !math::gt_eps(draw, probability, AREA_TOLERANCE) {
                cells.remove(candidate);
                return Some(candidate);
            }
        }
    }

    /// Builds a batch of transition events whose target sizes
    /// stochastically exhaust the remaining expected area, then orders the
    /// batch per the configured size prioritization.
    pub(crate) fn create_transition_event_list(
        &self,
        stratum_id: StratumId,
        group_id: TransitionGroupId,
        iteration: i32,
        timestep: i32,
        expected_area: f64,
        rng: &mut dyn RngCore,
    ) -> Vec<TransitionEvent> {
        debug_assert!(expected_area > 0.0);
        let amount_per_cell = self.landscape.amount_per_cell();
        let mut accumulated = 0.0;
        let mut events = Vec::new();

        while math::gt_eps(expected_area, accumulated, AREA_TOLERANCE) {
            let difference = expected_area - accumulated;

            // A final partial-cell increment is taken or dropped by a
            // Bernoulli draw.
            if amount_per_cell > difference {
                let draw = random::rand01(rng);
                if draw > difference / amount_per_cell {
                    break;
                }
            }

            let draw = self.target_size_class(
                stratum_id,
                group_id,
                iteration,
                timestep,
                difference,
                rng,
            );

            debug_assert!(draw.minimum >= 0.0 && draw.minimum <= draw.maximum);
            debug_assert!(draw.target >= draw.minimum && draw.target <= draw.maximum);

            events.push(TransitionEvent {
                target_amount: draw.target,
            });
            accumulated += draw.target;
        }

        self.sort_transition_event_list(stratum_id, group_id, iteration, timestep, &mut events, rng);
        events
    }

    /// Samples a size-class bin by cumulative proportion, then a target
    /// size uniformly within the bin, clamped so a bin cannot exceed the
    /// remaining expected area. Without a distribution, events are one
    /// cell each.
    pub(crate) fn target_size_class(
        &self,
        stratum_id: StratumId,
        group_id: TransitionGroupId,
        iteration: i32,
        timestep: i32,
        area_difference: f64,
        rng: &mut dyn RngCore,
    ) -> SizeDraw {
        let amount_per_cell = self.landscape.amount_per_cell();
        let bin_draw = random::rand01(rng);

        let Some(bins) =
            self.rules
                .size_distributions
                .get(group_id, stratum_id, iteration, timestep)
        else {
            return SizeDraw {
                minimum: amount_per_cell,
                maximum: amount_per_cell,
                target: amount_per_cell,
            };
        };

        let total: f64 = bins.iter().map(|b| b.proportion).sum();
        let mut minimum = amount_per_cell;
        let mut maximum = area_difference;
        let mut cumulative = 0.0;
        for bin in bins {
            cumulative += bin.proportion / total;
            if cumulative >= bin_draw {
                minimum = bin.minimum_size;
                maximum = bin.maximum_size;
                break;
            }
        }

        if maximum > area_difference {
            maximum = area_difference;
            minimum = area_difference;
        }
        if minimum > maximum {
            minimum = maximum;
        }

        let size_draw = random::rand01(rng);
        SizeDraw {
            minimum,
            maximum,
            target: (maximum - minimum) * size_draw + minimum,
        }
    }

    /// Orders an event batch: shuffled without a policy, else ascending or
    /// descending by target size.
    pub(crate) fn sort_transition_event_list(
        &self,
        stratum_id: StratumId,
        group_id: TransitionGroupId,
        iteration: i32,
        timestep: i32,
        events: &mut Vec<TransitionEvent>,
        rng: &mut dyn RngCore,
    ) {
        let prioritization = self
            .rules
            .size_prioritizations
            .get(group_id, stratum_id, iteration, timestep)
            .map(|p| p.prioritization);

        match prioritization {
            None | Some(SizePrioritization::None) => random::shuffle(events, rng),
            Some(SizePrioritization::Smallest) => {
                events.sort_by(|a, b| a.target_amount.total_cmp(&b.target_amount));
            }
            Some(SizePrioritization::Largest) => {
                events.sort_by(|a, b| b.target_amount.total_cmp(&a.target_amount));
            }
        }
    }

    /// Consumes an event batch: selects an initiation cell per event and
    /// grows a patch from it. Returns the remaining expected area.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn generate_transition_events(
        &mut self,
        mut events: Vec<TransitionEvent>,
        transitioned: &mut HashSet<CellId>,
        initiation: &mut IndexedCellSet,
        patches: &mut Option<PatchSet>,
        stratum_id: StratumId,
        group_id: TransitionGroupId,
        iteration: i32,
        timestep: i32,
        max_probability: f64,
        mut expected_area: f64,
        output: &mut TimestepOutput,
        rng: &mut dyn RngCore,
        sink: &mut dyn EventSink,
    ) -> f64 {
        debug_assert!(max_probability > 0.0);
        let patch_kind = self
            .rules
            .definitions
            .transition_group(group_id)
            .and_then(|g| g.patch_prioritization);

        while !events.is_empty() && !initiation.is_empty() && expected_area > 0.0 {
            let initiation_cell = match patch_kind {
                Some(kind) => {
                    let taken = match patches.as_mut() {
                        Some(p) => p.take_initiation_cell(kind, self.landscape.topology(), rng),
                        None => None,
                    };
                    let Some(cell) = taken else {
                        // No patches left; nothing can initiate.
                        initiation.clear();
                        break;
                    };
                    cell
                }
                None => {
                    match self.select_initiation_cell(
                        initiation,
                        group_id,
                        iteration,
                        timestep,
                        max_probability,
                        rng,
                    ) {
                        Some(cell) => cell,
                        None => break,
                    }
                }
            };

            let probability = self.cell_probability(initiation_cell, group_id, iteration, timestep);
            if probability > 0.0 {
                expected_area = self.grow_transition_event(
                    &mut events,
                    transitioned,
                    initiation,
                    patches,
                    initiation_cell,
                    stratum_id,
                    group_id,
                    iteration,
                    timestep,
                    expected_area,
                    output,
                    rng,
                    sink,
                );
            }
        }

        expected_area
    }

    /// Grows one patch outward from the initiation cell. Returns the
    /// remaining expected area after subtracting the grown amount.
    #[allow(clippy::too_many_arguments)]
    fn grow_transition_event(
        &mut self,
        events: &mut Vec<TransitionEvent>,
        transitioned: &mut HashSet<CellId>,
        initiation: &mut IndexedCellSet,
        patches: &mut Option<PatchSet>,
        initiation_cell: CellId,
        stratum_id: StratumId,
        group_id: TransitionGroupId,
        iteration: i32,
        timestep: i32,
        expected_area: f64,
        output: &mut TimestepOutput,
        rng: &mut dyn RngCore,
        sink: &mut dyn EventSink,
    ) -> f64 {
        let event = events[0];
        let amount_per_cell = self.landscape.amount_per_cell();
        let mut total_grown = 0.0;
        let mut grown_cells = 0usize;

        let mut frontier = Frontier::new();
        let mut seen: HashSet<CellId> = HashSet::new();
        // Pathways already committed within this patch, by cell.
        let mut committed: HashMap<CellId, usize> = HashMap::new();

        frontier.push(initiation_cell, 0.0, 1.0);
        seen.insert(initiation_cell);

        while let Some((cell_id, travel_time)) = frontier.pop() {
            if total_grown > expected_area {
                break;
            }

            let (cell_stratum, cell_secondary, cell_tertiary) = {
                let cell = self
                    .landscape
                    .cell(cell_id)
                    .expect("frontier holds instantiated cells");
                (
                    cell.stratum_id,
                    cell.secondary_stratum_id,
                    cell.tertiary_stratum_id,
                )
            };

            let autocorrelation = self
                .rules
                .autocorrelation
                .get(
                    group_id,
                    cell_stratum,
                    cell_secondary,
                    cell_tertiary,
                    iteration,
                    timestep,
                )
                .copied();

            let mut pathway: Option<usize> = None;
            if let Some(setting) = autocorrelation {
                let init = self
                    .landscape
                    .cell(initiation_cell)
                    .expect("initiation cell exists");
                let rejected = match setting.spread_to {
                    AutocorrelationSpread::ToSamePrimaryStratum => cell_stratum != init.stratum_id,
                    AutocorrelationSpread::ToSameSecondaryStratum => {
                        cell_secondary != init.secondary_stratum_id
                    }
                    AutocorrelationSpread::ToSameTertiaryStratum => {
                        cell_tertiary != init.tertiary_stratum_id
                    }
                    _ => false,
                };
                if rejected {
                    continue;
                }

                // Reuse a neighbor's committed pathway when this cell
                // offers the same one.
                for neighbor in self.landscape.neighbors(cell_id) {
                    if let Some(&neighbor_pathway) = committed.get(&neighbor) {
                        let offers = self
                            .landscape
                            .cell(cell_id)
                            .is_some_and(|c| c.option_for_pathway(neighbor_pathway).is_some());
                        if offers {
                            pathway = Some(neighbor_pathway);
                            break;
                        }
                    }
                }
            }

            let pathway = match pathway {
                None => {
                    if let Some(setting) = autocorrelation {
                        if setting.spread_to == AutocorrelationSpread::ToSamePathway
                            && !committed.is_empty()
                        {
                            continue;
                        }
                    }
                    self.select_transition_pathway(cell_id, group_id, iteration, timestep, rng)
                }
                Some(reused) => {
                    let keep = autocorrelation.map(|s| s.autocorrelation).unwrap_or(false);
                    if keep {
                        Some(reused)
                    } else {
                        self.select_transition_pathway(cell_id, group_id, iteration, timestep, rng)
                    }
                }
            };

            let Some(pathway) = pathway else {
                continue;
            };

            let transition_type_id = self.rules.pathways.pathway(pathway).transition_type_id;
            let exceeded = {
                let cell = self
                    .landscape
                    .cell(cell_id)
                    .expect("frontier holds instantiated cells");
                self.attribute_target_exceeded(cell, transition_type_id, iteration, timestep)
            };
            if exceeded {
                initiation.remove(cell_id);
                continue;
            }

            self.commit_transition(cell_id, pathway, group_id, iteration, timestep, patches, output, sink);
            committed.insert(cell_id, pathway);
            transitioned.insert(cell_id);
            initiation.remove(cell_id);
            grown_cells += 1;
            total_grown += amount_per_cell;

            if total_grown >= event.target_amount - 0.5 * amount_per_cell
                || total_grown >= expected_area
            {
                break;
            }

            self.add_grow_event_records(
                &mut frontier,
                transitioned,
                &mut seen,
                patches,
                cell_id,
                group_id,
                iteration,
                timestep,
                travel_time,
            );
        }

        if sink.wants(SimEventKind::PatchGrown) {
            sink.send(SimEvent::PatchGrown {
                transition_group_id: group_id,
                stratum_id,
                iteration,
                timestep,
                initiation_cell,
                cells: grown_cells,
                target_amount: event.target_amount,
                grown_amount: total_grown,
            });
        }

        let maximize_fidelity = self
            .rules
            .size_prioritizations
            .get(group_id, stratum_id, iteration, timestep)
            .map(|p| p.maximize_fidelity_to_distribution)
            .unwrap_or(true);

        if !maximize_fidelity || total_grown >= event.target_amount {
            events.remove(0);
        } else {
            remove_nearest_sized_event(events, total_grown);
        }

        (expected_area - total_grown).max(0.0)
    }

    /// Enqueues the untransitioned, unseen neighbors of a just-committed
    /// cell, gated by probability, slope/direction rate, and (for
    /// edges-only prioritizations) the serviced patch's edge cells.
    #[allow(clippy::too_many_arguments)]
    fn add_grow_event_records(
        &self,
        frontier: &mut Frontier,
        transitioned: &HashSet<CellId>,
        seen: &mut HashSet<CellId>,
        patches: &Option<PatchSet>,
        from_cell: CellId,
        group_id: TransitionGroupId,
        iteration: i32,
        timestep: i32,
        travel_time: f64,
    ) {
        let patch_kind = self
            .rules
            .definitions
            .transition_group(group_id)
            .and_then(|g| g.patch_prioritization);

        for direction in GROW_DIRECTIONS {
            let Some(neighbor_id) = self.landscape.neighbor(from_cell, direction) else {
                continue;
            };
            if transitioned.contains(&neighbor_id) || seen.contains(&neighbor_id) {
                continue;
            }

            if let Some(kind) = patch_kind {
                if kind.edges_only() {
                    let Some(patch_set) = patches else { continue };
                    if patch_set.is_empty() {
                        return;
                    }
                    if !patch_set.is_serviced_edge_cell(kind, neighbor_id) {
                        continue;
                    }
                }
            }

            let probability = self.cell_probability(neighbor_id, group_id, iteration, timestep);
            if probability <= 0.0 {
                continue;
            }

            let distance = self.landscape.topology().neighbor_distance(direction);
            let slope = self.landscape.slope_between(from_cell, neighbor_id, distance);

            let (n_stratum, n_secondary, n_tertiary) = {
                let neighbor = self
                    .landscape
                    .cell(neighbor_id)
                    .expect("neighbor resolved to an instantiated cell");
                (
                    neighbor.stratum_id,
                    neighbor.secondary_stratum_id,
                    neighbor.tertiary_stratum_id,
                )
            };

            let direction_multiplier = self.rules.direction_multipliers.get(
                group_id,
                n_stratum,
                n_secondary,
                n_tertiary,
                direction,
                iteration,
                timestep,
            );
            let slope_multiplier = self.rules.slope_multipliers.get(
                group_id,
                n_stratum,
                n_secondary,
                n_tertiary,
                iteration,
                timestep,
                slope,
            );

            let rate = slope_multiplier * direction_multiplier;
            debug_assert!(rate >= 0.0);
            if rate > 0.0 {
                let time = travel_time + distance / rate;
                frontier.push(neighbor_id, time, probability / time);
                seen.insert(neighbor_id);
            }
        }
    }

    /// Draws a pathway for a cell under a group, weighted by each option's
    /// full probability term. Returns `None` when nothing is selectable.
    pub(crate) fn select_transition_pathway(
        &self,
        cell_id: CellId,
        group_id: TransitionGroupId,
        iteration: i32,
        timestep: i32,
        rng: &mut dyn RngCore,
    ) -> Option<usize> {
        let weights = self.option_weights(cell_id, group_id, iteration, timestep);
        let total: f64 = weights.iter().map(|(_, w)| w).sum();
        if total <= 0.0 {
            return None;
        }

        let mut roll = random::rand01(rng) * total;
        for (pathway, weight) in &weights {
            roll -= weight;
            if roll <= 0.0 {
                return Some(*pathway);
            }
        }
        weights.first().map(|(pathway, _)| *pathway)
    }

    /// Commits a transition: emits events, debits targets, records
    /// outputs, mutates the cell, and updates stratum and patch
    /// membership.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn commit_transition(
        &mut self,
        cell_id: CellId,
        pathway_index: usize,
        group_id: TransitionGroupId,
        iteration: i32,
        timestep: i32,
        patches: &mut Option<PatchSet>,
        output: &mut TimestepOutput,
        sink: &mut dyn EventSink,
    ) {
        let pathway = self.rules.pathways.pathway(pathway_index).clone();
        let amount_per_cell = self.landscape.amount_per_cell();

        let (old_stratum, old_secondary, old_tertiary) = {
            let cell = self
                .landscape
                .cell(cell_id)
                .expect("committed cell exists");
            (
                cell.stratum_id,
                cell.secondary_stratum_id,
                cell.tertiary_stratum_id,
            )
        };

        // Attribute amounts use the pre-transition classification.
        let attribute_amounts: Vec<(i32, f64)> = {
            let cell = self
                .landscape
                .cell(cell_id)
                .expect("committed cell exists");
            self.rules
                .transition_attributes
                .values_for(pathway.transition_type_id, cell)
                .map(|r| (r.attribute_type_id, r.value))
                .collect()
        };

        if sink.wants(SimEventKind::CellTransitioned) {
            sink.send(SimEvent::CellTransitioned {
                cell_id,
                stratum_id: old_stratum,
                transition_type_id: pathway.transition_type_id,
                transition_group_id: group_id,
                iteration,
                timestep,
            });
        }

        {
            let rules = &self.rules;
            let targets = &mut self.targets;

            for member_group in rules.definitions.groups_for_type(pathway.transition_type_id) {
                if let Some(index) = targets.transition_target_index(
                    *member_group,
                    Some(old_stratum),
                    old_secondary,
                    old_tertiary,
                    iteration,
                    timestep,
                ) {
                    let target = targets.transition_target_at_mut(index);
                    if !target.disabled {
                        target.remaining -= amount_per_cell;
                    }
                }
            }

            for (attribute_type_id, value) in &attribute_amounts {
                if let Some(index) = targets.attribute_target_index(
                    *attribute_type_id,
                    Some(old_stratum),
                    old_secondary,
                    old_tertiary,
                    iteration,
                    timestep,
                ) {
                    let target = targets.attribute_target_at_mut(index);
                    if !target.disabled {
                        target.remaining -= value * amount_per_cell;
                    }
                }
                output.record_attribute(*attribute_type_id, cell_id, value * amount_per_cell);
            }
        }

        let map_id = self
            .rules
            .definitions
            .transition_type(pathway.transition_type_id)
            .and_then(|t| t.map_id);
        output.record_transition(group_id, cell_id, map_id, pathway.transition_type_id);
        output.transitioned_cells += 1;

        let new_stratum = pathway.dest_stratum_id.unwrap_or(old_stratum);
        {
            let rules = &self.rules;
            let cell = self
                .landscape
                .cell_mut(cell_id)
                .expect("committed cell exists");
            if let Some(state_class) = pathway.dest_state_class_id {
                cell.state_class_id = state_class;
            }
            cell.stratum_id = new_stratum;
            if pathway.age_reset {
                cell.age = 0;
            }
            rules.pathways.fill_cell_transitions(cell);
        }
        if new_stratum != old_stratum {
            self.landscape
                .move_cell_stratum(cell_id, old_stratum, new_stratum);
        }

        if let Some(patch_set) = patches {
            patch_set.remove_cell(cell_id, self.landscape.topology());
        }
    }

    /// Eligible cells for patch building: untransitioned stratum cells
    /// with a positive truncated probability.
    pub(crate) fn fill_transition_patches(
        &self,
        transitioned: &HashSet<CellId>,
        stratum_id: StratumId,
        group_id: TransitionGroupId,
        iteration: i32,
        timestep: i32,
    ) -> Option<PatchSet> {
        let kind: Option<PatchPrioritizationKind> = self
            .rules
            .definitions
            .transition_group(group_id)
            .and_then(|g| g.patch_prioritization);
        kind?;

        let eligible: std::collections::BTreeSet<CellId> = self
            .landscape
            .stratum_cell_ids(stratum_id)
            .iter()
            .copied()
            .filter(|id| !transitioned.contains(id))
            .filter(|id| self.cell_probability(*id, group_id, iteration, timestep) > 0.0)
            .collect();

        Some(PatchSet::build(self.landscape.topology(), &eligible))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frontier_orders_by_likelihood_then_travel_time() {
        let mut frontier = Frontier::new();
        frontier.push(1, 2.0, 0.5);
        frontier.push(2, 1.0, 0.9);
        frontier.push(3, 3.0, 0.9);
        frontier.push(4, 1.0, 0.9);

        assert_eq!(frontier.len(), 4);
        // Highest likelihood, lowest travel time, earliest insertion.
        assert_eq!(frontier.pop().unwrap().0, 2);
        assert_eq!(frontier.pop().unwrap().0, 4);
        assert_eq!(frontier.pop().unwrap().0, 3);
        assert_eq!(frontier.pop().unwrap().0, 1);
    }

    #[test]
    fn indexed_set_supports_swap_removal() {
        let mut set = IndexedCellSet::new();
        for id in [5, 9, 13] {
            set.insert(id);
        }
        set.insert(9); // duplicate is a no-op
        assert_eq!(set.len(), 3);

        set.remove(5);
        assert_eq!(set.len(), 2);
        let remaining: Vec<CellId> = (0..set.len()).map(|i| set.at(i)).collect();
        assert!(remaining.contains(&9));
        assert!(remaining.contains(&13));

        set.remove(42); // absent is a no-op
        assert_eq!(set.len(), 2);
        set.clear();
        assert!(set.is_empty());
    }

    #[test]
    fn nearest_sized_event_prefers_later_ties() {
        let mut events = vec![
            TransitionEvent { target_amount: 10.0 },
            TransitionEvent { target_amount: 6.0 },
            TransitionEvent { target_amount: 2.0 },
        ];
        remove_nearest_sized_event(&mut events, 4.0);
        // 6.0 and 2.0 are equally near; the later one goes.
        let remaining: Vec<f64> = events.iter().map(|e| e.target_amount).collect();
        assert_eq!(remaining, vec![10.0, 6.0]);
    }

    #[test]
    fn nearest_sized_event_removes_closest() {
        let mut events = vec![
            TransitionEvent { target_amount: 9.0 },
            TransitionEvent { target_amount: 5.0 },
            TransitionEvent { target_amount: 1.0 },
        ];
        remove_nearest_sized_event(&mut events, 5.4);
        let remaining: Vec<f64> = events.iter().map(|e| e.target_amount).collect();
        assert_eq!(remaining, vec![9.0, 1.0]);
    }
}
