//! Transition patches: connected components of eligible cells, ordered by
//! size for patch-prioritized initiation.
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

use rand::RngCore;

use crate::grid::topology::{CompassDirection, GridTopology};
use crate::grid::CellId;
use crate::random;

/// How patch-prioritized groups pick their next initiation cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchPrioritizationKind {
    /// Service the largest patch first.
    Largest,
    /// Service the smallest patch first.
    Smallest,
    /// Largest first, and restrict frontier growth to its edge cells.
    LargestEdgesOnly,
    /// Smallest first, and restrict frontier growth to its edge cells.
    SmallestEdgesOnly,
}

impl PatchPrioritizationKind {
    pub fn prefers_largest(self) -> bool {
        matches!(
            self,
            PatchPrioritizationKind::Largest | PatchPrioritizationKind::LargestEdgesOnly
        )
    }

    /// Whether frontier candidates must lie on the serviced patch's edge.
    pub fn edges_only(self) -> bool {
        matches!(
            self,
            PatchPrioritizationKind::LargestEdgesOnly | PatchPrioritizationKind::SmallestEdgesOnly
        )
    }
}

/// A spatially contiguous set of cells eligible for the same group.
#[derive(Debug, Clone)]
pub struct TransitionPatch {
    pub seq: usize,
    pub cells: BTreeSet<CellId>,
    /// Cells with at least one 8-neighbor outside the patch.
    pub edge_cells: BTreeSet<CellId>,
}

impl TransitionPatch {
    pub fn size(&self) -> usize {
        self.cells.len()
    }
}

/// Size-ordered collection of [`TransitionPatch`]es for one (stratum,
/// group) pass. Built before events are generated, consumed as cells
/// transition, and discarded at the end of the pass.
#[derive(Debug, Clone, Default)]
pub struct PatchSet {
    patches: BTreeMap<usize, TransitionPatch>,
    order: BTreeSet<(usize, usize)>,
    cell_to_patch: HashMap<CellId, usize>,
}

impl PatchSet {
    /// Finds the 8-connected components of the eligible cell set.
    pub fn build(topology: &GridTopology, eligible: &BTreeSet<CellId>) -> Self {
        let mut set = PatchSet::default();
        let mut assigned: BTreeSet<CellId> = BTreeSet::new();
        let mut next_seq = 0;

        for &start in eligible {
            if assigned.contains(&start) {
                continue;
            }
            let mut cells = BTreeSet::new();
            let mut queue = VecDeque::new();
            queue.push_back(start);
            assigned.insert(start);
            while let Some(id) = queue.pop_front() {
                cells.insert(id);
                for direction in CompassDirection::ALL {
                    if let Some(n) = topology.neighbor(id, direction) {
                        if eligible.contains(&n) && assigned.insert(n) {
                            queue.push_back(n);
                        }
                    }
                }
            }

            let edge_cells: BTreeSet<CellId> = cells
                .iter()
                .copied()
                .filter(|id| {
                    CompassDirection::ALL.iter().any(|d| {
                        topology
                            .neighbor(*id, *d)
                            .map(|n| !cells.contains(&n))
                            .unwrap_or(true)
                    })
                })
                .collect();

            for &id in &cells {
                set.cell_to_patch.insert(id, next_seq);
            }
            set.order.insert((cells.len(), next_seq));
            set.patches.insert(
                next_seq,
                TransitionPatch {
                    seq: next_seq,
                    cells,
                    edge_cells,
                },
            );
            next_seq += 1;
        }

        set
    }

    pub fn is_empty(&self) -> bool {
        self.patches.is_empty()
    }

    pub fn len(&self) -> usize {
        self.patches.len()
    }

    fn serviced_seq(&self, kind: PatchPrioritizationKind) -> Option<usize> {
        let entry = if kind.prefers_largest() {
            self.order.iter().next_back()
        } else {
            self.order.iter().next()
        };
        entry.map(|(_, seq)| *seq)
    }

    /// The patch currently being serviced under the given prioritization.
    pub fn serviced_patch(&self, kind: PatchPrioritizationKind) -> Option<&TransitionPatch> {
        self.serviced_seq(kind).map(|seq| &self.patches[&seq])
    }

    /// Whether a cell lies on the serviced patch's edge. Used to gate
    /// frontier candidates for the edges-only prioritizations.
    pub fn is_serviced_edge_cell(&self, kind: PatchPrioritizationKind, cell: CellId) -> bool {
        self.serviced_patch(kind)
            .map(|p| p.edge_cells.contains(&cell))
            .unwrap_or(false)
    }

    /// Draws a random edge cell from the serviced patch and removes it
    /// from patch membership. Returns `None` once no patches remain.
    pub fn take_initiation_cell(
        &mut self,
        kind: PatchPrioritizationKind,
        topology: &GridTopology,
        rng: &mut dyn RngCore,
    ) -> Option<CellId> {
        let seq = self.serviced_seq(kind)?;
        let patch = &self.patches[&seq];
        debug_assert!(!patch.edge_cells.is_empty(), "a non-empty patch has edges");
        let pick = random::rand_index(rng, patch.edge_cells.len());
        let cell = *patch.edge_cells.iter().nth(pick)?;
        self.remove_cell(cell, topology);
        Some(cell)
    }

    /// Removes a cell from its patch, promoting its patch neighbors to
    /// edge cells and dropping the patch when it empties.
    pub fn remove_cell(&mut self, cell: CellId, topology: &GridTopology) {
        let Some(seq) = self.cell_to_patch.remove(&cell) else {
            return;
        };
        let patch = self
            .patches
            .get_mut(&seq)
            .expect("cell_to_patch points at a live patch");
        self.order.remove(&(patch.size(), seq));
        patch.cells.remove(&cell);
        patch.edge_cells.remove(&cell);
        for direction in CompassDirection::ALL {
            if let Some(n) = topology.neighbor(cell, direction) {
                if patch.cells.contains(&n) {
                    patch.edge_cells.insert(n);
                }
            }
        }
        if patch.cells.is_empty() {
            self.patches.remove(&seq);
        } else {
            self.order.insert((self.patches[&seq].size(), seq));
        }
    }
}
