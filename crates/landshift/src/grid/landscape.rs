//! The cell grid: exclusive owner of all simulation cells.
use std::collections::{BTreeMap, BTreeSet};

use rand::RngCore;

use crate::grid::topology::{CompassDirection, GridTopology};
use crate::grid::{Cell, CellId, StratumId};
use crate::random;

/// The set of simulated cells plus their stratum membership lists.
///
/// Not every raster index has a cell: positions without a valid
/// classification are never instantiated, and lookups for them return
/// `None`. Every instantiated cell belongs to exactly one stratum list,
/// the one matching its `stratum_id`.
pub struct Landscape {
    topology: GridTopology,
    cells: Vec<Option<Cell>>,
    stratum_cells: BTreeMap<StratumId, Vec<CellId>>,
    secondary_stratum_ids: BTreeSet<StratumId>,
    tertiary_stratum_ids: BTreeSet<StratumId>,
    elevation: Option<Vec<f64>>,
    amount_per_cell: f64,
}

impl Landscape {
    pub fn new(topology: GridTopology, amount_per_cell: f64) -> Self {
        debug_assert!(amount_per_cell > 0.0, "amount_per_cell must be > 0");
        let n = topology.n_cells();
        Self {
            topology,
            cells: (0..n).map(|_| None).collect(),
            stratum_cells: BTreeMap::new(),
            secondary_stratum_ids: BTreeSet::new(),
            tertiary_stratum_ids: BTreeSet::new(),
            elevation: None,
            amount_per_cell,
        }
    }

    /// Attaches an elevation surface; without one, every cell reports an
    /// elevation of 1.0.
    pub fn with_elevation(mut self, elevation: Vec<f64>) -> Self {
        debug_assert_eq!(elevation.len(), self.topology.n_cells());
        self.elevation = Some(elevation);
        self
    }

    pub fn topology(&self) -> &GridTopology {
        &self.topology
    }

    /// Area represented by a single cell.
    pub fn amount_per_cell(&self) -> f64 {
        self.amount_per_cell
    }

    /// Number of instantiated cells.
    pub fn n_cells(&self) -> usize {
        self.cells.iter().filter(|c| c.is_some()).count()
    }

    pub fn insert_cell(&mut self, cell: Cell) {
        let id = cell.id;
        debug_assert!(id < self.cells.len());
        debug_assert!(self.cells[id].is_none(), "cell {id} inserted twice");

        self.stratum_cells.entry(cell.stratum_id).or_default().push(id);
        if let Some(s) = cell.secondary_stratum_id {
            self.secondary_stratum_ids.insert(s);
        }
        if let Some(t) = cell.tertiary_stratum_id {
            self.tertiary_stratum_ids.insert(t);
        }
        self.cells[id] = Some(cell);
    }

    pub fn cell(&self, id: CellId) -> Option<&Cell> {
        self.cells.get(id).and_then(|c| c.as_ref())
    }

    pub fn cell_mut(&mut self, id: CellId) -> Option<&mut Cell> {
        self.cells.get_mut(id).and_then(|c| c.as_mut())
    }

    /// All instantiated cells in id order.
    pub fn cells(&self) -> impl Iterator<Item = &Cell> {
        self.cells.iter().filter_map(|c| c.as_ref())
    }

    /// All instantiated cell ids in id order.
    pub fn cell_ids(&self) -> Vec<CellId> {
        self.cells
            .iter()
            .filter_map(|c| c.as_ref().map(|cell| cell.id))
            .collect()
    }

    /// Stratum ids that own at least one cell, ascending.
    pub fn stratum_ids(&self) -> Vec<StratumId> {
        self.stratum_cells.keys().copied().collect()
    }

    /// Secondary stratum ids present in the landscape, ascending.
    pub fn secondary_stratum_ids(&self) -> impl Iterator<Item = StratumId> + '_ {
        self.secondary_stratum_ids.iter().copied()
    }

    /// Tertiary stratum ids present in the landscape, ascending.
    pub fn tertiary_stratum_ids(&self) -> impl Iterator<Item = StratumId> + '_ {
        self.tertiary_stratum_ids.iter().copied()
    }

    /// Cell ids of one stratum in their current (possibly shuffled) order.
    pub fn stratum_cell_ids(&self, stratum_id: StratumId) -> &[CellId] {
        self.stratum_cells
            .get(&stratum_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Uniformly permutes the cell order of every stratum. Called once per
    /// timestep before any transition group is processed, so that no group
    /// sees cells in a positionally biased order.
    pub fn shuffle_stratum_cells(&mut self, rng: &mut dyn RngCore) {
        for ids in self.stratum_cells.values_mut() {
            random::shuffle(ids, rng);
        }
    }

    /// Moves a cell between stratum lists after a transition changed its
    /// primary stratum.
    pub fn move_cell_stratum(&mut self, id: CellId, from: StratumId, to: StratumId) {
        if from == to {
            return;
        }
        if let Some(ids) = self.stratum_cells.get_mut(&from) {
            if let Some(pos) = ids.iter().position(|c| *c == id) {
                ids.swap_remove(pos);
            }
            if ids.is_empty() {
                self.stratum_cells.remove(&from);
            }
        }
        self.stratum_cells.entry(to).or_default().push(id);
    }

    /// Neighbor in a compass direction, only if that cell is instantiated.
    pub fn neighbor(&self, id: CellId, direction: CompassDirection) -> Option<CellId> {
        let n = self.topology.neighbor(id, direction)?;
        self.cell(n).map(|c| c.id)
    }

    /// All instantiated 8-connected neighbors, clockwise from north.
    pub fn neighbors(&self, id: CellId) -> Vec<CellId> {
        CompassDirection::ALL
            .iter()
            .filter_map(|d| self.neighbor(id, *d))
            .collect()
    }

    /// Neighbor by bearing and distance, only if that cell is instantiated.
    pub fn neighbor_by_distance_and_bearing(
        &self,
        id: CellId,
        bearing_degrees: f64,
        distance: f64,
    ) -> Option<CellId> {
        let n = self
            .topology
            .cell_by_distance_and_bearing(id, bearing_degrees, distance)?;
        self.cell(n).map(|c| c.id)
    }

    /// Elevation of a cell; 1.0 uniformly when no surface is attached.
    pub fn elevation(&self, id: CellId) -> f64 {
        match &self.elevation {
            Some(dem) => dem.get(id).copied().unwrap_or(1.0),
            None => 1.0,
        }
    }

    /// Slope from one cell to another over `distance`, in degrees.
    pub fn slope_between(&self, from: CellId, to: CellId, distance: f64) -> f64 {
        GridTopology::slope_degrees(self.elevation(from), self.elevation(to), distance)
    }
}
