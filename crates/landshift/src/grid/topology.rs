//! Implicit row/column addressing over the raster grid.
//!
//! Cells are identified by their dense row-major [`CellId`]; neighbors are
//! resolved through fixed row/column offsets for the eight compass
//! directions, or through a distance-and-bearing query for non-grid-aligned
//! lookups. Queries that leave the grid return `None` rather than failing.
use glam::DVec2;

use crate::grid::CellId;

/// The eight compass directions of the 8-connected neighborhood.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompassDirection {
    North,
    Northeast,
    East,
    Southeast,
    South,
    Southwest,
    West,
    Northwest,
}

impl CompassDirection {
    /// All directions, clockwise from north.
    pub const ALL: [CompassDirection; 8] = [
        CompassDirection::North,
        CompassDirection::Northeast,
        CompassDirection::East,
        CompassDirection::Southeast,
        CompassDirection::South,
        CompassDirection::Southwest,
        CompassDirection::West,
        CompassDirection::Northwest,
    ];

    /// Row/column offset for this direction. North decreases the row.
    pub fn offset(self) -> (i64, i64) {
        match self {
            CompassDirection::North => (-1, 0),
            CompassDirection::Northeast => (-1, 1),
            CompassDirection::East => (0, 1),
            CompassDirection::Southeast => (1, 1),
            CompassDirection::South => (1, 0),
            CompassDirection::Southwest => (1, -1),
            CompassDirection::West => (0, -1),
            CompassDirection::Northwest => (-1, -1),
        }
    }

    pub fn is_diagonal(self) -> bool {
        matches!(
            self,
            CompassDirection::Northeast
                | CompassDirection::Southeast
                | CompassDirection::Southwest
                | CompassDirection::Northwest
        )
    }

    /// Index of this direction in [`CompassDirection::ALL`].
    pub fn index(self) -> usize {
        match self {
            CompassDirection::North => 0,
            CompassDirection::Northeast => 1,
            CompassDirection::East => 2,
            CompassDirection::Southeast => 3,
            CompassDirection::South => 4,
            CompassDirection::Southwest => 5,
            CompassDirection::West => 6,
            CompassDirection::Northwest => 7,
        }
    }
}

/// Row/column addressing and neighbor math for the raster grid.
#[derive(Debug, Clone)]
pub struct GridTopology {
    rows: usize,
    cols: usize,
    cell_size: f64,
}

impl GridTopology {
    pub fn new(rows: usize, cols: usize, cell_size: f64) -> Self {
        debug_assert!(cell_size > 0.0, "cell_size must be > 0");
        Self {
            rows,
            cols,
            cell_size,
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn n_cells(&self) -> usize {
        self.rows * self.cols
    }

    /// Cell edge length.
    pub fn cell_size(&self) -> f64 {
        self.cell_size
    }

    /// Distance between the centers of diagonal neighbors.
    pub fn cell_size_diagonal(&self) -> f64 {
        self.cell_size * std::f64::consts::SQRT_2
    }

    pub fn row_of(&self, id: CellId) -> usize {
        id / self.cols
    }

    pub fn col_of(&self, id: CellId) -> usize {
        id % self.cols
    }

    /// Resolves a cell by row/column offset from `id`, or `None` when the
    /// target falls off the grid edge.
    pub fn cell_by_offset(&self, id: CellId, row_offset: i64, col_offset: i64) -> Option<CellId> {
        let row = self.row_of(id) as i64 + row_offset;
        let col = self.col_of(id) as i64 + col_offset;
        if row < 0 || col < 0 || row >= self.rows as i64 || col >= self.cols as i64 {
            return None;
        }
        Some(row as usize * self.cols + col as usize)
    }

    /// Resolves the neighbor in the given compass direction.
    pub fn neighbor(&self, id: CellId, direction: CompassDirection) -> Option<CellId> {
        let (dr, dc) = direction.offset();
        self.cell_by_offset(id, dr, dc)
    }

    /// Resolves a cell by bearing (degrees clockwise from north) and
    /// distance in projection units. Offsets round to the nearest cell.
    pub fn cell_by_distance_and_bearing(
        &self,
        id: CellId,
        bearing_degrees: f64,
        distance: f64,
    ) -> Option<CellId> {
        let radians = bearing_degrees.to_radians();
        let unit = DVec2::new(radians.sin(), radians.cos());
        let offset = unit * (distance / self.cell_size);
        let col_offset = offset.x.round() as i64;
        let row_offset = -(offset.y.round()) as i64;
        self.cell_by_offset(id, row_offset, col_offset)
    }

    /// Distance between the centers of two neighboring cells.
    pub fn neighbor_distance(&self, direction: CompassDirection) -> f64 {
        if direction.is_diagonal() {
            self.cell_size_diagonal()
        } else {
            self.cell_size
        }
    }

    /// Slope from one elevation to another over `distance`, in degrees.
    pub fn slope_degrees(elevation_from: f64, elevation_to: f64, distance: f64) -> f64 {
        let rise = elevation_to - elevation_from;
        (rise / distance).atan().to_degrees()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn topology() -> GridTopology {
        GridTopology::new(4, 5, 30.0)
    }

    #[test]
    fn row_major_addressing() {
        let t = topology();
        assert_eq!(t.row_of(7), 1);
        assert_eq!(t.col_of(7), 2);
        assert_eq!(t.n_cells(), 20);
    }

    #[test]
    fn neighbors_use_fixed_offsets() {
        let t = topology();
        // Cell 7 sits at row 1, col 2.
        assert_eq!(t.neighbor(7, CompassDirection::North), Some(2));
        assert_eq!(t.neighbor(7, CompassDirection::Northeast), Some(3));
        assert_eq!(t.neighbor(7, CompassDirection::East), Some(8));
        assert_eq!(t.neighbor(7, CompassDirection::Southeast), Some(13));
        assert_eq!(t.neighbor(7, CompassDirection::South), Some(12));
        assert_eq!(t.neighbor(7, CompassDirection::Southwest), Some(11));
        assert_eq!(t.neighbor(7, CompassDirection::West), Some(6));
        assert_eq!(t.neighbor(7, CompassDirection::Northwest), Some(1));
    }

    #[test]
    fn edge_lookups_return_none() {
        let t = topology();
        assert_eq!(t.neighbor(0, CompassDirection::North), None);
        assert_eq!(t.neighbor(0, CompassDirection::West), None);
        assert_eq!(t.neighbor(4, CompassDirection::East), None);
        assert_eq!(t.neighbor(19, CompassDirection::South), None);
    }

    #[test]
    fn bearing_lookup_matches_compass_neighbors() {
        let t = topology();
        assert_eq!(t.cell_by_distance_and_bearing(7, 0.0, 30.0), Some(2));
        assert_eq!(t.cell_by_distance_and_bearing(7, 90.0, 30.0), Some(8));
        assert_eq!(t.cell_by_distance_and_bearing(7, 180.0, 30.0), Some(12));
        assert_eq!(t.cell_by_distance_and_bearing(7, 270.0, 30.0), Some(6));
        // Two cells east.
        assert_eq!(t.cell_by_distance_and_bearing(7, 90.0, 60.0), Some(9));
        // Off the grid.
        assert_eq!(t.cell_by_distance_and_bearing(7, 90.0, 90.0), None);
    }

    #[test]
    fn diagonal_distance_is_longer() {
        let t = topology();
        assert_eq!(t.neighbor_distance(CompassDirection::North), 30.0);
        let diag = t.neighbor_distance(CompassDirection::Southwest);
        assert!((diag - 30.0 * std::f64::consts::SQRT_2).abs() < 1e-12);
    }

    #[test]
    fn slope_is_atan_rise_over_run_in_degrees() {
        let slope = GridTopology::slope_degrees(0.0, 30.0, 30.0);
        assert!((slope - 45.0).abs() < 1e-9);
        let downhill = GridTopology::slope_degrees(30.0, 0.0, 30.0);
        assert!((downhill + 45.0).abs() < 1e-9);
        assert_eq!(GridTopology::slope_degrees(1.0, 1.0, 30.0), 0.0);
    }
}
