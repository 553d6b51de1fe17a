//! Rectangular rasters, their metadata, and the external codec seam.
//!
//! The engine never parses raster file bytes itself: loading and saving go
//! through the [`RasterSource`] and [`RasterSink`] traits, which exchange
//! fully decoded [`Raster`] values plus [`RasterMetadata`]. Companion
//! rasters are checked against each other with [`RasterMetadata::compare`];
//! important differences abort the run while unimportant ones are only
//! logged.
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Value used for cells that carry no data in integer rasters.
pub const DEFAULT_NO_DATA_VALUE: i32 = -9999;

/// Metadata shared by every raster of a run.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct RasterMetadata {
    /// Number of raster rows.
    pub rows: usize,
    /// Number of raster columns.
    pub cols: usize,
    /// Cell edge length in projection units.
    pub cell_size: f64,
    /// X coordinate of the lower-left corner.
    pub xll_corner: f64,
    /// Y coordinate of the lower-left corner.
    pub yll_corner: f64,
    /// Projection string, possibly empty.
    pub projection: String,
    /// No-data marker for floating point rasters.
    pub no_data_value: f64,
}

/// Outcome of comparing two rasters' metadata.
#[derive(Debug, Clone, PartialEq)]
pub enum MetadataComparison {
    /// Metadata match in every respect that matters.
    Same,
    /// Differences that do not affect simulation results (corner
    /// coordinates, projection, no-data marker). Logged, run continues.
    UnimportantDifferences(String),
    /// Differences that would corrupt results (dimensions, cell size).
    ImportantDifferences(String),
}

impl RasterMetadata {
    pub fn new(rows: usize, cols: usize, cell_size: f64) -> Self {
        Self {
            rows,
            cols,
            cell_size,
            xll_corner: 0.0,
            yll_corner: 0.0,
            projection: String::new(),
            no_data_value: f64::from(DEFAULT_NO_DATA_VALUE),
        }
    }

    /// Total number of cells described by this metadata.
    pub fn n_cells(&self) -> usize {
        self.rows * self.cols
    }

    /// Compares against another raster's metadata, classifying differences
    /// by whether they can change simulation results.
    pub fn compare(&self, other: &RasterMetadata) -> MetadataComparison {
        if self.rows != other.rows || self.cols != other.cols {
            return MetadataComparison::ImportantDifferences(format!(
                "different dimensions: {}x{} vs {}x{}",
                self.rows, self.cols, other.rows, other.cols
            ));
        }
        if self.cell_size != other.cell_size {
            return MetadataComparison::ImportantDifferences(format!(
                "different cell size: {} vs {}",
                self.cell_size, other.cell_size
            ));
        }

        let mut notes = Vec::new();
        if self.xll_corner != other.xll_corner || self.yll_corner != other.yll_corner {
            notes.push("different corner coordinates");
        }
        if self.projection != other.projection {
            notes.push("different projection");
        }
        if self.no_data_value != other.no_data_value {
            notes.push("different no-data value");
        }

        if notes.is_empty() {
            MetadataComparison::Same
        } else {
            MetadataComparison::UnimportantDifferences(notes.join(", "))
        }
    }
}

/// A rectangular grid of values plus its metadata.
#[derive(Debug, Clone)]
pub struct Raster<T> {
    pub metadata: RasterMetadata,
    pub cells: Vec<T>,
}

impl<T> Raster<T> {
    /// Creates a raster after checking that the cell count matches the
    /// metadata dimensions.
    pub fn new(metadata: RasterMetadata, cells: Vec<T>) -> Result<Self> {
        if cells.len() != metadata.n_cells() {
            return Err(Error::InvalidConfig(format!(
                "raster has {} cells but metadata describes {}x{}",
                cells.len(),
                metadata.rows,
                metadata.cols
            )));
        }
        Ok(Self { metadata, cells })
    }

    pub fn n_cells(&self) -> usize {
        self.cells.len()
    }
}

impl Raster<i32> {
    /// Creates an integer raster with every cell set to the no-data value.
    pub fn filled_no_data(metadata: RasterMetadata) -> Self {
        let n = metadata.n_cells();
        Self {
            metadata,
            cells: vec![DEFAULT_NO_DATA_VALUE; n],
        }
    }
}

/// Loads decoded rasters by name. Implemented by the hosting application;
/// the engine never touches file bytes.
pub trait RasterSource {
    fn load_i32(&mut self, name: &str) -> Result<Raster<i32>>;
    fn load_f64(&mut self, name: &str) -> Result<Raster<f64>>;
}

/// Accepts rasters produced by the engine (initial condition snapshots,
/// transitioned pixels, probability maps).
pub trait RasterSink {
    fn save_i32(&mut self, name: &str, raster: &Raster<i32>) -> Result<()>;
    fn save_f64(&mut self, name: &str, raster: &Raster<f64>) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(rows: usize, cols: usize) -> RasterMetadata {
        RasterMetadata::new(rows, cols, 30.0)
    }

    #[test]
    fn compare_flags_dimension_mismatch_as_important() {
        let a = meta(10, 10);
        let b = meta(10, 11);
        assert!(matches!(
            a.compare(&b),
            MetadataComparison::ImportantDifferences(_)
        ));
    }

    #[test]
    fn compare_flags_cell_size_mismatch_as_important() {
        let a = meta(10, 10);
        let mut b = meta(10, 10);
        b.cell_size = 25.0;
        assert!(matches!(
            a.compare(&b),
            MetadataComparison::ImportantDifferences(_)
        ));
    }

    #[test]
    fn compare_treats_projection_and_corners_as_unimportant() {
        let a = meta(10, 10);
        let mut b = meta(10, 10);
        b.projection = "EPSG:26912".into();
        b.xll_corner = 100.0;
        match a.compare(&b) {
            MetadataComparison::UnimportantDifferences(msg) => {
                assert!(msg.contains("projection"));
                assert!(msg.contains("corner"));
            }
            other => panic!("expected unimportant differences, got {other:?}"),
        }
    }

    #[test]
    fn compare_identical_metadata_is_same() {
        let a = meta(4, 4);
        assert_eq!(a.compare(&a.clone()), MetadataComparison::Same);
    }

    #[test]
    fn raster_rejects_wrong_cell_count() {
        let result = Raster::new(meta(2, 2), vec![1, 2, 3]);
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn filled_no_data_initializes_every_cell() {
        let raster = Raster::filled_no_data(meta(3, 3));
        assert_eq!(raster.n_cells(), 9);
        assert!(raster.cells.iter().all(|c| *c == DEFAULT_NO_DATA_VALUE));
    }
}
