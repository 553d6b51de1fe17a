//! Initial conditions: building the cell grid from distributions,
//! rasters, or a combination of both.
//!
//! Non-spatial runs describe the landscape as relative amounts per
//! classification; the builders here turn those into concrete cell
//! assignments, either by allocating whole cell counts per entry
//! (shuffled to avoid spatial clumping) or by drawing each cell
//! independently. The combined mode merges raster-declared classification
//! with distribution-filled gaps.
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use rand::RngCore;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::grid::{
    Cell, GridTopology, Landscape, MetadataComparison, Raster, RasterMetadata, RasterSink,
    RasterSource, StateClassId, StratumId, DEFAULT_NO_DATA_VALUE,
};
use crate::random;
use crate::rules::{DeterministicTable, PathwayTable};

/// One non-spatial distribution entry: a relative amount of landscape in
/// a classification.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone)]
pub struct InitialConditionsDistribution {
    pub iteration: Option<i32>,
    pub stratum_id: StratumId,
    pub secondary_stratum_id: Option<StratumId>,
    pub tertiary_stratum_id: Option<StratumId>,
    pub state_class_id: StateClassId,
    pub age_min: i32,
    pub age_max: i32,
    pub relative_amount: f64,
}

impl InitialConditionsDistribution {
    pub fn new(stratum_id: StratumId, state_class_id: StateClassId, relative_amount: f64) -> Self {
        Self {
            iteration: None,
            stratum_id,
            secondary_stratum_id: None,
            tertiary_stratum_id: None,
            state_class_id,
            age_min: 0,
            age_max: 0,
            relative_amount,
        }
    }

    pub fn with_iteration(mut self, iteration: Option<i32>) -> Self {
        self.iteration = iteration;
        self
    }

    pub fn with_age_range(mut self, age_min: i32, age_max: i32) -> Self {
        self.age_min = age_min;
        self.age_max = age_max;
        self
    }

    pub fn with_secondary_stratum(mut self, id: Option<StratumId>) -> Self {
        self.secondary_stratum_id = id;
        self
    }

    pub fn with_tertiary_stratum(mut self, id: Option<StratumId>) -> Self {
        self.tertiary_stratum_id = id;
        self
    }
}

/// Collection of distribution entries with the filters the builders need.
#[derive(Debug, Clone, Default)]
pub struct InitialConditionsDistributionCollection {
    records: Vec<InitialConditionsDistribution>,
}

impl InitialConditionsDistributionCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, record: InitialConditionsDistribution) {
        self.records.push(record);
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &InitialConditionsDistribution> {
        self.records.iter()
    }

    /// Entries registered for exactly this iteration (wildcard entries
    /// belong to the wildcard list, not to every iteration).
    pub fn for_iteration(&self, iteration: Option<i32>) -> Self {
        Self {
            records: self
                .records
                .iter()
                .filter(|r| r.iteration == iteration)
                .cloned()
                .collect(),
        }
    }

    /// Distinct iterations present, ascending with the wildcard first.
    pub fn sorted_iterations(&self) -> Vec<Option<i32>> {
        let mut iterations: Vec<Option<i32>> =
            self.records.iter().map(|r| r.iteration).collect();
        iterations.sort_unstable();
        iterations.dedup();
        iterations
    }

    /// Entries compatible with a partially classified cell: every field
    /// the cell already knows must match.
    pub fn filtered(&self, draft: &DraftCell) -> Self {
        Self {
            records: self
                .records
                .iter()
                .filter(|r| {
                    if draft.stratum_id.is_some_and(|s| s != r.stratum_id) {
                        return false;
                    }
                    if draft.state_class_id.is_some_and(|sc| sc != r.state_class_id) {
                        return false;
                    }
                    if draft
                        .secondary_stratum_id
                        .is_some_and(|s| Some(s) != r.secondary_stratum_id)
                    {
                        return false;
                    }
                    if draft
                        .tertiary_stratum_id
                        .is_some_and(|s| Some(s) != r.tertiary_stratum_id)
                    {
                        return false;
                    }
                    if draft
                        .age
                        .is_some_and(|a| a < r.age_min.min(r.age_max) || a > r.age_min.max(r.age_max))
                    {
                        return false;
                    }
                    true
                })
                .cloned()
                .collect(),
        }
    }

    pub fn sum_of_relative_amount(&self) -> f64 {
        self.records.iter().map(|r| r.relative_amount).sum()
    }
}

/// A cell under construction: classification fields stay `None` until a
/// raster or a distribution entry supplies them.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DraftCell {
    pub stratum_id: Option<StratumId>,
    pub secondary_stratum_id: Option<StratumId>,
    pub tertiary_stratum_id: Option<StratumId>,
    pub state_class_id: Option<StateClassId>,
    pub age: Option<i32>,
}

/// Side length of the smallest square raster holding `n_cells`.
pub fn square_raster_side(n_cells: usize) -> usize {
    (n_cells as f64).sqrt().ceil() as usize
}

fn assign_from_entry(
    draft: &mut DraftCell,
    entry: &InitialConditionsDistribution,
    deterministic: &DeterministicTable,
    rng: &mut dyn RngCore,
) {
    if draft.age.is_none() {
        draft.age = Some(sample_age(
            entry.stratum_id,
            entry.state_class_id,
            entry.age_min.min(entry.age_max),
            entry.age_min.max(entry.age_max),
            deterministic,
            rng,
        ));
    }
    draft.stratum_id = Some(entry.stratum_id);
    draft.state_class_id = Some(entry.state_class_id);
    draft.secondary_stratum_id = entry.secondary_stratum_id;
    draft.tertiary_stratum_id = entry.tertiary_stratum_id;
}

/// Samples an age from the intersection of the requested range and the
/// deterministic-transition age range for the classification.
fn sample_age(
    stratum_id: StratumId,
    state_class_id: StateClassId,
    age_min: i32,
    age_max: i32,
    deterministic: &DeterministicTable,
    rng: &mut dyn RngCore,
) -> i32 {
    let (mut lo, mut hi) = (age_min, age_max);
    if let Some(dt) = deterministic.get(stratum_id, state_class_id) {
        lo = lo.max(dt.age_min);
        hi = hi.min(dt.age_max);
        if lo > hi {
            lo = dt.age_min;
            hi = dt.age_max;
        }
    }
    if hi == i32::MAX || hi <= lo {
        return lo;
    }
    random::rand_range_i32(rng, lo, hi)
}

/// "Calculate cells from distribution" mode: each entry receives a whole
/// number of cells proportional to its relative amount, and the resulting
/// assignment is shuffled to avoid positional clustering.
pub fn cells_from_distribution_calculated(
    n_cells: usize,
    entries: &InitialConditionsDistributionCollection,
    deterministic: &DeterministicTable,
    rng: &mut dyn RngCore,
) -> Vec<DraftCell> {
    let mut drafts = vec![DraftCell::default(); n_cells];
    let sum = entries.sum_of_relative_amount();
    if sum <= 0.0 {
        return drafts;
    }

    let mut cell_index = 0usize;
    for entry in entries.iter() {
        let allocation = (entry.relative_amount / sum * n_cells as f64).round() as usize;
        for _ in 0..allocation {
            if cell_index >= n_cells {
                break;
            }
            assign_from_entry(&mut drafts[cell_index], entry, deterministic, rng);
            cell_index += 1;
        }
    }

    random::shuffle(&mut drafts, rng);
    drafts
}

/// "No calculate" mode: every cell draws independently against the
/// cumulative relative-weight buckets.
pub fn cells_from_distribution_drawn(
    n_cells: usize,
    entries: &InitialConditionsDistributionCollection,
    deterministic: &DeterministicTable,
    rng: &mut dyn RngCore,
) -> Vec<DraftCell> {
    let mut drafts = vec![DraftCell::default(); n_cells];
    let sum = entries.sum_of_relative_amount();
    if sum <= 0.0 {
        return drafts;
    }

    for draft in &mut drafts {
        let roll = random::rand01(rng);
        let mut cumulative = 0.0;
        for entry in entries.iter() {
            cumulative += entry.relative_amount / sum;
            if roll < cumulative {
                assign_from_entry(draft, entry, deterministic, rng);
                break;
            }
        }
    }

    drafts
}

/// Combined mode: fills the gaps of raster-declared cells from the
/// distribution entries compatible with what each cell already knows.
/// Cells without a primary stratum stay unpopulated.
pub fn fill_combined(
    drafts: &mut [DraftCell],
    entries: &InitialConditionsDistributionCollection,
    deterministic: &DeterministicTable,
    rng: &mut dyn RngCore,
) {
    for draft in drafts.iter_mut() {
        if draft.stratum_id.is_none() {
            continue;
        }
        let candidates = entries.filtered(draft);
        let sum = candidates.sum_of_relative_amount();
        if sum <= 0.0 {
            continue;
        }

        let roll = random::rand01(rng);
        let mut cumulative = 0.0;
        for entry in candidates.iter() {
            cumulative += entry.relative_amount / sum;
            if roll < cumulative {
                assign_from_entry(draft, entry, deterministic, rng);
                break;
            }
        }
    }
}

/// Instantiates the landscape from finished drafts. Only drafts with both
/// a stratum and a state class become cells; ages outside the
/// deterministic range are re-sampled within it.
pub fn realize_landscape(
    topology: GridTopology,
    drafts: &[DraftCell],
    amount_per_cell: f64,
    elevation: Option<Vec<f64>>,
    pathways: &PathwayTable,
    deterministic: &DeterministicTable,
    rng: &mut dyn RngCore,
) -> Landscape {
    debug_assert!(drafts.len() <= topology.n_cells());
    let mut landscape = Landscape::new(topology, amount_per_cell);
    if let Some(dem) = elevation {
        landscape = landscape.with_elevation(dem);
    }

    for (id, draft) in drafts.iter().enumerate() {
        let (Some(stratum_id), Some(state_class_id)) = (draft.stratum_id, draft.state_class_id)
        else {
            continue;
        };

        let age = match draft.age {
            Some(age) => match deterministic.get(stratum_id, state_class_id) {
                Some(dt) if age < dt.age_min || age > dt.age_max => {
                    sample_age(stratum_id, state_class_id, dt.age_min, dt.age_max, deterministic, rng)
                }
                _ => age,
            },
            None => sample_age(stratum_id, state_class_id, 0, i32::MAX, deterministic, rng),
        };

        let mut cell = Cell::new(id, stratum_id, state_class_id)
            .with_secondary_stratum(draft.secondary_stratum_id)
            .with_tertiary_stratum(draft.tertiary_stratum_id)
            .with_age(age);
        pathways.fill_cell_transitions(&mut cell);
        landscape.insert_cell(cell);
    }

    landscape
}

/// Raster names for spatially explicit initial conditions. Primary
/// stratum and state class are mandatory; the rest are optional layers.
#[derive(Debug, Clone, Default)]
pub struct InitialRasterNames {
    pub primary_stratum: String,
    pub state_class: String,
    pub secondary_stratum: Option<String>,
    pub tertiary_stratum: Option<String>,
    pub age: Option<String>,
    pub elevation: Option<String>,
}

fn check_companion(
    reference: &RasterMetadata,
    raster: &RasterMetadata,
    name: &str,
) -> Result<()> {
    match reference.compare(raster) {
        MetadataComparison::Same => Ok(()),
        MetadataComparison::UnimportantDifferences(msg) => {
            warn!("raster '{name}' differs in unimportant ways: {msg}");
            Ok(())
        }
        MetadataComparison::ImportantDifferences(reason) => Err(Error::MismatchedRasters {
            name: name.to_owned(),
            reason,
        }),
    }
}

fn valid_id(value: i32) -> Option<i32> {
    (value > 0 && value != DEFAULT_NO_DATA_VALUE).then_some(value)
}

/// Loads the configured rasters and produces draft cells plus the run's
/// reference metadata and optional elevation surface. Companion rasters
/// with important metadata differences abort; unimportant differences are
/// logged and ignored.
pub fn drafts_from_rasters(
    source: &mut dyn RasterSource,
    names: &InitialRasterNames,
) -> Result<(Vec<DraftCell>, RasterMetadata, Option<Vec<f64>>)> {
    if names.primary_stratum.is_empty() {
        return Err(Error::InvalidConfig(
            "a primary stratum raster is required".into(),
        ));
    }
    if names.state_class.is_empty() {
        return Err(Error::InvalidConfig(
            "a state class raster is required".into(),
        ));
    }

    let primary = source.load_i32(&names.primary_stratum)?;
    let metadata = primary.metadata.clone();
    let n_cells = primary.n_cells();

    let state_class = source.load_i32(&names.state_class)?;
    check_companion(&metadata, &state_class.metadata, &names.state_class)?;

    let mut load_optional = |name: &Option<String>| -> Result<Option<Raster<i32>>> {
        match name {
            Some(n) if !n.is_empty() => {
                let raster = source.load_i32(n)?;
                check_companion(&metadata, &raster.metadata, n)?;
                Ok(Some(raster))
            }
            _ => Ok(None),
        }
    };

    let secondary = load_optional(&names.secondary_stratum)?;
    let tertiary = load_optional(&names.tertiary_stratum)?;
    let age = load_optional(&names.age)?;

    let elevation = match &names.elevation {
        Some(n) if !n.is_empty() => {
            let raster = source.load_f64(n)?;
            check_companion(&metadata, &raster.metadata, n)?;
            Some(raster.cells)
        }
        _ => None,
    };

    let mut drafts = vec![DraftCell::default(); n_cells];
    for (id, draft) in drafts.iter_mut().enumerate() {
        draft.stratum_id = valid_id(primary.cells[id]);
        draft.state_class_id = valid_id(state_class.cells[id]);
        draft.secondary_stratum_id = secondary.as_ref().and_then(|r| valid_id(r.cells[id]));
        draft.tertiary_stratum_id = tertiary.as_ref().and_then(|r| valid_id(r.cells[id]));
        draft.age = age
            .as_ref()
            .map(|r| r.cells[id])
            .filter(|a| *a != DEFAULT_NO_DATA_VALUE && *a >= 0);
    }

    info!(
        "loaded initial condition rasters: {} cells, {} populated",
        n_cells,
        drafts
            .iter()
            .filter(|d| d.stratum_id.is_some() && d.state_class_id.is_some())
            .count()
    );

    Ok((drafts, metadata, elevation))
}

/// Writes the classification of finished drafts back through the raster
/// sink, one layer per known field. Used to snapshot initial conditions
/// derived from non-spatial distributions.
pub fn write_classification_rasters(
    sink: &mut dyn RasterSink,
    drafts: &[DraftCell],
    metadata: &RasterMetadata,
    prefix: &str,
) -> Result<()> {
    let layer = |value_of: &dyn Fn(&DraftCell) -> Option<i32>| -> Vec<i32> {
        drafts
            .iter()
            .map(|d| value_of(d).unwrap_or(DEFAULT_NO_DATA_VALUE))
            .collect()
    };

    let stratum = Raster::new(metadata.clone(), layer(&|d| d.stratum_id))?;
    sink.save_i32(&format!("{prefix}_stratum"), &stratum)?;

    let state_class = Raster::new(metadata.clone(), layer(&|d| d.state_class_id))?;
    sink.save_i32(&format!("{prefix}_state_class"), &state_class)?;

    let age = Raster::new(metadata.clone(), layer(&|d| d.age))?;
    sink.save_i32(&format!("{prefix}_age"), &age)?;

    if drafts.iter().any(|d| d.secondary_stratum_id.is_some()) {
        let secondary = Raster::new(metadata.clone(), layer(&|d| d.secondary_stratum_id))?;
        sink.save_i32(&format!("{prefix}_secondary_stratum"), &secondary)?;
    }

    Ok(())
}
