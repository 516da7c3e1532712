//! Block estimators: reduce scattered `(x, y, z)` points to one value per cell
//!
//! Points are assigned to the cells of a [`GridSpec`] by a [`CellIndexer`],
//! weighted by a [`WeightPolicy`] and handed to a [`BlockEstimator`]:
//!
//! - [`BlockMean`]: weighted mean, sum, weight sum or count, with optional
//!   standard deviation or propagated error
//! - [`BlockMedian`]: weighted quantiles, with optional MAD or box-and-whisker
//!   statistics
//! - [`BlockMode`]: continuous (shortest half) or histogram mode
//!
//! [`BlockReducer`] drives the whole pass and returns a [`BlockSummary`].

mod buffer;
mod index;
mod mean;
mod mode;
mod quantile;
mod record;
mod reducer;
mod robust;
mod weight;

pub use buffer::{Axis, PointBuffer, SortRecord};
pub use index::{CellIndex, CellIndexer};
pub use mean::{BlockMean, Dispersion, MeanLocation, MeanParams, MeanReport};
pub use mode::{BlockMode, Histogram, HistogramParams, ModeLocation, ModeParams, ModeTie};
pub use quantile::{BlockMedian, MedianParams, QuantileLocation, QuantileSpread};
pub use record::{BlockField, BlockRecord, RecordLayout, SourceTie, Spread, SpreadKind};
pub use reducer::{BlockCounts, BlockReducer, BlockSummary};
pub use robust::MAD_SCALE;
pub use weight::{WeightPolicy, Weighting};

use blockstat_core::{GridSpec, PointRecord, Result};

/// A point that passed indexing and weighting
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlockPoint {
    pub node: usize,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub weight: f64,
    pub position_weight: f64,
    pub error_term: f64,
    pub source_id: u64,
}

/// A per-cell reduction.
///
/// Estimators receive every accepted point through [`accumulate`] and
/// produce one record per occupied cell, in increasing node order, from
/// [`finalize`].
///
/// [`accumulate`]: BlockEstimator::accumulate
/// [`finalize`]: BlockEstimator::finalize
pub trait BlockEstimator {
    /// Human-readable name for logging
    fn name(&self) -> &'static str;

    /// How this estimator wants the weight column interpreted
    fn weight_policy(&self) -> WeightPolicy;

    /// Optional columns of the records this estimator produces
    fn layout(&self) -> RecordLayout;

    fn accumulate(&mut self, point: BlockPoint);

    fn finalize(self) -> Result<Vec<BlockRecord>>;
}

/// Choice of statistic with its parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BlockMethod {
    Mean(MeanParams),
    Median(MedianParams),
    Mode(ModeParams),
}

/// Runtime-selected estimator
#[derive(Debug)]
pub enum Estimator {
    Mean(BlockMean),
    Median(BlockMedian),
    Mode(BlockMode),
}

impl Estimator {
    pub fn new(grid: &GridSpec, method: &BlockMethod) -> Result<Self> {
        Ok(match *method {
            BlockMethod::Mean(params) => Estimator::Mean(BlockMean::new(grid, params)?),
            BlockMethod::Median(params) => Estimator::Median(BlockMedian::new(grid, params)?),
            BlockMethod::Mode(params) => Estimator::Mode(BlockMode::new(grid, params)?),
        })
    }
}

impl BlockEstimator for Estimator {
    fn name(&self) -> &'static str {
        match self {
            Estimator::Mean(e) => e.name(),
            Estimator::Median(e) => e.name(),
            Estimator::Mode(e) => e.name(),
        }
    }

    fn weight_policy(&self) -> WeightPolicy {
        match self {
            Estimator::Mean(e) => e.weight_policy(),
            Estimator::Median(e) => e.weight_policy(),
            Estimator::Mode(e) => e.weight_policy(),
        }
    }

    fn layout(&self) -> RecordLayout {
        match self {
            Estimator::Mean(e) => e.layout(),
            Estimator::Median(e) => e.layout(),
            Estimator::Mode(e) => e.layout(),
        }
    }

    fn accumulate(&mut self, point: BlockPoint) {
        match self {
            Estimator::Mean(e) => e.accumulate(point),
            Estimator::Median(e) => e.accumulate(point),
            Estimator::Mode(e) => e.accumulate(point),
        }
    }

    fn finalize(self) -> Result<Vec<BlockRecord>> {
        match self {
            Estimator::Mean(e) => e.finalize(),
            Estimator::Median(e) => e.finalize(),
            Estimator::Mode(e) => e.finalize(),
        }
    }
}

/// Reduce in-memory points with any method
pub fn block_reduce(points: &[PointRecord], grid: &GridSpec, method: &BlockMethod) -> Result<BlockSummary> {
    let mut reducer = BlockReducer::new(grid, Estimator::new(grid, method)?);
    reducer.extend(points.iter().copied())?;
    reducer.finish()
}

/// Block mean of in-memory points
pub fn block_mean(points: &[PointRecord], grid: &GridSpec, params: MeanParams) -> Result<BlockSummary> {
    block_reduce(points, grid, &BlockMethod::Mean(params))
}

/// Block median (or other quantile) of in-memory points
pub fn block_median(points: &[PointRecord], grid: &GridSpec, params: MedianParams) -> Result<BlockSummary> {
    block_reduce(points, grid, &BlockMethod::Median(params))
}

/// Block mode of in-memory points
pub fn block_mode(points: &[PointRecord], grid: &GridSpec, params: ModeParams) -> Result<BlockSummary> {
    block_reduce(points, grid, &BlockMethod::Mode(params))
}
