//! # blockstat Algorithms
//!
//! Block reduction of scattered `(x, y, z)` data onto a regular grid.
//!
//! ## Estimators
//!
//! - **mean**: weighted mean, sum, weight sum or count per cell
//! - **median**: weighted median or any quantile, with L1 or box-and-whisker extras
//! - **mode**: continuous shortest-half mode or histogram mode

pub mod block;
pub(crate) mod maybe_rayon;

pub use block::{
    block_mean, block_median, block_mode, block_reduce, BlockEstimator, BlockMethod, BlockReducer,
    BlockSummary, Estimator,
};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::block::{
        block_mean, block_median, block_mode, block_reduce, BlockCounts, BlockEstimator, BlockField,
        BlockMean, BlockMedian, BlockMethod, BlockMode, BlockRecord, BlockReducer, BlockSummary,
        Dispersion, Estimator, HistogramParams, MeanLocation, MeanParams, MeanReport, MedianParams,
        ModeLocation, ModeParams, ModeTie, QuantileLocation, QuantileSpread, SourceTie, Spread,
        WeightPolicy,
    };
    pub use blockstat_core::prelude::*;
}
