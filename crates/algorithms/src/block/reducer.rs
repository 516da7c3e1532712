//! Driver feeding points through indexing and weighting into an estimator

use blockstat_core::{Error, GridSpec, PointRecord, Raster, Result};
use tracing::{debug, info, warn};

use super::index::CellIndexer;
use super::record::{BlockField, BlockRecord, RecordLayout, field_raster};
use super::weight::WeightPolicy;
use super::{BlockEstimator, BlockPoint};

/// Tally of a reduction pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BlockCounts {
    /// Records with a finite z
    pub read: u64,
    /// Records handed to the estimator
    pub used: u64,
    /// Records inside the grid whose weight was not positive and finite
    pub rejected: u64,
}

impl BlockCounts {
    /// Records that fell outside the grid
    pub fn outside(&self) -> u64 {
        self.read - self.used - self.rejected
    }
}

/// Result of a reduction: one record per occupied cell
#[derive(Debug, Clone)]
pub struct BlockSummary {
    pub grid: GridSpec,
    pub layout: RecordLayout,
    pub records: Vec<BlockRecord>,
    pub counts: BlockCounts,
}

impl BlockSummary {
    /// Output rows, in node order
    pub fn rows(&self) -> impl Iterator<Item = Vec<f64>> + '_ {
        self.records.iter().map(BlockRecord::columns)
    }

    /// One NaN-filled raster per requested field
    pub fn rasters(&self, fields: &[BlockField]) -> Result<Vec<Raster<f64>>> {
        if let Some(missing) = fields.iter().find(|f| !self.layout.has_field(**f)) {
            return Err(Error::invalid(
                "field",
                missing,
                "not produced with the selected statistics",
            ));
        }
        fields
            .iter()
            .map(|&field| field_raster(&self.grid, &self.records, field))
            .collect()
    }
}

/// Streams [`PointRecord`]s into an estimator.
///
/// Non-finite z values are skipped without counting. Source ids default to
/// the 1-based sequence number of the record among those with a finite z.
///
/// # Example
///
/// ```ignore
/// let grid = GridSpec::new(0.0, 10.0, 0.0, 10.0, 1.0, 1.0)?;
/// let mut reducer = BlockReducer::new(&grid, BlockMean::new(&grid, MeanParams::default())?);
/// reducer.extend(points)?;
/// let summary = reducer.finish()?;
/// ```
#[derive(Debug)]
pub struct BlockReducer<E> {
    indexer: CellIndexer,
    policy: WeightPolicy,
    estimator: E,
    counts: BlockCounts,
}

impl<E: BlockEstimator> BlockReducer<E> {
    pub fn new(grid: &GridSpec, estimator: E) -> Self {
        debug!(
            "{}: {} x {} cells, {:?} registration",
            estimator.name(),
            grid.n_columns(),
            grid.n_rows(),
            grid.registration
        );
        Self {
            indexer: CellIndexer::new(grid),
            policy: estimator.weight_policy(),
            estimator,
            counts: BlockCounts::default(),
        }
    }

    /// Offer one record; returns whether it was used
    pub fn push(&mut self, record: &PointRecord) -> Result<bool> {
        if !record.z.is_finite() {
            return Ok(false);
        }
        self.counts.read += 1;

        let column = if self.policy.needs_column() {
            Some(record.weight.ok_or(Error::MissingColumn {
                record: self.counts.read,
                column: "weight",
            })?)
        } else {
            None
        };

        let Some(cell) = self.indexer.locate(record.x, record.y) else {
            return Ok(false);
        };
        let Some(weighting) = self.policy.weigh(column) else {
            self.counts.rejected += 1;
            return Ok(false);
        };

        self.estimator.accumulate(BlockPoint {
            node: cell.node,
            x: cell.x,
            y: record.y,
            z: record.z,
            weight: weighting.weight,
            position_weight: weighting.position_weight,
            error_term: weighting.error_term,
            source_id: record.source_id.unwrap_or(self.counts.read),
        });
        self.counts.used += 1;
        Ok(true)
    }

    /// Offer every record of an iterator
    pub fn extend<I>(&mut self, records: I) -> Result<()>
    where
        I: IntoIterator<Item = PointRecord>,
    {
        for record in records {
            self.push(&record)?;
        }
        Ok(())
    }

    pub fn counts(&self) -> BlockCounts {
        self.counts
    }

    /// Finalize every occupied cell
    pub fn finish(self) -> Result<BlockSummary> {
        let counts = self.counts;
        let layout = self.estimator.layout();
        let grid = *self.indexer.grid();

        if counts.used == 0 {
            warn!("no points fell inside the grid, output will be empty");
        }
        let records = self.estimator.finalize()?;
        info!(
            "{} points read, {} used, {} outside, {} rejected weights, {} cells filled",
            counts.read,
            counts.used,
            counts.outside(),
            counts.rejected,
            records.len()
        );

        Ok(BlockSummary {
            grid,
            layout,
            records,
            counts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{
        BlockMean, BlockMedian, BlockMode, HistogramParams, MeanParams, MedianParams, ModeParams,
        SourceTie,
    };

    fn grid() -> GridSpec {
        GridSpec::new(0.0, 2.0, 0.0, 2.0, 1.0, 1.0).unwrap()
    }

    #[test]
    fn test_counts() {
        let grid = grid();
        let params = MeanParams {
            weights: WeightPolicy::Weights,
            ..Default::default()
        };
        let mut reducer = BlockReducer::new(&grid, BlockMean::new(&grid, params).unwrap());
        let records = [
            PointRecord::new(0.0, 0.0, 1.0).with_weight(1.0),
            PointRecord::new(0.0, 0.0, f64::NAN).with_weight(1.0),
            PointRecord::new(9.0, 0.0, 1.0).with_weight(1.0),
            PointRecord::new(1.0, 1.0, 1.0).with_weight(0.0),
        ];
        reducer.extend(records).unwrap();
        let summary = reducer.finish().unwrap();
        assert_eq!(
            summary.counts,
            BlockCounts {
                read: 3,
                used: 1,
                rejected: 1
            }
        );
        assert_eq!(summary.counts.outside(), 1);
        assert_eq!(summary.records.len(), 1);
    }

    #[test]
    fn test_infinite_z_skipped() {
        let grid = grid();
        let mut reducer = BlockReducer::new(&grid, BlockMean::new(&grid, MeanParams::default()).unwrap());
        reducer
            .extend([
                PointRecord::new(0.0, 0.0, 1.0),
                PointRecord::new(0.0, 0.0, f64::INFINITY),
                PointRecord::new(0.0, 0.0, f64::NEG_INFINITY),
            ])
            .unwrap();
        let summary = reducer.finish().unwrap();
        assert_eq!(
            summary.counts,
            BlockCounts {
                read: 1,
                used: 1,
                rejected: 0
            }
        );
        assert_eq!(summary.records[0].z, 1.0);

        let params = ModeParams {
            histogram: Some(HistogramParams::default()),
            ..Default::default()
        };
        let mut reducer = BlockReducer::new(&grid, BlockMode::new(&grid, params).unwrap());
        reducer
            .extend([
                PointRecord::new(0.0, 0.0, 1.0),
                PointRecord::new(0.0, 0.0, 2.0),
                PointRecord::new(0.0, 0.0, 2.0),
                PointRecord::new(0.0, 0.0, f64::INFINITY),
            ])
            .unwrap();
        let summary = reducer.finish().unwrap();
        assert_eq!(summary.counts.used, 3);
        assert_eq!(summary.records[0].z, 2.0);
    }

    #[test]
    fn test_missing_weight_column() {
        let grid = grid();
        let params = MeanParams {
            weights: WeightPolicy::Weights,
            ..Default::default()
        };
        let mut reducer = BlockReducer::new(&grid, BlockMean::new(&grid, params).unwrap());
        let err = reducer.push(&PointRecord::new(0.0, 0.0, 1.0)).unwrap_err();
        assert!(matches!(err, Error::MissingColumn { record: 1, .. }));
    }

    #[test]
    fn test_default_source_ids_skip_nan() {
        let grid = grid();
        let params = MedianParams {
            source: Some(SourceTie::Low),
            ..Default::default()
        };
        let mut reducer = BlockReducer::new(&grid, BlockMedian::new(&grid, params).unwrap());
        reducer
            .extend([
                PointRecord::new(0.0, 2.0, f64::NAN),
                PointRecord::new(0.0, 2.0, 5.0),
                PointRecord::new(2.0, 0.0, 7.0).with_source_id(99),
            ])
            .unwrap();
        let summary = reducer.finish().unwrap();
        let ids: Vec<_> = summary.records.iter().map(|r| r.source_id).collect();
        assert_eq!(ids, vec![Some(1), Some(99)]);
    }

    #[test]
    fn test_rasters_reject_missing_fields() {
        let grid = grid();
        let mut reducer = BlockReducer::new(&grid, BlockMean::new(&grid, MeanParams::default()).unwrap());
        reducer.push(&PointRecord::new(1.0, 1.0, 4.0)).unwrap();
        let summary = reducer.finish().unwrap();

        let rasters = summary.rasters(&[BlockField::Z]).unwrap();
        assert_eq!(rasters[0].get(1, 1).unwrap(), 4.0);
        assert_eq!(rasters[0].statistics().valid_count, 1);
        assert!(summary.rasters(&[BlockField::Scale]).is_err());
    }
}
