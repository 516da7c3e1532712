//! Block median: weighted quantiles of each cell
//!
//! Points are stored, sorted by cell and z, and every cell is reduced on
//! its own, in parallel when the `parallel` feature is on.

use blockstat_core::{Error, GridSpec, Result};
use tracing::debug;

use crate::maybe_rayon::*;

use super::buffer::{Axis, PointBuffer, SortRecord, sort_run};
use super::record::{BlockRecord, RecordLayout, SourceTie, Spread, SpreadKind};
use super::robust::scaled_mad;
use super::weight::WeightPolicy;
use super::{BlockEstimator, BlockPoint};

/// Extended statistics for the median
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuantileSpread {
    /// `scale low high`, scale being the scaled MAD about the reported value
    L1,
    /// `low q25 q75 high`; the reported z is the median
    BoxWhisker,
}

/// Reported cell location
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QuantileLocation {
    /// Weighted quantiles of x and y taken independently
    #[default]
    Quantile,
    /// x and y of the record(s) that gave the z quantile
    Quick,
    /// The cell's node
    CellCenter,
}

/// Parameters for [`BlockMedian`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MedianParams {
    pub weights: WeightPolicy,
    /// Quantile in (0, 1); 0.5 is the median
    pub quantile: f64,
    pub spread: Option<QuantileSpread>,
    /// Report a source id, breaking straddles as given
    pub source: Option<SourceTie>,
    pub location: QuantileLocation,
    pub report_weight: bool,
}

impl Default for MedianParams {
    fn default() -> Self {
        Self {
            weights: WeightPolicy::Unweighted,
            quantile: 0.5,
            spread: None,
            source: None,
            location: QuantileLocation::Quantile,
            report_weight: false,
        }
    }
}

impl MedianParams {
    /// Check the quantile and weight policy
    pub fn validate(&self) -> Result<()> {
        if !(self.quantile > 0.0 && self.quantile < 1.0) {
            return Err(Error::invalid("quantile", self.quantile, "must lie in (0, 1)"));
        }
        check_sort_weights(self.weights)
    }
}

/// Sigma-only policies make sense for means alone
pub(crate) fn check_sort_weights(weights: WeightPolicy) -> Result<()> {
    match weights {
        WeightPolicy::SimpleMeanSigma | WeightPolicy::LegacyInverseVariance => Err(Error::invalid(
            "weights",
            format!("{weights:?}"),
            "only supported by the block mean",
        )),
        _ => Ok(()),
    }
}

/// Where a weighted quantile falls in a sorted run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct QuantileHit {
    pub index: usize,
    /// The cumulative weight hit the target exactly; the quantile lies
    /// halfway between `index` and `index + 1`
    pub straddle: bool,
}

/// Walk the cumulative weights of a non-empty run until they reach
/// `q · weight_sum`.
pub(crate) fn locate_quantile(run: &[SortRecord], weight_sum: f64, q: f64) -> QuantileHit {
    let target = q * weight_sum;
    let last = run.len() - 1;
    let mut index = 0;
    let mut cumulative = run[0].weight;
    while cumulative < target && index < last {
        index += 1;
        cumulative += run[index].weight;
    }
    QuantileHit {
        index,
        straddle: cumulative == target && index < last,
    }
}

pub(crate) fn hit_value(run: &[SortRecord], hit: QuantileHit, axis: Axis) -> f64 {
    if hit.straddle {
        0.5 * (run[hit.index].coord(axis) + run[hit.index + 1].coord(axis))
    } else {
        run[hit.index].coord(axis)
    }
}

/// Source id of a z quantile.
///
/// On a straddle `High` picks the record with the larger z and `Low` the
/// smaller. When both z are equal the choice flips: `Low` takes the later
/// record and `High` the earlier one.
pub(crate) fn hit_source(run: &[SortRecord], hit: QuantileHit, tie: SourceTie) -> u64 {
    if !hit.straddle {
        return run[hit.index].source_id;
    }
    let (current, next) = (&run[hit.index], &run[hit.index + 1]);
    let equal = current.z == next.z;
    let pick = match (tie, equal) {
        (SourceTie::High, true) | (SourceTie::Low, false) => current,
        (SourceTie::High, false) | (SourceTie::Low, true) => next,
    };
    pick.source_id
}

/// Weighted quantile estimator
#[derive(Debug)]
pub struct BlockMedian {
    grid: GridSpec,
    params: MedianParams,
    buffer: PointBuffer,
}

impl BlockMedian {
    pub fn new(grid: &GridSpec, params: MedianParams) -> Result<Self> {
        params.validate()?;
        Ok(Self {
            grid: *grid,
            params,
            buffer: PointBuffer::new(),
        })
    }

    fn quantiles(&self) -> (Vec<f64>, usize) {
        match self.params.spread {
            Some(QuantileSpread::BoxWhisker) => (vec![0.25, 0.5, 0.75], 1),
            _ => (vec![self.params.quantile], 0),
        }
    }
}

fn median_cell(
    run: &mut [SortRecord],
    grid: &GridSpec,
    params: &MedianParams,
    quantiles: &[f64],
    reported: usize,
) -> BlockRecord {
    let node = run[0].node;
    let last = run.len() - 1;
    let weight_sum: f64 = run.iter().map(|r| r.weight).sum();

    let hits: Vec<QuantileHit> = quantiles
        .iter()
        .map(|&q| locate_quantile(run, weight_sum, q))
        .collect();
    let z_hit = hits[reported];
    let z = hit_value(run, z_hit, Axis::Z);
    let source_id = params.source.map(|tie| hit_source(run, z_hit, tie));

    let (low, high) = (run[0].z, run[last].z);
    let spread = params.spread.map(|kind| match kind {
        QuantileSpread::L1 => Spread::Scale {
            scale: scaled_mad(run.iter().map(|r| r.z), z),
            low,
            high,
        },
        QuantileSpread::BoxWhisker => Spread::Quartiles {
            low,
            q25: hit_value(run, hits[0], Axis::Z),
            q75: hit_value(run, hits[2], Axis::Z),
            high,
        },
    });

    let (x, y) = match params.location {
        QuantileLocation::CellCenter => grid.cell_center(node),
        QuantileLocation::Quick => (hit_value(run, z_hit, Axis::X), hit_value(run, z_hit, Axis::Y)),
        QuantileLocation::Quantile => {
            let q = quantiles[reported];
            sort_run(run, Axis::X);
            let x = hit_value(run, locate_quantile(run, weight_sum, q), Axis::X);
            sort_run(run, Axis::Y);
            let y = hit_value(run, locate_quantile(run, weight_sum, q), Axis::Y);
            (x, y)
        }
    };

    BlockRecord {
        node,
        x,
        y,
        z,
        spread,
        weight: params.report_weight.then_some(weight_sum),
        source_id,
    }
}

impl BlockEstimator for BlockMedian {
    fn name(&self) -> &'static str {
        "block median"
    }

    fn weight_policy(&self) -> WeightPolicy {
        self.params.weights
    }

    fn layout(&self) -> RecordLayout {
        RecordLayout {
            spread: match self.params.spread {
                None => SpreadKind::None,
                Some(QuantileSpread::L1) => SpreadKind::Scale,
                Some(QuantileSpread::BoxWhisker) => SpreadKind::Quartiles,
            },
            weight: self.params.report_weight,
            source_id: self.params.source.is_some(),
        }
    }

    fn accumulate(&mut self, point: BlockPoint) {
        self.buffer.push(&point);
    }

    fn finalize(mut self) -> Result<Vec<BlockRecord>> {
        debug!(
            "block median: {} points, {:.1} MiB buffered",
            self.buffer.len(),
            self.buffer.memory_bytes() as f64 / (1024.0 * 1024.0)
        );
        let (quantiles, reported) = self.quantiles();
        let (grid, params) = (self.grid, self.params);
        let cells = self.buffer.cells_mut();
        Ok(cells
            .into_par_iter()
            .map(|run| median_cell(run, &grid, &params, &quantiles, reported))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn grid() -> GridSpec {
        GridSpec::new(0.0, 10.0, 0.0, 10.0, 10.0, 10.0).unwrap()
    }

    fn point(x: f64, y: f64, z: f64, weight: f64, source_id: u64) -> BlockPoint {
        BlockPoint {
            node: 0,
            x,
            y,
            z,
            weight,
            position_weight: weight,
            error_term: 0.0,
            source_id,
        }
    }

    fn run(params: MedianParams, points: &[(f64, f64, f64)]) -> BlockRecord {
        let mut est = BlockMedian::new(&grid(), params).unwrap();
        for (i, &(x, y, z)) in points.iter().enumerate() {
            est.accumulate(point(x, y, z, 1.0, i as u64 + 1));
        }
        let records = est.finalize().unwrap();
        assert_eq!(records.len(), 1);
        records[0]
    }

    #[test]
    fn test_odd_median() {
        let r = run(
            MedianParams::default(),
            &[(1.0, 1.0, 5.0), (2.0, 2.0, 1.0), (3.0, 3.0, 3.0)],
        );
        assert_eq!(r.z, 3.0);
        assert_eq!((r.x, r.y), (2.0, 2.0));
    }

    #[test]
    fn test_even_median_interpolates() {
        let r = run(
            MedianParams::default(),
            &[(0.0, 0.0, 1.0), (0.0, 0.0, 2.0), (0.0, 0.0, 2.0), (0.0, 0.0, 9.0)],
        );
        assert_eq!(r.z, 2.0);

        let r = run(
            MedianParams::default(),
            &[(0.0, 0.0, 1.0), (0.0, 0.0, 3.0)],
        );
        assert_eq!(r.z, 2.0);
    }

    #[test]
    fn test_weighted_median() {
        let mut est = BlockMedian::new(
            &grid(),
            MedianParams {
                weights: WeightPolicy::Weights,
                report_weight: true,
                ..Default::default()
            },
        )
        .unwrap();
        est.accumulate(point(0.0, 0.0, 1.0, 1.0, 1));
        est.accumulate(point(0.0, 0.0, 2.0, 1.0, 2));
        est.accumulate(point(0.0, 0.0, 10.0, 5.0, 3));
        let r = est.finalize().unwrap()[0];
        assert_eq!(r.z, 10.0);
        assert_eq!(r.weight, Some(7.0));
    }

    #[test]
    fn test_box_whisker() {
        let r = run(
            MedianParams {
                spread: Some(QuantileSpread::BoxWhisker),
                ..Default::default()
            },
            &[(0.0, 0.0, 1.0), (0.0, 0.0, 2.0), (0.0, 0.0, 3.0), (0.0, 0.0, 4.0), (0.0, 0.0, 5.0)],
        );
        assert_eq!(r.z, 3.0);
        match r.spread {
            Some(Spread::Quartiles { low, q25, q75, high }) => {
                assert_eq!((low, q25, q75, high), (1.0, 2.0, 4.0, 5.0));
            }
            other => panic!("unexpected spread {other:?}"),
        }
    }

    #[test]
    fn test_l1_scale() {
        let r = run(
            MedianParams {
                spread: Some(QuantileSpread::L1),
                ..Default::default()
            },
            &[(0.0, 0.0, 1.0), (0.0, 0.0, 2.0), (0.0, 0.0, 2.0), (0.0, 0.0, 9.0)],
        );
        match r.spread {
            Some(Spread::Scale { scale, low, high }) => {
                assert_relative_eq!(scale, 0.5 * 1.4826);
                assert_eq!((low, high), (1.0, 9.0));
            }
            other => panic!("unexpected spread {other:?}"),
        }
    }

    #[test]
    fn test_source_tie_rule() {
        let points = [(0.0, 0.0, 1.0), (0.0, 0.0, 3.0)];
        let low = run(
            MedianParams {
                source: Some(SourceTie::Low),
                ..Default::default()
            },
            &points,
        );
        assert_eq!(low.source_id, Some(1));
        let high = run(
            MedianParams {
                source: Some(SourceTie::High),
                ..Default::default()
            },
            &points,
        );
        assert_eq!(high.source_id, Some(2));
    }

    #[test]
    fn test_source_tie_on_equal_z() {
        let points = [(0.0, 0.0, 4.0), (0.0, 0.0, 4.0)];
        let low = run(
            MedianParams {
                source: Some(SourceTie::Low),
                ..Default::default()
            },
            &points,
        );
        assert_eq!(low.source_id, Some(2));
        let high = run(
            MedianParams {
                source: Some(SourceTie::High),
                ..Default::default()
            },
            &points,
        );
        assert_eq!(high.source_id, Some(1));
    }

    #[test]
    fn test_quick_location() {
        let r = run(
            MedianParams {
                location: QuantileLocation::Quick,
                ..Default::default()
            },
            &[(1.0, 9.0, 5.0), (2.0, 8.0, 1.0), (3.0, 7.0, 3.0)],
        );
        assert_eq!((r.x, r.y), (3.0, 7.0));
    }

    #[test]
    fn test_lower_quantile() {
        let r = run(
            MedianParams {
                quantile: 0.25,
                ..Default::default()
            },
            &[(0.0, 0.0, 1.0), (0.0, 0.0, 2.0), (0.0, 0.0, 3.0), (0.0, 0.0, 4.0)],
        );
        assert_eq!(r.z, 1.5);
    }

    #[test]
    fn test_invalid_params() {
        let bad_q = MedianParams {
            quantile: 1.0,
            ..Default::default()
        };
        assert!(BlockMedian::new(&grid(), bad_q).is_err());
        let bad_w = MedianParams {
            weights: WeightPolicy::SimpleMeanSigma,
            ..Default::default()
        };
        assert!(BlockMedian::new(&grid(), bad_w).is_err());
    }
}
