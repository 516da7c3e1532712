//! Block mean: weighted averages accumulated per cell
//!
//! Sums are kept in dense per-node arrays, so no point is stored. Optional
//! arrays for positions and second moments are only allocated when the
//! chosen output needs them.

use blockstat_core::{Error, GridSpec, Result};
use tracing::debug;

use super::record::{BlockRecord, RecordLayout, Spread, SpreadKind};
use super::weight::WeightPolicy;
use super::{BlockEstimator, BlockPoint};

/// Value reported in the z column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MeanReport {
    /// Weighted mean `Σwz / Σw`
    #[default]
    Mean,
    /// Weighted sum `Σwz`
    Sum,
    /// Sum of weights `Σw`
    WeightSum,
    /// Number of points (weights ignored)
    Count,
}

/// Scale estimate reported with [`MeanParams::dispersion`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispersion {
    /// Weighted standard deviation of z
    StdDev,
    /// Error of the mean propagated from per-record sigmas
    PropagatedError,
}

/// Reported cell location
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MeanLocation {
    /// Weighted mean position of the points
    #[default]
    Mean,
    /// The cell's node
    CellCenter,
}

/// Parameters for [`BlockMean`]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MeanParams {
    pub weights: WeightPolicy,
    pub report: MeanReport,
    pub location: MeanLocation,
    /// Report `scale low high` after z
    pub dispersion: Option<Dispersion>,
    /// Report the cell weight sum
    pub report_weight: bool,
}

impl MeanParams {
    /// Check parameter combinations
    pub fn validate(&self) -> Result<()> {
        if self.dispersion == Some(Dispersion::PropagatedError) && !self.weights.propagates_error() {
            return Err(Error::invalid(
                "dispersion",
                "propagated error",
                "requires sigma or inverse-variance weights",
            ));
        }
        Ok(())
    }
}

#[derive(Debug)]
struct PositionSums {
    x: Vec<f64>,
    y: Vec<f64>,
    weight: Vec<f64>,
}

#[derive(Debug)]
struct MomentSums {
    second: Vec<f64>,
    low: Vec<f64>,
    high: Vec<f64>,
    error: Vec<f64>,
}

/// Weighted mean estimator
#[derive(Debug)]
pub struct BlockMean {
    grid: GridSpec,
    params: MeanParams,
    z_sum: Vec<f64>,
    weight_sum: Vec<f64>,
    count: Vec<u64>,
    position: Option<PositionSums>,
    moments: Option<MomentSums>,
}

impl BlockMean {
    pub fn new(grid: &GridSpec, params: MeanParams) -> Result<Self> {
        let mut params = params;
        if params.report == MeanReport::Count && params.weights != WeightPolicy::Unweighted {
            debug!("counting points, weights are ignored");
            params.weights = WeightPolicy::Unweighted;
        }
        params.validate()?;

        let n = grid.n_cells();
        let position = (params.location == MeanLocation::Mean).then(|| PositionSums {
            x: vec![0.0; n],
            y: vec![0.0; n],
            weight: vec![0.0; n],
        });
        let moments = params.dispersion.map(|_| MomentSums {
            second: vec![0.0; n],
            low: vec![f64::INFINITY; n],
            high: vec![f64::NEG_INFINITY; n],
            error: vec![0.0; n],
        });

        let arrays = 3 + 3 * usize::from(position.is_some()) + 4 * usize::from(moments.is_some());
        debug!(
            "block mean accumulators: {} cells, {:.1} MiB",
            n,
            (arrays * n * 8) as f64 / (1024.0 * 1024.0)
        );

        Ok(Self {
            grid: *grid,
            params,
            z_sum: vec![0.0; n],
            weight_sum: vec![0.0; n],
            count: vec![0; n],
            position,
            moments,
        })
    }

    fn record(&self, node: usize) -> BlockRecord {
        let w_sum = self.weight_sum[node];
        let z_sum = self.z_sum[node];
        let n = self.count[node];

        let z = match self.params.report {
            MeanReport::Mean => z_sum / w_sum,
            MeanReport::Sum => z_sum,
            MeanReport::WeightSum => w_sum,
            MeanReport::Count => n as f64,
        };
        let (x, y) = match &self.position {
            Some(pos) => (pos.x[node] / pos.weight[node], pos.y[node] / pos.weight[node]),
            None => self.grid.cell_center(node),
        };

        let mut record = BlockRecord::new(node, x, y, z);
        if let (Some(m), Some(dispersion)) = (&self.moments, self.params.dispersion) {
            let scale = match dispersion {
                Dispersion::StdDev => std_dev(
                    w_sum,
                    z_sum,
                    m.second[node],
                    n,
                    self.params.weights.has_variable_weights(),
                ),
                Dispersion::PropagatedError => self.params.weights.propagated_error(m.error[node], n),
            };
            record.spread = Some(Spread::Scale {
                scale,
                low: m.low[node],
                high: m.high[node],
            });
        }
        if self.params.report_weight {
            record.weight = Some(w_sum);
        }
        record
    }
}

/// Standard deviation from weighted sums.
///
/// With variable weights the weighted sample formula
/// `sqrt((W·S − Z²) / (W²·(n−1)/n))` is used (NaN for one point); with
/// unit weights `sqrt((W·S − Z²) / (W·(W−1)))` (NaN when `W ≤ 1`).
fn std_dev(w_sum: f64, z_sum: f64, second: f64, n: u64, variable_weights: bool) -> f64 {
    let numerator = (w_sum * second - z_sum * z_sum).max(0.0);
    if variable_weights {
        if n < 2 {
            return f64::NAN;
        }
        let nf = n as f64;
        (numerator / (w_sum * w_sum * ((nf - 1.0) / nf))).sqrt()
    } else if w_sum <= 1.0 {
        f64::NAN
    } else {
        (numerator / (w_sum * (w_sum - 1.0))).sqrt()
    }
}

impl BlockEstimator for BlockMean {
    fn name(&self) -> &'static str {
        "block mean"
    }

    fn weight_policy(&self) -> WeightPolicy {
        self.params.weights
    }

    fn layout(&self) -> RecordLayout {
        RecordLayout {
            spread: if self.params.dispersion.is_some() {
                SpreadKind::Scale
            } else {
                SpreadKind::None
            },
            weight: self.params.report_weight,
            source_id: false,
        }
    }

    fn accumulate(&mut self, point: BlockPoint) {
        let node = point.node;
        let w = point.weight;
        self.z_sum[node] += w * point.z;
        self.weight_sum[node] += w;
        self.count[node] += 1;

        if let Some(pos) = &mut self.position {
            let pw = point.position_weight;
            pos.x[node] += pw * point.x;
            pos.y[node] += pw * point.y;
            pos.weight[node] += pw;
        }
        if let Some(m) = &mut self.moments {
            m.second[node] += w * point.z * point.z;
            m.low[node] = m.low[node].min(point.z);
            m.high[node] = m.high[node].max(point.z);
            m.error[node] += point.error_term;
        }
    }

    fn finalize(self) -> Result<Vec<BlockRecord>> {
        Ok(self
            .count
            .iter()
            .enumerate()
            .filter(|&(_, &n)| n > 0)
            .map(|(node, _)| self.record(node))
            .collect())
    }
}
