//! Block mode: most probable value of each cell
//!
//! Two estimators are offered. The continuous one takes the midpoint of
//! the narrowest z interval holding half the cell's weight (a weighted
//! shortest half). The histogram one bins z with a fixed width and reports
//! the center of the heaviest bin.

use std::collections::BTreeMap;

use blockstat_core::{Error, GridSpec, Result};
use tracing::{debug, info, warn};

use crate::maybe_rayon::*;

use super::buffer::{Axis, PointBuffer, SortRecord, sort_run};
use super::quantile::check_sort_weights;
use super::record::{BlockRecord, RecordLayout, SourceTie, Spread, SpreadKind};
use super::robust::{almost_equal, is_integral, scaled_mad};
use super::weight::WeightPolicy;
use super::{BlockEstimator, BlockPoint};

/// Which of several equally heavy histogram bins is reported
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeTie {
    Low,
    Average,
    High,
}

/// Histogram settings; `None` fields take data-driven defaults
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct HistogramParams {
    /// Bin width; defaults to 1 for integer data
    pub width: Option<f64>,
    /// Center bins on multiples of the width
    pub centered: bool,
    pub tie: Option<ModeTie>,
}

/// Reported cell location
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ModeLocation {
    /// Modes of x and y taken independently
    Mode,
    /// Mean position of the points
    #[default]
    Mean,
    /// The cell's node
    CellCenter,
}

/// Parameters for [`BlockMode`]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ModeParams {
    pub weights: WeightPolicy,
    /// Use a histogram instead of the continuous estimator
    pub histogram: Option<HistogramParams>,
    /// Report `scale low high`, scale being the scaled MAD about the mode
    pub extended: bool,
    pub source: Option<SourceTie>,
    pub location: ModeLocation,
    pub report_weight: bool,
}

impl ModeParams {
    pub fn validate(&self) -> Result<()> {
        check_sort_weights(self.weights)?;
        if let Some(histogram) = &self.histogram {
            if let Some(width) = histogram.width
                && !(width.is_finite() && width > 0.0)
            {
                return Err(Error::invalid("bin width", width, "must be positive"));
            }
            if self.source.is_some() {
                return Err(Error::invalid(
                    "source",
                    "histogram mode",
                    "source ids are not available with the histogram estimator",
                ));
            }
        }
        Ok(())
    }
}

/// Resolved histogram bin layout
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Histogram {
    pub width: f64,
    /// Added to `z / width` before flooring
    input_offset: f64,
    /// Added to the bin number to get its center in width units
    output_offset: f64,
    pub tie: ModeTie,
}

impl Histogram {
    /// Resolve the bin layout once all z values are known.
    ///
    /// Integer data get a default width of 1; an integral width on integer
    /// data centers the bins and defaults the tie rule to `Low`. Non-integer
    /// data without a width are an error.
    pub fn setup(params: &HistogramParams, integral: bool) -> Result<Self> {
        let mut centered = params.centered;
        let mut tie = params.tie;
        let width = match (params.width, integral) {
            (Some(width), _) => width,
            (None, true) => {
                info!("integer data and no bin width given, using a width of 1");
                1.0
            }
            (None, false) => {
                return Err(Error::invalid(
                    "bin width",
                    "none",
                    "data are not integers, a bin width must be given",
                ));
            }
        };
        if integral && is_integral(width) {
            centered = true;
            tie.get_or_insert(ModeTie::Low);
        }

        let (input_offset, output_offset) = if centered { (0.5, 0.0) } else { (0.0, 0.5) };
        let histogram = Self {
            width,
            input_offset,
            output_offset,
            tie: tie.unwrap_or(ModeTie::Average),
        };
        debug!(
            "histogram: width {}, centered {}, tie {:?}",
            histogram.width, centered, histogram.tie
        );
        Ok(histogram)
    }

    #[inline]
    pub fn bin(&self, z: f64) -> i64 {
        (z / self.width + self.input_offset).floor() as i64
    }

    #[inline]
    pub fn center(&self, bin: i64) -> f64 {
        (bin as f64 + self.output_offset) * self.width
    }

    /// Center of the heaviest bin of a non-empty run
    ///
    /// Only occupied bins are stored, so widely spread z cost nothing extra.
    pub fn mode(&self, run: &[SortRecord]) -> f64 {
        let mut counts: BTreeMap<i64, f64> = BTreeMap::new();
        for r in run {
            *counts.entry(self.bin(r.z)).or_insert(0.0) += r.weight;
        }

        let peak = counts.values().copied().fold(f64::NEG_INFINITY, f64::max);
        let tied: Vec<(i64, f64)> = counts
            .into_iter()
            .filter(|&(_, c)| c > 0.0 && almost_equal(c, peak))
            .collect();

        match (self.tie, tied.as_slice()) {
            (_, [(only, _)]) => self.center(*only),
            (ModeTie::Low, [(lowest, _), ..]) => self.center(*lowest),
            (ModeTie::High, [.., (highest, _)]) => self.center(*highest),
            _ => {
                let (sum, weight) = tied
                    .iter()
                    .fold((0.0, 0.0), |(s, w), &(bin, c)| (s + c * self.center(bin), w + c));
                sum / weight
            }
        }
    }
}

/// Continuous mode and the record it is attributed to
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct ModePick {
    pub value: f64,
    pub source_id: u64,
}

impl ModePick {
    fn at(record: &SortRecord, axis: Axis) -> Self {
        Self {
            value: record.coord(axis),
            source_id: record.source_id,
        }
    }
}

/// Source id of the middle record of `run[i..=j]`
fn middle_source(run: &[SortRecord], i: usize, j: usize, tie: SourceTie) -> u64 {
    let len = j - i + 1;
    let mid = i + len / 2;
    if len % 2 == 1 || tie == SourceTie::High {
        run[mid].source_id
    } else {
        run[mid - 1].source_id
    }
}

/// Weighted shortest-half mode of a run with more than two records,
/// sorted along `axis`.
///
/// A single record holding at least half the weight is the mode. Equally
/// spaced values give the middle value. Otherwise the densest interval
/// reaching half the weight wins; among equally dense ones the first is
/// kept, or the last when `tie` is `High`.
pub(crate) fn shortest_half(run: &[SortRecord], axis: Axis, weight_sum: f64, tie: SourceTie) -> ModePick {
    let n = run.len();
    let half = 0.5 * weight_sum;

    if let Some(spike) = run.iter().find(|r| r.weight >= half) {
        return ModePick::at(spike, axis);
    }

    let first_gap = run[1].coord(axis) - run[0].coord(axis);
    let equidistant = run
        .windows(2)
        .all(|w| almost_equal(w[1].coord(axis) - w[0].coord(axis), first_gap));
    if equidistant {
        let mid = n / 2;
        if n % 2 == 1 {
            return ModePick::at(&run[mid], axis);
        }
        return ModePick {
            value: 0.5 * (run[mid - 1].coord(axis) + run[mid].coord(axis)),
            source_id: middle_source(run, 0, n - 1, tie),
        };
    }

    let mut best = (0, n - 1);
    let mut peak = 0.0;
    let mut top = 0.0;
    let mut i = 0;
    for j in 0..n {
        top += run[j].weight;
        if top < half {
            continue;
        }
        while i < j && top - run[i].weight >= half {
            top -= run[i].weight;
            i += 1;
        }
        let width = run[j].coord(axis) - run[i].coord(axis);
        if width == 0.0 {
            return ModePick::at(&run[i], axis);
        }
        let density = top / width;
        if almost_equal(density, peak) {
            if tie == SourceTie::High {
                best = (i, j);
            }
        } else if density > peak {
            peak = density;
            best = (i, j);
        }
    }

    let (i, j) = best;
    ModePick {
        value: 0.5 * (run[i].coord(axis) + run[j].coord(axis)),
        source_id: middle_source(run, i, j, tie),
    }
}

/// Mode of exactly two records: the heavier one, or their midpoint
fn two_point_mode(run: &[SortRecord], tie: SourceTie) -> (f64, u64, (f64, f64)) {
    let (a, b) = (&run[0], &run[1]);
    if a.weight > b.weight {
        (a.z, a.source_id, (a.x, a.y))
    } else if a.weight < b.weight {
        (b.z, b.source_id, (b.x, b.y))
    } else {
        let source_id = match tie {
            SourceTie::Low => a.source_id,
            SourceTie::High => b.source_id,
        };
        (
            0.5 * (a.z + b.z),
            source_id,
            (0.5 * (a.x + b.x), 0.5 * (a.y + b.y)),
        )
    }
}

/// Weighted mode estimator
#[derive(Debug)]
pub struct BlockMode {
    grid: GridSpec,
    params: ModeParams,
    buffer: PointBuffer,
}

impl BlockMode {
    pub fn new(grid: &GridSpec, params: ModeParams) -> Result<Self> {
        params.validate()?;
        let mut params = params;
        if params.histogram.is_some() && params.location == ModeLocation::Mode {
            warn!("histogram mode reports mean locations");
            params.location = ModeLocation::Mean;
        }
        Ok(Self {
            grid: *grid,
            params,
            buffer: PointBuffer::new(),
        })
    }
}

fn mode_cell(
    run: &mut [SortRecord],
    grid: &GridSpec,
    params: &ModeParams,
    histogram: Option<&Histogram>,
) -> BlockRecord {
    let node = run[0].node;
    let n = run.len();
    let tie = params.source.unwrap_or_default();
    let weight_sum: f64 = run.iter().map(|r| r.weight).sum();
    let mean_xy = {
        let (sx, sy) = run.iter().fold((0.0, 0.0), |(sx, sy), r| (sx + r.x, sy + r.y));
        (sx / n as f64, sy / n as f64)
    };

    // z, its source, and the modal location when it follows from the records
    let (z, source_id, modal_xy) = match (histogram, n) {
        (Some(h), _) => (h.mode(run), run[0].source_id, None),
        (None, 1) => (run[0].z, run[0].source_id, Some((run[0].x, run[0].y))),
        (None, 2) => {
            let (z, id, xy) = two_point_mode(run, tie);
            (z, id, Some(xy))
        }
        (None, _) => {
            let pick = shortest_half(run, Axis::Z, weight_sum, tie);
            (pick.value, pick.source_id, None)
        }
    };

    let spread = params.extended.then(|| Spread::Scale {
        scale: scaled_mad(run.iter().map(|r| r.z), z),
        low: run[0].z,
        high: run[n - 1].z,
    });

    let (x, y) = match (params.location, modal_xy) {
        (ModeLocation::CellCenter, _) => grid.cell_center(node),
        (ModeLocation::Mean, _) => mean_xy,
        (ModeLocation::Mode, Some(xy)) => xy,
        (ModeLocation::Mode, None) => {
            sort_run(run, Axis::X);
            let x = shortest_half(run, Axis::X, weight_sum, tie).value;
            sort_run(run, Axis::Y);
            let y = shortest_half(run, Axis::Y, weight_sum, tie).value;
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
        source_id: params.source.map(|_| source_id),
    }
}

impl BlockEstimator for BlockMode {
    fn name(&self) -> &'static str {
        "block mode"
    }

    fn weight_policy(&self) -> WeightPolicy {
        self.params.weights
    }

    fn layout(&self) -> RecordLayout {
        RecordLayout {
            spread: if self.params.extended {
                SpreadKind::Scale
            } else {
                SpreadKind::None
            },
            weight: self.params.report_weight,
            source_id: self.params.source.is_some(),
        }
    }

    fn accumulate(&mut self, point: BlockPoint) {
        self.buffer.push(&point);
    }

    fn finalize(mut self) -> Result<Vec<BlockRecord>> {
        let histogram = match &self.params.histogram {
            Some(hp) => Some(Histogram::setup(hp, self.buffer.all_integral())?),
            None => None,
        };
        debug!(
            "block mode: {} points, {:.1} MiB buffered",
            self.buffer.len(),
            self.buffer.memory_bytes() as f64 / (1024.0 * 1024.0)
        );

        let (grid, params) = (self.grid, self.params);
        let cells = self.buffer.cells_mut();
        Ok(cells
            .into_par_iter()
            .map(|run| mode_cell(run, &grid, &params, histogram.as_ref()))
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

    fn record(z: f64, weight: f64, source_id: u64) -> SortRecord {
        SortRecord {
            node: 0,
            x: z,
            y: -z,
            z,
            weight,
            source_id,
        }
    }

    fn reduce(params: ModeParams, zs: &[f64]) -> Result<BlockRecord> {
        let mut est = BlockMode::new(&grid(), params)?;
        for (i, &z) in zs.iter().enumerate() {
            est.accumulate(BlockPoint {
                node: 0,
                x: z,
                y: -z,
                z,
                weight: 1.0,
                position_weight: 1.0,
                error_term: 0.0,
                source_id: i as u64 + 1,
            });
        }
        Ok(est.finalize()?[0])
    }

    #[test]
    fn test_continuous_mode_of_cluster() {
        let r = reduce(ModeParams::default(), &[1.0, 2.0, 2.0, 9.0]).unwrap();
        assert_eq!(r.z, 2.0);
        // mean position by default
        assert_relative_eq!(r.x, 3.5);
        assert_relative_eq!(r.y, -3.5);

        let params = ModeParams {
            location: ModeLocation::Mode,
            ..Default::default()
        };
        let r = reduce(params, &[1.0, 2.0, 2.0, 9.0]).unwrap();
        // modes of x and of y, which mirror z here
        assert_eq!((r.x, r.y), (2.0, -2.0));
    }

    #[test]
    fn test_spike_wins() {
        let run = [record(1.0, 1.0, 1), record(5.0, 4.0, 2), record(6.0, 1.0, 3)];
        let pick = shortest_half(&run, Axis::Z, 6.0, SourceTie::Low);
        assert_eq!(pick.value, 5.0);
        assert_eq!(pick.source_id, 2);
    }

    #[test]
    fn test_equidistant_midpoint() {
        let run: Vec<_> = (0..4).map(|i| record(i as f64, 1.0, i + 1)).collect();
        let low = shortest_half(&run, Axis::Z, 4.0, SourceTie::Low);
        assert_eq!(low.value, 1.5);
        assert_eq!(low.source_id, 2);
        let high = shortest_half(&run, Axis::Z, 4.0, SourceTie::High);
        assert_eq!(high.source_id, 3);

        let odd: Vec<_> = (0..5).map(|i| record(i as f64, 1.0, i + 1)).collect();
        assert_eq!(shortest_half(&odd, Axis::Z, 5.0, SourceTie::Low).value, 2.0);
    }

    #[test]
    fn test_densest_interval() {
        let zs = [0.0, 10.0, 10.5, 11.0, 30.0, 60.0];
        let run: Vec<_> = zs.iter().enumerate().map(|(i, &z)| record(z, 1.0, i as u64)).collect();
        let pick = shortest_half(&run, Axis::Z, 6.0, SourceTie::Low);
        assert_relative_eq!(pick.value, 10.5);
        assert!(pick.value >= 0.0 && pick.value <= 60.0);
    }

    #[test]
    fn test_two_points() {
        let run = [record(1.0, 1.0, 1), record(3.0, 2.0, 2)];
        assert_eq!(two_point_mode(&run, SourceTie::Low).0, 3.0);

        let run = [record(1.0, 1.0, 1), record(3.0, 1.0, 2)];
        let (z, id, (x, _)) = two_point_mode(&run, SourceTie::High);
        assert_eq!((z, id, x), (2.0, 2, 2.0));
        assert_eq!(two_point_mode(&run, SourceTie::Low).1, 1);
    }

    #[test]
    fn test_histogram_integer_defaults() {
        let params = ModeParams {
            histogram: Some(HistogramParams::default()),
            ..Default::default()
        };
        let r = reduce(params, &[1.0, 2.0, 2.0, 9.0]).unwrap();
        assert_eq!(r.z, 2.0);
        // forced to the mean location
        assert_relative_eq!(r.x, 3.5);
    }

    #[test]
    fn test_histogram_setup() {
        let h = Histogram::setup(&HistogramParams::default(), true).unwrap();
        assert_eq!(h.width, 1.0);
        assert_eq!(h.tie, ModeTie::Low);
        assert_eq!(h.bin(2.0), 2);
        assert_eq!(h.center(2), 2.0);

        let params = HistogramParams {
            width: Some(0.5),
            ..Default::default()
        };
        let h = Histogram::setup(&params, false).unwrap();
        assert_eq!(h.tie, ModeTie::Average);
        assert_eq!(h.bin(0.6), 1);
        assert_eq!(h.center(1), 0.75);

        assert!(Histogram::setup(&HistogramParams::default(), false).is_err());
    }

    #[test]
    fn test_histogram_ties() {
        let run = [record(1.0, 1.0, 1), record(3.0, 1.0, 2)];
        let mut h = Histogram::setup(&HistogramParams::default(), true).unwrap();
        assert_eq!(h.mode(&run), 1.0);
        h.tie = ModeTie::High;
        assert_eq!(h.mode(&run), 3.0);
        h.tie = ModeTie::Average;
        assert_eq!(h.mode(&run), 2.0);
    }

    #[test]
    fn test_histogram_far_apart_values() {
        let params = ModeParams {
            histogram: Some(HistogramParams::default()),
            ..Default::default()
        };
        let r = reduce(params, &[0.0, 1.0, 1.0, 1e18]).unwrap();
        assert_eq!(r.z, 1.0);
    }

    #[test]
    fn test_histogram_rejects_source() {
        let params = ModeParams {
            histogram: Some(HistogramParams::default()),
            source: Some(SourceTie::Low),
            ..Default::default()
        };
        assert!(BlockMode::new(&grid(), params).is_err());
    }

    #[test]
    fn test_histogram_needs_width_for_real_data() {
        let params = ModeParams {
            histogram: Some(HistogramParams::default()),
            ..Default::default()
        };
        assert!(reduce(params, &[0.5, 1.25]).is_err());
    }

    #[test]
    fn test_extended_mad() {
        let params = ModeParams {
            extended: true,
            ..Default::default()
        };
        let r = reduce(params, &[1.0, 2.0, 2.0, 9.0]).unwrap();
        match r.spread {
            Some(Spread::Scale { scale, low, high }) => {
                assert_relative_eq!(scale, 0.5 * 1.4826);
                assert_eq!((low, high), (1.0, 9.0));
            }
            other => panic!("unexpected spread {other:?}"),
        }
    }
}
