//! blockstat CLI - block mean, median and mode of (x, y, z) tables

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, Level};
use tracing_subscriber::FmtSubscriber;

use blockstat_algorithms::block::{
    BlockEstimator, BlockField, BlockMethod, BlockReducer, BlockSummary, Dispersion, Estimator,
    HistogramParams, MeanLocation, MeanParams, MeanReport, MedianParams, ModeLocation, ModeParams,
    ModeTie, QuantileLocation, QuantileSpread, SourceTie, WeightPolicy,
};
use blockstat_core::io::{write_geotiff, write_rows, GeoTiffOptions, PointReader, TableLayout};
use blockstat_core::{GridSpec, Registration};

// ─── CLI structure ──────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "blockstat")]
#[command(author, version, about = "Block averaging of scattered (x, y, z) data", long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Weighted mean (or sum, weight sum, count) per cell
    Mean {
        #[command(flatten)]
        common: CommonArgs,
        /// Value written in the z column
        #[arg(short = 'S', long, value_enum, default_value = "mean")]
        report: ReportArg,
        /// Append standard deviation, low and high
        #[arg(short = 'E', long, conflicts_with = "propagated_error")]
        std_dev: bool,
        /// Append propagated error, low and high (needs sigma weights)
        #[arg(long)]
        propagated_error: bool,
        /// Report cell centers instead of mean positions
        #[arg(short = 'C', long)]
        center: bool,
    },
    /// Weighted median or other quantile per cell
    Median {
        #[command(flatten)]
        common: CommonArgs,
        /// Quantile to report, in (0, 1)
        #[arg(short = 'T', long, default_value = "0.5")]
        quantile: f64,
        /// Extra statistics: l1 (MAD, low, high) or box (low, q25, q75, high)
        #[arg(short = 'E', long, value_enum)]
        spread: Option<SpreadArg>,
        /// Reported location
        #[arg(short = 'Q', long, value_enum, default_value = "quantile")]
        location: MedianLocationArg,
        /// Report the source id of the chosen record
        #[arg(long, value_enum)]
        source_id: Option<TieArg>,
    },
    /// Mode per cell, continuous or from a histogram
    Mode {
        #[command(flatten)]
        common: CommonArgs,
        /// Use a histogram of z instead of the shortest-half estimator
        #[arg(short = 'D', long)]
        histogram: bool,
        /// Histogram bin width (defaults to 1 for integer data)
        #[arg(long, requires = "histogram")]
        bin_width: Option<f64>,
        /// Center histogram bins on multiples of the width
        #[arg(long, requires = "histogram")]
        centered: bool,
        /// Which of several equally heavy bins to report
        #[arg(long, value_enum, requires = "histogram")]
        tie: Option<ModeTieArg>,
        /// Append LMS scale, low and high
        #[arg(short = 'E', long)]
        extended: bool,
        /// Reported location
        #[arg(short = 'Q', long, value_enum, default_value = "mean")]
        location: ModeLocationArg,
        /// Report the source id of the chosen record
        #[arg(long, value_enum, conflicts_with = "histogram")]
        source_id: Option<TieArg>,
    },
}

/// Arguments shared by every estimator
#[derive(Args)]
struct CommonArgs {
    /// Input table (x y z [w] [id]); stdin when omitted or "-"
    input: Option<PathBuf>,
    /// Region as west/east/south/north
    #[arg(short = 'R', long, allow_hyphen_values = true)]
    region: String,
    /// Cell size as dx or dx/dy
    #[arg(short = 'I', long)]
    increment: String,
    /// Pixel registration (default gridline)
    #[arg(short = 'r', long)]
    pixel: bool,
    /// x/y are longitude/latitude
    #[arg(short = 'g', long)]
    geographic: bool,
    /// How to read the fourth column
    #[arg(short = 'W', long, value_enum, default_value = "none")]
    weights: WeightArg,
    /// Input carries an integer source id column after z (and weight)
    #[arg(long)]
    id_column: bool,
    /// Append the summed cell weight to each record
    #[arg(short = 'w', long)]
    report_weight: bool,
    /// Output table file (default stdout)
    #[arg(short, long, conflicts_with = "grid")]
    output: Option<PathBuf>,
    /// Write GeoTIFF grids instead; "%s" is replaced by the field code
    #[arg(short = 'G', long)]
    grid: Option<String>,
    /// Fields to write with -G: z, s, l, q25, q75, h, w
    #[arg(long, default_value = "z")]
    fields: String,
}

#[derive(Clone, Copy, ValueEnum)]
enum WeightArg {
    /// No weight column
    None,
    /// Weights
    Weight,
    /// Sigmas, weighted by 1/σ²
    Sigma,
    /// Sigmas, plain mean with error sqrt(Σσ²)/n
    SigmaSimple,
    /// Weights used as inverse variances
    Legacy,
}

impl From<WeightArg> for WeightPolicy {
    fn from(arg: WeightArg) -> Self {
        match arg {
            WeightArg::None => WeightPolicy::Unweighted,
            WeightArg::Weight => WeightPolicy::Weights,
            WeightArg::Sigma => WeightPolicy::InverseVariance,
            WeightArg::SigmaSimple => WeightPolicy::SimpleMeanSigma,
            WeightArg::Legacy => WeightPolicy::LegacyInverseVariance,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum ReportArg {
    Mean,
    Sum,
    WeightSum,
    Count,
}

#[derive(Clone, Copy, ValueEnum)]
enum SpreadArg {
    L1,
    Box,
}

#[derive(Clone, Copy, ValueEnum)]
enum MedianLocationArg {
    Quantile,
    Quick,
    Center,
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeLocationArg {
    Mode,
    Mean,
    Center,
}

#[derive(Clone, Copy, ValueEnum)]
enum TieArg {
    Low,
    High,
}

impl From<TieArg> for SourceTie {
    fn from(arg: TieArg) -> Self {
        match arg {
            TieArg::Low => SourceTie::Low,
            TieArg::High => SourceTie::High,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeTieArg {
    Low,
    Average,
    High,
}

// ─── Helpers ────────────────────────────────────────────────────────────

fn setup_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");
}

fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap(),
    );
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

fn done(name: &str, summary: &BlockSummary, elapsed: std::time::Duration) {
    eprintln!("{} of {} cells computed", name, summary.records.len());
    eprintln!("  Processing time: {:.2?}", elapsed);
}

fn parse_numbers(s: &str, what: &str) -> Result<Vec<f64>> {
    s.split('/')
        .map(|part| {
            part.trim()
                .parse::<f64>()
                .with_context(|| format!("Invalid {what} component: {part:?}"))
        })
        .collect()
}

fn parse_region(s: &str) -> Result<(f64, f64, f64, f64)> {
    match parse_numbers(s, "region")?.as_slice() {
        &[w, e, south, north] => Ok((w, e, south, north)),
        _ => anyhow::bail!("Region must be west/east/south/north, got: {}", s),
    }
}

fn parse_increment(s: &str) -> Result<(f64, f64)> {
    match parse_numbers(s, "increment")?.as_slice() {
        &[d] => Ok((d, d)),
        &[dx, dy] => Ok((dx, dy)),
        _ => anyhow::bail!("Increment must be dx or dx/dy, got: {}", s),
    }
}

fn parse_fields(s: &str) -> Result<Vec<BlockField>> {
    s.split(',')
        .map(|code| code.trim().parse::<BlockField>().context("Invalid field"))
        .collect()
}

/// File name for one field of a `-G` pattern
fn field_path(pattern: &str, field: BlockField, n_fields: usize) -> Result<PathBuf> {
    if pattern.contains("%s") {
        Ok(PathBuf::from(pattern.replace("%s", field.code())))
    } else if n_fields == 1 {
        Ok(PathBuf::from(pattern))
    } else {
        anyhow::bail!("Writing {} fields needs a %s in the grid name: {}", n_fields, pattern)
    }
}

impl CommonArgs {
    fn grid(&self) -> Result<GridSpec> {
        let (west, east, south, north) = parse_region(&self.region)?;
        let (dx, dy) = parse_increment(&self.increment)?;
        let registration = if self.pixel {
            Registration::Pixel
        } else {
            Registration::Gridline
        };
        let grid = GridSpec {
            west,
            east,
            south,
            north,
            x_inc: dx,
            y_inc: dy,
            registration,
            geographic: self.geographic,
        }
        .validated()
        .context("Invalid grid")?;
        info!(
            "Grid: {} x {} cells, {:?} registration",
            grid.n_columns(),
            grid.n_rows(),
            grid.registration
        );
        Ok(grid)
    }

    fn layout(&self) -> TableLayout {
        TableLayout {
            weight: !matches!(self.weights, WeightArg::None),
            source_id: self.id_column,
        }
    }

    fn open_input(&self) -> Result<Box<dyn BufRead>> {
        match &self.input {
            Some(path) if path != Path::new("-") => {
                let file = File::open(path)
                    .with_context(|| format!("Failed to open {}", path.display()))?;
                Ok(Box::new(BufReader::new(file)))
            }
            _ => Ok(Box::new(BufReader::new(io::stdin()))),
        }
    }
}

fn read_points<E: BlockEstimator>(reducer: &mut BlockReducer<E>, common: &CommonArgs) -> Result<()> {
    let pb = spinner("Reading points...");
    let reader = PointReader::new(common.open_input()?, common.layout()).context("Failed to read input")?;
    for record in reader {
        let record = record.context("Failed to read input")?;
        reducer.push(&record).context("Failed to process input")?;
    }
    pb.finish_and_clear();
    let counts = reducer.counts();
    info!("Input: {} points, {} inside the grid", counts.read, counts.used);
    Ok(())
}

fn write_table(summary: &BlockSummary, output: Option<&Path>) -> Result<()> {
    debug!("Columns: {}", summary.layout.column_names().join(" "));
    let n = match output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create {}", path.display()))?;
            write_rows(BufWriter::new(file), summary.rows())
        }
        None => write_rows(BufWriter::new(io::stdout().lock()), summary.rows()),
    }
    .context("Failed to write output")?;
    debug!("Wrote {} records", n);
    Ok(())
}

fn write_grids(summary: &BlockSummary, pattern: &str, fields: &str) -> Result<()> {
    let fields = parse_fields(fields)?;
    let rasters = summary.rasters(&fields).context("Cannot build grids")?;
    let options = GeoTiffOptions::for_grid(&summary.grid);

    let pb = spinner("Writing output...");
    for (field, raster) in fields.iter().zip(&rasters) {
        let path = field_path(pattern, *field, fields.len())?;
        write_geotiff(raster, &path, Some(options.clone()))
            .with_context(|| format!("Failed to write {}", path.display()))?;
        info!("{} grid saved to: {}", field, path.display());
    }
    pb.finish_and_clear();
    Ok(())
}

fn run(name: &str, common: &CommonArgs, method: BlockMethod) -> Result<()> {
    let grid = common.grid()?;
    let estimator = Estimator::new(&grid, &method).context("Invalid parameters")?;
    let mut reducer = BlockReducer::new(&grid, estimator);

    let start = Instant::now();
    read_points(&mut reducer, common)?;
    let summary = reducer
        .finish()
        .with_context(|| format!("Failed to compute {name}"))?;
    let elapsed = start.elapsed();

    match &common.grid {
        Some(pattern) => write_grids(&summary, pattern, &common.fields)?,
        None => write_table(&summary, common.output.as_deref())?,
    }
    done(name, &summary, elapsed);
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    match cli.command {
        // ── Mean ─────────────────────────────────────────────────────
        Commands::Mean {
            common,
            report,
            std_dev,
            propagated_error,
            center,
        } => {
            let report = match report {
                ReportArg::Mean => MeanReport::Mean,
                ReportArg::Sum => MeanReport::Sum,
                ReportArg::WeightSum => MeanReport::WeightSum,
                ReportArg::Count => MeanReport::Count,
            };
            let dispersion = if propagated_error {
                Some(Dispersion::PropagatedError)
            } else if std_dev {
                Some(Dispersion::StdDev)
            } else {
                None
            };
            let params = MeanParams {
                weights: common.weights.into(),
                report,
                location: if center {
                    MeanLocation::CellCenter
                } else {
                    MeanLocation::Mean
                },
                dispersion,
                report_weight: common.report_weight,
            };
            run("Block mean", &common, BlockMethod::Mean(params))?;
        }

        // ── Median ───────────────────────────────────────────────────
        Commands::Median {
            common,
            quantile,
            spread,
            location,
            source_id,
        } => {
            let params = MedianParams {
                weights: common.weights.into(),
                quantile,
                spread: spread.map(|s| match s {
                    SpreadArg::L1 => QuantileSpread::L1,
                    SpreadArg::Box => QuantileSpread::BoxWhisker,
                }),
                source: source_id.map(SourceTie::from),
                location: match location {
                    MedianLocationArg::Quantile => QuantileLocation::Quantile,
                    MedianLocationArg::Quick => QuantileLocation::Quick,
                    MedianLocationArg::Center => QuantileLocation::CellCenter,
                },
                report_weight: common.report_weight,
            };
            run("Block median", &common, BlockMethod::Median(params))?;
        }

        // ── Mode ─────────────────────────────────────────────────────
        Commands::Mode {
            common,
            histogram,
            bin_width,
            centered,
            tie,
            extended,
            location,
            source_id,
        } => {
            let histogram = histogram.then(|| HistogramParams {
                width: bin_width,
                centered,
                tie: tie.map(|t| match t {
                    ModeTieArg::Low => ModeTie::Low,
                    ModeTieArg::Average => ModeTie::Average,
                    ModeTieArg::High => ModeTie::High,
                }),
            });
            let params = ModeParams {
                weights: common.weights.into(),
                histogram,
                extended,
                source: source_id.map(SourceTie::from),
                location: match location {
                    ModeLocationArg::Mode => ModeLocation::Mode,
                    ModeLocationArg::Mean => ModeLocation::Mean,
                    ModeLocationArg::Center => ModeLocation::CellCenter,
                },
                report_weight: common.report_weight,
            };
            run("Block mode", &common, BlockMethod::Mode(params))?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_region() {
        assert_eq!(parse_region("-10/10/-5.5/5").unwrap(), (-10.0, 10.0, -5.5, 5.0));
        assert!(parse_region("0/1/2").is_err());
        assert!(parse_region("0/1/a/2").is_err());
    }

    #[test]
    fn test_parse_increment() {
        assert_eq!(parse_increment("0.5").unwrap(), (0.5, 0.5));
        assert_eq!(parse_increment("1/2").unwrap(), (1.0, 2.0));
        assert!(parse_increment("1/2/3").is_err());
    }

    #[test]
    fn test_field_paths() {
        let p = field_path("out_%s.tif", BlockField::Q25, 2).unwrap();
        assert_eq!(p, PathBuf::from("out_q25.tif"));
        assert_eq!(field_path("z.tif", BlockField::Z, 1).unwrap(), PathBuf::from("z.tif"));
        assert!(field_path("z.tif", BlockField::Z, 2).is_err());
    }

    #[test]
    fn test_parse_fields() {
        assert_eq!(
            parse_fields("z, s,h").unwrap(),
            vec![BlockField::Z, BlockField::Scale, BlockField::High]
        );
        assert!(parse_fields("z,median").is_err());
    }

    #[test]
    fn test_cli_definition() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
