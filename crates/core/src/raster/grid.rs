//! Main Raster type

use crate::error::{Error, Result};
use crate::raster::{GeoTransform, RasterElement};
use crate::region::GridSpec;
use ndarray::Array2;

/// A georeferenced 2D array of per-cell values.
///
/// Rows run north to south, matching the node numbering of [`GridSpec`],
/// so `data[(row, col)]` holds the value of node `row * cols + col`.
///
/// # Example
///
/// ```ignore
/// use blockstat_core::{GridSpec, Raster};
///
/// let grid = GridSpec::new(0.0, 10.0, 0.0, 10.0, 1.0, 1.0)?;
/// let mut raster: Raster<f64> = Raster::for_grid(&grid, f64::NAN);
/// raster.set_node(12, 42.0)?;
/// ```
#[derive(Debug, Clone)]
pub struct Raster<T: RasterElement> {
    /// Cell values in row-major order (row, col)
    data: Array2<T>,
    /// Affine transformation
    transform: GeoTransform,
    /// No-data value
    nodata: Option<T>,
}

impl<T: RasterElement> Raster<T> {
    /// Create a raster covering `grid`, every cell set to `fill`.
    ///
    /// `fill` doubles as the no-data value, so cells never written stay
    /// recognizable as empty.
    pub fn for_grid(grid: &GridSpec, fill: T) -> Self {
        Self {
            data: Array2::from_elem((grid.n_rows(), grid.n_columns()), fill),
            transform: grid.transform(),
            nodata: Some(fill),
        }
    }

    /// Number of rows
    pub fn rows(&self) -> usize {
        self.data.nrows()
    }

    /// Number of columns
    pub fn cols(&self) -> usize {
        self.data.ncols()
    }

    /// Dimensions as (rows, cols)
    pub fn shape(&self) -> (usize, usize) {
        self.data.dim()
    }

    /// Total number of cells
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the raster is empty
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Get value at (row, col)
    pub fn get(&self, row: usize, col: usize) -> Result<T> {
        self.data
            .get((row, col))
            .copied()
            .ok_or(Error::InvalidParameter {
                name: "index",
                value: format!("({row}, {col})"),
                reason: format!("outside raster of size ({}, {})", self.rows(), self.cols()),
            })
    }

    /// Set value at (row, col)
    pub fn set(&mut self, row: usize, col: usize, value: T) -> Result<()> {
        let (rows, cols) = self.shape();
        match self.data.get_mut((row, col)) {
            Some(cell) => {
                *cell = value;
                Ok(())
            }
            None => Err(Error::InvalidParameter {
                name: "index",
                value: format!("({row}, {col})"),
                reason: format!("outside raster of size ({rows}, {cols})"),
            }),
        }
    }

    /// Get value of a flat node index
    pub fn get_node(&self, node: usize) -> Result<T> {
        let cols = self.cols().max(1);
        self.get(node / cols, node % cols)
    }

    /// Set value of a flat node index
    pub fn set_node(&mut self, node: usize, value: T) -> Result<()> {
        let cols = self.cols().max(1);
        self.set(node / cols, node % cols, value)
    }

    /// Get a reference to the underlying array
    pub fn data(&self) -> &Array2<T> {
        &self.data
    }

    /// Get the geotransform
    pub fn transform(&self) -> &GeoTransform {
        &self.transform
    }

    /// Get the no-data value
    pub fn nodata(&self) -> Option<T> {
        self.nodata
    }

    /// Check if a value is no-data
    pub fn is_nodata(&self, value: T) -> bool {
        value.is_nodata(self.nodata)
    }

    /// Basic statistics over the valid cells
    pub fn statistics(&self) -> RasterStatistics<T> {
        let mut min: Option<T> = None;
        let mut max: Option<T> = None;
        let mut sum = 0.0;
        let mut count = 0usize;

        for &value in self.data.iter().filter(|&&v| !self.is_nodata(v)) {
            if min.is_none_or(|m| value < m) {
                min = Some(value);
            }
            if max.is_none_or(|m| value > m) {
                max = Some(value);
            }
            if let Some(v) = value.to_f64() {
                sum += v;
                count += 1;
            }
        }

        RasterStatistics {
            min,
            max,
            mean: (count > 0).then(|| sum / count as f64),
            valid_count: count,
            nodata_count: self.len() - count,
        }
    }
}

/// Basic statistics for a raster
#[derive(Debug, Clone)]
pub struct RasterStatistics<T> {
    pub min: Option<T>,
    pub max: Option<T>,
    pub mean: Option<f64>,
    pub valid_count: usize,
    pub nodata_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_for_grid_is_nodata_filled() {
        let grid = GridSpec::new(0.0, 3.0, 0.0, 2.0, 1.0, 1.0).unwrap();
        let raster: Raster<f64> = Raster::for_grid(&grid, f64::NAN);
        assert_eq!(raster.shape(), (3, 4));
        assert!(raster.get(2, 3).unwrap().is_nan());
        assert_eq!(raster.statistics().valid_count, 0);
    }

    #[test]
    fn test_node_access() {
        let grid = GridSpec::new(0.0, 3.0, 0.0, 2.0, 1.0, 1.0).unwrap();
        let mut raster: Raster<f64> = Raster::for_grid(&grid, f64::NAN);
        raster.set_node(grid.node(1, 2), 7.0).unwrap();
        assert_eq!(raster.get(1, 2).unwrap(), 7.0);
        assert_eq!(raster.get_node(6).unwrap(), 7.0);
        assert!(raster.set_node(12, 1.0).is_err());
    }

    #[test]
    fn test_raster_statistics() {
        let grid = GridSpec::new(0.0, 9.0, 0.0, 9.0, 1.0, 1.0).unwrap();
        let mut raster: Raster<f64> = Raster::for_grid(&grid, f64::NAN);
        for node in (0..100).step_by(2) {
            raster.set_node(node, node as f64).unwrap();
        }

        let stats = raster.statistics();
        assert_eq!(stats.min, Some(0.0));
        assert_eq!(stats.max, Some(98.0));
        assert_eq!(stats.valid_count, 50);
        assert_eq!(stats.nodata_count, 50);
        assert_eq!(raster.nodata().map(f64::is_nan), Some(true));
    }
}
