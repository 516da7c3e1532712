//! Grid geometry: region, increments and registration
//!
//! A [`GridSpec`] describes the regular lattice of rectangular cells that
//! points are binned into. Cells are addressed by `(row, col)` with row 0 at
//! the north edge, or by a flat `node = row * n_columns + col`.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::raster::GeoTransform;

/// Tolerance used when deciding whether a longitude range spans 360°
const PERIOD_TOLERANCE: f64 = 1e-8;

/// How grid coordinates relate to the cells they label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Registration {
    /// Coordinates fall on gridline intersections; cells are centered on nodes
    #[default]
    Gridline,
    /// Coordinates are the centers of pixels bounded by the region edges
    Pixel,
}

impl Registration {
    /// Offset (in cells) between a node coordinate and the cell corner
    #[inline]
    fn offset(self) -> f64 {
        match self {
            Registration::Gridline => 0.5,
            Registration::Pixel => 0.0,
        }
    }
}

/// Geometry of the target grid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridSpec {
    pub west: f64,
    pub east: f64,
    pub south: f64,
    pub north: f64,
    /// Cell width
    pub x_inc: f64,
    /// Cell height
    pub y_inc: f64,
    pub registration: Registration,
    /// x is longitude and y is latitude (enables periodic wraparound)
    pub geographic: bool,
}

impl GridSpec {
    /// Create and validate a Cartesian, gridline-registered grid
    pub fn new(west: f64, east: f64, south: f64, north: f64, x_inc: f64, y_inc: f64) -> Result<Self> {
        Self {
            west,
            east,
            south,
            north,
            x_inc,
            y_inc,
            registration: Registration::Gridline,
            geographic: false,
        }
        .validated()
    }

    /// Switch to another registration
    pub fn with_registration(mut self, registration: Registration) -> Result<Self> {
        self.registration = registration;
        self.validated()
    }

    /// Mark x/y as longitude/latitude
    pub fn with_geographic(mut self, geographic: bool) -> Result<Self> {
        self.geographic = geographic;
        self.validated()
    }

    /// Check increments, region and resulting dimensions
    pub fn validated(self) -> Result<Self> {
        let finite = [self.west, self.east, self.south, self.north, self.x_inc, self.y_inc]
            .iter()
            .all(|v| v.is_finite());
        if !finite {
            return Err(Error::invalid("region", self.describe(), "all bounds and increments must be finite"));
        }
        if self.x_inc <= 0.0 || self.y_inc <= 0.0 {
            return Err(Error::invalid(
                "increment",
                format!("{}/{}", self.x_inc, self.y_inc),
                "must be positive",
            ));
        }
        if self.west >= self.east || self.south >= self.north {
            return Err(Error::invalid("region", self.describe(), "west < east and south < north required"));
        }
        if self.registration == Registration::Pixel {
            let (rows, cols) = (self.n_rows(), self.n_columns());
            if rows == 0 || cols == 0 {
                return Err(Error::InvalidDimensions { cols, rows });
            }
        }
        Ok(self)
    }

    fn describe(&self) -> String {
        format!("{}/{}/{}/{}", self.west, self.east, self.south, self.north)
    }

    /// Number of columns
    pub fn n_columns(&self) -> usize {
        let span = ((self.east - self.west) / self.x_inc).round() as usize;
        match self.registration {
            Registration::Gridline => span + 1,
            Registration::Pixel => span,
        }
    }

    /// Number of rows
    pub fn n_rows(&self) -> usize {
        let span = ((self.north - self.south) / self.y_inc).round() as usize;
        match self.registration {
            Registration::Gridline => span + 1,
            Registration::Pixel => span,
        }
    }

    /// Total number of cells
    pub fn n_cells(&self) -> usize {
        self.n_rows() * self.n_columns()
    }

    /// Whether the x range covers a full circle of longitude
    pub fn spans_360(&self) -> bool {
        self.geographic && ((self.east - self.west).abs() - 360.0).abs() < PERIOD_TOLERANCE
    }

    /// Whether the east and west columns are the same meridian
    pub fn has_duplicate_column(&self) -> bool {
        self.spans_360() && self.registration == Registration::Gridline
    }

    /// Accepted coordinate domain `(west, east, south, north)`.
    ///
    /// Gridline-registered cells extend half an increment beyond the region,
    /// except in longitude when the grid is periodic, and never past the poles.
    pub fn domain(&self) -> (f64, f64, f64, f64) {
        let off = self.registration.offset();
        let x_off = if self.spans_360() { 0.0 } else { off };
        let mut south = self.south - off * self.y_inc;
        let mut north = self.north + off * self.y_inc;
        if self.geographic {
            south = south.max(-90.0);
            north = north.min(90.0);
        }
        (
            self.west - x_off * self.x_inc,
            self.east + x_off * self.x_inc,
            south,
            north,
        )
    }

    /// Column holding `x`, or `None` when outside the grid
    pub fn x_to_col(&self, x: f64) -> Option<usize> {
        let f = ((x - self.west) / self.x_inc + self.registration.offset()).floor();
        let n = self.n_columns();
        if f < 0.0 {
            return None;
        }
        let col = f as usize;
        if col < n {
            Some(col)
        } else if col == n && self.registration == Registration::Pixel && x <= self.east {
            Some(n - 1)
        } else {
            None
        }
    }

    /// Row holding `y` (row 0 is north), or `None` when outside the grid
    pub fn y_to_row(&self, y: f64) -> Option<usize> {
        let f = ((self.north - y) / self.y_inc + self.registration.offset()).floor();
        let n = self.n_rows();
        if f < 0.0 {
            return None;
        }
        let row = f as usize;
        if row < n {
            Some(row)
        } else if row == n && self.registration == Registration::Pixel && y >= self.south {
            Some(n - 1)
        } else {
            None
        }
    }

    /// x coordinate of a column's node (gridline) or center (pixel)
    pub fn col_to_x(&self, col: usize) -> f64 {
        self.transform().pixel_to_geo(col, 0).0
    }

    /// y coordinate of a row's node (gridline) or center (pixel)
    pub fn row_to_y(&self, row: usize) -> f64 {
        self.transform().pixel_to_geo(0, row).1
    }

    /// Flat node index of `(row, col)`
    #[inline]
    pub fn node(&self, row: usize, col: usize) -> usize {
        row * self.n_columns() + col
    }

    /// `(row, col)` of a flat node index
    #[inline]
    pub fn row_col(&self, node: usize) -> (usize, usize) {
        let cols = self.n_columns();
        (node / cols, node % cols)
    }

    /// Geographic center of the cell `node`
    pub fn cell_center(&self, node: usize) -> (f64, f64) {
        let (row, col) = self.row_col(node);
        self.transform().pixel_to_geo(col, row)
    }

    /// North-up affine transform whose pixel centers are the grid nodes
    pub fn transform(&self) -> GeoTransform {
        let off = self.registration.offset();
        GeoTransform::new(
            self.west - off * self.x_inc,
            self.north + off * self.y_inc,
            self.x_inc,
            -self.y_inc,
        )
    }
}
