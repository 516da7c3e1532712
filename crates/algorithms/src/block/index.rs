//! Mapping of point coordinates to grid cells

use blockstat_core::GridSpec;

/// Cell assignment of one point
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellIndex {
    pub node: usize,
    pub row: usize,
    pub col: usize,
    /// x after longitude wrapping
    pub x: f64,
}

/// Assigns points to the cells of a [`GridSpec`].
///
/// Points outside the grid domain are rejected. Geographic x values are
/// wrapped into the region by multiples of 360° first. On a gridline grid
/// spanning 360°, the east column repeats the west one; points that would
/// land there are moved to column 0 with x shifted by −360.
#[derive(Debug, Clone)]
pub struct CellIndexer {
    grid: GridSpec,
    domain: (f64, f64, f64, f64),
    duplicate_column: bool,
}

impl CellIndexer {
    pub fn new(grid: &GridSpec) -> Self {
        Self {
            grid: *grid,
            domain: grid.domain(),
            duplicate_column: grid.has_duplicate_column(),
        }
    }

    pub fn grid(&self) -> &GridSpec {
        &self.grid
    }

    /// Cell holding `(x, y)`, or `None` when the point is outside
    pub fn locate(&self, x: f64, y: f64) -> Option<CellIndex> {
        let (west, east, south, north) = self.domain;
        if !(y >= south && y <= north) || !x.is_finite() {
            return None;
        }

        let mut x = x;
        if self.grid.geographic {
            x = west + (x - west).rem_euclid(360.0);
        }
        if x < west || x > east {
            return None;
        }

        let row = self.grid.y_to_row(y)?;
        let mut col = self.grid.x_to_col(x)?;
        if self.duplicate_column && self.grid.east - x < 0.5 * self.grid.x_inc {
            x -= 360.0;
            col = 0;
        }

        Some(CellIndex {
            node: self.grid.node(row, col),
            row,
            col,
            x,
        })
    }
}
