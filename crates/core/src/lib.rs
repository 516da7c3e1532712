//! # blockstat Core
//!
//! Core types and I/O shared by the blockstat crates.
//!
//! This crate provides:
//! - `GridSpec`: region, increments and registration of the block grid
//! - `PointRecord`: one `(x, y, z[, w][, id])` input observation
//! - `Raster<T>`: georeferenced per-cell arrays
//! - `GeoTransform`: affine transformation for georeferencing
//! - Plain-text table and GeoTIFF I/O

pub mod error;
pub mod io;
pub mod point;
pub mod raster;
pub mod region;

pub use error::{Error, Result};
pub use point::PointRecord;
pub use raster::{GeoTransform, Raster, RasterElement};
pub use region::{GridSpec, Registration};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::point::PointRecord;
    pub use crate::raster::{GeoTransform, Raster, RasterElement};
    pub use crate::region::{GridSpec, Registration};
}
