//! I/O for point tables and per-cell rasters

mod native;
pub mod table;

pub use native::{write_geotiff, write_geotiff_to_buffer, GeoTiffOptions};
pub use table::{read_points, write_rows, Delimiter, PointReader, TableLayout};
