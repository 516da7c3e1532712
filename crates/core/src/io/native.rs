//! Native GeoTIFF writing
//!
//! Uses the `tiff` crate. Per-cell arrays are written as single-band 32-bit
//! float images with pixel scale, tiepoint and a minimal GeoKey directory.

use crate::error::{Error, Result};
use crate::raster::{Raster, RasterElement};
use crate::region::GridSpec;
use std::fs::File;
use std::io::{BufWriter, Cursor, Seek, Write};
use std::path::Path;
use tiff::encoder::colortype::Gray32Float;
use tiff::encoder::TiffEncoder;
use tiff::tags::Tag;

const MODEL_PIXEL_SCALE_TAG: u16 = 33550;
const MODEL_TIEPOINT_TAG: u16 = 33922;
const GEO_KEY_DIRECTORY_TAG: u16 = 34735;

/// Options for writing GeoTIFF files
#[derive(Debug, Clone, Default)]
pub struct GeoTiffOptions {
    /// Coordinates are longitude/latitude rather than projected
    pub geographic: bool,
}

impl GeoTiffOptions {
    /// Options matching a grid's coordinate type
    pub fn for_grid(grid: &GridSpec) -> Self {
        Self {
            geographic: grid.geographic,
        }
    }
}

/// Write a Raster to a GeoTIFF file
pub fn write_geotiff<T, P>(raster: &Raster<T>, path: P, options: Option<GeoTiffOptions>) -> Result<()>
where
    T: RasterElement,
    P: AsRef<Path>,
{
    let file = BufWriter::new(File::create(path.as_ref())?);
    encode_geotiff(raster, file, &options.unwrap_or_default())
}

/// Write a Raster to an in-memory GeoTIFF buffer
pub fn write_geotiff_to_buffer<T>(raster: &Raster<T>, options: Option<GeoTiffOptions>) -> Result<Vec<u8>>
where
    T: RasterElement,
{
    let mut buf = Vec::new();
    encode_geotiff(raster, Cursor::new(&mut buf), &options.unwrap_or_default())?;
    Ok(buf)
}

fn tiff_error(what: &str) -> impl FnOnce(tiff::TiffError) -> Error + '_ {
    move |e| Error::Other(format!("{what}: {e}"))
}

/// Encode a Raster as GeoTIFF into any `Write + Seek` sink
fn encode_geotiff<T, W>(raster: &Raster<T>, writer: W, options: &GeoTiffOptions) -> Result<()>
where
    T: RasterElement,
    W: Write + Seek,
{
    let mut encoder = TiffEncoder::new(writer).map_err(tiff_error("TIFF encoder error"))?;

    let (rows, cols) = raster.shape();
    if rows == 0 || cols == 0 {
        return Err(Error::InvalidDimensions { cols, rows });
    }

    let data: Vec<f32> = raster
        .data()
        .iter()
        .map(|&v| num_traits::cast(v).unwrap_or(f32::NAN))
        .collect();

    let mut image = encoder
        .new_image::<Gray32Float>(cols as u32, rows as u32)
        .map_err(tiff_error("Cannot create TIFF image"))?;

    let gt = raster.transform();

    let scale = [gt.pixel_width, gt.pixel_height.abs(), 0.0];
    image
        .encoder()
        .write_tag(Tag::Unknown(MODEL_PIXEL_SCALE_TAG), &scale[..])
        .map_err(tiff_error("Cannot write scale tag"))?;

    let tiepoint = [0.0, 0.0, 0.0, gt.origin_x, gt.origin_y, 0.0];
    image
        .encoder()
        .write_tag(Tag::Unknown(MODEL_TIEPOINT_TAG), &tiepoint[..])
        .map_err(tiff_error("Cannot write tiepoint tag"))?;

    // GTModelTypeGeoKey: 1 projected, 2 geographic. GTRasterTypeGeoKey: 1 PixelIsArea.
    let model_type: u16 = if options.geographic { 2 } else { 1 };
    let geokeys: [u16; 12] = [
        1, 1, 0, 2, //
        1024, 0, 1, model_type, //
        1025, 0, 1, 1,
    ];
    image
        .encoder()
        .write_tag(Tag::Unknown(GEO_KEY_DIRECTORY_TAG), &geokeys[..])
        .map_err(tiff_error("Cannot write geokey tag"))?;

    image
        .write_data(&data)
        .map_err(tiff_error("Cannot write image data"))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_has_tiff_magic() {
        let grid = GridSpec::new(0.0, 3.0, 0.0, 2.0, 1.0, 1.0).unwrap();
        let mut raster: Raster<f64> = Raster::for_grid(&grid, f64::NAN);
        raster.set_node(4, 1.5).unwrap();

        let buf = write_geotiff_to_buffer(&raster, Some(GeoTiffOptions::for_grid(&grid))).unwrap();
        assert!(buf.len() > 12 * 4);
        assert!(&buf[..2] == b"II" || &buf[..2] == b"MM");
    }
}
