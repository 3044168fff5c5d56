//! Single-band raster windows and tile centres via GDAL.

use std::path::Path;

use gdal::spatial_ref::{AxisMappingStrategy, CoordTransform, SpatialRef};
use gdal::Dataset;
use ndarray::Array2;

use super::{Coordinate, RasterWindow, WindowSpec};

/// Open a band file, locate its centre in WGS84 and read the requested window.
pub fn read_window(path: &Path, window: &WindowSpec) -> Result<RasterWindow, String> {
    let dataset = Dataset::open(path).map_err(|err| format!("open failed: {err}"))?;
    let (width, height) = dataset.raster_size();
    let center = raster_center(&dataset, width, height)?;

    let resolved = window.resolve(width, height);
    let band = dataset
        .rasterband(1)
        .map_err(|err| format!("missing band 1: {err}"))?;
    let buffer = band
        .read_as::<u16>(
            (resolved.x as isize, resolved.y as isize),
            (resolved.width, resolved.height),
            (resolved.width, resolved.height),
            None,
        )
        .map_err(|err| format!("window read failed: {err}"))?;
    let pixels = Array2::from_shape_vec((resolved.height, resolved.width), buffer.data().to_vec())
        .map_err(|err| format!("unexpected window shape: {err}"))?;

    Ok(RasterWindow { pixels, center })
}

fn raster_center(dataset: &Dataset, width: usize, height: usize) -> Result<Coordinate, String> {
    // [origin_x, pixel_width, rotation_x, origin_y, rotation_y, pixel_height]
    let gt = dataset
        .geo_transform()
        .map_err(|err| format!("missing geotransform: {err}"))?;
    let (half_w, half_h) = (width as f64 / 2.0, height as f64 / 2.0);
    let x = gt[0] + half_w * gt[1] + half_h * gt[2];
    let y = gt[3] + half_w * gt[4] + half_h * gt[5];

    let source = dataset
        .spatial_ref()
        .map_err(|err| format!("missing spatial reference: {err}"))?;
    let mut target = SpatialRef::from_epsg(4326).map_err(|err| err.to_string())?;
    // (lon, lat) axis order regardless of the EPSG definition
    target.set_axis_mapping_strategy(AxisMappingStrategy::TraditionalGisOrder);
    let transform = CoordTransform::new(&source, &target).map_err(|err| err.to_string())?;

    let mut xs = [x];
    let mut ys = [y];
    let mut zs = [0.0];
    transform
        .transform_coords(&mut xs, &mut ys, &mut zs)
        .map_err(|err| format!("reprojection failed: {err}"))?;
    Ok(Coordinate::new(ys[0], xs[0]))
}
