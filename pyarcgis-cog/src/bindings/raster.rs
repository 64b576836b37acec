use pyo3::prelude::*;
use std::path::PathBuf;

use arcgis_cog::collect::global_variables::DEFAULT_OUT_SRS;

use crate::bindings::to_py_err;

/// Mosaic tiles into a VRT with gdalbuildvrt
#[pyfunction]
pub fn create_vrt_from_tiles(
    py: Python<'_>,
    tile_paths: Vec<PathBuf>,
    output_vrt: PathBuf,
) -> PyResult<String> {
    py.detach(|| arcgis_cog::create_vrt_from_tiles(&tile_paths, &output_vrt))
        .map(|p| p.to_string_lossy().to_string())
        .map_err(|e| to_py_err("Failed to create VRT", e))
}

/// Convert a raster to a COG (reproject, compress, overviews)
#[pyfunction]
#[pyo3(signature = (input_path, output_path, out_srs = DEFAULT_OUT_SRS, out_nodata_value = None))]
pub fn create_cog(
    py: Python<'_>,
    input_path: PathBuf,
    output_path: PathBuf,
    out_srs: u32,
    out_nodata_value: Option<f64>,
) -> PyResult<String> {
    py.detach(|| arcgis_cog::create_cog(&input_path, &output_path, out_srs, out_nodata_value))
        .map(|p| p.to_string_lossy().to_string())
        .map_err(|e| to_py_err("Failed to create COG", e))
}

/// Best-effort removal of tiles, their directory and the VRT
///
/// Returns how many paths could not be removed.
#[pyfunction]
pub fn cleanup_temp_files(tile_paths: Vec<PathBuf>, temp_dir: PathBuf, vrt_path: PathBuf) -> usize {
    arcgis_cog::cleanup_temp_files(&tile_paths, &temp_dir, &vrt_path)
}
