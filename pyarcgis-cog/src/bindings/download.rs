use pyo3::prelude::*;
use std::path::PathBuf;

use arcgis_cog::collect::global_variables::{DEFAULT_MAX_RETRY, DEFAULT_OUT_SRS};
use arcgis_cog::DownloadOptions;

use crate::bindings::to_py_err;

fn path_strings(paths: Vec<PathBuf>) -> Vec<String> {
    paths
        .into_iter()
        .map(|p| p.to_string_lossy().to_string())
        .collect()
}

/// Download every tile of a service intersecting `bbox_path` into `output_dir`
///
/// Returns the tile paths, in query order.
#[pyfunction]
#[pyo3(signature = (service_url, service_name, output_dir, bbox_path = None, max_retry = DEFAULT_MAX_RETRY, out_srs = DEFAULT_OUT_SRS))]
pub fn download_raster_tiles_from_service_url(
    py: Python<'_>,
    service_url: &str,
    service_name: &str,
    output_dir: PathBuf,
    bbox_path: Option<PathBuf>,
    max_retry: u32,
    out_srs: u32,
) -> PyResult<Vec<String>> {
    py.detach(|| {
        arcgis_cog::download_raster_tiles_from_service_url(
            service_url,
            service_name,
            &output_dir,
            bbox_path.as_deref(),
            max_retry,
            out_srs,
        )
    })
    .map(path_strings)
    .map_err(|e| to_py_err("Failed to download tiles", e))
}

/// Download tiles and assemble them into a Cloud-Optimized GeoTIFF
///
/// Returns the path of the written COG.
#[pyfunction]
#[pyo3(signature = (service_url, service_name, output_path, bbox_path = None, raw_data_folder = None, max_retry = DEFAULT_MAX_RETRY, out_srs = DEFAULT_OUT_SRS, out_nodata_value = None))]
#[allow(clippy::too_many_arguments)]
pub fn download_and_create_cog(
    py: Python<'_>,
    service_url: &str,
    service_name: &str,
    output_path: PathBuf,
    bbox_path: Option<PathBuf>,
    raw_data_folder: Option<PathBuf>,
    max_retry: u32,
    out_srs: u32,
    out_nodata_value: Option<f64>,
) -> PyResult<String> {
    let options = DownloadOptions {
        raw_data_folder,
        max_retry,
        out_srs,
        out_nodata_value,
    };
    let outcome = py
        .detach(|| {
            arcgis_cog::download_and_create_cog(
                service_url,
                service_name,
                &output_path,
                bbox_path.as_deref(),
                &options,
            )
        })
        .map_err(|e| to_py_err("Failed to create COG", e))?;
    Ok(outcome.output_path.to_string_lossy().to_string())
}
