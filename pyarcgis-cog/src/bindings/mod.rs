// Python bindings module
// Each file wraps one area of the arcgis_cog API

pub mod bounding_box;
pub mod download;
pub mod raster;
pub mod services;

pub use bounding_box::{read_bbox_from_gpkg, PyBoundingBox};
pub use download::{download_and_create_cog, download_raster_tiles_from_service_url};
pub use raster::{cleanup_temp_files, create_cog, create_vrt_from_tiles};
pub use services::get_arcgis_services;

use pyo3::exceptions::{PyRuntimeError, PyValueError};
use pyo3::PyErr;

/// Map a library error to the Python exception callers expect:
/// service and input problems raise ValueError, everything else RuntimeError
pub(crate) fn to_py_err(context: &str, err: anyhow::Error) -> PyErr {
    use arcgis_cog::ArcgisError;
    match err.downcast_ref::<ArcgisError>() {
        Some(
            ArcgisError::NoData
            | ArcgisError::Service { .. }
            | ArcgisError::EmptyBoundary(_)
            | ArcgisError::MalformedResponse { .. },
        ) => PyValueError::new_err(format!("{}: {:#}", context, err)),
        _ => PyRuntimeError::new_err(format!("{}: {:#}", context, err)),
    }
}
