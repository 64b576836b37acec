use pyo3::prelude::*;

mod bindings;

use bindings::{
    cleanup_temp_files, create_cog, create_vrt_from_tiles, download_and_create_cog,
    download_raster_tiles_from_service_url, get_arcgis_services, read_bbox_from_gpkg,
    PyBoundingBox,
};

/// Python bindings for arcgis-cog
/// Download ArcGIS ImageServer tiles and build Cloud-Optimized GeoTIFFs

#[pymodule]
fn pyarcgis_cog(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<PyBoundingBox>()?;
    m.setattr("BoundingBox", m.getattr("PyBoundingBox")?)?;

    m.add_function(wrap_pyfunction!(get_arcgis_services, m)?)?;
    m.add_function(wrap_pyfunction!(download_raster_tiles_from_service_url, m)?)?;
    m.add_function(wrap_pyfunction!(download_and_create_cog, m)?)?;
    m.add_function(wrap_pyfunction!(create_vrt_from_tiles, m)?)?;
    m.add_function(wrap_pyfunction!(create_cog, m)?)?;
    m.add_function(wrap_pyfunction!(read_bbox_from_gpkg, m)?)?;
    m.add_function(wrap_pyfunction!(cleanup_temp_files, m)?)?;

    m.add(
        "__doc__",
        "Python bindings for arcgis-cog - ArcGIS ImageServer tiles to Cloud-Optimized GeoTIFF",
    )?;

    Ok(())
}
