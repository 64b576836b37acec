use pyo3::prelude::*;
use pyo3::types::{PyDict, PyList};

use arcgis_cog::collect::http::ReqwestClient;

use crate::bindings::to_py_err;

/// List the services under an ArcGIS REST root
///
/// Returns a list of dicts with keys `category`, `service_name`, `year`,
/// `type` and `name`, sorted by category then service name.
#[pyfunction]
pub fn get_arcgis_services<'py>(py: Python<'py>, base_url: &str) -> PyResult<Bound<'py, PyList>> {
    let client = ReqwestClient::new();
    let catalog = py
        .detach(|| arcgis_cog::get_arcgis_services(&client, base_url))
        .map_err(|e| to_py_err("Failed to list services", e))?;

    let list = PyList::empty(py);
    for record in catalog.records() {
        let row = PyDict::new(py);
        row.set_item("category", &record.category)?;
        row.set_item("service_name", &record.service_name)?;
        row.set_item("year", record.year.as_deref())?;
        row.set_item("type", &record.service_type)?;
        row.set_item("name", &record.name)?;
        list.append(row)?;
    }
    Ok(list)
}
