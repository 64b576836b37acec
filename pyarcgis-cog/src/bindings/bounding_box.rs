use arcgis_cog::BoundingBox;
use pyo3::prelude::*;

use crate::bindings::to_py_err;

/// BoundingBox Python binding
#[pyclass]
#[derive(Clone)]
pub struct PyBoundingBox {
    pub(crate) inner: BoundingBox,
}

#[pymethods]
impl PyBoundingBox {
    #[new]
    fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        PyBoundingBox {
            inner: BoundingBox::new(min_x, min_y, max_x, max_y),
        }
    }

    #[getter]
    fn min_x(&self) -> f64 {
        self.inner.min_x
    }

    #[getter]
    fn min_y(&self) -> f64 {
        self.inner.min_y
    }

    #[getter]
    fn max_x(&self) -> f64 {
        self.inner.max_x
    }

    #[getter]
    fn max_y(&self) -> f64 {
        self.inner.max_y
    }

    /// `minx,miny,maxx,maxy`, as sent in the envelope query
    fn to_envelope_string(&self) -> String {
        self.inner.to_envelope_string()
    }

    fn to_tuple(&self) -> (f64, f64, f64, f64) {
        self.inner.as_tuple()
    }

    fn __repr__(&self) -> String {
        format!(
            "BoundingBox({}, {}, {}, {})",
            self.inner.min_x, self.inner.min_y, self.inner.max_x, self.inner.max_y
        )
    }
}

/// Combined extent of every feature of a vector file, as (minx, miny, maxx, maxy)
#[pyfunction]
pub fn read_bbox_from_gpkg(gpkg_path: &str) -> PyResult<(f64, f64, f64, f64)> {
    arcgis_cog::read_bbox_from_gpkg(gpkg_path)
        .map(|bbox| bbox.as_tuple())
        .map_err(|e| to_py_err("Failed to read bounding box", e))
}
