use anyhow::{Context, Result};
use gdal::vector::LayerAccess;
use gdal::Dataset;
use std::path::Path;

use crate::error::ArcgisError;

/// Bounding box structure
/// Coordinates are in the native CRS of whatever they were read from
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BoundingBox {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        BoundingBox {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// Smallest box covering both `self` and `other`
    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox::new(
            self.min_x.min(other.min_x),
            self.min_y.min(other.min_y),
            self.max_x.max(other.max_x),
            self.max_y.max(other.max_y),
        )
    }

    /// Combined extent of a set of boxes, `None` when the set is empty
    pub fn merge_all<I>(boxes: I) -> Option<BoundingBox>
    where
        I: IntoIterator<Item = BoundingBox>,
    {
        boxes
            .into_iter()
            .reduce(|acc, bbox| acc.union(&bbox))
    }

    /// Envelope string for ArcGIS `geometry=` query parameters: `xmin,ymin,xmax,ymax`
    ///
    /// Uses the `Debug` float rendering so whole numbers keep their trailing
    /// `.0` (`10.0`, not `10`).
    pub fn to_envelope_string(&self) -> String {
        format!(
            "{:?},{:?},{:?},{:?}",
            self.min_x, self.min_y, self.max_x, self.max_y
        )
    }

    pub fn as_tuple(&self) -> (f64, f64, f64, f64) {
        (self.min_x, self.min_y, self.max_x, self.max_y)
    }
}

/// Read the combined extent of every geometry in a vector boundary file.
///
/// Works for any OGR-readable source (GeoPackage, GeoJSON, Shapefile, ...);
/// every feature of every layer contributes. The result stays in the file's
/// own CRS, no reprojection happens here.
pub fn read_bbox_from_vector<P: AsRef<Path>>(path: P) -> Result<BoundingBox> {
    let path = path.as_ref();
    let dataset = Dataset::open(path)
        .with_context(|| format!("Failed to open boundary file {:?}", path))?;

    let mut envelopes = Vec::new();
    for mut layer in dataset.layers() {
        for feature in layer.features() {
            if let Some(geometry) = feature.geometry() {
                if geometry.is_empty() {
                    continue;
                }
                // OGREnvelope fields are MinX, MaxX, MinY, MaxY
                let envelope = geometry.envelope();
                envelopes.push(BoundingBox::new(
                    envelope.MinX,
                    envelope.MinY,
                    envelope.MaxX,
                    envelope.MaxY,
                ));
            }
        }
    }

    let bbox = BoundingBox::merge_all(envelopes)
        .ok_or_else(|| ArcgisError::EmptyBoundary(path.to_path_buf()))?;
    log::debug!("Boundary extent of {:?}: {:?}", path, bbox);
    Ok(bbox)
}

/// Same as [`read_bbox_from_vector`]; kept under the GeoPackage name most callers know.
pub fn read_bbox_from_gpkg<P: AsRef<Path>>(path: P) -> Result<BoundingBox> {
    read_bbox_from_vector(path)
}
