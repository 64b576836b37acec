pub mod collect;
pub mod commons;
pub mod error;
pub mod geo_core;
pub mod pipeline;
pub mod raster;

pub use collect::arcgis::arcgis_collect::download_raster_tiles_from_service_url;
pub use collect::arcgis::{get_arcgis_services, ArcgisCollect, ServiceCatalog, ServiceRecord};
pub use commons::basic_functions::cleanup_temp_files;
pub use error::ArcgisError;
pub use geo_core::{read_bbox_from_gpkg, read_bbox_from_vector, BoundingBox};
pub use pipeline::{download_and_create_cog, DownloadOptions, PipelineOutcome};
pub use raster::{create_cog, create_vrt_from_tiles, CogOptions};
