pub mod arcgis_collect;
pub mod services;

pub use arcgis_collect::{ArcgisCollect, FileParams, TileDescriptor};
pub use services::{get_arcgis_services, ServiceCatalog, ServiceRecord};
