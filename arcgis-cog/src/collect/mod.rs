pub mod arcgis;
pub mod global_variables;
pub mod http;
