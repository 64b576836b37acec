use std::path::PathBuf;

/// Spatial reference of the envelope sent with tile queries (`inSR`)
pub const QUERY_IN_SRS: u32 = 32633;

/// Default output spatial reference (`outSR` and COG target SRS)
pub const DEFAULT_OUT_SRS: u32 = 32633;

/// Default number of attempts for a tile content request
pub const DEFAULT_MAX_RETRY: u32 = 5;

/// Filename prefix of server-side overview rasters, never downloaded
pub const OVERVIEW_PREFIX: &str = "Ov_";

/// Prefix of the staging directory created under the system temp dir
pub const STAGING_PREFIX: &str = "arcgis-cog-";

pub fn get_temp_path() -> PathBuf {
    std::env::temp_dir()
}
