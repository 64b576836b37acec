use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::collect::arcgis::ArcgisCollect;
use crate::collect::global_variables::{
    get_temp_path, DEFAULT_MAX_RETRY, DEFAULT_OUT_SRS, STAGING_PREFIX,
};
use crate::collect::http::{HttpClient, ReqwestClient};
use crate::commons::basic_functions::{cleanup_temp_files, ensure_dir, parent_dir};
use crate::geo_core::read_bbox_from_vector;
use crate::raster::cog::{CogBuilder, CogOptions};
use crate::raster::tools::{GdalCli, ToolRunner};
use crate::raster::vrt::create_vrt_with;

/// Options of [`download_and_create_cog`]
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadOptions {
    /// Keep raw tiles here instead of a throwaway temp directory
    pub raw_data_folder: Option<PathBuf>,
    /// Attempts per tile content request
    pub max_retry: u32,
    /// Output EPSG code, for the tile query and the COG
    pub out_srs: u32,
    /// Nodata value for the COG (pixel values unchanged)
    pub out_nodata_value: Option<f64>,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        DownloadOptions {
            raw_data_folder: None,
            max_retry: DEFAULT_MAX_RETRY,
            out_srs: DEFAULT_OUT_SRS,
            out_nodata_value: None,
        }
    }
}

/// Where tiles and the VRT live while a run is in progress
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagingArea {
    pub tiles_dir: PathBuf,
    pub vrt_path: PathBuf,
    /// Remove everything after a successful run
    pub cleanup: bool,
}

impl StagingArea {
    /// A fresh temp directory, or `raw_data_folder` (created if missing) when given
    pub fn prepare(service_name: &str, raw_data_folder: Option<&Path>) -> Result<Self> {
        match raw_data_folder {
            Some(folder) => Self::persistent(service_name, folder),
            None => Self::temporary_in(service_name, &get_temp_path()),
        }
    }

    /// New uniquely named directory under `parent`, removed after success
    pub fn temporary_in(service_name: &str, parent: &Path) -> Result<Self> {
        let tiles_dir = tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .tempdir_in(parent)
            .with_context(|| format!("Failed to create staging directory in {:?}", parent))?
            .keep();
        let vrt_path = parent_dir(&tiles_dir).join(vrt_file_name(service_name));
        Ok(StagingArea {
            tiles_dir,
            vrt_path,
            cleanup: true,
        })
    }

    /// Caller-owned directory kept after the run
    pub fn persistent(service_name: &str, folder: &Path) -> Result<Self> {
        ensure_dir(folder)?;
        Ok(StagingArea {
            tiles_dir: folder.to_path_buf(),
            vrt_path: parent_dir(folder).join(vrt_file_name(service_name)),
            cleanup: false,
        })
    }
}

/// `<service name, lowercase>.vrt`, placed next to the staging directory;
/// folder separators are flattened
fn vrt_file_name(service_name: &str) -> String {
    format!("{}.vrt", service_name.to_lowercase().replace('/', "_"))
}

/// What a successful run produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineOutcome {
    pub output_path: PathBuf,
    pub tiles: Vec<PathBuf>,
    pub staging: StagingArea,
}

fn run_stages<C: HttpClient, R: ToolRunner>(
    collect: &ArcgisCollect<C>,
    runner: &R,
    staging: &StagingArea,
    output_path: &Path,
    bbox_path: Option<&Path>,
    options: &DownloadOptions,
) -> Result<Vec<PathBuf>> {
    let bbox = bbox_path.map(read_bbox_from_vector).transpose()?;
    let tiles = collect.download_raster_tiles(&staging.tiles_dir, bbox.as_ref())?;

    create_vrt_with(runner, &tiles, &staging.vrt_path)?;

    log::info!("Converting to COG...");
    CogBuilder::with_runner(
        runner,
        CogOptions::new(options.out_srs, options.out_nodata_value),
    )
    .build(&staging.vrt_path, output_path)?;

    Ok(tiles)
}

/// Run the whole pipeline inside an already prepared staging area
///
/// On failure nothing is removed, so a new run against the same staging
/// directory resumes from the tiles already on disk.
pub fn run_in_staging<C: HttpClient, R: ToolRunner>(
    collect: &ArcgisCollect<C>,
    runner: &R,
    staging: StagingArea,
    output_path: &Path,
    bbox_path: Option<&Path>,
    options: &DownloadOptions,
) -> Result<PipelineOutcome> {
    ensure_dir(&parent_dir(output_path))?;

    match run_stages(collect, runner, &staging, output_path, bbox_path, options) {
        Ok(tiles) => {
            if staging.cleanup {
                let failures = cleanup_temp_files(&tiles, &staging.tiles_dir, &staging.vrt_path);
                if failures > 0 {
                    log::warn!("{} temporary file(s) could not be removed", failures);
                }
            }
            log::info!("Done!");
            Ok(PipelineOutcome {
                output_path: output_path.to_path_buf(),
                tiles,
                staging,
            })
        }
        Err(e) => {
            log::error!("Error during processing: {:#}", e);
            log::error!("Raster tiles preserved in: {:?}", staging.tiles_dir);
            Err(e)
        }
    }
}

/// [`run_in_staging`] with the staging area chosen from `options`
pub fn download_and_create_cog_with<C: HttpClient, R: ToolRunner>(
    mut collect: ArcgisCollect<C>,
    runner: &R,
    output_path: &Path,
    bbox_path: Option<&Path>,
    options: &DownloadOptions,
) -> Result<PipelineOutcome> {
    collect.set_max_retry(options.max_retry);
    collect.set_out_srs(options.out_srs);

    let staging =
        StagingArea::prepare(collect.service_name(), options.raw_data_folder.as_deref())?;
    run_in_staging(&collect, runner, staging, output_path, bbox_path, options)
}

/// Download the tiles of `service_name` intersecting a boundary file and
/// assemble them into a COG at `output_path`
pub fn download_and_create_cog(
    service_url: &str,
    service_name: &str,
    output_path: &Path,
    bbox_path: Option<&Path>,
    options: &DownloadOptions,
) -> Result<PipelineOutcome> {
    let collect = ArcgisCollect::<ReqwestClient>::new(service_url, service_name)?;
    download_and_create_cog_with(collect, &GdalCli, output_path, bbox_path, options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collect::http::testing::{FakeImageServer, MockHttp};
    use crate::raster::tools::testing::RecordingRunner;
    use std::fs;
    use tempfile::TempDir;

    const SERVICE_URL: &str = "https://gis.example.org/image/rest/services";
    const SERVICE: &str = "OGD_DOP";

    fn collect() -> ArcgisCollect<MockHttp> {
        let server = FakeImageServer::new(
            SERVICE_URL,
            SERVICE,
            &[(1, r"D:\dop\T_1.tif"), (2, r"D:\dop\Ov_T.tif"), (3, r"D:\dop\T_2.tif")],
        );
        ArcgisCollect::with_client(server.into_mock(), SERVICE_URL, SERVICE).unwrap()
    }

    #[test]
    fn test_staging_temporary() {
        let root = TempDir::new().unwrap();
        let staging = StagingArea::temporary_in("OGD_DOP", root.path()).unwrap();
        assert!(staging.tiles_dir.is_dir());
        assert!(staging.tiles_dir.starts_with(root.path()));
        assert_eq!(staging.vrt_path, root.path().join("ogd_dop.vrt"));
        assert!(staging.cleanup);
    }

    #[test]
    fn test_staging_persistent() {
        let root = TempDir::new().unwrap();
        let raw = root.path().join("raw").join("dop");
        let staging = StagingArea::persistent("Folder/Luftbild_2019", &raw).unwrap();
        assert!(raw.is_dir());
        assert_eq!(
            staging.vrt_path,
            root.path().join("raw").join("folder_luftbild_2019.vrt")
        );
        assert!(!staging.cleanup);
    }

    #[test]
    fn test_success_removes_staging() {
        let root = TempDir::new().unwrap();
        let staging = StagingArea::temporary_in(SERVICE, root.path()).unwrap();
        let output = root.path().join("out").join("dop.tif");
        let runner = RecordingRunner::new();

        let outcome = run_in_staging(
            &collect(),
            &runner,
            staging,
            &output,
            None,
            &DownloadOptions::default(),
        )
        .unwrap();

        assert!(output.is_file());
        assert_eq!(outcome.tiles.len(), 2);
        assert!(!outcome.staging.tiles_dir.exists());
        assert!(!outcome.staging.vrt_path.exists());
        for tile in &outcome.tiles {
            assert!(!tile.exists());
        }
        assert_eq!(
            runner.programs(),
            vec!["gdalbuildvrt", "gdalwarp", "gdal_translate", "gdaladdo", "gdal_translate"]
        );
    }

    #[test]
    fn test_failure_preserves_tiles() {
        let root = TempDir::new().unwrap();
        let staging = StagingArea::temporary_in(SERVICE, root.path()).unwrap();
        let tiles_dir = staging.tiles_dir.clone();
        let output = root.path().join("dop.tif");
        let runner = RecordingRunner::failing_on("gdalwarp");

        let err = run_in_staging(
            &collect(),
            &runner,
            staging,
            &output,
            None,
            &DownloadOptions::default(),
        )
        .unwrap_err();

        assert!(format!("{:#}", err).contains("gdalwarp"));
        assert!(tiles_dir.is_dir());
        assert!(tiles_dir.join("T_1.tif").is_file());
        assert!(tiles_dir.join("T_2.tif").is_file());
        assert!(root.path().join("ogd_dop.vrt").is_file());
        assert!(!output.exists());
    }

    #[test]
    fn test_resume_after_failure() {
        let root = TempDir::new().unwrap();
        let raw = root.path().join("raw");
        let output = root.path().join("dop.tif");
        let options = DownloadOptions {
            raw_data_folder: Some(raw.clone()),
            ..Default::default()
        };

        let failing = RecordingRunner::failing_on("gdaladdo");
        let first = collect();
        let staging = StagingArea::prepare(SERVICE, Some(raw.as_path())).unwrap();
        assert!(run_in_staging(&first, &failing, staging, &output, None, &options).is_err());
        assert_eq!(first.client().count("/file"), 2);

        let second = collect();
        let staging = StagingArea::prepare(SERVICE, Some(raw.as_path())).unwrap();
        let outcome =
            run_in_staging(&second, &RecordingRunner::new(), staging, &output, None, &options)
                .unwrap();
        assert_eq!(second.client().count("/file"), 0);
        assert!(output.is_file());

        // persistent raw data is never cleaned up
        assert!(raw.join("T_1.tif").is_file());
        assert!(outcome.staging.vrt_path.is_file());
    }

    #[test]
    fn test_options_applied_to_collect() {
        let root = TempDir::new().unwrap();
        let output = root.path().join("dop.tif");
        let runner = RecordingRunner::new();
        let options = DownloadOptions {
            raw_data_folder: Some(root.path().join("raw")),
            out_srs: 31256,
            out_nodata_value: Some(0.0),
            max_retry: 2,
        };

        download_and_create_cog_with(collect(), &runner, &output, None, &options).unwrap();
        let invocations = runner.invocations.borrow();
        assert!(invocations[1].args_lossy().contains(&"EPSG:31256".to_string()));
        assert!(invocations[2].args_lossy().contains(&"-a_nodata".to_string()));
        assert!(fs::metadata(&output).is_ok());
    }
}
