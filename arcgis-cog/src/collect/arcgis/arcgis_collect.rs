use anyhow::{Context, Result};
use serde_json::Value;
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use url::Url;

use crate::collect::global_variables::{
    DEFAULT_MAX_RETRY, DEFAULT_OUT_SRS, OVERVIEW_PREFIX, QUERY_IN_SRS,
};
use crate::collect::http::{HttpClient, Params, ReqwestClient};
use crate::commons::progress::TileProgress;
use crate::error::ArcgisError;
use crate::geo_core::{read_bbox_from_vector, BoundingBox};

/// Parameters of an ImageServer `/file` request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileParams {
    /// Server-side raster path (`rasterFiles[0].id` of the download answer)
    pub id: String,
    pub raster_id: String,
}

impl FileParams {
    fn to_query(&self) -> Vec<(&'static str, String)> {
        vec![("id", self.id.clone()), ("rasterId", self.raster_id.clone())]
    }
}

/// A tile resolved to a downloadable file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileDescriptor {
    pub object_id: i64,
    /// Local filename, the last segment of the server path
    pub filename: String,
    pub params: FileParams,
}

/// Client for one ArcGIS ImageServer
/// Locates tiles intersecting a bounding box, resolves them to files and
/// downloads them into a directory
pub struct ArcgisCollect<C: HttpClient = ReqwestClient> {
    client: C,
    service_url: String,
    service_name: String,
    max_retry: u32,
    out_srs: u32,
}

impl ArcgisCollect<ReqwestClient> {
    pub fn new(service_url: &str, service_name: &str) -> Result<Self> {
        Self::with_client(ReqwestClient::new(), service_url, service_name)
    }
}

impl<C: HttpClient> ArcgisCollect<C> {
    pub fn with_client(client: C, service_url: &str, service_name: &str) -> Result<Self> {
        Url::parse(service_url).with_context(|| format!("Invalid service URL: {}", service_url))?;
        if service_name.is_empty() {
            anyhow::bail!("Service name must not be empty");
        }

        Ok(ArcgisCollect {
            client,
            service_url: service_url.trim_end_matches('/').to_string(),
            service_name: service_name.to_string(),
            max_retry: DEFAULT_MAX_RETRY,
            out_srs: DEFAULT_OUT_SRS,
        })
    }

    /// Attempts per tile content request, first attempt included (at least 1)
    pub fn set_max_retry(&mut self, max_retry: u32) {
        self.max_retry = max_retry.max(1);
    }

    pub fn get_max_retry(&self) -> u32 {
        self.max_retry
    }

    /// Output spatial reference requested from the tile query (`outSR`)
    pub fn set_out_srs(&mut self, out_srs: u32) {
        self.out_srs = out_srs;
    }

    pub fn get_out_srs(&self) -> u32 {
        self.out_srs
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn image_server_url(&self) -> String {
        format!("{}/{}/ImageServer", self.service_url, self.service_name)
    }

    fn endpoint(&self, name: &str) -> String {
        format!("{}/{}", self.image_server_url(), name)
    }

    /// Parameters of the `/query` request
    /// Spatial intersects query when a bbox is given, otherwise every record
    pub fn query_params(&self, bbox: Option<&BoundingBox>) -> Vec<(&'static str, String)> {
        match bbox {
            Some(bbox) => vec![
                ("where", "1=1".to_string()),
                ("geometry", bbox.to_envelope_string()),
                ("geometryType", "esriGeometryEnvelope".to_string()),
                ("inSR", QUERY_IN_SRS.to_string()),
                ("spatialRel", "esriSpatialRelIntersects".to_string()),
                ("returnGeometry", "false".to_string()),
                ("returnIdsOnly", "true".to_string()),
                ("outSR", self.out_srs.to_string()),
                ("f", "json".to_string()),
            ],
            None => vec![
                ("where", "1=1".to_string()),
                ("f", "json".to_string()),
                ("returnIdsOnly", "true".to_string()),
            ],
        }
    }

    fn get_checked_json(&self, url: &str, params: &Params) -> Result<Value> {
        let data = self.client.get_json(url, params)?;
        check_error_envelope(&data)?;
        Ok(data)
    }

    /// Object ids of the tiles intersecting `bbox` (all tiles when `None`)
    pub fn locate_tiles(&self, bbox: Option<&BoundingBox>) -> Result<Vec<i64>> {
        let url = self.endpoint("query");
        let data = self
            .get_checked_json(&url, &self.query_params(bbox))
            .with_context(|| format!("Failed to query tiles of {}", self.service_name))?;

        let ids = match data.get("objectIds") {
            None => return Err(ArcgisError::malformed(&url, "missing `objectIds`").into()),
            Some(Value::Null) => Vec::new(),
            Some(Value::Array(values)) => values
                .iter()
                .map(|v| {
                    v.as_i64()
                        .ok_or_else(|| ArcgisError::malformed(&url, format!("bad object id {}", v)))
                })
                .collect::<Result<Vec<_>, _>>()?,
            Some(other) => {
                return Err(
                    ArcgisError::malformed(&url, format!("`objectIds` is not a list: {}", other))
                        .into(),
                )
            }
        };

        if ids.is_empty() {
            return Err(ArcgisError::NoData.into());
        }
        log::info!("{} tile(s) found in {}", ids.len(), self.service_name);
        Ok(ids)
    }

    /// Fetch the ImageServer metadata and write it to `<output_dir>/<service_name>.json`
    pub fn save_service_metadata(&self, output_dir: &Path) -> Result<PathBuf> {
        let url = self.image_server_url();
        let metadata = self
            .client
            .get_json(&url, &[("f", "pjson".to_string())])
            .with_context(|| format!("Failed to fetch metadata of {}", self.service_name))?;

        let path = output_dir.join(format!("{}.json", self.service_name));
        write_json(&path, &metadata)?;
        log::info!("Metadata saved to {:?}", path);
        Ok(path)
    }

    /// Resolve object ids to downloadable files
    ///
    /// Overview rasters (`Ov_*`) are dropped. A filename resolved twice keeps
    /// its first position and the parameters of the last resolution.
    pub fn resolve_tiles(&self, object_ids: &[i64]) -> Result<Vec<TileDescriptor>> {
        let url = self.endpoint("download");
        let mut tiles: Vec<TileDescriptor> = Vec::new();
        let mut positions: HashMap<String, usize> = HashMap::new();

        log::info!("Gathering tile information...");
        let progress = TileProgress::new(object_ids.len(), "Processing tiles");
        for &object_id in object_ids {
            let params = [("rasterIds", object_id.to_string()), ("f", "json".to_string())];
            let data = self
                .get_checked_json(&url, &params)
                .with_context(|| format!("Failed to resolve tile {}", object_id))?;

            let server_path = data
                .get("rasterFiles")
                .and_then(|files| files.get(0))
                .and_then(|file| file.get("id"))
                .and_then(Value::as_str)
                .ok_or_else(|| {
                    ArcgisError::malformed(&url, format!("no `rasterFiles[0].id` for tile {}", object_id))
                })?;

            let filename = file_name_of(server_path);
            if filename.is_empty() {
                return Err(ArcgisError::malformed(
                    &url,
                    format!("empty file name in {:?}", server_path),
                )
                .into());
            }
            progress.inc();

            if filename.starts_with(OVERVIEW_PREFIX) {
                log::debug!("Skipping overview raster {}", filename);
                continue;
            }

            let tile = TileDescriptor {
                object_id,
                filename: filename.to_string(),
                params: FileParams {
                    id: server_path.to_string(),
                    raster_id: object_id.to_string(),
                },
            };
            match positions.get(filename) {
                Some(&index) => tiles[index] = tile,
                None => {
                    positions.insert(tile.filename.clone(), tiles.len());
                    tiles.push(tile);
                }
            }
        }
        progress.finish("Tile information gathered");

        Ok(tiles)
    }

    /// Content of one tile, retried on failure up to `max_retry` attempts
    pub fn fetch_content(&self, params: &FileParams) -> Result<Vec<u8>> {
        let url = self.endpoint("file");
        let query = params.to_query();
        let mut attempt = 1;
        loop {
            match self.client.get_bytes(&url, &query) {
                Ok(bytes) => return Ok(bytes),
                Err(e) => {
                    log::warn!("Request failed: {:#}", e);
                    if attempt >= self.max_retry {
                        return Err(ArcgisError::RetriesExhausted {
                            url,
                            attempts: attempt,
                            last_error: format!("{:#}", e),
                        }
                        .into());
                    }
                    attempt += 1;
                    log::warn!("Repeating request ({}/{})...", attempt, self.max_retry);
                }
            }
        }
    }

    /// Per-raster metadata (`<ImageServer>/<rasterId>?f=pjson`), not retried
    pub fn fetch_tile_metadata(&self, raster_id: &str) -> Result<Value> {
        self.client
            .get_json(&self.endpoint(raster_id), &[("f", "pjson".to_string())])
            .with_context(|| format!("Failed to fetch metadata of raster {}", raster_id))
    }

    /// Download tiles into `output_dir`, skipping files already present
    ///
    /// Each tile yields `<filename>` and a `<stem>.json` metadata sidecar.
    /// Returns payload paths in processing order, including skipped ones.
    pub fn fetch_tiles(&self, tiles: &[TileDescriptor], output_dir: &Path) -> Result<Vec<PathBuf>> {
        let mut output_files = Vec::with_capacity(tiles.len());

        log::info!("Downloading tiles...");
        let progress = TileProgress::new(tiles.len(), "Downloading tiles");
        for tile in tiles {
            let output_path = output_dir.join(&tile.filename);

            if output_path.is_file() {
                log::debug!("{} already downloaded", tile.filename);
                output_files.push(output_path);
                progress.inc();
                continue;
            }

            let content = self
                .fetch_content(&tile.params)
                .with_context(|| format!("Failed to download tile {}", tile.filename))?;
            let metadata = self.fetch_tile_metadata(&tile.params.raster_id)?;

            write_bytes(&output_path, &content)?;
            write_json(&output_path.with_extension("json"), &metadata)?;

            output_files.push(output_path);
            progress.inc();
        }
        progress.finish("Tiles downloaded");

        log::info!(
            "Downloaded {} tiles to {:?}",
            output_files.len(),
            output_dir
        );
        Ok(output_files)
    }

    /// Locate, resolve and download every tile intersecting `bbox`
    pub fn download_raster_tiles(
        &self,
        output_dir: &Path,
        bbox: Option<&BoundingBox>,
    ) -> Result<Vec<PathBuf>> {
        fs::create_dir_all(output_dir)
            .with_context(|| format!("Failed to create directory: {:?}", output_dir))?;

        log::info!("Downloading tiles from service: {}", self.service_name);
        let object_ids = self.locate_tiles(bbox)?;
        self.save_service_metadata(output_dir)?;
        let tiles = self.resolve_tiles(&object_ids)?;
        self.fetch_tiles(&tiles, output_dir)
    }
}

/// Download every tile of `service_name` intersecting the extent of a boundary file
pub fn download_raster_tiles_from_service_url(
    service_url: &str,
    service_name: &str,
    output_directory: &Path,
    bbox_path: Option<&Path>,
    max_retry: u32,
    out_srs: u32,
) -> Result<Vec<PathBuf>> {
    let mut collect = ArcgisCollect::new(service_url, service_name)?;
    collect.set_max_retry(max_retry);
    collect.set_out_srs(out_srs);

    let bbox = bbox_path.map(read_bbox_from_vector).transpose()?;
    collect.download_raster_tiles(output_directory, bbox.as_ref())
}

/// Fail with [`ArcgisError::Service`] when the answer is an `{"error": ...}` envelope
pub fn check_error_envelope(data: &Value) -> Result<(), ArcgisError> {
    let Some(error) = data.get("error") else {
        return Ok(());
    };

    let detail = match error.get("details").and_then(|d| d.get(0)) {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    };
    log::error!("Error details: {}", detail);

    Err(ArcgisError::Service {
        code: error.get("code").and_then(Value::as_i64).unwrap_or_default(),
        message: error
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        detail,
    })
}

/// Last segment of a server-side path, Windows or POSIX separators
pub fn file_name_of(server_path: &str) -> &str {
    server_path
        .rsplit(|c| c == '\\' || c == '/')
        .next()
        .unwrap_or(server_path)
}

/// Write through a sibling `.part` file so an interrupted write never leaves
/// a truncated payload that a resumed run would take as complete
fn write_bytes(path: &Path, content: &[u8]) -> Result<()> {
    let mut partial = path.as_os_str().to_owned();
    partial.push(".part");
    let partial = PathBuf::from(partial);

    fs::write(&partial, content).with_context(|| format!("Failed to write file: {:?}", partial))?;
    fs::rename(&partial, path)
        .with_context(|| format!("Failed to move {:?} to {:?}", partial, path))?;
    Ok(())
}

fn write_json(path: &Path, value: &Value) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {:?}", parent))?;
    }
    let file = File::create(path).with_context(|| format!("Failed to create file: {:?}", path))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer(&mut writer, value)
        .with_context(|| format!("Failed to write JSON to {:?}", path))?;
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collect::http::testing::{FakeImageServer, MockHttp, Reply};
    use serde_json::json;
    use tempfile::TempDir;

    const SERVICE_URL: &str = "https://gis.example.org/image/rest/services";
    const SERVICE: &str = "OGD_DOP";

    fn collect_for(server: FakeImageServer) -> ArcgisCollect<MockHttp> {
        ArcgisCollect::with_client(server.into_mock(), SERVICE_URL, SERVICE).unwrap()
    }

    fn three_tiles() -> FakeImageServer {
        FakeImageServer::new(
            SERVICE_URL,
            SERVICE,
            &[
                (1, r"D:\data\dop\2019\T_0001.tif"),
                (2, r"D:\data\dop\2019\Ov_i0_L01.tif"),
                (3, r"D:\data\dop\2019\T_0002.tif"),
            ],
        )
    }

    #[test]
    fn test_query_params_with_bbox() {
        let collect = collect_for(three_tiles());
        let bbox = BoundingBox::new(10.0, 45.0, 10.5, 45.5);
        let params: HashMap<_, _> = collect.query_params(Some(&bbox)).into_iter().collect();

        assert_eq!(params["geometry"], "10.0,45.0,10.5,45.5");
        assert_eq!(params["geometryType"], "esriGeometryEnvelope");
        assert_eq!(params["inSR"], "32633");
        assert_eq!(params["outSR"], "32633");
        assert_eq!(params["spatialRel"], "esriSpatialRelIntersects");
        assert_eq!(params["returnIdsOnly"], "true");
        assert_eq!(params["returnGeometry"], "false");
    }

    #[test]
    fn test_query_params_without_bbox() {
        let mut collect = collect_for(three_tiles());
        collect.set_out_srs(31256);
        let params: HashMap<_, _> = collect.query_params(None).into_iter().collect();
        assert_eq!(params.len(), 3);
        assert_eq!(params["where"], "1=1");
        assert!(!params.contains_key("geometry"));

        let bbox = BoundingBox::new(0.0, 0.0, 1.0, 1.0);
        let params: HashMap<_, _> = collect.query_params(Some(&bbox)).into_iter().collect();
        assert_eq!(params["outSR"], "31256");
        assert_eq!(params["inSR"], "32633");
    }

    #[test]
    fn test_invalid_service_url() {
        let http = MockHttp::new(|_, _| Reply::Fail("unused".to_string()));
        assert!(ArcgisCollect::with_client(http, "not a url", SERVICE).is_err());
    }

    #[test]
    fn test_locate_tiles_empty_is_no_data() {
        for answer in [json!({ "objectIds": [] }), json!({ "objectIds": null })] {
            let http = MockHttp::new(move |_, _| Reply::Json(answer.clone()));
            let collect = ArcgisCollect::with_client(http, SERVICE_URL, SERVICE).unwrap();
            let err = collect.locate_tiles(None).unwrap_err();
            assert!(matches!(
                err.downcast_ref::<ArcgisError>(),
                Some(ArcgisError::NoData)
            ));
            assert!(err.to_string().contains("No data available"));
        }
    }

    #[test]
    fn test_locate_tiles_malformed() {
        let http = MockHttp::new(|_, _| Reply::Json(json!({ "count": 3 })));
        let collect = ArcgisCollect::with_client(http, SERVICE_URL, SERVICE).unwrap();
        let err = collect.locate_tiles(None).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ArcgisError>(),
            Some(ArcgisError::MalformedResponse { .. })
        ));
    }

    #[test]
    fn test_resolve_excludes_overviews() {
        let collect = collect_for(three_tiles());
        let tiles = collect.resolve_tiles(&[1, 2, 3]).unwrap();
        let names: Vec<&str> = tiles.iter().map(|t| t.filename.as_str()).collect();
        assert_eq!(names, vec!["T_0001.tif", "T_0002.tif"]);
        assert_eq!(tiles[1].params.id, r"D:\data\dop\2019\T_0002.tif");
        assert_eq!(tiles[1].params.raster_id, "3");
    }

    #[test]
    fn test_resolve_keeps_each_filename_once() {
        let server = FakeImageServer::new(
            SERVICE_URL,
            SERVICE,
            &[(1, "/a/T_1.tif"), (2, "/b/T_1.tif"), (3, "/a/T_2.tif")],
        );
        let collect = collect_for(server);
        let tiles = collect.resolve_tiles(&[1, 2, 3]).unwrap();
        assert_eq!(tiles.len(), 2);
        assert_eq!(tiles[0].filename, "T_1.tif");
        assert_eq!(tiles[0].params.raster_id, "2");
        assert_eq!(tiles[1].filename, "T_2.tif");
    }

    #[test]
    fn test_resolve_error_envelope() {
        let collect = collect_for(three_tiles());
        let err = collect.resolve_tiles(&[1, 99]).unwrap_err();
        match err.downcast_ref::<ArcgisError>() {
            Some(ArcgisError::Service {
                code,
                message,
                detail,
            }) => {
                assert_eq!(*code, 400);
                assert_eq!(message, "Unable to complete operation.");
                assert_eq!(detail, "raster 99 not found");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_file_name_of() {
        assert_eq!(file_name_of(r"D:\data\T_0001.tif"), "T_0001.tif");
        assert_eq!(file_name_of("/srv/data/T_0001.tif"), "T_0001.tif");
        assert_eq!(file_name_of("T_0001.tif"), "T_0001.tif");
    }

    #[test]
    fn test_download_writes_tiles_and_sidecars() {
        let dir = TempDir::new().unwrap();
        let collect = collect_for(three_tiles());
        let bbox = BoundingBox::new(10.0, 45.0, 10.5, 45.5);

        let files = collect.download_raster_tiles(dir.path(), Some(&bbox)).unwrap();
        assert_eq!(
            files,
            vec![dir.path().join("T_0001.tif"), dir.path().join("T_0002.tif")]
        );
        assert_eq!(
            fs::read(&files[0]).unwrap(),
            br"tile:D:\data\dop\2019\T_0001.tif".to_vec()
        );
        assert!(dir.path().join("T_0001.json").is_file());
        assert!(dir.path().join("T_0002.json").is_file());
        assert!(!dir.path().join("T_0001.tif.part").exists());

        let metadata: Value =
            serde_json::from_slice(&fs::read(dir.path().join("OGD_DOP.json")).unwrap()).unwrap();
        assert_eq!(metadata["serviceDataType"], "esriImageServiceDataTypeRGB");

        let query = collect.client().params_of("/query");
        assert_eq!(query[0]["geometry"], "10.0,45.0,10.5,45.5");
        assert_eq!(collect.client().count("/file"), 2);
    }

    #[test]
    fn test_second_fetch_skips_existing() {
        let dir = TempDir::new().unwrap();
        let collect = collect_for(three_tiles());
        let tiles = collect.resolve_tiles(&[1, 2, 3]).unwrap();

        let first = collect.fetch_tiles(&tiles, dir.path()).unwrap();
        assert_eq!(collect.client().count("/file"), 2);

        let second = collect.fetch_tiles(&tiles, dir.path()).unwrap();
        assert_eq!(collect.client().count("/file"), 2);
        assert_eq!(first, second);
    }

    #[test]
    fn test_partial_directory_resumes() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("T_0001.tif"), b"already here").unwrap();
        let collect = collect_for(three_tiles());
        let tiles = collect.resolve_tiles(&[1, 2, 3]).unwrap();

        let files = collect.fetch_tiles(&tiles, dir.path()).unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(collect.client().count("/file"), 1);
        assert_eq!(fs::read(&files[0]).unwrap(), b"already here".to_vec());
    }

    #[test]
    fn test_retry_succeeds_below_bound() {
        for failures in 0..5 {
            let collect = collect_for(three_tiles().failing_content(failures));
            let params = FileParams {
                id: "x.tif".to_string(),
                raster_id: "1".to_string(),
            };
            assert!(collect.fetch_content(&params).is_ok());
            assert_eq!(collect.client().count("/file"), failures as usize + 1);
        }
    }

    #[test]
    fn test_retry_exhausted_after_max_attempts() {
        for failures in [3, 4, 10] {
            let mut collect = collect_for(three_tiles().failing_content(failures));
            collect.set_max_retry(3);
            let params = FileParams {
                id: "x.tif".to_string(),
                raster_id: "1".to_string(),
            };
            let err = collect.fetch_content(&params).unwrap_err();
            assert_eq!(collect.client().count("/file"), 3);
            match err.downcast_ref::<ArcgisError>() {
                Some(ArcgisError::RetriesExhausted { attempts, .. }) => assert_eq!(*attempts, 3),
                other => panic!("unexpected error: {:?}", other),
            }
        }
    }

    #[test]
    fn test_max_retry_at_least_one() {
        let mut collect = collect_for(three_tiles());
        collect.set_max_retry(0);
        assert_eq!(collect.get_max_retry(), 1);
    }

    #[test]
    fn test_tile_metadata_not_retried() {
        let http = MockHttp::new(|url, _| {
            if url.ends_with("/file") {
                Reply::Bytes(b"data".to_vec())
            } else {
                Reply::Fail("metadata down".to_string())
            }
        });
        let collect = ArcgisCollect::with_client(http, SERVICE_URL, SERVICE).unwrap();
        let tiles = vec![TileDescriptor {
            object_id: 7,
            filename: "T_7.tif".to_string(),
            params: FileParams {
                id: "T_7.tif".to_string(),
                raster_id: "7".to_string(),
            },
        }];
        let dir = TempDir::new().unwrap();
        assert!(collect.fetch_tiles(&tiles, dir.path()).is_err());
        assert_eq!(collect.client().count("/ImageServer/7"), 1);
        assert!(!dir.path().join("T_7.tif").exists());
    }
}
