use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::raster::tools::{GdalCli, ToolInvocation, ToolRunner};

/// `gdalbuildvrt <output> <tile>...`
pub fn vrt_invocation<P: AsRef<Path>>(tile_paths: &[P], output_vrt: &Path) -> ToolInvocation {
    ToolInvocation::new("gdalbuildvrt")
        .arg(output_vrt)
        .args(tile_paths.iter().map(|p| p.as_ref().as_os_str()))
        .output(output_vrt)
}

/// Build a VRT mosaic referencing every tile, with the given runner
pub fn create_vrt_with<R: ToolRunner, P: AsRef<Path>>(
    runner: &R,
    tile_paths: &[P],
    output_vrt: &Path,
) -> Result<PathBuf> {
    if tile_paths.is_empty() {
        anyhow::bail!("No tiles to build {:?} from", output_vrt);
    }

    log::info!("Creating VRT from {} tile(s)...", tile_paths.len());
    runner
        .run(&vrt_invocation(tile_paths, output_vrt))
        .with_context(|| format!("Failed to build VRT {:?}", output_vrt))?;
    Ok(output_vrt.to_path_buf())
}

/// Build a VRT mosaic referencing every tile with `gdalbuildvrt`
pub fn create_vrt_from_tiles<P: AsRef<Path>>(tile_paths: &[P], output_vrt: &Path) -> Result<PathBuf> {
    create_vrt_with(&GdalCli, tile_paths, output_vrt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ArcgisError;
    use crate::raster::tools::testing::RecordingRunner;
    use tempfile::TempDir;

    #[test]
    fn test_vrt_arguments() {
        let tiles = vec![PathBuf::from("/t/a.tif"), PathBuf::from("/t/b.tif")];
        let invocation = vrt_invocation(&tiles, Path::new("/t/mosaic.vrt"));
        assert_eq!(invocation.program, "gdalbuildvrt");
        assert_eq!(
            invocation.args_lossy(),
            vec!["/t/mosaic.vrt", "/t/a.tif", "/t/b.tif"]
        );
    }

    #[test]
    fn test_create_vrt_with_runner() {
        let dir = TempDir::new().unwrap();
        let runner = RecordingRunner::new();
        let vrt = dir.path().join("ogd_dop.vrt");

        let out = create_vrt_with(&runner, &[dir.path().join("a.tif")], &vrt).unwrap();
        assert_eq!(out, vrt);
        assert!(vrt.exists());
        assert_eq!(runner.programs(), vec!["gdalbuildvrt"]);
    }

    #[test]
    fn test_tool_failure_propagates() {
        let dir = TempDir::new().unwrap();
        let runner = RecordingRunner::failing_on("gdalbuildvrt");
        let err = create_vrt_with(&runner, &[dir.path().join("a.tif")], &dir.path().join("m.vrt"))
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ArcgisError>(),
            Some(ArcgisError::ToolFailed { .. })
        ));
    }

    #[test]
    fn test_empty_tile_list() {
        let runner = RecordingRunner::new();
        let tiles: Vec<PathBuf> = Vec::new();
        assert!(create_vrt_with(&runner, &tiles, Path::new("m.vrt")).is_err());
        assert!(runner.programs().is_empty());
    }
}
