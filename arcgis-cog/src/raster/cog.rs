use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::collect::global_variables::DEFAULT_OUT_SRS;
use crate::raster::tools::{GdalCli, ToolInvocation, ToolRunner};

/// Options shared by the COG conversion stages
#[derive(Debug, Clone, PartialEq)]
pub struct CogOptions {
    /// Target EPSG code
    pub out_srs: u32,
    /// Nodata value stamped into the output, pixel values untouched
    pub nodata: Option<f64>,
    pub compression: String,
    pub overview_levels: Vec<u32>,
    pub resampling: String,
}

impl Default for CogOptions {
    fn default() -> Self {
        CogOptions {
            out_srs: DEFAULT_OUT_SRS,
            nodata: None,
            compression: "LZW".to_string(),
            overview_levels: vec![2, 4, 8, 16, 32],
            resampling: "average".to_string(),
        }
    }
}

impl CogOptions {
    pub fn new(out_srs: u32, nodata: Option<f64>) -> Self {
        CogOptions {
            out_srs,
            nodata,
            ..Default::default()
        }
    }

    fn compress(&self) -> String {
        format!("COMPRESS={}", self.compression)
    }
}

/// Stage 1: reproject into a virtual raster in the target SRS
pub fn warp_invocation(input: &Path, output: &Path, options: &CogOptions) -> ToolInvocation {
    ToolInvocation::new("gdalwarp")
        .args(["-of", "VRT", "-t_srs"])
        .arg(format!("EPSG:{}", options.out_srs))
        .arg(input)
        .arg(output)
        .output(output)
}

/// Stage 2: compressed GeoTIFF, nodata stamped when requested
pub fn gtiff_invocation(input: &Path, output: &Path, options: &CogOptions) -> ToolInvocation {
    let mut invocation = ToolInvocation::new("gdal_translate")
        .args(["-of", "GTiff", "-co"])
        .arg(options.compress());
    if let Some(nodata) = options.nodata {
        invocation = invocation.arg("-a_nodata").arg(nodata.to_string());
    }
    invocation.arg(input).arg(output).output(output)
}

/// Stage 3: internal overview pyramid, in place
pub fn overviews_invocation(tif: &Path, options: &CogOptions) -> ToolInvocation {
    ToolInvocation::new("gdaladdo")
        .arg("-r")
        .arg(&options.resampling)
        .arg(tif)
        .args(options.overview_levels.iter().map(u32::to_string))
        .output(tif)
}

/// Stage 4: repackage as COG, keeping the overviews built in stage 3
pub fn cog_invocation(input: &Path, output: &Path, options: &CogOptions) -> ToolInvocation {
    ToolInvocation::new("gdal_translate")
        .args(["-of", "COG", "-co"])
        .arg(options.compress())
        .args(["-co", "OVERVIEWS=IGNORE_EXISTING"])
        .arg(input)
        .arg(output)
        .output(output)
}

/// Converts a raster (typically the tile VRT) into a Cloud-Optimized GeoTIFF
pub struct CogBuilder<R: ToolRunner = GdalCli> {
    runner: R,
    options: CogOptions,
}

impl CogBuilder<GdalCli> {
    pub fn new(options: CogOptions) -> Self {
        CogBuilder {
            runner: GdalCli,
            options,
        }
    }
}

impl<R: ToolRunner> CogBuilder<R> {
    pub fn with_runner(runner: R, options: CogOptions) -> Self {
        CogBuilder { runner, options }
    }

    pub fn options(&self) -> &CogOptions {
        &self.options
    }

    /// The four stage command lines, intermediates placed in `work_dir`
    pub fn plan(&self, input: &Path, output: &Path, work_dir: &Path) -> [ToolInvocation; 4] {
        let temp_vrt = work_dir.join("temp.vrt");
        let temp_tif = work_dir.join("temp.tif");
        [
            warp_invocation(input, &temp_vrt, &self.options),
            gtiff_invocation(&temp_vrt, &temp_tif, &self.options),
            overviews_invocation(&temp_tif, &self.options),
            cog_invocation(&temp_tif, output, &self.options),
        ]
    }

    /// Run every stage; intermediates live in a temporary directory that is
    /// removed when this returns, whatever the outcome
    pub fn build(&self, input: &Path, output: &Path) -> Result<PathBuf> {
        let work_dir = tempfile::Builder::new()
            .prefix("cog-")
            .tempdir()
            .context("Failed to create temporary directory for COG conversion")?;

        for invocation in self.plan(input, output, work_dir.path()) {
            log::debug!("COG stage: {}", invocation.program);
            self.runner
                .run(&invocation)
                .with_context(|| format!("COG conversion of {:?} failed", input))?;
        }

        log::info!("COG written to {:?}", output);
        Ok(output.to_path_buf())
    }
}

/// Convert `input_path` to a COG at `output_path` with the GDAL utilities
pub fn create_cog(
    input_path: &Path,
    output_path: &Path,
    out_srs: u32,
    out_nodata_value: Option<f64>,
) -> Result<PathBuf> {
    CogBuilder::new(CogOptions::new(out_srs, out_nodata_value)).build(input_path, output_path)
}
