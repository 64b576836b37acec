use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use clap_verbosity_flag::{InfoLevel, Verbosity};
use std::path::PathBuf;

use arcgis_cog::collect::global_variables::{DEFAULT_MAX_RETRY, DEFAULT_OUT_SRS};
use arcgis_cog::collect::http::ReqwestClient;
use arcgis_cog::{
    download_and_create_cog, download_raster_tiles_from_service_url, get_arcgis_services,
    read_bbox_from_vector, DownloadOptions, ServiceCatalog,
};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Download ArcGIS ImageServer tiles and assemble them into a Cloud-Optimized GeoTIFF",
    long_about = None,
    propagate_version = true,
    disable_help_subcommand = true,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    verbose: Verbosity<InfoLevel>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List the services published under an ArcGIS REST services root
    Services {
        /// Services root, e.g. https://host/image/rest/services
        base_url: String,
        /// Only show services of this type, e.g. ImageServer
        #[arg(long = "type")]
        service_type: Option<String>,
    },

    /// Download the raw tiles of an image service into a directory
    Download {
        #[command(flatten)]
        service: ServiceArgs,
        /// Directory receiving tiles and metadata
        output_dir: PathBuf,
    },

    /// Download tiles and build a Cloud-Optimized GeoTIFF
    Cog {
        #[command(flatten)]
        service: ServiceArgs,
        /// Path of the COG to write
        output: PathBuf,
        /// Keep raw tiles in this directory instead of a temp directory
        #[arg(long)]
        raw_data_folder: Option<PathBuf>,
        /// Nodata value stamped into the output
        #[arg(long, allow_hyphen_values = true)]
        nodata: Option<f64>,
    },

    /// Print the combined extent of a vector boundary file
    Bbox {
        path: PathBuf,
    },
}

#[derive(Args, Debug)]
struct ServiceArgs {
    /// Services root, e.g. https://host/image/rest/services
    service_url: String,
    /// Service name, e.g. OGD_DOP/Luftbild_2019
    service_name: String,
    /// Vector boundary file; all tiles are fetched when omitted
    #[arg(long)]
    bbox: Option<PathBuf>,
    /// Attempts per tile download
    #[arg(long, default_value_t = DEFAULT_MAX_RETRY)]
    max_retry: u32,
    /// Output EPSG code
    #[arg(long, default_value_t = DEFAULT_OUT_SRS)]
    out_srs: u32,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    env_logger::Builder::new()
        .filter_level(cli.verbose.log_level_filter())
        .format_timestamp(None)
        .init();

    run(cli)
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Services {
            base_url,
            service_type,
        } => {
            let client = ReqwestClient::new();
            let catalog = get_arcgis_services(&client, &base_url)?;
            let catalog = match service_type {
                Some(t) => ServiceCatalog::new(catalog.of_type(&t).cloned().collect()),
                None => catalog,
            };
            print_catalog(&catalog)
        }
        Commands::Download {
            service,
            output_dir,
        } => {
            let files = download_raster_tiles_from_service_url(
                &service.service_url,
                &service.service_name,
                &output_dir,
                service.bbox.as_deref(),
                service.max_retry,
                service.out_srs,
            )?;
            println!("{} tile(s) in {:?}", files.len(), output_dir);
            Ok(())
        }
        Commands::Cog {
            service,
            output,
            raw_data_folder,
            nodata,
        } => {
            let options = DownloadOptions {
                raw_data_folder,
                max_retry: service.max_retry,
                out_srs: service.out_srs,
                out_nodata_value: nodata,
            };
            let outcome = download_and_create_cog(
                &service.service_url,
                &service.service_name,
                &output,
                service.bbox.as_deref(),
                &options,
            )?;
            println!("{:?}", outcome.output_path);
            Ok(())
        }
        Commands::Bbox { path } => {
            let bbox = read_bbox_from_vector(&path)?;
            println!("{}", bbox.to_envelope_string());
            Ok(())
        }
    }
}

#[cfg(feature = "polars")]
fn print_catalog(catalog: &ServiceCatalog) -> Result<()> {
    println!("{}", catalog.to_polars_df()?);
    Ok(())
}

#[cfg(not(feature = "polars"))]
fn print_catalog(catalog: &ServiceCatalog) -> Result<()> {
    for record in catalog.records() {
        println!(
            "{}\t{}\t{}\t{}",
            record.category,
            record.service_name,
            record.year.as_deref().unwrap_or("-"),
            record.service_type
        );
    }
    Ok(())
}
