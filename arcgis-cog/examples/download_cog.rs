use anyhow::Result;
use arcgis_cog::{download_and_create_cog, get_arcgis_services, DownloadOptions};
use arcgis_cog::collect::http::ReqwestClient;
use std::path::Path;

/// Example: list the image services of a server, then build a COG from one
/// of them, clipped to the extent of a boundary file
fn main() -> Result<()> {
    println!("=== Example: ArcGIS ImageServer tiles to COG ===\n");

    let service_url = "https://gis.stmk.gv.at/image/rest/services";
    let service_name = "OGD_DOP/Luftbild_2019";

    let catalog = get_arcgis_services(&ReqwestClient::new(), service_url)?;
    println!("{} service(s) published, image services:", catalog.len());
    for record in catalog.of_type("ImageServer") {
        println!(
            "  - {} / {} ({})",
            record.category,
            record.service_name,
            record.year.as_deref().unwrap_or("no year")
        );
    }

    // Tiles are kept in ./output/raw so an interrupted run can be resumed
    let options = DownloadOptions {
        raw_data_folder: Some("./output/raw".into()),
        out_srs: 31256,
        out_nodata_value: Some(0.0),
        ..Default::default()
    };

    println!("\nDownloading {} ...", service_name);
    let outcome = download_and_create_cog(
        service_url,
        service_name,
        Path::new("./output/luftbild_2019.tif"),
        Some(Path::new("./output/boundary.gpkg")),
        &options,
    )?;

    println!("\nCOG created successfully!");
    println!("  - Output: {:?}", outcome.output_path);
    println!("  - Tiles: {}", outcome.tiles.len());

    Ok(())
}
