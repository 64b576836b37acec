use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

use crate::collect::http::{HttpClient, ReqwestClient};
use crate::error::ArcgisError;

static YEAR_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d{4}").unwrap());

/// One service advertised by an ArcGIS REST services directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceRecord {
    /// Folder part of `name`, empty for root-level services
    pub category: String,
    /// `name` without its folder
    pub service_name: String,
    /// First run of four digits in `service_name`
    pub year: Option<String>,
    /// Service type, e.g. `ImageServer`
    #[serde(rename = "type")]
    pub service_type: String,
    /// Full name as returned by the server
    pub name: String,
}

impl ServiceRecord {
    /// Build a record from the raw `name`/`type` pair of the services listing
    pub fn from_name(name: &str, service_type: &str) -> Self {
        let (category, service_name) = split_service_name(name);
        let year = extract_year(service_name);
        ServiceRecord {
            category: category.to_string(),
            service_name: service_name.to_string(),
            year,
            service_type: service_type.to_string(),
            name: name.to_string(),
        }
    }
}

/// Split `folder/service` on the first `/`; names without one have no folder
pub fn split_service_name(name: &str) -> (&str, &str) {
    name.split_once('/').unwrap_or(("", name))
}

/// First run of four ASCII digits, e.g. `Luftbild_2019` gives `2019`
pub fn extract_year(service_name: &str) -> Option<String> {
    YEAR_RE
        .find(service_name)
        .map(|m| m.as_str().to_string())
}

#[derive(Debug, Deserialize)]
struct RawService {
    name: String,
    #[serde(rename = "type", default)]
    service_type: String,
}

/// Services table sorted by (category, service_name)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServiceCatalog {
    records: Vec<ServiceRecord>,
}

impl ServiceCatalog {
    pub fn new(mut records: Vec<ServiceRecord>) -> Self {
        records.sort_by(|a, b| {
            (a.category.as_str(), a.service_name.as_str())
                .cmp(&(b.category.as_str(), b.service_name.as_str()))
        });
        ServiceCatalog { records }
    }

    /// Parse the JSON answer of `<services root>?f=json`
    pub fn from_json(url: &str, data: &serde_json::Value) -> Result<Self> {
        let services = data
            .get("services")
            .ok_or_else(|| ArcgisError::malformed(url, "missing `services` array"))?;
        let raw: Vec<RawService> = serde_json::from_value(services.clone())
            .map_err(|e| ArcgisError::malformed(url, format!("bad `services` entry: {}", e)))?;

        Ok(ServiceCatalog::new(
            raw.iter()
                .map(|s| ServiceRecord::from_name(&s.name, &s.service_type))
                .collect(),
        ))
    }

    pub fn records(&self) -> &[ServiceRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Row at a 0-based position
    pub fn get(&self, index: usize) -> Option<&ServiceRecord> {
        self.records.get(index)
    }

    /// Records whose type matches, e.g. `ImageServer`
    pub fn of_type<'a>(&'a self, service_type: &'a str) -> impl Iterator<Item = &'a ServiceRecord> {
        self.records
            .iter()
            .filter(move |r| r.service_type == service_type)
    }

    /// Convert the table to a Polars DataFrame
    /// Columns: category, service_name, year, type, name
    #[cfg(feature = "polars")]
    pub fn to_polars_df(&self) -> Result<polars::prelude::DataFrame> {
        use polars::prelude::*;

        let category: Vec<&str> = self.records.iter().map(|r| r.category.as_str()).collect();
        let service_name: Vec<&str> = self
            .records
            .iter()
            .map(|r| r.service_name.as_str())
            .collect();
        let year: Vec<Option<&str>> = self.records.iter().map(|r| r.year.as_deref()).collect();
        let service_type: Vec<&str> = self
            .records
            .iter()
            .map(|r| r.service_type.as_str())
            .collect();
        let name: Vec<&str> = self.records.iter().map(|r| r.name.as_str()).collect();

        let df = df! [
            "category" => category,
            "service_name" => service_name,
            "year" => year,
            "type" => service_type,
            "name" => name,
        ]
        .context("Failed to create DataFrame")?;

        Ok(df)
    }
}

/// Fetch and tabulate the services listed under an ArcGIS REST services root
pub fn get_arcgis_services<C: HttpClient>(client: &C, base_url: &str) -> Result<ServiceCatalog> {
    let data = client
        .get_json(base_url, &[("f", "json".to_string())])
        .with_context(|| format!("Failed to list services at {}", base_url))?;
    let catalog = ServiceCatalog::from_json(base_url, &data)?;
    log::info!("Found {} service(s) at {}", catalog.len(), base_url);
    Ok(catalog)
}

/// [`get_arcgis_services`] with a default `reqwest` client
pub fn list_services(base_url: &str) -> Result<ServiceCatalog> {
    get_arcgis_services(&ReqwestClient::new(), base_url)
}
