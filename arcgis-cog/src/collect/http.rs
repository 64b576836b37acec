use anyhow::{Context, Result};
use reqwest::blocking::Client;
use serde_json::Value;

use crate::error::ArcgisError;

/// Query parameters as sent on the wire
pub type Params<'a> = [(&'a str, String)];

/// Minimal blocking HTTP surface the collectors need
///
/// Every ArcGIS call in this crate is a GET with query parameters that
/// answers either JSON or raw bytes.
pub trait HttpClient {
    /// GET `url` and parse the body as JSON
    fn get_json(&self, url: &str, params: &Params) -> Result<Value>;

    /// GET `url` and return the raw body
    fn get_bytes(&self, url: &str, params: &Params) -> Result<Vec<u8>>;
}

/// `reqwest` blocking client, no explicit timeout (library defaults apply)
#[derive(Debug, Clone, Default)]
pub struct ReqwestClient {
    client: Client,
}

impl ReqwestClient {
    pub fn new() -> Self {
        ReqwestClient {
            client: Client::new(),
        }
    }

    pub fn with_client(client: Client) -> Self {
        ReqwestClient { client }
    }

    fn send(&self, url: &str, params: &Params) -> Result<reqwest::blocking::Response> {
        log::debug!("GET {} {:?}", url, params);
        let response = self
            .client
            .get(url)
            .query(params)
            .send()
            .with_context(|| format!("Failed to send request to {}", url))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().unwrap_or_default();
            anyhow::bail!("{} returned error {}: {}", url, status, body);
        }
        Ok(response)
    }
}

impl HttpClient for ReqwestClient {
    fn get_json(&self, url: &str, params: &Params) -> Result<Value> {
        let body = self
            .send(url, params)?
            .text()
            .with_context(|| format!("Failed to read response body from {}", url))?;
        let value = serde_json::from_str(&body)
            .map_err(|e| ArcgisError::malformed(url, format!("invalid JSON: {}", e)))?;
        Ok(value)
    }

    fn get_bytes(&self, url: &str, params: &Params) -> Result<Vec<u8>> {
        let bytes = self
            .send(url, params)?
            .bytes()
            .with_context(|| format!("Failed to read response body from {}", url))?;
        Ok(bytes.to_vec())
    }
}
