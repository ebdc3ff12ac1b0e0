use anyhow::Result;
use futures::future::BoxFuture;
use futures::FutureExt;
use reqwest::Client;

use super::{encode_name, VersionSource};

pub const DEFAULT_REGISTRY: &str = "https://registry.npmjs.org";

/// Client for the npm registry's `/{name}/latest` endpoint.
#[derive(Clone)]
pub struct NpmRegistry {
    client: Client,
    base_url: String,
}

impl NpmRegistry {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Fetch the `latest` dist-tag version for an npm package.
    pub async fn fetch_latest(&self, name: &str) -> Result<Option<String>> {
        let url = format!("{}/{}/latest", self.base_url, encode_name(name));

        let response = self
            .client
            .get(&url)
            .header("Accept", "application/json")
            .send()
            .await?;

        if !response.status().is_success() {
            return Ok(None);
        }

        let data: serde_json::Value = response.json().await?;
        Ok(extract_version(&data))
    }
}

impl VersionSource for NpmRegistry {
    fn latest_version<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<Option<String>>> {
        self.fetch_latest(name).boxed()
    }
}

fn extract_version(data: &serde_json::Value) -> Option<String> {
    data.get("version")
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
