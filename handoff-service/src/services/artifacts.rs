//! Lookups against the artifact provider that owns subjects' resources.

use async_trait::async_trait;
use dashmap::DashMap;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use service_core::observability::TracedClientExt;
use std::sync::Arc;
use std::time::Duration;

const PROVIDER_TIMEOUT: Duration = Duration::from_secs(5);

/// Resolves a subject's artifacts. `Ok(None)` means "nothing to show", which
/// callers treat as a cue to fall back rather than as a failure.
#[async_trait]
pub trait ArtifactResolver: Send + Sync {
    /// A fresh direct link to `resource_id` for `subject_id`.
    async fn resource_link(
        &self,
        subject_id: u64,
        resource_id: u64,
    ) -> Result<Option<String>, anyhow::Error>;

    /// The JSON export for `subject_id`, limited to one resource or covering all of them.
    async fn export(
        &self,
        subject_id: u64,
        resource_id: Option<u64>,
        include_html: bool,
    ) -> Result<Option<serde_json::Value>, anyhow::Error>;
}

#[derive(Deserialize)]
struct LinkResponse {
    url: String,
}

/// Calls the provider over HTTP:
///
/// ```text
/// GET {base}/subjects/{subject}/resources/{resource}/link  → {"url": "..."}
/// GET {base}/subjects/{subject}/export[?resource_id=&include_html=1]
/// ```
///
/// A 404 from either endpoint means "no artifact".
#[derive(Clone)]
pub struct HttpArtifactResolver {
    client: Client,
    base_url: String,
}

impl HttpArtifactResolver {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl ArtifactResolver for HttpArtifactResolver {
    async fn resource_link(
        &self,
        subject_id: u64,
        resource_id: u64,
    ) -> Result<Option<String>, anyhow::Error> {
        let url = format!(
            "{}/subjects/{}/resources/{}/link",
            self.base_url, subject_id, resource_id
        );

        let response = self
            .client
            .traced_get(&url)
            .timeout(PROVIDER_TIMEOUT)
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("artifact provider request failed: {}", e))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let link: LinkResponse = response.error_for_status()?.json().await?;
        Ok(Some(link.url).filter(|url| !url.is_empty()))
    }

    async fn export(
        &self,
        subject_id: u64,
        resource_id: Option<u64>,
        include_html: bool,
    ) -> Result<Option<serde_json::Value>, anyhow::Error> {
        let url = format!("{}/subjects/{}/export", self.base_url, subject_id);

        let mut query: Vec<(&str, String)> = Vec::new();
        if let Some(resource_id) = resource_id {
            query.push(("resource_id", resource_id.to_string()));
        }
        if include_html {
            query.push(("include_html", "1".to_string()));
        }

        let response = self
            .client
            .traced_get(&url)
            .query(&query)
            .timeout(PROVIDER_TIMEOUT)
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("artifact provider request failed: {}", e))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Ok(Some(response.error_for_status()?.json().await?))
    }
}

/// In-process resolver backed by fixed tables. Used when no provider is
/// configured, and by tests.
#[derive(Clone, Default)]
pub struct StaticArtifactResolver {
    links: Arc<DashMap<(u64, u64), String>>,
    exports: Arc<DashMap<(u64, Option<u64>), serde_json::Value>>,
}

impl StaticArtifactResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_link(self, subject_id: u64, resource_id: u64, url: impl Into<String>) -> Self {
        self.links.insert((subject_id, resource_id), url.into());
        self
    }

    pub fn with_export(
        self,
        subject_id: u64,
        resource_id: Option<u64>,
        export: serde_json::Value,
    ) -> Self {
        self.exports.insert((subject_id, resource_id), export);
        self
    }
}

#[async_trait]
impl ArtifactResolver for StaticArtifactResolver {
    async fn resource_link(
        &self,
        subject_id: u64,
        resource_id: u64,
    ) -> Result<Option<String>, anyhow::Error> {
        Ok(self
            .links
            .get(&(subject_id, resource_id))
            .map(|url| url.value().clone()))
    }

    async fn export(
        &self,
        subject_id: u64,
        resource_id: Option<u64>,
        include_html: bool,
    ) -> Result<Option<serde_json::Value>, anyhow::Error> {
        let Some(export) = self
            .exports
            .get(&(subject_id, resource_id))
            .map(|e| e.value().clone())
        else {
            return Ok(None);
        };

        if include_html {
            return Ok(Some(export));
        }
        Ok(Some(strip_html(export)))
    }
}

/// Drop `html` fields from an export, at any depth.
fn strip_html(value: serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Object(map) => serde_json::Value::Object(
            map.into_iter()
                .filter(|(key, _)| key != "html")
                .map(|(key, value)| (key, strip_html(value)))
                .collect(),
        ),
        serde_json::Value::Array(items) => {
            serde_json::Value::Array(items.into_iter().map(strip_html).collect())
        }
        other => other,
    }
}
