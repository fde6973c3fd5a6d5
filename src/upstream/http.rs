//! HTTP upstream for the package index and the image registry
//!
//! Packages are read from the index JSON API (`{base}/{name}/json`), images
//! from the registry's repository and tag listing endpoints. Requests are
//! blocking `ureq` calls run on the blocking pool.

use crate::config::schema::UpstreamConfig;
use crate::error::ResolveError;
use crate::registry::{Entry, EntryKind};
use crate::upstream::{RawMetadata, Upstream};
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// Largest response body accepted, in bytes
const MAX_BODY_BYTES: u64 = 64 * 1024 * 1024;

/// Tag pages followed per image
const MAX_TAG_PAGES: usize = 10;

const USER_AGENT: &str = concat!("apidex/", env!("CARGO_PKG_VERSION"));

/// Upstream backed by the public package index and image registry
#[derive(Clone)]
pub struct HttpUpstream {
    agent: ureq::Agent,
    package_base: String,
    image_base: String,
}

impl HttpUpstream {
    /// Create an upstream from config
    pub fn new(config: &UpstreamConfig) -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(config.http_timeout_secs.max(1))))
            .build()
            .into();
        Self {
            agent,
            package_base: config.package_base().trim_end_matches('/').to_string(),
            image_base: config.image_api.trim_end_matches('/').to_string(),
        }
    }

    fn package_url(&self, entry: &Entry) -> String {
        format!("{}/{}/json", self.package_base, entry.canonical_locator())
    }

    fn repository_url(&self, entry: &Entry) -> String {
        format!("{}/repositories/{}", self.image_base, entry.canonical_locator())
    }

    async fn blocking<T, F>(&self, url: &str, f: F) -> Result<T, ResolveError>
    where
        T: Send + 'static,
        F: FnOnce(ureq::Agent) -> Result<T, ResolveError> + Send + 'static,
    {
        let agent = self.agent.clone();
        tokio::task::spawn_blocking(move || f(agent))
            .await
            .map_err(|e| ResolveError::fetch(url, e))?
    }

    async fn package_marker(&self, entry: &Entry) -> Result<Option<String>, ResolveError> {
        let url = self.package_url(entry);
        let request_url = url.clone();
        self.blocking(&url, move |agent| {
            let response = agent
                .head(&request_url)
                .header("User-Agent", USER_AGENT)
                .call()
                .map_err(|e| map_ureq_error(&request_url, e))?;
            let headers = response.headers();
            let marker = ["x-pypi-last-serial", "etag"].iter().find_map(|name| {
                headers
                    .get(*name)
                    .and_then(|v| v.to_str().ok())
                    .map(|v| format!("{}={}", name, v.trim_matches('"')))
            });
            Ok(marker)
        })
        .await
    }

    async fn image_marker(&self, entry: &Entry) -> Result<Option<String>, ResolveError> {
        let url = self.repository_url(entry);
        let request_url = url.clone();
        self.blocking(&url, move |agent| {
            let repo = get_json(&agent, &request_url)?;
            Ok(repo
                .get("last_updated")
                .and_then(Value::as_str)
                .map(|s| format!("last_updated={}", s)))
        })
        .await
    }

    async fn fetch_package(&self, entry: &Entry) -> Result<RawMetadata, ResolveError> {
        let url = self.package_url(entry);
        let request_url = url.clone();
        let body = self
            .blocking(&url, move |agent| get_json(&agent, &request_url))
            .await?;
        parse_package(&url, &body)
    }

    async fn fetch_image(&self, entry: &Entry) -> Result<RawMetadata, ResolveError> {
        let url = self.repository_url(entry);
        let request_url = url.clone();
        let (repo, tags, truncated) = self
            .blocking(&url, move |agent| {
                let repo = get_json(&agent, &request_url)?;
                let mut tags = Vec::new();
                let mut next = Some(format!("{}/tags?page_size=100", request_url));
                while let Some(page_url) = next.take() {
                    if tags.len() == MAX_TAG_PAGES {
                        next = Some(page_url);
                        break;
                    }
                    let page = get_json(&agent, &page_url)?;
                    next = page.get("next").and_then(Value::as_str).map(str::to_string);
                    tags.push(page);
                }
                Ok((repo, tags, next.is_some()))
            })
            .await?;
        parse_image(&url, &repo, &tags, truncated)
    }
}

#[async_trait]
impl Upstream for HttpUpstream {
    async fn marker(&self, entry: &Entry) -> Result<Option<String>, ResolveError> {
        match entry.kind() {
            EntryKind::Package => self.package_marker(entry).await,
            EntryKind::Image => self.image_marker(entry).await,
        }
    }

    async fn fetch(&self, entry: &Entry) -> Result<RawMetadata, ResolveError> {
        debug!("Fetching {} from upstream", entry.id);
        match entry.kind() {
            EntryKind::Package => self.fetch_package(entry).await,
            EntryKind::Image => self.fetch_image(entry).await,
        }
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

fn map_ureq_error(url: &str, err: ureq::Error) -> ResolveError {
    match err {
        ureq::Error::StatusCode(status) => ResolveError::Status {
            url: url.to_string(),
            status,
        },
        other => ResolveError::fetch(url, other),
    }
}

fn get_json(agent: &ureq::Agent, url: &str) -> Result<Value, ResolveError> {
    let mut response = agent
        .get(url)
        .header("User-Agent", USER_AGENT)
        .header("Accept", "application/json")
        .call()
        .map_err(|e| map_ureq_error(url, e))?;
    let body = response
        .body_mut()
        .with_config()
        .limit(MAX_BODY_BYTES)
        .read_to_string()
        .map_err(|e| map_ureq_error(url, e))?;
    serde_json::from_str(&body)
        .map_err(|e| ResolveError::normalization(format!("{} is not JSON: {}", url, e)))
}

/// Parse an index JSON API document
fn parse_package(url: &str, body: &Value) -> Result<RawMetadata, ResolveError> {
    let info = body
        .get("info")
        .and_then(Value::as_object)
        .ok_or_else(|| ResolveError::normalization(format!("{}: missing 'info' object", url)))?;
    let releases = body
        .get("releases")
        .and_then(Value::as_object)
        .ok_or_else(|| ResolveError::normalization(format!("{}: missing 'releases' object", url)))?;

    let mut extra = serde_json::Map::new();
    for key in ["home_page", "license", "requires_python", "author"] {
        if let Some(value) = info.get(key).filter(|v| !v.is_null()) {
            extra.insert(key.to_string(), value.clone());
        }
    }
    if let Some(serial) = body.get("last_serial") {
        extra.insert("last_serial".to_string(), serial.clone());
    }

    Ok(RawMetadata {
        source_url: url.to_string(),
        versions: releases.keys().cloned().collect(),
        summary: info
            .get("summary")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string),
        extra,
        notes: Vec::new(),
    })
}

/// Parse registry repository info plus tag listing pages.
///
/// `truncated` means more pages existed than were followed.
fn parse_image(
    url: &str,
    repo: &Value,
    pages: &[Value],
    truncated: bool,
) -> Result<RawMetadata, ResolveError> {
    let mut versions = Vec::new();
    for page in pages {
        let results = page
            .get("results")
            .and_then(Value::as_array)
            .ok_or_else(|| ResolveError::normalization(format!("{}: tag page without 'results'", url)))?;
        for tag in results {
            let name = tag
                .get("name")
                .and_then(Value::as_str)
                .ok_or_else(|| ResolveError::normalization(format!("{}: tag without name", url)))?;
            versions.push(name.to_string());
        }
    }

    let mut extra = serde_json::Map::new();
    for key in ["star_count", "pull_count", "last_updated"] {
        if let Some(value) = repo.get(key).filter(|v| !v.is_null()) {
            extra.insert(key.to_string(), value.clone());
        }
    }

    let mut notes = Vec::new();
    if truncated {
        extra.insert("tags_truncated".to_string(), Value::Bool(true));
        notes.push(format!(
            "tag listing cut off after {} pages ({} tags kept)",
            pages.len(),
            versions.len()
        ));
    }

    Ok(RawMetadata {
        source_url: url.to_string(),
        versions,
        summary: repo
            .get("description")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string),
        extra,
        notes,
    })
}
