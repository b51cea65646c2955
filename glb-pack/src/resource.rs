//! Resource resolution: map lookup or fetch
//!
//! A pipeline run uses exactly one [`ResourceProvider`] strategy. Lookups
//! against a [`ResourceMap`] match on the lowercased last path segment of the
//! URI; fetches go over HTTP for absolute URLs and otherwise resolve against a
//! directory or base URL. `data:` URIs are decoded inline by both strategies.

use crate::document::SceneDocument;
use crate::error::{PackError, Result};
use crate::mime::{DEFAULT_MIME_TYPE, mime_type};
use base64::Engine;
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use walkdir::WalkDir;

/// Which document collection a resource came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Buffer,
    Image,
}

/// A URI the document references, in combined resource index order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRequest {
    pub index: usize,
    pub kind: ResourceKind,
    pub uri: String,
}

/// A resolved resource
#[derive(Debug, Clone)]
pub struct Resource {
    pub index: usize,
    pub kind: ResourceKind,
    pub uri: String,
    pub mime_type: String,
    pub data: Arc<[u8]>,
}

impl Resource {
    pub fn new(request: ResourceRequest, data: Arc<[u8]>) -> Self {
        let mime_type = resource_mime_type(&request.uri);
        Self {
            index: request.index,
            kind: request.kind,
            uri: request.uri,
            mime_type,
            data,
        }
    }

    pub fn len(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// List every resource the document references: buffers first, then images.
pub fn collect_requests(document: &SceneDocument) -> Result<Vec<ResourceRequest>> {
    let buffers = document
        .buffers
        .iter()
        .map(|b| (ResourceKind::Buffer, b.uri.as_deref()));
    let images = document
        .images()
        .iter()
        .map(|i| (ResourceKind::Image, i.uri.as_deref()));

    buffers
        .chain(images)
        .enumerate()
        .map(|(index, (kind, uri))| {
            let uri = uri.ok_or_else(|| {
                PackError::InvalidDocument(format!(
                    "{:?} resource {} has no uri to embed",
                    kind, index
                ))
            })?;
            Ok(ResourceRequest {
                index,
                kind,
                uri: uri.to_string(),
            })
        })
        .collect()
}

/// Normalized lookup key: the last path segment, lowercased
pub fn resource_key(uri: &str) -> String {
    uri.rsplit('/').next().unwrap_or(uri).to_lowercase()
}

/// In-memory resource files keyed by normalized name
#[derive(Debug, Clone, Default)]
pub struct ResourceMap {
    entries: HashMap<String, Arc<[u8]>>,
}

impl ResourceMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a file; the name is normalized with [`resource_key`]
    pub fn insert(&mut self, name: &str, data: impl Into<Arc<[u8]>>) -> Option<Arc<[u8]>> {
        self.entries.insert(resource_key(name), data.into())
    }

    /// Builder form of [`ResourceMap::insert`]
    pub fn with(mut self, name: &str, data: impl Into<Arc<[u8]>>) -> Self {
        self.insert(name, data);
        self
    }

    pub fn get(&self, uri: &str) -> Option<&Arc<[u8]>> {
        self.entries.get(&resource_key(uri))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Load every regular file under a directory, subdirectories included.
    ///
    /// Files are keyed by their own name. When two files share a key, the
    /// first one in walk order (sorted by file name) is kept.
    pub fn from_dir(dir: &Path) -> std::io::Result<Self> {
        let mut map = Self::new();
        for entry in WalkDir::new(dir).follow_links(false).sort_by_file_name() {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if map.entries.contains_key(&resource_key(&name)) {
                tracing::warn!(
                    "Ignoring {:?}: a resource named '{}' is already loaded",
                    entry.path(),
                    resource_key(&name)
                );
                continue;
            }
            let data = std::fs::read(entry.path())?;
            tracing::debug!("Loaded resource {:?} ({} bytes)", entry.path(), data.len());
            map.insert(&name, data);
        }
        Ok(map)
    }
}

/// Where relative URIs are fetched from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchBase {
    Directory(PathBuf),
    Url(String),
}

/// Fetch strategy: HTTP for URLs, filesystem or base URL for relative URIs
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: reqwest::Client,
    base: Option<FetchBase>,
    timeout: Option<Duration>,
}

impl Fetcher {
    /// Relative URIs resolve against the working directory
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            base: None,
            timeout: None,
        }
    }

    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base = Some(FetchBase::Directory(dir.into()));
        self
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base = Some(FetchBase::Url(url.into()));
        self
    }

    /// Per-fetch time limit
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn base(&self) -> Option<&FetchBase> {
        self.base.as_ref()
    }

    pub async fn fetch(&self, uri: &str) -> Result<Vec<u8>> {
        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, self.fetch_inner(uri))
                .await
                .map_err(|_| PackError::fetch(uri, format!("timed out after {:?}", limit)))?,
            None => self.fetch_inner(uri).await,
        }
    }

    async fn fetch_inner(&self, uri: &str) -> Result<Vec<u8>> {
        if is_remote(uri) {
            return self.http_get(uri, uri).await;
        }

        match &self.base {
            Some(FetchBase::Url(base)) => {
                let url = format!(
                    "{}/{}",
                    base.trim_end_matches('/'),
                    uri.trim_start_matches('/')
                );
                self.http_get(uri, &url).await
            }
            Some(FetchBase::Directory(dir)) => read_file(uri, &contained_path(dir, uri)?).await,
            None => read_file(uri, &contained_path(Path::new(""), uri)?).await,
        }
    }

    async fn http_get(&self, uri: &str, url: &str) -> Result<Vec<u8>> {
        tracing::debug!("GET {}", url);
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| PackError::fetch(uri, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PackError::fetch(uri, format!("HTTP {}", status)));
        }

        let bytes = response.bytes().await.map_err(|e| PackError::fetch(uri, e))?;
        Ok(bytes.to_vec())
    }
}

impl Default for Fetcher {
    fn default() -> Self {
        Self::new()
    }
}

async fn read_file(uri: &str, path: &Path) -> Result<Vec<u8>> {
    tokio::fs::read(path)
        .await
        .map_err(|e| PackError::fetch(uri, format!("{} ({})", e, path.display())))
}

/// Join a relative URI onto `dir`, refusing paths that leave it
fn contained_path(dir: &Path, uri: &str) -> Result<PathBuf> {
    let relative = Path::new(uri);
    for component in relative.components() {
        match component {
            Component::Normal(_) | Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(PackError::fetch(uri, "path points outside the resource directory"));
            }
        }
    }
    Ok(dir.join(relative))
}

fn is_remote(uri: &str) -> bool {
    let lower = uri.get(..8).unwrap_or(uri).to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Resolution strategy for one pipeline run
#[derive(Debug, Clone)]
pub enum ResourceProvider {
    /// Offline batch conversion: look files up by name
    Map(Arc<ResourceMap>),
    /// Interactive use: fetch each URI
    Fetch(Fetcher),
}

impl ResourceProvider {
    pub fn map(map: ResourceMap) -> Self {
        ResourceProvider::Map(Arc::new(map))
    }

    pub fn fetch(fetcher: Fetcher) -> Self {
        ResourceProvider::Fetch(fetcher)
    }

    /// Resolve one URI to its bytes
    pub async fn resolve(&self, uri: &str) -> Result<Arc<[u8]>> {
        if let Some(decoded) = decode_data_uri(uri) {
            return decoded.map(Arc::from);
        }

        match self {
            ResourceProvider::Map(map) => {
                map.get(uri)
                    .cloned()
                    .ok_or_else(|| PackError::ResourceNotFound {
                        uri: uri.to_string(),
                        key: resource_key(uri),
                    })
            }
            ResourceProvider::Fetch(fetcher) => fetcher.fetch(uri).await.map(Arc::from),
        }
    }

    /// Resolve every request, waiting for all of them.
    ///
    /// Fetches run as concurrent tasks. When several fail, the error of the
    /// lowest resource index is returned.
    pub async fn resolve_all(&self, requests: Vec<ResourceRequest>) -> Result<Vec<Resource>> {
        match self {
            ResourceProvider::Map(_) => {
                let mut resources = Vec::with_capacity(requests.len());
                for request in requests {
                    let data = self.resolve(&request.uri).await?;
                    resources.push(Resource::new(request, data));
                }
                Ok(resources)
            }
            ResourceProvider::Fetch(_) => {
                let handles: Vec<_> = requests
                    .into_iter()
                    .map(|request| {
                        let provider = self.clone();
                        let uri = request.uri.clone();
                        let handle = tokio::spawn(async move {
                            let data = provider.resolve(&request.uri).await;
                            data.map(|data| Resource::new(request, data))
                        });
                        (uri, handle)
                    })
                    .collect();

                let mut resources = Vec::with_capacity(handles.len());
                let mut first_error = None;
                for (uri, handle) in handles {
                    let outcome = handle
                        .await
                        .unwrap_or_else(|e| Err(PackError::fetch(&uri, e)));
                    match outcome {
                        Ok(resource) => resources.push(resource),
                        Err(e) => {
                            first_error.get_or_insert(e);
                        }
                    }
                }

                match first_error {
                    Some(e) => Err(e),
                    None => Ok(resources),
                }
            }
        }
    }
}

/// Payload of a `data:` URI, `None` when the URI is not one
fn decode_data_uri(uri: &str) -> Option<Result<Vec<u8>>> {
    let rest = uri.strip_prefix("data:")?;
    let shown = short_uri(uri);

    let Some((header, payload)) = rest.split_once(',') else {
        return Some(Err(PackError::fetch(&shown, "data URI without ',' separator")));
    };

    if header.ends_with(";base64") {
        Some(
            base64::engine::general_purpose::STANDARD
                .decode(payload)
                .map_err(|e| PackError::fetch(&shown, e)),
        )
    } else {
        Some(Ok(payload.as_bytes().to_vec()))
    }
}

/// MIME type for a resource URI, preferring a data URI's declared type
pub fn resource_mime_type(uri: &str) -> String {
    if let Some(rest) = uri.strip_prefix("data:") {
        let header = rest.split(',').next().unwrap_or_default();
        return header
            .split(';')
            .next()
            .filter(|m| !m.is_empty())
            .unwrap_or(DEFAULT_MIME_TYPE)
            .to_string();
    }
    mime_type(uri).to_string()
}

fn short_uri(uri: &str) -> String {
    const MAX: usize = 48;
    if uri.chars().count() <= MAX {
        uri.to_string()
    } else {
        format!("{}...", uri.chars().take(MAX).collect::<String>())
    }
}
