//! Clients for the remote services the pipeline talks to.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use aves_core::{ClassificationResponse, Document, RecordingPage};
use aves_storage::{FetchError, HttpFetcher};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::debug;

pub const CRATE_NAME: &str = "aves-adapters";

/// Search query used for every archive request.
pub const BIRDS_QUERY: &str = "grp:birds";

const AUDIO_MIME: &str = "audio/mpeg";

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("decoding {what}: {source}")]
    Decode {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("reading {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn decode<T: DeserializeOwned>(what: &'static str, body: &[u8]) -> Result<T, AdapterError> {
    serde_json::from_slice(body).map_err(|source| AdapterError::Decode { what, source })
}

/// Paged search over the public recording archive.
#[async_trait]
pub trait RecordingArchive: Send + Sync {
    async fn search(&self, query: &str, page: u32) -> Result<RecordingPage, AdapterError>;
}

/// Remote service that labels one audio file with zero or more species results.
#[async_trait]
pub trait AudioClassifier: Send + Sync {
    async fn classify(&self, audio_path: &Path) -> Result<ClassificationResponse, AdapterError>;
}

/// Source of the raw species reference dataset.
#[async_trait]
pub trait SpeciesSource: Send + Sync {
    async fn fetch_raw(&self) -> Result<Vec<u8>, AdapterError>;
}

/// xeno-canto v3 recordings API.
#[derive(Debug, Clone)]
pub struct XenoCantoArchive {
    http: HttpFetcher,
    search_url: String,
    api_key: String,
}

impl XenoCantoArchive {
    pub fn new(http: HttpFetcher, search_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            http,
            search_url: search_url.into(),
            api_key: api_key.into(),
        }
    }
}

#[async_trait]
impl RecordingArchive for XenoCantoArchive {
    async fn search(&self, query: &str, page: u32) -> Result<RecordingPage, AdapterError> {
        let page_param = page.to_string();
        let resp = self
            .http
            .send_with_retry("recordings_search", |client| {
                Ok(client.get(self.search_url.as_str()).query(&[
                    ("query", query),
                    ("key", self.api_key.as_str()),
                    ("page", page_param.as_str()),
                ]))
            })
            .await?;
        let body = resp.bytes().await.map_err(FetchError::from)?;
        debug!(page, bytes = body.len(), "archive page received");
        decode("recordings page", &body)
    }
}

/// Multipart upload client for the classification API.
#[derive(Debug, Clone)]
pub struct ClassifierApi {
    http: HttpFetcher,
    classify_url: String,
}

impl ClassifierApi {
    pub fn new(http: HttpFetcher, classify_url: impl Into<String>) -> Self {
        Self {
            http,
            classify_url: classify_url.into(),
        }
    }
}

#[async_trait]
impl AudioClassifier for ClassifierApi {
    async fn classify(&self, audio_path: &Path) -> Result<ClassificationResponse, AdapterError> {
        let bytes = tokio::fs::read(audio_path)
            .await
            .map_err(|source| AdapterError::Io {
                path: audio_path.to_path_buf(),
                source,
            })?;
        let file_name = audio_path.display().to_string();

        let resp = self
            .http
            .send_with_retry("classify", |client| {
                let part = reqwest::multipart::Part::bytes(bytes.clone())
                    .file_name(file_name.clone())
                    .mime_str(AUDIO_MIME)?;
                let form = reqwest::multipart::Form::new().part("file", part);
                Ok(client.post(self.classify_url.as_str()).multipart(form))
            })
            .await?;
        let body = resp.bytes().await.map_err(FetchError::from)?;
        decode("classification response", &body)
    }
}

/// Plain GET of the species dataset; the body is returned untouched.
#[derive(Debug, Clone)]
pub struct HttpSpeciesSource {
    http: HttpFetcher,
    url: String,
}

impl HttpSpeciesSource {
    pub fn new(http: HttpFetcher, url: impl Into<String>) -> Self {
        Self {
            http,
            url: url.into(),
        }
    }
}

#[async_trait]
impl SpeciesSource for HttpSpeciesSource {
    async fn fetch_raw(&self) -> Result<Vec<u8>, AdapterError> {
        let fetched = self.http.fetch_bytes(&self.url).await?;
        debug!(url = %fetched.final_url, bytes = fetched.body.len(), "species dataset fetched");
        Ok(fetched.body)
    }
}

/// Loads a species dataset file: a JSON array of objects.
pub async fn load_species_file(path: impl AsRef<Path>) -> Result<Vec<Document>> {
    read_json_file(path.as_ref()).await
}

async fn read_json_file<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let data = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&data).with_context(|| format!("parsing {}", path.display()))
}
