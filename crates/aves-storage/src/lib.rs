//! HTTP fetch utilities, object storage and document storage for the aves pipeline.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use aves_core::Document;
use futures::StreamExt;
use reqwest::{RequestBuilder, Response, StatusCode};
use sha2::{Digest, Sha256};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::types::Json;
use sqlx::{Postgres, QueryBuilder};
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info_span, warn, Instrument};
use uuid::Uuid;

pub use sqlx::Error as SqlxError;

pub const CRATE_NAME: &str = "aves-storage";

// ---------------------------------------------------------------------------
// HTTP
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDisposition {
    Retryable,
    NonRetryable,
}

pub fn classify_status(status: StatusCode) -> RetryDisposition {
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        RetryDisposition::Retryable
    } else {
        RetryDisposition::NonRetryable
    }
}

pub fn classify_reqwest_error(err: &reqwest::Error) -> RetryDisposition {
    if err.is_timeout() || err.is_connect() {
        RetryDisposition::Retryable
    } else {
        RetryDisposition::NonRetryable
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub max_retries: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl BackoffPolicy {
    pub fn delay_for_attempt(&self, attempt_index: usize) -> Duration {
        let factor = 1u32.checked_shl(attempt_index as u32).unwrap_or(u32::MAX);
        let delay = self.base_delay.saturating_mul(factor);
        delay.min(self.max_delay)
    }
}

#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub timeout: Duration,
    pub connect_timeout: Duration,
    pub user_agent: Option<String>,
    pub backoff: BackoffPolicy,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            user_agent: None,
            backoff: BackoffPolicy::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FetchedResponse {
    pub status: StatusCode,
    pub final_url: String,
    pub body: Vec<u8>,
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("http status {status} for {url}")]
    HttpStatus { status: u16, url: String },
    #[error("writing {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Thin wrapper over a `reqwest::Client` that applies timeouts and bounded retries.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    backoff: BackoffPolicy,
}

impl HttpFetcher {
    pub fn new(config: HttpClientConfig) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout);

        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }

        let client = builder.build().context("building reqwest client")?;
        Ok(Self {
            client,
            backoff: config.backoff,
        })
    }

    pub fn backoff(&self) -> BackoffPolicy {
        self.backoff
    }

    /// Sends the request produced by `build`, retrying transient failures.
    ///
    /// `build` is called once per attempt so bodies that cannot be cloned
    /// (multipart forms) are rebuilt each time. Non-2xx responses that are not
    /// retryable surface as [`FetchError::HttpStatus`].
    pub async fn send_with_retry<F>(&self, label: &str, build: F) -> Result<Response, FetchError>
    where
        F: Fn(&reqwest::Client) -> Result<RequestBuilder, FetchError>,
    {
        let span = info_span!("http_request", label);
        self.send_attempts(&build).instrument(span).await
    }

    async fn send_attempts<F>(&self, build: &F) -> Result<Response, FetchError>
    where
        F: Fn(&reqwest::Client) -> Result<RequestBuilder, FetchError>,
    {
        let mut attempt = 0usize;
        loop {
            let can_retry = attempt < self.backoff.max_retries;
            match build(&self.client)?.send().await {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        return Ok(resp);
                    }

                    let url = resp.url().to_string();
                    if classify_status(status) == RetryDisposition::Retryable && can_retry {
                        warn!(%status, %url, attempt, "retryable http status");
                    } else {
                        return Err(FetchError::HttpStatus {
                            status: status.as_u16(),
                            url,
                        });
                    }
                }
                Err(err) => {
                    if classify_reqwest_error(&err) == RetryDisposition::Retryable && can_retry {
                        warn!(error = %err, attempt, "retryable request error");
                    } else {
                        return Err(FetchError::Request(err));
                    }
                }
            }

            tokio::time::sleep(self.backoff.delay_for_attempt(attempt)).await;
            attempt += 1;
        }
    }

    pub async fn fetch_bytes(&self, url: &str) -> Result<FetchedResponse, FetchError> {
        let resp = self.send_with_retry("fetch", |client| Ok(client.get(url))).await?;
        let status = resp.status();
        let final_url = resp.url().to_string();
        let body = resp.bytes().await?.to_vec();
        Ok(FetchedResponse {
            status,
            final_url,
            body,
        })
    }

    /// Streams the body at `url` into `dest` chunk by chunk. A partially written
    /// file is removed when the transfer fails.
    pub async fn download_to_file(&self, url: &str, dest: &Path) -> Result<u64, FetchError> {
        let resp = self.send_with_retry("download", |client| Ok(client.get(url))).await?;
        match stream_to_file(resp, dest).await {
            Ok(written) => Ok(written),
            Err(err) => {
                let _ = fs::remove_file(dest).await;
                Err(err)
            }
        }
    }
}

async fn stream_to_file(resp: Response, dest: &Path) -> Result<u64, FetchError> {
    let io_err = |source: std::io::Error| FetchError::Io {
        path: dest.to_path_buf(),
        source,
    };

    let mut file = fs::File::create(dest).await.map_err(io_err)?;
    let mut stream = resp.bytes_stream();
    let mut written = 0u64;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await.map_err(io_err)?;
        written += chunk.len() as u64;
    }
    file.flush().await.map_err(io_err)?;
    Ok(written)
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

// ---------------------------------------------------------------------------
// Object storage
// ---------------------------------------------------------------------------

const MAX_OBJECT_KEY_LEN: usize = 1024;

#[derive(Debug, Error)]
pub enum ObjectStoreError {
    #[error("invalid object key `{0}`")]
    InvalidKey(String),
    #[error("invalid bucket name `{0}`")]
    InvalidBucket(String),
    #[error("reading {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("storing object {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Fetch(#[from] FetchError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub bucket: String,
    pub key: String,
    pub content_hash: String,
    pub byte_size: usize,
    /// Backend-specific location (URL or filesystem path).
    pub location: String,
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Uploads the file at `path` as `bucket/key`, replacing any existing object.
    async fn put_file(&self, bucket: &str, key: &str, path: &Path) -> Result<StoredObject, ObjectStoreError>;
}

fn ensure_key_safe(key: &str) -> Result<(), ObjectStoreError> {
    let unsafe_key = key.is_empty()
        || key.len() > MAX_OBJECT_KEY_LEN
        || key.starts_with('/')
        || key.contains("..")
        || key.bytes().any(|b| b.is_ascii_control() || b == b'\\');
    if unsafe_key {
        return Err(ObjectStoreError::InvalidKey(key.to_string()));
    }
    Ok(())
}

fn ensure_bucket_safe(bucket: &str) -> Result<(), ObjectStoreError> {
    let valid = !bucket.is_empty()
        && bucket
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-' || b == b'.')
        && !bucket.contains("..");
    if !valid {
        return Err(ObjectStoreError::InvalidBucket(bucket.to_string()));
    }
    Ok(())
}

async fn read_source(path: &Path) -> Result<Vec<u8>, ObjectStoreError> {
    fs::read(path).await.map_err(|source| ObjectStoreError::Read {
        path: path.to_path_buf(),
        source,
    })
}

/// Filesystem-backed object store laid out as `root/{bucket}/{key}`.
#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn object_path(&self, bucket: &str, key: &str) -> PathBuf {
        self.root.join(bucket).join(key)
    }

    /// Store bytes using an atomic temp-file rename so readers never see a partial object.
    pub async fn put_bytes(&self, bucket: &str, key: &str, bytes: &[u8]) -> Result<StoredObject, ObjectStoreError> {
        ensure_bucket_safe(bucket)?;
        ensure_key_safe(key)?;

        let absolute_path = self.object_path(bucket, key);
        let write_err = |source: std::io::Error| ObjectStoreError::Write {
            path: absolute_path.clone(),
            source,
        };

        let parent = absolute_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.root.join(bucket));
        fs::create_dir_all(&parent).await.map_err(write_err)?;

        let temp_path = parent.join(format!(".{}.{}.tmp", Uuid::new_v4(), bytes.len()));
        if let Err(err) = write_atomically(&temp_path, &absolute_path, bytes).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(write_err(err));
        }

        Ok(StoredObject {
            bucket: bucket.to_string(),
            key: key.to_string(),
            content_hash: sha256_hex(bytes),
            byte_size: bytes.len(),
            location: absolute_path.display().to_string(),
        })
    }
}

async fn write_atomically(temp_path: &Path, dest: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = fs::OpenOptions::new()
        .create_new(true)
        .write(true)
        .open(temp_path)
        .await?;
    file.write_all(bytes).await?;
    file.flush().await?;
    drop(file);
    fs::rename(temp_path, dest).await
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn put_file(&self, bucket: &str, key: &str, path: &Path) -> Result<StoredObject, ObjectStoreError> {
        let bytes = read_source(path).await?;
        self.put_bytes(bucket, key, &bytes).await
    }
}

/// S3-compatible object store addressed path-style: `PUT {endpoint}/{bucket}/{key}`.
#[derive(Debug, Clone)]
pub struct HttpObjectStore {
    endpoint: String,
    token: Option<String>,
    http: HttpFetcher,
}

impl HttpObjectStore {
    pub fn new(endpoint: impl Into<String>, token: Option<String>, http: HttpFetcher) -> Self {
        Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            token,
            http,
        }
    }

    pub fn object_url(&self, bucket: &str, key: &str) -> String {
        format!("{}/{}/{}", self.endpoint, bucket, key)
    }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    async fn put_file(&self, bucket: &str, key: &str, path: &Path) -> Result<StoredObject, ObjectStoreError> {
        ensure_bucket_safe(bucket)?;
        ensure_key_safe(key)?;

        let bytes = read_source(path).await?;
        let url = self.object_url(bucket, key);
        debug!(%url, bytes = bytes.len(), "uploading object");

        self.http
            .send_with_retry("object_put", |client| {
                let mut request = client
                    .put(url.as_str())
                    .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
                    .body(bytes.clone());
                if let Some(token) = &self.token {
                    request = request.bearer_auth(token);
                }
                Ok(request)
            })
            .await?;

        Ok(StoredObject {
            bucket: bucket.to_string(),
            key: key.to_string(),
            content_hash: sha256_hex(&bytes),
            byte_size: bytes.len(),
            location: url,
        })
    }
}

/// Picks a backend from the endpoint URL: `file://<dir>` selects the local store.
pub fn object_store_for_endpoint(
    endpoint: &str,
    token: Option<String>,
    http: HttpFetcher,
) -> Arc<dyn ObjectStore> {
    match endpoint.strip_prefix("file://") {
        Some(dir) => Arc::new(LocalObjectStore::new(dir)),
        None => Arc::new(HttpObjectStore::new(endpoint, token, http)),
    }
}

// ---------------------------------------------------------------------------
// Document storage
// ---------------------------------------------------------------------------

const INSERT_CHUNK_SIZE: usize = 1000;

#[derive(Debug, Error)]
pub enum DocumentStoreError {
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),
}

/// Minimal document-collection contract used by the pipeline stages.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn count(&self, collection: &str) -> Result<u64, DocumentStoreError>;

    /// Inserts all documents as one bulk operation and returns how many were written.
    async fn insert_many(&self, collection: &str, docs: Vec<Document>) -> Result<usize, DocumentStoreError>;

    /// Returns every document of a collection in insertion order.
    async fn find_all(&self, collection: &str) -> Result<Vec<Document>, DocumentStoreError>;
}

/// Postgres JSONB-backed collections sharing a single `documents` table.
#[derive(Debug, Clone)]
pub struct PgDocumentStore {
    pool: PgPool,
}

impl PgDocumentStore {
    pub async fn connect(database_url: &str) -> Result<Self, DocumentStoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(10))
            .connect(database_url)
            .await?;
        let store = Self { pool };
        store.ensure_schema().await?;
        Ok(store)
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn ensure_schema(&self) -> Result<(), DocumentStoreError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS documents (
                id BIGSERIAL PRIMARY KEY,
                collection TEXT NOT NULL,
                doc JSONB NOT NULL,
                inserted_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS documents_collection_id_idx ON documents (collection, id)")
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for PgDocumentStore {
    async fn count(&self, collection: &str) -> Result<u64, DocumentStoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents WHERE collection = $1")
            .bind(collection)
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as u64)
    }

    async fn insert_many(&self, collection: &str, docs: Vec<Document>) -> Result<usize, DocumentStoreError> {
        if docs.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        for chunk in docs.chunks(INSERT_CHUNK_SIZE) {
            let mut builder: QueryBuilder<Postgres> =
                QueryBuilder::new("INSERT INTO documents (collection, doc) ");
            builder.push_values(chunk, |mut row, doc| {
                row.push_bind(collection.to_string()).push_bind(Json(doc.clone()));
            });
            builder.build().execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(docs.len())
    }

    async fn find_all(&self, collection: &str) -> Result<Vec<Document>, DocumentStoreError> {
        let rows: Vec<Json<Document>> =
            sqlx::query_scalar("SELECT doc FROM documents WHERE collection = $1 ORDER BY id")
                .bind(collection)
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(|Json(doc)| doc).collect())
    }
}

/// Process-local collections, used by tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    collections: Mutex<HashMap<String, Vec<Document>>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn count(&self, collection: &str) -> Result<u64, DocumentStoreError> {
        let map = self.collections.lock().await;
        Ok(map.get(collection).map_or(0, |docs| docs.len() as u64))
    }

    async fn insert_many(&self, collection: &str, docs: Vec<Document>) -> Result<usize, DocumentStoreError> {
        let inserted = docs.len();
        let mut map = self.collections.lock().await;
        map.entry(collection.to_string()).or_default().extend(docs);
        Ok(inserted)
    }

    async fn find_all(&self, collection: &str) -> Result<Vec<Document>, DocumentStoreError> {
        let map = self.collections.lock().await;
        Ok(map.get(collection).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fast_fetcher(max_retries: usize) -> HttpFetcher {
        HttpFetcher::new(HttpClientConfig {
            timeout: Duration::from_secs(5),
            backoff: BackoffPolicy {
                max_retries,
                base_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(5),
            },
            ..Default::default()
        })
        .expect("fetcher")
    }

    #[test]
    fn content_hashing_is_stable() {
        assert_eq!(
            sha256_hex(b"hello world"),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn backoff_logic_is_exponential_and_capped() {
        let policy = BackoffPolicy {
            max_retries: 5,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(350),
        };

        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(350));
        assert_eq!(policy.delay_for_attempt(5), Duration::from_millis(350));
    }

    #[test]
    fn status_classification() {
        assert_eq!(classify_status(StatusCode::SERVICE_UNAVAILABLE), RetryDisposition::Retryable);
        assert_eq!(classify_status(StatusCode::TOO_MANY_REQUESTS), RetryDisposition::Retryable);
        assert_eq!(classify_status(StatusCode::NOT_FOUND), RetryDisposition::NonRetryable);
    }

    #[test]
    fn unsafe_keys_are_rejected() {
        assert!(ensure_key_safe("abc.mp3").is_ok());
        assert!(ensure_key_safe("").is_err());
        assert!(ensure_key_safe("/etc/passwd").is_err());
        assert!(ensure_key_safe("../escape.mp3").is_err());
        assert!(ensure_bucket_safe("audio").is_ok());
        assert!(ensure_bucket_safe("Audio").is_err());
    }

    #[tokio::test]
    async fn retries_server_errors_then_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/aves.json"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/aves.json"))
            .respond_with(ResponseTemplate::new(200).set_body_string("[]"))
            .mount(&server)
            .await;

        let fetched = fast_fetcher(2)
            .fetch_bytes(&format!("{}/aves.json", server.uri()))
            .await
            .expect("fetch");
        assert_eq!(fetched.status, StatusCode::OK);
        assert_eq!(fetched.body, b"[]");
    }

    #[tokio::test]
    async fn client_errors_are_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let err = fast_fetcher(3)
            .fetch_bytes(&format!("{}/missing", server.uri()))
            .await
            .expect_err("404");
        assert!(matches!(err, FetchError::HttpStatus { status: 404, .. }));
    }

    #[tokio::test]
    async fn download_streams_body_to_disk() {
        let server = MockServer::start().await;
        let body = vec![7u8; 64 * 1024];
        Mock::given(method("GET"))
            .and(path("/1/download"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body.clone()))
            .mount(&server)
            .await;

        let dir = tempdir().expect("tempdir");
        let dest = dir.path().join("XC1.mp3");
        let written = fast_fetcher(0)
            .download_to_file(&format!("{}/1/download", server.uri()), &dest)
            .await
            .expect("download");

        assert_eq!(written, body.len() as u64);
        assert_eq!(std::fs::read(&dest).expect("read"), body);
    }

    #[tokio::test]
    async fn failed_download_leaves_no_file() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let dir = tempdir().expect("tempdir");
        let dest = dir.path().join("XC2.mp3");
        let result = fast_fetcher(1)
            .download_to_file(&format!("{}/2/download", server.uri()), &dest)
            .await;
        assert!(result.is_err());
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn local_store_writes_objects_atomically() {
        let dir = tempdir().expect("tempdir");
        let source = dir.path().join("in.mp3");
        std::fs::write(&source, b"ID3 audio").expect("write source");

        let store = LocalObjectStore::new(dir.path().join("objects"));
        let stored = store.put_file("audio", "abc.mp3", &source).await.expect("put");

        let object_path = store.object_path("audio", "abc.mp3");
        assert_eq!(std::fs::read(&object_path).expect("read"), b"ID3 audio");
        assert_eq!(stored.byte_size, 9);
        assert_eq!(stored.content_hash, sha256_hex(b"ID3 audio"));
        let leftovers = std::fs::read_dir(object_path.parent().expect("parent"))
            .expect("list")
            .count();
        assert_eq!(leftovers, 1);
    }

    #[tokio::test]
    async fn local_store_reports_missing_source() {
        let dir = tempdir().expect("tempdir");
        let store = LocalObjectStore::new(dir.path());
        let err = store
            .put_file("audio", "abc.mp3", &dir.path().join("nope.mp3"))
            .await
            .expect_err("missing source");
        assert!(matches!(err, ObjectStoreError::Read { .. }));
    }

    #[tokio::test]
    async fn http_store_puts_object_with_bearer_token() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/audio/abc.mp3"))
            .and(header("authorization", "Bearer s3cret"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempdir().expect("tempdir");
        let source = dir.path().join("in.mp3");
        std::fs::write(&source, b"audio").expect("write source");

        let store = HttpObjectStore::new(server.uri(), Some("s3cret".into()), fast_fetcher(0));
        let stored = store.put_file("audio", "abc.mp3", &source).await.expect("put");
        assert_eq!(stored.location, format!("{}/audio/abc.mp3", server.uri()));
        assert_eq!(stored.byte_size, 5);
    }

    #[tokio::test]
    async fn memory_store_preserves_insertion_order() {
        let store = MemoryDocumentStore::new();
        let docs = ["A", "B", "C"]
            .into_iter()
            .map(|name| {
                json!({ "scientific_name": name })
                    .as_object()
                    .cloned()
                    .expect("object")
            })
            .collect::<Vec<_>>();

        assert_eq!(store.count("classifications").await.expect("count"), 0);
        assert_eq!(store.insert_many("classifications", docs).await.expect("insert"), 3);
        assert_eq!(store.count("classifications").await.expect("count"), 3);
        assert_eq!(store.count("aves").await.expect("count"), 0);

        let names = store
            .find_all("classifications")
            .await
            .expect("find")
            .iter()
            .map(|d| d["scientific_name"].as_str().unwrap_or_default().to_string())
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["A", "B", "C"]);
    }
}
