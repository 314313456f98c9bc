//! Collection persistence + HTTP fetch utilities for jobscout.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use jobscout_core::JobPosting;
use reqwest::header::{HeaderName, HeaderValue};
use reqwest::StatusCode;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info_span, warn, Instrument};
use uuid::Uuid;

pub const CRATE_NAME: &str = "jobscout-storage";

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// JSON-array file holding the persisted posting collection.
#[derive(Debug, Clone)]
pub struct CollectionStore {
    path: PathBuf,
}

impl CollectionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the prior collection. A missing or unparsable file yields an empty collection;
    /// individual records that fail to decode are skipped.
    pub async fn load(&self) -> Vec<JobPosting> {
        let text = match fs::read_to_string(&self.path).await {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no prior collection");
                return Vec::new();
            }
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "reading prior collection failed; starting empty");
                return Vec::new();
            }
        };
        if let Ok(postings) = serde_json::from_str(&text) {
            return postings;
        }
        let records = match serde_json::from_str::<Vec<serde_json::Value>>(&text) {
            Ok(records) => records,
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "prior collection is corrupt; starting empty");
                return Vec::new();
            }
        };

        // One malformed record must not discard the rest of the history.
        let total = records.len();
        let postings: Vec<JobPosting> = records
            .into_iter()
            .enumerate()
            .filter_map(|(index, record)| match serde_json::from_value(record) {
                Ok(posting) => Some(posting),
                Err(err) => {
                    warn!(path = %self.path.display(), index, error = %err, "skipping unreadable record");
                    None
                }
            })
            .collect();
        warn!(
            path = %self.path.display(),
            kept = postings.len(),
            skipped = total - postings.len(),
            "prior collection partially readable"
        );
        postings
    }

    /// Writes the collection via a temp file in the same directory and an atomic rename.
    pub async fn save(&self, postings: &[JobPosting]) -> anyhow::Result<()> {
        let bytes = serde_json::to_vec_pretty(postings).context("serializing posting collection")?;
        write_atomic(&self.path, &bytes).await
    }
}

/// Replaces `path` with `bytes` so readers never observe a partially written file.
pub async fn write_atomic(path: &Path, bytes: &[u8]) -> anyhow::Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&parent)
        .await
        .with_context(|| format!("creating directory {}", parent.display()))?;

    let temp_path = parent.join(format!(".{}.{}.tmp", Uuid::new_v4(), bytes.len()));
    let mut file = fs::OpenOptions::new()
        .create_new(true)
        .write(true)
        .open(&temp_path)
        .await
        .with_context(|| format!("opening temp file {}", temp_path.display()))?;
    file.write_all(bytes)
        .await
        .with_context(|| format!("writing temp file {}", temp_path.display()))?;
    file.flush()
        .await
        .with_context(|| format!("flushing temp file {}", temp_path.display()))?;
    drop(file);

    if let Err(err) = fs::rename(&temp_path, path).await {
        let _ = fs::remove_file(&temp_path).await;
        return Err(err).with_context(|| {
            format!(
                "atomically renaming {} -> {}",
                temp_path.display(),
                path.display()
            )
        });
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Applied to listing, feed and API requests.
    pub timeout: Duration,
    /// Applied to reachability probes.
    pub probe_timeout: Duration,
    pub user_agent: Option<String>,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(15),
            probe_timeout: Duration::from_secs(10),
            user_agent: Some(DEFAULT_USER_AGENT.to_string()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FetchedResponse {
    pub status: StatusCode,
    pub final_url: String,
    pub body: String,
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("http status {status} for {url}")]
    HttpStatus { status: u16, url: String },
    #[error("invalid header {0}")]
    InvalidHeader(String),
}

/// Thin reqwest wrapper. Requests are issued once; nothing is retried within a run.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    timeout: Duration,
    probe_timeout: Duration,
}

impl HttpFetcher {
    pub fn new(config: HttpClientConfig) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .timeout(config.timeout);

        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }

        let client = builder.build().context("building reqwest client")?;
        Ok(Self {
            client,
            timeout: config.timeout,
            probe_timeout: config.probe_timeout,
        })
    }

    /// GETs `url` and returns the response whatever its status.
    ///
    /// `headers` are layered over the client defaults; a source header with the same name as a
    /// default (e.g. `User-Agent`) replaces it.
    pub async fn get(
        &self,
        url: &str,
        headers: Option<&BTreeMap<String, String>>,
    ) -> Result<FetchedResponse, FetchError> {
        let mut request = self.client.get(url).timeout(self.timeout);
        for (name, value) in headers.into_iter().flatten() {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| FetchError::InvalidHeader(name.clone()))?;
            let value = HeaderValue::from_str(value)
                .map_err(|_| FetchError::InvalidHeader(name.to_string()))?;
            request = request.header(name, value);
        }

        async move {
            let resp = request.send().await?;
            let status = resp.status();
            let final_url = resp.url().to_string();
            let body = resp.text().await?;
            debug!(status = status.as_u16(), bytes = body.len(), "fetched");
            Ok(FetchedResponse {
                status,
                final_url,
                body,
            })
        }
        .instrument(info_span!("http_fetch", url))
        .await
    }

    /// Like [`HttpFetcher::get`], but any non-success status is an error.
    pub async fn fetch_text(
        &self,
        url: &str,
        headers: Option<&BTreeMap<String, String>>,
    ) -> Result<FetchedResponse, FetchError> {
        let resp = self.get(url, headers).await?;
        if !resp.status.is_success() {
            return Err(FetchError::HttpStatus {
                status: resp.status.as_u16(),
                url: resp.final_url,
            });
        }
        Ok(resp)
    }

    /// Reachability check with the shorter probe timeout; the body is discarded.
    pub async fn probe(&self, url: &str) -> Result<StatusCode, FetchError> {
        let resp = self
            .client
            .get(url)
            .timeout(self.probe_timeout)
            .send()
            .instrument(info_span!("http_probe", url))
            .await?;
        Ok(resp.status())
    }
}
