//! One scrape run end to end: config, every enabled source, dedup, retention, persistence and
//! derived exports.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use jobscout_adapters::{adapter_for_source, AdapterError};
use jobscout_core::{AdapterKind, JobPosting, Normalizer, SourceDescriptor};
use jobscout_storage::{CollectionStore, HttpClientConfig, HttpFetcher, DEFAULT_USER_AGENT};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

mod dedup;
mod export;
mod handle;
mod retention;

pub use dedup::{DedupHook, IdDedupEngine, NoopDedupHook};
pub use export::{
    encode_postings_csv, export_paths, render_titles, write_exports, ExportManifest,
    ExportManifestFile, ExportPaths,
};
pub use handle::{RunHandle, RunStatus};
pub use retention::{recent_postings, RetentionFilter};

pub const CRATE_NAME: &str = "jobscout-sync";
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";
pub const DEFAULT_OUTPUT_FILE: &str = "jobs.json";

const RECENT_WINDOW_HOURS: i64 = 24;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing config {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
}

/// The user-edited board list plus run settings. JSON configs load too.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoutConfig {
    #[serde(default)]
    pub job_boards: Vec<SourceDescriptor>,
    #[serde(default)]
    pub settings: RunSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSettings {
    /// Relative paths resolve against the config file's directory.
    #[serde(default = "default_output_file")]
    pub output_file: PathBuf,
    #[serde(default = "default_dedupe")]
    pub dedupe: bool,
    #[serde(default)]
    pub max_age_days: Option<u32>,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            output_file: default_output_file(),
            dedupe: default_dedupe(),
            max_age_days: None,
        }
    }
}

fn default_output_file() -> PathBuf {
    PathBuf::from(DEFAULT_OUTPUT_FILE)
}

fn default_dedupe() -> bool {
    true
}

impl ScoutConfig {
    pub fn parse(text: &str) -> Result<Self, serde_yaml::Error> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(text)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&text).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    /// Never fails: an unreadable or malformed config is an empty one.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::from_path(path) {
            Ok(config) => config,
            Err(err) => {
                warn!(error = %err, "config unavailable; continuing with no sources");
                Self::default()
            }
        }
    }

    pub fn enabled_sources(&self) -> impl Iterator<Item = &SourceDescriptor> {
        self.job_boards.iter().filter(|source| source.enabled)
    }

    pub fn output_path(&self, config_dir: &Path) -> PathBuf {
        config_dir.join(&self.settings.output_file)
    }
}

/// Process-level knobs, read from the environment.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub config_path: PathBuf,
    pub user_agent: String,
    pub http_timeout_secs: u64,
    pub probe_timeout_secs: u64,
}

impl PipelineConfig {
    pub fn new(config_path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            http_timeout_secs: 15,
            probe_timeout_secs: 10,
        }
    }

    pub fn from_env() -> Self {
        let defaults = Self::new(DEFAULT_CONFIG_FILE);
        Self {
            config_path: std::env::var("JOBSCOUT_CONFIG")
                .map(PathBuf::from)
                .unwrap_or(defaults.config_path),
            user_agent: std::env::var("JOBSCOUT_USER_AGENT").unwrap_or(defaults.user_agent),
            http_timeout_secs: std::env::var("JOBSCOUT_HTTP_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.http_timeout_secs),
            probe_timeout_secs: std::env::var("JOBSCOUT_PROBE_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.probe_timeout_secs),
        }
    }

    pub fn config_dir(&self) -> PathBuf {
        match self.config_path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceReport {
    pub name: String,
    pub kind: AdapterKind,
    pub postings: usize,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub enabled_sources: usize,
    pub scraped_postings: usize,
    pub new_postings: usize,
    pub total_postings: usize,
    pub pruned_postings: usize,
    pub recent_postings: usize,
    pub output_file: String,
    pub sources: Vec<SourceReport>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProbeReport {
    pub name: String,
    pub url: String,
    pub kind: AdapterKind,
    pub status: Option<u16>,
    pub error: Option<String>,
}

impl ProbeReport {
    pub fn reachable(&self) -> bool {
        self.status.is_some_and(|status| status < 400)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOutcome {
    pub collection: Vec<JobPosting>,
    pub new_postings: usize,
    pub pruned_postings: usize,
}

/// Appends the unseen part of `batch` to `prior`, then ages out stale postings.
pub fn merge_collections(
    prior: Vec<JobPosting>,
    batch: Vec<JobPosting>,
    dedup: &dyn DedupHook,
    retention: &RetentionFilter,
    now: DateTime<Utc>,
) -> MergeOutcome {
    let fresh = dedup.apply(batch, &prior);
    let new_postings = fresh.len();

    let mut merged = prior;
    merged.extend(fresh);
    let before = merged.len();
    let collection = retention.apply(merged, now);

    MergeOutcome {
        pruned_postings: before - collection.len(),
        collection,
        new_postings,
    }
}

pub struct ScoutPipeline {
    config: PipelineConfig,
    http: HttpFetcher,
    dedup: Box<dyn DedupHook>,
}

impl ScoutPipeline {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        let http = HttpFetcher::new(HttpClientConfig {
            timeout: Duration::from_secs(config.http_timeout_secs),
            probe_timeout: Duration::from_secs(config.probe_timeout_secs),
            user_agent: Some(config.user_agent.clone()),
        })?;
        Ok(Self {
            config,
            http,
            dedup: Box::<IdDedupEngine>::default(),
        })
    }

    /// Replaces the engine used when `settings.dedupe` is on.
    pub fn with_dedup_hook(mut self, dedup: Box<dyn DedupHook>) -> Self {
        self.dedup = dedup;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Re-read on every call so edits between runs are picked up.
    pub fn load_config(&self) -> ScoutConfig {
        ScoutConfig::load_or_default(&self.config.config_path)
    }

    pub fn output_path(&self, scout: &ScoutConfig) -> PathBuf {
        scout.output_path(&self.config.config_dir())
    }

    pub async fn scrape_source(
        &self,
        source: &SourceDescriptor,
        normalizer: &Normalizer,
    ) -> Result<Vec<JobPosting>, AdapterError> {
        let adapter = adapter_for_source(source);
        let span = info_span!("scrape_source", source = %source.name, kind = %adapter.kind());
        let raw = adapter.fetch_postings(&self.http, source).instrument(span).await?;
        Ok(normalizer.normalize_all(source, raw))
    }

    pub async fn run_once(&self) -> Result<RunSummary> {
        self.run_reporting(None).await
    }

    pub(crate) async fn run_reporting(
        &self,
        progress: Option<&watch::Sender<RunStatus>>,
    ) -> Result<RunSummary> {
        let started_at = Utc::now();
        let run_id = Uuid::new_v4();
        let scout = self.load_config();
        let output_path = self.output_path(&scout);
        let store = CollectionStore::new(&output_path);
        let prior = store.load().await;
        let enabled: Vec<&SourceDescriptor> = scout.enabled_sources().collect();
        info!(%run_id, enabled_sources = enabled.len(), prior_postings = prior.len(), "starting scrape run");

        let normalizer = Normalizer::now();
        let mut batch = Vec::new();
        let mut sources = Vec::with_capacity(enabled.len());
        for (completed, source) in enabled.iter().enumerate() {
            if let Some(progress) = progress {
                progress.send_replace(RunStatus::Running {
                    current_source: source.name.clone(),
                    completed,
                    total: enabled.len(),
                });
            }
            let kind = source.adapter_kind();
            let report = match self.scrape_source(source, &normalizer).await {
                Ok(postings) => {
                    info!(source = %source.name, %kind, postings = postings.len(), "source scraped");
                    let report = SourceReport {
                        name: source.name.clone(),
                        kind,
                        postings: postings.len(),
                        error: None,
                    };
                    batch.extend(postings);
                    report
                }
                Err(err) => {
                    warn!(source = %source.name, %kind, error = %err, "source failed; it contributes no postings");
                    SourceReport {
                        name: source.name.clone(),
                        kind,
                        postings: 0,
                        error: Some(err.to_string()),
                    }
                }
            };
            sources.push(report);
        }

        let scraped_postings = batch.len();
        let noop = NoopDedupHook;
        let dedup: &dyn DedupHook = if scout.settings.dedupe {
            self.dedup.as_ref()
        } else {
            &noop
        };
        let retention = RetentionFilter::new(scout.settings.max_age_days);
        let now = Utc::now();
        let outcome = merge_collections(prior, batch, dedup, &retention, now);

        store
            .save(&outcome.collection)
            .await
            .with_context(|| format!("saving collection to {}", output_path.display()))?;

        match write_exports(&output_path, &outcome.collection, now).await {
            Ok(paths) => debug!(manifest = %paths.manifest.display(), "exports written"),
            Err(err) => warn!(error = %format!("{err:#}"), "writing exports failed"),
        }

        let summary = RunSummary {
            run_id,
            started_at,
            finished_at: Utc::now(),
            enabled_sources: enabled.len(),
            scraped_postings,
            new_postings: outcome.new_postings,
            total_postings: outcome.collection.len(),
            pruned_postings: outcome.pruned_postings,
            recent_postings: recent_postings(&outcome.collection, RECENT_WINDOW_HOURS, now).len(),
            output_file: output_path.display().to_string(),
            sources,
        };
        info!(
            %run_id,
            scraped = summary.scraped_postings,
            new = summary.new_postings,
            total = summary.total_postings,
            pruned = summary.pruned_postings,
            recent = summary.recent_postings,
            "scrape run complete"
        );
        Ok(summary)
    }

    /// Hits every enabled source once with the probe timeout.
    pub async fn probe_sources(&self) -> Vec<ProbeReport> {
        let scout = self.load_config();
        let mut reports = Vec::new();
        for source in scout.enabled_sources() {
            let outcome = self.http.probe(&source.url).await;
            reports.push(ProbeReport {
                name: source.name.clone(),
                url: source.url.clone(),
                kind: source.adapter_kind(),
                status: outcome.as_ref().ok().map(|status| status.as_u16()),
                error: outcome.err().map(|err| err.to_string()),
            });
        }
        reports
    }
}

pub async fn run_once_from_env() -> Result<RunSummary> {
    ScoutPipeline::new(PipelineConfig::from_env())?.run_once().await
}
