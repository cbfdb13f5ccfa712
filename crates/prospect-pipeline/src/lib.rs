//! Enrichment pipeline orchestration: sources -> merge -> score -> snapshot.

pub mod merge;
pub mod score;

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use prospect_adapters::{
    adapter_for_source, AdapterContext, AdapterSettings, SourceConfig, DEFAULT_JOBS_PER_KEYWORD,
    DEFAULT_SERPAPI_ENDPOINT,
};
use prospect_core::{CompanyRecord, Icp, RawCompanyRecord, SourceKind};
use prospect_storage::{HttpClientConfig, HttpFetcher, SnapshotSink};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{info, warn};
use uuid::Uuid;

pub use merge::{merge_results, MergeError, RecordMerger};
pub use score::{compute_confidence, score_records, FitIndicators};

pub const CRATE_NAME: &str = "prospect-pipeline";

#[derive(Debug, Clone, Deserialize)]
pub struct SourceRegistry {
    pub sources: Vec<SourceConfig>,
}

impl SourceRegistry {
    pub async fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .await
            .with_context(|| format!("reading {}", path.display()))?;
        serde_yaml::from_str(&text).with_context(|| format!("parsing {}", path.display()))
    }

    /// Enabled sources ordered company database, funding database, job postings.
    /// Registry order is kept within a kind.
    pub fn enabled_in_merge_order(&self) -> Vec<SourceConfig> {
        let mut enabled: Vec<_> = self.sources.iter().filter(|s| s.enabled).cloned().collect();
        enabled.sort_by_key(|s| s.kind);
        enabled
    }
}

#[derive(Clone)]
pub struct PipelineConfig {
    pub workspace_root: PathBuf,
    pub icp_path: PathBuf,
    pub output_path: PathBuf,
    pub registry_path: PathBuf,
    pub serpapi_key: Option<String>,
    pub serpapi_endpoint: String,
    pub jobs_per_keyword: usize,
    pub user_agent: String,
    pub http_timeout_secs: u64,
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("workspace_root", &self.workspace_root)
            .field("icp_path", &self.icp_path)
            .field("output_path", &self.output_path)
            .field("registry_path", &self.registry_path)
            .field("serpapi_key", &self.serpapi_key.as_ref().map(|_| "<redacted>"))
            .field("serpapi_endpoint", &self.serpapi_endpoint)
            .field("jobs_per_keyword", &self.jobs_per_keyword)
            .field("user_agent", &self.user_agent)
            .field("http_timeout_secs", &self.http_timeout_secs)
            .finish()
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workspace_root: PathBuf::from("."),
            icp_path: PathBuf::from("icp.json"),
            output_path: PathBuf::from("output.json"),
            registry_path: PathBuf::from("sources.yaml"),
            serpapi_key: None,
            serpapi_endpoint: DEFAULT_SERPAPI_ENDPOINT.to_string(),
            jobs_per_keyword: DEFAULT_JOBS_PER_KEYWORD,
            user_agent: "prospect-bot/0.1".to_string(),
            http_timeout_secs: 20,
        }
    }
}

impl PipelineConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            workspace_root: std::env::var("PROSPECT_WORKSPACE_ROOT")
                .map(PathBuf::from)
                .unwrap_or(defaults.workspace_root),
            icp_path: std::env::var("PROSPECT_ICP_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.icp_path),
            output_path: std::env::var("PROSPECT_OUTPUT_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.output_path),
            registry_path: std::env::var("PROSPECT_SOURCES_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.registry_path),
            serpapi_key: std::env::var("SERPAPI_KEY").ok().filter(|k| !k.trim().is_empty()),
            serpapi_endpoint: std::env::var("PROSPECT_SERPAPI_ENDPOINT")
                .unwrap_or(defaults.serpapi_endpoint),
            jobs_per_keyword: std::env::var("PROSPECT_JOBS_PER_KEYWORD")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.jobs_per_keyword),
            user_agent: std::env::var("PROSPECT_USER_AGENT").unwrap_or(defaults.user_agent),
            http_timeout_secs: std::env::var("PROSPECT_HTTP_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.http_timeout_secs),
        }
    }

    /// Relative paths resolve against the workspace root.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.workspace_root.join(path)
        }
    }

    pub fn icp_file(&self) -> PathBuf {
        self.resolve(&self.icp_path)
    }

    pub fn output_file(&self) -> PathBuf {
        self.resolve(&self.output_path)
    }

    pub fn registry_file(&self) -> PathBuf {
        self.resolve(&self.registry_path)
    }

    fn adapter_settings(&self) -> AdapterSettings {
        AdapterSettings {
            workspace_root: self.workspace_root.clone(),
            serpapi_key: self.serpapi_key.clone(),
            serpapi_endpoint: self.serpapi_endpoint.clone(),
            jobs_per_keyword: self.jobs_per_keyword,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceOutcome {
    pub source_id: String,
    pub kind: SourceKind,
    pub records: usize,
    /// Error that made the source fall back to an empty result.
    pub degraded: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompanySummary {
    pub company_name: String,
    pub confidence: Option<f64>,
}

impl fmt::Display for CompanySummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.confidence {
            Some(confidence) => write!(f, "- {} : {:?}", self.company_name, confidence),
            None => write!(f, "- {} : unscored", self.company_name),
        }
    }
}

pub fn summarize(records: &[CompanyRecord]) -> Vec<CompanySummary> {
    records
        .iter()
        .map(|r| CompanySummary {
            company_name: r.company_name.clone(),
            confidence: r.confidence,
        })
        .collect()
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub sources: Vec<SourceOutcome>,
    pub merged_records: usize,
    pub empty_domain_collisions: usize,
    pub output_path: String,
    pub output_sha256: String,
    pub companies: Vec<CompanySummary>,
}

pub struct EnrichmentPipeline {
    config: PipelineConfig,
    http: HttpFetcher,
    sink: SnapshotSink,
}

impl EnrichmentPipeline {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        let http = HttpFetcher::new(HttpClientConfig {
            timeout: Duration::from_secs(config.http_timeout_secs),
            user_agent: Some(config.user_agent.clone()),
            ..Default::default()
        })?;
        let sink = SnapshotSink::new(config.output_file());
        Ok(Self { config, http, sink })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub async fn run_once(&self) -> Result<RunSummary> {
        let started_at = Utc::now();
        let run_id = Uuid::new_v4();

        let icp_path = self.config.icp_file();
        let icp = Icp::load(&icp_path).with_context(|| format!("loading ICP {}", icp_path.display()))?;
        let registry = SourceRegistry::load(&self.config.registry_file()).await?;
        info!(%run_id, sources = registry.sources.len(), "starting prospect search");

        let (batches, sources) = self.collect_sources(run_id, &icp, &registry).await?;

        let mut merger = RecordMerger::new();
        for (batch, outcome) in batches.iter().zip(&sources) {
            merger
                .absorb(batch)
                .with_context(|| format!("merging records from {}", outcome.source_id))?;
        }
        let empty_domain_collisions = merger.empty_domain_collisions();
        if empty_domain_collisions > 0 {
            warn!(
                %run_id,
                collisions = empty_domain_collisions,
                "records without a domain were merged into a single entry"
            );
        }

        let mut merged = merger.finish();
        score_records(&mut merged, &icp);

        let written = self.sink.write(&merged).await?;
        info!(
            %run_id,
            path = %written.path.display(),
            records = written.records,
            bytes = written.byte_size,
            "snapshot written"
        );

        Ok(RunSummary {
            run_id,
            started_at,
            finished_at: Utc::now(),
            sources,
            merged_records: merged.len(),
            empty_domain_collisions,
            output_path: written.path.display().to_string(),
            output_sha256: written.sha256,
            companies: summarize(&merged),
        })
    }

    /// Run every enabled source in merge order. Adapter failures degrade to an
    /// empty batch; misconfigured registry entries are fatal.
    async fn collect_sources(
        &self,
        run_id: Uuid,
        icp: &Icp,
        registry: &SourceRegistry,
    ) -> Result<(Vec<Vec<RawCompanyRecord>>, Vec<SourceOutcome>)> {
        let settings = self.config.adapter_settings();
        let ctx = AdapterContext {
            run_id,
            icp,
            http: &self.http,
        };

        let mut batches = Vec::new();
        let mut outcomes = Vec::new();
        for source in registry.enabled_in_merge_order() {
            let adapter = adapter_for_source(&source, &settings)
                .with_context(|| format!("building adapter for {}", source.source_id))?;

            let (records, degraded) = match adapter.fetch(&ctx).await {
                Ok(records) => (records, None),
                Err(err) => {
                    warn!(
                        %run_id,
                        source_id = %source.source_id,
                        error = %err,
                        "source failed; continuing with no records"
                    );
                    (Vec::new(), Some(err.to_string()))
                }
            };
            info!(%run_id, source_id = %source.source_id, records = records.len(), "source collected");

            outcomes.push(SourceOutcome {
                source_id: source.source_id.clone(),
                kind: source.kind,
                records: records.len(),
                degraded,
            });
            batches.push(records);
        }
        Ok((batches, outcomes))
    }
}

pub async fn run_once_from_env() -> Result<RunSummary> {
    EnrichmentPipeline::new(PipelineConfig::from_env())?.run_once().await
}

/// Recompute confidence for an existing snapshot against `icp_path` and
/// write the result to `output`.
pub async fn rescore_snapshot(icp_path: &Path, input: &Path, output: &Path) -> Result<Vec<CompanySummary>> {
    let icp = Icp::load(icp_path).with_context(|| format!("loading ICP {}", icp_path.display()))?;
    let mut records = SnapshotSink::new(input).read().await?;
    score_records(&mut records, &icp);
    SnapshotSink::new(output).write(&records).await?;
    Ok(summarize(&records))
}

pub async fn read_snapshot_summary(input: &Path) -> Result<Vec<CompanySummary>> {
    let records = SnapshotSink::new(input).read().await?;
    Ok(summarize(&records))
}
