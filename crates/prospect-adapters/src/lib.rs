//! Source adapter contracts + fixture-backed and job-postings adapters.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use prospect_core::{Icp, RawCompanyRecord, SourceKind, SIGNAL_RECENT_HIRING};
use prospect_storage::{FetchError, HttpFetcher};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub const CRATE_NAME: &str = "prospect-adapters";

pub const DEFAULT_SERPAPI_ENDPOINT: &str = "https://serpapi.com/search.json";
pub const DEFAULT_JOBS_PER_KEYWORD: usize = 3;

pub struct AdapterContext<'a> {
    pub run_id: Uuid,
    pub icp: &'a Icp,
    pub http: &'a HttpFetcher,
}

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("{0}")]
    Message(String),
    #[error("source {source_id} needs an API key and none was configured")]
    MissingCredential { source_id: String },
    #[error("bundle source_id={found} does not match adapter source_id={expected}")]
    SourceMismatch { expected: String, found: String },
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

/// One external data source producing raw company records.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn source_id(&self) -> &str;
    fn kind(&self) -> SourceKind;

    async fn fetch(&self, ctx: &AdapterContext<'_>) -> Result<Vec<RawCompanyRecord>, AdapterError>;
}

/// Registry entry describing one configured source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceConfig {
    pub source_id: String,
    pub display_name: String,
    pub kind: SourceKind,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    /// Relative to the workspace root.
    #[serde(default)]
    pub fixture_path: Option<PathBuf>,
}

fn enabled_by_default() -> bool {
    true
}

/// Settings shared by adapters that talk to live services.
#[derive(Debug, Clone)]
pub struct AdapterSettings {
    pub workspace_root: PathBuf,
    pub serpapi_key: Option<String>,
    pub serpapi_endpoint: String,
    pub jobs_per_keyword: usize,
}

impl Default for AdapterSettings {
    fn default() -> Self {
        Self {
            workspace_root: PathBuf::from("."),
            serpapi_key: None,
            serpapi_endpoint: DEFAULT_SERPAPI_ENDPOINT.to_string(),
            jobs_per_keyword: DEFAULT_JOBS_PER_KEYWORD,
        }
    }
}

/// Captured export of a company or funding database.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixtureBundle {
    pub source_id: String,
    pub captured_from: String,
    pub fetched_at: DateTime<Utc>,
    #[serde(default)]
    pub records: Vec<RawCompanyRecord>,
    #[serde(default)]
    pub notes: Option<String>,
}

pub fn load_fixture_bundle(path: impl AsRef<Path>) -> Result<FixtureBundle> {
    read_json_file(path)
}

fn read_json_file<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T> {
    let path = path.as_ref();
    let data = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&data).with_context(|| format!("parsing {}", path.display()))
}

fn tag_source(records: &mut [RawCompanyRecord], label: &str) {
    for record in records {
        if record.source.is_empty() {
            record.source.insert(label.to_string());
        }
    }
}

/// Company/funding database adapter replaying a captured fixture bundle.
#[derive(Debug, Clone)]
pub struct FixtureCompanyAdapter {
    source_id: String,
    label: String,
    kind: SourceKind,
    bundle_path: PathBuf,
}

impl FixtureCompanyAdapter {
    pub fn new(
        source_id: impl Into<String>,
        label: impl Into<String>,
        kind: SourceKind,
        bundle_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            label: label.into(),
            kind,
            bundle_path: bundle_path.into(),
        }
    }

    pub fn parse_bundle(&self, bundle: FixtureBundle) -> Result<Vec<RawCompanyRecord>, AdapterError> {
        if bundle.source_id != self.source_id {
            return Err(AdapterError::SourceMismatch {
                expected: self.source_id.clone(),
                found: bundle.source_id,
            });
        }
        let mut records = bundle.records;
        tag_source(&mut records, &self.label);
        Ok(records)
    }
}

#[async_trait]
impl SourceAdapter for FixtureCompanyAdapter {
    fn source_id(&self) -> &str {
        &self.source_id
    }

    fn kind(&self) -> SourceKind {
        self.kind
    }

    async fn fetch(&self, _ctx: &AdapterContext<'_>) -> Result<Vec<RawCompanyRecord>, AdapterError> {
        let bundle = load_fixture_bundle(&self.bundle_path)?;
        debug!(
            source_id = %self.source_id,
            captured_from = %bundle.captured_from,
            "loaded fixture bundle"
        );
        self.parse_bundle(bundle)
    }
}

/// Google-jobs search via SerpAPI; every hit becomes a hiring signal.
#[derive(Debug, Clone)]
pub struct JobPostingsAdapter {
    source_id: String,
    label: String,
    api_key: Option<String>,
    endpoint: String,
    jobs_per_keyword: usize,
    replay_path: Option<PathBuf>,
}

impl JobPostingsAdapter {
    pub fn new(source_id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            label: label.into(),
            api_key: None,
            endpoint: DEFAULT_SERPAPI_ENDPOINT.to_string(),
            jobs_per_keyword: DEFAULT_JOBS_PER_KEYWORD,
            replay_path: None,
        }
    }

    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key.filter(|k| !k.trim().is_empty());
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_jobs_per_keyword(mut self, jobs_per_keyword: usize) -> Self {
        self.jobs_per_keyword = jobs_per_keyword;
        self
    }

    /// Captured search response used when no API key is configured.
    pub fn with_replay(mut self, path: Option<PathBuf>) -> Self {
        self.replay_path = path;
        self
    }

    pub fn search_query(keyword: &str) -> String {
        format!("{keyword} data jobs in USA")
    }

    /// Extract up to `limit` hiring records from one search response.
    pub fn parse_jobs_response(&self, response: &JsonValue) -> Vec<RawCompanyRecord> {
        let Some(jobs) = response.get("jobs_results").and_then(|v| v.as_array()) else {
            return Vec::new();
        };
        jobs.iter()
            .take(self.jobs_per_keyword)
            .filter_map(|job| {
                // Nameless postings are dropped, so they never name the empty-domain entry.
                let Some(company_name) = json_str(job, &["company_name"]) else {
                    debug!(source_id = %self.source_id, "skipping job without company_name");
                    return None;
                };
                Some(RawCompanyRecord {
                    company_name: company_name.to_string(),
                    domain: Some(String::new()),
                    signals: [(SIGNAL_RECENT_HIRING.to_string(), true)].into(),
                    source: BTreeSet::from([self.label.clone()]),
                    ..Default::default()
                })
            })
            .collect()
    }

    /// Partial keyword failures are skipped; failing every keyword is an error.
    async fn search_live(
        &self,
        ctx: &AdapterContext<'_>,
        api_key: &str,
    ) -> Result<Vec<RawCompanyRecord>, AdapterError> {
        let mut companies = Vec::new();
        let mut any_succeeded = false;
        let mut last_error = None;
        for keyword in &ctx.icp.keywords {
            let q = Self::search_query(keyword);
            let query = [("engine", "google_jobs"), ("q", q.as_str()), ("api_key", api_key)];
            match ctx
                .http
                .get_json(ctx.run_id, &self.source_id, &self.endpoint, &query)
                .await
            {
                Ok(response) => {
                    any_succeeded = true;
                    companies.extend(self.parse_jobs_response(&response));
                }
                Err(err) => {
                    warn!(
                        source_id = %self.source_id,
                        keyword = %keyword,
                        error = %err,
                        "job search failed; skipping keyword"
                    );
                    last_error = Some(err);
                }
            }
        }
        match last_error {
            Some(err) if !any_succeeded => Err(AdapterError::Fetch(err)),
            _ => Ok(companies),
        }
    }

    fn replay(&self, ctx: &AdapterContext<'_>, path: &Path) -> Result<Vec<RawCompanyRecord>, AdapterError> {
        let response: JsonValue = read_json_file(path)?;
        let mut companies = Vec::new();
        for _keyword in &ctx.icp.keywords {
            companies.extend(self.parse_jobs_response(&response));
        }
        Ok(companies)
    }
}

#[async_trait]
impl SourceAdapter for JobPostingsAdapter {
    fn source_id(&self) -> &str {
        &self.source_id
    }

    fn kind(&self) -> SourceKind {
        SourceKind::JobPostings
    }

    async fn fetch(&self, ctx: &AdapterContext<'_>) -> Result<Vec<RawCompanyRecord>, AdapterError> {
        let companies = match (&self.api_key, &self.replay_path) {
            (Some(api_key), _) => self.search_live(ctx, api_key).await?,
            (None, Some(path)) => {
                info!(source_id = %self.source_id, path = %path.display(), "no API key; replaying captured search");
                self.replay(ctx, path)?
            }
            (None, None) => {
                return Err(AdapterError::MissingCredential {
                    source_id: self.source_id.clone(),
                })
            }
        };
        info!(source_id = %self.source_id, signals = companies.len(), "collected hiring signals");
        Ok(companies)
    }
}

fn json_str<'a>(value: &'a JsonValue, path: &[&str]) -> Option<&'a str> {
    let mut cur = value;
    for segment in path {
        cur = cur.get(*segment)?;
    }
    cur.as_str().filter(|s| !s.trim().is_empty())
}

/// Build the adapter for a registry entry. Fixture paths resolve against the workspace root.
pub fn adapter_for_source(
    source: &SourceConfig,
    settings: &AdapterSettings,
) -> Result<Box<dyn SourceAdapter>, AdapterError> {
    let fixture = source
        .fixture_path
        .as_ref()
        .map(|p| settings.workspace_root.join(p));
    match source.kind {
        SourceKind::CompanyDatabase | SourceKind::FundingDatabase => {
            let path = fixture.ok_or_else(|| {
                AdapterError::Message(format!(
                    "source {} has no fixture_path configured",
                    source.source_id
                ))
            })?;
            Ok(Box::new(FixtureCompanyAdapter::new(
                source.source_id.clone(),
                source.display_name.clone(),
                source.kind,
                path,
            )))
        }
        SourceKind::JobPostings => Ok(Box::new(
            JobPostingsAdapter::new(source.source_id.clone(), source.display_name.clone())
                .with_api_key(settings.serpapi_key.clone())
                .with_endpoint(settings.serpapi_endpoint.clone())
                .with_jobs_per_keyword(settings.jobs_per_keyword)
                .with_replay(fixture),
        )),
    }
}
