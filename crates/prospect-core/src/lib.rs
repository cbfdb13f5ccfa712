//! Core domain model for the prospect search agent: ICP + company records.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const CRATE_NAME: &str = "prospect-core";

pub const SIGNAL_NEW_FUNDING: &str = "new_funding";
pub const SIGNAL_RECENT_HIRING: &str = "recent_hiring";

/// Boolean signal flags keyed by signal name.
pub type Signals = BTreeMap<String, bool>;

/// Ideal Customer Profile. Loaded once per run, read-only afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Icp {
    /// Acceptable industry labels, matched case-insensitively as substrings.
    pub industry: Vec<String>,
    /// Search terms for the job-postings source.
    pub keywords: Vec<String>,
    pub signals: IcpSignals,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IcpSignals {
    pub tech_stack: Vec<String>,
}

#[derive(Debug, Error)]
pub enum IcpError {
    #[error("reading ICP {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing ICP {path}: {message}")]
    Parse { path: String, message: String },
    #[error("ICP {path} has unsupported extension (expected .json, .yaml or .yml)")]
    UnsupportedFormat { path: String },
    #[error("ICP is missing required field `{0}`")]
    MissingField(&'static str),
}

#[derive(Debug, Deserialize)]
struct IcpDocument {
    industry: Option<Vec<String>>,
    keywords: Option<Vec<String>>,
    signals: Option<IcpSignalsDocument>,
}

#[derive(Debug, Deserialize)]
struct IcpSignalsDocument {
    tech_stack: Option<Vec<String>>,
}

impl Icp {
    /// Load an ICP document, picking the decoder from the file extension.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, IcpError> {
        let path = path.as_ref();
        let display = path.display().to_string();
        let text = fs::read_to_string(path).map_err(|source| IcpError::Read {
            path: display.clone(),
            source,
        })?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::parse_json(&text, &display),
            Some("yaml") | Some("yml") => Self::parse_yaml(&text, &display),
            _ => Err(IcpError::UnsupportedFormat { path: display }),
        }
    }

    pub fn from_json_str(text: &str) -> Result<Self, IcpError> {
        Self::parse_json(text, "<inline>")
    }

    pub fn from_yaml_str(text: &str) -> Result<Self, IcpError> {
        Self::parse_yaml(text, "<inline>")
    }

    fn parse_json(text: &str, path: &str) -> Result<Self, IcpError> {
        let doc: IcpDocument = serde_json::from_str(text).map_err(|e| IcpError::Parse {
            path: path.to_string(),
            message: e.to_string(),
        })?;
        Self::from_document(doc)
    }

    fn parse_yaml(text: &str, path: &str) -> Result<Self, IcpError> {
        let doc: IcpDocument = serde_yaml::from_str(text).map_err(|e| IcpError::Parse {
            path: path.to_string(),
            message: e.to_string(),
        })?;
        Self::from_document(doc)
    }

    fn from_document(doc: IcpDocument) -> Result<Self, IcpError> {
        let industry = doc.industry.ok_or(IcpError::MissingField("industry"))?;
        let keywords = doc.keywords.ok_or(IcpError::MissingField("keywords"))?;
        let tech_stack = doc
            .signals
            .and_then(|s| s.tech_stack)
            .ok_or(IcpError::MissingField("signals.tech_stack"))?;
        Ok(Self {
            industry,
            keywords,
            signals: IcpSignals { tech_stack },
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Contact {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub linkedin: String,
}

/// Company record as produced by a source adapter, before merge.
///
/// `domain` is optional here only so a record without one can be reported
/// as a contract violation by the merger instead of failing deserialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct RawCompanyRecord {
    #[serde(default)]
    pub company_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revenue: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub employee_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub industry: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contacts: Option<Vec<Contact>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub funding_stage: Option<String>,
    #[serde(default)]
    pub signals: Signals,
    #[serde(default)]
    pub source: BTreeSet<String>,
}

impl RawCompanyRecord {
    /// Copy this record into its keyed form. `None` when the record has no domain.
    pub fn to_keyed(&self) -> Option<CompanyRecord> {
        let domain = self.domain.clone()?;
        Some(CompanyRecord {
            company_name: self.company_name.clone(),
            domain,
            revenue: self.revenue,
            employee_count: self.employee_count,
            industry: self.industry.clone(),
            contacts: self.contacts.clone(),
            funding_stage: self.funding_stage.clone(),
            signals: self.signals.clone(),
            source: self.source.clone(),
            confidence: None,
        })
    }
}

/// Merged company record, unique by `domain` within a result set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanyRecord {
    pub company_name: String,
    pub domain: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revenue: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub employee_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub industry: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contacts: Option<Vec<Contact>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub funding_stage: Option<String>,
    #[serde(default)]
    pub signals: Signals,
    #[serde(default)]
    pub source: BTreeSet<String>,
    /// Set by the scorer; absent on unscored records.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

impl CompanyRecord {
    pub fn signal(&self, name: &str) -> bool {
        self.signals.get(name).copied().unwrap_or(false)
    }
}

/// The three conceptual data sources, in the order their results are merged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    CompanyDatabase,
    FundingDatabase,
    JobPostings,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const ICP_JSON: &str = r#"{
        "industry": ["Software", "FinTech"],
        "keywords": ["data engineer"],
        "signals": {"tech_stack": ["AWS", "Python"]},
        "revenue_range": [20000000, 100000000]
    }"#;

    #[test]
    fn icp_loads_from_json_and_ignores_unknown_fields() {
        let icp = Icp::from_json_str(ICP_JSON).unwrap();
        assert_eq!(icp.industry, vec!["Software", "FinTech"]);
        assert_eq!(icp.keywords, vec!["data engineer"]);
        assert_eq!(icp.signals.tech_stack, vec!["AWS", "Python"]);
    }

    #[test]
    fn icp_loads_from_yaml_file_by_extension() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("icp.yaml");
        fs::write(
            &path,
            "industry: [Software]\nkeywords: [ml]\nsignals:\n  tech_stack: [Snowflake]\n",
        )
        .unwrap();
        let icp = Icp::load(&path).unwrap();
        assert_eq!(icp.signals.tech_stack, vec!["Snowflake"]);
    }

    #[test]
    fn icp_missing_tech_stack_is_a_configuration_error() {
        let err = Icp::from_json_str(r#"{"industry": [], "keywords": [], "signals": {}}"#).unwrap_err();
        assert!(matches!(err, IcpError::MissingField("signals.tech_stack")));

        let err = Icp::from_json_str(r#"{"keywords": [], "signals": {"tech_stack": []}}"#).unwrap_err();
        assert!(matches!(err, IcpError::MissingField("industry")));
    }

    #[test]
    fn icp_with_unknown_extension_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("icp.toml");
        fs::write(&path, "industry = []").unwrap();
        assert!(matches!(
            Icp::load(&path).unwrap_err(),
            IcpError::UnsupportedFormat { .. }
        ));
    }

    #[test]
    fn keyed_record_is_a_copy_without_confidence() {
        let raw: RawCompanyRecord = serde_json::from_str(
            r#"{"company_name": "DataIQ Inc", "domain": "dataiq.com",
                "signals": {"new_funding": true}, "source": ["Apollo"]}"#,
        )
        .unwrap();
        let keyed = raw.to_keyed().unwrap();
        assert_eq!(keyed.domain, "dataiq.com");
        assert!(keyed.signal(SIGNAL_NEW_FUNDING));
        assert!(!keyed.signal(SIGNAL_RECENT_HIRING));
        assert_eq!(keyed.confidence, None);

        let no_domain = RawCompanyRecord {
            company_name: "Anon".into(),
            ..Default::default()
        };
        assert!(no_domain.to_keyed().is_none());
    }

    #[test]
    fn serialized_record_omits_absent_fields_and_keeps_shape() {
        let raw = RawCompanyRecord {
            company_name: "AutoAI Corp".into(),
            domain: Some("autoai.com".into()),
            funding_stage: Some("Seed".into()),
            source: BTreeSet::from(["Crunchbase".to_string()]),
            ..Default::default()
        };
        let mut record = raw.to_keyed().unwrap();
        let value = serde_json::to_value(&record).unwrap();
        let obj = value.as_object().unwrap();
        assert!(!obj.contains_key("revenue"));
        assert!(!obj.contains_key("contacts"));
        assert!(!obj.contains_key("confidence"));
        assert_eq!(obj["funding_stage"], "Seed");
        assert_eq!(obj["source"], serde_json::json!(["Crunchbase"]));

        record.confidence = Some(0.1);
        let text = serde_json::to_string(&record).unwrap();
        assert!(text.ends_with(r#""confidence":0.1}"#));
        let back: CompanyRecord = serde_json::from_str(&text).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn source_kind_orders_company_funding_jobs() {
        let mut kinds = vec![
            SourceKind::JobPostings,
            SourceKind::CompanyDatabase,
            SourceKind::FundingDatabase,
        ];
        kinds.sort();
        assert_eq!(
            kinds,
            vec![
                SourceKind::CompanyDatabase,
                SourceKind::FundingDatabase,
                SourceKind::JobPostings
            ]
        );
        let kind: SourceKind = serde_json::from_str(r#""job_postings""#).unwrap();
        assert_eq!(kind, SourceKind::JobPostings);
    }
}
