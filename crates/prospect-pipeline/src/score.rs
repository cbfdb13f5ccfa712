//! ICP fit scoring: weighted sum of four binary indicators, rounded to 2 dp.

use prospect_core::{CompanyRecord, Icp, SIGNAL_NEW_FUNDING, SIGNAL_RECENT_HIRING};
use serde::Serialize;

pub const INDUSTRY_WEIGHT: f64 = 0.4;
pub const FUNDING_WEIGHT: f64 = 0.3;
pub const HIRING_WEIGHT: f64 = 0.2;
pub const TECH_WEIGHT: f64 = 0.1;

/// Keywords looked up in the ICP tech stack for `tech_match`.
pub const TECH_KEYWORDS: [&str; 2] = ["AWS", "Snowflake"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FitIndicators {
    pub industry_match: bool,
    pub funding_signal: bool,
    pub hiring_signal: bool,
    pub tech_match: bool,
}

impl FitIndicators {
    pub fn evaluate(record: &CompanyRecord, icp: &Icp) -> Self {
        Self {
            industry_match: industry_matches(record.industry.as_deref().unwrap_or_default(), icp),
            funding_signal: record.signal(SIGNAL_NEW_FUNDING),
            hiring_signal: record.signal(SIGNAL_RECENT_HIRING),
            tech_match: tech_stack_matches(icp),
        }
    }

    pub fn score(&self) -> f64 {
        let weighted = [
            (self.industry_match, INDUSTRY_WEIGHT),
            (self.funding_signal, FUNDING_WEIGHT),
            (self.hiring_signal, HIRING_WEIGHT),
            (self.tech_match, TECH_WEIGHT),
        ]
        .iter()
        .filter(|(hit, _)| *hit)
        .map(|(_, weight)| weight)
        .sum::<f64>();
        round_2dp(weighted)
    }
}

fn industry_matches(industry: &str, icp: &Icp) -> bool {
    let industry = industry.to_lowercase();
    icp.industry
        .iter()
        .any(|wanted| industry.contains(&wanted.to_lowercase()))
}

// Reads only the ICP, so the result is identical for every company in a run.
fn tech_stack_matches(icp: &Icp) -> bool {
    let stack = icp.signals.tech_stack.join(" ");
    TECH_KEYWORDS.iter().any(|keyword| stack.contains(keyword))
}

fn round_2dp(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub fn compute_confidence(record: &CompanyRecord, icp: &Icp) -> f64 {
    FitIndicators::evaluate(record, icp).score()
}

/// Set `confidence` on every record, replacing any earlier score.
pub fn score_records(records: &mut [CompanyRecord], icp: &Icp) {
    for record in records {
        record.confidence = Some(compute_confidence(record, icp));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prospect_core::IcpSignals;
    use std::collections::{BTreeMap, BTreeSet};

    fn icp(industry: &[&str], tech_stack: &[&str]) -> Icp {
        Icp {
            industry: industry.iter().map(|s| s.to_string()).collect(),
            keywords: vec![],
            signals: IcpSignals {
                tech_stack: tech_stack.iter().map(|s| s.to_string()).collect(),
            },
        }
    }

    fn company(industry: Option<&str>, signals: &[(&str, bool)]) -> CompanyRecord {
        CompanyRecord {
            company_name: "Test Co".into(),
            domain: "test.co".into(),
            revenue: None,
            employee_count: None,
            industry: industry.map(str::to_string),
            contacts: None,
            funding_stage: None,
            signals: signals
                .iter()
                .map(|(k, v)| (k.to_string(), *v))
                .collect::<BTreeMap<_, _>>(),
            source: BTreeSet::new(),
            confidence: None,
        }
    }

    #[test]
    fn weights_sum_to_one() {
        let total = INDUSTRY_WEIGHT + FUNDING_WEIGHT + HIRING_WEIGHT + TECH_WEIGHT;
        assert!((total - 1.0).abs() < 1e-12);
    }

    #[test]
    fn enterprise_software_with_funding_scores_point_eight() {
        let icp = icp(&["Software"], &["AWS"]);
        let record = company(
            Some("Enterprise Software"),
            &[(SIGNAL_NEW_FUNDING, true), (SIGNAL_RECENT_HIRING, false)],
        );
        assert_eq!(compute_confidence(&record, &icp), 0.8);
    }

    #[test]
    fn all_indicators_give_exactly_one() {
        let icp = icp(&["fintech"], &["Snowflake", "dbt"]);
        let record = company(
            Some("FinTech"),
            &[(SIGNAL_NEW_FUNDING, true), (SIGNAL_RECENT_HIRING, true)],
        );
        assert_eq!(compute_confidence(&record, &icp), 1.0);
    }

    #[test]
    fn missing_fields_degrade_to_no_match() {
        let icp = icp(&["Software"], &["Postgres"]);
        let record = company(None, &[]);
        assert_eq!(FitIndicators::evaluate(&record, &icp), FitIndicators {
            industry_match: false,
            funding_signal: false,
            hiring_signal: false,
            tech_match: false,
        });
        assert_eq!(compute_confidence(&record, &icp), 0.0);
    }

    #[test]
    fn hiring_plus_tech_rounds_to_point_three() {
        let icp = icp(&["Software"], &["AWS"]);
        let record = company(Some("Retail"), &[(SIGNAL_RECENT_HIRING, true)]);
        assert_eq!(compute_confidence(&record, &icp), 0.3);
    }

    #[test]
    fn tech_match_is_case_sensitive_substring_of_joined_stack() {
        assert!(tech_stack_matches(&icp(&[], &["Amazon AWS Lambda"])));
        assert!(!tech_stack_matches(&icp(&[], &["aws", "snowflake"])));
        assert!(!tech_stack_matches(&icp(&[], &[])));
    }

    #[test]
    fn every_score_is_a_rounded_subset_sum() {
        let icp_hit = icp(&["Software"], &["AWS"]);
        let icp_miss = icp(&["Software"], &[]);
        let mut seen = BTreeSet::new();
        for icp in [&icp_hit, &icp_miss] {
            for industry in [Some("Software"), None] {
                for funding in [true, false] {
                    for hiring in [true, false] {
                        let record = company(
                            industry,
                            &[(SIGNAL_NEW_FUNDING, funding), (SIGNAL_RECENT_HIRING, hiring)],
                        );
                        let score = compute_confidence(&record, icp);
                        assert!((0.0..=1.0).contains(&score));
                        assert_eq!(score, round_2dp(score));
                        seen.insert((score * 100.0).round() as i64);
                    }
                }
            }
        }
        assert_eq!(seen.len(), 11);
    }

    #[test]
    fn score_records_sets_confidence_on_each_record() {
        let icp = icp(&["Software"], &["AWS"]);
        let mut records = vec![
            company(Some("Software"), &[]),
            company(None, &[(SIGNAL_NEW_FUNDING, true)]),
        ];
        records[1].confidence = Some(0.99);
        score_records(&mut records, &icp);
        assert_eq!(records[0].confidence, Some(0.5));
        assert_eq!(records[1].confidence, Some(0.4));
    }
}
