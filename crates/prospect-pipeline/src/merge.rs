//! Domain-keyed reconciliation of company records from several sources.
//!
//! Records are folded in source order, then record order. The first record
//! seen for a domain seeds the merged entry; later records only contribute
//! `signals` (key-wise overwrite), `source` (union) and `funding_stage`
//! (last non-absent value wins). Every other field keeps its first value.

use std::collections::HashMap;

use prospect_core::{CompanyRecord, RawCompanyRecord};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MergeError {
    #[error("record {record_index} of source {source_index} ({company_name:?}) has no domain")]
    MissingDomain {
        source_index: usize,
        record_index: usize,
        company_name: String,
    },
}

#[derive(Debug, Default)]
pub struct RecordMerger {
    index: HashMap<String, usize>,
    merged: Vec<CompanyRecord>,
    sources_absorbed: usize,
    empty_domain_collisions: usize,
}

impl RecordMerger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one source's records into the merged set.
    ///
    /// The batch is validated before anything is folded, so a rejected
    /// source leaves the merger unchanged.
    pub fn absorb(&mut self, records: &[RawCompanyRecord]) -> Result<(), MergeError> {
        let source_index = self.sources_absorbed;
        if let Some((record_index, record)) = records
            .iter()
            .enumerate()
            .find(|(_, r)| r.domain.is_none())
        {
            return Err(MergeError::MissingDomain {
                source_index,
                record_index,
                company_name: record.company_name.clone(),
            });
        }

        for record in records {
            self.absorb_one(record);
        }
        self.sources_absorbed += 1;
        Ok(())
    }

    fn absorb_one(&mut self, record: &RawCompanyRecord) {
        let Some(incoming) = record.to_keyed() else {
            return;
        };

        match self.index.get(&incoming.domain) {
            Some(&slot) => {
                if incoming.domain.is_empty() {
                    self.empty_domain_collisions += 1;
                }
                let merged = &mut self.merged[slot];
                merged.signals.extend(incoming.signals);
                merged.source.extend(incoming.source);
                if incoming.funding_stage.is_some() {
                    merged.funding_stage = incoming.funding_stage;
                }
            }
            None => {
                self.index.insert(incoming.domain.clone(), self.merged.len());
                self.merged.push(incoming);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.merged.len()
    }

    pub fn is_empty(&self) -> bool {
        self.merged.is_empty()
    }

    /// Number of records folded into an existing empty-domain entry.
    pub fn empty_domain_collisions(&self) -> usize {
        self.empty_domain_collisions
    }

    /// Merged records in first-seen order.
    pub fn finish(self) -> Vec<CompanyRecord> {
        self.merged
    }
}

/// Merge whole sources in the given order. Fails without partial output.
pub fn merge_results(sources: &[Vec<RawCompanyRecord>]) -> Result<Vec<CompanyRecord>, MergeError> {
    let mut merger = RecordMerger::new();
    for records in sources {
        merger.absorb(records)?;
    }
    Ok(merger.finish())
}
