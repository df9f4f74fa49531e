use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::{
	patient::Patient,
	record::{ClinicalRecord, RecordCategory},
};

/// One category's slice of the evidence bundle. `records` is most-recent
/// first; `error` carries a category-level fetch failure so callers can
/// tell "no data" from "failed to retrieve".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryEvidence {
	pub category: RecordCategory,
	pub records: Vec<ClinicalRecord>,
	pub error: Option<String>,
}
impl CategoryEvidence {
	pub fn empty(category: RecordCategory) -> Self {
		Self { category, records: Vec::new(), error: None }
	}

	pub fn failed(category: RecordCategory, error: String) -> Self {
		Self { category, records: Vec::new(), error: Some(error) }
	}
}

/// The per-patient, per-category, capped and deduplicated record set
/// assembled for summarization. Built fresh per request and discarded
/// afterwards; every category is always present, in clinical-importance
/// order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceBundle {
	pub patient: Patient,
	pub categories: Vec<CategoryEvidence>,
}
impl EvidenceBundle {
	pub fn category(&self, category: RecordCategory) -> Option<&CategoryEvidence> {
		self.categories.iter().find(|slice| slice.category == category)
	}

	pub fn total_records(&self) -> usize {
		self.categories.iter().map(|slice| slice.records.len()).sum()
	}
}

/// Coalesce records carrying an identical (category, payload, timestamp)
/// tuple, keeping first occurrences and input order. Guards against
/// duplicate ingestion.
pub fn dedup_records(records: Vec<ClinicalRecord>) -> Vec<ClinicalRecord> {
	let mut seen = HashSet::new();

	records.into_iter().filter(|record| seen.insert((record.recorded_at, record.detail.clone()))).collect()
}
