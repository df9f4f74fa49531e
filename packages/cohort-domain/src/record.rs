use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime};

/// The six clinical record categories, in fixed clinical-importance order.
/// The order drives both bundle layout and narrative truncation: the last
/// entries lose records first when a prompt budget is split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordCategory {
	Conditions,
	Observations,
	Procedures,
	Allergies,
	Immunizations,
	CarePlans,
}
impl RecordCategory {
	pub const ALL: [Self; 6] = [
		Self::Conditions,
		Self::Observations,
		Self::Procedures,
		Self::Allergies,
		Self::Immunizations,
		Self::CarePlans,
	];

	pub fn as_str(&self) -> &'static str {
		match self {
			Self::Conditions => "conditions",
			Self::Observations => "observations",
			Self::Procedures => "procedures",
			Self::Allergies => "allergies",
			Self::Immunizations => "immunizations",
			Self::CarePlans => "care_plans",
		}
	}

	pub fn title(&self) -> &'static str {
		match self {
			Self::Conditions => "Conditions",
			Self::Observations => "Observations",
			Self::Procedures => "Procedures",
			Self::Allergies => "Allergies",
			Self::Immunizations => "Immunizations",
			Self::CarePlans => "Care Plans",
		}
	}
}

/// One clinical record referencing exactly one patient. Records are
/// independently persisted; the patient does not own them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClinicalRecord {
	#[serde(with = "crate::time_serde")]
	pub recorded_at: OffsetDateTime,
	#[serde(flatten)]
	pub detail: RecordDetail,
}
impl ClinicalRecord {
	pub fn category(&self) -> RecordCategory {
		self.detail.category()
	}
}

/// Category-specific payloads. Payload fields follow the relational store's
/// per-category columns; `recorded_at` lives on [`ClinicalRecord`] so every
/// category orders by recency the same way.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecordDetail {
	AllergyIntolerance {
		code: String,
		category: Option<String>,
		criticality: Option<String>,
		clinical_status: Option<String>,
		verification_status: Option<String>,
	},
	Immunization {
		vaccine_code: String,
		status: Option<String>,
	},
	Observation {
		code: String,
		value: Option<String>,
		unit: Option<String>,
	},
	Condition {
		code: String,
		clinical_status: Option<String>,
		verification_status: Option<String>,
		onset: Option<Date>,
	},
	Procedure {
		code: String,
	},
	CarePlan {
		category: Option<String>,
		status: Option<String>,
		activities: Option<String>,
		#[serde(default, with = "crate::time_serde::option")]
		period_start: Option<OffsetDateTime>,
		#[serde(default, with = "crate::time_serde::option")]
		period_end: Option<OffsetDateTime>,
	},
}
impl RecordDetail {
	pub fn category(&self) -> RecordCategory {
		match self {
			Self::AllergyIntolerance { .. } => RecordCategory::Allergies,
			Self::Immunization { .. } => RecordCategory::Immunizations,
			Self::Observation { .. } => RecordCategory::Observations,
			Self::Condition { .. } => RecordCategory::Conditions,
			Self::Procedure { .. } => RecordCategory::Procedures,
			Self::CarePlan { .. } => RecordCategory::CarePlans,
		}
	}
}
