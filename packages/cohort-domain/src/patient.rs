use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime};

/// FHIR administrative-gender value set. The enum is the recognized set:
/// anything that does not parse into it is rejected before a query runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
	Male,
	Female,
	Other,
	Unknown,
}
impl Gender {
	pub fn parse(value: &str) -> Option<Self> {
		match value.trim().to_ascii_lowercase().as_str() {
			"male" => Some(Self::Male),
			"female" => Some(Self::Female),
			"other" => Some(Self::Other),
			"unknown" => Some(Self::Unknown),
			_ => None,
		}
	}

	pub fn as_str(&self) -> &'static str {
		match self {
			Self::Male => "male",
			Self::Female => "female",
			Self::Other => "other",
			Self::Unknown => "unknown",
		}
	}
}

/// Patient demographics as stored by the ingestion pipeline. Read-only to
/// this core; the embedding over `description` is produced at ingestion
/// time and immutable afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Patient {
	pub patient_id: String,
	pub full_name: String,
	pub gender: Gender,
	pub birthdate: Option<Date>,
	pub deceased: bool,
	#[serde(default, with = "crate::time_serde::option")]
	pub deceased_at: Option<OffsetDateTime>,
	pub description: String,
	pub phone: Option<String>,
	pub email: Option<String>,
	pub address: Option<String>,
	pub city: Option<String>,
	pub state: Option<String>,
	pub country: Option<String>,
}
impl Patient {
	/// Age in whole years at `today`, measured against the recorded death
	/// date for deceased patients. `None` without a birthdate.
	pub fn age_years(&self, today: Date) -> Option<i32> {
		let birthdate = self.birthdate?;
		let reference = match (self.deceased, self.deceased_at) {
			(true, Some(at)) => at.date(),
			_ => today,
		};
		let mut age = reference.year() - birthdate.year();

		if (reference.month() as u8, reference.day()) < (birthdate.month() as u8, birthdate.day()) {
			age -= 1;
		}

		Some(age)
	}
}
