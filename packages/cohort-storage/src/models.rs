use time::{Date, OffsetDateTime};

use cohort_domain::{ClinicalRecord, Gender, Patient, RecordDetail};

#[derive(Debug, sqlx::FromRow)]
pub struct PatientRow {
	pub patient_id: String,
	pub full_name: String,
	pub gender: String,
	pub birthdate: Option<Date>,
	pub deceased: bool,
	pub deceased_at: Option<OffsetDateTime>,
	pub description: String,
	pub phone: Option<String>,
	pub email: Option<String>,
	pub address: Option<String>,
	pub city: Option<String>,
	pub state: Option<String>,
	pub country: Option<String>,
}
impl From<PatientRow> for Patient {
	fn from(row: PatientRow) -> Self {
		Self {
			patient_id: row.patient_id,
			full_name: row.full_name,
			// Ingestion normalizes gender, but stored data predating the
			// current value set maps to unknown rather than failing reads.
			gender: Gender::parse(&row.gender).unwrap_or(Gender::Unknown),
			birthdate: row.birthdate,
			deceased: row.deceased,
			deceased_at: row.deceased_at,
			description: row.description,
			phone: row.phone,
			email: row.email,
			address: row.address,
			city: row.city,
			state: row.state,
			country: row.country,
		}
	}
}

#[derive(Debug, sqlx::FromRow)]
pub struct SearchRow {
	#[sqlx(flatten)]
	pub patient: PatientRow,
	pub similarity: f32,
}

#[derive(Debug, sqlx::FromRow)]
pub struct AllergyIntoleranceRow {
	pub code: String,
	pub category: Option<String>,
	pub criticality: Option<String>,
	pub clinical_status: Option<String>,
	pub verification_status: Option<String>,
	pub recorded_at: OffsetDateTime,
}
impl From<AllergyIntoleranceRow> for ClinicalRecord {
	fn from(row: AllergyIntoleranceRow) -> Self {
		Self {
			recorded_at: row.recorded_at,
			detail: RecordDetail::AllergyIntolerance {
				code: row.code,
				category: row.category,
				criticality: row.criticality,
				clinical_status: row.clinical_status,
				verification_status: row.verification_status,
			},
		}
	}
}

#[derive(Debug, sqlx::FromRow)]
pub struct ImmunizationRow {
	pub vaccine_code: String,
	pub status: Option<String>,
	pub recorded_at: OffsetDateTime,
}
impl From<ImmunizationRow> for ClinicalRecord {
	fn from(row: ImmunizationRow) -> Self {
		Self {
			recorded_at: row.recorded_at,
			detail: RecordDetail::Immunization { vaccine_code: row.vaccine_code, status: row.status },
		}
	}
}

#[derive(Debug, sqlx::FromRow)]
pub struct ObservationRow {
	pub code: String,
	pub value: Option<String>,
	pub unit: Option<String>,
	pub recorded_at: OffsetDateTime,
}
impl From<ObservationRow> for ClinicalRecord {
	fn from(row: ObservationRow) -> Self {
		Self {
			recorded_at: row.recorded_at,
			detail: RecordDetail::Observation { code: row.code, value: row.value, unit: row.unit },
		}
	}
}

#[derive(Debug, sqlx::FromRow)]
pub struct ConditionRow {
	pub code: String,
	pub clinical_status: Option<String>,
	pub verification_status: Option<String>,
	pub onset: Option<Date>,
	pub recorded_at: OffsetDateTime,
}
impl From<ConditionRow> for ClinicalRecord {
	fn from(row: ConditionRow) -> Self {
		Self {
			recorded_at: row.recorded_at,
			detail: RecordDetail::Condition {
				code: row.code,
				clinical_status: row.clinical_status,
				verification_status: row.verification_status,
				onset: row.onset,
			},
		}
	}
}

#[derive(Debug, sqlx::FromRow)]
pub struct ProcedureRow {
	pub code: String,
	pub recorded_at: OffsetDateTime,
}
impl From<ProcedureRow> for ClinicalRecord {
	fn from(row: ProcedureRow) -> Self {
		Self { recorded_at: row.recorded_at, detail: RecordDetail::Procedure { code: row.code } }
	}
}

#[derive(Debug, sqlx::FromRow)]
pub struct CarePlanRow {
	pub category: Option<String>,
	pub status: Option<String>,
	pub activities: Option<String>,
	pub period_start: Option<OffsetDateTime>,
	pub period_end: Option<OffsetDateTime>,
	pub recorded_at: OffsetDateTime,
}
impl From<CarePlanRow> for ClinicalRecord {
	fn from(row: CarePlanRow) -> Self {
		Self {
			recorded_at: row.recorded_at,
			detail: RecordDetail::CarePlan {
				category: row.category,
				status: row.status,
				activities: row.activities,
				period_start: row.period_start,
				period_end: row.period_end,
			},
		}
	}
}
