use cohort_domain::{CategoryEvidence, EvidenceBundle, RecordCategory, dedup_records};
use cohort_storage::queries;

use crate::{Error, Result, Service};

impl Service {
	/// Assemble the evidence bundle for one patient: every category, capped
	/// at `records.max_per_category`, most recent first, duplicates
	/// coalesced.
	///
	/// Category fetches are isolated: a failure in one is recorded on that
	/// category's `error` flag and the rest still load, since a partial
	/// clinical picture remains useful. Only a missing patient aborts the
	/// whole aggregation.
	pub async fn patient_records(&self, patient_id: &str) -> Result<EvidenceBundle> {
		let Some(row) = queries::fetch_patient(&self.db, patient_id).await? else {
			return Err(Error::PatientNotFound { patient_id: patient_id.to_string() });
		};
		let cap = i64::from(self.cfg.records.max_per_category);
		let mut categories = Vec::with_capacity(RecordCategory::ALL.len());

		for category in RecordCategory::ALL {
			match queries::fetch_records(&self.db, patient_id, category, cap).await {
				Ok(records) => categories.push(CategoryEvidence {
					category,
					records: dedup_records(records),
					error: None,
				}),
				Err(err) => {
					tracing::warn!(
						patient_id,
						category = category.as_str(),
						%err,
						"Category fetch failed; continuing with partial evidence."
					);
					categories.push(CategoryEvidence::failed(category, err.to_string()));
				},
			}
		}

		Ok(EvidenceBundle { patient: row.into(), categories })
	}
}
