use time::{Date, OffsetDateTime};

use cohort_config::{GenerationProviderConfig, Narrative};
use cohort_domain::{ClinicalRecord, EvidenceBundle, RecordCategory, RecordDetail};

use crate::{Error, GenerationFailure, Result, Service};

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct HistoryRequest {
	#[serde(default)]
	pub model: Option<String>,
}

/// How many records of a category made it into the submitted prompt after
/// budget fitting.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CategoryCount {
	pub category: RecordCategory,
	pub records: usize,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct HistoryResponse {
	pub model: String,
	pub narrative: String,
	pub included: Vec<CategoryCount>,
}

impl Service {
	/// Generate a narrative history: bundle the evidence, serialize it into
	/// a budgeted prompt, submit to the generation backend, and return the
	/// produced text verbatim.
	///
	/// A backend failure reports its cause and is never retried here; the
	/// evidence bundle already shown to the caller stays valid.
	pub async fn generate_history(
		&self,
		patient_id: &str,
		req: HistoryRequest,
	) -> Result<HistoryResponse> {
		let model = resolve_model(req.model, &self.cfg.providers.generation)?;
		let bundle = self.patient_records(patient_id).await?;
		let today = OffsetDateTime::now_utc().date();
		let (prompt, included) = build_prompt(&self.cfg.narrative, &bundle, today);

		tracing::info!(
			patient_id,
			%model,
			prompt_chars = prompt.len(),
			records = included.iter().map(|count| count.records).sum::<usize>(),
			"Submitting narrative generation."
		);

		let narrative = self
			.providers
			.generation
			.generate(&self.cfg.providers.generation, &model, &prompt)
			.await
			.map_err(generation_error)?;

		Ok(HistoryResponse { model, narrative, included })
	}
}

fn resolve_model(requested: Option<String>, cfg: &GenerationProviderConfig) -> Result<String> {
	match requested {
		None => cfg.models.first().cloned().ok_or_else(|| Error::InvalidRequest {
			message: "No generation models are configured.".to_string(),
		}),
		Some(model) =>
			if cfg.models.iter().any(|known| known == &model) {
				Ok(model)
			} else {
				Err(Error::InvalidRequest { message: format!("Unrecognized model {model:?}.") })
			},
	}
}

fn generation_error(err: cohort_providers::Error) -> Error {
	let cause = if err.is_timeout() {
		GenerationFailure::Timeout
	} else if err.status().is_some() {
		GenerationFailure::Status
	} else if matches!(err, cohort_providers::Error::InvalidResponse { .. }) {
		GenerationFailure::MalformedResponse
	} else {
		GenerationFailure::Unreachable
	};

	Error::GenerationBackend { cause, message: err.to_string() }
}

struct Section {
	category: RecordCategory,
	/// Rendered record lines, most recent first.
	lines: Vec<String>,
	failed: bool,
}

/// Serialize the bundle into a bounded prompt. Categories are truncated
/// independently when the budget is exceeded: the oldest record of the
/// least important category still holding records is dropped first, so
/// conditions only ever shrink after every lower-priority category is
/// already empty.
pub(crate) fn build_prompt(
	cfg: &Narrative,
	bundle: &EvidenceBundle,
	today: Date,
) -> (String, Vec<CategoryCount>) {
	let instruction = cfg
		.instruction
		.replace("{patient_id}", &bundle.patient.patient_id)
		.replace("{total_records}", &bundle.total_records().to_string());
	let fixed = format!("{}\n\n{}", instruction.trim(), demographics_block(bundle, today));
	let mut sections: Vec<Section> = bundle
		.categories
		.iter()
		.map(|slice| Section {
			category: slice.category,
			lines: slice.records.iter().map(record_line).collect(),
			failed: slice.error.is_some(),
		})
		.collect();

	fit_to_budget(&mut sections, &fixed, cfg.max_prompt_chars as usize);

	let included = sections
		.iter()
		.map(|section| CategoryCount { category: section.category, records: section.lines.len() })
		.collect();

	(render(&fixed, &sections), included)
}

fn fit_to_budget(sections: &mut [Section], fixed: &str, budget: usize) {
	while render(fixed, sections).len() > budget {
		let Some(section) = sections.iter_mut().rev().find(|section| !section.lines.is_empty())
		else {
			break;
		};

		section.lines.pop();
	}
}

fn render(fixed: &str, sections: &[Section]) -> String {
	let mut out = String::from(fixed);

	for section in sections {
		out.push_str("\n\n### ");
		out.push_str(section.category.title());
		out.push('\n');

		if section.failed {
			out.push_str("Records unavailable for this category\n");
		} else if section.lines.is_empty() {
			out.push_str("No records found\n");
		} else {
			for line in &section.lines {
				out.push_str(line);
				out.push('\n');
			}
		}
	}

	out
}

fn demographics_block(bundle: &EvidenceBundle, today: Date) -> String {
	let patient = &bundle.patient;
	let mut out = String::from("### Patient\n");

	out.push_str(&format!("name: {}\n", patient.full_name));
	out.push_str(&format!("gender: {}\n", patient.gender.as_str()));

	if let Some(birthdate) = patient.birthdate {
		out.push_str(&format!("birthdate: {birthdate}\n"));
	}
	if let Some(age) = patient.age_years(today) {
		out.push_str(&format!("age: {age}\n"));
	}
	if patient.deceased {
		match patient.deceased_at {
			Some(at) => out.push_str(&format!("deceased: yes ({})\n", at.date())),
			None => out.push_str("deceased: yes\n"),
		}
	}

	let location: Vec<&str> = [patient.city.as_deref(), patient.state.as_deref(), patient.country.as_deref()]
		.into_iter()
		.flatten()
		.collect();

	if !location.is_empty() {
		out.push_str(&format!("location: {}\n", location.join(", ")));
	}

	out
}

fn record_line(record: &ClinicalRecord) -> String {
	let date = record.recorded_at.date();

	match &record.detail {
		RecordDetail::AllergyIntolerance { code, criticality, clinical_status, .. } => {
			let mut line = format!("- {date}: {code}");

			if let Some(criticality) = criticality {
				line.push_str(&format!(" (criticality {criticality})"));
			}
			if let Some(status) = clinical_status {
				line.push_str(&format!(" [{status}]"));
			}

			line
		},
		RecordDetail::Immunization { vaccine_code, status } => {
			let mut line = format!("- {date}: {vaccine_code}");

			if let Some(status) = status {
				line.push_str(&format!(" [{status}]"));
			}

			line
		},
		RecordDetail::Observation { code, value, unit } => {
			let mut line = format!("- {date}: {code}");

			if let Some(value) = value {
				line.push_str(&format!(" = {value}"));

				if let Some(unit) = unit {
					line.push_str(&format!(" {unit}"));
				}
			}

			line
		},
		RecordDetail::Condition { code, clinical_status, onset, .. } => {
			let mut line = format!("- {date}: {code}");

			if let Some(status) = clinical_status {
				line.push_str(&format!(" [{status}]"));
			}
			if let Some(onset) = onset {
				line.push_str(&format!(", onset {onset}"));
			}

			line
		},
		RecordDetail::Procedure { code } => format!("- {date}: {code}"),
		RecordDetail::CarePlan { category, status, activities, .. } => {
			let mut line = format!("- {date}: {}", category.as_deref().unwrap_or("care plan"));

			if let Some(status) = status {
				line.push_str(&format!(" [{status}]"));
			}
			if let Some(activities) = activities {
				line.push_str(&format!(", activities: {activities}"));
			}

			line
		},
	}
}
