use sqlx::{Postgres, QueryBuilder};

use cohort_domain::{ClinicalRecord, CompiledFilter, RecordCategory};

use crate::{
	Result,
	db::Db,
	models::{
		AllergyIntoleranceRow, CarePlanRow, ConditionRow, ImmunizationRow, ObservationRow,
		PatientRow, ProcedureRow, SearchRow,
	},
};

const PATIENT_COLUMNS: &str = "\
p.patient_id, p.full_name, p.gender, p.birthdate, p.deceased, p.deceased_at, p.description, \
p.phone, p.email, p.address, p.city, p.state, p.country";

/// The single ranked hybrid retrieval: cosine similarity against the stored
/// description embeddings, restricted to the compiled predicate, capped.
///
/// Without a query vector (browse mode) every row scores 0 and the order
/// falls back to the identifier. With one, equal scores tie-break by
/// ascending identifier so an unchanged store always returns an identical
/// list.
pub async fn search_patients(
	db: &Db,
	query_vector: Option<&[f32]>,
	filter: &CompiledFilter,
	limit: i64,
) -> Result<Vec<SearchRow>> {
	let mut query = build_search_query(query_vector, filter, limit);
	let rows = query.build_query_as::<SearchRow>().fetch_all(&db.pool).await?;

	Ok(rows)
}

pub async fn fetch_patient(db: &Db, patient_id: &str) -> Result<Option<PatientRow>> {
	let sql = format!("SELECT {PATIENT_COLUMNS} FROM patients p WHERE p.patient_id = $1");
	let row = sqlx::query_as::<_, PatientRow>(&sql).bind(patient_id).fetch_optional(&db.pool).await?;

	Ok(row)
}

/// Fetch one category's records for a patient, most recent first, capped at
/// `limit`. One routine covers all six categories; only the column list and
/// table name vary.
pub async fn fetch_records(
	db: &Db,
	patient_id: &str,
	category: RecordCategory,
	limit: i64,
) -> Result<Vec<ClinicalRecord>> {
	let records = match category {
		RecordCategory::Allergies =>
			fetch_category::<AllergyIntoleranceRow>(
				db,
				"SELECT code, category, criticality, clinical_status, verification_status, \
				 recorded_at FROM allergy_intolerances",
				patient_id,
				limit,
			)
			.await?,
		RecordCategory::Immunizations =>
			fetch_category::<ImmunizationRow>(
				db,
				"SELECT vaccine_code, status, recorded_at FROM immunizations",
				patient_id,
				limit,
			)
			.await?,
		RecordCategory::Observations =>
			fetch_category::<ObservationRow>(
				db,
				"SELECT code, value, unit, recorded_at FROM observations",
				patient_id,
				limit,
			)
			.await?,
		RecordCategory::Conditions =>
			fetch_category::<ConditionRow>(
				db,
				"SELECT code, clinical_status, verification_status, onset, recorded_at \
				 FROM conditions",
				patient_id,
				limit,
			)
			.await?,
		RecordCategory::Procedures =>
			fetch_category::<ProcedureRow>(
				db,
				"SELECT code, recorded_at FROM procedures",
				patient_id,
				limit,
			)
			.await?,
		RecordCategory::CarePlans =>
			fetch_category::<CarePlanRow>(
				db,
				"SELECT category, status, activities, period_start, period_end, recorded_at \
				 FROM care_plans",
				patient_id,
				limit,
			)
			.await?,
	};

	Ok(records)
}

async fn fetch_category<R>(
	db: &Db,
	select: &str,
	patient_id: &str,
	limit: i64,
) -> Result<Vec<ClinicalRecord>>
where
	R: for<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> + Into<ClinicalRecord> + Send + Unpin,
{
	let sql = format!("{select} WHERE patient_id = $1 ORDER BY recorded_at DESC LIMIT $2");
	let rows = sqlx::query_as::<_, R>(&sql)
		.bind(patient_id)
		.bind(limit)
		.fetch_all(&db.pool)
		.await?;

	Ok(rows.into_iter().map(Into::into).collect())
}

fn build_search_query(
	query_vector: Option<&[f32]>,
	filter: &CompiledFilter,
	limit: i64,
) -> QueryBuilder<'static, Postgres> {
	let mut query = QueryBuilder::new(format!("SELECT {PATIENT_COLUMNS}, "));

	match query_vector {
		Some(vector) => {
			query.push("(1 - (p.description_vec <=> ");
			query.push_bind(vector_to_pg(vector));
			query.push("::vector))::real AS similarity");
		},
		None => {
			query.push("0::real AS similarity");
		},
	}

	query.push(" FROM patients p WHERE 1 = 1");

	if let Some(gender) = filter.gender {
		query.push(" AND p.gender = ");
		query.push_bind(gender.as_str());
	}
	if let Some(deceased) = filter.deceased {
		query.push(" AND p.deceased = ");
		query.push_bind(deceased);
	}
	if let Some(born) = filter.born {
		query.push(" AND p.birthdate BETWEEN ");
		query.push_bind(born.earliest);
		query.push(" AND ");
		query.push_bind(born.latest);
	}
	if let Some(age) = filter.age_at_death {
		// Age at the recorded death date, computed per row; rows missing
		// either date never match.
		query.push(" AND p.deceased_at >= p.birthdate + make_interval(years => ");
		query.push_bind(i32::from(age.min));
		query.push(") AND p.deceased_at < p.birthdate + make_interval(years => ");
		query.push_bind(i32::from(age.max) + 1);
		query.push(")");
	}

	if query_vector.is_some() {
		query.push(" ORDER BY similarity DESC, p.patient_id ASC");
	} else {
		query.push(" ORDER BY p.patient_id ASC");
	}

	query.push(" LIMIT ");
	query.push_bind(limit);

	query
}

/// Render a vector as pgvector text (`[v1,v2,…]`) for a text-to-vector
/// cast bind.
pub fn vector_to_pg(vec: &[f32]) -> String {
	let mut out = String::with_capacity(vec.len() * 8);

	out.push('[');

	for (i, value) in vec.iter().enumerate() {
		if i > 0 {
			out.push(',');
		}

		out.push_str(&value.to_string());
	}

	out.push(']');

	out
}
