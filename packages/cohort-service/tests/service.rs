use std::sync::{
	Arc, Mutex,
	atomic::{AtomicUsize, Ordering},
};

use sqlx::postgres::{PgPool, PgPoolOptions};
use time::{Date, Month, OffsetDateTime, macros::datetime};

use cohort_config::{
	Config, EmbeddingProviderConfig, GenerationProviderConfig, Narrative, Postgres, Providers,
	Records, Search, Service as ServiceConfig, Storage,
};
use cohort_domain::{AgeRange, RecordCategory};
use cohort_service::{
	BoxFuture, EmbeddingProvider, Error, FilterSpec, GenerationFailure, GenerationProvider,
	HistoryRequest, SearchRequest, Service,
};
use cohort_storage::db::Db;
use cohort_testkit::TestDatabase;

const VECTOR_DIM: u32 = 4;

fn test_config(dsn: &str) -> Config {
	Config {
		service: ServiceConfig {
			http_bind: "127.0.0.1:0".to_string(),
			log_level: "info".to_string(),
		},
		storage: Storage {
			postgres: Postgres { dsn: dsn.to_string(), pool_max_conns: 4 },
		},
		providers: Providers {
			embedding: EmbeddingProviderConfig {
				api_base: "http://embedding.invalid".to_string(),
				api_key: "test-key".to_string(),
				path: "/v1/embeddings".to_string(),
				model: "test-embedding".to_string(),
				dimensions: VECTOR_DIM,
				timeout_ms: 1_000,
				default_headers: serde_json::Map::new(),
			},
			generation: GenerationProviderConfig {
				api_base: "http://generation.invalid".to_string(),
				api_key: None,
				path: "/api/generate".to_string(),
				models: vec!["test-model".to_string(), "alt-model".to_string()],
				temperature: 0.0,
				timeout_ms: 1_000,
				default_headers: serde_json::Map::new(),
			},
		},
		search: Search { default_limit: 10, max_limit: 50, store_timeout_ms: 5_000 },
		records: Records { max_per_category: 3 },
		narrative: Narrative {
			max_prompt_chars: 10_000,
			instruction: "Summarize patient {patient_id} with {total_records} records."
				.to_string(),
		},
	}
}

struct StubEmbedding {
	vector: Vec<f32>,
	calls: Arc<AtomicUsize>,
}
impl StubEmbedding {
	fn new(vector: Vec<f32>) -> Self {
		Self { vector, calls: Arc::new(AtomicUsize::new(0)) }
	}
}
impl EmbeddingProvider for StubEmbedding {
	fn embed<'a>(
		&'a self,
		_cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, cohort_providers::Result<Vec<Vec<f32>>>> {
		self.calls.fetch_add(1, Ordering::SeqCst);

		let vectors = vec![self.vector.clone(); texts.len()];

		Box::pin(async move { Ok(vectors) })
	}
}

struct FailingEmbedding;
impl EmbeddingProvider for FailingEmbedding {
	fn embed<'a>(
		&'a self,
		_cfg: &'a EmbeddingProviderConfig,
		_texts: &'a [String],
	) -> BoxFuture<'a, cohort_providers::Result<Vec<Vec<f32>>>> {
		Box::pin(async move {
			Err(cohort_providers::Error::InvalidResponse {
				message: "Embedding backend exploded.".to_string(),
			})
		})
	}
}

struct StubGeneration {
	text: String,
	prompts: Arc<Mutex<Vec<String>>>,
}
impl StubGeneration {
	fn new(text: &str) -> Self {
		Self { text: text.to_string(), prompts: Arc::new(Mutex::new(Vec::new())) }
	}

	fn last_prompt(&self) -> Option<String> {
		self.prompts.lock().expect("prompt lock poisoned").last().cloned()
	}
}
impl GenerationProvider for StubGeneration {
	fn generate<'a>(
		&'a self,
		_cfg: &'a GenerationProviderConfig,
		_model: &'a str,
		prompt: &'a str,
	) -> BoxFuture<'a, cohort_providers::Result<String>> {
		self.prompts.lock().expect("prompt lock poisoned").push(prompt.to_string());

		let text = self.text.clone();

		Box::pin(async move { Ok(text) })
	}
}

struct FailingGeneration;
impl GenerationProvider for FailingGeneration {
	fn generate<'a>(
		&'a self,
		_cfg: &'a GenerationProviderConfig,
		_model: &'a str,
		_prompt: &'a str,
	) -> BoxFuture<'a, cohort_providers::Result<String>> {
		Box::pin(async move {
			Err(cohort_providers::Error::InvalidResponse {
				message: "Generation response is missing the response field.".to_string(),
			})
		})
	}
}

fn providers_with(
	embedding: Arc<dyn EmbeddingProvider>,
	generation: Arc<dyn GenerationProvider>,
) -> cohort_service::Providers {
	cohort_service::Providers::new(embedding, generation)
}

/// A service over a lazily-connected pool for tests that must fail before
/// any store access.
fn offline_service(providers: cohort_service::Providers) -> Service {
	let cfg = test_config("postgres://127.0.0.1:1/cohort_offline");
	let pool = PgPoolOptions::new()
		.connect_lazy(&cfg.storage.postgres.dsn)
		.expect("Failed to build lazy pool.");

	Service::with_providers(cfg, Db::from_pool(pool), providers)
}

fn years_ago(years: i32) -> Date {
	let today = OffsetDateTime::now_utc().date();

	Date::from_calendar_date(today.year() - years, Month::January, 1)
		.expect("Failed to build birthdate.")
}

async fn seed_patient(
	pool: &PgPool,
	patient_id: &str,
	full_name: &str,
	gender: &str,
	birthdate: Option<Date>,
	deceased: bool,
	deceased_at: Option<OffsetDateTime>,
	vector: &str,
) {
	sqlx::query(
		"\
INSERT INTO patients (
	patient_id, full_name, gender, birthdate, deceased, deceased_at, description, description_vec
)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8::vector)",
	)
	.bind(patient_id)
	.bind(full_name)
	.bind(gender)
	.bind(birthdate)
	.bind(deceased)
	.bind(deceased_at)
	.bind(format!("Synthetic description for {full_name}."))
	.bind(vector)
	.execute(pool)
	.await
	.expect("Failed to seed patient.");
}

async fn seed_condition(
	pool: &PgPool,
	patient_id: &str,
	code: &str,
	recorded_at: OffsetDateTime,
) {
	sqlx::query(
		"\
INSERT INTO conditions (patient_id, code, clinical_status, recorded_at)
VALUES ($1, $2, 'active', $3)",
	)
	.bind(patient_id)
	.bind(code)
	.bind(recorded_at)
	.execute(pool)
	.await
	.expect("Failed to seed condition.");
}

async fn seed_observation(
	pool: &PgPool,
	patient_id: &str,
	code: &str,
	value: &str,
	recorded_at: OffsetDateTime,
) {
	sqlx::query(
		"\
INSERT INTO observations (patient_id, code, value, unit, recorded_at)
VALUES ($1, $2, $3, 'kg', $4)",
	)
	.bind(patient_id)
	.bind(code)
	.bind(value)
	.bind(recorded_at)
	.execute(pool)
	.await
	.expect("Failed to seed observation.");
}

async fn db_service(
	db: &TestDatabase,
	providers: cohort_service::Providers,
) -> (Service, PgPool) {
	let pool = db.pool_with_schema(VECTOR_DIM).await.expect("Failed to provision schema.");
	let cfg = test_config(db.dsn());
	let service = Service::with_providers(cfg, Db::from_pool(pool.clone()), providers);

	(service, pool)
}

macro_rules! require_dsn {
	() => {
		match cohort_testkit::env_dsn() {
			Some(dsn) => dsn,
			None => {
				eprintln!("Skipping; set COHORT_PG_DSN to run database tests.");

				return;
			},
		}
	};
}

#[tokio::test]
async fn embedding_failure_aborts_the_search() {
	let service =
		providers_then_offline(Arc::new(FailingEmbedding), Arc::new(StubGeneration::new("x")));
	let err = service
		.search(SearchRequest { query: "diabetes".to_string(), filter: None, limit: None })
		.await
		.expect_err("Expected embedding failure.");

	assert!(matches!(err, Error::EmbeddingUnavailable { .. }), "Unexpected error: {err}");
}

fn providers_then_offline(
	embedding: Arc<dyn EmbeddingProvider>,
	generation: Arc<dyn GenerationProvider>,
) -> Service {
	offline_service(providers_with(embedding, generation))
}

#[tokio::test]
async fn wrong_dimension_vector_aborts_the_search() {
	let embedding = Arc::new(StubEmbedding::new(vec![0.1; VECTOR_DIM as usize + 1]));
	let service = providers_then_offline(embedding, Arc::new(StubGeneration::new("x")));
	let err = service
		.search(SearchRequest { query: "diabetes".to_string(), filter: None, limit: None })
		.await
		.expect_err("Expected dimension mismatch.");

	match err {
		Error::EmbeddingUnavailable { message } =>
			assert!(message.contains("dimension mismatch"), "Unexpected message: {message}"),
		err => panic!("Unexpected error: {err}"),
	}
}

#[tokio::test]
async fn unknown_gender_fails_before_any_remote_call() {
	let service = providers_then_offline(
		Arc::new(FailingEmbedding),
		Arc::new(StubGeneration::new("x")),
	);
	let filter = FilterSpec { gender: Some("m".to_string()), ..FilterSpec::default() };
	let err = service
		.search(SearchRequest {
			query: "diabetes".to_string(),
			filter: Some(filter),
			limit: None,
		})
		.await
		.expect_err("Expected invalid filter.");

	assert!(matches!(err, Error::InvalidFilter { .. }), "Unexpected error: {err}");
}

#[tokio::test]
async fn inverted_age_range_fails_before_any_remote_call() {
	let service = providers_then_offline(
		Arc::new(FailingEmbedding),
		Arc::new(StubGeneration::new("x")),
	);
	let filter =
		FilterSpec { age: Some(AgeRange { min: 60, max: 40 }), ..FilterSpec::default() };
	let err = service
		.search(SearchRequest {
			query: "diabetes".to_string(),
			filter: Some(filter),
			limit: None,
		})
		.await
		.expect_err("Expected invalid filter.");

	assert!(matches!(err, Error::InvalidFilter { .. }), "Unexpected error: {err}");
}

#[tokio::test]
async fn limit_above_the_maximum_is_rejected() {
	let embedding = Arc::new(StubEmbedding::new(vec![1.0, 0.0, 0.0, 0.0]));
	let service = providers_then_offline(embedding, Arc::new(StubGeneration::new("x")));
	let err = service
		.search(SearchRequest { query: String::new(), filter: None, limit: Some(51) })
		.await
		.expect_err("Expected limit rejection.");

	assert!(matches!(err, Error::InvalidRequest { .. }), "Unexpected error: {err}");
}

#[tokio::test]
async fn zero_limit_returns_an_empty_result_without_side_effects() {
	let embedding = Arc::new(StubEmbedding::new(vec![1.0, 0.0, 0.0, 0.0]));
	let calls = embedding.calls.clone();
	let service = providers_then_offline(embedding, Arc::new(StubGeneration::new("x")));
	let response = service
		.search(SearchRequest { query: "diabetes".to_string(), filter: None, limit: Some(0) })
		.await
		.expect("search failed");

	assert!(response.items.is_empty());
	assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn unknown_model_is_rejected_before_generation() {
	let service = providers_then_offline(
		Arc::new(StubEmbedding::new(vec![1.0, 0.0, 0.0, 0.0])),
		Arc::new(FailingGeneration),
	);
	let err = service
		.generate_history("p-1", HistoryRequest { model: Some("bogus".to_string()) })
		.await
		.expect_err("Expected unknown model rejection.");

	assert!(matches!(err, Error::InvalidRequest { .. }), "Unexpected error: {err}");
}

#[tokio::test]
async fn hybrid_search_ranks_by_similarity_and_caps_results() {
	let base_dsn = require_dsn!();
	let db = TestDatabase::new(&base_dsn).await.expect("Failed to create test database.");
	let embedding = Arc::new(StubEmbedding::new(vec![1.0, 0.0, 0.0, 0.0]));
	let (service, pool) =
		db_service(&db, providers_with(embedding, Arc::new(StubGeneration::new("x")))).await;

	seed_patient(&pool, "p-1", "Exact Match", "female", Some(years_ago(50)), false, None, "[1,0,0,0]")
		.await;
	seed_patient(&pool, "p-2", "Close Match", "female", Some(years_ago(50)), false, None, "[0.8,0.6,0,0]")
		.await;
	seed_patient(&pool, "p-3", "Far Match", "female", Some(years_ago(50)), false, None, "[0,1,0,0]")
		.await;

	let response = service
		.search(SearchRequest { query: "diabetes".to_string(), filter: None, limit: Some(2) })
		.await
		.expect("search failed");

	assert_eq!(response.items.len(), 2);
	assert_eq!(response.items[0].patient.patient_id, "p-1");
	assert_eq!(response.items[1].patient.patient_id, "p-2");
	assert!(response.items[0].similarity >= response.items[1].similarity);

	db.cleanup().await.expect("cleanup failed");
}

#[tokio::test]
async fn equal_scores_tie_break_by_identifier_and_repeat_identically() {
	let base_dsn = require_dsn!();
	let db = TestDatabase::new(&base_dsn).await.expect("Failed to create test database.");
	let embedding = Arc::new(StubEmbedding::new(vec![1.0, 0.0, 0.0, 0.0]));
	let (service, pool) =
		db_service(&db, providers_with(embedding, Arc::new(StubGeneration::new("x")))).await;

	for patient_id in ["p-b", "p-a", "p-c"] {
		seed_patient(&pool, patient_id, "Twin", "male", Some(years_ago(40)), false, None, "[1,0,0,0]")
			.await;
	}

	let request =
		SearchRequest { query: "diabetes".to_string(), filter: None, limit: Some(10) };
	let first = service.search(request.clone()).await.expect("search failed");
	let second = service.search(request).await.expect("search failed");
	let ids: Vec<&str> =
		first.items.iter().map(|item| item.patient.patient_id.as_str()).collect();

	assert_eq!(ids, ["p-a", "p-b", "p-c"]);
	assert_eq!(
		ids,
		second.items.iter().map(|item| item.patient.patient_id.as_str()).collect::<Vec<_>>()
	);

	db.cleanup().await.expect("cleanup failed");
}

#[tokio::test]
async fn filters_are_sound_and_open_world() {
	let base_dsn = require_dsn!();
	let db = TestDatabase::new(&base_dsn).await.expect("Failed to create test database.");
	let embedding = Arc::new(StubEmbedding::new(vec![1.0, 0.0, 0.0, 0.0]));
	let (service, pool) =
		db_service(&db, providers_with(embedding, Arc::new(StubGeneration::new("x")))).await;

	seed_patient(&pool, "p-1", "In Range", "female", Some(years_ago(50)), false, None, "[1,0,0,0]")
		.await;
	seed_patient(&pool, "p-2", "Too Old", "female", Some(years_ago(90)), false, None, "[1,0,0,0]")
		.await;
	seed_patient(&pool, "p-3", "Wrong Gender", "male", Some(years_ago(50)), false, None, "[1,0,0,0]")
		.await;
	seed_patient(&pool, "p-4", "No Birthdate", "female", None, false, None, "[1,0,0,0]").await;

	let filter = FilterSpec {
		gender: Some("female".to_string()),
		deceased: None,
		age: Some(AgeRange { min: 40, max: 60 }),
	};
	let response = service
		.search(SearchRequest {
			query: "diabetes".to_string(),
			filter: Some(filter),
			limit: Some(5),
		})
		.await
		.expect("search failed");
	let ids: Vec<&str> =
		response.items.iter().map(|item| item.patient.patient_id.as_str()).collect();

	assert_eq!(ids, ["p-1"]);

	// An explicitly empty filter behaves exactly like no filter at all.
	let unfiltered = service
		.search(SearchRequest { query: "diabetes".to_string(), filter: None, limit: Some(5) })
		.await
		.expect("search failed");
	let defaulted = service
		.search(SearchRequest {
			query: "diabetes".to_string(),
			filter: Some(FilterSpec::default()),
			limit: Some(5),
		})
		.await
		.expect("search failed");

	assert_eq!(
		unfiltered.items.iter().map(|item| &item.patient.patient_id).collect::<Vec<_>>(),
		defaulted.items.iter().map(|item| &item.patient.patient_id).collect::<Vec<_>>()
	);
	assert_eq!(unfiltered.items.len(), 4);

	db.cleanup().await.expect("cleanup failed");
}

#[tokio::test]
async fn deceased_age_is_measured_at_the_death_date() {
	let base_dsn = require_dsn!();
	let db = TestDatabase::new(&base_dsn).await.expect("Failed to create test database.");
	let embedding = Arc::new(StubEmbedding::new(vec![1.0, 0.0, 0.0, 0.0]));
	let (service, pool) =
		db_service(&db, providers_with(embedding, Arc::new(StubGeneration::new("x")))).await;

	// Died at 50; decades have passed since.
	seed_patient(
		&pool,
		"p-dead",
		"Died At Fifty",
		"male",
		Some(Date::from_calendar_date(1950, Month::June, 15).expect("bad date")),
		true,
		Some(datetime!(2000-06-16 00:00 UTC)),
		"[1,0,0,0]",
	)
	.await;

	let matching = FilterSpec {
		deceased: Some(true),
		age: Some(AgeRange { min: 45, max: 55 }),
		..FilterSpec::default()
	};
	let response = service
		.search(SearchRequest {
			query: "diabetes".to_string(),
			filter: Some(matching),
			limit: Some(5),
		})
		.await
		.expect("search failed");

	assert_eq!(response.items.len(), 1);

	// Today-relative age would match this range; death-relative must not.
	let not_matching = FilterSpec {
		deceased: Some(true),
		age: Some(AgeRange { min: 70, max: 80 }),
		..FilterSpec::default()
	};
	let response = service
		.search(SearchRequest {
			query: "diabetes".to_string(),
			filter: Some(not_matching),
			limit: Some(5),
		})
		.await
		.expect("search failed");

	assert!(response.items.is_empty());

	db.cleanup().await.expect("cleanup failed");
}

#[tokio::test]
async fn blank_query_browses_without_calling_the_embedding_provider() {
	let base_dsn = require_dsn!();
	let db = TestDatabase::new(&base_dsn).await.expect("Failed to create test database.");
	let embedding = Arc::new(StubEmbedding::new(vec![1.0, 0.0, 0.0, 0.0]));
	let calls = embedding.calls.clone();
	let (service, pool) =
		db_service(&db, providers_with(embedding, Arc::new(StubGeneration::new("x")))).await;

	seed_patient(&pool, "p-2", "Second", "female", Some(years_ago(30)), false, None, "[0,1,0,0]")
		.await;
	seed_patient(&pool, "p-1", "First", "male", Some(years_ago(40)), false, None, "[1,0,0,0]")
		.await;

	let response = service
		.search(SearchRequest { query: "   ".to_string(), filter: None, limit: Some(10) })
		.await
		.expect("search failed");
	let ids: Vec<&str> =
		response.items.iter().map(|item| item.patient.patient_id.as_str()).collect();

	assert_eq!(ids, ["p-1", "p-2"]);
	assert!(response.items.iter().all(|item| item.similarity == 0.0));
	assert_eq!(calls.load(Ordering::SeqCst), 0);

	db.cleanup().await.expect("cleanup failed");
}

#[tokio::test]
async fn aggregator_caps_orders_and_dedups_each_category() {
	let base_dsn = require_dsn!();
	let db = TestDatabase::new(&base_dsn).await.expect("Failed to create test database.");
	let embedding = Arc::new(StubEmbedding::new(vec![1.0, 0.0, 0.0, 0.0]));
	let (service, pool) =
		db_service(&db, providers_with(embedding, Arc::new(StubGeneration::new("x")))).await;

	seed_patient(&pool, "p-1", "Busy Patient", "female", Some(years_ago(50)), false, None, "[1,0,0,0]")
		.await;

	// Ten conditions; the cap is three.
	for day in 1..=10 {
		let recorded_at = datetime!(2021-03-01 10:00 UTC) + time::Duration::days(day);

		seed_condition(&pool, "p-1", &format!("code-{day:02}"), recorded_at).await;
	}

	// A duplicated observation row collapses to one entry.
	let ts = datetime!(2021-05-01 08:00 UTC);

	seed_observation(&pool, "p-1", "Body Weight", "82.3", ts).await;
	seed_observation(&pool, "p-1", "Body Weight", "82.3", ts).await;

	let bundle = service.patient_records("p-1").await.expect("aggregation failed");
	let conditions =
		bundle.category(RecordCategory::Conditions).expect("missing conditions slice");
	let codes: Vec<String> = conditions
		.records
		.iter()
		.map(|record| match &record.detail {
			cohort_domain::RecordDetail::Condition { code, .. } => code.clone(),
			detail => panic!("Unexpected detail: {detail:?}"),
		})
		.collect();

	assert_eq!(codes, ["code-10", "code-09", "code-08"]);

	let observations =
		bundle.category(RecordCategory::Observations).expect("missing observations slice");

	assert_eq!(observations.records.len(), 1);

	// Untouched categories are present and empty, not omitted.
	for category in [
		RecordCategory::Procedures,
		RecordCategory::Allergies,
		RecordCategory::Immunizations,
		RecordCategory::CarePlans,
	] {
		let slice = bundle.category(category).expect("missing category slice");

		assert!(slice.records.is_empty());
		assert!(slice.error.is_none());
	}

	db.cleanup().await.expect("cleanup failed");
}

#[tokio::test]
async fn category_fetch_failures_are_isolated() {
	let base_dsn = require_dsn!();
	let db = TestDatabase::new(&base_dsn).await.expect("Failed to create test database.");
	let embedding = Arc::new(StubEmbedding::new(vec![1.0, 0.0, 0.0, 0.0]));
	let (service, pool) =
		db_service(&db, providers_with(embedding, Arc::new(StubGeneration::new("x")))).await;

	seed_patient(&pool, "p-1", "Partial Patient", "male", Some(years_ago(60)), false, None, "[1,0,0,0]")
		.await;
	seed_condition(&pool, "p-1", "E11.9", datetime!(2021-03-02 10:00 UTC)).await;

	sqlx::query("DROP TABLE care_plans").execute(&pool).await.expect("Failed to drop table.");

	let bundle = service.patient_records("p-1").await.expect("aggregation failed");
	let care_plans =
		bundle.category(RecordCategory::CarePlans).expect("missing care plans slice");
	let conditions =
		bundle.category(RecordCategory::Conditions).expect("missing conditions slice");

	assert!(care_plans.error.is_some());
	assert!(care_plans.records.is_empty());
	assert!(conditions.error.is_none());
	assert_eq!(conditions.records.len(), 1);

	db.cleanup().await.expect("cleanup failed");
}

#[tokio::test]
async fn missing_patient_is_a_terminal_error() {
	let base_dsn = require_dsn!();
	let db = TestDatabase::new(&base_dsn).await.expect("Failed to create test database.");
	let embedding = Arc::new(StubEmbedding::new(vec![1.0, 0.0, 0.0, 0.0]));
	let (service, _pool) =
		db_service(&db, providers_with(embedding, Arc::new(StubGeneration::new("x")))).await;
	let err = service.patient_records("missing").await.expect_err("Expected missing patient.");

	assert!(matches!(err, Error::PatientNotFound { .. }), "Unexpected error: {err}");

	db.cleanup().await.expect("cleanup failed");
}

#[tokio::test]
async fn history_submits_bounded_evidence_and_returns_text_verbatim() {
	let base_dsn = require_dsn!();
	let db = TestDatabase::new(&base_dsn).await.expect("Failed to create test database.");
	let embedding = Arc::new(StubEmbedding::new(vec![1.0, 0.0, 0.0, 0.0]));
	let generation = Arc::new(StubGeneration::new("A tidy clinical narrative."));
	let (service, pool) = db_service(&db, providers_with(embedding, generation.clone())).await;

	seed_patient(&pool, "p-1", "Story Patient", "female", Some(years_ago(50)), false, None, "[1,0,0,0]")
		.await;
	seed_condition(&pool, "p-1", "E11.9", datetime!(2021-03-02 10:00 UTC)).await;
	seed_observation(&pool, "p-1", "Body Weight", "82.3", datetime!(2021-05-01 08:00 UTC)).await;

	let response = service
		.generate_history("p-1", HistoryRequest { model: None })
		.await
		.expect("history failed");

	assert_eq!(response.narrative, "A tidy clinical narrative.");
	assert_eq!(response.model, "test-model");

	let prompt = generation.last_prompt().expect("No prompt captured.");

	assert!(prompt.starts_with("Summarize patient p-1 with 2 records."), "{prompt}");
	assert!(prompt.contains("### Conditions"), "{prompt}");
	assert!(prompt.contains("E11.9"), "{prompt}");
	assert!(prompt.contains("Body Weight = 82.3 kg"), "{prompt}");
	assert!(prompt.len() <= 10_000);

	let conditions = response
		.included
		.iter()
		.find(|count| count.category == RecordCategory::Conditions)
		.expect("missing conditions count");

	assert_eq!(conditions.records, 1);

	db.cleanup().await.expect("cleanup failed");
}

#[tokio::test]
async fn generation_failure_reports_its_cause_and_spares_the_bundle() {
	let base_dsn = require_dsn!();
	let db = TestDatabase::new(&base_dsn).await.expect("Failed to create test database.");
	let embedding = Arc::new(StubEmbedding::new(vec![1.0, 0.0, 0.0, 0.0]));
	let (service, pool) =
		db_service(&db, providers_with(embedding, Arc::new(FailingGeneration))).await;

	seed_patient(&pool, "p-1", "Unlucky Patient", "male", Some(years_ago(40)), false, None, "[1,0,0,0]")
		.await;

	let err = service
		.generate_history("p-1", HistoryRequest { model: None })
		.await
		.expect_err("Expected generation failure.");

	match err {
		Error::GenerationBackend { cause, .. } =>
			assert_eq!(cause, GenerationFailure::MalformedResponse),
		err => panic!("Unexpected error: {err}"),
	}

	// The evidence itself is unaffected by the backend failure.
	let bundle = service.patient_records("p-1").await.expect("aggregation failed");

	assert_eq!(bundle.patient.patient_id, "p-1");

	db.cleanup().await.expect("cleanup failed");
}
