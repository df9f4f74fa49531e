//! Test tooling: throwaway Postgres databases seeded with the fixture
//! schema the externally-owned store is expected to expose. Production
//! never creates this schema; ingestion owns it.

mod error;

pub use error::{Error, Result};

use std::{env, future::Future, str::FromStr, thread};

use sqlx::{
	ConnectOptions, Connection, Executor,
	postgres::{PgConnectOptions, PgConnection, PgPool, PgPoolOptions},
};
use tokio::runtime::Builder;
use uuid::Uuid;

const ADMIN_DATABASES: [&str; 2] = ["postgres", "template1"];

/// The store surface consumed by the core, rendered with the embedding
/// dimension under test. Mirrors what the ingestion pipeline provisions.
pub fn render_schema(vector_dim: u32) -> String {
	format!(
		"\
CREATE EXTENSION IF NOT EXISTS vector;
CREATE TABLE patients (
	patient_id TEXT PRIMARY KEY,
	full_name TEXT NOT NULL,
	gender TEXT NOT NULL,
	birthdate DATE,
	deceased BOOLEAN NOT NULL DEFAULT FALSE,
	deceased_at TIMESTAMPTZ,
	description TEXT NOT NULL DEFAULT '',
	description_vec vector({vector_dim}) NOT NULL,
	phone TEXT,
	email TEXT,
	address TEXT,
	city TEXT,
	state TEXT,
	country TEXT
);
CREATE TABLE allergy_intolerances (
	patient_id TEXT NOT NULL REFERENCES patients(patient_id),
	code TEXT NOT NULL,
	category TEXT,
	criticality TEXT,
	clinical_status TEXT,
	verification_status TEXT,
	recorded_at TIMESTAMPTZ NOT NULL
);
CREATE TABLE immunizations (
	patient_id TEXT NOT NULL REFERENCES patients(patient_id),
	vaccine_code TEXT NOT NULL,
	status TEXT,
	recorded_at TIMESTAMPTZ NOT NULL
);
CREATE TABLE observations (
	patient_id TEXT NOT NULL REFERENCES patients(patient_id),
	code TEXT NOT NULL,
	value TEXT,
	unit TEXT,
	recorded_at TIMESTAMPTZ NOT NULL
);
CREATE TABLE conditions (
	patient_id TEXT NOT NULL REFERENCES patients(patient_id),
	code TEXT NOT NULL,
	clinical_status TEXT,
	verification_status TEXT,
	onset DATE,
	recorded_at TIMESTAMPTZ NOT NULL
);
CREATE TABLE procedures (
	patient_id TEXT NOT NULL REFERENCES patients(patient_id),
	code TEXT NOT NULL,
	recorded_at TIMESTAMPTZ NOT NULL
);
CREATE TABLE care_plans (
	patient_id TEXT NOT NULL REFERENCES patients(patient_id),
	category TEXT,
	status TEXT,
	activities TEXT,
	period_start TIMESTAMPTZ,
	period_end TIMESTAMPTZ,
	recorded_at TIMESTAMPTZ NOT NULL
);"
	)
}

pub struct TestDatabase {
	name: String,
	dsn: String,
	admin_options: PgConnectOptions,
	cleaned: bool,
}
impl TestDatabase {
	pub async fn new(base_dsn: &str) -> Result<Self> {
		let base_options: PgConnectOptions = PgConnectOptions::from_str(base_dsn)
			.map_err(|err| Error::Message(format!("Failed to parse COHORT_PG_DSN: {err}.")))?;
		let (admin_options, mut admin_conn) = connect_admin(&base_options).await?;
		let name = format!("cohort_test_{}", Uuid::new_v4().simple());
		let create_sql = format!(r#"CREATE DATABASE "{}""#, name);

		admin_conn
			.execute(create_sql.as_str())
			.await
			.map_err(|err| Error::Message(format!("Failed to create test database: {err}.")))?;

		let dsn = base_options.clone().database(&name).to_url_lossy().to_string();

		Ok(Self { name, dsn, admin_options, cleaned: false })
	}

	pub fn dsn(&self) -> &str {
		&self.dsn
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	/// Connect a pool and provision the fixture schema with the given
	/// embedding dimension.
	pub async fn pool_with_schema(&self, vector_dim: u32) -> Result<PgPool> {
		let pool = PgPoolOptions::new().max_connections(4).connect(&self.dsn).await?;
		let schema = render_schema(vector_dim);

		for statement in schema.split(';') {
			let trimmed = statement.trim();

			if trimmed.is_empty() {
				continue;
			}

			sqlx::query(trimmed).execute(&pool).await?;
		}

		Ok(pool)
	}

	pub async fn cleanup(mut self) -> Result<()> {
		self.cleanup_inner().await
	}

	async fn cleanup_inner(&mut self) -> Result<()> {
		if self.cleaned {
			return Ok(());
		}

		cleanup_database(&self.name, &self.admin_options).await?;

		self.cleaned = true;

		Ok(())
	}
}
impl Drop for TestDatabase {
	fn drop(&mut self) {
		if self.cleaned {
			return;
		}

		let name = self.name.clone();
		let admin_options = self.admin_options.clone();
		let cleanup_thread = thread::spawn(move || {
			let runtime = match Builder::new_current_thread().enable_all().build() {
				Ok(runtime) => runtime,
				Err(err) => {
					eprintln!("Test database cleanup failed: {err}.");

					return;
				},
			};

			if let Err(err) = runtime.block_on(cleanup_database(&name, &admin_options)) {
				eprintln!("Test database cleanup failed: {err}.");
			}
		});
		let _ = cleanup_thread.join();
	}
}

/// The DSN database tests run against; tests skip with a notice when it is
/// unset.
pub fn env_dsn() -> Option<String> {
	env::var("COHORT_PG_DSN").ok()
}

pub async fn with_test_db<F, Fut, T>(base_dsn: &str, f: F) -> Result<T>
where
	F: FnOnce(&TestDatabase) -> Fut,
	Fut: Future<Output = Result<T>>,
{
	let db = TestDatabase::new(base_dsn).await?;
	let result = f(&db).await;
	let mut db = db;

	if let Err(err) = db.cleanup_inner().await {
		eprintln!("Test database cleanup warning: {err}.");

		if result.is_ok() {
			return Err(err);
		}
	}

	result
}

async fn connect_admin(
	base_options: &PgConnectOptions,
) -> Result<(PgConnectOptions, PgConnection)> {
	let mut last_err = None;

	for database in ADMIN_DATABASES {
		let options = base_options.clone().database(database);

		match PgConnection::connect_with(&options).await {
			Ok(conn) => return Ok((options, conn)),
			Err(err) => {
				last_err = Some(err);
			},
		}
	}

	Err(Error::Message(format!("Failed to connect to an admin database: {last_err:?}.")))
}

async fn cleanup_database(name: &str, admin_options: &PgConnectOptions) -> Result<()> {
	let mut conn = PgConnection::connect_with(admin_options).await.map_err(|err| {
		Error::Message(format!("Failed to connect to admin database for cleanup: {err}."))
	})?;
	let _ = sqlx::query(
		"\
SELECT pg_terminate_backend(pid)
FROM pg_stat_activity
WHERE datname = $1 AND pid <> pg_backend_pid()",
	)
	.bind(name)
	.fetch_all(&mut conn)
	.await;
	let drop_sql = format!(r#"DROP DATABASE IF EXISTS "{}""#, name);

	sqlx::query(drop_sql.as_str())
		.execute(&mut conn)
		.await
		.map_err(|err| Error::Message(format!("Failed to drop test database: {err}.")))?;

	Ok(())
}
