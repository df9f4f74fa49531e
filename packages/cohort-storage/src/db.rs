use sqlx::{PgPool, postgres::PgPoolOptions};

use crate::Result;

/// Connection pool over the externally-owned patient store. The schema is
/// created and populated by the ingestion pipeline; everything in this
/// crate is read-only against it.
pub struct Db {
	pub pool: PgPool,
}
impl Db {
	pub async fn connect(cfg: &cohort_config::Postgres) -> Result<Self> {
		let pool =
			PgPoolOptions::new().max_connections(cfg.pool_max_conns).connect(&cfg.dsn).await?;

		Ok(Self { pool })
	}

	pub fn from_pool(pool: PgPool) -> Self {
		Self { pool }
	}
}
