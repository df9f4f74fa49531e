use std::time::Duration;

use time::OffsetDateTime;

use cohort_domain::{AgeRange, Patient, SearchFilter, filter::parse_gender};
use cohort_storage::queries;

use crate::{Error, Result, Service};

/// Caller-facing filter shape. Gender arrives as a string so an
/// unrecognized value surfaces as an invalid-filter error instead of a
/// deserialization failure.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct FilterSpec {
	#[serde(default)]
	pub gender: Option<String>,
	#[serde(default)]
	pub deceased: Option<bool>,
	#[serde(default)]
	pub age: Option<AgeRange>,
}
impl FilterSpec {
	fn into_filter(self) -> Result<SearchFilter> {
		let gender = self.gender.as_deref().map(parse_gender).transpose()?;

		Ok(SearchFilter { gender, deceased: self.deceased, age: self.age })
	}
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SearchRequest {
	pub query: String,
	#[serde(default)]
	pub filter: Option<FilterSpec>,
	#[serde(default)]
	pub limit: Option<u32>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SearchItem {
	#[serde(flatten)]
	pub patient: Patient,
	pub similarity: f32,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SearchResponse {
	pub items: Vec<SearchItem>,
}

impl Service {
	/// The hybrid query: one ranked retrieval combining vector similarity
	/// over patient descriptions with the compiled structured predicate.
	///
	/// A blank query skips the embedding step and lists filter-matching
	/// patients with similarity 0 (browse mode). Otherwise an unreachable
	/// provider or a wrong-dimension vector aborts the search with
	/// [`Error::EmbeddingUnavailable`]; a partial or empty result never
	/// stands in for a failure.
	pub async fn search(&self, req: SearchRequest) -> Result<SearchResponse> {
		let limit = self.resolve_limit(req.limit)?;

		if limit == 0 {
			return Ok(SearchResponse { items: Vec::new() });
		}

		let filter = req.filter.unwrap_or_default().into_filter()?;
		let compiled = filter.compile(OffsetDateTime::now_utc().date())?;
		let query = req.query.trim();
		let vector = if query.is_empty() { None } else { Some(self.embed_query(query).await?) };
		let store_call =
			queries::search_patients(&self.db, vector.as_deref(), &compiled, limit);
		let timeout = Duration::from_millis(self.cfg.search.store_timeout_ms);
		let rows = tokio::time::timeout(timeout, store_call)
			.await
			.map_err(|_| Error::Storage { message: "Store retrieval timed out.".to_string() })??;

		tracing::info!(results = rows.len(), limit, browse = vector.is_none(), "Search executed.");

		let items = rows
			.into_iter()
			.map(|row| SearchItem { similarity: row.similarity, patient: row.patient.into() })
			.collect();

		Ok(SearchResponse { items })
	}

	async fn embed_query(&self, query: &str) -> Result<Vec<f32>> {
		let cfg = &self.cfg.providers.embedding;
		let texts = [query.to_string()];
		let embeddings = self
			.providers
			.embedding
			.embed(cfg, &texts)
			.await
			.map_err(|err| Error::EmbeddingUnavailable { message: err.to_string() })?;
		let Some(vector) = embeddings.into_iter().next() else {
			return Err(Error::EmbeddingUnavailable {
				message: "Embedding provider returned no vectors.".to_string(),
			});
		};

		if vector.len() != cfg.dimensions as usize {
			return Err(Error::EmbeddingUnavailable {
				message: format!(
					"Embedding dimension mismatch: expected {}, got {}.",
					cfg.dimensions,
					vector.len()
				),
			});
		}

		Ok(vector)
	}

	fn resolve_limit(&self, limit: Option<u32>) -> Result<i64> {
		let limit = limit.unwrap_or(self.cfg.search.default_limit);

		if limit > self.cfg.search.max_limit {
			return Err(Error::InvalidRequest {
				message: format!("limit must not exceed {}.", self.cfg.search.max_limit),
			});
		}

		Ok(i64::from(limit))
	}
}
