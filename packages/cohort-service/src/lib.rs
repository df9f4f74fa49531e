pub mod history;
pub mod records;
pub mod search;

mod error;

pub use error::{Error, GenerationFailure, Result};
pub use history::{CategoryCount, HistoryRequest, HistoryResponse};
pub use search::{FilterSpec, SearchItem, SearchRequest, SearchResponse};

use std::{future::Future, pin::Pin, sync::Arc};

use cohort_config::{Config, EmbeddingProviderConfig, GenerationProviderConfig};
use cohort_providers::{embedding, generation};
use cohort_storage::db::Db;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Maps query text to a fixed-dimension vector. Must be backed by the same
/// model and dimension that embedded the stored patient descriptions.
pub trait EmbeddingProvider
where
	Self: Send + Sync,
{
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, cohort_providers::Result<Vec<Vec<f32>>>>;
}

/// Turns a bounded prompt into generated text via the configured backend.
pub trait GenerationProvider
where
	Self: Send + Sync,
{
	fn generate<'a>(
		&'a self,
		cfg: &'a GenerationProviderConfig,
		model: &'a str,
		prompt: &'a str,
	) -> BoxFuture<'a, cohort_providers::Result<String>>;
}

#[derive(Clone)]
pub struct Providers {
	pub embedding: Arc<dyn EmbeddingProvider>,
	pub generation: Arc<dyn GenerationProvider>,
}

struct DefaultProviders;

impl EmbeddingProvider for DefaultProviders {
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, cohort_providers::Result<Vec<Vec<f32>>>> {
		Box::pin(embedding::embed(cfg, texts))
	}
}

impl GenerationProvider for DefaultProviders {
	fn generate<'a>(
		&'a self,
		cfg: &'a GenerationProviderConfig,
		model: &'a str,
		prompt: &'a str,
	) -> BoxFuture<'a, cohort_providers::Result<String>> {
		Box::pin(generation::generate(cfg, model, prompt))
	}
}

impl Providers {
	pub fn new(
		embedding: Arc<dyn EmbeddingProvider>,
		generation: Arc<dyn GenerationProvider>,
	) -> Self {
		Self { embedding, generation }
	}
}

impl Default for Providers {
	fn default() -> Self {
		let provider = Arc::new(DefaultProviders);

		Self { embedding: provider.clone(), generation: provider }
	}
}

/// The orchestrating core. Every operation takes `&self`, holds no
/// cross-request state, and is read-only against the store, so one
/// instance is shared across concurrent sessions.
pub struct Service {
	pub cfg: Config,
	pub db: Db,
	pub providers: Providers,
}
impl Service {
	pub fn new(cfg: Config, db: Db) -> Self {
		Self { cfg, db, providers: Providers::default() }
	}

	pub fn with_providers(cfg: Config, db: Db, providers: Providers) -> Self {
		Self { cfg, db, providers }
	}
}
