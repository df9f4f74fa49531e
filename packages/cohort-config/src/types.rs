use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Deserialize)]
pub struct Config {
	pub service: Service,
	pub storage: Storage,
	pub providers: Providers,
	pub search: Search,
	pub records: Records,
	pub narrative: Narrative,
}

#[derive(Debug, Deserialize)]
pub struct Service {
	pub http_bind: String,
	pub log_level: String,
}

#[derive(Debug, Deserialize)]
pub struct Storage {
	pub postgres: Postgres,
}

#[derive(Debug, Deserialize)]
pub struct Postgres {
	pub dsn: String,
	pub pool_max_conns: u32,
}

#[derive(Debug, Deserialize)]
pub struct Providers {
	pub embedding: EmbeddingProviderConfig,
	pub generation: GenerationProviderConfig,
}

#[derive(Debug, Deserialize)]
pub struct EmbeddingProviderConfig {
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub dimensions: u32,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
pub struct GenerationProviderConfig {
	pub api_base: String,
	/// Optional; local backends such as Ollama run unauthenticated.
	#[serde(default)]
	pub api_key: Option<String>,
	pub path: String,
	/// The recognized model identifiers. The first entry is the default.
	pub models: Vec<String>,
	pub temperature: f32,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
pub struct Search {
	pub default_limit: u32,
	pub max_limit: u32,
	pub store_timeout_ms: u64,
}

#[derive(Debug, Deserialize)]
pub struct Records {
	/// Per-category record cap M for evidence bundles.
	pub max_per_category: u32,
}

#[derive(Debug, Deserialize)]
pub struct Narrative {
	/// Character budget for the serialized evidence handed to the
	/// generation backend, instruction included.
	pub max_prompt_chars: u32,
	/// Instruction template. `{patient_id}` and `{total_records}` are
	/// interpolated before submission.
	pub instruction: String,
}
