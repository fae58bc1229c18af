use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Deserialize)]
pub struct Config {
	pub schema: Schema,
	pub storage: Storage,
	pub providers: Providers,
	#[serde(default)]
	pub search: Search,
}

#[derive(Debug, Deserialize)]
pub struct Schema {
	/// Path to the YAML entity registry. There is no built-in default
	/// schema; every deployment declares its own entity types.
	pub path: String,
}

#[derive(Debug, Deserialize)]
pub struct Storage {
	pub postgres: Postgres,
	pub qdrant: Qdrant,
}

#[derive(Debug, Deserialize)]
pub struct Postgres {
	pub dsn: String,
	pub pool_max_conns: u32,
}

#[derive(Debug, Deserialize)]
pub struct Qdrant {
	pub url: String,
	pub collection: String,
	pub vector_dim: u32,
}

#[derive(Debug, Deserialize)]
pub struct Providers {
	pub embedding: EmbeddingProviderConfig,
}

#[derive(Debug, Deserialize)]
pub struct EmbeddingProviderConfig {
	pub provider_id: String,
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
pub struct Search {
	#[serde(default = "default_limit")]
	pub default_limit: u32,
	#[serde(default = "default_neighbor_limit")]
	pub neighbor_limit: u32,
	/// Relationship predicates traversed during neighbor expansion when a
	/// request does not name its own whitelist.
	#[serde(default = "default_neighbor_relations")]
	pub neighbor_relations: Vec<String>,
}

impl Default for Search {
	fn default() -> Self {
		Self {
			default_limit: default_limit(),
			neighbor_limit: default_neighbor_limit(),
			neighbor_relations: default_neighbor_relations(),
		}
	}
}

fn default_limit() -> u32 {
	20
}

fn default_neighbor_limit() -> u32 {
	5
}

fn default_neighbor_relations() -> Vec<String> {
	["RELATED_TO", "HAS_DOCUMENT", "REQUIRES"].map(str::to_string).to_vec()
}
