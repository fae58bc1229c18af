pub mod add_memory;
pub mod add_relationship;
pub mod delete;
pub mod get;
pub mod search;

mod error;

pub use add_memory::{AddMemoryRequest, AddMemoryResponse};
pub use add_relationship::AddRelationshipRequest;
pub use delete::{DeleteRequest, DeleteResponse};
pub use error::{Error, Result};
pub use get::GetMemoryRequest;
pub use search::{DetailLevel, SearchMode, SearchRequest, SearchResponse};

use std::{future::Future, pin::Pin, sync::Arc};

use serde_json::{Map, json};

use mnema_config::{Config, EmbeddingProviderConfig};
use mnema_domain::{Memory, SchemaRegistry, hrid::HridAllocator};
use mnema_storage::{graph::GraphStore, models::GraphNode, vector::VectorStore};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Every memory mirrors into the graph store under this one generic label.
pub const MEMORY_NODE_LABEL: &str = "Memory";

/// Graph nodes carry a denormalized anchor for cheap graph-side display
/// and filtering, truncated so long documents never bloat the graph.
pub const GRAPH_ANCHOR_MAX_CHARS: usize = 512;

pub trait EmbeddingProvider
where
	Self: Send + Sync,
{
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, color_eyre::Result<Vec<Vec<f32>>>>;
}

#[derive(Clone)]
pub struct Providers {
	pub embedding: Arc<dyn EmbeddingProvider>,
}

struct DefaultProviders;

impl EmbeddingProvider for DefaultProviders {
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, color_eyre::Result<Vec<Vec<f32>>>> {
		Box::pin(mnema_providers::embedding::embed(cfg, texts))
	}
}

impl Providers {
	pub fn new(embedding: Arc<dyn EmbeddingProvider>) -> Self {
		Self { embedding }
	}
}

impl Default for Providers {
	fn default() -> Self {
		Self { embedding: Arc::new(DefaultProviders) }
	}
}

/// The pipeline context: schema registry, both stores, the embedding
/// provider, and the per-process HRID allocator. Constructed once at
/// startup and shared; there is no global state behind it.
pub struct MnemaService {
	pub cfg: Config,
	pub schema: SchemaRegistry,
	pub vector: Arc<dyn VectorStore>,
	pub graph: Arc<dyn GraphStore>,
	pub providers: Providers,
	hrids: HridAllocator,
}
impl MnemaService {
	pub fn new(
		cfg: Config,
		schema: SchemaRegistry,
		vector: Arc<dyn VectorStore>,
		graph: Arc<dyn GraphStore>,
	) -> Self {
		Self::with_providers(cfg, schema, vector, graph, Providers::default())
	}

	pub fn with_providers(
		cfg: Config,
		schema: SchemaRegistry,
		vector: Arc<dyn VectorStore>,
		graph: Arc<dyn GraphStore>,
		providers: Providers,
	) -> Self {
		Self { cfg, schema, vector, graph, providers, hrids: HridAllocator::new() }
	}

	pub(crate) async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
		let vectors = self
			.providers
			.embedding
			.embed(&self.cfg.providers.embedding, &[text.to_string()])
			.await?;
		let Some(vector) = vectors.into_iter().next() else {
			return Err(Error::Provider {
				message: "Embedding provider returned no vectors.".to_string(),
			});
		};

		if vector.len() != self.cfg.storage.qdrant.vector_dim as usize {
			return Err(Error::Provider {
				message: format!(
					"Embedding vector dimension mismatch: got {}, expected {}.",
					vector.len(),
					self.cfg.storage.qdrant.vector_dim
				),
			});
		}

		Ok(vector)
	}

	/// Allocates the next HRID for a type, reseeding the counter from the
	/// vector store the first time a type is seen in this process. A failed
	/// lookup degrades to a fresh counter rather than blocking writes.
	pub(crate) async fn next_hrid(&self, memory_type: &str) -> Result<String> {
		if !self.hrids.is_seeded(memory_type) {
			match self.vector.list_hrids(memory_type).await {
				Ok(existing) => self.hrids.seed(memory_type, existing.iter().map(String::as_str)),
				Err(err) => {
					tracing::warn!(
						memory_type,
						error = %err,
						"HRID seed lookup failed; starting a fresh counter for this type.",
					);
					self.hrids.seed(memory_type, std::iter::empty());
				},
			}
		}

		Ok(self.hrids.allocate(memory_type)?)
	}

	pub(crate) fn graph_node(&self, memory: &Memory, anchor: &str) -> GraphNode {
		let anchor = if anchor.chars().count() > GRAPH_ANCHOR_MAX_CHARS {
			anchor.chars().take(GRAPH_ANCHOR_MAX_CHARS).collect()
		} else {
			anchor.to_string()
		};

		GraphNode {
			node_id: memory.id,
			label: MEMORY_NODE_LABEL.to_string(),
			user_id: memory.user_id.clone(),
			memory_type: memory.memory_type.clone(),
			hrid: memory.hrid.clone(),
			anchor,
			tags: memory.tags.clone(),
			confidence: memory.confidence,
			is_valid: memory.is_valid,
			supersedes: memory.supersedes,
			superseded_by: memory.superseded_by,
			created_at: memory.created_at,
			updated_at: memory.created_at,
		}
	}

	/// Rebuilds an anchor-only memory from its graph mirror. Fails for
	/// types no longer in the schema; callers on read paths skip such rows.
	pub(crate) fn memory_from_node(&self, node: &GraphNode) -> Result<Memory> {
		let anchor_field = self.schema.anchor_field(&node.memory_type)?;
		let mut payload = Map::new();

		payload.insert(anchor_field.to_string(), json!(node.anchor));

		Ok(Memory {
			id: node.node_id,
			hrid: node.hrid.clone(),
			user_id: node.user_id.clone(),
			memory_type: node.memory_type.clone(),
			payload,
			tags: node.tags.clone(),
			confidence: node.confidence,
			is_valid: node.is_valid,
			created_at: node.created_at,
			supersedes: node.supersedes,
			superseded_by: node.superseded_by,
		})
	}
}
