//! In-process fakes for the store and provider seams, so the full
//! pipeline runs hermetically in tests. The fakes honor the real filter
//! semantics (`mnema_storage::filter`) and score with actual cosine
//! similarity, unlike record-and-replay stubs.

use std::{
	collections::BTreeMap,
	sync::{
		Arc, Mutex,
		atomic::{AtomicBool, Ordering},
	},
};

use serde_json::{Map, Value, json};
use time::OffsetDateTime;
use uuid::Uuid;

use mnema_config::{
	Config, EmbeddingProviderConfig, Postgres, Providers as ProvidersConfig, Qdrant, Schema,
	Search, Storage,
};
use mnema_domain::SchemaRegistry;
use mnema_service::{BoxFuture as ServiceFuture, EmbeddingProvider, MnemaService, Providers};
use mnema_storage::{
	BoxFuture, Error, Result,
	filter::{lookup_path, payload_matches},
	graph::{GraphStore, validate_label, validate_rel_type},
	models::{Direction, GraphNeighbor, GraphNode, NeighborQuery, NodeFilter, PointRecord, ScoredPoint},
	vector::VectorStore,
};

pub const TEST_VECTOR_DIM: u32 = 64;

/// Deterministic bag-of-words embedder: tokens hash into a fixed-dim
/// vector which is then L2-normalized, so texts sharing tokens get a
/// positive cosine similarity. Good enough to exercise real ranking.
pub struct HashEmbedder {
	pub dim: usize,
}
impl HashEmbedder {
	pub fn new(dim: usize) -> Self {
		Self { dim }
	}

	pub fn embed_text(&self, text: &str) -> Vec<f32> {
		let mut vector = vec![0.0_f32; self.dim];

		for token in text.to_lowercase().split(|c: char| !c.is_alphanumeric()) {
			if token.is_empty() {
				continue;
			}

			let slot = fnv1a(token.as_bytes()) as usize % self.dim;

			vector[slot] += 1.0;
		}

		let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();

		if norm > 0.0 {
			for value in &mut vector {
				*value /= norm;
			}
		}

		vector
	}
}
impl EmbeddingProvider for HashEmbedder {
	fn embed<'a>(
		&'a self,
		_cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> ServiceFuture<'a, color_eyre::Result<Vec<Vec<f32>>>> {
		Box::pin(async move { Ok(texts.iter().map(|text| self.embed_text(text)).collect()) })
	}
}

struct StoredPoint {
	vector: Vec<f32>,
	payload: Value,
}

/// In-memory `VectorStore` with cosine scoring and real filter
/// evaluation. `fail_searches` injects an infrastructure failure.
#[derive(Default)]
pub struct MemoryVectorStore {
	points: Mutex<BTreeMap<Uuid, StoredPoint>>,
	fail_searches: AtomicBool,
}
impl MemoryVectorStore {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn fail_searches(&self, fail: bool) {
		self.fail_searches.store(fail, Ordering::SeqCst);
	}

	pub fn len(&self) -> usize {
		self.points.lock().unwrap_or_else(|err| err.into_inner()).len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}
impl VectorStore for MemoryVectorStore {
	fn ensure_collection<'a>(&'a self) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move { Ok(()) })
	}

	fn upsert_point<'a>(
		&'a self,
		id: Uuid,
		vector: &'a [f32],
		payload: Value,
	) -> BoxFuture<'a, Result<Uuid>> {
		Box::pin(async move {
			if !payload.is_object() {
				return Err(Error::InvalidArgument(
					"point payload must be a JSON object".to_string(),
				));
			}

			let mut points = self.points.lock().unwrap_or_else(|err| err.into_inner());

			points.insert(id, StoredPoint { vector: vector.to_vec(), payload });

			Ok(id)
		})
	}

	fn search_points<'a>(
		&'a self,
		vector: &'a [f32],
		limit: u32,
		filters: &'a Map<String, Value>,
	) -> BoxFuture<'a, Result<Vec<ScoredPoint>>> {
		Box::pin(async move {
			if self.fail_searches.load(Ordering::SeqCst) {
				return Err(Error::Backend("injected vector search failure".to_string()));
			}

			let points = self.points.lock().unwrap_or_else(|err| err.into_inner());
			let mut hits: Vec<ScoredPoint> = points
				.iter()
				.filter(|(_, point)| payload_matches(filters, &point.payload))
				.map(|(id, point)| ScoredPoint {
					id: *id,
					score: cosine(vector, &point.vector).clamp(0.0, 1.0),
					payload: point.payload.clone(),
				})
				.collect();

			hits.sort_by(|a, b| {
				b.score
					.partial_cmp(&a.score)
					.unwrap_or(std::cmp::Ordering::Equal)
					.then_with(|| a.id.cmp(&b.id))
			});
			hits.truncate(limit as usize);

			Ok(hits)
		})
	}

	fn get_point<'a>(&'a self, id: Uuid) -> BoxFuture<'a, Result<Option<PointRecord>>> {
		Box::pin(async move {
			let points = self.points.lock().unwrap_or_else(|err| err.into_inner());

			Ok(points.get(&id).map(|point| PointRecord { id, payload: point.payload.clone() }))
		})
	}

	fn delete_points<'a>(&'a self, ids: &'a [Uuid]) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			let mut points = self.points.lock().unwrap_or_else(|err| err.into_inner());

			for id in ids {
				points.remove(id);
			}

			Ok(())
		})
	}

	fn find_by_hrid<'a>(
		&'a self,
		user_id: &'a str,
		hrid: &'a str,
	) -> BoxFuture<'a, Result<Option<PointRecord>>> {
		Box::pin(async move {
			let filters = Map::from_iter([
				("core.user_id".to_string(), json!(user_id)),
				("core.hrid".to_string(), json!(hrid)),
			]);
			let points = self.points.lock().unwrap_or_else(|err| err.into_inner());

			Ok(points
				.iter()
				.find(|(_, point)| payload_matches(&filters, &point.payload))
				.map(|(id, point)| PointRecord { id: *id, payload: point.payload.clone() }))
		})
	}

	fn list_hrids<'a>(&'a self, memory_type: &'a str) -> BoxFuture<'a, Result<Vec<String>>> {
		Box::pin(async move {
			if self.fail_searches.load(Ordering::SeqCst) {
				return Err(Error::Backend("injected hrid listing failure".to_string()));
			}

			let filters =
				Map::from_iter([("core.memory_type".to_string(), json!(memory_type))]);
			let points = self.points.lock().unwrap_or_else(|err| err.into_inner());

			Ok(points
				.values()
				.filter(|point| payload_matches(&filters, &point.payload))
				.filter_map(|point| {
					lookup_path(&point.payload, "core.hrid")
						.and_then(Value::as_str)
						.map(str::to_string)
				})
				.collect())
		})
	}
}

struct StoredEdge {
	from_id: Uuid,
	to_id: Uuid,
	rel_type: String,
	created_at: OffsetDateTime,
}

/// In-memory `GraphStore`. `fail_queries` makes node scans and neighbor
/// lookups fail, for exercising the graph-to-vector fallback path.
#[derive(Default)]
pub struct MemoryGraphStore {
	nodes: Mutex<BTreeMap<Uuid, GraphNode>>,
	edges: Mutex<Vec<StoredEdge>>,
	fail_queries: AtomicBool,
}
impl MemoryGraphStore {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn fail_queries(&self, fail: bool) {
		self.fail_queries.store(fail, Ordering::SeqCst);
	}

	pub fn node_count(&self) -> usize {
		self.nodes.lock().unwrap_or_else(|err| err.into_inner()).len()
	}

	pub fn has_node(&self, id: Uuid) -> bool {
		self.nodes.lock().unwrap_or_else(|err| err.into_inner()).contains_key(&id)
	}
}
impl GraphStore for MemoryGraphStore {
	fn add_node<'a>(&'a self, label: &'a str, node: &'a GraphNode) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			validate_label(label)?;

			let mut nodes = self.nodes.lock().unwrap_or_else(|err| err.into_inner());
			let mut stored = node.clone();

			stored.label = label.to_string();
			nodes.insert(node.node_id, stored);

			Ok(())
		})
	}

	fn add_relationship<'a>(
		&'a self,
		from_label: &'a str,
		to_label: &'a str,
		rel_type: &'a str,
		from_id: Uuid,
		to_id: Uuid,
		_properties: &'a Map<String, Value>,
	) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			validate_label(from_label)?;
			validate_label(to_label)?;
			validate_rel_type(rel_type)?;

			let nodes = self.nodes.lock().unwrap_or_else(|err| err.into_inner());
			let labeled = |id: Uuid, label: &str| {
				nodes.get(&id).map(|node| node.label == label).unwrap_or(false)
			};

			if !labeled(from_id, from_label) {
				return Err(Error::NotFound(format!(
					"relationship source not found; label={from_label} node_id={from_id}"
				)));
			}
			if !labeled(to_id, to_label) {
				return Err(Error::NotFound(format!(
					"relationship target not found; label={to_label} node_id={to_id}"
				)));
			}

			drop(nodes);

			let mut edges = self.edges.lock().unwrap_or_else(|err| err.into_inner());

			edges.retain(|edge| {
				!(edge.from_id == from_id && edge.to_id == to_id && edge.rel_type == rel_type)
			});
			edges.push(StoredEdge {
				from_id,
				to_id,
				rel_type: rel_type.to_string(),
				created_at: OffsetDateTime::now_utc(),
			});

			Ok(())
		})
	}

	fn fetch_nodes<'a>(
		&'a self,
		label: &'a str,
		filter: &'a NodeFilter,
	) -> BoxFuture<'a, Result<Vec<GraphNode>>> {
		Box::pin(async move {
			validate_label(label)?;

			if self.fail_queries.load(Ordering::SeqCst) {
				return Err(Error::Backend("injected graph query failure".to_string()));
			}
			if filter.user_id.trim().is_empty() {
				return Err(Error::InvalidArgument(
					"node scans must be user-scoped; user_id must not be empty".to_string(),
				));
			}

			let nodes = self.nodes.lock().unwrap_or_else(|err| err.into_inner());
			let mut matched: Vec<GraphNode> = nodes
				.values()
				.filter(|node| node.label == label && node.user_id == filter.user_id)
				.filter(|node| {
					filter
						.memory_type
						.as_deref()
						.map(|memory_type| node.memory_type == memory_type)
						.unwrap_or(true)
				})
				.filter(|node| filter.since.map(|since| node.updated_at >= since).unwrap_or(true))
				.cloned()
				.collect();

			matched.sort_by(|a, b| {
				b.updated_at.cmp(&a.updated_at).then_with(|| a.node_id.cmp(&b.node_id))
			});
			matched.truncate(filter.limit as usize);

			Ok(matched)
		})
	}

	fn neighbors<'a>(
		&'a self,
		label: &'a str,
		node_id: Uuid,
		query: &'a NeighborQuery,
	) -> BoxFuture<'a, Result<Vec<GraphNeighbor>>> {
		Box::pin(async move {
			validate_label(label)?;

			if self.fail_queries.load(Ordering::SeqCst) {
				return Err(Error::Backend("injected graph query failure".to_string()));
			}
			if let Some(rel_types) = &query.rel_types {
				for rel_type in rel_types {
					validate_rel_type(rel_type)?;
				}
			}

			let edges = self.edges.lock().unwrap_or_else(|err| err.into_inner());
			let nodes = self.nodes.lock().unwrap_or_else(|err| err.into_inner());
			let mut out: Vec<GraphNeighbor> = Vec::new();

			for edge in edges.iter() {
				let other = match query.direction {
					Direction::Out if edge.from_id == node_id => edge.to_id,
					Direction::In if edge.to_id == node_id => edge.from_id,
					Direction::Any if edge.from_id == node_id => edge.to_id,
					Direction::Any if edge.to_id == node_id => edge.from_id,
					_ => continue,
				};

				if let Some(rel_types) = &query.rel_types
					&& !rel_types.iter().any(|rel_type| rel_type == &edge.rel_type)
				{
					continue;
				}

				let Some(node) = nodes.get(&other) else { continue };

				if let Some(neighbor_label) = &query.neighbor_label
					&& &node.label != neighbor_label
				{
					continue;
				}
				if out.iter().any(|existing| existing.node.node_id == other) {
					continue;
				}

				out.push(GraphNeighbor { node: node.clone(), rel_type: edge.rel_type.clone() });
			}

			out.sort_by(|a, b| a.node.node_id.cmp(&b.node.node_id));
			out.truncate(query.limit as usize);

			Ok(out)
		})
	}

	fn delete_node<'a>(&'a self, label: &'a str, node_id: Uuid) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			validate_label(label)?;

			let edges = self.edges.lock().unwrap_or_else(|err| err.into_inner());

			if edges.iter().any(|edge| edge.from_id == node_id || edge.to_id == node_id) {
				return Err(Error::Conflict(format!(
					"node still has relationships; delete them first; label={label} node_id={node_id}"
				)));
			}

			drop(edges);

			let mut nodes = self.nodes.lock().unwrap_or_else(|err| err.into_inner());

			if let Some(node) = nodes.get(&node_id)
				&& node.label != label
			{
				return Err(Error::NotFound(format!(
					"node not found under label; label={label} node_id={node_id}"
				)));
			}

			nodes.remove(&node_id);

			Ok(())
		})
	}
}

/// A fully wired service over the in-memory fakes, with handles kept so
/// tests can inspect store state and inject failures.
pub struct TestService {
	pub service: MnemaService,
	pub vector: Arc<MemoryVectorStore>,
	pub graph: Arc<MemoryGraphStore>,
	pub embedder: Arc<HashEmbedder>,
}

pub fn service_with_schema(schema_yaml: &str) -> TestService {
	let schema =
		SchemaRegistry::from_yaml_str(schema_yaml).expect("Test schema must be valid YAML.");
	let vector = Arc::new(MemoryVectorStore::new());
	let graph = Arc::new(MemoryGraphStore::new());
	let embedder = Arc::new(HashEmbedder::new(TEST_VECTOR_DIM as usize));
	let providers = Providers::new(embedder.clone());
	let service = MnemaService::with_providers(
		test_config(),
		schema,
		vector.clone(),
		graph.clone(),
		providers,
	);

	TestService { service, vector, graph, embedder }
}

pub fn test_config() -> Config {
	Config {
		schema: Schema { path: "unused-in-tests.yaml".to_string() },
		storage: Storage {
			postgres: Postgres {
				dsn: "postgres://unused-in-tests".to_string(),
				pool_max_conns: 1,
			},
			qdrant: Qdrant {
				url: "http://unused-in-tests:6334".to_string(),
				collection: "memories".to_string(),
				vector_dim: TEST_VECTOR_DIM,
			},
		},
		providers: ProvidersConfig {
			embedding: EmbeddingProviderConfig {
				provider_id: "testkit".to_string(),
				api_base: "http://unused-in-tests".to_string(),
				api_key: "test-key".to_string(),
				path: "/v1/embeddings".to_string(),
				model: "hash-bag-of-words".to_string(),
				dimensions: TEST_VECTOR_DIM,
				timeout_ms: 1_000,
				default_headers: Map::new(),
			},
		},
		search: Search::default(),
	}
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
	if a.is_empty() || a.len() != b.len() {
		return 0.0;
	}

	let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
	let norm_a: f32 = a.iter().map(|v| v * v).sum::<f32>().sqrt();
	let norm_b: f32 = b.iter().map(|v| v * v).sum::<f32>().sqrt();

	if norm_a == 0.0 || norm_b == 0.0 {
		return 0.0;
	}

	dot / (norm_a * norm_b)
}

fn fnv1a(bytes: &[u8]) -> u64 {
	let mut hash: u64 = 0xcbf2_9ce4_8422_2325;

	for byte in bytes {
		hash ^= *byte as u64;
		hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
	}

	hash
}
