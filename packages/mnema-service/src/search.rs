use std::{cmp::Ordering, collections::HashMap};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use time::{Duration, OffsetDateTime};
use tracing::warn;
use uuid::Uuid;

use crate::{Error, MEMORY_NODE_LABEL, MnemaService, Result};
use mnema_domain::{Memory, SearchResult, SearchSource, hrid};
use mnema_storage::models::{Direction, NeighborQuery, NodeFilter};

/// Graph membership is evidence of relevance even without a fresh vector
/// match, so graph candidates score a flat 0.5 rather than being dropped.
pub const NEUTRAL_GRAPH_SCORE: f32 = 0.5;
pub const NEIGHBOR_SCORE_FLOOR: f32 = 0.3;
pub const NEIGHBOR_SCORE_DECAY: f32 = 0.9;
/// Only the top seeds get neighbor expansion.
pub const EXPANSION_SEEDS: usize = 5;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
	Vector,
	Graph,
	Hybrid,
}

/// Payload projection. Neighbors stay anchor-only in either level; this
/// controls seeds.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub enum DetailLevel {
	#[serde(rename = "none")]
	AnchorsOnly,
	#[default]
	#[serde(rename = "self")]
	SelfDetails,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SearchRequest {
	pub user_id: String,
	#[serde(default)]
	pub query: Option<String>,
	#[serde(default)]
	pub limit: Option<u32>,
	#[serde(default)]
	pub memory_type: Option<String>,
	/// Structural equality/range filters over payload sub-keys
	/// (`entity.status`, `core.tags`, ...).
	#[serde(default)]
	pub filters: Map<String, Value>,
	#[serde(default)]
	pub modified_within_days: Option<i64>,
	/// Explicit mode override; auto-selected from query/scope otherwise.
	#[serde(default)]
	pub mode: Option<SearchMode>,
	#[serde(default)]
	pub include_details: DetailLevel,
	/// Per-type payload allow-lists; the anchor field is always kept.
	#[serde(default)]
	pub projection: HashMap<String, Vec<String>>,
	#[serde(default)]
	pub neighbor_limit: Option<u32>,
	/// Relationship predicates to traverse during neighbor expansion;
	/// defaults to the configured whitelist, never to "all edges".
	#[serde(default)]
	pub relation_types: Option<Vec<String>>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SearchResponse {
	pub results: Vec<SearchResult>,
}

impl MnemaService {
	/// Unified retrieval: mode selection, candidate discovery, rerank,
	/// neighbor expansion, projection, and a deterministic total order.
	pub async fn search(&self, req: SearchRequest) -> Result<SearchResponse> {
		let user_id = req.user_id.trim();

		if user_id.is_empty() {
			return Err(Error::Validation {
				message: "user_id is required for search.".to_string(),
			});
		}

		let query = req.query.as_deref().map(str::trim).filter(|query| !query.is_empty());
		let limit = req.limit.unwrap_or(self.cfg.search.default_limit).max(1) as usize;
		let memory_type = req
			.memory_type
			.as_deref()
			.map(str::trim)
			.filter(|memory_type| !memory_type.is_empty())
			.map(str::to_lowercase);
		let has_scope = memory_type.is_some()
			|| !req.filters.is_empty()
			|| req.modified_within_days.is_some();
		let mode = match req.mode {
			Some(mode) => mode,
			None if query.is_some() => SearchMode::Vector,
			None if has_scope => SearchMode::Graph,
			// No query and nothing to scope by: an undirected full scan is
			// never the right answer.
			None => return Ok(SearchResponse { results: Vec::new() }),
		};
		let since = req
			.modified_within_days
			.map(|days| OffsetDateTime::now_utc() - Duration::days(days.max(0)));
		let mut results = match mode {
			SearchMode::Vector => {
				let Some(query) = query else {
					return Err(Error::Validation {
						message: "vector mode requires a non-empty query.".to_string(),
					});
				};

				self.vector_candidates(
					query,
					user_id,
					limit,
					memory_type.as_deref(),
					&req.filters,
					since,
				)
				.await?
			},
			SearchMode::Graph => {
				match self
					.graph_candidates(query, user_id, limit, memory_type.as_deref(), since)
					.await
				{
					Ok(results) => results,
					Err(err) => match query {
						Some(query) => {
							warn!(
								error = %err,
								"Graph candidate query failed; falling back to vector-only search.",
							);

							self.vector_candidates(
								query,
								user_id,
								limit,
								memory_type.as_deref(),
								&req.filters,
								since,
							)
							.await?
						},
						// No query means no alternative candidate source.
						None => {
							warn!(
								error = %err,
								"Graph candidate query failed with no query to fall back on.",
							);

							Vec::new()
						},
					},
				}
			},
			SearchMode::Hybrid => {
				let vector_results = match query {
					Some(query) => {
						self.vector_candidates(
							query,
							user_id,
							limit,
							memory_type.as_deref(),
							&req.filters,
							since,
						)
						.await?
					},
					None => Vec::new(),
				};
				let graph_results = match self
					.graph_candidates(None, user_id, limit, memory_type.as_deref(), since)
					.await
				{
					Ok(results) => results,
					Err(err) => {
						warn!(
							error = %err,
							"Graph candidate query failed during hybrid search; using vector results only.",
						);

						Vec::new()
					},
				};

				merge_hybrid(vector_results, graph_results)
			},
		};

		sort_results(&mut results);

		let neighbor_limit = req.neighbor_limit.unwrap_or(self.cfg.search.neighbor_limit);
		let relation_types = req
			.relation_types
			.clone()
			.filter(|relations| !relations.is_empty())
			.map(|relations| {
				relations
					.into_iter()
					.map(|relation| relation.trim().to_uppercase())
					.collect::<Vec<_>>()
			})
			.unwrap_or_else(|| self.cfg.search.neighbor_relations.clone());
		let expanded = self.expand_neighbors(&results, neighbor_limit, &relation_types).await;
		let mut merged = merge_by_id(results, expanded);

		self.apply_projection(&mut merged, req.include_details, &req.projection);
		sort_results(&mut merged);
		// Truncate only after the full sort so a late-arriving neighbor can
		// never crowd out a higher-scored seed.
		merged.truncate(limit);

		Ok(SearchResponse { results: merged })
	}

	async fn vector_candidates(
		&self,
		query: &str,
		user_id: &str,
		limit: usize,
		memory_type: Option<&str>,
		extra_filters: &Map<String, Value>,
		since: Option<OffsetDateTime>,
	) -> Result<Vec<SearchResult>> {
		let vector = self.embed_one(query).await?;
		let mut filters = extra_filters.clone();

		filters.insert("core.user_id".to_string(), json!(user_id));

		if let Some(memory_type) = memory_type {
			filters.insert("core.memory_type".to_string(), json!(memory_type));
		}
		if let Some(since) = since {
			filters.insert(
				"core.created_at_ts".to_string(),
				json!({"gte": since.unix_timestamp()}),
			);
		}

		let hits = self.vector.search_points(&vector, limit as u32, &filters).await?;
		let mut results = Vec::with_capacity(hits.len());

		for hit in hits {
			let memory = Memory::from_point_payload(hit.id, &hit.payload)?;

			results.push(SearchResult {
				memory,
				score: hit.score,
				source: SearchSource::VectorSearch,
				metadata: Map::new(),
			});
		}

		Ok(results)
	}

	async fn graph_candidates(
		&self,
		query: Option<&str>,
		user_id: &str,
		limit: usize,
		memory_type: Option<&str>,
		since: Option<OffsetDateTime>,
	) -> Result<Vec<SearchResult>> {
		let filter = NodeFilter {
			user_id: user_id.to_string(),
			memory_type: memory_type.map(str::to_string),
			since,
			limit: limit as u32,
		};
		let nodes = self.graph.fetch_nodes(MEMORY_NODE_LABEL, &filter).await?;
		let mut candidates = Vec::with_capacity(nodes.len());

		for node in nodes {
			match self.memory_from_node(&node) {
				Ok(memory) => candidates.push(memory),
				// Stale rows from a since-removed type; never fail the search.
				Err(err) => warn!(
					node_id = %node.node_id,
					error = %err,
					"Skipping graph node with a type missing from the schema.",
				),
			}
		}

		match query {
			Some(query) => self.rerank_with_vectors(query, user_id, candidates).await,
			// Equal scores are ordered later by the HRID tie-break, keeping
			// results independent of store iteration order.
			None => Ok(candidates
				.into_iter()
				.map(|memory| SearchResult {
					memory,
					score: NEUTRAL_GRAPH_SCORE,
					source: SearchSource::GraphQuery,
					metadata: Map::new(),
				})
				.collect()),
		}
	}

	/// Joins one similarity-search pass back onto graph candidates by id.
	/// Candidates without a vector hit keep the neutral score.
	async fn rerank_with_vectors(
		&self,
		query: &str,
		user_id: &str,
		candidates: Vec<Memory>,
	) -> Result<Vec<SearchResult>> {
		if candidates.is_empty() {
			return Ok(Vec::new());
		}

		let vector = self.embed_one(query).await?;
		let mut filters = Map::new();

		filters.insert("core.user_id".to_string(), json!(user_id));

		let fetch = candidates.len().max(10) as u32;
		let hits = self.vector.search_points(&vector, fetch, &filters).await?;
		let score_by_id: HashMap<Uuid, f32> =
			hits.into_iter().map(|hit| (hit.id, hit.score)).collect();

		Ok(candidates
			.into_iter()
			.map(|memory| {
				let score =
					score_by_id.get(&memory.id).copied().unwrap_or(NEUTRAL_GRAPH_SCORE);

				SearchResult {
					memory,
					score,
					source: SearchSource::GraphRerank,
					metadata: Map::new(),
				}
			})
			.collect())
	}

	/// Appends graph neighbors of the top seeds as anchor-only context
	/// breadcrumbs, each scored strictly below its seed.
	async fn expand_neighbors(
		&self,
		seeds: &[SearchResult],
		neighbor_limit: u32,
		relation_types: &[String],
	) -> Vec<SearchResult> {
		if neighbor_limit == 0 || relation_types.is_empty() {
			return Vec::new();
		}

		let query = NeighborQuery {
			rel_types: Some(relation_types.to_vec()),
			direction: Direction::Any,
			limit: neighbor_limit,
			neighbor_label: Some(MEMORY_NODE_LABEL.to_string()),
		};
		let mut expanded = Vec::new();

		for seed in seeds.iter().take(EXPANSION_SEEDS) {
			let capped = (seed.score * NEIGHBOR_SCORE_DECAY).max(NEIGHBOR_SCORE_FLOOR);

			// A neighbor must rank strictly below its seed; seeds at or below
			// the floor contribute nothing.
			if capped >= seed.score {
				continue;
			}

			let neighbors =
				match self.graph.neighbors(MEMORY_NODE_LABEL, seed.memory.id, &query).await {
					Ok(neighbors) => neighbors,
					Err(err) => {
						warn!(
							seed_id = %seed.memory.id,
							error = %err,
							"Neighbor lookup failed; keeping the seed without expansion.",
						);

						continue;
					},
				};

			for neighbor in neighbors {
				if neighbor.node.user_id != seed.memory.user_id {
					continue;
				}

				match self.memory_from_node(&neighbor.node) {
					Ok(memory) => {
						let mut metadata = Map::new();

						metadata.insert(
							"expanded_from".to_string(),
							json!(seed.memory.id.to_string()),
						);
						metadata.insert("rel_type".to_string(), json!(neighbor.rel_type));
						expanded.push(SearchResult {
							memory,
							score: capped,
							source: SearchSource::GraphNeighbor,
							metadata,
						});
					},
					Err(err) => warn!(
						node_id = %neighbor.node.node_id,
						error = %err,
						"Skipping neighbor with a type missing from the schema.",
					),
				}
			}
		}

		expanded
	}

	fn apply_projection(
		&self,
		results: &mut [SearchResult],
		include_details: DetailLevel,
		projection: &HashMap<String, Vec<String>>,
	) {
		for result in results {
			let Ok(anchor) = self.schema.anchor_field(&result.memory.memory_type) else {
				continue;
			};
			let anchor = anchor.to_string();
			let payload = &mut result.memory.payload;

			if include_details == DetailLevel::AnchorsOnly
				|| result.source == SearchSource::GraphNeighbor
			{
				payload.retain(|key, _| *key == anchor);

				continue;
			}
			if let Some(allowed) = projection.get(&result.memory.memory_type) {
				payload.retain(|key, _| *key == anchor || allowed.iter().any(|field| field == key));
			}
		}
	}
}

fn merge_hybrid(vector: Vec<SearchResult>, graph: Vec<SearchResult>) -> Vec<SearchResult> {
	let mut by_id: HashMap<Uuid, SearchResult> =
		graph.into_iter().map(|result| (result.memory.id, result)).collect();

	for result in vector {
		match by_id.get_mut(&result.memory.id) {
			// The vector hit wins only when it beats the neutral graph score.
			Some(existing) =>
				if result.score > NEUTRAL_GRAPH_SCORE {
					*existing = result;
				},
			None => {
				by_id.insert(result.memory.id, result);
			},
		}
	}

	by_id.into_values().collect()
}

fn merge_by_id(seeds: Vec<SearchResult>, expanded: Vec<SearchResult>) -> Vec<SearchResult> {
	let mut by_id: HashMap<Uuid, SearchResult> = HashMap::new();

	for result in seeds.into_iter().chain(expanded) {
		match by_id.get_mut(&result.memory.id) {
			Some(existing) =>
				if result.score > existing.score {
					*existing = result;
				},
			None => {
				by_id.insert(result.memory.id, result);
			},
		}
	}

	by_id.into_values().collect()
}

/// Score descending, then HRID ordering index ascending (missing HRIDs
/// last), then raw id. Bit-for-bit reproducible on identical data.
fn sort_results(results: &mut [SearchResult]) {
	results.sort_by(|a, b| {
		b.score
			.partial_cmp(&a.score)
			.unwrap_or(Ordering::Equal)
			.then_with(|| hrid_rank(&a.memory).cmp(&hrid_rank(&b.memory)))
			.then_with(|| a.memory.id.cmp(&b.memory.id))
	});
}

fn hrid_rank(memory: &Memory) -> u128 {
	memory
		.hrid
		.as_deref()
		.and_then(|raw| hrid::hrid_to_index(raw).ok())
		.unwrap_or(u128::MAX)
}
