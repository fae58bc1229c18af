use serde_json::json;

use mnema_domain::{SearchSource, hrid};
use mnema_service::{AddMemoryRequest, AddRelationshipRequest, DetailLevel, SearchMode};

use super::{add_note, payload, query_request, scoped_request, service};

#[tokio::test]
async fn query_returns_the_matching_note_first() {
	let fixture = service();

	add_note(&fixture, "u1", "alpha beta gamma").await;
	add_note(&fixture, "u1", "completely different subject").await;

	let response = fixture
		.service
		.search(query_request("u1", "alpha beta", 5))
		.await
		.expect("search failed");

	assert!(!response.results.is_empty());

	let first = &response.results[0];

	assert_eq!(first.memory.payload.get("statement"), Some(&json!("alpha beta gamma")));
	assert_eq!(first.source, SearchSource::VectorSearch);
	assert!(first.score > 0.0);
}

#[tokio::test]
async fn results_never_cross_user_boundaries() {
	let fixture = service();

	add_note(&fixture, "u1", "shared wording about deployments").await;
	add_note(&fixture, "u1", "another note for the first user").await;
	add_note(&fixture, "u2", "shared wording about deployments").await;

	let for_u1 = fixture
		.service
		.search(query_request("u1", "shared wording deployments", 10))
		.await
		.expect("search failed");

	assert!(!for_u1.results.is_empty());
	assert!(for_u1.results.iter().all(|result| result.memory.user_id == "u1"));

	let for_u2 = fixture
		.service
		.search(query_request("u2", "shared wording deployments", 10))
		.await
		.expect("search failed");

	assert!(!for_u2.results.is_empty());
	assert!(for_u2.results.iter().all(|result| result.memory.user_id == "u2"));
}

#[tokio::test]
async fn no_query_and_no_scope_returns_empty_without_scanning() {
	let fixture = service();

	add_note(&fixture, "u1", "present but unreachable without scope").await;

	let mut request = query_request("u1", "", 10);

	request.query = None;

	let response = fixture.service.search(request).await.expect("search failed");

	assert!(response.results.is_empty());
}

#[tokio::test]
async fn graph_failure_with_a_query_falls_back_to_vector_results() {
	let fixture = service();

	add_note(&fixture, "u1", "resilient retrieval path").await;
	fixture.graph.fail_queries(true);

	// Auto-selected mode with a failing graph store must not raise.
	let auto = fixture
		.service
		.search(query_request("u1", "resilient retrieval", 5))
		.await
		.expect("auto-select search must not raise");

	assert!(!auto.results.is_empty());

	// Even an explicit graph-mode call falls back when a query exists.
	let mut request = query_request("u1", "resilient retrieval", 5);

	request.mode = Some(SearchMode::Graph);

	let fallback = fixture.service.search(request).await.expect("fallback search failed");

	assert!(!fallback.results.is_empty());
	assert_eq!(fallback.results[0].source, SearchSource::VectorSearch);
}

#[tokio::test]
async fn graph_failure_without_a_query_returns_empty() {
	let fixture = service();

	add_note(&fixture, "u1", "unreachable through graph").await;
	fixture.graph.fail_queries(true);

	let response = fixture
		.service
		.search(scoped_request("u1", "note", 5))
		.await
		.expect("scoped search must not raise");

	assert!(response.results.is_empty());
}

#[tokio::test]
async fn scoped_graph_search_scores_flat_and_orders_by_hrid() {
	let fixture = service();

	add_note(&fixture, "u1", "first note").await;
	add_note(&fixture, "u1", "second note").await;
	add_note(&fixture, "u1", "third note").await;

	let response = fixture
		.service
		.search(scoped_request("u1", "note", 10))
		.await
		.expect("search failed");

	assert_eq!(response.results.len(), 3);

	for result in &response.results {
		assert_eq!(result.score, 0.5);
		assert_eq!(result.source, SearchSource::GraphQuery);
	}

	let hrids: Vec<_> = response
		.results
		.iter()
		.map(|result| result.memory.hrid.clone().expect("graph results carry hrids"))
		.collect();

	assert_eq!(hrids, ["NOTE_AAA000", "NOTE_AAA001", "NOTE_AAA002"]);
}

#[tokio::test]
async fn equal_scores_order_deterministically_across_types() {
	let fixture = service();

	add_note(&fixture, "u1", "typed tie one").await;
	fixture
		.service
		.add_memory(AddMemoryRequest {
			user_id: "u1".to_string(),
			memory_type: "task".to_string(),
			payload: payload(json!({"statement": "typed tie two"})),
			tags: Vec::new(),
		})
		.await
		.expect("add_memory failed");

	let mut request = scoped_request("u1", "", 10);

	request.memory_type = None;
	request.modified_within_days = Some(30);

	let first = fixture.service.search(request.clone()).await.expect("search failed");
	let second = fixture.service.search(request).await.expect("search failed");
	let order =
		|results: &[mnema_domain::SearchResult]| -> Vec<String> {
			results.iter().map(|r| r.memory.hrid.clone().unwrap_or_default()).collect()
		};

	assert_eq!(order(&first.results), order(&second.results));
	assert_eq!(order(&first.results), ["NOTE_AAA000", "TASK_AAA000"]);
	assert!(
		hrid::hrid_to_index("NOTE_AAA000").expect("index failed")
			< hrid::hrid_to_index("TASK_AAA000").expect("index failed")
	);
}

#[tokio::test]
async fn graph_mode_with_query_reranks_candidates_by_similarity() {
	let fixture = service();

	add_note(&fixture, "u1", "kubernetes rollout strategy").await;
	add_note(&fixture, "u1", "grocery list for the weekend").await;

	let mut request = query_request("u1", "kubernetes rollout", 10);

	request.mode = Some(SearchMode::Graph);

	let response = fixture.service.search(request).await.expect("search failed");

	assert_eq!(response.results.len(), 2);
	assert_eq!(
		response.results[0].memory.payload.get("statement"),
		Some(&json!("kubernetes rollout strategy"))
	);
	assert_eq!(response.results[0].source, SearchSource::GraphRerank);
	assert!(response.results[0].score > response.results[1].score);
}

#[tokio::test]
async fn hybrid_merges_vector_and_graph_candidates_by_id() {
	let fixture = service();

	add_note(&fixture, "u1", "alpha beta gamma").await;
	add_note(&fixture, "u1", "entirely unrelated topic").await;

	let mut request = query_request("u1", "alpha beta", 10);

	request.mode = Some(SearchMode::Hybrid);

	let response = fixture.service.search(request).await.expect("search failed");

	assert_eq!(response.results.len(), 2);

	let strong = &response.results[0];
	let weak = &response.results[1];

	assert_eq!(strong.memory.payload.get("statement"), Some(&json!("alpha beta gamma")));
	assert_eq!(strong.source, SearchSource::VectorSearch);
	assert!(strong.score > 0.5);
	// The non-matching memory survives on graph membership alone.
	assert_eq!(weak.score, 0.5);
	assert_eq!(weak.source, SearchSource::GraphQuery);
}

#[tokio::test]
async fn neighbors_append_below_their_seed_and_honor_the_cap() {
	let fixture = service();
	let seed = add_note(&fixture, "u1", "alpha beta gamma").await;
	let neighbor_a = add_note(&fixture, "u1", "first linked context").await;
	let neighbor_b = add_note(&fixture, "u1", "second linked context").await;

	for hrid in [&neighbor_a.hrid, &neighbor_b.hrid] {
		fixture
			.service
			.add_relationship(AddRelationshipRequest {
				user_id: "u1".to_string(),
				from_hrid: seed.hrid.clone(),
				to_hrid: hrid.clone(),
				rel_type: "RELATED_TO".to_string(),
				properties: Default::default(),
			})
			.await
			.expect("add_relationship failed");
	}

	let mut request = query_request("u1", "alpha beta gamma", 10);

	request.neighbor_limit = Some(1);

	let response = fixture.service.search(request).await.expect("search failed");
	let seed_result = response
		.results
		.iter()
		.find(|result| result.memory.id == seed.id)
		.expect("seed must be in the results");
	let neighbors: Vec<_> = response
		.results
		.iter()
		.filter(|result| result.source == SearchSource::GraphNeighbor)
		.collect();

	// neighbor_limit = 1 caps what the seed may contribute.
	assert_eq!(neighbors.len(), 1);

	for neighbor in &neighbors {
		assert!(neighbor.score < seed_result.score);
		assert_eq!(neighbor.score, (seed_result.score * 0.9).max(0.3));
		// Neighbors are context breadcrumbs: anchor-only payload.
		assert_eq!(neighbor.memory.payload.len(), 1);
		assert!(neighbor.memory.payload.contains_key("statement"));
		assert_eq!(
			neighbor.metadata.get("expanded_from"),
			Some(&json!(seed.id.to_string()))
		);
	}
}

#[tokio::test]
async fn neighbor_expansion_only_follows_whitelisted_relations() {
	let fixture = service();
	let seed = add_note(&fixture, "u1", "alpha beta gamma").await;
	let annotation = add_note(&fixture, "u1", "annotation outside the whitelist").await;

	fixture
		.service
		.add_relationship(AddRelationshipRequest {
			user_id: "u1".to_string(),
			from_hrid: seed.hrid.clone(),
			to_hrid: annotation.hrid.clone(),
			rel_type: "ANNOTATES".to_string(),
			properties: Default::default(),
		})
		.await
		.expect("add_relationship failed");

	// ANNOTATES is schema-declared but not in the default traversal
	// whitelist, so the default search does not surface the annotation as
	// a neighbor.
	let default_response = fixture
		.service
		.search(query_request("u1", "alpha beta gamma", 10))
		.await
		.expect("search failed");

	assert!(
		default_response
			.results
			.iter()
			.all(|result| result.source != SearchSource::GraphNeighbor)
	);

	let mut request = query_request("u1", "alpha beta gamma", 10);

	request.relation_types = Some(vec!["ANNOTATES".to_string()]);

	let explicit_response = fixture.service.search(request).await.expect("search failed");

	assert!(
		explicit_response
			.results
			.iter()
			.any(|result| result.source == SearchSource::GraphNeighbor
				&& result.memory.id == annotation.id)
	);
}

#[tokio::test]
async fn truncation_happens_after_the_merge_so_seeds_win() {
	let fixture = service();
	let seed = add_note(&fixture, "u1", "alpha beta gamma").await;
	let linked = add_note(&fixture, "u1", "linked context").await;

	fixture
		.service
		.add_relationship(AddRelationshipRequest {
			user_id: "u1".to_string(),
			from_hrid: seed.hrid.clone(),
			to_hrid: linked.hrid.clone(),
			rel_type: "RELATED_TO".to_string(),
			properties: Default::default(),
		})
		.await
		.expect("add_relationship failed");

	let response = fixture
		.service
		.search(query_request("u1", "alpha beta gamma", 1))
		.await
		.expect("search failed");

	assert_eq!(response.results.len(), 1);
	assert_eq!(response.results[0].memory.id, seed.id);
}

#[tokio::test]
async fn projection_controls_payload_shape() {
	let fixture = service();

	fixture
		.service
		.add_memory(AddMemoryRequest {
			user_id: "u1".to_string(),
			memory_type: "note".to_string(),
			payload: payload(json!({
				"statement": "alpha beta gamma",
				"details": "verbose body",
				"title": "short title",
			})),
			tags: Vec::new(),
		})
		.await
		.expect("add_memory failed");

	let mut anchors_only = query_request("u1", "alpha beta", 5);

	anchors_only.include_details = DetailLevel::AnchorsOnly;

	let response = fixture.service.search(anchors_only).await.expect("search failed");
	let first = &response.results[0];

	assert_eq!(first.memory.payload.len(), 1);
	assert_eq!(first.memory.payload.get("statement"), Some(&json!("alpha beta gamma")));

	let mut projected = query_request("u1", "alpha beta", 5);

	projected.include_details = DetailLevel::SelfDetails;
	projected.projection = [("note".to_string(), vec!["title".to_string()])].into();

	let response = fixture.service.search(projected).await.expect("search failed");
	let first = &response.results[0];

	// The allow-list keeps title; the anchor always survives; details is
	// pruned.
	assert_eq!(first.memory.payload.get("statement"), Some(&json!("alpha beta gamma")));
	assert_eq!(first.memory.payload.get("title"), Some(&json!("short title")));
	assert!(!first.memory.payload.contains_key("details"));

	let full = fixture
		.service
		.search(query_request("u1", "alpha beta", 5))
		.await
		.expect("search failed");

	assert!(full.results[0].memory.payload.contains_key("details"));
}

#[tokio::test]
async fn structural_filters_scope_vector_search() {
	let fixture = service();

	fixture
		.service
		.add_memory(AddMemoryRequest {
			user_id: "u1".to_string(),
			memory_type: "task".to_string(),
			payload: payload(json!({"statement": "ship the release", "status": "OPEN"})),
			tags: Vec::new(),
		})
		.await
		.expect("add_memory failed");
	fixture
		.service
		.add_memory(AddMemoryRequest {
			user_id: "u1".to_string(),
			memory_type: "task".to_string(),
			payload: payload(json!({"statement": "ship the hotfix", "status": "DONE"})),
			tags: Vec::new(),
		})
		.await
		.expect("add_memory failed");

	let mut request = query_request("u1", "ship", 10);

	request.filters = payload(json!({"entity.status": "OPEN"}));

	let response = fixture.service.search(request).await.expect("search failed");

	assert_eq!(response.results.len(), 1);
	assert_eq!(response.results[0].memory.payload.get("status"), Some(&json!("OPEN")));
}

#[tokio::test]
async fn modified_within_days_excludes_stale_memories() {
	use time::{Duration, OffsetDateTime};

	use mnema_storage::{graph::GraphStore, models::GraphNode, vector::VectorStore};

	let fixture = service();

	add_note(&fixture, "u1", "fresh note").await;

	// Backdate a memory by writing its stores directly; the public API
	// always stamps now.
	let mut stale = mnema_domain::Memory::new(
		"note",
		payload(json!({"statement": "stale note"})),
		"u1",
	);

	stale.hrid = Some("NOTE_ZZZ000".to_string());
	stale.created_at = OffsetDateTime::now_utc() - Duration::days(30);

	let stale_payload = stale.to_point_payload().expect("payload failed");
	let vector = fixture.embedder.embed_text("stale note");

	fixture
		.vector
		.upsert_point(stale.id, &vector, stale_payload)
		.await
		.expect("upsert failed");
	fixture
		.graph
		.add_node("Memory", &GraphNode {
			node_id: stale.id,
			label: "Memory".to_string(),
			user_id: "u1".to_string(),
			memory_type: "note".to_string(),
			hrid: stale.hrid.clone(),
			anchor: "stale note".to_string(),
			tags: Vec::new(),
			confidence: 0.8,
			is_valid: true,
			supersedes: None,
			superseded_by: None,
			created_at: stale.created_at,
			updated_at: stale.created_at,
		})
		.await
		.expect("add_node failed");

	let mut recent = scoped_request("u1", "note", 10);

	recent.modified_within_days = Some(7);

	let response = fixture.service.search(recent).await.expect("search failed");

	assert_eq!(response.results.len(), 1);
	assert_eq!(response.results[0].memory.payload.get("statement"), Some(&json!("fresh note")));

	let mut wide = scoped_request("u1", "note", 10);

	wide.modified_within_days = Some(90);

	let response = fixture.service.search(wide).await.expect("search failed");

	assert_eq!(response.results.len(), 2);
}
