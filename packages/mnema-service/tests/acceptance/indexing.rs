use serde_json::json;

use mnema_domain::{SchemaRegistry, hrid};
use mnema_service::{AddMemoryRequest, Error, GetMemoryRequest, MnemaService, Providers};
use mnema_storage::vector::VectorStore;

use super::{SCHEMA, add_note, payload, service};

#[tokio::test]
async fn indexing_round_trips_entity_payload_and_stamps_an_hrid() {
	let fixture = service();
	let added = fixture
		.service
		.add_memory(AddMemoryRequest {
			user_id: "u1".to_string(),
			memory_type: "note".to_string(),
			payload: payload(json!({"statement": "alpha beta gamma", "details": "long form"})),
			tags: vec!["greek".to_string()],
		})
		.await
		.expect("add_memory failed");
	let point = fixture
		.vector
		.get_point(added.id)
		.await
		.expect("get_point failed")
		.expect("point must exist after indexing");
	let entity = point.payload.get("entity").expect("payload must carry an entity object");

	assert_eq!(entity.get("statement"), Some(&json!("alpha beta gamma")));
	assert_eq!(entity.get("details"), Some(&json!("long form")));

	let core = point.payload.get("core").expect("payload must carry a core object");

	assert_eq!(core.get("user_id"), Some(&json!("u1")));
	assert_eq!(core.get("hrid"), Some(&json!(added.hrid.clone())));
	assert!(added.hrid.starts_with("NOTE_"));
	hrid::parse(&added.hrid).expect("issued hrid must parse");
}

#[tokio::test]
async fn indexing_writes_both_stores_exactly_once() {
	let fixture = service();
	let added = add_note(&fixture, "u1", "dual write check").await;

	assert_eq!(fixture.vector.len(), 1);
	assert_eq!(fixture.graph.node_count(), 1);
	assert!(fixture.graph.has_node(added.id));
}

#[tokio::test]
async fn empty_anchor_text_is_refused_before_any_write() {
	let fixture = service();
	let err = fixture
		.service
		.add_memory(AddMemoryRequest {
			user_id: "u1".to_string(),
			memory_type: "note".to_string(),
			payload: payload(json!({"statement": "   ", "details": "anchorless"})),
			tags: Vec::new(),
		})
		.await
		.expect_err("expected anchor validation failure");

	assert!(matches!(err, Error::Validation { .. }));
	assert!(fixture.vector.is_empty());
	assert_eq!(fixture.graph.node_count(), 0);
}

#[tokio::test]
async fn unknown_memory_type_is_refused_without_fallback() {
	let fixture = service();
	let err = fixture
		.service
		.add_memory(AddMemoryRequest {
			user_id: "u1".to_string(),
			memory_type: "wiki".to_string(),
			payload: payload(json!({"statement": "no default type exists"})),
			tags: Vec::new(),
		})
		.await
		.expect_err("expected schema failure");

	assert!(matches!(err, Error::Schema { .. }));
	assert!(err.to_string().contains("note"));
	assert!(fixture.vector.is_empty());
}

#[tokio::test]
async fn hrids_are_sequential_within_a_type() {
	let fixture = service();

	assert_eq!(add_note(&fixture, "u1", "first").await.hrid, "NOTE_AAA000");
	assert_eq!(add_note(&fixture, "u1", "second").await.hrid, "NOTE_AAA001");
	assert_eq!(add_note(&fixture, "u1", "third").await.hrid, "NOTE_AAA002");

	let task = fixture
		.service
		.add_memory(AddMemoryRequest {
			user_id: "u1".to_string(),
			memory_type: "task".to_string(),
			payload: payload(json!({"statement": "separate namespace"})),
			tags: Vec::new(),
		})
		.await
		.expect("add_memory failed");

	assert_eq!(task.hrid, "TASK_AAA000");
}

#[tokio::test]
async fn hrid_allocation_resumes_from_storage_after_restart() {
	let fixture = service();

	for ordinal in 0..6 {
		add_note(&fixture, "u1", &format!("note number {ordinal}")).await;
	}

	// A fresh service over the same stores models a process restart: the
	// in-memory counter is gone, storage still holds NOTE_AAA000..005.
	let restarted = MnemaService::with_providers(
		mnema_testkit::test_config(),
		SchemaRegistry::from_yaml_str(SCHEMA).expect("schema must load"),
		fixture.vector.clone(),
		fixture.graph.clone(),
		Providers::new(fixture.embedder.clone()),
	);
	let added = restarted
		.add_memory(AddMemoryRequest {
			user_id: "u1".to_string(),
			memory_type: "note".to_string(),
			payload: payload(json!({"statement": "post restart"})),
			tags: Vec::new(),
		})
		.await
		.expect("add_memory failed");

	assert_eq!(added.hrid, "NOTE_AAA006");
}

#[tokio::test]
async fn failed_hrid_seeding_degrades_to_a_fresh_counter() {
	let fixture = service();

	add_note(&fixture, "u1", "pre-existing").await;

	let restarted = MnemaService::with_providers(
		mnema_testkit::test_config(),
		SchemaRegistry::from_yaml_str(SCHEMA).expect("schema must load"),
		fixture.vector.clone(),
		fixture.graph.clone(),
		Providers::new(fixture.embedder.clone()),
	);

	fixture.vector.fail_searches(true);

	let added = restarted
		.add_memory(AddMemoryRequest {
			user_id: "u1".to_string(),
			memory_type: "note".to_string(),
			payload: payload(json!({"statement": "degraded but available"})),
			tags: Vec::new(),
		})
		.await
		.expect("add_memory must survive a failed seed lookup");

	assert_eq!(added.hrid, "NOTE_AAA000");
}

#[tokio::test]
async fn get_memory_returns_the_full_stored_payload() {
	let fixture = service();
	let added = fixture
		.service
		.add_memory(AddMemoryRequest {
			user_id: "u1".to_string(),
			memory_type: "task".to_string(),
			payload: payload(json!({"statement": "apply defaults"})),
			tags: Vec::new(),
		})
		.await
		.expect("add_memory failed");
	let memory = fixture
		.service
		.get_memory(GetMemoryRequest { user_id: "u1".to_string(), hrid: added.hrid.clone() })
		.await
		.expect("get_memory failed");

	assert_eq!(memory.id, added.id);
	assert_eq!(memory.memory_type, "task");
	assert_eq!(memory.payload.get("statement"), Some(&json!("apply defaults")));
	// The declared default landed in storage.
	assert_eq!(memory.payload.get("status"), Some(&json!("OPEN")));

	let err = fixture
		.service
		.get_memory(GetMemoryRequest { user_id: "u2".to_string(), hrid: added.hrid })
		.await
		.expect_err("foreign memories must read as not found");

	assert!(matches!(err, Error::NotFound { .. }));
}
