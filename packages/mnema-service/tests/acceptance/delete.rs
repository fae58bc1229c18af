use mnema_service::{AddRelationshipRequest, DeleteRequest, Error, GetMemoryRequest};

use super::{add_note, service};

#[tokio::test]
async fn delete_removes_the_memory_from_both_stores() {
	let fixture = service();
	let added = add_note(&fixture, "u1", "short lived").await;
	let response = fixture
		.service
		.delete_memory(DeleteRequest { user_id: "u1".to_string(), hrid: added.hrid.clone() })
		.await
		.expect("delete failed");

	assert_eq!(response.id, added.id);
	assert!(response.graph_warning.is_none());
	assert!(fixture.vector.is_empty());
	assert!(!fixture.graph.has_node(added.id));

	let err = fixture
		.service
		.get_memory(GetMemoryRequest { user_id: "u1".to_string(), hrid: added.hrid })
		.await
		.expect_err("deleted memory must be gone");

	assert!(matches!(err, Error::NotFound { .. }));
}

#[tokio::test]
async fn delete_enforces_ownership() {
	let fixture = service();
	let added = add_note(&fixture, "u1", "not yours").await;
	let err = fixture
		.service
		.delete_memory(DeleteRequest { user_id: "u2".to_string(), hrid: added.hrid })
		.await
		.expect_err("expected ownership rejection");

	assert!(matches!(err, Error::NotFound { .. }));
	assert_eq!(fixture.vector.len(), 1);
	assert!(fixture.graph.has_node(added.id));
}

#[tokio::test]
async fn graph_delete_blocked_by_relationships_is_a_warning_not_a_failure() {
	let fixture = service();
	let linked = add_note(&fixture, "u1", "still linked").await;
	let other = add_note(&fixture, "u1", "the other end").await;

	fixture
		.service
		.add_relationship(AddRelationshipRequest {
			user_id: "u1".to_string(),
			from_hrid: linked.hrid.clone(),
			to_hrid: other.hrid.clone(),
			rel_type: "RELATED_TO".to_string(),
			properties: Default::default(),
		})
		.await
		.expect("add_relationship failed");

	let response = fixture
		.service
		.delete_memory(DeleteRequest { user_id: "u1".to_string(), hrid: linked.hrid })
		.await
		.expect("delete must succeed with a warning");

	// Vector store is primary: the memory is gone even though the graph
	// mirror is stuck behind its relationships.
	assert!(response.graph_warning.is_some());
	assert_eq!(fixture.vector.len(), 1);
	assert!(fixture.graph.has_node(linked.id));
}

#[tokio::test]
async fn malformed_hrids_fail_validation() {
	let fixture = service();
	let err = fixture
		.service
		.delete_memory(DeleteRequest {
			user_id: "u1".to_string(),
			hrid: "not-an-hrid".to_string(),
		})
		.await
		.expect_err("expected hrid validation failure");

	assert!(matches!(err, Error::Validation { .. }));
}
