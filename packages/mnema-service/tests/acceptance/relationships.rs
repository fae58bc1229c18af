use mnema_service::{AddRelationshipRequest, Error};

use super::{add_note, service};

#[tokio::test]
async fn undeclared_predicates_are_rejected_with_the_declared_set() {
	let fixture = service();
	let from = add_note(&fixture, "u1", "relationship source").await;
	let to = add_note(&fixture, "u1", "relationship target").await;
	let err = fixture
		.service
		.add_relationship(AddRelationshipRequest {
			user_id: "u1".to_string(),
			from_hrid: from.hrid,
			to_hrid: to.hrid,
			rel_type: "MENTIONS".to_string(),
			properties: Default::default(),
		})
		.await
		.expect_err("expected predicate rejection");

	assert!(matches!(err, Error::Validation { .. }));

	let message = err.to_string();

	assert!(message.contains("MENTIONS"));
	assert!(message.contains("RELATED_TO"));
}

#[tokio::test]
async fn relationships_cannot_cross_user_boundaries() {
	let fixture = service();
	let mine = add_note(&fixture, "u1", "my memory").await;
	let theirs = add_note(&fixture, "u2", "their memory").await;
	let err = fixture
		.service
		.add_relationship(AddRelationshipRequest {
			user_id: "u1".to_string(),
			from_hrid: mine.hrid,
			to_hrid: theirs.hrid,
			rel_type: "RELATED_TO".to_string(),
			properties: Default::default(),
		})
		.await
		.expect_err("expected cross-user rejection");

	assert!(matches!(err, Error::NotFound { .. }));
}

#[tokio::test]
async fn self_links_are_rejected() {
	let fixture = service();
	let memory = add_note(&fixture, "u1", "loner").await;
	let err = fixture
		.service
		.add_relationship(AddRelationshipRequest {
			user_id: "u1".to_string(),
			from_hrid: memory.hrid.clone(),
			to_hrid: memory.hrid,
			rel_type: "RELATED_TO".to_string(),
			properties: Default::default(),
		})
		.await
		.expect_err("expected self-link rejection");

	assert!(matches!(err, Error::Validation { .. }));
}

#[tokio::test]
async fn predicate_names_are_case_normalized() {
	let fixture = service();
	let from = add_note(&fixture, "u1", "lowercase source").await;
	let to = add_note(&fixture, "u1", "lowercase target").await;

	fixture
		.service
		.add_relationship(AddRelationshipRequest {
			user_id: "u1".to_string(),
			from_hrid: from.hrid,
			to_hrid: to.hrid,
			rel_type: "related_to".to_string(),
			properties: Default::default(),
		})
		.await
		.expect("declared predicate in any case must be accepted");
}
