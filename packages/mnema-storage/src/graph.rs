use serde_json::{Map, Value};
use uuid::Uuid;

use crate::{
	BoxFuture, Error, Result,
	models::{GraphNeighbor, GraphNode, NeighborQuery, NodeFilter},
};

/// Narrow contract over the graph engine. Nodes are lightweight mirrors
/// of memories; relationships are typed directed edges between them.
pub trait GraphStore
where
	Self: Send + Sync,
{
	/// Upsert by node id under the given label.
	fn add_node<'a>(&'a self, label: &'a str, node: &'a GraphNode) -> BoxFuture<'a, Result<()>>;

	fn add_relationship<'a>(
		&'a self,
		from_label: &'a str,
		to_label: &'a str,
		rel_type: &'a str,
		from_id: Uuid,
		to_id: Uuid,
		properties: &'a Map<String, Value>,
	) -> BoxFuture<'a, Result<()>>;

	/// Scan nodes for a user, most-recently-updated first, capped at
	/// `filter.limit`.
	fn fetch_nodes<'a>(
		&'a self,
		label: &'a str,
		filter: &'a NodeFilter,
	) -> BoxFuture<'a, Result<Vec<GraphNode>>>;

	fn neighbors<'a>(
		&'a self,
		label: &'a str,
		node_id: Uuid,
		query: &'a NeighborQuery,
	) -> BoxFuture<'a, Result<Vec<GraphNeighbor>>>;

	/// Deleting a node that still has relationships is a `Conflict`, never
	/// a silent success; deleting an absent node succeeds.
	fn delete_node<'a>(&'a self, label: &'a str, node_id: Uuid) -> BoxFuture<'a, Result<()>>;
}

/// Labels must be identifier-shaped and must not look like an id. Catches
/// the classic caller bug of swapping the label and id arguments.
pub fn validate_label(label: &str) -> Result<()> {
	if looks_like_uuid(label) {
		return Err(Error::InvalidArgument(format!(
			"node label must be a node type, not a UUID; got '{label}'"
		)));
	}
	if !is_identifier(label) {
		return Err(Error::InvalidArgument(format!(
			"node label must match [A-Za-z_][A-Za-z0-9_]*; got '{label}'"
		)));
	}

	Ok(())
}

pub fn validate_rel_type(rel_type: &str) -> Result<()> {
	if !is_identifier(rel_type) {
		return Err(Error::InvalidArgument(format!(
			"relationship type must match [A-Za-z_][A-Za-z0-9_]*; got '{rel_type}'"
		)));
	}

	Ok(())
}

fn is_identifier(raw: &str) -> bool {
	let mut chars = raw.chars();
	let Some(first) = chars.next() else { return false };

	(first.is_ascii_alphabetic() || first == '_')
		&& chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn looks_like_uuid(raw: &str) -> bool {
	Uuid::parse_str(raw).is_ok()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn uuid_shaped_labels_are_rejected() {
		let err = validate_label("550e8400-e29b-41d4-a716-446655440000")
			.expect_err("expected rejection");

		assert!(matches!(err, Error::InvalidArgument(_)));
	}

	#[test]
	fn labels_must_be_identifiers() {
		assert!(validate_label("Memory").is_ok());
		assert!(validate_label("graph_node").is_ok());
		assert!(validate_label("").is_err());
		assert!(validate_label("bad label").is_err());
		assert!(validate_label("1memory").is_err());
	}

	#[test]
	fn rel_types_must_be_identifiers() {
		assert!(validate_rel_type("RELATED_TO").is_ok());
		assert!(validate_rel_type("HAS DOCUMENT").is_err());
		assert!(validate_rel_type("").is_err());
	}
}
