use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{Error, MEMORY_NODE_LABEL, MnemaService, Result, get::normalize_hrid};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AddRelationshipRequest {
	pub user_id: String,
	pub from_hrid: String,
	pub to_hrid: String,
	pub rel_type: String,
	#[serde(default)]
	pub properties: Map<String, Value>,
}

impl MnemaService {
	/// Links two of the caller's memories with a schema-declared predicate.
	/// Undeclared predicates are rejected so the edge vocabulary stays
	/// curated.
	pub async fn add_relationship(&self, req: AddRelationshipRequest) -> Result<()> {
		let user_id = req.user_id.trim();

		if user_id.is_empty() {
			return Err(Error::Validation { message: "user_id is required.".to_string() });
		}

		let rel_type = req.rel_type.trim().to_uppercase();

		if !self.schema.has_relation(&rel_type) {
			return Err(Error::Validation {
				message: format!(
					"Relationship predicate '{}' is not declared in the schema; declared: [{}].",
					req.rel_type,
					self.schema.relation_names().join(", ")
				),
			});
		}

		let from_hrid = normalize_hrid(&req.from_hrid)?;
		let to_hrid = normalize_hrid(&req.to_hrid)?;

		if from_hrid == to_hrid {
			return Err(Error::Validation {
				message: "a memory cannot relate to itself.".to_string(),
			});
		}

		let from = self.vector.find_by_hrid(user_id, &from_hrid).await?.ok_or_else(|| {
			Error::NotFound { message: format!("memory not found; hrid={from_hrid}") }
		})?;
		let to = self.vector.find_by_hrid(user_id, &to_hrid).await?.ok_or_else(|| {
			Error::NotFound { message: format!("memory not found; hrid={to_hrid}") }
		})?;

		self.graph
			.add_relationship(
				MEMORY_NODE_LABEL,
				MEMORY_NODE_LABEL,
				&rel_type,
				from.id,
				to.id,
				&req.properties,
			)
			.await?;

		Ok(())
	}
}
