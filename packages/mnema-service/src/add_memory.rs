use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::{Error, MEMORY_NODE_LABEL, MnemaService, Result};
use mnema_domain::Memory;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AddMemoryRequest {
	pub user_id: String,
	pub memory_type: String,
	pub payload: Map<String, Value>,
	#[serde(default)]
	pub tags: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AddMemoryResponse {
	pub id: Uuid,
	pub hrid: String,
}

impl MnemaService {
	/// Validates a payload against the schema and runs the indexing
	/// pipeline. Returns the canonical id plus the allocated HRID.
	pub async fn add_memory(&self, req: AddMemoryRequest) -> Result<AddMemoryResponse> {
		let user_id = req.user_id.trim();

		if user_id.is_empty() {
			return Err(Error::Validation { message: "user_id is required.".to_string() });
		}
		if req.memory_type.trim().is_empty() {
			return Err(Error::Validation { message: "memory_type is required.".to_string() });
		}
		if req.payload.is_empty() {
			return Err(Error::Validation { message: "payload must not be empty.".to_string() });
		}

		let mut memory = self.schema.create_memory(&req.memory_type, &req.payload, user_id)?;

		memory.merge_tags(&req.tags);

		let id = self.index_memory(&mut memory).await?;
		let hrid = memory.hrid.ok_or_else(|| Error::Processing {
			message: format!("indexing returned without an HRID; memory_id={id}"),
		})?;

		Ok(AddMemoryResponse { id, hrid })
	}

	/// The single writer: resolve anchor text, allocate an HRID, embed,
	/// upsert the vector point, mirror the graph node. Exactly one write
	/// per store; a partial failure surfaces to the caller, and retrying
	/// the whole operation is safe because both writes upsert by id.
	pub(crate) async fn index_memory(&self, memory: &mut Memory) -> Result<Uuid> {
		let anchor = self.schema.build_anchor_text(memory).map_err(|err| Error::Processing {
			message: format!("anchor resolution failed: {err}"),
		})?;

		if memory.hrid.is_none() {
			memory.hrid = Some(self.next_hrid(&memory.memory_type).await?);
		}

		let vector = self.embed_one(&anchor).await?;

		self.vector.ensure_collection().await?;

		let payload = memory.to_point_payload()?;
		let id = self.vector.upsert_point(memory.id, &vector, payload).await.map_err(|err| {
			Error::Processing {
				message: format!(
					"vector upsert failed; memory_id={} memory_type={}: {err}",
					memory.id, memory.memory_type
				),
			}
		})?;
		let node = self.graph_node(memory, &anchor);

		self.graph.add_node(MEMORY_NODE_LABEL, &node).await.map_err(|err| Error::Processing {
			message: format!("graph mirror failed; memory_id={}: {err}", memory.id),
		})?;

		Ok(id)
	}
}
