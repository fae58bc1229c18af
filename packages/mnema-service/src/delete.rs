use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::{Error, MEMORY_NODE_LABEL, MnemaService, Result, get::normalize_hrid};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeleteRequest {
	pub user_id: String,
	pub hrid: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeleteResponse {
	pub id: Uuid,
	pub hrid: String,
	/// Set when the vector delete succeeded but the graph mirror could not
	/// be removed. The memory is gone; the graph store is stale until the
	/// next write.
	pub graph_warning: Option<String>,
}

impl MnemaService {
	/// Deletes by HRID with ownership enforced by the user-scoped lookup.
	/// The vector store is primary: its delete must succeed; a graph
	/// failure afterwards is reported as a warning, not an error.
	pub async fn delete_memory(&self, req: DeleteRequest) -> Result<DeleteResponse> {
		let user_id = req.user_id.trim();

		if user_id.is_empty() {
			return Err(Error::Validation { message: "user_id is required.".to_string() });
		}

		let hrid = normalize_hrid(&req.hrid)?;
		let point = self.vector.find_by_hrid(user_id, &hrid).await?.ok_or_else(|| {
			Error::NotFound { message: format!("memory not found; hrid={hrid}") }
		})?;

		self.vector.delete_points(&[point.id]).await.map_err(|err| Error::Store {
			message: format!("vector delete failed; hrid={hrid} id={}: {err}", point.id),
		})?;

		let graph_warning = match self.graph.delete_node(MEMORY_NODE_LABEL, point.id).await {
			Ok(()) => None,
			Err(err) => {
				warn!(
					memory_id = %point.id,
					hrid = hrid.as_str(),
					error = %err,
					"Graph delete failed after vector delete; graph mirror is stale.",
				);

				Some(err.to_string())
			},
		};

		Ok(DeleteResponse { id: point.id, hrid, graph_warning })
	}
}
