use serde::{Deserialize, Serialize};

use crate::{Error, MnemaService, Result};
use mnema_domain::{Memory, hrid};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GetMemoryRequest {
	pub user_id: String,
	pub hrid: String,
}

impl MnemaService {
	/// HRID-scoped fetch from the vector store, which is authoritative for
	/// existence. The lookup is user-scoped, so foreign memories read as
	/// not found.
	pub async fn get_memory(&self, req: GetMemoryRequest) -> Result<Memory> {
		let user_id = req.user_id.trim();

		if user_id.is_empty() {
			return Err(Error::Validation { message: "user_id is required.".to_string() });
		}

		let hrid = normalize_hrid(&req.hrid)?;
		let point = self.vector.find_by_hrid(user_id, &hrid).await?.ok_or_else(|| {
			Error::NotFound { message: format!("memory not found; hrid={hrid}") }
		})?;

		Ok(Memory::from_point_payload(point.id, &point.payload)?)
	}
}

pub(crate) fn normalize_hrid(raw: &str) -> Result<String> {
	let hrid = raw.trim().to_uppercase();

	hrid::parse(&hrid)
		.map_err(|err| Error::Validation { message: err.to_string() })?;

	Ok(hrid)
}
