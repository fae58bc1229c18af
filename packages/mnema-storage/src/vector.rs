use serde_json::{Map, Value};
use uuid::Uuid;

use crate::{
	BoxFuture, Result,
	models::{PointRecord, ScoredPoint},
};

/// Narrow contract over the vector engine. The vector store is the
/// primary store: it holds the full `{core, entity}` payload and decides
/// whether a memory exists.
pub trait VectorStore
where
	Self: Send + Sync,
{
	/// Idempotent collection creation.
	fn ensure_collection<'a>(&'a self) -> BoxFuture<'a, Result<()>>;

	/// Upsert by id; re-running the same write is a no-op overwrite.
	fn upsert_point<'a>(
		&'a self,
		id: Uuid,
		vector: &'a [f32],
		payload: Value,
	) -> BoxFuture<'a, Result<Uuid>>;

	/// Similarity search; `filters` is an equality/range map over payload
	/// sub-keys (see `crate::filter::payload_matches`). Hit scores are in
	/// [0, 1].
	fn search_points<'a>(
		&'a self,
		vector: &'a [f32],
		limit: u32,
		filters: &'a Map<String, Value>,
	) -> BoxFuture<'a, Result<Vec<ScoredPoint>>>;

	fn get_point<'a>(&'a self, id: Uuid) -> BoxFuture<'a, Result<Option<PointRecord>>>;

	fn delete_points<'a>(&'a self, ids: &'a [Uuid]) -> BoxFuture<'a, Result<()>>;

	/// User-scoped HRID lookup; the HRID is the external handle, the point
	/// id stays internal.
	fn find_by_hrid<'a>(
		&'a self,
		user_id: &'a str,
		hrid: &'a str,
	) -> BoxFuture<'a, Result<Option<PointRecord>>>;

	/// All HRIDs ever issued for a memory type, used to reseed the HRID
	/// allocator after a process restart.
	fn list_hrids<'a>(&'a self, memory_type: &'a str) -> BoxFuture<'a, Result<Vec<String>>>;
}
