use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

/// A stored vector point: the canonical `{core, entity}` payload keyed by
/// the memory id.
#[derive(Clone, Debug)]
pub struct PointRecord {
	pub id: Uuid,
	pub payload: Value,
}

/// A similarity hit. Scores are normalized to [0, 1] by the adapter.
#[derive(Clone, Debug)]
pub struct ScoredPoint {
	pub id: Uuid,
	pub score: f32,
	pub payload: Value,
}

/// The graph-side mirror of a memory: core metadata plus a denormalized
/// anchor string for cheap graph-side filtering. Deliberately never the
/// full entity payload.
#[derive(Clone, Debug, sqlx::FromRow)]
pub struct GraphNode {
	pub node_id: Uuid,
	pub label: String,
	pub user_id: String,
	pub memory_type: String,
	pub hrid: Option<String>,
	pub anchor: String,
	pub tags: Vec<String>,
	pub confidence: f32,
	pub is_valid: bool,
	pub supersedes: Option<Uuid>,
	pub superseded_by: Option<Uuid>,
	pub created_at: OffsetDateTime,
	pub updated_at: OffsetDateTime,
}

#[derive(Clone, Debug, sqlx::FromRow)]
pub struct GraphNeighbor {
	#[sqlx(flatten)]
	pub node: GraphNode,
	pub rel_type: String,
}

/// Structured node scan: user scoping is mandatory, everything else is
/// optional. Results come back most-recently-updated first.
#[derive(Clone, Debug)]
pub struct NodeFilter {
	pub user_id: String,
	pub memory_type: Option<String>,
	pub since: Option<OffsetDateTime>,
	pub limit: u32,
}

#[derive(Clone, Debug)]
pub struct NeighborQuery {
	pub rel_types: Option<Vec<String>>,
	pub direction: Direction,
	pub limit: u32,
	pub neighbor_label: Option<String>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Direction {
	In,
	Out,
	Any,
}
