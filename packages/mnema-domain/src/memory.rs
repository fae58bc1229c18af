use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{Error, Result, time_serde};

pub const DEFAULT_CONFIDENCE: f32 = 0.8;

/// A stored memory. `payload` is the open, schema-validated map of
/// type-specific fields; everything else is core metadata shared by all
/// memory types.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Memory {
	pub id: Uuid,
	pub hrid: Option<String>,
	pub user_id: String,
	pub memory_type: String,
	pub payload: Map<String, Value>,
	pub tags: Vec<String>,
	pub confidence: f32,
	pub is_valid: bool,
	#[serde(with = "crate::time_serde")]
	pub created_at: OffsetDateTime,
	pub supersedes: Option<Uuid>,
	pub superseded_by: Option<Uuid>,
}
impl Memory {
	pub fn new(memory_type: &str, payload: Map<String, Value>, user_id: &str) -> Self {
		Self {
			id: Uuid::new_v4(),
			hrid: None,
			user_id: user_id.to_string(),
			memory_type: memory_type.to_string(),
			payload,
			tags: Vec::new(),
			confidence: DEFAULT_CONFIDENCE,
			is_valid: true,
			created_at: OffsetDateTime::now_utc(),
			supersedes: None,
			superseded_by: None,
		}
	}

	/// Merges tags into the existing set, deduplicating while preserving
	/// first-seen order.
	pub fn merge_tags<I, S>(&mut self, tags: I)
	where
		I: IntoIterator<Item = S>,
		S: AsRef<str>,
	{
		for tag in tags {
			let tag = tag.as_ref().trim();

			if tag.is_empty() {
				continue;
			}
			if !self.tags.iter().any(|existing| existing == tag) {
				self.tags.push(tag.to_string());
			}
		}
	}

	/// Vector-store point payload. The `{core, entity}` split is a hard
	/// external contract: `core` holds shared metadata, `entity` holds the
	/// full type-specific payload.
	pub fn to_point_payload(&self) -> Result<Value> {
		let created_at = format_timestamp(self.created_at)?;

		Ok(json!({
			"core": {
				"id": self.id.to_string(),
				"user_id": self.user_id,
				"memory_type": self.memory_type,
				"tags": self.tags,
				"confidence": self.confidence,
				"is_valid": self.is_valid,
				"created_at": created_at,
				"created_at_ts": self.created_at.unix_timestamp(),
				"hrid": self.hrid,
				"supersedes": self.supersedes.map(|id| id.to_string()),
				"superseded_by": self.superseded_by.map(|id| id.to_string()),
			},
			"entity": Value::Object(self.payload.clone()),
		}))
	}

	/// Rebuilds a memory from a stored point payload. Payloads are written
	/// only by the indexer, so a missing `core` object or unparseable field
	/// is storage corruption, not a tolerable variant.
	pub fn from_point_payload(id: Uuid, payload: &Value) -> Result<Self> {
		let core = payload.get("core").and_then(Value::as_object).ok_or_else(|| {
			Error::Validation { message: format!("Point payload is missing core object; id={id}") }
		})?;
		let entity = match payload.get("entity") {
			None | Some(Value::Null) => Map::new(),
			Some(Value::Object(map)) => map.clone(),
			Some(_) => {
				return Err(Error::Validation {
					message: format!("Point payload entity must be an object; id={id}"),
				});
			},
		};
		let user_id = core_str(core, "user_id", id)?;
		let memory_type = core_str(core, "memory_type", id)?;
		let created_at_raw = core_str(core, "created_at", id)?;
		let created_at =
			time_serde::parse_rfc3339(&created_at_raw).map_err(|err| Error::Validation {
				message: format!("Point payload created_at is not RFC3339; id={id} error={err}"),
			})?;
		let tags = core
			.get("tags")
			.and_then(Value::as_array)
			.map(|values| {
				values.iter().filter_map(Value::as_str).map(str::to_string).collect::<Vec<_>>()
			})
			.unwrap_or_default();
		let confidence = core
			.get("confidence")
			.and_then(Value::as_f64)
			.map(|value| value as f32)
			.unwrap_or(DEFAULT_CONFIDENCE);
		let is_valid = core.get("is_valid").and_then(Value::as_bool).unwrap_or(true);
		let hrid = core.get("hrid").and_then(Value::as_str).map(str::to_string);
		let supersedes = core_uuid(core, "supersedes", id)?;
		let superseded_by = core_uuid(core, "superseded_by", id)?;

		Ok(Self {
			id,
			hrid,
			user_id,
			memory_type,
			payload: entity,
			tags,
			confidence,
			is_valid,
			created_at,
			supersedes,
			superseded_by,
		})
	}
}

/// A retrieval hit: a memory plus its score and the pipeline stage that
/// produced it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SearchResult {
	pub memory: Memory,
	pub score: f32,
	pub source: SearchSource,
	#[serde(default)]
	pub metadata: Map<String, Value>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchSource {
	VectorSearch,
	GraphQuery,
	GraphRerank,
	GraphNeighbor,
}
impl SearchSource {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::VectorSearch => "vector_search",
			Self::GraphQuery => "graph_query",
			Self::GraphRerank => "graph_rerank",
			Self::GraphNeighbor => "graph_neighbor",
		}
	}
}

pub fn format_timestamp(value: OffsetDateTime) -> Result<String> {
	time_serde::format_rfc3339(value).map_err(|err| Error::Validation {
		message: format!("Failed to format timestamp: {err}"),
	})
}

fn core_str(core: &Map<String, Value>, key: &str, id: Uuid) -> Result<String> {
	core.get(key).and_then(Value::as_str).map(str::to_string).ok_or_else(|| Error::Validation {
		message: format!("Point payload core.{key} is missing or not a string; id={id}"),
	})
}

fn core_uuid(core: &Map<String, Value>, key: &str, id: Uuid) -> Result<Option<Uuid>> {
	match core.get(key) {
		None | Some(Value::Null) => Ok(None),
		Some(Value::String(raw)) => Uuid::parse_str(raw).map(Some).map_err(|_| Error::Validation {
			message: format!("Point payload core.{key} is not a UUID; id={id}"),
		}),
		Some(_) => Err(Error::Validation {
			message: format!("Point payload core.{key} must be a string; id={id}"),
		}),
	}
}
