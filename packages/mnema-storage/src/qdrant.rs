use std::collections::HashMap;

use qdrant_client::{
	Qdrant,
	client::Payload,
	qdrant::{
		Condition, CreateCollectionBuilder, DeletePointsBuilder, Distance, Filter,
		GetPointsBuilder, PointId, PointStruct, Query, QueryPointsBuilder, Range,
		ScrollPointsBuilder, UpsertPointsBuilder, Value as QdrantValue, VectorParamsBuilder,
		point_id::PointIdOptions, value::Kind,
	},
};
use serde_json::{Map, Value as JsonValue};
use uuid::Uuid;

use crate::{
	BoxFuture, Error, Result,
	filter::{is_range_condition, lookup_path},
	models::{PointRecord, ScoredPoint},
	vector::VectorStore,
};

const SCROLL_PAGE: u32 = 1_024;

pub struct QdrantStore {
	pub client: Qdrant,
	pub collection: String,
	pub vector_dim: u32,
}
impl QdrantStore {
	pub fn new(cfg: &mnema_config::Qdrant) -> Result<Self> {
		let client = Qdrant::from_url(&cfg.url).build()?;

		Ok(Self { client, collection: cfg.collection.clone(), vector_dim: cfg.vector_dim })
	}
}
impl VectorStore for QdrantStore {
	fn ensure_collection<'a>(&'a self) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			if self.client.collection_exists(&self.collection).await? {
				return Ok(());
			}

			let builder = CreateCollectionBuilder::new(self.collection.clone()).vectors_config(
				VectorParamsBuilder::new(self.vector_dim as u64, Distance::Cosine),
			);

			match self.client.create_collection(builder).await {
				Ok(_) => Ok(()),
				// Lost a creation race; the collection existing is all that matters.
				Err(err) =>
					if self.client.collection_exists(&self.collection).await? {
						Ok(())
					} else {
						Err(err.into())
					},
			}
		})
	}

	fn upsert_point<'a>(
		&'a self,
		id: Uuid,
		vector: &'a [f32],
		payload: JsonValue,
	) -> BoxFuture<'a, Result<Uuid>> {
		Box::pin(async move {
			if vector.len() != self.vector_dim as usize {
				return Err(Error::InvalidArgument(format!(
					"vector dimension mismatch: got {}, collection expects {}",
					vector.len(),
					self.vector_dim
				)));
			}

			let payload = Payload::try_from(payload).map_err(|err| {
				Error::InvalidArgument(format!("point payload must be a JSON object: {err}"))
			})?;
			let point = PointStruct::new(id.to_string(), vector.to_vec(), payload);

			self.client
				.upsert_points(
					UpsertPointsBuilder::new(self.collection.clone(), vec![point]).wait(true),
				)
				.await?;

			Ok(id)
		})
	}

	fn search_points<'a>(
		&'a self,
		vector: &'a [f32],
		limit: u32,
		filters: &'a Map<String, JsonValue>,
	) -> BoxFuture<'a, Result<Vec<ScoredPoint>>> {
		Box::pin(async move {
			let mut request = QueryPointsBuilder::new(self.collection.clone())
				.query(Query::new_nearest(vector.to_vec()))
				.limit(limit as u64)
				.with_payload(true);

			if let Some(filter) = build_filter(filters)? {
				request = request.filter(filter);
			}

			let response = self.client.query(request).await?;
			let mut hits = Vec::with_capacity(response.result.len());

			for point in response.result {
				let Some(id) = point.id.as_ref().and_then(point_id_to_uuid) else { continue };

				hits.push(ScoredPoint {
					id,
					score: point.score.clamp(0.0, 1.0),
					payload: payload_to_json(&point.payload),
				});
			}

			Ok(hits)
		})
	}

	fn get_point<'a>(&'a self, id: Uuid) -> BoxFuture<'a, Result<Option<PointRecord>>> {
		Box::pin(async move {
			let response = self
				.client
				.get_points(
					GetPointsBuilder::new(
						self.collection.clone(),
						vec![PointId::from(id.to_string())],
					)
					.with_payload(true),
				)
				.await?;

			Ok(response
				.result
				.into_iter()
				.next()
				.map(|point| PointRecord { id, payload: payload_to_json(&point.payload) }))
		})
	}

	fn delete_points<'a>(&'a self, ids: &'a [Uuid]) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			if ids.is_empty() {
				return Ok(());
			}

			let filter = Filter::must([Condition::has_id(ids.iter().map(|id| id.to_string()))]);
			let delete =
				DeletePointsBuilder::new(self.collection.clone()).points(filter).wait(true);

			self.client.delete_points(delete).await?;

			Ok(())
		})
	}

	fn find_by_hrid<'a>(
		&'a self,
		user_id: &'a str,
		hrid: &'a str,
	) -> BoxFuture<'a, Result<Option<PointRecord>>> {
		Box::pin(async move {
			let filter = Filter::must([
				Condition::matches("core.user_id", user_id.to_string()),
				Condition::matches("core.hrid", hrid.to_string()),
			]);
			let response = self
				.client
				.scroll(
					ScrollPointsBuilder::new(self.collection.clone())
						.filter(filter)
						.limit(1)
						.with_payload(true),
				)
				.await?;

			Ok(response.result.into_iter().next().and_then(|point| {
				let id = point.id.as_ref().and_then(point_id_to_uuid)?;

				Some(PointRecord { id, payload: payload_to_json(&point.payload) })
			}))
		})
	}

	fn list_hrids<'a>(&'a self, memory_type: &'a str) -> BoxFuture<'a, Result<Vec<String>>> {
		Box::pin(async move {
			let mut hrids = Vec::new();
			let mut offset: Option<PointId> = None;

			loop {
				let mut request = ScrollPointsBuilder::new(self.collection.clone())
					.filter(Filter::must([Condition::matches(
						"core.memory_type",
						memory_type.to_string(),
					)]))
					.limit(SCROLL_PAGE)
					.with_payload(true);

				if let Some(offset) = offset.take() {
					request = request.offset(offset);
				}

				let response = self.client.scroll(request).await?;

				for point in &response.result {
					let payload = payload_to_json(&point.payload);

					if let Some(hrid) = lookup_path(&payload, "core.hrid").and_then(JsonValue::as_str)
					{
						hrids.push(hrid.to_string());
					}
				}

				match response.next_page_offset {
					Some(next) => offset = Some(next),
					None => break,
				}
			}

			Ok(hrids)
		})
	}
}

fn build_filter(filters: &Map<String, JsonValue>) -> Result<Option<Filter>> {
	if filters.is_empty() {
		return Ok(None);
	}

	let mut conditions = Vec::with_capacity(filters.len());

	for (key, expected) in filters {
		if is_range_condition(expected) {
			let Some(bounds) = expected.as_object() else { continue };
			let mut range = Range::default();

			for (bound, limit) in bounds {
				let Some(limit) = limit.as_f64() else {
					return Err(Error::InvalidArgument(format!(
						"range bound '{bound}' for filter '{key}' must be numeric"
					)));
				};

				match bound.as_str() {
					"gte" => range.gte = Some(limit),
					"gt" => range.gt = Some(limit),
					"lte" => range.lte = Some(limit),
					"lt" => range.lt = Some(limit),
					_ => (),
				}
			}

			conditions.push(Condition::range(key.clone(), range));

			continue;
		}

		match expected {
			JsonValue::String(raw) => conditions.push(Condition::matches(key.clone(), raw.clone())),
			JsonValue::Bool(flag) => conditions.push(Condition::matches(key.clone(), *flag)),
			JsonValue::Number(number) => {
				let Some(number) = number.as_i64() else {
					return Err(Error::InvalidArgument(format!(
						"filter '{key}' must be an integer; use a range object for floats"
					)));
				};

				conditions.push(Condition::matches(key.clone(), number));
			},
			JsonValue::Array(values) => {
				let mut keywords = Vec::with_capacity(values.len());

				for value in values {
					let Some(raw) = value.as_str() else {
						return Err(Error::InvalidArgument(format!(
							"filter '{key}' arrays must contain only strings"
						)));
					};

					keywords.push(raw.to_string());
				}

				conditions.push(Condition::matches(key.clone(), keywords));
			},
			JsonValue::Null => conditions.push(Condition::is_null(key.clone())),
			JsonValue::Object(_) => {
				return Err(Error::InvalidArgument(format!(
					"filter '{key}' objects must carry only gte/gt/lte/lt bounds"
				)));
			},
		}
	}

	Ok(Some(Filter::must(conditions)))
}

fn point_id_to_uuid(point_id: &PointId) -> Option<Uuid> {
	match &point_id.point_id_options {
		Some(PointIdOptions::Uuid(id)) => Uuid::parse_str(id).ok(),
		_ => None,
	}
}

fn payload_to_json(payload: &HashMap<String, QdrantValue>) -> JsonValue {
	JsonValue::Object(
		payload.iter().map(|(key, value)| (key.clone(), qdrant_value_to_json(value))).collect(),
	)
}

fn qdrant_value_to_json(value: &QdrantValue) -> JsonValue {
	match &value.kind {
		Some(Kind::BoolValue(flag)) => JsonValue::Bool(*flag),
		Some(Kind::IntegerValue(number)) => JsonValue::from(*number),
		Some(Kind::DoubleValue(number)) =>
			serde_json::Number::from_f64(*number).map(JsonValue::Number).unwrap_or(JsonValue::Null),
		Some(Kind::StringValue(text)) => JsonValue::String(text.clone()),
		Some(Kind::ListValue(list)) =>
			JsonValue::Array(list.values.iter().map(qdrant_value_to_json).collect()),
		Some(Kind::StructValue(object)) => JsonValue::Object(
			object.fields.iter().map(|(key, value)| (key.clone(), qdrant_value_to_json(value))).collect(),
		),
		Some(Kind::NullValue(_)) | None => JsonValue::Null,
	}
}
