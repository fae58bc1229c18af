use serde_json::{Map, Value};

/// Evaluates a payload filter map against a stored point payload. Keys are
/// dot-separated sub-key paths (`core.user_id`, `entity.status`); values
/// are equality matches, except objects carrying `gte`/`gt`/`lte`/`lt`
/// bounds, which are numeric range conditions. This evaluator defines the
/// filter semantics; the Qdrant adapter translates the same map into
/// native conditions.
pub fn payload_matches(filters: &Map<String, Value>, payload: &Value) -> bool {
	filters.iter().all(|(path, expected)| condition_matches(path, expected, payload))
}

pub fn is_range_condition(expected: &Value) -> bool {
	expected
		.as_object()
		.map(|bounds| {
			!bounds.is_empty()
				&& bounds.keys().all(|key| matches!(key.as_str(), "gte" | "gt" | "lte" | "lt"))
		})
		.unwrap_or(false)
}

pub fn lookup_path<'a>(payload: &'a Value, path: &str) -> Option<&'a Value> {
	let mut cursor = payload;

	for segment in path.split('.') {
		cursor = cursor.as_object()?.get(segment)?;
	}

	Some(cursor)
}

fn condition_matches(path: &str, expected: &Value, payload: &Value) -> bool {
	let actual = lookup_path(payload, path);

	if let Some(bounds) = expected.as_object()
		&& is_range_condition(expected)
	{
		let Some(actual) = actual.and_then(Value::as_f64) else { return false };

		return bounds.iter().all(|(bound, limit)| {
			let Some(limit) = limit.as_f64() else { return false };

			match bound.as_str() {
				"gte" => actual >= limit,
				"gt" => actual > limit,
				"lte" => actual <= limit,
				"lt" => actual < limit,
				_ => false,
			}
		});
	}

	let Some(actual) = actual else { return expected.is_null() };

	match actual {
		// Equality against an array field means containment (tag filters).
		Value::Array(values) if !expected.is_array() => values.iter().any(|value| value == expected),
		_ => actual == expected,
	}
}
