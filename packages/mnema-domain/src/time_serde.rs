//! RFC3339 timestamp helpers shared by the data model and its serde
//! representation. Stored payloads always carry RFC3339 strings; the
//! numeric `created_at_ts` mirror exists only for range filtering.

use serde::{Deserialize, Deserializer, Serializer};
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

pub fn format_rfc3339(value: OffsetDateTime) -> Result<String, time::error::Format> {
	value.format(&Rfc3339)
}

pub fn parse_rfc3339(raw: &str) -> Result<OffsetDateTime, time::error::Parse> {
	OffsetDateTime::parse(raw, &Rfc3339)
}

pub fn serialize<S>(value: &OffsetDateTime, serializer: S) -> Result<S::Ok, S::Error>
where
	S: Serializer,
{
	let formatted = format_rfc3339(*value).map_err(serde::ser::Error::custom)?;

	serializer.serialize_str(&formatted)
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<OffsetDateTime, D::Error>
where
	D: Deserializer<'de>,
{
	let raw = String::deserialize(deserializer)?;

	parse_rfc3339(&raw).map_err(serde::de::Error::custom)
}
