use std::{collections::BTreeMap, fs, path::Path};

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::{Error, Memory, Result};

/// Keys managed by the core and stripped from caller payloads before
/// validation. Entity payloads never carry identity or storage metadata.
pub const SYSTEM_RESERVED_KEYS: [&str; 6] =
	["id", "user_id", "hrid", "created_at", "updated_at", "vector"];

#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
	String,
	Float,
	Bool,
	Datetime,
	Tags,
	Vector,
	Enum,
}

#[derive(Clone, Debug, Deserialize)]
pub struct FieldSpec {
	#[serde(rename = "type", default = "default_field_type")]
	pub field_type: FieldType,
	#[serde(default)]
	pub required: bool,
	/// Managed by the core rather than callers; stripped from payloads.
	#[serde(default)]
	pub system: bool,
	#[serde(default)]
	pub default: Option<Value>,
	#[serde(default)]
	pub choices: Option<Vec<String>>,
	#[serde(default)]
	pub max_length: Option<usize>,
}

#[derive(Clone, Debug)]
pub struct EntitySpec {
	pub name: String,
	pub description: Option<String>,
	pub anchor: String,
	pub fields: BTreeMap<String, FieldSpec>,
}

#[derive(Debug, Deserialize)]
struct RawSchema {
	#[serde(default)]
	#[allow(dead_code)]
	version: Option<u32>,
	#[serde(default)]
	entities: Vec<RawEntity>,
	#[serde(default)]
	relations: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RawEntity {
	name: String,
	#[serde(default)]
	description: Option<String>,
	anchor: String,
	#[serde(default)]
	fields: BTreeMap<String, FieldSpec>,
}

/// The single source of truth for "what is a valid memory of type T".
/// Loaded once from the YAML entity registry; every anchor is explicit,
/// unknown types are hard failures, and no fallback type exists.
#[derive(Clone, Debug)]
pub struct SchemaRegistry {
	entities: BTreeMap<String, EntitySpec>,
	relations: Vec<String>,
}
impl SchemaRegistry {
	pub fn load(path: &Path) -> Result<Self> {
		let raw = fs::read_to_string(path).map_err(|err| Error::Schema {
			message: format!("Failed to read schema file at {path:?}: {err}"),
		})?;

		Self::from_yaml_str(&raw)
	}

	pub fn from_yaml_str(raw: &str) -> Result<Self> {
		let raw: RawSchema = serde_yaml::from_str(raw)
			.map_err(|err| Error::Schema { message: format!("Invalid schema YAML: {err}") })?;

		if raw.entities.is_empty() {
			return Err(Error::Schema {
				message: "Schema must declare at least one entity.".to_string(),
			});
		}

		let mut entities = BTreeMap::new();

		for entity in raw.entities {
			let name = entity.name.trim().to_lowercase();

			if !is_entity_name(&name) {
				return Err(Error::Schema {
					message: format!(
						"Entity name '{}' must match [a-z][a-z0-9]* (it becomes an HRID prefix).",
						entity.name
					),
				});
			}

			let anchor = entity.anchor.trim().to_string();

			if anchor.is_empty() {
				return Err(Error::Schema {
					message: format!("Entity '{name}' declares an empty anchor field."),
				});
			}

			let Some(anchor_spec) = entity.fields.get(&anchor) else {
				return Err(Error::Schema {
					message: format!(
						"Entity '{name}' anchor '{anchor}' is not a declared field."
					),
				});
			};

			if anchor_spec.field_type != FieldType::String {
				return Err(Error::Schema {
					message: format!("Entity '{name}' anchor '{anchor}' must be a string field."),
				});
			}
			if anchor_spec.system {
				return Err(Error::Schema {
					message: format!("Entity '{name}' anchor '{anchor}' must not be a system field."),
				});
			}

			for (field, spec) in &entity.fields {
				validate_field_spec(&name, field, spec)?;
			}

			let spec = EntitySpec {
				name: name.clone(),
				description: entity.description,
				anchor,
				fields: entity.fields,
			};

			if entities.insert(name.clone(), spec).is_some() {
				return Err(Error::Schema {
					message: format!("Entity '{name}' is declared more than once."),
				});
			}
		}

		let mut relations = Vec::new();

		for relation in raw.relations {
			let relation = relation.trim().to_uppercase();

			if relation.is_empty() {
				return Err(Error::Schema {
					message: "Relation names must be non-empty.".to_string(),
				});
			}
			if !relations.contains(&relation) {
				relations.push(relation);
			}
		}

		Ok(Self { entities, relations })
	}

	pub fn entity_names(&self) -> Vec<&str> {
		self.entities.keys().map(String::as_str).collect()
	}

	pub fn entity_spec(&self, memory_type: &str) -> Result<&EntitySpec> {
		let key = memory_type.trim().to_lowercase();

		self.entities.get(&key).ok_or_else(|| Error::Schema {
			message: format!(
				"Unknown memory type '{memory_type}'; declared types: {}.",
				self.entity_names().join(", ")
			),
		})
	}

	pub fn anchor_field(&self, memory_type: &str) -> Result<&str> {
		Ok(self.entity_spec(memory_type)?.anchor.as_str())
	}

	/// Checks required fields, enum choices, and length bounds; strips
	/// system-reserved keys. All other caller-supplied keys pass through
	/// untouched (open-world payload).
	pub fn validate_and_clean(
		&self,
		memory_type: &str,
		payload: &Map<String, Value>,
	) -> Result<Map<String, Value>> {
		let spec = self.entity_spec(memory_type)?;

		for (field, field_spec) in &spec.fields {
			if field_spec.required && !has_value(payload.get(field)) {
				return Err(Error::Validation {
					message: format!(
						"Missing required field '{field}' for memory type '{}'.",
						spec.name
					),
				});
			}

			let Some(value) = payload.get(field) else { continue };

			if value.is_null() {
				continue;
			}

			match field_spec.field_type {
				FieldType::Enum => {
					let choices = field_spec.choices.as_deref().unwrap_or(&[]);
					let accepted = value
						.as_str()
						.map(|raw| choices.iter().any(|choice| choice == raw))
						.unwrap_or(false);

					if !accepted {
						return Err(Error::Validation {
							message: format!(
								"Invalid value {value} for enum field '{field}' of '{}'; allowed: [{}].",
								spec.name,
								choices.join(", ")
							),
						});
					}
				},
				FieldType::String =>
					if let (Some(max), Some(raw)) = (field_spec.max_length, value.as_str())
						&& raw.chars().count() > max
					{
						return Err(Error::Validation {
							message: format!(
								"Field '{field}' of '{}' exceeds max_length {max}.",
								spec.name
							),
						});
					},
				_ => {},
			}
		}

		let mut cleaned = payload.clone();

		for key in SYSTEM_RESERVED_KEYS {
			cleaned.remove(key);
		}

		let system_fields: Vec<&String> =
			spec.fields.iter().filter(|(_, field)| field.system).map(|(name, _)| name).collect();

		for field in system_fields {
			cleaned.remove(field.as_str());
		}

		Ok(cleaned)
	}

	/// Fills declared defaults for absent fields. Defaults are validated at
	/// load time, so the result still satisfies `validate_and_clean`.
	pub fn apply_defaults(&self, memory_type: &str, payload: &mut Map<String, Value>) -> Result<()> {
		let spec = self.entity_spec(memory_type)?;

		for (field, field_spec) in &spec.fields {
			if field_spec.system {
				continue;
			}
			if let Some(default) = &field_spec.default
				&& !has_value(payload.get(field))
			{
				payload.insert(field.clone(), default.clone());
			}
		}

		Ok(())
	}

	/// Resolves the anchor text to embed for a memory: the declared anchor
	/// field's string value, trimmed. Empty or missing is a hard failure;
	/// an empty embedding silently corrupts search for the whole type.
	pub fn build_anchor_text(&self, memory: &Memory) -> Result<String> {
		let anchor = self.anchor_field(&memory.memory_type)?;
		let text = memory
			.payload
			.get(anchor)
			.and_then(Value::as_str)
			.map(str::trim)
			.unwrap_or_default();

		if text.is_empty() {
			return Err(Error::Schema {
				message: format!(
					"Anchor field '{anchor}' is missing or empty for memory type '{}'; id={}",
					memory.memory_type, memory.id
				),
			});
		}

		Ok(text.to_string())
	}

	/// Validates, cleans, fills defaults, and builds an unindexed memory.
	pub fn create_memory(
		&self,
		memory_type: &str,
		payload: &Map<String, Value>,
		user_id: &str,
	) -> Result<Memory> {
		let spec = self.entity_spec(memory_type)?;
		let anchor_present = payload.get(&spec.anchor).and_then(Value::as_str).map(str::trim);

		if anchor_present.unwrap_or_default().is_empty() {
			return Err(Error::Validation {
				message: format!(
					"Missing or empty anchor field '{}' in payload for memory type '{}'.",
					spec.anchor, spec.name
				),
			});
		}

		let mut cleaned = self.validate_and_clean(memory_type, payload)?;

		self.apply_defaults(memory_type, &mut cleaned)?;

		Ok(Memory::new(&spec.name, cleaned, user_id))
	}

	pub fn relation_names(&self) -> &[String] {
		&self.relations
	}

	pub fn has_relation(&self, name: &str) -> bool {
		let name = name.trim().to_uppercase();

		self.relations.iter().any(|relation| relation == &name)
	}

	pub fn view<'a>(
		&'a self,
		memory_type: &str,
		payload: &'a Map<String, Value>,
	) -> Result<EntityView<'a>> {
		Ok(EntityView { spec: self.entity_spec(memory_type)?, payload })
	}
}

/// Typed, schema-checked access to an open payload map. Reads go through
/// the same field declarations as `validate_and_clean`, so accept/reject
/// behavior is identical; this is the typed edge over the generic wire
/// format.
#[derive(Clone, Copy, Debug)]
pub struct EntityView<'a> {
	spec: &'a EntitySpec,
	payload: &'a Map<String, Value>,
}
impl<'a> EntityView<'a> {
	pub fn spec(&self) -> &'a EntitySpec {
		self.spec
	}

	pub fn anchor_text(&self) -> Option<&'a str> {
		self.payload.get(&self.spec.anchor).and_then(Value::as_str)
	}

	pub fn str_field(&self, field: &str) -> Result<Option<&'a str>> {
		match self.field_spec(field)?.field_type {
			FieldType::String | FieldType::Enum | FieldType::Datetime => (),
			other => return Err(self.type_error(field, "string", other)),
		}

		Ok(self.payload.get(field).and_then(Value::as_str))
	}

	pub fn f64_field(&self, field: &str) -> Result<Option<f64>> {
		match self.field_spec(field)?.field_type {
			FieldType::Float => (),
			other => return Err(self.type_error(field, "float", other)),
		}

		Ok(self.payload.get(field).and_then(Value::as_f64))
	}

	pub fn bool_field(&self, field: &str) -> Result<Option<bool>> {
		match self.field_spec(field)?.field_type {
			FieldType::Bool => (),
			other => return Err(self.type_error(field, "bool", other)),
		}

		Ok(self.payload.get(field).and_then(Value::as_bool))
	}

	pub fn tags_field(&self, field: &str) -> Result<Vec<&'a str>> {
		match self.field_spec(field)?.field_type {
			FieldType::Tags => (),
			other => return Err(self.type_error(field, "tags", other)),
		}

		Ok(self
			.payload
			.get(field)
			.and_then(Value::as_array)
			.map(|values| values.iter().filter_map(Value::as_str).collect())
			.unwrap_or_default())
	}

	fn field_spec(&self, field: &str) -> Result<&'a FieldSpec> {
		self.spec.fields.get(field).ok_or_else(|| Error::Validation {
			message: format!("Field '{field}' is not declared for '{}'.", self.spec.name),
		})
	}

	fn type_error(&self, field: &str, wanted: &str, actual: FieldType) -> Error {
		Error::Validation {
			message: format!(
				"Field '{field}' of '{}' is declared as {actual:?}, not {wanted}.",
				self.spec.name
			),
		}
	}
}

fn default_field_type() -> FieldType {
	FieldType::String
}

fn is_entity_name(name: &str) -> bool {
	let mut chars = name.chars();
	let Some(first) = chars.next() else { return false };

	first.is_ascii_lowercase() && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
}

fn has_value(value: Option<&Value>) -> bool {
	match value {
		None | Some(Value::Null) => false,
		Some(Value::String(raw)) => !raw.trim().is_empty(),
		Some(Value::Array(values)) => !values.is_empty(),
		Some(_) => true,
	}
}

fn validate_field_spec(entity: &str, field: &str, spec: &FieldSpec) -> Result<()> {
	if field.trim().is_empty() {
		return Err(Error::Schema {
			message: format!("Entity '{entity}' declares a field with an empty name."),
		});
	}

	match spec.field_type {
		FieldType::Enum => {
			let Some(choices) = spec.choices.as_ref().filter(|choices| !choices.is_empty()) else {
				return Err(Error::Schema {
					message: format!(
						"Enum field '{field}' of '{entity}' must declare non-empty choices."
					),
				});
			};

			if let Some(default) = &spec.default {
				let accepted = default
					.as_str()
					.map(|raw| choices.iter().any(|choice| choice == raw))
					.unwrap_or(false);

				if !accepted {
					return Err(Error::Schema {
						message: format!(
							"Default {default} for enum field '{field}' of '{entity}' is not among its choices."
						),
					});
				}
			}
		},
		_ =>
			if spec.choices.is_some() {
				return Err(Error::Schema {
					message: format!(
						"Field '{field}' of '{entity}' declares choices but is not an enum."
					),
				});
			},
	}

	Ok(())
}
