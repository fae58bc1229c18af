pub mod hrid;
pub mod memory;
pub mod schema;
pub mod time_serde;

mod error;

pub use error::{Error, Result};
pub use memory::{DEFAULT_CONFIDENCE, Memory, SearchResult, SearchSource};
pub use schema::{EntitySpec, EntityView, FieldSpec, FieldType, SchemaRegistry};
