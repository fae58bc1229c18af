pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Schema error: {message}")]
	Schema { message: String },
	#[error("Validation failed: {message}")]
	Validation { message: String },
	#[error("Invalid HRID: {message}")]
	Hrid { message: String },
	#[error("HRID space exhausted for type {memory_type}.")]
	HridExhausted { memory_type: String },
}
