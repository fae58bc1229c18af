pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Validation failed: {message}")]
	Validation { message: String },
	#[error("Schema error: {message}")]
	Schema { message: String },
	#[error("Processing failed: {message}")]
	Processing { message: String },
	#[error("Not found: {message}")]
	NotFound { message: String },
	#[error("Provider error: {message}")]
	Provider { message: String },
	#[error("Storage error: {message}")]
	Store { message: String },
}
impl From<mnema_domain::Error> for Error {
	fn from(err: mnema_domain::Error) -> Self {
		match err {
			mnema_domain::Error::Schema { message } => Self::Schema { message },
			mnema_domain::Error::Validation { message } => Self::Validation { message },
			mnema_domain::Error::Hrid { message } => Self::Validation { message },
			mnema_domain::Error::HridExhausted { memory_type } => Self::Processing {
				message: format!("HRID space exhausted for type {memory_type}."),
			},
		}
	}
}

impl From<mnema_storage::Error> for Error {
	fn from(err: mnema_storage::Error) -> Self {
		match err {
			mnema_storage::Error::InvalidArgument(message) => Self::Validation { message },
			mnema_storage::Error::NotFound(message) => Self::NotFound { message },
			other => Self::Store { message: other.to_string() },
		}
	}
}

impl From<color_eyre::Report> for Error {
	fn from(err: color_eyre::Report) -> Self {
		Self::Provider { message: err.to_string() }
	}
}
