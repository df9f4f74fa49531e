pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Why a narrative generation call failed, reported to the caller so a
/// retry decision can be made there.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationFailure {
	Timeout,
	Status,
	MalformedResponse,
	Unreachable,
}
impl std::fmt::Display for GenerationFailure {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let label = match self {
			Self::Timeout => "timeout",
			Self::Status => "status",
			Self::MalformedResponse => "malformed_response",
			Self::Unreachable => "unreachable",
		};

		write!(f, "{label}")
	}
}

/// The service error taxonomy. Validation variants are raised before any
/// remote call; remote variants name the stage that failed. Absence of data
/// is never expressed through an error, and no error collapses into an
/// empty result.
#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Invalid filter: {message}")]
	InvalidFilter { message: String },
	#[error("Invalid request: {message}")]
	InvalidRequest { message: String },
	#[error("Embedding provider unavailable: {message}")]
	EmbeddingUnavailable { message: String },
	#[error("Patient not found: {patient_id}")]
	PatientNotFound { patient_id: String },
	#[error("Generation backend failed ({cause}): {message}")]
	GenerationBackend { cause: GenerationFailure, message: String },
	#[error("Storage error: {message}")]
	Storage { message: String },
}

impl From<cohort_storage::Error> for Error {
	fn from(err: cohort_storage::Error) -> Self {
		match err {
			cohort_storage::Error::Sqlx(inner) => Self::Storage { message: inner.to_string() },
			cohort_storage::Error::InvalidArgument(message) => Self::InvalidRequest { message },
			cohort_storage::Error::NotFound(message) => Self::Storage { message },
		}
	}
}

impl From<cohort_domain::FilterError> for Error {
	fn from(err: cohort_domain::FilterError) -> Self {
		Self::InvalidFilter { message: err.to_string() }
	}
}
