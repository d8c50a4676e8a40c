use thiserror::Error;

pub type Result<T, E = Error> = core::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
	#[error("malformed credential: {0}")]
	MalformedCredential(String),
	#[error("invalid epoch: {0}")]
	InvalidEpoch(String),
	#[error("invalid operation: {0}")]
	InvalidOperation(String),
	#[error("invalid priority: {0}")]
	InvalidPriority(String),
	#[error("Wrong credentials.")]
	Authentication,
	#[error("decode: {0}")]
	Decode(String),
	#[error("apply {path}: {reason}")]
	Apply { path: String, reason: String },
	#[error("config: {0}")]
	Config(String),
	#[error("io: {0}")]
	Io(#[from] std::io::Error),
	#[error("serde: {0}")]
	Serde(#[from] serde_json::Error),
}

impl Error {
	pub fn malformed_credential(msg: impl Into<String>) -> Self { Self::MalformedCredential(msg.into()) }
	pub fn invalid_epoch(msg: impl Into<String>) -> Self { Self::InvalidEpoch(msg.into()) }
	pub fn invalid_operation(msg: impl Into<String>) -> Self { Self::InvalidOperation(msg.into()) }
	pub fn invalid_priority(msg: impl Into<String>) -> Self { Self::InvalidPriority(msg.into()) }
	pub fn decode(msg: impl Into<String>) -> Self { Self::Decode(msg.into()) }
	pub fn apply(path: impl Into<String>, reason: impl Into<String>) -> Self {
		Self::Apply { path: path.into(), reason: reason.into() }
	}
	pub fn config(msg: impl Into<String>) -> Self { Self::Config(msg.into()) }
}

// Lets already-typed values pass through the generic request builder.
impl From<std::convert::Infallible> for Error {
	fn from(never: std::convert::Infallible) -> Self { match never {} }
}
