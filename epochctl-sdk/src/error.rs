#![forbid(unsafe_code)]

use thiserror::Error as ThisError;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, ThisError)]
pub enum Error {
	#[error(transparent)]
	Core(#[from] epochctl_core::Error),
	#[error("I/O error: {0}")]
	Io(#[from] std::io::Error),
	#[error("configuration error: {0}")]
	Config(String),
	#[error("no batch in progress")]
	NoBatch,
	#[error("timeout")]
	Timeout,
	/// The channel closed before a terminal reply arrived.
	#[error("disconnected")]
	Disconnected,
}

impl Error {
	pub fn config(msg: impl Into<String>) -> Self { Error::Config(msg.into()) }
}
