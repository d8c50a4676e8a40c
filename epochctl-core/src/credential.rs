//! Credential normalization and comparison.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use subtle::ConstantTimeEq;

use crate::error::{Error, Result};

/// Identity used when only a secret is supplied.
pub const DEFAULT_USER: &str = "root";

/// Canonical credential pair. Carried verbatim in request envelopes.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
	pub user: String,
	pub password: String,
}

impl Credential {
	pub fn new(user: impl Into<String>, password: impl Into<String>) -> Self {
		Self { user: user.into(), password: password.into() }
	}

	/// Exact match on both fields, compared in constant time.
	pub fn matches(&self, other: &Credential) -> bool {
		let user = self.user.as_bytes().ct_eq(other.user.as_bytes());
		let password = self.password.as_bytes().ct_eq(other.password.as_bytes());
		(user & password).into()
	}
}

impl std::fmt::Debug for Credential {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Credential").field("user", &self.user).field("password", &"<redacted>").finish()
	}
}

/// Every credential shape accepted from callers and configuration files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialInput {
	/// No authentication.
	Absent,
	/// A bare secret; the user defaults to [`DEFAULT_USER`].
	Secret(String),
	/// A positional sequence: `[password]` or `[user, password]`.
	Sequence(Vec<String>),
	/// A mapping with `user` and `password` entries.
	Mapping { user: Option<String>, password: Option<String> },
	/// `user:password`, or a bare secret when there is no separator.
	Combined(String),
}

impl CredentialInput {
	/// Interpret a JSON value: null, string, array of strings, or object.
	pub fn from_value(value: Value) -> Result<Self> {
		match value {
			Value::Null => Ok(Self::Absent),
			Value::String(s) => Ok(Self::Combined(s)),
			Value::Array(items) => items
				.into_iter()
				.map(|v| match v {
					Value::String(s) => Ok(s),
					other => Err(Error::malformed_credential(format!("sequence items must be strings, got {other}"))),
				})
				.collect::<Result<Vec<_>>>()
				.map(Self::Sequence),
			Value::Object(mut map) => {
				let mut field = |name: &str| -> Result<Option<String>> {
					match map.remove(name) {
						None | Some(Value::Null) => Ok(None),
						Some(Value::String(s)) => Ok(Some(s)),
						Some(other) => Err(Error::malformed_credential(format!("{name} must be a string, got {other}"))),
					}
				};
				let user = field("user")?;
				let password = field("password")?;
				Ok(Self::Mapping { user, password })
			}
			other => Err(Error::malformed_credential(format!("unsupported credential shape: {other}"))),
		}
	}
}

impl From<&str> for CredentialInput {
	fn from(s: &str) -> Self { Self::Combined(s.to_string()) }
}

impl From<String> for CredentialInput {
	fn from(s: String) -> Self { Self::Combined(s) }
}

impl<U: Into<String>, P: Into<String>> From<(U, P)> for CredentialInput {
	fn from((user, password): (U, P)) -> Self { Self::Sequence(vec![user.into(), password.into()]) }
}

impl From<Credential> for CredentialInput {
	fn from(c: Credential) -> Self { Self::Mapping { user: Some(c.user), password: Some(c.password) } }
}

impl<T: Into<CredentialInput>> From<Option<T>> for CredentialInput {
	fn from(opt: Option<T>) -> Self { opt.map_or(Self::Absent, Into::into) }
}

/// Reduce any accepted input to a canonical pair, or `None` when authentication is off.
pub fn normalize(input: impl Into<CredentialInput>) -> Result<Option<Credential>> {
	let credential = match input.into() {
		CredentialInput::Absent => return Ok(None),
		CredentialInput::Secret(password) => Credential::new(DEFAULT_USER, password),
		CredentialInput::Sequence(mut items) => match items.len() {
			1 => Credential::new(DEFAULT_USER, items.remove(0)),
			2 => {
				let password = items.remove(1);
				Credential::new(items.remove(0), password)
			}
			n => return Err(Error::malformed_credential(format!("expected 1 or 2 items, got {n}"))),
		},
		CredentialInput::Mapping { user, password } => match (user, password) {
			(Some(user), Some(password)) => Credential::new(user, password),
			_ => return Err(Error::malformed_credential("mapping needs both user and password")),
		},
		CredentialInput::Combined(s) => match s.split_once(':') {
			Some((user, password)) => Credential::new(user, password),
			None => Credential::new(DEFAULT_USER, s),
		},
	};
	Ok(Some(credential))
}

/// Server-side check. With no configured credential every request passes; otherwise the
/// presented credential must be present and match exactly.
pub fn authorize(expected: Option<&Credential>, presented: Option<&Credential>) -> Result<()> {
	match (expected, presented) {
		(None, _) => Ok(()),
		(Some(expected), Some(presented)) if expected.matches(presented) => Ok(()),
		_ => Err(Error::Authentication),
	}
}
