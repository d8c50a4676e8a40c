//! Request records and the parsers that build them.
//!
//! `Operation`, `Priority` and `EpochKey` parse from their typed form, from
//! integers and from the case-insensitive strings operators type by hand.
//! Any integer is a priority rank.
//! Parsing failures stay local and are never sent over the wire.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{
	error::{Error, Result},
	tree::ConfigPayload,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "i64")]
pub enum Operation {
	/// Takes effect and stays.
	PersistentUpdate = 0,
	/// Takes effect for exactly one epoch, then is reverted at the next boundary.
	OneEpochUpdate = 1,
}

impl From<Operation> for u8 {
	fn from(op: Operation) -> u8 { op as u8 }
}

impl TryFrom<i64> for Operation {
	type Error = Error;
	fn try_from(code: i64) -> Result<Self> {
		match code {
			0 => Ok(Operation::PersistentUpdate),
			1 => Ok(Operation::OneEpochUpdate),
			other => Err(Error::invalid_operation(format!("unknown operation code {other}"))),
		}
	}
}

impl FromStr for Operation {
	type Err = Error;
	fn from_str(s: &str) -> Result<Self> {
		match s.to_ascii_lowercase().as_str() {
			"update" => Ok(Operation::PersistentUpdate),
			"next_epoch" => Ok(Operation::OneEpochUpdate),
			_ => Err(Error::invalid_operation(format!("unknown operation {s:?}"))),
		}
	}
}

impl TryFrom<&str> for Operation {
	type Error = Error;
	fn try_from(s: &str) -> Result<Self> { s.parse() }
}

/// Rank of a request within one epoch. Any integer is a valid rank; the named ones are
/// `NORMAL < HIGH < VERY_HIGH`. When requests for one epoch touch the same key, the higher
/// rank is applied last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Priority(i64);

impl Priority {
	pub const NORMAL: Priority = Priority(0);
	pub const HIGH: Priority = Priority(1);
	pub const VERY_HIGH: Priority = Priority(2);

	pub const fn rank(self) -> i64 { self.0 }
}

impl From<i64> for Priority {
	fn from(rank: i64) -> Self { Priority(rank) }
}

impl FromStr for Priority {
	type Err = Error;
	fn from_str(s: &str) -> Result<Self> {
		match s.to_ascii_lowercase().as_str() {
			"normal" => Ok(Priority::NORMAL),
			"high" => Ok(Priority::HIGH),
			"very high" => Ok(Priority::VERY_HIGH),
			_ => Err(Error::invalid_priority(format!("unknown priority {s:?}"))),
		}
	}
}

impl TryFrom<&str> for Priority {
	type Error = Error;
	fn try_from(s: &str) -> Result<Self> { s.parse() }
}

/// Which boundary a request is consumed at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum EpochKey {
	/// Consumed when epoch `n - 1` finishes, i.e. right before epoch `n` starts.
	Epoch(u64),
	/// Consumed at the very next boundary.
	Next,
}

impl EpochKey {
	pub const NEXT_LITERAL: &'static str = "next";
}

impl fmt::Display for EpochKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			EpochKey::Epoch(n) => write!(f, "{n}"),
			EpochKey::Next => f.write_str(Self::NEXT_LITERAL),
		}
	}
}

impl From<EpochKey> for String {
	fn from(key: EpochKey) -> String { key.to_string() }
}

impl From<u64> for EpochKey {
	fn from(n: u64) -> Self { EpochKey::Epoch(n) }
}

impl TryFrom<i64> for EpochKey {
	type Error = Error;
	fn try_from(n: i64) -> Result<Self> {
		u64::try_from(n).map(EpochKey::Epoch).map_err(|_| Error::invalid_epoch(format!("{n} is negative")))
	}
}

impl FromStr for EpochKey {
	type Err = Error;
	fn from_str(s: &str) -> Result<Self> {
		if s.eq_ignore_ascii_case(Self::NEXT_LITERAL) {
			return Ok(EpochKey::Next);
		}
		if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
			return Err(Error::invalid_epoch(format!("{s:?} is neither \"next\" nor a non-negative integer")));
		}
		s.parse::<u64>().map(EpochKey::Epoch).map_err(|e| Error::invalid_epoch(format!("{s:?}: {e}")))
	}
}

impl TryFrom<&str> for EpochKey {
	type Error = Error;
	fn try_from(s: &str) -> Result<Self> { s.parse() }
}

impl TryFrom<String> for EpochKey {
	type Error = Error;
	fn try_from(s: String) -> Result<Self> { s.parse() }
}

/// The per-epoch body carried inside a request container.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireRequest {
	pub operation: Operation,
	pub priority: Priority,
	pub config: ConfigPayload,
}

/// A validated request. Immutable once enqueued.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigRequest {
	pub epoch: EpochKey,
	pub operation: Operation,
	pub priority: Priority,
	pub payload: ConfigPayload,
}

impl ConfigRequest {
	pub fn from_wire(epoch: EpochKey, wire: WireRequest) -> Self {
		Self { epoch, operation: wire.operation, priority: wire.priority, payload: wire.config }
	}

	pub fn into_wire(self) -> (EpochKey, WireRequest) {
		(self.epoch, WireRequest { operation: self.operation, priority: self.priority, config: self.payload })
	}
}

/// Validate and normalize raw operation, priority and epoch inputs into a request.
///
/// Each input may be the typed value, an integer or a string; the payload is passed through
/// unchanged and only checked against the live configuration when applied.
pub fn build<O, P, E>(operation: O, priority: P, epoch: E, payload: ConfigPayload) -> Result<ConfigRequest>
where
	O: TryInto<Operation>,
	P: TryInto<Priority>,
	E: TryInto<EpochKey>,
	Error: From<O::Error> + From<P::Error> + From<E::Error>,
{
	Ok(ConfigRequest { epoch: epoch.try_into()?, operation: operation.try_into()?, priority: priority.try_into()?, payload })
}
