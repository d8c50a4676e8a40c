//! Wire envelopes and their line-delimited JSON framing.
//!
//! One envelope per line, UTF-8 JSON, `\n` terminated. A trailing `\r` is tolerated.

use indexmap::IndexMap;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};

use crate::{
	credential::Credential,
	error::{Error, Result},
	request::{ConfigRequest, EpochKey, WireRequest},
};

/// Upper bound for one encoded envelope.
pub const DEFAULT_MAX_FRAME_LEN: usize = 1024 * 1024;

/// Requests keyed by the boundary that consumes them, in insertion order.
pub type Container = IndexMap<EpochKey, WireRequest>;

/// Client → server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestEnvelope {
	#[serde(default)]
	pub credentials: Option<Credential>,
	pub container: Container,
}

impl RequestEnvelope {
	pub fn new(credentials: Option<Credential>, requests: impl IntoIterator<Item = ConfigRequest>) -> Self {
		let container = requests.into_iter().map(ConfigRequest::into_wire).collect();
		Self { credentials, container }
	}

	/// The container flattened back into requests.
	pub fn into_requests(self) -> Vec<ConfigRequest> {
		self.container.into_iter().map(|(epoch, wire)| ConfigRequest::from_wire(epoch, wire)).collect()
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "i64")]
pub enum ResponseStatus {
	Ok = 0,
	/// Progress report; a terminal reply follows.
	Wait = 1,
	Error = 2,
}

impl ResponseStatus {
	pub fn is_terminal(&self) -> bool { !matches!(self, ResponseStatus::Wait) }
}

impl From<ResponseStatus> for u8 {
	fn from(s: ResponseStatus) -> u8 { s as u8 }
}

impl TryFrom<i64> for ResponseStatus {
	type Error = Error;
	fn try_from(code: i64) -> Result<Self> {
		match code {
			0 => Ok(ResponseStatus::Ok),
			1 => Ok(ResponseStatus::Wait),
			2 => Ok(ResponseStatus::Error),
			other => Err(Error::decode(format!("unknown response code {other}"))),
		}
	}
}

/// Server → client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
	pub response: ResponseStatus,
	#[serde(default)]
	pub messages: Vec<String>,
}

impl ResponseEnvelope {
	pub fn ok(messages: Vec<String>) -> Self { Self { response: ResponseStatus::Ok, messages } }
	pub fn wait(messages: Vec<String>) -> Self { Self { response: ResponseStatus::Wait, messages } }
	pub fn error(messages: Vec<String>) -> Self { Self { response: ResponseStatus::Error, messages } }
}

/// One inbound line, or the reason it cannot be used.
#[derive(Debug)]
pub enum Frame {
	Line(String),
	/// The line was consumed but is unusable (too long, not UTF-8). The stream stays in sync.
	Rejected(Error),
}

/// Reads newline-terminated frames with a hard length cap.
///
/// Oversized lines are drained to their terminator without being buffered, so one bad
/// frame never desynchronizes the request/reply exchange.
pub struct FrameReader<R> {
	inner: BufReader<R>,
	max_frame_len: usize,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
	pub fn new(reader: R, max_frame_len: usize) -> Self {
		Self { inner: BufReader::new(reader), max_frame_len }
	}

	/// Next frame; `Ok(None)` once the peer has closed and nothing is pending.
	pub async fn next_frame(&mut self) -> std::io::Result<Option<Frame>> {
		let mut line = Vec::with_capacity(1024);
		let mut oversized = false;
		let mut saw_bytes = false;
		loop {
			let available = self.inner.fill_buf().await?;
			if available.is_empty() {
				if !saw_bytes {
					return Ok(None);
				}
				break;
			}
			saw_bytes = true;
			let newline = memchr::memchr(b'\n', available);
			let chunk = &available[..newline.unwrap_or(available.len())];
			if !oversized {
				if line.len() + chunk.len() > self.max_frame_len {
					oversized = true;
					line.clear();
				} else {
					line.extend_from_slice(chunk);
				}
			}
			let used = newline.map_or(available.len(), |pos| pos + 1);
			self.inner.consume(used);
			if newline.is_some() {
				break;
			}
		}
		if oversized {
			return Ok(Some(Frame::Rejected(Error::decode(format!("frame exceeds {} bytes", self.max_frame_len)))));
		}
		// Trim a trailing CR if present (handle CRLF)
		if line.last().copied() == Some(b'\r') {
			line.pop();
		}
		Ok(Some(match String::from_utf8(line) {
			Ok(s) => Frame::Line(s),
			Err(e) => Frame::Rejected(Error::decode(format!("frame is not UTF-8: {e}"))),
		}))
	}
}

/// Write one envelope followed by `\n` and flush.
pub async fn write_frame<W: AsyncWrite + Unpin, T: Serialize>(writer: &mut W, v: &T) -> Result<()> {
	let mut buf = serde_json::to_vec(v)?;
	buf.push(b'\n');
	writer.write_all(&buf).await?;
	writer.flush().await?;
	Ok(())
}

/// Decode one line into an envelope. Any failure is a [`Error::Decode`].
pub fn decode_line<T: DeserializeOwned>(line: &str) -> Result<T> {
	serde_json::from_str::<T>(line.trim_end_matches('\r')).map_err(|e| Error::decode(e.to_string()))
}
