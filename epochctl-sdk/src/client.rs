#![forbid(unsafe_code)]

use epochctl_core::{
	build, normalize,
	restriction::{filter_payload, restriction_notice},
	wire::{decode_line, write_frame},
	ConfigPayload, ConfigRequest, Credential, CredentialInput, EpochKey, Frame, FrameReader, Operation, Priority,
	RequestEnvelope, ResponseEnvelope, ResponseStatus,
};
use indexmap::IndexMap;
use tokio::{
	io::AsyncWriteExt,
	net::{
		tcp::{OwnedReadHalf, OwnedWriteHalf},
		TcpStream,
	},
	time::{timeout, Duration},
};
use tracing::{debug, info, warn};

use crate::{
	config::SdkConfig,
	error::{Error, Result},
};

/// Result of one send: the terminal status and every server message, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendOutcome {
	/// True iff the terminal status was OK.
	pub accepted: bool,
	/// `None` when nothing was sent.
	pub status: Option<ResponseStatus>,
	pub messages: Vec<String>,
	/// Local restriction warnings computed before sending. Advisory only.
	pub advisories: Vec<String>,
}

impl SendOutcome {
	fn not_sent() -> Self { Self { accepted: false, status: None, messages: Vec::new(), advisories: Vec::new() } }
}

/// Remote controller for one training process.
///
/// One request is in flight at a time; every send blocks until the server's terminal reply.
pub struct ControlClient {
	cfg: SdkConfig,
	credentials: Option<Credential>,
	reader: FrameReader<OwnedReadHalf>,
	writer: OwnedWriteHalf,
	batch: Option<IndexMap<EpochKey, ConfigRequest>>,
}

impl ControlClient {
	/// Normalize `credentials` and connect to `cfg.endpoint`.
	pub async fn connect(cfg: SdkConfig, credentials: impl Into<CredentialInput>) -> Result<Self> {
		cfg.validate()?;
		let credentials = normalize(credentials)?;
		let stream = timeout(Duration::from_millis(cfg.request_timeout_ms), TcpStream::connect(&cfg.endpoint))
			.await
			.map_err(|_| Error::Timeout)??;
		stream.set_nodelay(true)?;
		let (rd, writer) = stream.into_split();
		debug!(endpoint = %cfg.endpoint, "connected to control channel");
		Ok(Self { reader: FrameReader::new(rd, cfg.max_frame_len), writer, credentials, cfg, batch: None })
	}

	/// Persistent update consumed at the boundary before `epoch` (or the next one for `"next"`).
	pub async fn send_update<E, P>(&mut self, epoch: E, priority: P, payload: ConfigPayload) -> Result<SendOutcome>
	where
		E: TryInto<EpochKey>,
		P: TryInto<Priority>,
		epochctl_core::Error: From<E::Error> + From<P::Error>,
	{
		let request = build(Operation::PersistentUpdate, priority, epoch, payload)?;
		self.send(vec![request]).await
	}

	/// Change that lasts exactly one epoch, starting at the next boundary.
	pub async fn send_one_epoch_update(&mut self, payload: ConfigPayload) -> Result<SendOutcome> {
		let request = build(Operation::OneEpochUpdate, Priority::NORMAL, EpochKey::Next, payload)?;
		self.send(vec![request]).await
	}

	/// Start collecting steps; any uncommitted batch is discarded.
	pub fn begin_batch(&mut self) { self.batch = Some(IndexMap::new()); }

	/// Add one step to the open batch. A later step for the same epoch replaces the earlier one.
	pub fn add_step<O, P, E>(&mut self, epoch: E, operation: O, priority: P, payload: ConfigPayload) -> Result<()>
	where
		O: TryInto<Operation>,
		P: TryInto<Priority>,
		E: TryInto<EpochKey>,
		epochctl_core::Error: From<O::Error> + From<P::Error> + From<E::Error>,
	{
		let batch = self.batch.as_mut().ok_or(Error::NoBatch)?;
		let request = build(operation, priority, epoch, payload)?;
		batch.insert(request.epoch, request);
		Ok(())
	}

	/// Send every collected step in one envelope. An empty or missing batch sends nothing and is not accepted.
	pub async fn commit_batch(&mut self) -> Result<SendOutcome> {
		match self.batch.take() {
			Some(batch) if !batch.is_empty() => self.send(batch.into_values().collect()).await,
			_ => {
				warn!("nothing to commit");
				Ok(SendOutcome::not_sent())
			}
		}
	}

	/// Close the write side; the server sees end of stream.
	pub async fn close(mut self) -> Result<()> {
		self.writer.shutdown().await?;
		Ok(())
	}

	async fn send(&mut self, requests: Vec<ConfigRequest>) -> Result<SendOutcome> {
		let mut advisories = Vec::new();
		for request in &requests {
			// advisory; the server filters again
			let mut advisory = request.payload.clone();
			let removed = filter_payload(&mut advisory, &self.cfg.restrictions);
			if let Some(notice) = restriction_notice(&request.epoch, &removed) {
				warn!("{notice}");
				advisories.push(notice);
			}
		}
		let count = requests.len();
		let envelope = RequestEnvelope::new(self.credentials.clone(), requests);
		timeout(Duration::from_millis(self.cfg.request_timeout_ms), write_frame(&mut self.writer, &envelope))
			.await
			.map_err(|_| Error::Timeout)??;
		debug!(count, "request sent");
		self.await_terminal(advisories).await
	}

	async fn await_terminal(&mut self, advisories: Vec<String>) -> Result<SendOutcome> {
		let mut messages = Vec::new();
		loop {
			let reply = self.read_reply().await?;
			for m in &reply.messages {
				info!(status = ?reply.response, "{m}");
			}
			messages.extend(reply.messages);
			if reply.response.is_terminal() {
				return Ok(SendOutcome {
					accepted: reply.response == ResponseStatus::Ok,
					status: Some(reply.response),
					messages,
					advisories,
				});
			}
		}
	}

	async fn read_reply(&mut self) -> Result<ResponseEnvelope> {
		let next = self.reader.next_frame();
		let frame = match self.cfg.response_timeout_ms {
			Some(ms) => timeout(Duration::from_millis(ms), next).await.map_err(|_| Error::Timeout)??,
			None => next.await?,
		};
		match frame {
			None => Err(Error::Disconnected),
			Some(Frame::Line(line)) => Ok(decode_line(&line)?),
			Some(Frame::Rejected(e)) => Err(e.into()),
		}
	}
}
