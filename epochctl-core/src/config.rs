use crate::{
	credential::{normalize, Credential, CredentialInput},
	error::{Error, Result},
	restriction::RestrictionPolicy,
	wire::DEFAULT_MAX_FRAME_LEN,
};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

pub const DEFAULT_ADDRESS: &str = "127.0.0.1:1717";
pub const DEFAULT_MAX_PENDING_REQUESTS: usize = 1024;
/// Smallest accepted frame cap, on either end of the channel.
pub const MIN_MAX_FRAME_LEN: usize = 1024;

/// Settings shared by the embedded server and tooling around it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ControlConfig {
	/// `host:port` the control channel binds to (server) or dials (client).
	pub address: String,
	/// Any accepted credential shape; normalized by [`ControlConfig::credential`].
	pub credentials: serde_json::Value,
	pub restrictions: RestrictionPolicy,
	pub max_frame_len: usize,
	/// Cap on requests waiting in the epoch queue; enqueues beyond it are refused.
	pub max_pending_requests: usize,
	pub log_level: String,
}

impl Default for ControlConfig {
	fn default() -> Self {
		Self {
			address: DEFAULT_ADDRESS.into(),
			credentials: serde_json::Value::Null,
			restrictions: RestrictionPolicy::default(),
			max_frame_len: DEFAULT_MAX_FRAME_LEN,
			max_pending_requests: DEFAULT_MAX_PENDING_REQUESTS,
			log_level: "info".into(),
		}
	}
}

impl ControlConfig {
	pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
		let data = fs::read_to_string(path)?;
		let cfg: Self = toml::from_str(&data).map_err(|e| Error::config(format!("toml parse error: {e}")))?;
		cfg.validate()?;
		Ok(cfg)
	}

	pub fn from_env() -> Result<Self> {
		let cfg = Self::default().with_env_overrides()?;
		cfg.validate()?;
		Ok(cfg)
	}

	/// Overlay `EPOCHCTL_*` environment variables onto `self`.
	pub fn with_env_overrides(mut self) -> Result<Self> {
		if let Ok(v) = std::env::var("EPOCHCTL_ADDR") { self.address = v; }
		if let Ok(v) = std::env::var("EPOCHCTL_CREDENTIALS") { self.credentials = serde_json::Value::String(v); }
		if let Ok(v) = std::env::var("EPOCHCTL_LOG_LEVEL") { self.log_level = v; }
		if let Ok(v) = std::env::var("EPOCHCTL_MAX_FRAME_LEN") {
			self.max_frame_len = v.parse().map_err(|e| Error::config(format!("EPOCHCTL_MAX_FRAME_LEN: {e}")))?;
		}
		Ok(self)
	}

	/// The configured credential in canonical form; `None` disables authentication.
	pub fn credential(&self) -> Result<Option<Credential>> {
		normalize(CredentialInput::from_value(self.credentials.clone())?)
	}

	pub fn validate(&self) -> Result<()> {
		let allowed = ["trace", "debug", "info", "warn", "error"];
		if !allowed.contains(&self.log_level.as_str()) {
			return Err(Error::config(format!("invalid log_level: {}", self.log_level)));
		}
		match self.address.rsplit_once(':') {
			Some((host, port)) if !host.is_empty() && port.parse::<u16>().is_ok() => {}
			_ => return Err(Error::config(format!("address must be host:port, got {:?}", self.address))),
		}
		if self.max_frame_len < MIN_MAX_FRAME_LEN {
			return Err(Error::config(format!("max_frame_len must be at least {MIN_MAX_FRAME_LEN}, got {}", self.max_frame_len)));
		}
		if self.max_pending_requests == 0 {
			return Err(Error::config("max_pending_requests must be positive"));
		}
		self.credential()?;
		Ok(())
	}
}
