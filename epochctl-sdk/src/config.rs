#![forbid(unsafe_code)]

use std::{fs, path::Path};

use epochctl_core::{config::{DEFAULT_ADDRESS, MIN_MAX_FRAME_LEN}, wire::DEFAULT_MAX_FRAME_LEN, ControlConfig, RestrictionPolicy};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SdkConfig {
	#[serde(default = "SdkConfig::default_endpoint")]
	pub endpoint: String,
	/// Deadline for connecting and for writing one request.
	#[serde(default = "SdkConfig::default_timeout_ms")]
	pub request_timeout_ms: u64,
	/// Deadline per reply envelope; `None` waits until a terminal reply or close.
	#[serde(default)]
	pub response_timeout_ms: Option<u64>,
	/// Local copy of the server's policy, used only to warn before sending.
	#[serde(default)]
	pub restrictions: RestrictionPolicy,
	#[serde(default = "SdkConfig::default_max_frame_len")]
	pub max_frame_len: usize,
}

impl Default for SdkConfig {
	fn default() -> Self {
		Self {
			endpoint: Self::default_endpoint(),
			request_timeout_ms: Self::default_timeout_ms(),
			response_timeout_ms: None,
			restrictions: RestrictionPolicy::default(),
			max_frame_len: Self::default_max_frame_len(),
		}
	}
}

impl SdkConfig {
	pub fn default_endpoint() -> String { DEFAULT_ADDRESS.to_string() }
	pub const fn default_timeout_ms() -> u64 { 5_000 }
	pub const fn default_max_frame_len() -> usize { DEFAULT_MAX_FRAME_LEN }

	/// Client settings matching a server configuration (same address, policy and frame cap).
	pub fn for_server(server: &ControlConfig) -> Self {
		Self {
			endpoint: server.address.clone(),
			restrictions: server.restrictions.clone(),
			max_frame_len: server.max_frame_len,
			..Self::default()
		}
	}

	pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
		let data = fs::read_to_string(path)?;
		let cfg: Self = toml::from_str(&data).map_err(|e| Error::config(format!("toml parse error: {e}")))?;
		cfg.validate()?;
		Ok(cfg)
	}

	pub fn validate(&self) -> Result<()> {
		if self.endpoint.trim().is_empty() {
			return Err(Error::config("endpoint must not be empty"));
		}
		if self.request_timeout_ms == 0 {
			return Err(Error::config("request_timeout_ms must be positive"));
		}
		if self.response_timeout_ms == Some(0) {
			return Err(Error::config("response_timeout_ms must be positive when set"));
		}
		if self.max_frame_len < MIN_MAX_FRAME_LEN {
			return Err(Error::config(format!("max_frame_len must be at least {MIN_MAX_FRAME_LEN}, got {}", self.max_frame_len)));
		}
		Ok(())
	}
}
