#![forbid(unsafe_code)]

//! epochctl-core: shared model for live configuration updates of an epoch-stepped run.
//!
//! - Addressable configuration trees and the four-namespace payload (`tree`)
//! - Credential normalization and constant-time comparison (`credential`)
//! - Restriction policy filtering (`restriction`)
//! - Request parsing/building (`request`)
//! - Line-delimited JSON envelopes (`wire`)
//! - TOML/env configuration and tracing setup (`config`, `telemetry`)

pub mod config;
pub mod credential;
pub mod error;
pub mod request;
pub mod restriction;
pub mod telemetry;
pub mod tree;
pub mod wire;

pub use config::ControlConfig;
pub use credential::{normalize, Credential, CredentialInput};
pub use error::{Error, Result};
pub use request::{build, ConfigRequest, EpochKey, Operation, Priority, WireRequest};
pub use restriction::{filter, filter_payload, restriction_notice, RestrictionNode, RestrictionPolicy};
pub use tree::{AddressableConfig, ConfigPayload, ConfigTree, Namespace};
pub use wire::{Frame, FrameReader, RequestEnvelope, ResponseEnvelope, ResponseStatus};
