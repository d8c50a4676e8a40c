#![forbid(unsafe_code)]

//! epochctl SDK: the remote controller side of live configuration updates.
//!
//! - Error/Result types (`epochctl_sdk::Error` / `epochctl_sdk::Result<T>`)
//! - Client settings (`SdkConfig`)
//! - `ControlClient`: single-shot and batched sends over line-delimited JSON on TCP

pub mod client;
pub mod config;
pub mod error;

pub use client::{ControlClient, SendOutcome};
pub use config::SdkConfig;
pub use error::{Error, Result};
pub use epochctl_core::{ConfigPayload, ConfigTree, EpochKey, Namespace, Operation, Priority, ResponseStatus};
