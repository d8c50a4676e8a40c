#![forbid(unsafe_code)]

//! epochctl-daemon: the in-process half of live configuration updates.
//!
//! A [`LiveUpdater`] owns an [`EpochScheduler`] and, optionally, a TCP control
//! channel feeding it. The host training loop calls
//! [`LiveUpdater::on_epoch_end`] once per finished epoch and
//! [`LiveUpdater::on_train_end`] when done.

pub mod errors;
pub mod event_system;
pub mod host;
pub mod scheduler;
pub mod server;
pub mod updater;

pub use errors::{DaemonError, Result};
pub use event_system::{Event, EventSystem};
pub use host::{LiveConfig, TrainingHost};
pub use scheduler::{BoundaryReport, EpochScheduler, ENQUEUED_MESSAGE};
pub use server::{ControlServer, ServerHandle};
pub use updater::LiveUpdater;
