//! `LiveUpdater`: what a training loop embeds to accept live configuration changes.

use std::net::SocketAddr;

use epochctl_core::{build, ConfigPayload, ConfigRequest, ControlConfig, EpochKey, Error, Operation, Priority};
use indexmap::IndexMap;
use tokio::sync::broadcast;
use tracing::info;

use crate::{
    errors::{DaemonError, Result},
    event_system::{Event, EventSystem},
    host::TrainingHost,
    scheduler::{BoundaryReport, EpochScheduler},
    server::{ControlServer, ServerHandle},
};

/// Scheduler plus (optionally) the control channel feeding it.
///
/// Local calls go through the same restriction filter and queue as remote ones.
pub struct LiveUpdater {
    scheduler: EpochScheduler,
    server: Option<ServerHandle>,
    batch: Option<IndexMap<EpochKey, ConfigRequest>>,
}

impl LiveUpdater {
    /// Scheduler only, no network listener.
    pub fn local(config: &ControlConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { scheduler: scheduler_for(config), server: None, batch: None })
    }

    /// Validate `config`, then start the control channel on `config.address`.
    pub async fn start(config: ControlConfig) -> Result<Self> {
        config.validate()?;
        let scheduler = scheduler_for(&config);
        let server = ControlServer::new(scheduler.clone(), config.credential()?, config.max_frame_len)
            .bind(&config.address)
            .await?;
        Ok(Self { scheduler, server: Some(server), batch: None })
    }

    /// Address of the running control channel, if any.
    pub fn addr(&self) -> Option<SocketAddr> { self.server.as_ref().map(ServerHandle::addr) }

    pub fn scheduler(&self) -> &EpochScheduler { &self.scheduler }

    pub fn events(&self) -> broadcast::Receiver<Event> { self.scheduler.events().subscribe() }

    /// Queue a persistent update for `epoch`.
    pub fn update_config<E, P>(&self, epoch: E, priority: P, payload: ConfigPayload) -> Result<Vec<String>>
    where
        E: TryInto<EpochKey>,
        P: TryInto<Priority>,
        Error: From<E::Error> + From<P::Error>,
    {
        let request = build(Operation::PersistentUpdate, priority, epoch, payload)?;
        self.scheduler.enqueue(vec![request])
    }

    /// Queue a change that lasts exactly one epoch, starting at the next boundary.
    pub fn one_epoch_config(&self, payload: ConfigPayload) -> Result<Vec<String>> {
        let request = build(Operation::OneEpochUpdate, Priority::NORMAL, EpochKey::Next, payload)?;
        self.scheduler.enqueue(vec![request])
    }

    /// Start collecting steps; any uncommitted batch is discarded.
    pub fn begin_batch(&mut self) { self.batch = Some(IndexMap::new()); }

    /// Add one step to the open batch. A later step for the same epoch replaces the earlier one.
    pub fn add_step<O, P, E>(&mut self, epoch: E, operation: O, priority: P, payload: ConfigPayload) -> Result<()>
    where
        O: TryInto<Operation>,
        P: TryInto<Priority>,
        E: TryInto<EpochKey>,
        Error: From<O::Error> + From<P::Error> + From<E::Error>,
    {
        let batch = self.batch.as_mut().ok_or(DaemonError::NoBatch)?;
        let request = build(operation, priority, epoch, payload)?;
        batch.insert(request.epoch, request);
        Ok(())
    }

    /// Enqueue every collected step at once. An empty or missing batch is refused.
    pub fn commit_batch(&mut self) -> Result<Vec<String>> {
        let batch = self.batch.take().ok_or(DaemonError::NoBatch)?;
        if batch.is_empty() {
            return Err(DaemonError::EmptyBatch);
        }
        self.scheduler.enqueue(batch.into_values().collect())
    }

    /// Boundary hook: forward to the scheduler, which also calls the host's own hook.
    pub fn on_epoch_end<H: TrainingHost + ?Sized>(&self, epoch: u64, host: &mut H) -> BoundaryReport {
        self.scheduler.on_epoch_end(epoch, host)
    }

    /// Stop the control channel. Idempotent.
    pub async fn on_train_end(&mut self) -> Result<()> {
        if let Some(server) = self.server.take() {
            server.shutdown().await?;
            info!(pending = self.scheduler.pending(), "training ended, control channel closed");
        }
        Ok(())
    }
}

fn scheduler_for(config: &ControlConfig) -> EpochScheduler {
    EpochScheduler::new(config.restrictions.clone(), EventSystem::default(), config.max_pending_requests)
}
