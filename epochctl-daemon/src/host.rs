//! The controlled computation as seen by the scheduler.

use epochctl_core::{ConfigPayload, ConfigTree, Namespace};

/// What a host (training loop) exposes to the boundary handler.
pub trait TrainingHost {
    /// Mutable view of one namespace of the live configuration.
    fn live_config(&mut self, ns: Namespace) -> &mut ConfigTree;

    /// The host's own end-of-epoch hook, called after updates are applied.
    fn on_epoch_end(&mut self, _epoch: u64) {}
}

/// Plain in-memory host: four namespace trees and nothing else.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LiveConfig {
    trees: ConfigPayload,
    epochs_seen: Vec<u64>,
}

impl LiveConfig {
    pub fn new(trees: ConfigPayload) -> Self {
        Self { trees, epochs_seen: Vec::new() }
    }

    pub fn trees(&self) -> &ConfigPayload { &self.trees }

    pub fn namespace(&self, ns: Namespace) -> &ConfigTree { self.trees.namespace(ns) }

    /// Epoch indices passed to [`TrainingHost::on_epoch_end`], in call order.
    pub fn epochs_seen(&self) -> &[u64] { &self.epochs_seen }
}

impl TrainingHost for LiveConfig {
    fn live_config(&mut self, ns: Namespace) -> &mut ConfigTree { self.trees.namespace_mut(ns) }

    fn on_epoch_end(&mut self, epoch: u64) { self.epochs_seen.push(epoch); }
}
