// Test harness: one LiveUpdater listening on an ephemeral port, one in-memory host.

use std::net::SocketAddr;

use anyhow::{Context, Result};
use epochctl_core::{ConfigPayload, ConfigTree, ControlConfig, CredentialInput, Namespace};
use epochctl_daemon::{BoundaryReport, LiveConfig, LiveUpdater};
use epochctl_sdk::{ControlClient, SdkConfig};
use serde_json::Value;
use tracing::info;

/// Test result type alias
pub type TestResult<T> = Result<T>;

pub struct TestHarness {
    updater: LiveUpdater,
    host: LiveConfig,
    addr: SocketAddr,
    server_config: ControlConfig,
    epoch: u64,
}

impl TestHarness {
    /// Start a control channel guarded by `credentials` over a host holding `params` and `model`.
    pub async fn start(credentials: Value, params: Value, model: Value) -> Result<Self> {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_env_filter(tracing_subscriber::EnvFilter::new("debug"))
            .try_init();

        let server_config = ControlConfig { address: "127.0.0.1:0".into(), credentials, ..ControlConfig::default() };
        let updater = LiveUpdater::start(server_config.clone()).await.context("start control channel")?;
        let addr = updater.addr().context("control channel has no address")?;
        let host = LiveConfig::new(
            ConfigPayload::new()
                .with(Namespace::Params, ConfigTree::from_value(params)?)
                .with(Namespace::Model, ConfigTree::from_value(model)?),
        );
        info!(%addr, "harness ready");
        Ok(Self { updater, host, addr, server_config, epoch: 0 })
    }

    pub async fn client(&self, credentials: impl Into<CredentialInput>) -> Result<ControlClient> {
        let cfg = SdkConfig { endpoint: self.addr.to_string(), ..SdkConfig::for_server(&self.server_config) };
        ControlClient::connect(cfg, credentials).await.context("connect client")
    }

    /// Finish the current epoch and run the boundary handler.
    pub fn finish_epoch(&mut self) -> BoundaryReport {
        let report = self.updater.on_epoch_end(self.epoch, &mut self.host);
        self.epoch += 1;
        report
    }

    /// The epoch currently running.
    pub fn epoch(&self) -> u64 { self.epoch }

    pub fn updater(&self) -> &LiveUpdater { &self.updater }

    pub fn live(&self, ns: Namespace, key: &str) -> Option<&Value> { self.host.namespace(ns).get(key) }

    pub async fn shutdown(mut self) -> Result<()> {
        self.updater.on_train_end().await?;
        Ok(())
    }
}
