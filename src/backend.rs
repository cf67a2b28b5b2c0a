//! Command surface the hub drives. Implementations sit on the other side of
//! the process boundary (the connector runtimes); the hub only orchestrates
//! calls to them.

use async_trait::async_trait;

use crate::{
  connectors::types::{AuthMode, ConnectorId, ConnectorStatus, Doctor, SelfTestResult},
  core::error::HubResult,
  threads::types::{ThreadDetail, ThreadPage},
};

#[async_trait]
pub trait ConnectorBackend: Send + Sync {
  async fn connector_status(&self, id: ConnectorId) -> HubResult<ConnectorStatus>;
  async fn connector_connect(&self, id: ConnectorId) -> HubResult<ConnectorStatus>;
  async fn connector_stop(&self, id: ConnectorId) -> HubResult<()>;
  async fn connector_login(&self, id: ConnectorId, mode: AuthMode) -> HubResult<ConnectorStatus>;
  async fn connector_logout(&self, id: ConnectorId) -> HubResult<()>;
  async fn connector_doctor(&self, id: ConnectorId) -> HubResult<Doctor>;
  async fn connector_install(&self, id: ConnectorId) -> HubResult<Doctor>;
  async fn connector_self_test(&self, id: ConnectorId) -> HubResult<SelfTestResult>;
}

#[async_trait]
pub trait ThreadBackend: Send + Sync {
  async fn thread_list(&self, limit: usize, cursor: Option<String>) -> HubResult<ThreadPage>;
  async fn thread_read(&self, id: &str, max_items: usize) -> HubResult<ThreadDetail>;
}
