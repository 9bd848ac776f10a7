//! Resource clients and the machinery they share.
//!
//! - [`bridge`] - callback context, pending calls and bridged futures
//! - [`snapshot`] - the snapshot stream callback slot
//! - [`kv`] - [`KvClient`]
//! - [`maintenance`] - [`MaintenanceClient`]

pub mod bridge;
pub mod kv;
pub mod maintenance;
pub mod snapshot;

pub use bridge::{AsyncBridge, BridgedCall, CallbackContext, CancelHandle, PendingCall};
pub use kv::KvClient;
pub use maintenance::MaintenanceClient;
pub use snapshot::{SnapshotCallback, SnapshotSlot};

use crate::core::config::ClientConfig;
use crate::core::error::ClientResult;
use crate::transport::{KvRpc, MaintenanceRpc};
use std::sync::Arc;

/// A KV client and a maintenance client over one shared transport.
///
/// Each resource client gets its own callback context, named
/// `{callbacks.thread_prefix}-kv` and `{callbacks.thread_prefix}-maintenance`.
#[derive(Clone, Debug)]
pub struct Client {
    kv: KvClient,
    maintenance: MaintenanceClient,
}

impl Client {
    /// Build clients over an existing transport.
    pub fn with_transport<T>(transport: Arc<T>, config: &ClientConfig) -> ClientResult<Self>
    where
        T: KvRpc + MaintenanceRpc,
    {
        let kv_context = CallbackContext::new(config.callbacks.thread_name("kv"))?;
        let maintenance_context =
            CallbackContext::new(config.callbacks.thread_name("maintenance"))?;

        Ok(Self {
            kv: KvClient::new(transport.clone(), kv_context),
            maintenance: MaintenanceClient::new(transport, maintenance_context),
        })
    }

    /// Connect to the configured endpoint over gRPC.
    #[cfg(feature = "grpc")]
    pub async fn connect(config: &ClientConfig) -> ClientResult<Self> {
        let transport = crate::transport::GrpcTransport::connect(&config.connection).await?;
        tracing::info!(endpoint = %config.connection.endpoint, "etcd client connected");
        Self::with_transport(Arc::new(transport), config)
    }

    pub fn kv(&self) -> &KvClient {
        &self.kv
    }

    pub fn maintenance(&self) -> &MaintenanceClient {
        &self.maintenance
    }

    /// Close the snapshot stream and stop both callback contexts.
    ///
    /// Inside a tokio runtime this does not wait for the context threads to
    /// exit; see [`CallbackContext::shutdown`].
    pub fn close(&self) {
        self.maintenance.close();
        self.kv.close();
    }
}
