//! Lattice client - asynchronous etcd v3 client core.
//!
//! Every RPC returns immediately with a [`BridgedCall`]: a future that
//! resolves on the client's own callback thread with a typed result or a
//! [`ClientError`]. Transactions are built with [`Txn::builder`] and mapped to
//! and from the wire by [`TxnCodec`]. The maintenance client streams
//! snapshot chunks into a single, swappable [`SnapshotCallback`].
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                 KvClient        MaintenanceClient               │
//! │        put/get/delete/commit    status/alarm/snapshot slot      │
//! └─────────────────────────────────────────────────────────────────┘
//!                                  │
//! ┌─────────────────────────────────────────────────────────────────┐
//! │     AsyncBridge: PendingCall ──▶ callback context ──▶ BridgedCall│
//! │     TxnCodec: Txn ⇄ TxnRequest / TxnResponse                     │
//! └─────────────────────────────────────────────────────────────────┘
//!                                  │
//! ┌─────────────────────────────────────────────────────────────────┐
//! │        KvRpc / MaintenanceRpc: GrpcTransport │ MemoryTransport   │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Module Organization
//!
//! - [`core::config`] - Configuration parsing and validation
//! - [`core::error`] - Error taxonomy
//! - [`core::telemetry`] - Tracing setup
//! - [`etcd`] - Data model, wire messages and [`TxnCodec`]
//! - [`client`] - Bridge, resource clients and the snapshot slot
//! - [`transport`] - Transport contracts, gRPC and in-memory transports
//!
//! # Example
//!
//! ```no_run
//! use lattice_client::{Client, ClientConfig, Cmp, CmpOp, Op, PutOptions, Txn};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let client = Client::connect(&ClientConfig::default()).await?;
//! client.kv().put("config/mode", "active").await?;
//!
//! let txn = Txn::builder()
//!     .when([Cmp::value("config/mode", CmpOp::Equal, "active")?])
//!     .then([Op::put("config/owner", "me", PutOptions::default())])
//!     .build();
//! let result = client.kv().commit(&txn).await?;
//! assert!(result.succeeded);
//! client.close();
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod core;
pub mod etcd;
pub mod transport;

pub use self::core::config::{ClientConfig, ConfigOverrides};
pub use self::core::error::{ClientError, ClientResult};
pub use client::{
    AsyncBridge, BridgedCall, CallbackContext, CancelHandle, Client, KvClient, MaintenanceClient,
    PendingCall, SnapshotCallback, SnapshotSlot,
};
pub use etcd::{
    Cmp, CmpOp, CmpTarget, DeleteOptions, GetOptions, Header, KeyValue, Op, OperationResult,
    PutOptions, Txn, TxnCodec, TxnResult,
};
pub use transport::{KvRpc, MaintenanceRpc, MemoryTransport};
