//! Transport contracts and implementations.
//!
//! The client core talks to etcd through two shapes only: a unary call that
//! returns a [`PendingCall`], and a server stream delivered to a
//! [`StreamObserver`] until it ends or the caller signals completion through
//! the [`StreamHandle`].
//!
//! - [`grpc`] - tonic channel to a real etcd endpoint (feature `grpc`)
//! - [`memory`] - in-process MVCC store, for tests and embedding

#[cfg(feature = "grpc")]
pub mod grpc;
pub mod memory;

use crate::client::bridge::PendingCall;
use crate::etcd::proto;
use std::sync::Arc;
use tokio::sync::watch;
use tonic::Status;

#[cfg(feature = "grpc")]
pub use grpc::GrpcTransport;
pub use memory::MemoryTransport;

/// Unary calls of the `etcdserverpb.KV` service.
pub trait KvRpc: Send + Sync + 'static {
    fn range(&self, request: proto::RangeRequest) -> PendingCall<proto::RangeResponse>;

    fn put(&self, request: proto::PutRequest) -> PendingCall<proto::PutResponse>;

    fn delete_range(
        &self,
        request: proto::DeleteRangeRequest,
    ) -> PendingCall<proto::DeleteRangeResponse>;

    fn txn(&self, request: proto::TxnRequest) -> PendingCall<proto::TxnResponse>;

    fn compact(&self, request: proto::CompactionRequest) -> PendingCall<proto::CompactionResponse>;
}

/// Calls of the `etcdserverpb.Maintenance` service.
pub trait MaintenanceRpc: Send + Sync + 'static {
    fn status(&self, request: proto::StatusRequest) -> PendingCall<proto::StatusResponse>;

    fn defragment(
        &self,
        request: proto::DefragmentRequest,
    ) -> PendingCall<proto::DefragmentResponse>;

    fn alarm(&self, request: proto::AlarmRequest) -> PendingCall<proto::AlarmResponse>;

    /// Open the snapshot stream.
    ///
    /// Every chunk goes to `observer.on_next`. The stream ends with exactly
    /// one of `on_error` or `on_completed`, unless `completion` fires first,
    /// in which case the transport tears the stream down without further
    /// callbacks.
    fn snapshot(
        &self,
        request: proto::SnapshotRequest,
        observer: Arc<dyn StreamObserver<proto::SnapshotResponse>>,
        completion: StreamCompletion,
    );
}

/// Receiver of one server stream.
pub trait StreamObserver<T>: Send + Sync {
    fn on_next(&self, message: T);

    fn on_error(&self, status: Status);

    fn on_completed(&self);
}

/// Caller side of a stream: signals graceful completion to the transport.
///
/// Dropping the handle completes the stream as well.
#[derive(Debug)]
pub struct StreamHandle {
    done: watch::Sender<bool>,
}

impl StreamHandle {
    pub fn new() -> (Self, StreamCompletion) {
        let (done, rx) = watch::channel(false);
        (Self { done }, StreamCompletion { done: rx })
    }

    /// Ask the transport to stop the stream. Does not wait for teardown.
    pub fn complete(&self) {
        self.done.send_replace(true);
    }
}

/// Transport side of a [`StreamHandle`].
#[derive(Debug, Clone)]
pub struct StreamCompletion {
    done: watch::Receiver<bool>,
}

impl StreamCompletion {
    pub fn is_completed(&self) -> bool {
        *self.done.borrow() || self.done.has_changed().is_err()
    }

    /// Resolves once the handle completes the stream or is dropped.
    pub async fn completed(&mut self) {
        // Err means the handle is gone, which also ends the stream.
        let _ = self.done.wait_for(|done| *done).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_complete_wakes_transport() {
        let (handle, mut completion) = StreamHandle::new();
        assert!(!completion.is_completed());

        let waiter = tokio::spawn(async move {
            completion.completed().await;
            completion.is_completed()
        });
        handle.complete();
        assert!(waiter.await.unwrap());
    }

    #[tokio::test]
    async fn test_dropped_handle_completes() {
        let (handle, mut completion) = StreamHandle::new();
        drop(handle);
        completion.completed().await;
        assert!(completion.is_completed());
    }
}
