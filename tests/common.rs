//! Common test utilities.
//!
//! This module contains shared helpers for integration tests.
//! Import with `mod common;` in test files.

#![allow(dead_code)]

use lattice_client::core::config::ClientConfig;
use lattice_client::etcd::maintenance::SnapshotResult;
use lattice_client::etcd::proto;
use lattice_client::transport::{KvRpc, MaintenanceRpc, StreamCompletion, StreamObserver};
use lattice_client::{Client, ClientError, MemoryTransport, PendingCall, SnapshotCallback};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tempfile::NamedTempFile;
use tokio::runtime::Handle;
use tonic::Status;

/// Write `content` to a temporary config file.
pub fn config_file(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("Failed to create temp file");
    file.write_all(content.as_bytes())
        .expect("Failed to write config");
    file
}

/// Default config with a per-test thread prefix.
pub fn test_config(prefix: &str) -> ClientConfig {
    let mut config = ClientConfig::default();
    config.callbacks.thread_prefix = prefix.to_string();
    config
}

/// A client over a fresh in-memory store.
pub fn memory_client(prefix: &str) -> (Client, Arc<MemoryTransport>) {
    let config = test_config(prefix);
    let transport = Arc::new(MemoryTransport::new(Handle::current(), &config.snapshot));
    let client = Client::with_transport(transport.clone(), &config).expect("client");
    (client, transport)
}

/// Same as [`memory_client`] with a custom snapshot chunk size.
pub fn memory_client_with_chunks(prefix: &str, chunk_size: usize) -> (Client, Arc<MemoryTransport>) {
    let mut config = test_config(prefix);
    config.snapshot.chunk_size = chunk_size;
    let transport = Arc::new(MemoryTransport::new(Handle::current(), &config.snapshot));
    let client = Client::with_transport(transport.clone(), &config).expect("client");
    (client, transport)
}

/// Poll `condition` until it holds or the timeout expires.
pub async fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

// ============================================================================
// Scripted transport
// ============================================================================

pub type OpenedStream = (
    Arc<dyn StreamObserver<proto::SnapshotResponse>>,
    StreamCompletion,
);

/// Transport that answers from queued responses and hands snapshot streams
/// to the test instead of producing chunks.
#[derive(Default)]
pub struct ScriptedTransport {
    pub txn_responses: Mutex<VecDeque<Result<proto::TxnResponse, Status>>>,
    pub alarm_responses: Mutex<VecDeque<Result<proto::AlarmResponse, Status>>>,
    pub alarm_requests: Mutex<Vec<proto::AlarmRequest>>,
    pub txn_requests: Mutex<Vec<proto::TxnRequest>>,
    pub streams: Mutex<Vec<OpenedStream>>,
}

impl ScriptedTransport {
    pub fn push_txn(&self, response: Result<proto::TxnResponse, Status>) {
        self.txn_responses.lock().push_back(response);
    }

    pub fn push_alarm(&self, response: Result<proto::AlarmResponse, Status>) {
        self.alarm_responses.lock().push_back(response);
    }

    /// Observer of the `index`-th opened snapshot stream.
    pub fn observer(&self, index: usize) -> Arc<dyn StreamObserver<proto::SnapshotResponse>> {
        self.streams.lock()[index].0.clone()
    }

    pub fn completion(&self, index: usize) -> StreamCompletion {
        self.streams.lock()[index].1.clone()
    }

    pub fn opened(&self) -> usize {
        self.streams.lock().len()
    }
}

fn unscripted<T: Send + 'static>(method: &'static str) -> PendingCall<T> {
    PendingCall::spawn(async move { Err(Status::unimplemented(method)) })
}

fn next<T: Send + 'static>(
    queue: &Mutex<VecDeque<Result<T, Status>>>,
    method: &'static str,
) -> PendingCall<T> {
    let response = queue
        .lock()
        .pop_front()
        .unwrap_or_else(|| Err(Status::unimplemented(method)));
    PendingCall::spawn(async move { response })
}

impl KvRpc for ScriptedTransport {
    fn range(&self, _: proto::RangeRequest) -> PendingCall<proto::RangeResponse> {
        unscripted("range")
    }

    fn put(&self, _: proto::PutRequest) -> PendingCall<proto::PutResponse> {
        unscripted("put")
    }

    fn delete_range(&self, _: proto::DeleteRangeRequest) -> PendingCall<proto::DeleteRangeResponse> {
        unscripted("delete_range")
    }

    fn txn(&self, request: proto::TxnRequest) -> PendingCall<proto::TxnResponse> {
        self.txn_requests.lock().push(request);
        next(&self.txn_responses, "txn")
    }

    fn compact(&self, _: proto::CompactionRequest) -> PendingCall<proto::CompactionResponse> {
        unscripted("compact")
    }
}

impl MaintenanceRpc for ScriptedTransport {
    fn status(&self, _: proto::StatusRequest) -> PendingCall<proto::StatusResponse> {
        unscripted("status")
    }

    fn defragment(&self, _: proto::DefragmentRequest) -> PendingCall<proto::DefragmentResponse> {
        unscripted("defragment")
    }

    fn alarm(&self, request: proto::AlarmRequest) -> PendingCall<proto::AlarmResponse> {
        self.alarm_requests.lock().push(request);
        next(&self.alarm_responses, "alarm")
    }

    fn snapshot(
        &self,
        _: proto::SnapshotRequest,
        observer: Arc<dyn StreamObserver<proto::SnapshotResponse>>,
        completion: StreamCompletion,
    ) {
        self.streams.lock().push((observer, completion));
    }
}

/// A client over a scripted transport.
pub fn scripted_client(prefix: &str) -> (Client, Arc<ScriptedTransport>) {
    let transport = Arc::new(ScriptedTransport::default());
    let client = Client::with_transport(transport.clone(), &test_config(prefix)).expect("client");
    (client, transport)
}

// ============================================================================
// Recording snapshot callback
// ============================================================================

/// Records everything a snapshot stream delivers.
#[derive(Default)]
pub struct RecordingCallback {
    pub chunks: Mutex<Vec<SnapshotResult>>,
    pub errors: Mutex<Vec<ClientError>>,
    pub completions: Mutex<usize>,
}

impl RecordingCallback {
    pub fn chunk_count(&self) -> usize {
        self.chunks.lock().len()
    }

    pub fn error_count(&self) -> usize {
        self.errors.lock().len()
    }

    pub fn completed(&self) -> bool {
        *self.completions.lock() > 0
    }

    /// Every received blob, concatenated in delivery order.
    pub fn payload(&self) -> Vec<u8> {
        self.chunks
            .lock()
            .iter()
            .flat_map(|c| c.blob.iter().copied())
            .collect()
    }
}

impl SnapshotCallback for RecordingCallback {
    fn on_snapshot(&self, snapshot: SnapshotResult) {
        self.chunks.lock().push(snapshot);
    }

    fn on_error(&self, error: ClientError) {
        self.errors.lock().push(error);
    }

    fn on_completed(&self) {
        *self.completions.lock() += 1;
    }
}

pub fn chunk(remaining_bytes: u64, blob: &'static [u8]) -> proto::SnapshotResponse {
    proto::SnapshotResponse {
        header: Some(proto::ResponseHeader::default()),
        remaining_bytes,
        blob: bytes::Bytes::from_static(blob),
    }
}
