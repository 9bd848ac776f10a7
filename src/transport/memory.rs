//! In-process MVCC transport.
//!
//! [`MemoryTransport`] serves the KV and Maintenance contracts from a
//! single-member store kept in memory. Every write bumps the store revision
//! once; a transaction applies its whole branch at one revision. Keys keep
//! their history until compacted, so reads at an older revision work the way
//! they do against etcd.
//!
//! Calls run as tasks on the runtime given at construction. An optional
//! latency delays every call, and [`MemoryTransport::fail_next`] makes the
//! next call fail with a chosen status, which is how the bridge's
//! cancellation and error paths are exercised without a server.

use crate::client::bridge::PendingCall;
use crate::core::config::SnapshotConfig;
use crate::etcd::kv::{SortOrder, SortTarget};
use crate::etcd::proto::{
    self, AlarmAction, CompareResult, CompareTarget, RequestOpKind, ResponseOpKind, TargetUnion,
};
use crate::transport::{KvRpc, MaintenanceRpc, StreamCompletion, StreamObserver};
use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use prost::Message;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet, VecDeque};
use std::ops::Bound;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tonic::Status;

const CLUSTER_ID: u64 = 0x6c61_7474;
const MEMBER_ID: u64 = 1;
const SERVER_VERSION: &str = "3.5.0";

fn compacted_error() -> Status {
    Status::out_of_range("etcdserver: mvcc: required revision has been compacted")
}

fn future_revision_error() -> Status {
    Status::out_of_range("etcdserver: mvcc: required revision is a future revision")
}

/// One entry of a key's history. `kv` is `None` for a deletion.
#[derive(Debug, Clone)]
struct Revisioned {
    mod_revision: i64,
    kv: Option<proto::KeyValue>,
}

/// The key as seen at `revision` (0 for latest).
fn visible(history: &[Revisioned], revision: i64) -> Option<&proto::KeyValue> {
    let entry = if revision <= 0 {
        history.last()
    } else {
        history.iter().rev().find(|r| r.mod_revision <= revision)
    };
    entry.and_then(|r| r.kv.as_ref())
}

fn compare_ordering(ordering: Ordering, result: CompareResult) -> bool {
    match result {
        CompareResult::Equal => ordering == Ordering::Equal,
        CompareResult::NotEqual => ordering != Ordering::Equal,
        CompareResult::Greater => ordering == Ordering::Greater,
        CompareResult::Less => ordering == Ordering::Less,
    }
}

/// Evaluate one compare against a key, `None` when the key does not exist.
///
/// A missing key has version and revisions 0; a value compare on a missing
/// key never holds.
fn compare_kv(
    kv: Option<&proto::KeyValue>,
    target: CompareTarget,
    operand: Option<&TargetUnion>,
    result: CompareResult,
) -> Result<bool, Status> {
    let ordering = match (target, operand) {
        (CompareTarget::Version, Some(TargetUnion::Version(v))) => {
            kv.map_or(0, |kv| kv.version).cmp(v)
        }
        (CompareTarget::Create, Some(TargetUnion::CreateRevision(v))) => {
            kv.map_or(0, |kv| kv.create_revision).cmp(v)
        }
        (CompareTarget::Mod, Some(TargetUnion::ModRevision(v))) => {
            kv.map_or(0, |kv| kv.mod_revision).cmp(v)
        }
        (CompareTarget::Lease, Some(TargetUnion::Lease(v))) => kv.map_or(0, |kv| kv.lease).cmp(v),
        (CompareTarget::Value, Some(TargetUnion::Value(v))) => match kv {
            Some(kv) => kv.value.as_slice().cmp(v.as_slice()),
            None => return Ok(false),
        },
        _ => {
            return Err(Status::invalid_argument(
                "etcdserver: compare target does not match its operand",
            ))
        }
    };
    Ok(compare_ordering(ordering, result))
}

fn duplicate_key_error() -> Status {
    Status::invalid_argument("etcdserver: duplicate key given in txn request")
}

/// Whether `[start, end)` selects `key`, with the same conventions as a range
/// request.
fn covers(start: &[u8], end: &[u8], key: &[u8]) -> bool {
    if end.is_empty() {
        key == start
    } else if end == [0u8].as_slice() {
        key >= start
    } else {
        key >= start && key < end
    }
}

fn sort_kvs(kvs: &mut [proto::KeyValue], order: SortOrder, target: SortTarget) {
    if order == SortOrder::None && target == SortTarget::Key {
        return;
    }
    kvs.sort_by(|a, b| {
        let ordering = match target {
            SortTarget::Key => a.key.cmp(&b.key),
            SortTarget::Version => a.version.cmp(&b.version),
            SortTarget::Create => a.create_revision.cmp(&b.create_revision),
            SortTarget::Mod => a.mod_revision.cmp(&b.mod_revision),
            SortTarget::Value => a.value.cmp(&b.value),
        };
        if order == SortOrder::Descend {
            ordering.reverse()
        } else {
            ordering
        }
    });
}

fn within_revision_filters(kv: &proto::KeyValue, req: &proto::RangeRequest) -> bool {
    (req.min_mod_revision == 0 || kv.mod_revision >= req.min_mod_revision)
        && (req.max_mod_revision == 0 || kv.mod_revision <= req.max_mod_revision)
        && (req.min_create_revision == 0 || kv.create_revision >= req.min_create_revision)
        && (req.max_create_revision == 0 || kv.create_revision <= req.max_create_revision)
}

// ============================================================================
// Store
// ============================================================================

/// Single-member MVCC store.
#[derive(Debug)]
struct MemoryStore {
    revision: i64,
    /// Revision of the last compaction, 0 when never compacted.
    compacted: i64,
    keys: BTreeMap<Vec<u8>, Vec<Revisioned>>,
    alarms: Vec<proto::AlarmMember>,
}

impl MemoryStore {
    fn new() -> Self {
        Self {
            revision: 1,
            compacted: 0,
            keys: BTreeMap::new(),
            alarms: Vec::new(),
        }
    }

    fn header(&self) -> proto::ResponseHeader {
        proto::ResponseHeader {
            cluster_id: CLUSTER_ID,
            member_id: MEMBER_ID,
            revision: self.revision,
            raft_term: 1,
        }
    }

    fn check_read_revision(&self, revision: i64) -> Result<(), Status> {
        if revision > 0 && revision < self.compacted {
            return Err(compacted_error());
        }
        if revision > self.revision {
            return Err(future_revision_error());
        }
        Ok(())
    }

    /// Live keys of `[key, range_end)` at `revision`, in key order.
    ///
    /// An empty `range_end` selects `key` alone; `[0]` selects every key from
    /// `key` on.
    fn scan(&self, key: &[u8], range_end: &[u8], revision: i64) -> Vec<&proto::KeyValue> {
        let histories: Box<dyn Iterator<Item = &Vec<Revisioned>> + '_> = if range_end.is_empty() {
            Box::new(self.keys.get(key).into_iter())
        } else if range_end == [0u8].as_slice() {
            Box::new(
                self.keys
                    .range::<[u8], _>((Bound::Included(key), Bound::Unbounded))
                    .map(|(_, h)| h),
            )
        } else if range_end <= key {
            Box::new(std::iter::empty())
        } else {
            Box::new(
                self.keys
                    .range::<[u8], _>((Bound::Included(key), Bound::Excluded(range_end)))
                    .map(|(_, h)| h),
            )
        };

        histories.filter_map(|h| visible(h, revision)).collect()
    }

    fn latest(&self, key: &[u8]) -> Option<&proto::KeyValue> {
        self.keys.get(key).and_then(|h| visible(h, 0))
    }

    fn evaluate(&self, cmp: &proto::Compare) -> Result<bool, Status> {
        let result = CompareResult::from_wire(cmp.result)
            .ok_or_else(|| Status::invalid_argument("etcdserver: unknown compare result"))?;
        let target = CompareTarget::from_wire(cmp.target)
            .ok_or_else(|| Status::invalid_argument("etcdserver: unknown compare target"))?;
        let operand = cmp.target_union.as_ref();

        let kvs = self.scan(&cmp.key, &cmp.range_end, 0);
        if kvs.is_empty() {
            return compare_kv(None, target, operand, result);
        }
        for kv in kvs {
            if !compare_kv(Some(kv), target, operand, result)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn range(&self, req: &proto::RangeRequest) -> Result<proto::RangeResponse, Status> {
        self.check_read_revision(req.revision)?;
        let order = SortOrder::from_wire(req.sort_order)
            .ok_or_else(|| Status::invalid_argument("etcdserver: unknown sort order"))?;
        let target = SortTarget::from_wire(req.sort_target)
            .ok_or_else(|| Status::invalid_argument("etcdserver: unknown sort target"))?;

        let mut kvs: Vec<proto::KeyValue> = self
            .scan(&req.key, &req.range_end, req.revision)
            .into_iter()
            .filter(|kv| within_revision_filters(kv, req))
            .cloned()
            .collect();
        sort_kvs(&mut kvs, order, target);

        let count = kvs.len() as i64;
        if req.count_only {
            return Ok(proto::RangeResponse {
                header: Some(self.header()),
                kvs: Vec::new(),
                more: false,
                count,
            });
        }

        let mut more = false;
        if req.limit > 0 && kvs.len() > req.limit as usize {
            kvs.truncate(req.limit as usize);
            more = true;
        }
        if req.keys_only {
            for kv in &mut kvs {
                kv.value.clear();
            }
        }

        Ok(proto::RangeResponse {
            header: Some(self.header()),
            kvs,
            more,
            count,
        })
    }

    /// Write one key at `write_revision` without bumping the store revision.
    fn put_at(
        &mut self,
        req: proto::PutRequest,
        write_revision: i64,
    ) -> Result<proto::PutResponse, Status> {
        let prev = self.latest(&req.key).cloned();
        if (req.ignore_value || req.ignore_lease) && prev.is_none() {
            return Err(Status::not_found("etcdserver: key not found"));
        }

        let kv = proto::KeyValue {
            key: req.key.clone(),
            value: match (&prev, req.ignore_value) {
                (Some(prev), true) => prev.value.clone(),
                _ => req.value,
            },
            create_revision: prev.as_ref().map_or(write_revision, |p| p.create_revision),
            mod_revision: write_revision,
            version: prev.as_ref().map_or(1, |p| p.version + 1),
            lease: match (&prev, req.ignore_lease) {
                (Some(prev), true) => prev.lease,
                _ => req.lease,
            },
        };
        self.keys.entry(req.key).or_default().push(Revisioned {
            mod_revision: write_revision,
            kv: Some(kv),
        });

        Ok(proto::PutResponse {
            header: None,
            prev_kv: if req.prev_kv { prev } else { None },
        })
    }

    /// Delete a range at `write_revision` without bumping the store revision.
    fn delete_at(
        &mut self,
        req: &proto::DeleteRangeRequest,
        write_revision: i64,
    ) -> proto::DeleteRangeResponse {
        let removed: Vec<proto::KeyValue> = self
            .scan(&req.key, &req.range_end, 0)
            .into_iter()
            .cloned()
            .collect();
        for kv in &removed {
            if let Some(history) = self.keys.get_mut(&kv.key) {
                history.push(Revisioned {
                    mod_revision: write_revision,
                    kv: None,
                });
            }
        }

        proto::DeleteRangeResponse {
            header: None,
            deleted: removed.len() as i64,
            prev_kvs: if req.prev_kv { removed } else { Vec::new() },
        }
    }

    fn put(&mut self, req: proto::PutRequest) -> Result<proto::PutResponse, Status> {
        if req.key.is_empty() {
            return Err(Status::invalid_argument("etcdserver: key is not provided"));
        }
        let write_revision = self.revision + 1;
        let mut response = self.put_at(req, write_revision)?;
        self.revision = write_revision;
        response.header = Some(self.header());
        Ok(response)
    }

    fn delete_range(
        &mut self,
        req: proto::DeleteRangeRequest,
    ) -> Result<proto::DeleteRangeResponse, Status> {
        if req.key.is_empty() {
            return Err(Status::invalid_argument("etcdserver: key is not provided"));
        }
        let write_revision = self.revision + 1;
        let mut response = self.delete_at(&req, write_revision);
        if response.deleted > 0 {
            self.revision = write_revision;
        }
        response.header = Some(self.header());
        Ok(response)
    }

    /// Reject a branch before any of it is applied, so a failing branch
    /// leaves the store untouched.
    fn validate_branch(&self, ops: &[proto::RequestOp]) -> Result<(), Status> {
        let mut written = HashSet::new();
        let mut deleted = Vec::new();
        for op in ops {
            match &op.request {
                Some(RequestOpKind::Put(put)) => {
                    if put.key.is_empty() {
                        return Err(Status::invalid_argument("etcdserver: key is not provided"));
                    }
                    if !written.insert(put.key.as_slice()) {
                        return Err(duplicate_key_error());
                    }
                    if (put.ignore_value || put.ignore_lease) && self.latest(&put.key).is_none() {
                        return Err(Status::not_found("etcdserver: key not found"));
                    }
                }
                Some(RequestOpKind::Range(range)) => {
                    self.check_read_revision(range.revision)?;
                    SortOrder::from_wire(range.sort_order)
                        .ok_or_else(|| Status::invalid_argument("etcdserver: unknown sort order"))?;
                    SortTarget::from_wire(range.sort_target).ok_or_else(|| {
                        Status::invalid_argument("etcdserver: unknown sort target")
                    })?;
                }
                Some(RequestOpKind::DeleteRange(delete)) => {
                    if delete.key.is_empty() {
                        return Err(Status::invalid_argument("etcdserver: key is not provided"));
                    }
                    deleted.push((delete.key.as_slice(), delete.range_end.as_slice()));
                }
                None => {
                    return Err(Status::invalid_argument(
                        "etcdserver: unsupported txn request op",
                    ))
                }
            }
        }

        let overlaps = written.iter().any(|key| {
            deleted
                .iter()
                .any(|(start, end)| covers(start, end, key))
        });
        if overlaps {
            return Err(duplicate_key_error());
        }
        Ok(())
    }

    /// Evaluate the compares and apply one branch at a single revision.
    fn txn(&mut self, req: proto::TxnRequest) -> Result<proto::TxnResponse, Status> {
        let mut succeeded = true;
        for cmp in &req.compare {
            if !self.evaluate(cmp)? {
                succeeded = false;
            }
        }
        let ops = if succeeded { req.success } else { req.failure };
        self.validate_branch(&ops)?;

        let write_revision = self.revision + 1;
        let mut wrote = false;
        let mut responses = Vec::with_capacity(ops.len());
        for op in ops {
            let response = match op.request {
                Some(RequestOpKind::Range(range)) => ResponseOpKind::Range(self.range(&range)?),
                Some(RequestOpKind::Put(put)) => {
                    wrote = true;
                    ResponseOpKind::Put(self.put_at(put, write_revision)?)
                }
                Some(RequestOpKind::DeleteRange(delete)) => {
                    let response = self.delete_at(&delete, write_revision);
                    wrote |= response.deleted > 0;
                    ResponseOpKind::DeleteRange(response)
                }
                None => continue,
            };
            responses.push(proto::ResponseOp {
                response: Some(response),
            });
        }
        if wrote {
            self.revision = write_revision;
        }

        let header = self.header();
        for op in &mut responses {
            match &mut op.response {
                Some(ResponseOpKind::Range(r)) => r.header = Some(header.clone()),
                Some(ResponseOpKind::Put(r)) => r.header = Some(header.clone()),
                Some(ResponseOpKind::DeleteRange(r)) => r.header = Some(header.clone()),
                None => {}
            }
        }

        Ok(proto::TxnResponse {
            header: Some(header),
            succeeded,
            responses,
        })
    }

    /// Drop history superseded at `revision`, keeping each key's state at it.
    fn compact(&mut self, req: proto::CompactionRequest) -> Result<proto::CompactionResponse, Status> {
        if self.compacted > 0 && req.revision <= self.compacted {
            return Err(compacted_error());
        }
        if req.revision > self.revision {
            return Err(future_revision_error());
        }

        for history in self.keys.values_mut() {
            if let Some(at) = history.iter().rposition(|r| r.mod_revision <= req.revision) {
                let keep_from = if history[at].kv.is_some() { at } else { at + 1 };
                history.drain(..keep_from);
            }
        }
        self.keys.retain(|_, history| !history.is_empty());
        self.compacted = req.revision;

        Ok(proto::CompactionResponse {
            header: Some(self.header()),
        })
    }

    fn db_size(&self) -> i64 {
        self.keys
            .iter()
            .map(|(key, history)| {
                key.len()
                    + history
                        .iter()
                        .map(|r| 8 + r.kv.as_ref().map_or(0, |kv| kv.encoded_len()))
                        .sum::<usize>()
            })
            .sum::<usize>() as i64
    }

    fn status(&self) -> proto::StatusResponse {
        proto::StatusResponse {
            header: Some(self.header()),
            version: SERVER_VERSION.to_string(),
            db_size: self.db_size(),
            leader: MEMBER_ID,
            raft_index: self.revision as u64,
            raft_term: 1,
        }
    }

    /// Release keys that only hold compacted deletions.
    fn defragment(&mut self) -> proto::DefragmentResponse {
        let compacted = self.compacted;
        self.keys.retain(|_, history| {
            history
                .iter()
                .any(|r| r.kv.is_some() || r.mod_revision > compacted)
        });
        for history in self.keys.values_mut() {
            history.shrink_to_fit();
        }
        proto::DefragmentResponse {
            header: Some(self.header()),
        }
    }

    fn alarm(&mut self, req: proto::AlarmRequest) -> Result<proto::AlarmResponse, Status> {
        let action = AlarmAction::from_wire(req.action)
            .ok_or_else(|| Status::invalid_argument("etcdserver: unknown alarm action"))?;
        if proto::AlarmType::from_wire(req.alarm).is_none() {
            return Err(Status::invalid_argument("etcdserver: unknown alarm type"));
        }

        let alarms = match action {
            AlarmAction::Get => self.alarms.clone(),
            AlarmAction::Activate => {
                let member = proto::AlarmMember {
                    member_id: req.member_id,
                    alarm: req.alarm,
                };
                if !self.alarms.contains(&member) {
                    self.alarms.push(member);
                }
                vec![member]
            }
            AlarmAction::Deactivate => {
                let (removed, kept) = self
                    .alarms
                    .iter()
                    .copied()
                    .partition(|a| a.member_id == req.member_id && a.alarm == req.alarm);
                self.alarms = kept;
                removed
            }
        };

        Ok(proto::AlarmResponse {
            header: Some(self.header()),
            alarms,
        })
    }

    /// Snapshot payload: every live key, encoded as a range response.
    fn snapshot_blob(&self) -> (proto::ResponseHeader, Bytes) {
        let kvs: Vec<proto::KeyValue> = self
            .keys
            .values()
            .filter_map(|h| visible(h, 0))
            .cloned()
            .collect();
        let header = self.header();
        let blob = proto::RangeResponse {
            header: Some(header.clone()),
            count: kvs.len() as i64,
            kvs,
            more: false,
        }
        .encode_to_vec();
        (header, Bytes::from(blob))
    }
}

// ============================================================================
// Transport
// ============================================================================

/// In-process transport backed by [`MemoryStore`].
pub struct MemoryTransport {
    store: Arc<RwLock<MemoryStore>>,
    runtime: Handle,
    chunk_size: usize,
    latency: Mutex<Duration>,
    failures: Mutex<VecDeque<Status>>,
}

impl MemoryTransport {
    /// Serve calls as tasks on `runtime`, streaming snapshots in
    /// `config.chunk_size` pieces.
    pub fn new(runtime: Handle, config: &SnapshotConfig) -> Self {
        Self {
            store: Arc::new(RwLock::new(MemoryStore::new())),
            runtime,
            chunk_size: config.chunk_size.max(1),
            latency: Mutex::new(Duration::ZERO),
            failures: Mutex::new(VecDeque::new()),
        }
    }

    /// Delay every later call by `latency` before it touches the store.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = latency;
    }

    /// Fail the next call (unary or stream) with `status`. Queued failures are
    /// used in order.
    pub fn fail_next(&self, status: Status) {
        self.failures.lock().push_back(status);
    }

    /// Current store revision.
    pub fn revision(&self) -> i64 {
        self.store.read().revision
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        let store = self.store.read();
        store.keys.values().filter(|h| visible(h, 0).is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn call<Req, Resp, F>(&self, request: Req, apply: F) -> PendingCall<Resp>
    where
        Req: Send + 'static,
        Resp: Send + 'static,
        F: FnOnce(&mut MemoryStore, Req) -> Result<Resp, Status> + Send + 'static,
    {
        let store = self.store.clone();
        let latency = *self.latency.lock();
        let injected = self.failures.lock().pop_front();

        PendingCall::spawn_on(&self.runtime, async move {
            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
            }
            if let Some(status) = injected {
                return Err(status);
            }
            apply(&mut *store.write(), request)
        })
    }
}

impl std::fmt::Debug for MemoryTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryTransport")
            .field("revision", &self.revision())
            .field("chunk_size", &self.chunk_size)
            .finish()
    }
}

impl KvRpc for MemoryTransport {
    fn range(&self, request: proto::RangeRequest) -> PendingCall<proto::RangeResponse> {
        self.call(request, |store, req| store.range(&req))
    }

    fn put(&self, request: proto::PutRequest) -> PendingCall<proto::PutResponse> {
        self.call(request, |store, req| store.put(req))
    }

    fn delete_range(
        &self,
        request: proto::DeleteRangeRequest,
    ) -> PendingCall<proto::DeleteRangeResponse> {
        self.call(request, |store, req| store.delete_range(req))
    }

    fn txn(&self, request: proto::TxnRequest) -> PendingCall<proto::TxnResponse> {
        self.call(request, |store, req| store.txn(req))
    }

    fn compact(&self, request: proto::CompactionRequest) -> PendingCall<proto::CompactionResponse> {
        self.call(request, |store, req| store.compact(req))
    }
}

impl MaintenanceRpc for MemoryTransport {
    fn status(&self, request: proto::StatusRequest) -> PendingCall<proto::StatusResponse> {
        self.call(request, |store, _| Ok(store.status()))
    }

    fn defragment(
        &self,
        request: proto::DefragmentRequest,
    ) -> PendingCall<proto::DefragmentResponse> {
        self.call(request, |store, _| Ok(store.defragment()))
    }

    fn alarm(&self, request: proto::AlarmRequest) -> PendingCall<proto::AlarmResponse> {
        self.call(request, |store, req| store.alarm(req))
    }

    fn snapshot(
        &self,
        _request: proto::SnapshotRequest,
        observer: Arc<dyn StreamObserver<proto::SnapshotResponse>>,
        mut completion: StreamCompletion,
    ) {
        let store = self.store.clone();
        let chunk_size = self.chunk_size;
        let latency = *self.latency.lock();
        let injected = self.failures.lock().pop_front();

        self.runtime.spawn(async move {
            if !latency.is_zero() {
                tokio::select! {
                    _ = completion.completed() => return,
                    _ = tokio::time::sleep(latency) => {}
                }
            }
            if let Some(status) = injected {
                observer.on_error(status);
                return;
            }

            let (header, blob) = store.read().snapshot_blob();
            let total = blob.len();
            let mut offset = 0;
            while offset < total {
                if completion.is_completed() {
                    tracing::debug!(offset, total, "snapshot stream stopped by caller");
                    return;
                }
                let end = (offset + chunk_size).min(total);
                observer.on_next(proto::SnapshotResponse {
                    header: Some(header.clone()),
                    remaining_bytes: (total - end) as u64,
                    blob: blob.slice(offset..end),
                });
                offset = end;
                tokio::task::yield_now().await;
            }
            if !completion.is_completed() {
                observer.on_completed();
            }
        });
    }
}
