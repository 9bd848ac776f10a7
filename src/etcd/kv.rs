//! Key-value data model.
//!
//! Typed headers, key-values, per-operation options and results. Options turn
//! into wire requests here and wire responses turn into results here, so the
//! single-call KV methods and the transaction codec share one conversion.

use super::proto;
use serde::{Deserialize, Serialize};

/// Response header included in all etcd responses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    /// Cluster ID.
    pub cluster_id: u64,
    /// Member ID.
    pub member_id: u64,
    /// Revision at which the operation was performed.
    pub revision: i64,
    /// Raft term.
    pub raft_term: u64,
}

impl From<proto::ResponseHeader> for Header {
    fn from(header: proto::ResponseHeader) -> Self {
        Self {
            cluster_id: header.cluster_id,
            member_id: header.member_id,
            revision: header.revision,
            raft_term: header.raft_term,
        }
    }
}

impl From<Option<proto::ResponseHeader>> for Header {
    fn from(header: Option<proto::ResponseHeader>) -> Self {
        header.map(Header::from).unwrap_or_default()
    }
}

impl From<Header> for proto::ResponseHeader {
    fn from(header: Header) -> Self {
        Self {
            cluster_id: header.cluster_id,
            member_id: header.member_id,
            revision: header.revision,
            raft_term: header.raft_term,
        }
    }
}

/// Key-value pair.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyValue {
    /// Key.
    pub key: Vec<u8>,
    /// Value. Empty for keys-only reads.
    pub value: Vec<u8>,
    /// Revision when created.
    pub create_revision: i64,
    /// Revision of last modification.
    pub mod_revision: i64,
    /// Version (number of modifications).
    pub version: i64,
    /// Attached lease ID.
    pub lease: i64,
}

impl From<proto::KeyValue> for KeyValue {
    fn from(kv: proto::KeyValue) -> Self {
        Self {
            key: kv.key,
            value: kv.value,
            create_revision: kv.create_revision,
            mod_revision: kv.mod_revision,
            version: kv.version,
            lease: kv.lease,
        }
    }
}

impl KeyValue {
    /// Value as UTF-8, if it is.
    pub fn value_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.value).ok()
    }
}

/// Sort order for range results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortOrder {
    #[default]
    None,
    Ascend,
    Descend,
}

impl SortOrder {
    pub(crate) fn to_wire(self) -> i32 {
        match self {
            Self::None => 0,
            Self::Ascend => 1,
            Self::Descend => 2,
        }
    }

    pub(crate) fn from_wire(value: i32) -> Option<Self> {
        match value {
            0 => Some(Self::None),
            1 => Some(Self::Ascend),
            2 => Some(Self::Descend),
            _ => None,
        }
    }
}

/// Sort target for range results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortTarget {
    #[default]
    Key,
    Version,
    Create,
    Mod,
    Value,
}

impl SortTarget {
    pub(crate) fn to_wire(self) -> i32 {
        match self {
            Self::Key => 0,
            Self::Version => 1,
            Self::Create => 2,
            Self::Mod => 3,
            Self::Value => 4,
        }
    }

    pub(crate) fn from_wire(value: i32) -> Option<Self> {
        match value {
            0 => Some(Self::Key),
            1 => Some(Self::Version),
            2 => Some(Self::Create),
            3 => Some(Self::Mod),
            4 => Some(Self::Value),
            _ => None,
        }
    }
}

/// Range end covering every key with the given prefix.
///
/// An empty prefix, or one made only of `0xff` bytes, yields `[0]`, which
/// etcd reads as "to the end of the keyspace".
pub fn prefix_range_end(prefix: &[u8]) -> Vec<u8> {
    let mut end = prefix.to_vec();
    while let Some(last) = end.pop() {
        if last < 0xff {
            end.push(last + 1);
            return end;
        }
    }
    vec![0]
}

// ============================================================================
// Options
// ============================================================================

/// Options for a put.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PutOptions {
    /// Lease ID to attach (0 for none).
    pub lease: i64,
    /// Return the previous key-value.
    pub prev_kv: bool,
}

impl PutOptions {
    pub fn with_lease(mut self, lease: i64) -> Self {
        self.lease = lease;
        self
    }

    pub fn with_prev_kv(mut self) -> Self {
        self.prev_kv = true;
        self
    }

    pub(crate) fn to_request(self, key: Vec<u8>, value: Vec<u8>) -> proto::PutRequest {
        proto::PutRequest {
            key,
            value,
            lease: self.lease,
            prev_kv: self.prev_kv,
            ..Default::default()
        }
    }
}

/// Options for a get (range read).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetOptions {
    /// Exclusive end of the range. `None` reads a single key.
    pub end_key: Option<Vec<u8>>,
    /// Maximum number of keys to return (0 for no limit).
    pub limit: i64,
    /// Revision to read at (0 for latest).
    pub revision: i64,
    pub sort_order: SortOrder,
    pub sort_target: SortTarget,
    /// Serve from the local member without consensus.
    pub serializable: bool,
    /// Only return keys, not values.
    pub keys_only: bool,
    /// Only return the count of matching keys.
    pub count_only: bool,
}

impl GetOptions {
    pub fn with_end_key(mut self, end_key: impl Into<Vec<u8>>) -> Self {
        self.end_key = Some(end_key.into());
        self
    }

    /// Read every key starting with `prefix`.
    pub fn with_prefix(mut self, prefix: &[u8]) -> Self {
        self.end_key = Some(prefix_range_end(prefix));
        self
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_revision(mut self, revision: i64) -> Self {
        self.revision = revision;
        self
    }

    pub fn with_sort(mut self, order: SortOrder, target: SortTarget) -> Self {
        self.sort_order = order;
        self.sort_target = target;
        self
    }

    pub fn with_serializable(mut self) -> Self {
        self.serializable = true;
        self
    }

    pub fn with_keys_only(mut self) -> Self {
        self.keys_only = true;
        self
    }

    pub fn with_count_only(mut self) -> Self {
        self.count_only = true;
        self
    }

    pub(crate) fn to_request(&self, key: Vec<u8>) -> proto::RangeRequest {
        proto::RangeRequest {
            key,
            range_end: self.end_key.clone().unwrap_or_default(),
            limit: self.limit,
            revision: self.revision,
            sort_order: self.sort_order.to_wire(),
            sort_target: self.sort_target.to_wire(),
            serializable: self.serializable,
            keys_only: self.keys_only,
            count_only: self.count_only,
            ..Default::default()
        }
    }
}

/// Options for a delete.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteOptions {
    /// Exclusive end of the range. `None` deletes a single key.
    pub end_key: Option<Vec<u8>>,
    /// Return the deleted key-values.
    pub prev_kv: bool,
}

impl DeleteOptions {
    pub fn with_end_key(mut self, end_key: impl Into<Vec<u8>>) -> Self {
        self.end_key = Some(end_key.into());
        self
    }

    pub fn with_prefix(mut self, prefix: &[u8]) -> Self {
        self.end_key = Some(prefix_range_end(prefix));
        self
    }

    pub fn with_prev_kv(mut self) -> Self {
        self.prev_kv = true;
        self
    }

    pub(crate) fn to_request(&self, key: Vec<u8>) -> proto::DeleteRangeRequest {
        proto::DeleteRangeRequest {
            key,
            range_end: self.end_key.clone().unwrap_or_default(),
            prev_kv: self.prev_kv,
        }
    }
}

/// Options for a compaction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompactOptions {
    /// Revision to compact up to.
    pub revision: i64,
    /// Wait until the compaction is physically applied.
    pub physical: bool,
}

impl CompactOptions {
    pub fn with_revision(mut self, revision: i64) -> Self {
        self.revision = revision;
        self
    }

    pub fn with_physical(mut self) -> Self {
        self.physical = true;
        self
    }

    pub(crate) fn to_request(self) -> proto::CompactionRequest {
        proto::CompactionRequest {
            revision: self.revision,
            physical: self.physical,
        }
    }
}

// ============================================================================
// Results
// ============================================================================

/// Result of a put.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PutResult {
    pub header: Header,
    /// Previous key-value, when requested and present.
    pub prev_kv: Option<KeyValue>,
}

impl From<proto::PutResponse> for PutResult {
    fn from(response: proto::PutResponse) -> Self {
        Self {
            header: response.header.into(),
            prev_kv: response.prev_kv.map(KeyValue::from),
        }
    }
}

/// Result of a range read.
///
/// `more` and `count` are meaningful even when `kvs` is empty (count-only
/// reads, or a limit of zero matches).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeResult {
    pub header: Header,
    pub kvs: Vec<KeyValue>,
    /// More keys match than were returned.
    pub more: bool,
    /// Total number of keys matching the range.
    pub count: i64,
}

impl From<proto::RangeResponse> for RangeResult {
    fn from(response: proto::RangeResponse) -> Self {
        Self {
            header: response.header.into(),
            kvs: response.kvs.into_iter().map(KeyValue::from).collect(),
            more: response.more,
            count: response.count,
        }
    }
}

/// Result of a delete.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteResult {
    pub header: Header,
    /// Number of keys deleted.
    pub deleted: i64,
    /// Deleted key-values, when requested.
    pub prev_kvs: Vec<KeyValue>,
}

impl From<proto::DeleteRangeResponse> for DeleteResult {
    fn from(response: proto::DeleteRangeResponse) -> Self {
        Self {
            header: response.header.into(),
            deleted: response.deleted,
            prev_kvs: response.prev_kvs.into_iter().map(KeyValue::from).collect(),
        }
    }
}
