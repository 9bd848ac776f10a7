//! etcd v3 data model and wire types.
//!
//! # Modules
//!
//! - [`proto`] - hand-written protobuf messages for the KV and Maintenance services
//! - [`kv`] - headers, key-values, options and single-operation results
//! - [`txn`] - compare predicates, operations, transactions and [`TxnCodec`]
//! - [`maintenance`] - member status, alarms and snapshot chunks

pub mod kv;
pub mod maintenance;
pub mod proto;
pub mod txn;

pub use kv::{
    prefix_range_end, CompactOptions, DeleteOptions, DeleteResult, GetOptions, Header, KeyValue,
    PutOptions, PutResult, RangeResult, SortOrder, SortTarget,
};
pub use maintenance::{AlarmAction, AlarmList, AlarmMember, AlarmType, MemberStatus, SnapshotResult};
pub use txn::{Cmp, CmpOp, CmpTarget, Op, OperationResult, Txn, TxnBuilder, TxnCodec, TxnResult};
