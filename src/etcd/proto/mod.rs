//! Protobuf encoding for etcd v3 messages.
//!
//! Manual `prost::Message` implementations for the subset of
//! `etcdserverpb`/`mvccpb` this client speaks, so no proto files or build
//! time codegen are needed. Field numbers follow etcd's `rpc.proto` and
//! `kv.proto`.
//!
//! Oneof fields are modeled as `Option<enum>`. An unknown oneof member
//! decodes as `None`, which the typed layer reports as a protocol
//! violation instead of guessing.

use prost::bytes::Buf;
use prost::encoding::{self, DecodeContext, WireType};
use prost::{DecodeError, Message};

/// Implements `Message` for request types that carry no fields.
macro_rules! empty_message {
    ($name:ident, $doc:literal) => {
        #[doc = $doc]
        #[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
        pub struct $name;

        impl prost::Message for $name {
            fn encode_raw(&self, _buf: &mut impl prost::bytes::BufMut)
            where
                Self: Sized,
            {
            }

            fn merge_field(
                &mut self,
                tag: u32,
                wire_type: prost::encoding::WireType,
                buf: &mut impl prost::bytes::Buf,
                ctx: prost::encoding::DecodeContext,
            ) -> Result<(), prost::DecodeError>
            where
                Self: Sized,
            {
                prost::encoding::skip_field(wire_type, tag, buf, ctx)
            }

            fn encoded_len(&self) -> usize {
                0
            }

            fn clear(&mut self) {}
        }
    };
}

mod kv;
mod maintenance;
mod txn;

pub use kv::{
    CompactionRequest, CompactionResponse, DeleteRangeRequest, DeleteRangeResponse, KeyValue,
    PutRequest, PutResponse, RangeRequest, RangeResponse, ResponseHeader,
};
pub use maintenance::{
    AlarmAction, AlarmMember, AlarmRequest, AlarmResponse, AlarmType, DefragmentRequest,
    DefragmentResponse, SnapshotRequest, SnapshotResponse, StatusRequest, StatusResponse,
};
pub use txn::{
    Compare, CompareResult, CompareTarget, RequestOp, RequestOpKind, ResponseOp, ResponseOpKind,
    TargetUnion, TxnRequest, TxnResponse,
};

/// Merge an optional sub-message field, creating it on first sight.
fn merge_optional<M: Message + Default>(
    slot: &mut Option<M>,
    wire_type: WireType,
    buf: &mut impl Buf,
    ctx: DecodeContext,
) -> Result<(), DecodeError> {
    let mut msg = slot.take().unwrap_or_default();
    encoding::message::merge(wire_type, &mut msg, buf, ctx)?;
    *slot = Some(msg);
    Ok(())
}
