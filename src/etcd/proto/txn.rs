//! Txn messages: Compare, RequestOp, ResponseOp, TxnRequest, TxnResponse.

use super::kv::{
    DeleteRangeRequest, DeleteRangeResponse, PutRequest, PutResponse, RangeRequest, RangeResponse,
    ResponseHeader,
};
use super::merge_optional;
use prost::bytes::{Buf, BufMut};
use prost::encoding::{self, DecodeContext, WireType};
use prost::{DecodeError, Message};

/// `Compare.CompareResult` wire values.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(i32)]
pub enum CompareResult {
    Equal = 0,
    Greater = 1,
    Less = 2,
    NotEqual = 3,
}

impl CompareResult {
    pub fn from_wire(value: i32) -> Option<Self> {
        match value {
            0 => Some(Self::Equal),
            1 => Some(Self::Greater),
            2 => Some(Self::Less),
            3 => Some(Self::NotEqual),
            _ => None,
        }
    }
}

/// `Compare.CompareTarget` wire values.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(i32)]
pub enum CompareTarget {
    Version = 0,
    Create = 1,
    Mod = 2,
    Value = 3,
    Lease = 4,
}

impl CompareTarget {
    pub fn from_wire(value: i32) -> Option<Self> {
        match value {
            0 => Some(Self::Version),
            1 => Some(Self::Create),
            2 => Some(Self::Mod),
            3 => Some(Self::Value),
            4 => Some(Self::Lease),
            _ => None,
        }
    }
}

/// The `target_union` oneof of `Compare` (fields 4..=8).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TargetUnion {
    Version(i64),
    CreateRevision(i64),
    ModRevision(i64),
    Value(Vec<u8>),
    Lease(i64),
}

/// Wire-format `etcdserverpb.Compare`.
#[derive(Clone, Default, Debug, PartialEq, Eq)]
pub struct Compare {
    pub result: i32,                       // field 1
    pub target: i32,                       // field 2
    pub key: Vec<u8>,                      // field 3
    pub target_union: Option<TargetUnion>, // fields 4..=8
    pub range_end: Vec<u8>,                // field 64
}

impl Compare {
    fn merge_int_target(
        &mut self,
        wrap: fn(i64) -> TargetUnion,
        wire_type: WireType,
        buf: &mut impl Buf,
        ctx: DecodeContext,
    ) -> Result<(), DecodeError> {
        let mut value = 0i64;
        encoding::int64::merge(wire_type, &mut value, buf, ctx)?;
        self.target_union = Some(wrap(value));
        Ok(())
    }
}

impl Message for Compare {
    fn encode_raw(&self, buf: &mut impl BufMut)
    where
        Self: Sized,
    {
        if self.result != 0 {
            encoding::int32::encode(1, &self.result, buf);
        }
        if self.target != 0 {
            encoding::int32::encode(2, &self.target, buf);
        }
        if !self.key.is_empty() {
            encoding::bytes::encode(3, &self.key, buf);
        }
        // oneof members are written even when zero so the set member survives
        match &self.target_union {
            Some(TargetUnion::Version(v)) => encoding::int64::encode(4, v, buf),
            Some(TargetUnion::CreateRevision(v)) => encoding::int64::encode(5, v, buf),
            Some(TargetUnion::ModRevision(v)) => encoding::int64::encode(6, v, buf),
            Some(TargetUnion::Value(v)) => encoding::bytes::encode(7, v, buf),
            Some(TargetUnion::Lease(v)) => encoding::int64::encode(8, v, buf),
            None => {}
        }
        if !self.range_end.is_empty() {
            encoding::bytes::encode(64, &self.range_end, buf);
        }
    }

    fn merge_field(
        &mut self,
        tag: u32,
        wire_type: WireType,
        buf: &mut impl Buf,
        ctx: DecodeContext,
    ) -> Result<(), DecodeError>
    where
        Self: Sized,
    {
        match tag {
            1 => encoding::int32::merge(wire_type, &mut self.result, buf, ctx),
            2 => encoding::int32::merge(wire_type, &mut self.target, buf, ctx),
            3 => encoding::bytes::merge(wire_type, &mut self.key, buf, ctx),
            4 => self.merge_int_target(TargetUnion::Version, wire_type, buf, ctx),
            5 => self.merge_int_target(TargetUnion::CreateRevision, wire_type, buf, ctx),
            6 => self.merge_int_target(TargetUnion::ModRevision, wire_type, buf, ctx),
            7 => {
                let mut value = Vec::new();
                encoding::bytes::merge(wire_type, &mut value, buf, ctx)?;
                self.target_union = Some(TargetUnion::Value(value));
                Ok(())
            }
            8 => self.merge_int_target(TargetUnion::Lease, wire_type, buf, ctx),
            64 => encoding::bytes::merge(wire_type, &mut self.range_end, buf, ctx),
            _ => encoding::skip_field(wire_type, tag, buf, ctx),
        }
    }

    fn encoded_len(&self) -> usize {
        let mut len = 0;
        if self.result != 0 {
            len += encoding::int32::encoded_len(1, &self.result);
        }
        if self.target != 0 {
            len += encoding::int32::encoded_len(2, &self.target);
        }
        if !self.key.is_empty() {
            len += encoding::bytes::encoded_len(3, &self.key);
        }
        len += match &self.target_union {
            Some(TargetUnion::Version(v)) => encoding::int64::encoded_len(4, v),
            Some(TargetUnion::CreateRevision(v)) => encoding::int64::encoded_len(5, v),
            Some(TargetUnion::ModRevision(v)) => encoding::int64::encoded_len(6, v),
            Some(TargetUnion::Value(v)) => encoding::bytes::encoded_len(7, v),
            Some(TargetUnion::Lease(v)) => encoding::int64::encoded_len(8, v),
            None => 0,
        };
        if !self.range_end.is_empty() {
            len += encoding::bytes::encoded_len(64, &self.range_end);
        }
        len
    }

    fn clear(&mut self) {
        *self = Self::default();
    }
}

// ============================================================================
// RequestOp / ResponseOp
// ============================================================================

/// The `request` oneof of `RequestOp`. Nested txn (field 4) is not modeled.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RequestOpKind {
    Range(RangeRequest),
    Put(PutRequest),
    DeleteRange(DeleteRangeRequest),
}

/// Wire-format `etcdserverpb.RequestOp`.
#[derive(Clone, Default, Debug, PartialEq, Eq)]
pub struct RequestOp {
    pub request: Option<RequestOpKind>,
}

impl Message for RequestOp {
    fn encode_raw(&self, buf: &mut impl BufMut)
    where
        Self: Sized,
    {
        match &self.request {
            Some(RequestOpKind::Range(m)) => encoding::message::encode(1, m, buf),
            Some(RequestOpKind::Put(m)) => encoding::message::encode(2, m, buf),
            Some(RequestOpKind::DeleteRange(m)) => encoding::message::encode(3, m, buf),
            None => {}
        }
    }

    fn merge_field(
        &mut self,
        tag: u32,
        wire_type: WireType,
        buf: &mut impl Buf,
        ctx: DecodeContext,
    ) -> Result<(), DecodeError>
    where
        Self: Sized,
    {
        let current = self.request.take();
        let (next, result) = match tag {
            1 => {
                let mut msg = match current {
                    Some(RequestOpKind::Range(m)) => m,
                    _ => RangeRequest::default(),
                };
                let result = encoding::message::merge(wire_type, &mut msg, buf, ctx);
                (Some(RequestOpKind::Range(msg)), result)
            }
            2 => {
                let mut msg = match current {
                    Some(RequestOpKind::Put(m)) => m,
                    _ => PutRequest::default(),
                };
                let result = encoding::message::merge(wire_type, &mut msg, buf, ctx);
                (Some(RequestOpKind::Put(msg)), result)
            }
            3 => {
                let mut msg = match current {
                    Some(RequestOpKind::DeleteRange(m)) => m,
                    _ => DeleteRangeRequest::default(),
                };
                let result = encoding::message::merge(wire_type, &mut msg, buf, ctx);
                (Some(RequestOpKind::DeleteRange(msg)), result)
            }
            _ => (current, encoding::skip_field(wire_type, tag, buf, ctx)),
        };
        self.request = next;
        result
    }

    fn encoded_len(&self) -> usize {
        match &self.request {
            Some(RequestOpKind::Range(m)) => encoding::message::encoded_len(1, m),
            Some(RequestOpKind::Put(m)) => encoding::message::encoded_len(2, m),
            Some(RequestOpKind::DeleteRange(m)) => encoding::message::encoded_len(3, m),
            None => 0,
        }
    }

    fn clear(&mut self) {
        self.request = None;
    }
}

/// The `response` oneof of `ResponseOp`. Nested txn (field 4) is not modeled
/// and leaves the oneof unset.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ResponseOpKind {
    Range(RangeResponse),
    Put(PutResponse),
    DeleteRange(DeleteRangeResponse),
}

/// Wire-format `etcdserverpb.ResponseOp`.
#[derive(Clone, Default, Debug, PartialEq, Eq)]
pub struct ResponseOp {
    pub response: Option<ResponseOpKind>,
}

impl Message for ResponseOp {
    fn encode_raw(&self, buf: &mut impl BufMut)
    where
        Self: Sized,
    {
        match &self.response {
            Some(ResponseOpKind::Range(m)) => encoding::message::encode(1, m, buf),
            Some(ResponseOpKind::Put(m)) => encoding::message::encode(2, m, buf),
            Some(ResponseOpKind::DeleteRange(m)) => encoding::message::encode(3, m, buf),
            None => {}
        }
    }

    fn merge_field(
        &mut self,
        tag: u32,
        wire_type: WireType,
        buf: &mut impl Buf,
        ctx: DecodeContext,
    ) -> Result<(), DecodeError>
    where
        Self: Sized,
    {
        let current = self.response.take();
        let (next, result) = match tag {
            1 => {
                let mut msg = match current {
                    Some(ResponseOpKind::Range(m)) => m,
                    _ => RangeResponse::default(),
                };
                let result = encoding::message::merge(wire_type, &mut msg, buf, ctx);
                (Some(ResponseOpKind::Range(msg)), result)
            }
            2 => {
                let mut msg = match current {
                    Some(ResponseOpKind::Put(m)) => m,
                    _ => PutResponse::default(),
                };
                let result = encoding::message::merge(wire_type, &mut msg, buf, ctx);
                (Some(ResponseOpKind::Put(msg)), result)
            }
            3 => {
                let mut msg = match current {
                    Some(ResponseOpKind::DeleteRange(m)) => m,
                    _ => DeleteRangeResponse::default(),
                };
                let result = encoding::message::merge(wire_type, &mut msg, buf, ctx);
                (Some(ResponseOpKind::DeleteRange(msg)), result)
            }
            // response_txn: a oneof member this client does not model
            4 => (None, encoding::skip_field(wire_type, tag, buf, ctx)),
            _ => (current, encoding::skip_field(wire_type, tag, buf, ctx)),
        };
        self.response = next;
        result
    }

    fn encoded_len(&self) -> usize {
        match &self.response {
            Some(ResponseOpKind::Range(m)) => encoding::message::encoded_len(1, m),
            Some(ResponseOpKind::Put(m)) => encoding::message::encoded_len(2, m),
            Some(ResponseOpKind::DeleteRange(m)) => encoding::message::encoded_len(3, m),
            None => 0,
        }
    }

    fn clear(&mut self) {
        self.response = None;
    }
}

// ============================================================================
// TxnRequest / TxnResponse
// ============================================================================

/// Wire-format `etcdserverpb.TxnRequest`.
#[derive(Clone, Default, Debug, PartialEq, Eq)]
pub struct TxnRequest {
    pub compare: Vec<Compare>,   // field 1
    pub success: Vec<RequestOp>, // field 2
    pub failure: Vec<RequestOp>, // field 3
}

impl Message for TxnRequest {
    fn encode_raw(&self, buf: &mut impl BufMut)
    where
        Self: Sized,
    {
        encoding::message::encode_repeated(1, &self.compare, buf);
        encoding::message::encode_repeated(2, &self.success, buf);
        encoding::message::encode_repeated(3, &self.failure, buf);
    }

    fn merge_field(
        &mut self,
        tag: u32,
        wire_type: WireType,
        buf: &mut impl Buf,
        ctx: DecodeContext,
    ) -> Result<(), DecodeError>
    where
        Self: Sized,
    {
        match tag {
            1 => encoding::message::merge_repeated(wire_type, &mut self.compare, buf, ctx),
            2 => encoding::message::merge_repeated(wire_type, &mut self.success, buf, ctx),
            3 => encoding::message::merge_repeated(wire_type, &mut self.failure, buf, ctx),
            _ => encoding::skip_field(wire_type, tag, buf, ctx),
        }
    }

    fn encoded_len(&self) -> usize {
        encoding::message::encoded_len_repeated(1, &self.compare)
            + encoding::message::encoded_len_repeated(2, &self.success)
            + encoding::message::encoded_len_repeated(3, &self.failure)
    }

    fn clear(&mut self) {
        *self = Self::default();
    }
}

/// Wire-format `etcdserverpb.TxnResponse`.
#[derive(Clone, Default, Debug, PartialEq, Eq)]
pub struct TxnResponse {
    pub header: Option<ResponseHeader>, // field 1
    pub succeeded: bool,                // field 2
    pub responses: Vec<ResponseOp>,     // field 3
}

impl Message for TxnResponse {
    fn encode_raw(&self, buf: &mut impl BufMut)
    where
        Self: Sized,
    {
        if let Some(ref header) = self.header {
            encoding::message::encode(1, header, buf);
        }
        if self.succeeded {
            encoding::bool::encode(2, &self.succeeded, buf);
        }
        encoding::message::encode_repeated(3, &self.responses, buf);
    }

    fn merge_field(
        &mut self,
        tag: u32,
        wire_type: WireType,
        buf: &mut impl Buf,
        ctx: DecodeContext,
    ) -> Result<(), DecodeError>
    where
        Self: Sized,
    {
        match tag {
            1 => merge_optional(&mut self.header, wire_type, buf, ctx),
            2 => encoding::bool::merge(wire_type, &mut self.succeeded, buf, ctx),
            3 => encoding::message::merge_repeated(wire_type, &mut self.responses, buf, ctx),
            _ => encoding::skip_field(wire_type, tag, buf, ctx),
        }
    }

    fn encoded_len(&self) -> usize {
        let mut len = encoding::message::encoded_len_repeated(3, &self.responses);
        if let Some(ref header) = self.header {
            len += encoding::message::encoded_len(1, header);
        }
        if self.succeeded {
            len += encoding::bool::encoded_len(2, &self.succeeded);
        }
        len
    }

    fn clear(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compare_keeps_zero_oneof_member() {
        let cmp = Compare {
            result: CompareResult::Equal as i32,
            target: CompareTarget::Mod as i32,
            key: b"k".to_vec(),
            target_union: Some(TargetUnion::ModRevision(0)),
            range_end: Vec::new(),
        };

        let decoded = Compare::decode(&cmp.encode_to_vec()[..]).unwrap();
        assert_eq!(decoded.target_union, Some(TargetUnion::ModRevision(0)));
        assert_eq!(CompareTarget::from_wire(decoded.target), Some(CompareTarget::Mod));
    }

    #[test]
    fn test_compare_value_target_and_range_end() {
        let cmp = Compare {
            result: CompareResult::Greater as i32,
            target: CompareTarget::Value as i32,
            key: b"a".to_vec(),
            target_union: Some(TargetUnion::Value(b"abc".to_vec())),
            range_end: b"b".to_vec(),
        };

        let bytes = cmp.encode_to_vec();
        assert_eq!(cmp.encoded_len(), bytes.len());
        assert_eq!(Compare::decode(&bytes[..]).unwrap(), cmp);
    }

    #[test]
    fn test_txn_request_preserves_branch_order() {
        let req = TxnRequest {
            compare: vec![],
            success: vec![
                RequestOp {
                    request: Some(RequestOpKind::Put(PutRequest {
                        key: b"a".to_vec(),
                        ..Default::default()
                    })),
                },
                RequestOp {
                    request: Some(RequestOpKind::Range(RangeRequest {
                        key: b"b".to_vec(),
                        ..Default::default()
                    })),
                },
                RequestOp {
                    request: Some(RequestOpKind::DeleteRange(DeleteRangeRequest {
                        key: b"c".to_vec(),
                        ..Default::default()
                    })),
                },
            ],
            failure: vec![],
        };

        let decoded = TxnRequest::decode(&req.encode_to_vec()[..]).unwrap();
        assert_eq!(decoded, req);
    }

    #[test]
    fn test_nested_txn_response_op_is_unset() {
        let mut bytes = Vec::new();
        // ResponseOp { response_txn (field 4): TxnResponse { succeeded: true } }
        let nested = TxnResponse {
            succeeded: true,
            ..Default::default()
        };
        encoding::message::encode(4, &nested, &mut bytes);

        let decoded = ResponseOp::decode(&bytes[..]).unwrap();
        assert!(decoded.response.is_none());
    }

    #[test]
    fn test_nested_txn_after_known_member_clears_response() {
        let mut bytes = ResponseOp {
            response: Some(ResponseOpKind::Put(PutResponse::default())),
        }
        .encode_to_vec();
        encoding::message::encode(4, &TxnResponse::default(), &mut bytes);

        let decoded = ResponseOp::decode(&bytes[..]).unwrap();
        assert!(decoded.response.is_none());

        // a later known member wins again
        ResponseOp {
            response: Some(ResponseOpKind::DeleteRange(DeleteRangeResponse::default())),
        }
        .encode_raw(&mut bytes);
        let decoded = ResponseOp::decode(&bytes[..]).unwrap();
        assert!(matches!(
            decoded.response,
            Some(ResponseOpKind::DeleteRange(_))
        ));
    }

    #[test]
    fn test_empty_response_op_field_still_selects_member() {
        let op = ResponseOp {
            response: Some(ResponseOpKind::Put(PutResponse::default())),
        };
        let decoded = ResponseOp::decode(&op.encode_to_vec()[..]).unwrap();
        assert_eq!(
            decoded.response,
            Some(ResponseOpKind::Put(PutResponse::default()))
        );
    }

    #[test]
    fn test_unknown_enum_values() {
        assert_eq!(CompareResult::from_wire(9), None);
        assert_eq!(CompareTarget::from_wire(-1), None);
    }
}
