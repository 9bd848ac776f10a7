//! KV service messages: Range, Put, DeleteRange, Compact.

use super::merge_optional;
use prost::bytes::{Buf, BufMut};
use prost::encoding::{self, DecodeContext, WireType};
use prost::{DecodeError, Message};

// ============================================================================
// ResponseHeader
// ============================================================================

/// Wire-format `etcdserverpb.ResponseHeader`.
#[derive(Clone, Default, Debug, PartialEq, Eq)]
pub struct ResponseHeader {
    pub cluster_id: u64, // field 1
    pub member_id: u64,  // field 2
    pub revision: i64,   // field 3
    pub raft_term: u64,  // field 4
}

impl Message for ResponseHeader {
    fn encode_raw(&self, buf: &mut impl BufMut)
    where
        Self: Sized,
    {
        if self.cluster_id != 0 {
            encoding::uint64::encode(1, &self.cluster_id, buf);
        }
        if self.member_id != 0 {
            encoding::uint64::encode(2, &self.member_id, buf);
        }
        if self.revision != 0 {
            encoding::int64::encode(3, &self.revision, buf);
        }
        if self.raft_term != 0 {
            encoding::uint64::encode(4, &self.raft_term, buf);
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
            1 => encoding::uint64::merge(wire_type, &mut self.cluster_id, buf, ctx),
            2 => encoding::uint64::merge(wire_type, &mut self.member_id, buf, ctx),
            3 => encoding::int64::merge(wire_type, &mut self.revision, buf, ctx),
            4 => encoding::uint64::merge(wire_type, &mut self.raft_term, buf, ctx),
            _ => encoding::skip_field(wire_type, tag, buf, ctx),
        }
    }

    fn encoded_len(&self) -> usize {
        (if self.cluster_id != 0 {
            encoding::uint64::encoded_len(1, &self.cluster_id)
        } else {
            0
        }) + (if self.member_id != 0 {
            encoding::uint64::encoded_len(2, &self.member_id)
        } else {
            0
        }) + (if self.revision != 0 {
            encoding::int64::encoded_len(3, &self.revision)
        } else {
            0
        }) + (if self.raft_term != 0 {
            encoding::uint64::encoded_len(4, &self.raft_term)
        } else {
            0
        })
    }

    fn clear(&mut self) {
        *self = Self::default();
    }
}

// ============================================================================
// KeyValue
// ============================================================================

/// Wire-format `mvccpb.KeyValue`.
#[derive(Clone, Default, Debug, PartialEq, Eq)]
pub struct KeyValue {
    pub key: Vec<u8>,         // field 1
    pub create_revision: i64, // field 2
    pub mod_revision: i64,    // field 3
    pub version: i64,         // field 4
    pub value: Vec<u8>,       // field 5
    pub lease: i64,           // field 6
}

impl Message for KeyValue {
    fn encode_raw(&self, buf: &mut impl BufMut)
    where
        Self: Sized,
    {
        if !self.key.is_empty() {
            encoding::bytes::encode(1, &self.key, buf);
        }
        for (tag, value) in [
            (2, &self.create_revision),
            (3, &self.mod_revision),
            (4, &self.version),
        ] {
            if *value != 0 {
                encoding::int64::encode(tag, value, buf);
            }
        }
        if !self.value.is_empty() {
            encoding::bytes::encode(5, &self.value, buf);
        }
        if self.lease != 0 {
            encoding::int64::encode(6, &self.lease, buf);
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
            1 => encoding::bytes::merge(wire_type, &mut self.key, buf, ctx),
            2 => encoding::int64::merge(wire_type, &mut self.create_revision, buf, ctx),
            3 => encoding::int64::merge(wire_type, &mut self.mod_revision, buf, ctx),
            4 => encoding::int64::merge(wire_type, &mut self.version, buf, ctx),
            5 => encoding::bytes::merge(wire_type, &mut self.value, buf, ctx),
            6 => encoding::int64::merge(wire_type, &mut self.lease, buf, ctx),
            _ => encoding::skip_field(wire_type, tag, buf, ctx),
        }
    }

    fn encoded_len(&self) -> usize {
        let mut len = 0;
        if !self.key.is_empty() {
            len += encoding::bytes::encoded_len(1, &self.key);
        }
        for (tag, value) in [
            (2, &self.create_revision),
            (3, &self.mod_revision),
            (4, &self.version),
            (6, &self.lease),
        ] {
            if *value != 0 {
                len += encoding::int64::encoded_len(tag, value);
            }
        }
        if !self.value.is_empty() {
            len += encoding::bytes::encoded_len(5, &self.value);
        }
        len
    }

    fn clear(&mut self) {
        *self = Self::default();
    }
}

// ============================================================================
// RangeRequest / RangeResponse
// ============================================================================

/// Wire-format `etcdserverpb.RangeRequest`.
#[derive(Clone, Default, Debug, PartialEq, Eq)]
pub struct RangeRequest {
    pub key: Vec<u8>,             // field 1
    pub range_end: Vec<u8>,       // field 2
    pub limit: i64,               // field 3
    pub revision: i64,            // field 4
    pub sort_order: i32,          // field 5 (enum)
    pub sort_target: i32,         // field 6 (enum)
    pub serializable: bool,       // field 7
    pub keys_only: bool,          // field 8
    pub count_only: bool,         // field 9
    pub min_mod_revision: i64,    // field 10
    pub max_mod_revision: i64,    // field 11
    pub min_create_revision: i64, // field 12
    pub max_create_revision: i64, // field 13
}

impl RangeRequest {
    fn int64_fields(&self) -> [(u32, &i64); 6] {
        [
            (3, &self.limit),
            (4, &self.revision),
            (10, &self.min_mod_revision),
            (11, &self.max_mod_revision),
            (12, &self.min_create_revision),
            (13, &self.max_create_revision),
        ]
    }

    fn bool_fields(&self) -> [(u32, &bool); 3] {
        [
            (7, &self.serializable),
            (8, &self.keys_only),
            (9, &self.count_only),
        ]
    }
}

impl Message for RangeRequest {
    fn encode_raw(&self, buf: &mut impl BufMut)
    where
        Self: Sized,
    {
        if !self.key.is_empty() {
            encoding::bytes::encode(1, &self.key, buf);
        }
        if !self.range_end.is_empty() {
            encoding::bytes::encode(2, &self.range_end, buf);
        }
        if self.sort_order != 0 {
            encoding::int32::encode(5, &self.sort_order, buf);
        }
        if self.sort_target != 0 {
            encoding::int32::encode(6, &self.sort_target, buf);
        }
        for (tag, flag) in self.bool_fields() {
            if *flag {
                encoding::bool::encode(tag, flag, buf);
            }
        }
        for (tag, value) in self.int64_fields() {
            if *value != 0 {
                encoding::int64::encode(tag, value, buf);
            }
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
            1 => encoding::bytes::merge(wire_type, &mut self.key, buf, ctx),
            2 => encoding::bytes::merge(wire_type, &mut self.range_end, buf, ctx),
            3 => encoding::int64::merge(wire_type, &mut self.limit, buf, ctx),
            4 => encoding::int64::merge(wire_type, &mut self.revision, buf, ctx),
            5 => encoding::int32::merge(wire_type, &mut self.sort_order, buf, ctx),
            6 => encoding::int32::merge(wire_type, &mut self.sort_target, buf, ctx),
            7 => encoding::bool::merge(wire_type, &mut self.serializable, buf, ctx),
            8 => encoding::bool::merge(wire_type, &mut self.keys_only, buf, ctx),
            9 => encoding::bool::merge(wire_type, &mut self.count_only, buf, ctx),
            10 => encoding::int64::merge(wire_type, &mut self.min_mod_revision, buf, ctx),
            11 => encoding::int64::merge(wire_type, &mut self.max_mod_revision, buf, ctx),
            12 => encoding::int64::merge(wire_type, &mut self.min_create_revision, buf, ctx),
            13 => encoding::int64::merge(wire_type, &mut self.max_create_revision, buf, ctx),
            _ => encoding::skip_field(wire_type, tag, buf, ctx),
        }
    }

    fn encoded_len(&self) -> usize {
        let mut len = 0;
        if !self.key.is_empty() {
            len += encoding::bytes::encoded_len(1, &self.key);
        }
        if !self.range_end.is_empty() {
            len += encoding::bytes::encoded_len(2, &self.range_end);
        }
        if self.sort_order != 0 {
            len += encoding::int32::encoded_len(5, &self.sort_order);
        }
        if self.sort_target != 0 {
            len += encoding::int32::encoded_len(6, &self.sort_target);
        }
        for (tag, flag) in self.bool_fields() {
            if *flag {
                len += encoding::bool::encoded_len(tag, flag);
            }
        }
        for (tag, value) in self.int64_fields() {
            if *value != 0 {
                len += encoding::int64::encoded_len(tag, value);
            }
        }
        len
    }

    fn clear(&mut self) {
        *self = Self::default();
    }
}

/// Wire-format `etcdserverpb.RangeResponse`.
#[derive(Clone, Default, Debug, PartialEq, Eq)]
pub struct RangeResponse {
    pub header: Option<ResponseHeader>, // field 1
    pub kvs: Vec<KeyValue>,             // field 2
    pub more: bool,                     // field 3
    pub count: i64,                     // field 4
}

impl Message for RangeResponse {
    fn encode_raw(&self, buf: &mut impl BufMut)
    where
        Self: Sized,
    {
        if let Some(ref header) = self.header {
            encoding::message::encode(1, header, buf);
        }
        encoding::message::encode_repeated(2, &self.kvs, buf);
        if self.more {
            encoding::bool::encode(3, &self.more, buf);
        }
        if self.count != 0 {
            encoding::int64::encode(4, &self.count, buf);
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
            1 => merge_optional(&mut self.header, wire_type, buf, ctx),
            2 => encoding::message::merge_repeated(wire_type, &mut self.kvs, buf, ctx),
            3 => encoding::bool::merge(wire_type, &mut self.more, buf, ctx),
            4 => encoding::int64::merge(wire_type, &mut self.count, buf, ctx),
            _ => encoding::skip_field(wire_type, tag, buf, ctx),
        }
    }

    fn encoded_len(&self) -> usize {
        let mut len = encoding::message::encoded_len_repeated(2, &self.kvs);
        if let Some(ref header) = self.header {
            len += encoding::message::encoded_len(1, header);
        }
        if self.more {
            len += encoding::bool::encoded_len(3, &self.more);
        }
        if self.count != 0 {
            len += encoding::int64::encoded_len(4, &self.count);
        }
        len
    }

    fn clear(&mut self) {
        *self = Self::default();
    }
}

// ============================================================================
// PutRequest / PutResponse
// ============================================================================

/// Wire-format `etcdserverpb.PutRequest`.
#[derive(Clone, Default, Debug, PartialEq, Eq)]
pub struct PutRequest {
    pub key: Vec<u8>,       // field 1
    pub value: Vec<u8>,     // field 2
    pub lease: i64,         // field 3
    pub prev_kv: bool,      // field 4
    pub ignore_value: bool, // field 5
    pub ignore_lease: bool, // field 6
}

impl PutRequest {
    fn bool_fields(&self) -> [(u32, &bool); 3] {
        [
            (4, &self.prev_kv),
            (5, &self.ignore_value),
            (6, &self.ignore_lease),
        ]
    }
}

impl Message for PutRequest {
    fn encode_raw(&self, buf: &mut impl BufMut)
    where
        Self: Sized,
    {
        if !self.key.is_empty() {
            encoding::bytes::encode(1, &self.key, buf);
        }
        if !self.value.is_empty() {
            encoding::bytes::encode(2, &self.value, buf);
        }
        if self.lease != 0 {
            encoding::int64::encode(3, &self.lease, buf);
        }
        for (tag, flag) in self.bool_fields() {
            if *flag {
                encoding::bool::encode(tag, flag, buf);
            }
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
            1 => encoding::bytes::merge(wire_type, &mut self.key, buf, ctx),
            2 => encoding::bytes::merge(wire_type, &mut self.value, buf, ctx),
            3 => encoding::int64::merge(wire_type, &mut self.lease, buf, ctx),
            4 => encoding::bool::merge(wire_type, &mut self.prev_kv, buf, ctx),
            5 => encoding::bool::merge(wire_type, &mut self.ignore_value, buf, ctx),
            6 => encoding::bool::merge(wire_type, &mut self.ignore_lease, buf, ctx),
            _ => encoding::skip_field(wire_type, tag, buf, ctx),
        }
    }

    fn encoded_len(&self) -> usize {
        let mut len = 0;
        if !self.key.is_empty() {
            len += encoding::bytes::encoded_len(1, &self.key);
        }
        if !self.value.is_empty() {
            len += encoding::bytes::encoded_len(2, &self.value);
        }
        if self.lease != 0 {
            len += encoding::int64::encoded_len(3, &self.lease);
        }
        for (tag, flag) in self.bool_fields() {
            if *flag {
                len += encoding::bool::encoded_len(tag, flag);
            }
        }
        len
    }

    fn clear(&mut self) {
        *self = Self::default();
    }
}

/// Wire-format `etcdserverpb.PutResponse`.
#[derive(Clone, Default, Debug, PartialEq, Eq)]
pub struct PutResponse {
    pub header: Option<ResponseHeader>, // field 1
    pub prev_kv: Option<KeyValue>,      // field 2
}

impl Message for PutResponse {
    fn encode_raw(&self, buf: &mut impl BufMut)
    where
        Self: Sized,
    {
        if let Some(ref header) = self.header {
            encoding::message::encode(1, header, buf);
        }
        if let Some(ref prev_kv) = self.prev_kv {
            encoding::message::encode(2, prev_kv, buf);
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
            1 => merge_optional(&mut self.header, wire_type, buf, ctx),
            2 => merge_optional(&mut self.prev_kv, wire_type, buf, ctx),
            _ => encoding::skip_field(wire_type, tag, buf, ctx),
        }
    }

    fn encoded_len(&self) -> usize {
        self.header
            .as_ref()
            .map_or(0, |h| encoding::message::encoded_len(1, h))
            + self
                .prev_kv
                .as_ref()
                .map_or(0, |kv| encoding::message::encoded_len(2, kv))
    }

    fn clear(&mut self) {
        *self = Self::default();
    }
}

// ============================================================================
// DeleteRangeRequest / DeleteRangeResponse
// ============================================================================

/// Wire-format `etcdserverpb.DeleteRangeRequest`.
#[derive(Clone, Default, Debug, PartialEq, Eq)]
pub struct DeleteRangeRequest {
    pub key: Vec<u8>,       // field 1
    pub range_end: Vec<u8>, // field 2
    pub prev_kv: bool,      // field 3
}

impl Message for DeleteRangeRequest {
    fn encode_raw(&self, buf: &mut impl BufMut)
    where
        Self: Sized,
    {
        if !self.key.is_empty() {
            encoding::bytes::encode(1, &self.key, buf);
        }
        if !self.range_end.is_empty() {
            encoding::bytes::encode(2, &self.range_end, buf);
        }
        if self.prev_kv {
            encoding::bool::encode(3, &self.prev_kv, buf);
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
            1 => encoding::bytes::merge(wire_type, &mut self.key, buf, ctx),
            2 => encoding::bytes::merge(wire_type, &mut self.range_end, buf, ctx),
            3 => encoding::bool::merge(wire_type, &mut self.prev_kv, buf, ctx),
            _ => encoding::skip_field(wire_type, tag, buf, ctx),
        }
    }

    fn encoded_len(&self) -> usize {
        let mut len = 0;
        if !self.key.is_empty() {
            len += encoding::bytes::encoded_len(1, &self.key);
        }
        if !self.range_end.is_empty() {
            len += encoding::bytes::encoded_len(2, &self.range_end);
        }
        if self.prev_kv {
            len += encoding::bool::encoded_len(3, &self.prev_kv);
        }
        len
    }

    fn clear(&mut self) {
        *self = Self::default();
    }
}

/// Wire-format `etcdserverpb.DeleteRangeResponse`.
#[derive(Clone, Default, Debug, PartialEq, Eq)]
pub struct DeleteRangeResponse {
    pub header: Option<ResponseHeader>, // field 1
    pub deleted: i64,                   // field 2
    pub prev_kvs: Vec<KeyValue>,        // field 3
}

impl Message for DeleteRangeResponse {
    fn encode_raw(&self, buf: &mut impl BufMut)
    where
        Self: Sized,
    {
        if let Some(ref header) = self.header {
            encoding::message::encode(1, header, buf);
        }
        if self.deleted != 0 {
            encoding::int64::encode(2, &self.deleted, buf);
        }
        encoding::message::encode_repeated(3, &self.prev_kvs, buf);
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
            2 => encoding::int64::merge(wire_type, &mut self.deleted, buf, ctx),
            3 => encoding::message::merge_repeated(wire_type, &mut self.prev_kvs, buf, ctx),
            _ => encoding::skip_field(wire_type, tag, buf, ctx),
        }
    }

    fn encoded_len(&self) -> usize {
        let mut len = encoding::message::encoded_len_repeated(3, &self.prev_kvs);
        if let Some(ref header) = self.header {
            len += encoding::message::encoded_len(1, header);
        }
        if self.deleted != 0 {
            len += encoding::int64::encoded_len(2, &self.deleted);
        }
        len
    }

    fn clear(&mut self) {
        *self = Self::default();
    }
}

// ============================================================================
// CompactionRequest / CompactionResponse
// ============================================================================

/// Wire-format `etcdserverpb.CompactionRequest`.
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
pub struct CompactionRequest {
    pub revision: i64,  // field 1
    pub physical: bool, // field 2
}

impl Message for CompactionRequest {
    fn encode_raw(&self, buf: &mut impl BufMut)
    where
        Self: Sized,
    {
        if self.revision != 0 {
            encoding::int64::encode(1, &self.revision, buf);
        }
        if self.physical {
            encoding::bool::encode(2, &self.physical, buf);
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
            1 => encoding::int64::merge(wire_type, &mut self.revision, buf, ctx),
            2 => encoding::bool::merge(wire_type, &mut self.physical, buf, ctx),
            _ => encoding::skip_field(wire_type, tag, buf, ctx),
        }
    }

    fn encoded_len(&self) -> usize {
        let mut len = 0;
        if self.revision != 0 {
            len += encoding::int64::encoded_len(1, &self.revision);
        }
        if self.physical {
            len += encoding::bool::encoded_len(2, &self.physical);
        }
        len
    }

    fn clear(&mut self) {
        *self = Self::default();
    }
}

/// Wire-format `etcdserverpb.CompactionResponse`.
#[derive(Clone, Default, Debug, PartialEq, Eq)]
pub struct CompactionResponse {
    pub header: Option<ResponseHeader>, // field 1
}

impl Message for CompactionResponse {
    fn encode_raw(&self, buf: &mut impl BufMut)
    where
        Self: Sized,
    {
        if let Some(ref header) = self.header {
            encoding::message::encode(1, header, buf);
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
            1 => merge_optional(&mut self.header, wire_type, buf, ctx),
            _ => encoding::skip_field(wire_type, tag, buf, ctx),
        }
    }

    fn encoded_len(&self) -> usize {
        self.header
            .as_ref()
            .map_or(0, |h| encoding::message::encoded_len(1, h))
    }

    fn clear(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_request_roundtrip_with_flags() {
        let req = RangeRequest {
            key: b"foo".to_vec(),
            range_end: b"fop".to_vec(),
            limit: 10,
            sort_order: 2,
            count_only: true,
            max_create_revision: 77,
            ..Default::default()
        };

        let decoded = RangeRequest::decode(&req.encode_to_vec()[..]).unwrap();
        assert_eq!(decoded, req);
        assert_eq!(req.encoded_len(), req.encode_to_vec().len());
    }

    #[test]
    fn test_put_response_without_prev_kv() {
        let resp = PutResponse {
            header: Some(ResponseHeader {
                revision: 9,
                ..Default::default()
            }),
            prev_kv: None,
        };

        let decoded = PutResponse::decode(&resp.encode_to_vec()[..]).unwrap();
        assert_eq!(decoded.header.unwrap().revision, 9);
        assert!(decoded.prev_kv.is_none());
    }

    #[test]
    fn test_delete_range_response_keeps_prev_kvs_order() {
        let resp = DeleteRangeResponse {
            header: None,
            deleted: 2,
            prev_kvs: vec![
                KeyValue {
                    key: b"a".to_vec(),
                    version: 1,
                    ..Default::default()
                },
                KeyValue {
                    key: b"b".to_vec(),
                    version: 4,
                    ..Default::default()
                },
            ],
        };

        let bytes = resp.encode_to_vec();
        assert_eq!(resp.encoded_len(), bytes.len());
        let decoded = DeleteRangeResponse::decode(&bytes[..]).unwrap();
        assert_eq!(decoded, resp);
    }

    #[test]
    fn test_unknown_fields_are_skipped() {
        let mut bytes = KeyValue {
            key: b"k".to_vec(),
            value: b"v".to_vec(),
            ..Default::default()
        }
        .encode_to_vec();
        // field 42, varint 7
        encoding::uint64::encode(42, &7, &mut bytes);

        let decoded = KeyValue::decode(&bytes[..]).unwrap();
        assert_eq!(decoded.key, b"k");
        assert_eq!(decoded.value, b"v");
    }
}
