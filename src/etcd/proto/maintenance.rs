//! Maintenance service messages: Alarm, Status, Defragment, Snapshot.

use super::kv::ResponseHeader;
use super::merge_optional;
use bytes::Bytes;
use prost::bytes::{Buf, BufMut};
use prost::encoding::{self, DecodeContext, WireType};
use prost::{DecodeError, Message};

empty_message!(StatusRequest, "Wire-format `etcdserverpb.StatusRequest`.");
empty_message!(
    DefragmentRequest,
    "Wire-format `etcdserverpb.DefragmentRequest`."
);
empty_message!(SnapshotRequest, "Wire-format `etcdserverpb.SnapshotRequest`.");

/// `AlarmRequest.AlarmAction` wire values.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(i32)]
pub enum AlarmAction {
    Get = 0,
    Activate = 1,
    Deactivate = 2,
}

impl AlarmAction {
    pub fn from_wire(value: i32) -> Option<Self> {
        match value {
            0 => Some(Self::Get),
            1 => Some(Self::Activate),
            2 => Some(Self::Deactivate),
            _ => None,
        }
    }
}

/// `etcdserverpb.AlarmType` wire values.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(i32)]
pub enum AlarmType {
    None = 0,
    Nospace = 1,
    Corrupt = 2,
}

impl AlarmType {
    pub fn from_wire(value: i32) -> Option<Self> {
        match value {
            0 => Some(Self::None),
            1 => Some(Self::Nospace),
            2 => Some(Self::Corrupt),
            _ => None,
        }
    }
}

// ============================================================================
// Alarm
// ============================================================================

/// Wire-format `etcdserverpb.AlarmRequest`.
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
pub struct AlarmRequest {
    pub action: i32,    // field 1
    pub member_id: u64, // field 2
    pub alarm: i32,     // field 3
}

impl Message for AlarmRequest {
    fn encode_raw(&self, buf: &mut impl BufMut)
    where
        Self: Sized,
    {
        if self.action != 0 {
            encoding::int32::encode(1, &self.action, buf);
        }
        if self.member_id != 0 {
            encoding::uint64::encode(2, &self.member_id, buf);
        }
        if self.alarm != 0 {
            encoding::int32::encode(3, &self.alarm, buf);
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
            1 => encoding::int32::merge(wire_type, &mut self.action, buf, ctx),
            2 => encoding::uint64::merge(wire_type, &mut self.member_id, buf, ctx),
            3 => encoding::int32::merge(wire_type, &mut self.alarm, buf, ctx),
            _ => encoding::skip_field(wire_type, tag, buf, ctx),
        }
    }

    fn encoded_len(&self) -> usize {
        let mut len = 0;
        if self.action != 0 {
            len += encoding::int32::encoded_len(1, &self.action);
        }
        if self.member_id != 0 {
            len += encoding::uint64::encoded_len(2, &self.member_id);
        }
        if self.alarm != 0 {
            len += encoding::int32::encoded_len(3, &self.alarm);
        }
        len
    }

    fn clear(&mut self) {
        *self = Self::default();
    }
}

/// Wire-format `etcdserverpb.AlarmMember`.
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
pub struct AlarmMember {
    pub member_id: u64, // field 1
    pub alarm: i32,     // field 2
}

impl Message for AlarmMember {
    fn encode_raw(&self, buf: &mut impl BufMut)
    where
        Self: Sized,
    {
        if self.member_id != 0 {
            encoding::uint64::encode(1, &self.member_id, buf);
        }
        if self.alarm != 0 {
            encoding::int32::encode(2, &self.alarm, buf);
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
            1 => encoding::uint64::merge(wire_type, &mut self.member_id, buf, ctx),
            2 => encoding::int32::merge(wire_type, &mut self.alarm, buf, ctx),
            _ => encoding::skip_field(wire_type, tag, buf, ctx),
        }
    }

    fn encoded_len(&self) -> usize {
        let mut len = 0;
        if self.member_id != 0 {
            len += encoding::uint64::encoded_len(1, &self.member_id);
        }
        if self.alarm != 0 {
            len += encoding::int32::encoded_len(2, &self.alarm);
        }
        len
    }

    fn clear(&mut self) {
        *self = Self::default();
    }
}

/// Wire-format `etcdserverpb.AlarmResponse`.
#[derive(Clone, Default, Debug, PartialEq, Eq)]
pub struct AlarmResponse {
    pub header: Option<ResponseHeader>, // field 1
    pub alarms: Vec<AlarmMember>,       // field 2
}

impl Message for AlarmResponse {
    fn encode_raw(&self, buf: &mut impl BufMut)
    where
        Self: Sized,
    {
        if let Some(ref header) = self.header {
            encoding::message::encode(1, header, buf);
        }
        encoding::message::encode_repeated(2, &self.alarms, buf);
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
            2 => encoding::message::merge_repeated(wire_type, &mut self.alarms, buf, ctx),
            _ => encoding::skip_field(wire_type, tag, buf, ctx),
        }
    }

    fn encoded_len(&self) -> usize {
        self.header
            .as_ref()
            .map_or(0, |h| encoding::message::encoded_len(1, h))
            + encoding::message::encoded_len_repeated(2, &self.alarms)
    }

    fn clear(&mut self) {
        *self = Self::default();
    }
}

// ============================================================================
// Status / Defragment
// ============================================================================

/// Wire-format `etcdserverpb.StatusResponse`.
#[derive(Clone, Default, Debug, PartialEq, Eq)]
pub struct StatusResponse {
    pub header: Option<ResponseHeader>, // field 1
    pub version: String,                // field 2
    pub db_size: i64,                   // field 3
    pub leader: u64,                    // field 4
    pub raft_index: u64,                // field 5
    pub raft_term: u64,                 // field 6
}

impl Message for StatusResponse {
    fn encode_raw(&self, buf: &mut impl BufMut)
    where
        Self: Sized,
    {
        if let Some(ref header) = self.header {
            encoding::message::encode(1, header, buf);
        }
        if !self.version.is_empty() {
            encoding::string::encode(2, &self.version, buf);
        }
        if self.db_size != 0 {
            encoding::int64::encode(3, &self.db_size, buf);
        }
        for (tag, value) in [
            (4, &self.leader),
            (5, &self.raft_index),
            (6, &self.raft_term),
        ] {
            if *value != 0 {
                encoding::uint64::encode(tag, value, buf);
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
            1 => merge_optional(&mut self.header, wire_type, buf, ctx),
            2 => encoding::string::merge(wire_type, &mut self.version, buf, ctx),
            3 => encoding::int64::merge(wire_type, &mut self.db_size, buf, ctx),
            4 => encoding::uint64::merge(wire_type, &mut self.leader, buf, ctx),
            5 => encoding::uint64::merge(wire_type, &mut self.raft_index, buf, ctx),
            6 => encoding::uint64::merge(wire_type, &mut self.raft_term, buf, ctx),
            _ => encoding::skip_field(wire_type, tag, buf, ctx),
        }
    }

    fn encoded_len(&self) -> usize {
        let mut len = 0;
        if let Some(ref header) = self.header {
            len += encoding::message::encoded_len(1, header);
        }
        if !self.version.is_empty() {
            len += encoding::string::encoded_len(2, &self.version);
        }
        if self.db_size != 0 {
            len += encoding::int64::encoded_len(3, &self.db_size);
        }
        for (tag, value) in [
            (4, &self.leader),
            (5, &self.raft_index),
            (6, &self.raft_term),
        ] {
            if *value != 0 {
                len += encoding::uint64::encoded_len(tag, value);
            }
        }
        len
    }

    fn clear(&mut self) {
        *self = Self::default();
    }
}

/// Wire-format `etcdserverpb.DefragmentResponse`.
#[derive(Clone, Default, Debug, PartialEq, Eq)]
pub struct DefragmentResponse {
    pub header: Option<ResponseHeader>, // field 1
}

impl Message for DefragmentResponse {
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

// ============================================================================
// Snapshot
// ============================================================================

/// Wire-format `etcdserverpb.SnapshotResponse`, one chunk of the stream.
#[derive(Clone, Default, Debug, PartialEq, Eq)]
pub struct SnapshotResponse {
    pub header: Option<ResponseHeader>, // field 1
    pub remaining_bytes: u64,           // field 2
    pub blob: Bytes,                    // field 3
}

impl Message for SnapshotResponse {
    fn encode_raw(&self, buf: &mut impl BufMut)
    where
        Self: Sized,
    {
        if let Some(ref header) = self.header {
            encoding::message::encode(1, header, buf);
        }
        if self.remaining_bytes != 0 {
            encoding::uint64::encode(2, &self.remaining_bytes, buf);
        }
        if !self.blob.is_empty() {
            encoding::bytes::encode(3, &self.blob, buf);
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
            2 => encoding::uint64::merge(wire_type, &mut self.remaining_bytes, buf, ctx),
            3 => encoding::bytes::merge(wire_type, &mut self.blob, buf, ctx),
            _ => encoding::skip_field(wire_type, tag, buf, ctx),
        }
    }

    fn encoded_len(&self) -> usize {
        let mut len = 0;
        if let Some(ref header) = self.header {
            len += encoding::message::encoded_len(1, header);
        }
        if self.remaining_bytes != 0 {
            len += encoding::uint64::encoded_len(2, &self.remaining_bytes);
        }
        if !self.blob.is_empty() {
            len += encoding::bytes::encoded_len(3, &self.blob);
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
    fn test_status_response_roundtrip() {
        let resp = StatusResponse {
            header: Some(ResponseHeader {
                member_id: 7,
                ..Default::default()
            }),
            version: "3.5.12".to_string(),
            db_size: 4096,
            leader: 7,
            raft_index: 120,
            raft_term: 3,
        };

        let bytes = resp.encode_to_vec();
        assert_eq!(resp.encoded_len(), bytes.len());
        assert_eq!(StatusResponse::decode(&bytes[..]).unwrap(), resp);
    }

    #[test]
    fn test_alarm_response_keeps_members() {
        let resp = AlarmResponse {
            header: None,
            alarms: vec![
                AlarmMember {
                    member_id: 1,
                    alarm: AlarmType::Nospace as i32,
                },
                AlarmMember {
                    member_id: 2,
                    alarm: AlarmType::Corrupt as i32,
                },
            ],
        };

        let decoded = AlarmResponse::decode(&resp.encode_to_vec()[..]).unwrap();
        assert_eq!(decoded.alarms.len(), 2);
        assert_eq!(decoded.alarms[1].member_id, 2);
        assert_eq!(AlarmType::from_wire(decoded.alarms[1].alarm), Some(AlarmType::Corrupt));
    }

    #[test]
    fn test_snapshot_chunk_roundtrip() {
        let resp = SnapshotResponse {
            header: None,
            remaining_bytes: 10,
            blob: Bytes::from_static(b"chunk"),
        };

        let decoded = SnapshotResponse::decode(&resp.encode_to_vec()[..]).unwrap();
        assert_eq!(decoded.blob, Bytes::from_static(b"chunk"));
        assert_eq!(decoded.remaining_bytes, 10);
    }

    #[test]
    fn test_empty_requests_encode_to_nothing() {
        assert!(StatusRequest.encode_to_vec().is_empty());
        assert!(DefragmentRequest.encode_to_vec().is_empty());
        assert!(SnapshotRequest::decode(&[][..]).is_ok());
    }
}
