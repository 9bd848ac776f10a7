//! Maintenance data model: member status, alarms, snapshot chunks.

use super::kv::Header;
use super::proto;
use crate::core::error::{ClientError, ClientResult};
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Status of the member that answered.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberStatus {
    pub header: Header,
    /// Cluster protocol version used by the member.
    pub version: String,
    /// Backend database size in bytes.
    pub db_size: i64,
    /// Member ID the member believes is leader.
    pub leader: u64,
    pub raft_index: u64,
    pub raft_term: u64,
}

impl From<proto::StatusResponse> for MemberStatus {
    fn from(response: proto::StatusResponse) -> Self {
        Self {
            header: response.header.into(),
            version: response.version,
            db_size: response.db_size,
            leader: response.leader,
            raft_index: response.raft_index,
            raft_term: response.raft_term,
        }
    }
}

/// Kind of alarm raised on a member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AlarmType {
    /// No alarm; used to query every active alarm.
    None,
    /// Space quota is exhausted.
    NoSpace,
    /// Data corruption was detected.
    Corrupt,
}

impl AlarmType {
    pub(crate) fn to_wire(self) -> proto::AlarmType {
        match self {
            Self::None => proto::AlarmType::None,
            Self::NoSpace => proto::AlarmType::Nospace,
            Self::Corrupt => proto::AlarmType::Corrupt,
        }
    }

    pub(crate) fn from_wire(value: i32) -> ClientResult<Self> {
        match proto::AlarmType::from_wire(value) {
            Some(proto::AlarmType::None) => Ok(Self::None),
            Some(proto::AlarmType::Nospace) => Ok(Self::NoSpace),
            Some(proto::AlarmType::Corrupt) => Ok(Self::Corrupt),
            None => Err(ClientError::protocol_violation(format!(
                "unrecognized alarm type {value}"
            ))),
        }
    }
}

/// Alarm request action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlarmAction {
    Get,
    Activate,
    Deactivate,
}

impl AlarmAction {
    pub(crate) fn to_wire(self) -> proto::AlarmAction {
        match self {
            Self::Get => proto::AlarmAction::Get,
            Self::Activate => proto::AlarmAction::Activate,
            Self::Deactivate => proto::AlarmAction::Deactivate,
        }
    }
}

/// One raised alarm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlarmMember {
    pub member_id: u64,
    pub alarm: AlarmType,
}

/// Alarms reported by the cluster.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlarmList {
    pub header: Header,
    pub alarms: Vec<AlarmMember>,
}

impl TryFrom<proto::AlarmResponse> for AlarmList {
    type Error = ClientError;

    fn try_from(response: proto::AlarmResponse) -> ClientResult<Self> {
        let alarms = response
            .alarms
            .into_iter()
            .map(|member| {
                Ok(AlarmMember {
                    member_id: member.member_id,
                    alarm: AlarmType::from_wire(member.alarm)?,
                })
            })
            .collect::<ClientResult<Vec<_>>>()?;

        Ok(Self {
            header: response.header.into(),
            alarms,
        })
    }
}

/// One chunk of a snapshot stream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotResult {
    pub header: Header,
    /// Bytes still to come after this chunk.
    pub remaining_bytes: u64,
    pub blob: Bytes,
}

impl From<proto::SnapshotResponse> for SnapshotResult {
    fn from(response: proto::SnapshotResponse) -> Self {
        Self {
            header: response.header.into(),
            remaining_bytes: response.remaining_bytes,
            blob: response.blob,
        }
    }
}
