//! Maintenance resource client.

use super::bridge::{AsyncBridge, BridgedCall, CallbackContext};
use super::snapshot::{SnapshotCallback, SnapshotSlot};
use crate::core::error::ClientError;
use crate::etcd::kv::Header;
use crate::etcd::maintenance::{AlarmAction, AlarmList, AlarmType, MemberStatus};
use crate::etcd::proto;
use crate::transport::MaintenanceRpc;
use std::sync::Arc;

/// Client for the Maintenance service.
#[derive(Clone)]
pub struct MaintenanceClient {
    transport: Arc<dyn MaintenanceRpc>,
    bridge: AsyncBridge,
    snapshots: SnapshotSlot,
}

impl MaintenanceClient {
    pub fn new(transport: Arc<dyn MaintenanceRpc>, context: CallbackContext) -> Self {
        Self {
            snapshots: SnapshotSlot::new(transport.clone()),
            transport,
            bridge: AsyncBridge::new(context),
        }
    }

    /// Status of the member this client is connected to.
    pub fn status_member(&self) -> BridgedCall<MemberStatus> {
        self.bridge
            .bridge(self.transport.status(proto::StatusRequest), |r| {
                Ok(MemberStatus::from(r))
            })
    }

    /// Defragment the backend of the connected member.
    ///
    /// Expensive; defragment members one at a time.
    pub fn defragment_member(&self) -> BridgedCall<Header> {
        self.bridge
            .bridge(self.transport.defragment(proto::DefragmentRequest), |r| {
                Ok(Header::from(r.header))
            })
    }

    /// Every active alarm in the cluster.
    pub fn list_alarms(&self) -> BridgedCall<AlarmList> {
        let request = proto::AlarmRequest {
            action: AlarmAction::Get.to_wire() as i32,
            member_id: 0,
            alarm: AlarmType::None.to_wire() as i32,
        };
        self.bridge
            .bridge(self.transport.alarm(request), AlarmList::try_from)
    }

    /// Issue an alarm action for one member. A member id of 0 is rejected.
    pub fn alarm(
        &self,
        member_id: u64,
        alarm: AlarmType,
        action: AlarmAction,
    ) -> BridgedCall<AlarmList> {
        if member_id == 0 {
            return self
                .bridge
                .failed(ClientError::invalid_argument("member id must not be 0"));
        }
        let request = proto::AlarmRequest {
            action: action.to_wire() as i32,
            member_id,
            alarm: alarm.to_wire() as i32,
        };
        self.bridge
            .bridge(self.transport.alarm(request), AlarmList::try_from)
    }

    /// Deactivate an alarm raised on one member.
    pub fn disarm(&self, member_id: u64, alarm: AlarmType) -> BridgedCall<AlarmList> {
        self.alarm(member_id, alarm, AlarmAction::Deactivate)
    }

    /// Receive snapshot chunks on `callback`.
    ///
    /// Opens the snapshot stream if none is open, otherwise replaces the
    /// installed callback. After a stream error the callback is released and
    /// this must be called again to resume.
    pub fn set_snapshot_callback(&self, callback: Arc<dyn SnapshotCallback>) {
        self.snapshots.attach(callback);
    }

    /// Close the snapshot stream and release the callback. A no-op returning
    /// false when none is installed.
    pub fn remove_snapshot_callback(&self) -> bool {
        self.snapshots.detach()
    }

    pub fn has_snapshot_callback(&self) -> bool {
        self.snapshots.is_open()
    }

    pub fn context(&self) -> &CallbackContext {
        self.bridge.context()
    }

    /// Close the snapshot stream and stop this client's callback context.
    pub fn close(&self) {
        self.snapshots.detach();
        self.bridge.context().shutdown();
    }
}

impl std::fmt::Debug for MaintenanceClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MaintenanceClient")
            .field("context", self.bridge.context())
            .field("snapshots", &self.snapshots)
            .finish()
    }
}
