//! Maintenance client tests.

mod common;

use common::{memory_client, scripted_client};
use lattice_client::etcd::proto;
use lattice_client::etcd::{AlarmAction, AlarmType};
use lattice_client::ClientError;

#[tokio::test]
async fn status_reports_store_revision() {
    let (client, store) = memory_client("mt-status");
    client.kv().put("k", "v").await.unwrap();

    let status = client.maintenance().status_member().await.unwrap();
    assert_eq!(status.header.revision, store.revision());
    assert_eq!(status.leader, status.header.member_id);
    assert!(status.db_size > 0);
    assert!(!status.version.is_empty());
    client.close();
}

#[tokio::test]
async fn defragment_returns_header() {
    let (client, store) = memory_client("mt-defrag");
    client.kv().put("k", "v").await.unwrap();
    client.kv().delete("k").await.unwrap();

    let header = client.maintenance().defragment_member().await.unwrap();
    assert_eq!(header.revision, store.revision());
    client.close();
}

#[tokio::test]
async fn alarm_lifecycle() {
    let (client, _store) = memory_client("mt-alarm");
    let maintenance = client.maintenance();

    maintenance
        .alarm(7, AlarmType::NoSpace, AlarmAction::Activate)
        .await
        .unwrap();
    let alarms = maintenance.list_alarms().await.unwrap();
    assert_eq!(alarms.alarms.len(), 1);
    assert_eq!(alarms.alarms[0].member_id, 7);
    assert_eq!(alarms.alarms[0].alarm, AlarmType::NoSpace);

    let removed = maintenance.disarm(7, AlarmType::NoSpace).await.unwrap();
    assert_eq!(removed.alarms.len(), 1);
    assert!(maintenance.list_alarms().await.unwrap().alarms.is_empty());
    client.close();
}

#[tokio::test]
async fn disarm_member_zero_fails_without_rpc() {
    let (client, transport) = scripted_client("mt-disarm-zero");

    let err = client
        .maintenance()
        .disarm(0, AlarmType::Corrupt)
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::InvalidArgument { .. }));
    assert!(transport.alarm_requests.lock().is_empty());
    client.close();
}

#[tokio::test]
async fn disarm_sends_deactivate() {
    let (client, transport) = scripted_client("mt-disarm");
    transport.push_alarm(Ok(proto::AlarmResponse::default()));

    client
        .maintenance()
        .disarm(3, AlarmType::Corrupt)
        .await
        .unwrap();
    let request = transport.alarm_requests.lock()[0];
    assert_eq!(request.action, proto::AlarmAction::Deactivate as i32);
    assert_eq!(request.member_id, 3);
    assert_eq!(request.alarm, proto::AlarmType::Corrupt as i32);
    client.close();
}

#[tokio::test]
async fn unknown_alarm_type_is_protocol_violation() {
    let (client, transport) = scripted_client("mt-unknown-alarm");
    transport.push_alarm(Ok(proto::AlarmResponse {
        header: None,
        alarms: vec![proto::AlarmMember {
            member_id: 1,
            alarm: 42,
        }],
    }));

    let err = client.maintenance().list_alarms().await.unwrap_err();
    assert!(matches!(err, ClientError::ProtocolViolation { .. }));
    client.close();
}
