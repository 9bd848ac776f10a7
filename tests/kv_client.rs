//! KV client tests over the in-memory store.

mod common;

use common::memory_client;
use lattice_client::etcd::{CompactOptions, SortOrder, SortTarget};
use lattice_client::{ClientError, DeleteOptions, GetOptions, PutOptions};

#[tokio::test]
async fn put_get_delete() {
    let (client, _store) = memory_client("kv-basic");
    let kv = client.kv();

    let put = kv.put("foo", "bar").await.unwrap();
    assert!(put.prev_kv.is_none());
    assert_eq!(put.header.revision, 2);

    let read = kv.get("foo").await.unwrap();
    assert_eq!(read.count, 1);
    assert_eq!(read.kvs[0].value_str(), Some("bar"));
    assert_eq!(read.kvs[0].version, 1);

    let deleted = kv.delete("foo").await.unwrap();
    assert_eq!(deleted.deleted, 1);
    assert!(kv.get("foo").await.unwrap().kvs.is_empty());
    client.close();
}

#[tokio::test]
async fn put_with_prev_kv_returns_previous_value() {
    let (client, _store) = memory_client("kv-prev");
    let kv = client.kv();
    kv.put("k", "one").await.unwrap();

    let put = kv
        .put_with("k", "two", PutOptions::default().with_prev_kv())
        .await
        .unwrap();
    let prev = put.prev_kv.unwrap();
    assert_eq!(prev.value, b"one");

    let current = kv.get("k").await.unwrap();
    assert_eq!(current.kvs[0].version, 2);
    assert_eq!(current.kvs[0].create_revision, prev.create_revision);
    client.close();
}

#[tokio::test]
async fn prefix_read_with_limit_reports_more_and_count() {
    let (client, _store) = memory_client("kv-prefix");
    let kv = client.kv();
    for key in ["app/a", "app/b", "app/c", "other"] {
        kv.put(key, "v").await.unwrap();
    }

    let read = kv
        .get_with("app/", GetOptions::default().with_prefix(b"app/").with_limit(2))
        .await
        .unwrap();
    assert_eq!(read.kvs.len(), 2);
    assert!(read.more);
    assert_eq!(read.count, 3);
    client.close();
}

#[tokio::test]
async fn count_only_exposes_count_without_kvs() {
    let (client, _store) = memory_client("kv-count");
    let kv = client.kv();
    for i in 0..4 {
        kv.put(format!("n/{i}"), "v").await.unwrap();
    }

    let read = kv
        .get_with("n/", GetOptions::default().with_prefix(b"n/").with_count_only())
        .await
        .unwrap();
    assert!(read.kvs.is_empty());
    assert_eq!(read.count, 4);
    assert!(!read.more);
    client.close();
}

#[tokio::test]
async fn keys_only_and_descending_sort() {
    let (client, _store) = memory_client("kv-sort");
    let kv = client.kv();
    for key in ["s/1", "s/3", "s/2"] {
        kv.put(key, "payload").await.unwrap();
    }

    let read = kv
        .get_with(
            "s/",
            GetOptions::default()
                .with_prefix(b"s/")
                .with_keys_only()
                .with_sort(SortOrder::Descend, SortTarget::Key),
        )
        .await
        .unwrap();
    let keys: Vec<&[u8]> = read.kvs.iter().map(|kv| kv.key.as_slice()).collect();
    assert_eq!(keys, vec![&b"s/3"[..], b"s/2", b"s/1"]);
    assert!(read.kvs.iter().all(|kv| kv.value.is_empty()));
    client.close();
}

#[tokio::test]
async fn read_at_revision_and_compaction() {
    let (client, _store) = memory_client("kv-compact");
    let kv = client.kv();
    let first = kv.put("k", "v1").await.unwrap().header.revision;
    let second = kv.put("k", "v2").await.unwrap().header.revision;

    let old = kv
        .get_with("k", GetOptions::default().with_revision(first))
        .await
        .unwrap();
    assert_eq!(old.kvs[0].value, b"v1");

    kv.compact_with(CompactOptions::default().with_revision(second))
        .await
        .unwrap();
    let err = kv
        .get_with("k", GetOptions::default().with_revision(first))
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), Some(tonic::Code::OutOfRange));

    let err = kv
        .compact_with(CompactOptions::default().with_revision(second))
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Transport(_)));
    client.close();
}

#[tokio::test]
async fn delete_range_with_prev_kvs() {
    let (client, store) = memory_client("kv-delete-range");
    let kv = client.kv();
    for key in ["d/a", "d/b", "e"] {
        kv.put(key, "v").await.unwrap();
    }

    let deleted = kv
        .delete_with(
            "d/",
            DeleteOptions::default().with_prefix(b"d/").with_prev_kv(),
        )
        .await
        .unwrap();
    assert_eq!(deleted.deleted, 2);
    assert_eq!(deleted.prev_kvs.len(), 2);
    assert_eq!(store.len(), 1);
    client.close();
}

#[tokio::test]
async fn empty_key_is_rejected_by_server() {
    let (client, _store) = memory_client("kv-empty");
    let err = client.kv().put("", "v").await.unwrap_err();
    assert_eq!(err.status_code(), Some(tonic::Code::InvalidArgument));
    client.close();
}
