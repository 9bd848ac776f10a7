//! Bridged call behavior through the resource clients.

mod common;

use common::{memory_client, wait_until};
use lattice_client::ClientError;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tonic::Status;

#[tokio::test]
async fn cancel_in_flight_put_aborts_upstream() {
    let (client, store) = memory_client("bridge-cancel");
    store.set_latency(Duration::from_millis(300));

    let call = client.kv().put("k", "v");
    assert!(call.cancel());
    assert!(matches!(call.await, Err(ClientError::Cancelled)));

    // the aborted task never reaches the store
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert!(store.is_empty());
    assert_eq!(store.revision(), 1);
    client.close();
}

#[tokio::test]
async fn cancel_after_completion_reports_cancelled() {
    let (client, store) = memory_client("bridge-late-cancel");

    let call = client.kv().put("k", "v");
    assert!(wait_until(|| !store.is_empty()).await);
    tokio::time::sleep(Duration::from_millis(20)).await;

    let handle = call.cancel_handle();
    assert!(!handle.cancel());
    assert!(matches!(call.await, Err(ClientError::Cancelled)));
    // the write itself is not undone
    assert_eq!(client.kv().get("k").await.unwrap().kvs.len(), 1);
    client.close();
}

#[tokio::test]
async fn injected_status_reaches_caller_unmodified() {
    let (client, store) = memory_client("bridge-status");
    store.fail_next(Status::permission_denied("etcdserver: permission denied"));

    let err = client.kv().get("k").await.unwrap_err();
    assert_eq!(err.status_code(), Some(tonic::Code::PermissionDenied));
    assert!(!err.is_retriable());

    // the failure is consumed by one call only
    assert!(client.kv().get("k").await.is_ok());
    client.close();
}

#[tokio::test]
async fn continuations_run_on_named_context_thread() {
    let (client, _store) = memory_client("bridge-thread");
    let (tx, rx) = tokio::sync::oneshot::channel();

    client.kv().put("k", "v").on_complete(move |outcome| {
        let name = std::thread::current().name().map(str::to_string);
        let _ = tx.send((outcome.is_ok(), name));
    });

    let (ok, name) = rx.await.unwrap();
    assert!(ok);
    assert_eq!(name.as_deref(), Some("bridge-thread-kv"));
    assert_eq!(client.maintenance().context().name(), "bridge-thread-maintenance");
    client.close();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn continuations_never_overlap() {
    let (client, _store) = memory_client("bridge-serial");
    let busy = Arc::new(AtomicBool::new(false));
    let overlaps = Arc::new(AtomicUsize::new(0));
    let done = Arc::new(AtomicUsize::new(0));

    for i in 0..32 {
        let busy = busy.clone();
        let overlaps = overlaps.clone();
        let done = done.clone();
        client
            .kv()
            .put(format!("k{i}"), "v")
            .on_complete(move |_| {
                if busy.swap(true, Ordering::SeqCst) {
                    overlaps.fetch_add(1, Ordering::SeqCst);
                }
                std::thread::sleep(Duration::from_millis(2));
                busy.store(false, Ordering::SeqCst);
                done.fetch_add(1, Ordering::SeqCst);
            });
    }

    assert!(wait_until(|| done.load(Ordering::SeqCst) == 32).await);
    assert_eq!(overlaps.load(Ordering::SeqCst), 0);
    client.close();
}

#[tokio::test]
async fn calls_after_close_report_shutdown() {
    let (client, _store) = memory_client("bridge-closed");
    client.close();
    assert!(!client.kv().context().is_running());

    let err = client.kv().get("k").await.unwrap_err();
    assert!(matches!(err, ClientError::ContextShutdown));
}

#[tokio::test]
async fn close_inside_runtime_does_not_wait_for_busy_context() {
    let (client, _store) = memory_client("bridge-close-busy");
    let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();
    let entered = Arc::new(AtomicBool::new(false));
    let finished = Arc::new(AtomicBool::new(false));

    let (entered_flag, finished_flag) = (entered.clone(), finished.clone());
    client.kv().put("k", "v").on_complete(move |result| {
        entered_flag.store(true, Ordering::SeqCst);
        let _ = release_rx.recv_timeout(Duration::from_secs(5));
        finished_flag.store(result.is_ok(), Ordering::SeqCst);
    });
    assert!(wait_until(|| entered.load(Ordering::SeqCst)).await);

    // the continuation holds the context thread until released
    let started = Instant::now();
    client.close();
    assert!(started.elapsed() < Duration::from_secs(1));
    assert!(!client.kv().context().is_running());

    release_tx.send(()).unwrap();
    assert!(wait_until(|| finished.load(Ordering::SeqCst)).await);
}

#[tokio::test]
async fn dropped_call_still_applies() {
    let (client, store) = memory_client("bridge-detach");
    drop(client.kv().put("k", "v"));

    assert!(wait_until(|| !store.is_empty()).await);
    client.close();
}
