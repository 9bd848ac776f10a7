//! Bridging transport calls into cancellable client futures.
//!
//! A transport hands back a [`PendingCall`], one spawned RPC task that
//! resolves exactly once. [`AsyncBridge::bridge`] wraps it into a
//! [`BridgedCall`]: the raw response is converted on the client's
//! [`CallbackContext`], transport failures pass through as
//! [`ClientError::Transport`], and cancellation is visible to the caller
//! whether or not the upstream task could still be aborted.
//!
//! # Callback context
//!
//! Each resource client owns one context: a named OS thread driving a
//! current-thread tokio runtime. Conversions and `on_complete` continuations
//! of that client run there, one at a time. The RPCs themselves run on the
//! transport's runtime, so network I/O is never serialized by the context.

use crate::core::error::{ClientError, ClientResult};
use parking_lot::Mutex;
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll, Waker};
use std::thread::{self, ThreadId};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tokio::task::{AbortHandle, JoinHandle};
use tonic::Status;

type Job = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

// ============================================================================
// CallbackContext
// ============================================================================

/// Single-thread execution context for one resource client.
#[derive(Clone)]
pub struct CallbackContext {
    inner: Arc<ContextInner>,
}

struct ContextInner {
    name: String,
    thread_id: ThreadId,
    jobs: Mutex<Option<mpsc::UnboundedSender<Job>>>,
    thread: Mutex<Option<thread::JoinHandle<()>>>,
}

impl CallbackContext {
    /// Start the context thread.
    pub fn new(name: impl Into<String>) -> ClientResult<Self> {
        let name = name.into();
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| ClientError::ContextStart {
                message: format!("{name}: {e}"),
            })?;
        let (tx, mut rx) = mpsc::unbounded_channel::<Job>();

        let thread_name = name.clone();
        let thread = thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                tracing::debug!(context = %thread_name, "callback context started");
                runtime.block_on(async move {
                    while let Some(job) = rx.recv().await {
                        tokio::spawn(job);
                    }
                });
                // Dropping the runtime drops every unfinished job.
                drop(runtime);
                tracing::debug!(context = %thread_name, "callback context stopped");
            })
            .map_err(|e| ClientError::ContextStart {
                message: format!("{name}: {e}"),
            })?;

        Ok(Self {
            inner: Arc::new(ContextInner {
                name,
                thread_id: thread.thread().id(),
                jobs: Mutex::new(Some(tx)),
                thread: Mutex::new(Some(thread)),
            }),
        })
    }

    /// Thread name of this context.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// True when called from the context thread.
    pub fn is_current(&self) -> bool {
        thread::current().id() == self.inner.thread_id
    }

    pub fn is_running(&self) -> bool {
        self.inner
            .jobs
            .lock()
            .as_ref()
            .is_some_and(|tx| !tx.is_closed())
    }

    /// Run a future on the context. Returns false, dropping the future, once
    /// the context has shut down.
    pub fn spawn<F>(&self, job: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        match self.inner.jobs.lock().as_ref() {
            Some(tx) => tx.send(Box::pin(job)).is_ok(),
            None => false,
        }
    }

    /// Stop the context. Jobs not yet finished are dropped, so calls still in
    /// flight resolve with [`ClientError::ContextShutdown`].
    ///
    /// Outside a tokio runtime this waits for the thread to exit. Called from
    /// the context itself or from inside a runtime it returns at once and the
    /// thread exits after its current job.
    pub fn shutdown(&self) {
        self.inner.shutdown();
    }
}

impl ContextInner {
    fn shutdown(&self) {
        let sender = self.jobs.lock().take();
        if sender.is_none() {
            return;
        }
        drop(sender);

        let thread = self.thread.lock().take();
        if let Some(thread) = thread {
            if thread::current().id() == self.thread_id {
                // The loop exits once this job returns.
                return;
            }
            if Handle::try_current().is_ok() {
                // Joining would park a runtime worker behind a user callback.
                tracing::debug!(context = %self.name, "callback context detached");
                return;
            }
            if thread.join().is_err() {
                tracing::warn!(context = %self.name, "callback context thread panicked");
            }
        }
    }
}

impl Drop for ContextInner {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Debug for CallbackContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackContext")
            .field("name", &self.inner.name)
            .field("running", &self.is_running())
            .finish()
    }
}

// ============================================================================
// PendingCall
// ============================================================================

/// One in-flight RPC: a spawned task that resolves exactly once.
pub struct PendingCall<T> {
    handle: JoinHandle<Result<T, Status>>,
}

impl<T: Send + 'static> PendingCall<T> {
    /// Spawn the RPC on the given runtime.
    pub fn spawn_on<F>(runtime: &Handle, call: F) -> Self
    where
        F: Future<Output = Result<T, Status>> + Send + 'static,
    {
        Self {
            handle: runtime.spawn(call),
        }
    }

    /// Spawn the RPC on the current runtime.
    ///
    /// # Panics
    ///
    /// Outside a tokio runtime, like `tokio::spawn`.
    pub fn spawn<F>(call: F) -> Self
    where
        F: Future<Output = Result<T, Status>> + Send + 'static,
    {
        Self {
            handle: tokio::spawn(call),
        }
    }
}

impl<T> PendingCall<T> {
    /// Handle that aborts the RPC task.
    pub fn abort_handle(&self) -> AbortHandle {
        self.handle.abort_handle()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl<T> Future for PendingCall<T> {
    type Output = ClientResult<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.handle).poll(cx).map(|joined| match joined {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(status)) => Err(ClientError::Transport(status)),
            Err(e) if e.is_cancelled() => Err(ClientError::Cancelled),
            Err(_) => Err(ClientError::Transport(Status::internal("rpc task panicked"))),
        })
    }
}

impl<T> fmt::Debug for PendingCall<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingCall")
            .field("finished", &self.handle.is_finished())
            .finish()
    }
}

// ============================================================================
// AsyncBridge
// ============================================================================

/// Adapts [`PendingCall`]s into [`BridgedCall`]s bound to one context.
#[derive(Clone, Debug)]
pub struct AsyncBridge {
    context: CallbackContext,
}

impl AsyncBridge {
    pub fn new(context: CallbackContext) -> Self {
        Self { context }
    }

    pub fn context(&self) -> &CallbackContext {
        &self.context
    }

    /// Wrap a pending call. `convert` runs on the callback context once the
    /// call succeeds; its error fails the returned future.
    pub fn bridge<T, R, F>(&self, pending: PendingCall<T>, convert: F) -> BridgedCall<R>
    where
        T: Send + 'static,
        R: Send + 'static,
        F: FnOnce(T) -> ClientResult<R> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let upstream = pending.abort_handle();

        let submitted = self.context.spawn(async move {
            let outcome = pending.await.and_then(convert);
            // The caller may have dropped the bridged call.
            let _ = tx.send(outcome);
        });
        if !submitted {
            upstream.abort();
        }

        BridgedCall {
            state: CallState::Waiting(rx),
            cancel: Arc::new(CancelState::default()),
            upstream: Some(upstream),
            context: self.context.clone(),
        }
    }

    /// A bridged call that has already failed with `error`.
    pub fn failed<R>(&self, error: ClientError) -> BridgedCall<R> {
        BridgedCall {
            state: CallState::Failed(error),
            cancel: Arc::new(CancelState::default()),
            upstream: None,
            context: self.context.clone(),
        }
    }
}

// ============================================================================
// BridgedCall
// ============================================================================

#[derive(Default)]
struct CancelState {
    cancelled: AtomicBool,
    waker: Mutex<Option<Waker>>,
}

impl CancelState {
    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
        if let Some(waker) = self.waker.lock().take() {
            waker.wake();
        }
    }

    fn register(&self, waker: &Waker) {
        let mut slot = self.waker.lock();
        match slot.as_ref() {
            Some(current) if current.will_wake(waker) => {}
            _ => *slot = Some(waker.clone()),
        }
    }
}

enum CallState<R> {
    Waiting(oneshot::Receiver<ClientResult<R>>),
    Failed(ClientError),
    Done,
}

/// Caller-facing future of one bridged RPC.
///
/// Dropping it detaches: the RPC keeps running and its result is discarded.
/// Use [`BridgedCall::cancel`] to abort.
#[must_use = "a bridged call does nothing observable unless awaited or given a continuation"]
pub struct BridgedCall<R> {
    state: CallState<R>,
    cancel: Arc<CancelState>,
    upstream: Option<AbortHandle>,
    context: CallbackContext,
}

impl<R> BridgedCall<R> {
    /// Cancel the call.
    ///
    /// Aborts the upstream RPC if it is still running and returns whether it
    /// was. Either way the call is marked cancelled and resolves with
    /// [`ClientError::Cancelled`], even if a result had already arrived.
    /// Cancelling does not undo a side effect the server already applied.
    pub fn cancel(&self) -> bool {
        cancel_call(&self.cancel, self.upstream.as_ref())
    }

    /// A handle that can cancel this call from elsewhere.
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            state: self.cancel.clone(),
            upstream: self.upstream.clone(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl<R: Send + 'static> BridgedCall<R> {
    /// Run `f` with the outcome on the callback context.
    ///
    /// If the context is gone, `f` runs immediately on the calling thread (or
    /// wherever the context drops it) with [`ClientError::ContextShutdown`].
    pub fn on_complete<F>(self, f: F)
    where
        F: FnOnce(ClientResult<R>) + Send + 'static,
    {
        let context = self.context.clone();
        let mut continuation = Continuation::new(f);
        context.spawn(async move {
            let outcome = self.await;
            continuation.fire(outcome);
        });
    }
}

impl<R> Unpin for BridgedCall<R> {}

impl<R> Future for BridgedCall<R> {
    type Output = ClientResult<R>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        if matches!(this.state, CallState::Done) {
            return Poll::Pending;
        }
        if this.cancel.is_cancelled() {
            this.state = CallState::Done;
            return Poll::Ready(Err(ClientError::Cancelled));
        }
        this.cancel.register(cx.waker());
        if this.cancel.is_cancelled() {
            this.state = CallState::Done;
            return Poll::Ready(Err(ClientError::Cancelled));
        }

        if matches!(this.state, CallState::Failed(_)) {
            if let CallState::Failed(error) = std::mem::replace(&mut this.state, CallState::Done) {
                return Poll::Ready(Err(error));
            }
        }

        let outcome = match &mut this.state {
            CallState::Waiting(rx) => match Pin::new(rx).poll(cx) {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(Ok(outcome)) => outcome,
                // The job was dropped without answering: the context stopped.
                Poll::Ready(Err(_)) => Err(ClientError::ContextShutdown),
            },
            _ => return Poll::Pending,
        };
        this.state = CallState::Done;
        Poll::Ready(outcome)
    }
}

impl<R> fmt::Debug for BridgedCall<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.state {
            CallState::Waiting(_) => "waiting",
            CallState::Failed(_) => "failed",
            CallState::Done => "done",
        };
        f.debug_struct("BridgedCall")
            .field("state", &state)
            .field("cancelled", &self.cancel.is_cancelled())
            .field("context", &self.context.name())
            .finish()
    }
}

/// Cloneable cancellation handle of a [`BridgedCall`].
#[derive(Clone)]
pub struct CancelHandle {
    state: Arc<CancelState>,
    upstream: Option<AbortHandle>,
}

impl CancelHandle {
    /// Same as [`BridgedCall::cancel`].
    pub fn cancel(&self) -> bool {
        cancel_call(&self.state, self.upstream.as_ref())
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.is_cancelled()
    }
}

impl fmt::Debug for CancelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelHandle")
            .field("cancelled", &self.state.is_cancelled())
            .finish()
    }
}

fn cancel_call(state: &CancelState, upstream: Option<&AbortHandle>) -> bool {
    let aborted = match upstream {
        Some(handle) => {
            let running = !handle.is_finished();
            handle.abort();
            running
        }
        None => false,
    };
    state.cancel();
    tracing::debug!(upstream_aborted = aborted, "bridged call cancelled");
    aborted
}

/// Continuation that reports `ContextShutdown` if dropped before it fires.
struct Continuation<R, F: FnOnce(ClientResult<R>)> {
    f: Option<F>,
    _result: PhantomData<fn(R)>,
}

impl<R, F: FnOnce(ClientResult<R>)> Continuation<R, F> {
    fn new(f: F) -> Self {
        Self {
            f: Some(f),
            _result: PhantomData,
        }
    }

    fn fire(&mut self, outcome: ClientResult<R>) {
        if let Some(f) = self.f.take() {
            f(outcome);
        }
    }
}

impl<R, F: FnOnce(ClientResult<R>)> Drop for Continuation<R, F> {
    fn drop(&mut self) {
        self.fire(Err(ClientError::ContextShutdown));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn bridge(name: &str) -> AsyncBridge {
        AsyncBridge::new(CallbackContext::new(name).unwrap())
    }

    #[tokio::test]
    async fn test_convert_runs_on_context_thread() {
        let bridge = bridge("bridge-test-convert");
        let pending = PendingCall::spawn(async { Ok::<_, Status>(20) });

        let call = bridge.bridge(pending, |n| {
            let name = thread::current().name().map(str::to_string);
            Ok((n + 1, name))
        });

        let (value, thread_name) = call.await.unwrap();
        assert_eq!(value, 21);
        assert_eq!(thread_name.as_deref(), Some("bridge-test-convert"));
    }

    #[tokio::test]
    async fn test_transport_status_passes_through() {
        let bridge = bridge("bridge-test-status");
        let pending =
            PendingCall::spawn(async { Err::<i32, _>(Status::deadline_exceeded("slow member")) });

        let err = bridge.bridge(pending, Ok).await.unwrap_err();
        match err {
            ClientError::Transport(status) => {
                assert_eq!(status.code(), tonic::Code::DeadlineExceeded);
                assert_eq!(status.message(), "slow member");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_convert_error_fails_call() {
        let bridge = bridge("bridge-test-convert-error");
        let pending = PendingCall::spawn(async { Ok::<_, Status>(1) });

        let err = bridge
            .bridge(pending, |_| -> ClientResult<()> {
                Err(ClientError::protocol_violation("bad tag"))
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::ProtocolViolation { .. }));
    }

    #[tokio::test]
    async fn test_cancel_before_resolution_aborts_upstream() {
        let bridge = bridge("bridge-test-cancel");
        let pending = PendingCall::spawn(async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok::<_, Status>(())
        });
        let upstream = pending.abort_handle();

        let call = bridge.bridge(pending, Ok);
        assert!(call.cancel());
        assert!(matches!(call.await, Err(ClientError::Cancelled)));

        tokio::time::timeout(Duration::from_secs(5), async {
            while !upstream.is_finished() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_cancel_after_result_still_reports_cancelled() {
        let bridge = bridge("bridge-test-late-cancel");
        let pending = PendingCall::spawn(async { Ok::<_, Status>(5) });
        let upstream = pending.abort_handle();
        let call = bridge.bridge(pending, Ok);

        while !upstream.is_finished() {
            tokio::task::yield_now().await;
        }
        assert!(!call.cancel());
        assert!(call.is_cancelled());
        assert!(matches!(call.await, Err(ClientError::Cancelled)));
    }

    #[tokio::test]
    async fn test_failed_call_resolves_immediately() {
        let bridge = bridge("bridge-test-failed");
        let call: BridgedCall<()> = bridge.failed(ClientError::invalid_argument("member id 0"));
        assert!(call.await.unwrap_err().is_caller_error());
    }

    #[test]
    fn test_shutdown_outside_runtime_waits_for_running_job() {
        let context = CallbackContext::new("bridge-test-join").unwrap();
        let done = Arc::new(AtomicBool::new(false));
        let (started_tx, started_rx) = std::sync::mpsc::channel();

        let flag = done.clone();
        assert!(context.spawn(async move {
            let _ = started_tx.send(());
            thread::sleep(Duration::from_millis(100));
            flag.store(true, Ordering::SeqCst);
        }));
        started_rx.recv_timeout(Duration::from_secs(5)).unwrap();

        context.shutdown();
        assert!(done.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_on_complete_after_shutdown_runs_inline() {
        let bridge = bridge("bridge-test-shutdown");
        bridge.context().shutdown();
        assert!(!bridge.context().is_running());

        let pending = PendingCall::spawn(async { Ok::<_, Status>(1) });
        let (tx, rx) = std::sync::mpsc::channel();
        bridge.bridge(pending, Ok).on_complete(move |outcome| {
            let _ = tx.send(matches!(outcome, Err(ClientError::ContextShutdown)));
        });
        assert!(rx.recv_timeout(Duration::from_secs(5)).unwrap());
    }
}
