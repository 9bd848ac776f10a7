//! Snapshot stream callback slot.
//!
//! One maintenance client holds at most one snapshot stream and at most one
//! callback. The slot is a two-state machine guarded by a reentrant mutex:
//!
//! ```text
//!            attach(cb)                  attach(cb') swaps, no new stream
//!   Closed ─────────────▶ Open{gen, stream, cb} ◀───┐
//!     ▲                      │  │  │                └─┘
//!     │   detach()           │  │  │ on_error  -> cb.on_error (once)
//!     └──────────────────────┘  │  └ on_completed -> cb.on_completed
//!     └─────────────────────────┘
//! ```
//!
//! Every delivery happens inside the same critical section as attach and
//! detach, to the callback installed at that moment, so a chunk never
//! reaches two callbacks and never reaches one that is being removed. Each
//! opened stream gets a generation number; events from a stream that is no
//! longer the current one are dropped. The mutex is reentrant so a callback
//! may detach or re-attach from inside its own delivery.

use crate::core::error::ClientError;
use crate::etcd::maintenance::SnapshotResult;
use crate::etcd::proto;
use crate::transport::{MaintenanceRpc, StreamHandle, StreamObserver};
use parking_lot::ReentrantMutex;
use std::cell::RefCell;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tonic::Status;

/// Receiver of snapshot chunks.
pub trait SnapshotCallback: Send + Sync {
    /// One chunk of the snapshot.
    fn on_snapshot(&self, snapshot: SnapshotResult);

    /// The stream failed. Called at most once; the slot is closed by then.
    fn on_error(&self, error: ClientError);

    /// The server ended the stream. The slot is closed by then.
    fn on_completed(&self) {}
}

enum SlotState {
    Closed,
    Open {
        generation: u64,
        stream: StreamHandle,
        callback: Arc<dyn SnapshotCallback>,
    },
}

struct SlotShared {
    state: ReentrantMutex<RefCell<SlotState>>,
    generations: AtomicU64,
    transport: Arc<dyn MaintenanceRpc>,
}

/// Single-subscriber slot bound to the snapshot stream of one client.
#[derive(Clone)]
pub struct SnapshotSlot {
    shared: Arc<SlotShared>,
}

impl SnapshotSlot {
    pub fn new(transport: Arc<dyn MaintenanceRpc>) -> Self {
        Self {
            shared: Arc::new(SlotShared {
                state: ReentrantMutex::new(RefCell::new(SlotState::Closed)),
                generations: AtomicU64::new(0),
                transport,
            }),
        }
    }

    /// Install `callback`, opening the stream if the slot is closed.
    ///
    /// When a stream is already open only the callback changes: no second
    /// stream is opened and earlier chunks are not replayed.
    pub fn attach(&self, callback: Arc<dyn SnapshotCallback>) {
        let guard = self.shared.state.lock();

        let opened = {
            let mut state = guard.borrow_mut();
            match &mut *state {
                SlotState::Open {
                    generation,
                    callback: installed,
                    ..
                } => {
                    *installed = callback;
                    tracing::debug!(generation = *generation, "snapshot callback swapped");
                    None
                }
                SlotState::Closed => {
                    let generation = self.shared.generations.fetch_add(1, Ordering::Relaxed) + 1;
                    let (stream, completion) = StreamHandle::new();
                    *state = SlotState::Open {
                        generation,
                        stream,
                        callback,
                    };
                    Some((generation, completion))
                }
            }
        };

        // Opened with the borrow released: a transport may deliver inline.
        if let Some((generation, completion)) = opened {
            tracing::debug!(generation, "opening snapshot stream");
            let observer = Arc::new(SlotObserver {
                generation,
                shared: Arc::downgrade(&self.shared),
            });
            self.shared
                .transport
                .snapshot(proto::SnapshotRequest, observer, completion);
        }
    }

    /// Close the stream and release the callback. Returns false when the slot
    /// was already closed, in which case nothing happens.
    pub fn detach(&self) -> bool {
        let guard = self.shared.state.lock();
        let previous = guard.replace(SlotState::Closed);
        match previous {
            SlotState::Open {
                generation, stream, ..
            } => {
                stream.complete();
                tracing::debug!(generation, "snapshot stream detached");
                true
            }
            SlotState::Closed => false,
        }
    }

    pub fn is_open(&self) -> bool {
        let guard = self.shared.state.lock();
        let open = matches!(&*guard.borrow(), SlotState::Open { .. });
        open
    }

    /// Generation of the open stream, if any.
    pub fn generation(&self) -> Option<u64> {
        let guard = self.shared.state.lock();
        let generation = match &*guard.borrow() {
            SlotState::Open { generation, .. } => Some(*generation),
            SlotState::Closed => None,
        };
        generation
    }
}

impl std::fmt::Debug for SnapshotSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotSlot")
            .field("generation", &self.generation())
            .finish()
    }
}

/// Observer handed to the transport for one stream generation.
struct SlotObserver {
    generation: u64,
    shared: Weak<SlotShared>,
}

impl SlotObserver {
    /// Take the callback out of the slot and close it, if this stream is
    /// still the current one. Must be called with the lock held.
    fn close_current(&self, state: &RefCell<SlotState>) -> Option<Arc<dyn SnapshotCallback>> {
        let mut state = state.borrow_mut();
        let current = matches!(
            &*state,
            SlotState::Open { generation, .. } if *generation == self.generation
        );
        if !current {
            return None;
        }
        match std::mem::replace(&mut *state, SlotState::Closed) {
            SlotState::Open { callback, .. } => Some(callback),
            SlotState::Closed => None,
        }
    }
}

impl StreamObserver<proto::SnapshotResponse> for SlotObserver {
    fn on_next(&self, message: proto::SnapshotResponse) {
        let Some(shared) = self.shared.upgrade() else {
            return;
        };
        let guard = shared.state.lock();
        let callback = match &*guard.borrow() {
            SlotState::Open {
                generation,
                callback,
                ..
            } if *generation == self.generation => callback.clone(),
            _ => {
                tracing::trace!(generation = self.generation, "dropping chunk of a stale stream");
                return;
            }
        };
        callback.on_snapshot(SnapshotResult::from(message));
    }

    fn on_error(&self, status: Status) {
        let Some(shared) = self.shared.upgrade() else {
            return;
        };
        let guard = shared.state.lock();
        let Some(callback) = self.close_current(&guard) else {
            return;
        };
        tracing::warn!(
            generation = self.generation,
            code = ?status.code(),
            "snapshot stream terminated: {}",
            status.message()
        );
        callback.on_error(ClientError::StreamTerminated { status });
    }

    fn on_completed(&self) {
        let Some(shared) = self.shared.upgrade() else {
            return;
        };
        let guard = shared.state.lock();
        let Some(callback) = self.close_current(&guard) else {
            return;
        };
        tracing::debug!(generation = self.generation, "snapshot stream completed");
        callback.on_completed();
    }
}
