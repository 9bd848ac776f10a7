//! KV resource client.

use super::bridge::{AsyncBridge, BridgedCall, CallbackContext};
use crate::etcd::kv::{
    CompactOptions, DeleteOptions, DeleteResult, GetOptions, Header, PutOptions, PutResult,
    RangeResult,
};
use crate::etcd::txn::{Txn, TxnCodec, TxnResult};
use crate::transport::KvRpc;
use std::sync::Arc;

/// Client for the KV service: single operations and transactions.
///
/// Every method returns immediately with a [`BridgedCall`]; conversions of
/// its responses run on this client's callback context.
#[derive(Clone)]
pub struct KvClient {
    transport: Arc<dyn KvRpc>,
    bridge: AsyncBridge,
}

impl KvClient {
    pub fn new(transport: Arc<dyn KvRpc>, context: CallbackContext) -> Self {
        Self {
            transport,
            bridge: AsyncBridge::new(context),
        }
    }

    pub fn put(
        &self,
        key: impl Into<Vec<u8>>,
        value: impl Into<Vec<u8>>,
    ) -> BridgedCall<PutResult> {
        self.put_with(key, value, PutOptions::default())
    }

    pub fn put_with(
        &self,
        key: impl Into<Vec<u8>>,
        value: impl Into<Vec<u8>>,
        options: PutOptions,
    ) -> BridgedCall<PutResult> {
        let request = options.to_request(key.into(), value.into());
        self.bridge
            .bridge(self.transport.put(request), |r| Ok(PutResult::from(r)))
    }

    pub fn get(&self, key: impl Into<Vec<u8>>) -> BridgedCall<RangeResult> {
        self.get_with(key, GetOptions::default())
    }

    pub fn get_with(&self, key: impl Into<Vec<u8>>, options: GetOptions) -> BridgedCall<RangeResult> {
        let request = options.to_request(key.into());
        self.bridge
            .bridge(self.transport.range(request), |r| Ok(RangeResult::from(r)))
    }

    pub fn delete(&self, key: impl Into<Vec<u8>>) -> BridgedCall<DeleteResult> {
        self.delete_with(key, DeleteOptions::default())
    }

    pub fn delete_with(
        &self,
        key: impl Into<Vec<u8>>,
        options: DeleteOptions,
    ) -> BridgedCall<DeleteResult> {
        let request = options.to_request(key.into());
        self.bridge.bridge(self.transport.delete_range(request), |r| {
            Ok(DeleteResult::from(r))
        })
    }

    /// Compact with default options (revision 0, no physical wait).
    pub fn compact(&self) -> BridgedCall<Header> {
        self.compact_with(CompactOptions::default())
    }

    pub fn compact_with(&self, options: CompactOptions) -> BridgedCall<Header> {
        self.bridge
            .bridge(self.transport.compact(options.to_request()), |r| {
                Ok(Header::from(r.header))
            })
    }

    /// Commit a transaction.
    ///
    /// Encode errors fail the returned call; nothing fails synchronously.
    ///
    /// A failed call carries no results even when the server committed a
    /// branch before the failure (for example when the response cannot be
    /// decoded). Treat a failed commit as "outcome unknown", not "nothing
    /// happened".
    pub fn commit(&self, txn: &Txn) -> BridgedCall<TxnResult> {
        match TxnCodec::encode(txn) {
            Ok(request) => {
                tracing::trace!(
                    compares = request.compare.len(),
                    success = request.success.len(),
                    failure = request.failure.len(),
                    "committing txn"
                );
                self.bridge
                    .bridge(self.transport.txn(request), TxnCodec::decode)
            }
            Err(error) => self.bridge.failed(error),
        }
    }

    pub fn context(&self) -> &CallbackContext {
        self.bridge.context()
    }

    /// Stop this client's callback context.
    pub fn close(&self) {
        self.bridge.context().shutdown();
    }
}

impl std::fmt::Debug for KvClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KvClient")
            .field("context", self.bridge.context())
            .finish()
    }
}
