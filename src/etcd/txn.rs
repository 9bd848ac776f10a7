//! Conditional transactions.
//!
//! A [`Txn`] is a list of [`Cmp`] predicates plus two operation branches.
//! [`TxnCodec`] turns it into one wire `TxnRequest` and turns the server's
//! `TxnResponse` back into typed results, one per executed operation, in
//! branch order.
//!
//! Both directions are exhaustive matches over closed enums: adding an
//! operation kind or compare target does not compile until encode and decode
//! handle it. A response entry the client cannot classify is reported as
//! [`ClientError::ProtocolViolation`], never mapped onto a default variant.

use super::kv::{
    DeleteOptions, DeleteResult, GetOptions, Header, PutOptions, PutResult, RangeResult,
};
use super::proto;
use crate::core::error::{ClientError, ClientResult};
use serde::{Deserialize, Serialize};

// ============================================================================
// Compare predicates
// ============================================================================

/// Comparison operator of a [`Cmp`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CmpOp {
    Equal,
    Greater,
    Less,
}

/// What a [`Cmp`] inspects, carrying the operand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CmpTarget {
    /// Number of modifications of the key.
    Version(i64),
    /// Revision at which the key was created.
    CreateRevision(i64),
    /// Revision of the last modification.
    ModRevision(i64),
    /// Stored value, compared bytewise.
    Value(Vec<u8>),
}

/// A compare predicate gating which branch of a [`Txn`] runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cmp {
    key: Vec<u8>,
    op: CmpOp,
    target: CmpTarget,
}

impl Cmp {
    /// Build a predicate, rejecting an empty key or a negative numeric operand.
    pub fn new(key: impl Into<Vec<u8>>, op: CmpOp, target: CmpTarget) -> ClientResult<Self> {
        let cmp = Self {
            key: key.into(),
            op,
            target,
        };
        cmp.validate()?;
        Ok(cmp)
    }

    pub fn value(
        key: impl Into<Vec<u8>>,
        op: CmpOp,
        value: impl Into<Vec<u8>>,
    ) -> ClientResult<Self> {
        Self::new(key, op, CmpTarget::Value(value.into()))
    }

    pub fn version(key: impl Into<Vec<u8>>, op: CmpOp, version: i64) -> ClientResult<Self> {
        Self::new(key, op, CmpTarget::Version(version))
    }

    pub fn create_revision(
        key: impl Into<Vec<u8>>,
        op: CmpOp,
        revision: i64,
    ) -> ClientResult<Self> {
        Self::new(key, op, CmpTarget::CreateRevision(revision))
    }

    pub fn mod_revision(key: impl Into<Vec<u8>>, op: CmpOp, revision: i64) -> ClientResult<Self> {
        Self::new(key, op, CmpTarget::ModRevision(revision))
    }

    pub fn key(&self) -> &[u8] {
        &self.key
    }

    pub fn op(&self) -> CmpOp {
        self.op
    }

    pub fn target(&self) -> &CmpTarget {
        &self.target
    }

    fn validate(&self) -> ClientResult<()> {
        if self.key.is_empty() {
            return Err(ClientError::invalid_argument("compare key must not be empty"));
        }
        let (name, operand) = match &self.target {
            CmpTarget::Version(v) => ("version", *v),
            CmpTarget::CreateRevision(v) => ("create revision", *v),
            CmpTarget::ModRevision(v) => ("mod revision", *v),
            CmpTarget::Value(_) => return Ok(()),
        };
        if operand < 0 {
            return Err(ClientError::invalid_argument(format!(
                "compare {name} must not be negative, got {operand}"
            )));
        }
        Ok(())
    }
}

// ============================================================================
// Operations
// ============================================================================

/// One operation of a transaction branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Op {
    Put {
        key: Vec<u8>,
        value: Vec<u8>,
        options: PutOptions,
    },
    Get {
        key: Vec<u8>,
        options: GetOptions,
    },
    Delete {
        key: Vec<u8>,
        options: DeleteOptions,
    },
}

impl Op {
    pub fn put(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>, options: PutOptions) -> Self {
        Self::Put {
            key: key.into(),
            value: value.into(),
            options,
        }
    }

    pub fn get(key: impl Into<Vec<u8>>, options: GetOptions) -> Self {
        Self::Get {
            key: key.into(),
            options,
        }
    }

    pub fn delete(key: impl Into<Vec<u8>>, options: DeleteOptions) -> Self {
        Self::Delete {
            key: key.into(),
            options,
        }
    }

    /// Short name used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Put { .. } => "put",
            Self::Get { .. } => "get",
            Self::Delete { .. } => "delete",
        }
    }
}

// ============================================================================
// Transaction
// ============================================================================

/// An immutable transaction: compares, then a success and a failure branch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Txn {
    compares: Vec<Cmp>,
    success: Vec<Op>,
    failure: Vec<Op>,
}

impl Txn {
    pub fn builder() -> TxnBuilder {
        TxnBuilder::default()
    }

    pub fn compares(&self) -> &[Cmp] {
        &self.compares
    }

    pub fn success(&self) -> &[Op] {
        &self.success
    }

    pub fn failure(&self) -> &[Op] {
        &self.failure
    }
}

/// Builder for [`Txn`]. Every call appends; order is kept.
#[derive(Debug, Default)]
pub struct TxnBuilder {
    txn: Txn,
}

impl TxnBuilder {
    /// Add compare predicates. All must hold for the success branch to run.
    pub fn when(mut self, compares: impl IntoIterator<Item = Cmp>) -> Self {
        self.txn.compares.extend(compares);
        self
    }

    /// Add operations to the success branch.
    pub fn then(mut self, ops: impl IntoIterator<Item = Op>) -> Self {
        self.txn.success.extend(ops);
        self
    }

    /// Add operations to the failure branch.
    pub fn or_else(mut self, ops: impl IntoIterator<Item = Op>) -> Self {
        self.txn.failure.extend(ops);
        self
    }

    pub fn build(self) -> Txn {
        self.txn
    }
}

// ============================================================================
// Results
// ============================================================================

/// Result of one executed operation, matching the operation at the same index
/// of the branch that ran.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationResult {
    Put(PutResult),
    Range(RangeResult),
    Delete(DeleteResult),
}

impl OperationResult {
    pub fn as_put(&self) -> Option<&PutResult> {
        match self {
            Self::Put(result) => Some(result),
            _ => None,
        }
    }

    pub fn as_range(&self) -> Option<&RangeResult> {
        match self {
            Self::Range(result) => Some(result),
            _ => None,
        }
    }

    pub fn as_delete(&self) -> Option<&DeleteResult> {
        match self {
            Self::Delete(result) => Some(result),
            _ => None,
        }
    }
}

/// Decoded transaction response.
///
/// `results.len()` equals the length of the branch that ran; the codec does
/// not check this against the original transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxnResult {
    pub header: Header,
    /// True when every compare held and the success branch ran.
    pub succeeded: bool,
    pub results: Vec<OperationResult>,
}

// ============================================================================
// Codec
// ============================================================================

/// Translation between [`Txn`]/[`TxnResult`] and the wire messages.
#[derive(Debug, Clone, Copy, Default)]
pub struct TxnCodec;

impl TxnCodec {
    /// Encode a transaction. Compares and both branches keep their order.
    pub fn encode(txn: &Txn) -> ClientResult<proto::TxnRequest> {
        let compare = txn
            .compares
            .iter()
            .map(encode_compare)
            .collect::<ClientResult<Vec<_>>>()?;

        Ok(proto::TxnRequest {
            compare,
            success: txn.success.iter().map(encode_op).collect(),
            failure: txn.failure.iter().map(encode_op).collect(),
        })
    }

    /// Decode a transaction response into results in received order.
    pub fn decode(response: proto::TxnResponse) -> ClientResult<TxnResult> {
        let results = response
            .responses
            .into_iter()
            .enumerate()
            .map(|(index, op)| decode_response_op(index, op))
            .collect::<ClientResult<Vec<_>>>()?;

        Ok(TxnResult {
            header: response.header.into(),
            succeeded: response.succeeded,
            results,
        })
    }
}

fn encode_compare(cmp: &Cmp) -> ClientResult<proto::Compare> {
    cmp.validate()?;

    let result = match cmp.op {
        CmpOp::Equal => proto::CompareResult::Equal,
        CmpOp::Greater => proto::CompareResult::Greater,
        CmpOp::Less => proto::CompareResult::Less,
    };

    // one wire target and one union member per variant
    let (target, union) = match &cmp.target {
        CmpTarget::Version(v) => (
            proto::CompareTarget::Version,
            proto::TargetUnion::Version(*v),
        ),
        CmpTarget::CreateRevision(v) => (
            proto::CompareTarget::Create,
            proto::TargetUnion::CreateRevision(*v),
        ),
        CmpTarget::ModRevision(v) => (
            proto::CompareTarget::Mod,
            proto::TargetUnion::ModRevision(*v),
        ),
        CmpTarget::Value(v) => (
            proto::CompareTarget::Value,
            proto::TargetUnion::Value(v.clone()),
        ),
    };

    Ok(proto::Compare {
        result: result as i32,
        target: target as i32,
        key: cmp.key.clone(),
        target_union: Some(union),
        range_end: Vec::new(),
    })
}

fn encode_op(op: &Op) -> proto::RequestOp {
    let request = match op {
        Op::Put {
            key,
            value,
            options,
        } => proto::RequestOpKind::Put(options.to_request(key.clone(), value.clone())),
        Op::Get { key, options } => proto::RequestOpKind::Range(options.to_request(key.clone())),
        Op::Delete { key, options } => {
            proto::RequestOpKind::DeleteRange(options.to_request(key.clone()))
        }
    };
    proto::RequestOp {
        request: Some(request),
    }
}

fn decode_response_op(index: usize, op: proto::ResponseOp) -> ClientResult<OperationResult> {
    match op.response {
        Some(proto::ResponseOpKind::Range(r)) => Ok(OperationResult::Range(r.into())),
        Some(proto::ResponseOpKind::Put(r)) => Ok(OperationResult::Put(r.into())),
        Some(proto::ResponseOpKind::DeleteRange(r)) => Ok(OperationResult::Delete(r.into())),
        None => {
            tracing::warn!(index, "txn response op carries no recognized tag");
            Err(ClientError::protocol_violation(format!(
                "txn response op {index} has no recognized tag"
            )))
        }
    }
}
