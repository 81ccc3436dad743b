//! The backing-store contract consumed by the upper layers.

use std::sync::Arc;

use bytes::Bytes;

use crate::LLError;

/// A store-wide, monotonically increasing modification counter.
///
/// Revision 0 means "never written".
pub type Revision = i64;

/// A single stored key with its MVCC bookkeeping.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyValue {
    pub key: String,
    /// Empty when the range was requested with `keys_only`.
    pub value: Bytes,
    /// Revision of the write that created the key (since its last deletion).
    pub create_revision: Revision,
    /// Revision of the latest write to the key.
    pub mod_revision: Revision,
    /// Number of writes since creation.
    pub version: i64,
}

impl KeyValue {
    /// The value as UTF-8, if it is valid UTF-8.
    pub fn value_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.value).ok()
    }
}

/// What a range result is sorted by.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SortTarget {
    #[default]
    Key,
    /// Write order. Keys written by the same transaction keep the order in
    /// which the transaction issued them.
    ModRevision,
    CreateRevision,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SortOrder {
    #[default]
    Ascend,
    Descend,
}

/// A read of one key or one key prefix.
///
/// Built with the chained constructors:
///
/// ```rust
/// use structkv_ll_store::{RangeRequest, SortOrder, SortTarget};
///
/// let req = RangeRequest::prefix("/users/")
///     .keys_only()
///     .limit(10)
///     .sort_by(SortTarget::ModRevision, SortOrder::Ascend);
/// assert!(req.prefix);
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RangeRequest {
    pub key: String,
    /// Match every key starting with `key` instead of `key` alone.
    pub prefix: bool,
    pub keys_only: bool,
    pub count_only: bool,
    /// Maximum number of results after sorting; 0 means unlimited.
    pub limit: usize,
    /// Read as of this revision instead of the latest.
    pub revision: Option<Revision>,
    pub sort: Option<(SortTarget, SortOrder)>,
}

impl RangeRequest {
    /// Read exactly one key.
    pub fn key(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            prefix: false,
            keys_only: false,
            count_only: false,
            limit: 0,
            revision: None,
            sort: None,
        }
    }

    /// Read every key starting with `prefix`.
    pub fn prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: true,
            ..Self::key(prefix)
        }
    }

    #[must_use]
    pub fn keys_only(mut self) -> Self {
        self.keys_only = true;
        self
    }

    #[must_use]
    pub fn count_only(mut self) -> Self {
        self.count_only = true;
        self
    }

    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    #[must_use]
    pub fn at_revision(mut self, revision: Option<Revision>) -> Self {
        self.revision = revision;
        self
    }

    #[must_use]
    pub fn sort_by(mut self, target: SortTarget, order: SortOrder) -> Self {
        self.sort = Some((target, order));
        self
    }

    /// Whether `candidate` falls inside this request's key range.
    pub fn matches(&self, candidate: &str) -> bool {
        if self.prefix {
            candidate.starts_with(&self.key)
        } else {
            candidate == self.key
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RangeResponse {
    pub kvs: Vec<KeyValue>,
    /// Number of matching keys before `limit` was applied.
    pub count: usize,
    /// The revision the read was served at.
    pub revision: Revision,
}

/// The field a [`Compare`] looks at.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CompareTarget {
    /// Absent keys compare as the empty value.
    Value(Bytes),
    /// Absent keys compare as 0.
    ModRevision(Revision),
    /// Absent keys compare as 0.
    CreateRevision(Revision),
    /// Absent keys compare as 0.
    Version(i64),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompareOp {
    Equal,
    NotEqual,
    Greater,
    Less,
}

/// A guard evaluated against the latest state when a transaction commits.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Compare {
    pub key: String,
    pub op: CompareOp,
    pub target: CompareTarget,
}

impl Compare {
    pub fn mod_revision(key: impl Into<String>, op: CompareOp, revision: Revision) -> Self {
        Self {
            key: key.into(),
            op,
            target: CompareTarget::ModRevision(revision),
        }
    }

    pub fn create_revision(key: impl Into<String>, op: CompareOp, revision: Revision) -> Self {
        Self {
            key: key.into(),
            op,
            target: CompareTarget::CreateRevision(revision),
        }
    }

    pub fn value(key: impl Into<String>, op: CompareOp, value: impl Into<Bytes>) -> Self {
        Self {
            key: key.into(),
            op,
            target: CompareTarget::Value(value.into()),
        }
    }

    pub fn version(key: impl Into<String>, op: CompareOp, version: i64) -> Self {
        Self {
            key: key.into(),
            op,
            target: CompareTarget::Version(version),
        }
    }

    /// Evaluate the ordering `actual <op> expected`.
    pub fn holds<T: Ord + ?Sized>(&self, actual: &T, expected: &T) -> bool {
        match self.op {
            CompareOp::Equal => actual == expected,
            CompareOp::NotEqual => actual != expected,
            CompareOp::Greater => actual > expected,
            CompareOp::Less => actual < expected,
        }
    }
}

/// A write issued inside a transaction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TxnOp {
    Put { key: String, value: Bytes },
    Delete { key: String },
    DeletePrefix { prefix: String },
}

impl TxnOp {
    pub fn put(key: impl Into<String>, value: impl Into<Bytes>) -> Self {
        TxnOp::Put {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn delete(key: impl Into<String>) -> Self {
        TxnOp::Delete { key: key.into() }
    }

    pub fn delete_prefix(prefix: impl Into<String>) -> Self {
        TxnOp::DeletePrefix {
            prefix: prefix.into(),
        }
    }
}

/// An atomic compare-then-write request.
///
/// If every `compare` holds, `success` is applied; otherwise `failure` is.
/// Either branch is applied atomically at a single new revision.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TxnRequest {
    pub compare: Vec<Compare>,
    pub success: Vec<TxnOp>,
    pub failure: Vec<TxnOp>,
}

impl TxnRequest {
    /// A transaction with no guards: always applies `ops`.
    pub fn batch(ops: Vec<TxnOp>) -> Self {
        Self {
            success: ops,
            ..Self::default()
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TxnResponse {
    /// Whether every compare held.
    pub succeeded: bool,
    /// The revision after the transaction. Unchanged if nothing was written.
    pub revision: Revision,
}

/// A flat, prefix-scannable, MVCC-versioned key-value store.
///
/// Implementations are internally synchronized: every method takes `&self`
/// so one backend can be shared by many handles.
///
/// # Object Safety
///
/// This trait is object-safe: you can use `Arc<dyn KvBackend>`.
pub trait KvBackend: Send + Sync {
    /// Read a key or a key prefix.
    fn range(&self, req: &RangeRequest) -> Result<RangeResponse, LLError>;

    /// Write a single key, returning the revision of the write.
    fn put(&self, key: &str, value: Bytes) -> Result<Revision, LLError>;

    /// Apply an atomic compare-then-write transaction.
    fn txn(&self, req: TxnRequest) -> Result<TxnResponse, LLError>;

    /// The latest revision of the store.
    fn current_revision(&self) -> Result<Revision, LLError>;

    /// Read a single key at the latest revision.
    fn get(&self, key: &str) -> Result<Option<KeyValue>, LLError> {
        let resp = self.range(&RangeRequest::key(key))?;
        Ok(resp.kvs.into_iter().next())
    }
}

// Blanket implementations for references and smart pointers

impl<T: KvBackend + ?Sized> KvBackend for &T {
    fn range(&self, req: &RangeRequest) -> Result<RangeResponse, LLError> {
        (**self).range(req)
    }

    fn put(&self, key: &str, value: Bytes) -> Result<Revision, LLError> {
        (**self).put(key, value)
    }

    fn txn(&self, req: TxnRequest) -> Result<TxnResponse, LLError> {
        (**self).txn(req)
    }

    fn current_revision(&self) -> Result<Revision, LLError> {
        (**self).current_revision()
    }
}

impl<T: KvBackend + ?Sized> KvBackend for Box<T> {
    fn range(&self, req: &RangeRequest) -> Result<RangeResponse, LLError> {
        self.as_ref().range(req)
    }

    fn put(&self, key: &str, value: Bytes) -> Result<Revision, LLError> {
        self.as_ref().put(key, value)
    }

    fn txn(&self, req: TxnRequest) -> Result<TxnResponse, LLError> {
        self.as_ref().txn(req)
    }

    fn current_revision(&self) -> Result<Revision, LLError> {
        self.as_ref().current_revision()
    }
}

impl<T: KvBackend + ?Sized> KvBackend for Arc<T> {
    fn range(&self, req: &RangeRequest) -> Result<RangeResponse, LLError> {
        self.as_ref().range(req)
    }

    fn put(&self, key: &str, value: Bytes) -> Result<Revision, LLError> {
        self.as_ref().put(key, value)
    }

    fn txn(&self, req: TxnRequest) -> Result<TxnResponse, LLError> {
        self.as_ref().txn(req)
    }

    fn current_revision(&self) -> Result<Revision, LLError> {
        self.as_ref().current_revision()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_request_matches_descendants_only() {
        let req = RangeRequest::prefix("/a/b/");
        assert!(req.matches("/a/b/"));
        assert!(req.matches("/a/b/c/"));
        assert!(!req.matches("/a/bc/"));
        assert!(!req.matches("/a/"));
    }

    #[test]
    fn key_request_matches_exactly() {
        let req = RangeRequest::key("/a/");
        assert!(req.matches("/a/"));
        assert!(!req.matches("/a/b/"));
    }

    #[test]
    fn builder_sets_fields() {
        let req = RangeRequest::prefix("/x/")
            .keys_only()
            .count_only()
            .limit(3)
            .at_revision(Some(9))
            .sort_by(SortTarget::ModRevision, SortOrder::Descend);
        assert!(req.keys_only);
        assert!(req.count_only);
        assert_eq!(req.limit, 3);
        assert_eq!(req.revision, Some(9));
        assert_eq!(
            req.sort,
            Some((SortTarget::ModRevision, SortOrder::Descend))
        );
    }

    #[test]
    fn compare_holds() {
        let c = Compare::create_revision("/k/", CompareOp::Equal, 0);
        assert!(c.holds(&0, &0));
        assert!(!c.holds(&4, &0));

        let c = Compare::mod_revision("/k/", CompareOp::Greater, 2);
        assert!(c.holds(&3, &2));
        assert!(!c.holds(&2, &2));
    }

    #[test]
    fn value_str_rejects_invalid_utf8() {
        let kv = KeyValue {
            key: "/k/".to_string(),
            value: Bytes::from_static(&[0xff, 0xfe]),
            create_revision: 1,
            mod_revision: 1,
            version: 1,
        };
        assert!(kv.value_str().is_none());
    }

    #[test]
    fn batch_has_no_guards() {
        let req = TxnRequest::batch(vec![TxnOp::delete("/k/")]);
        assert!(req.compare.is_empty());
        assert_eq!(req.success.len(), 1);
        assert!(req.failure.is_empty());
    }
}
