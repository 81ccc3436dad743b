//! Scoped read/write access used by multi-key mutations.
//!
//! [`KvTxn`] is the seam that lets one piece of mutation logic run either
//! directly against the backend ([`DirectTxn`], no cross-key atomicity) or
//! inside an optimistic software transaction ([`Stm`], all-or-nothing,
//! retried on conflict by [`run_stm`]).

use std::collections::HashMap;

use bytes::Bytes;

use crate::{Compare, CompareOp, KvBackend, LLError, Revision, TxnOp, TxnRequest};

/// Scoped get/put access to the backing store.
pub trait KvTxn {
    /// Read a key, observing this transaction's own pending writes.
    fn get(&mut self, key: &str) -> Result<Option<Bytes>, LLError>;

    fn put(&mut self, key: &str, value: Bytes) -> Result<(), LLError>;

    fn delete(&mut self, key: &str) -> Result<(), LLError>;

    fn delete_prefix(&mut self, prefix: &str) -> Result<(), LLError>;
}

impl<T: KvTxn + ?Sized> KvTxn for &mut T {
    fn get(&mut self, key: &str) -> Result<Option<Bytes>, LLError> {
        (**self).get(key)
    }

    fn put(&mut self, key: &str, value: Bytes) -> Result<(), LLError> {
        (**self).put(key, value)
    }

    fn delete(&mut self, key: &str) -> Result<(), LLError> {
        (**self).delete(key)
    }

    fn delete_prefix(&mut self, prefix: &str) -> Result<(), LLError> {
        (**self).delete_prefix(prefix)
    }
}

/// Passes every operation straight through to the backend.
///
/// Each write is its own store operation: concurrent writers may interleave
/// and a failure part way leaves the earlier writes applied.
pub struct DirectTxn<'a> {
    backend: &'a dyn KvBackend,
    last_revision: Option<Revision>,
}

impl<'a> DirectTxn<'a> {
    pub fn new(backend: &'a dyn KvBackend) -> Self {
        Self {
            backend,
            last_revision: None,
        }
    }

    /// Revision of the most recent write issued through this handle.
    pub fn last_revision(&self) -> Option<Revision> {
        self.last_revision
    }

    fn apply(&mut self, op: TxnOp) -> Result<(), LLError> {
        let resp = self.backend.txn(TxnRequest::batch(vec![op]))?;
        self.last_revision = Some(resp.revision);
        Ok(())
    }
}

impl KvTxn for DirectTxn<'_> {
    fn get(&mut self, key: &str) -> Result<Option<Bytes>, LLError> {
        Ok(self.backend.get(key)?.map(|kv| kv.value))
    }

    fn put(&mut self, key: &str, value: Bytes) -> Result<(), LLError> {
        let revision = self.backend.put(key, value)?;
        self.last_revision = Some(revision);
        Ok(())
    }

    fn delete(&mut self, key: &str) -> Result<(), LLError> {
        self.apply(TxnOp::delete(key))
    }

    fn delete_prefix(&mut self, prefix: &str) -> Result<(), LLError> {
        self.apply(TxnOp::delete_prefix(prefix))
    }
}

/// Optimistic software transaction with repeatable-read isolation.
///
/// Reads are served from the backend once and then cached together with the
/// key's mod revision. Writes are buffered. [`Stm::commit`] submits the
/// buffered writes guarded by "every key read is unchanged"; if the guard
/// fails nothing is written and the caller is expected to retry.
pub struct Stm<'a> {
    backend: &'a dyn KvBackend,
    reads: HashMap<String, (Option<Bytes>, Revision)>,
    writes: Vec<TxnOp>,
}

impl<'a> Stm<'a> {
    pub fn new(backend: &'a dyn KvBackend) -> Self {
        Self {
            backend,
            reads: HashMap::new(),
            writes: Vec::new(),
        }
    }

    /// Buffered writes, in issue order.
    pub fn pending(&self) -> &[TxnOp] {
        &self.writes
    }

    fn pending_value(&self, key: &str) -> Option<Option<Bytes>> {
        self.writes.iter().rev().find_map(|op| match op {
            TxnOp::Put { key: k, value } if k == key => Some(Some(value.clone())),
            TxnOp::Delete { key: k } if k == key => Some(None),
            TxnOp::DeletePrefix { prefix } if key.starts_with(prefix.as_str()) => Some(None),
            _ => None,
        })
    }

    /// Submit the buffered writes.
    ///
    /// Returns `Ok(Some(revision))` on success and `Ok(None)` when a key read
    /// by this transaction changed in the meantime.
    pub fn commit(self) -> Result<Option<Revision>, LLError> {
        let compare = self
            .reads
            .iter()
            .map(|(key, (_, revision))| Compare::mod_revision(key.clone(), CompareOp::Equal, *revision))
            .collect();
        let resp = self.backend.txn(TxnRequest {
            compare,
            success: self.writes,
            failure: Vec::new(),
        })?;
        Ok(resp.succeeded.then_some(resp.revision))
    }
}

impl KvTxn for Stm<'_> {
    fn get(&mut self, key: &str) -> Result<Option<Bytes>, LLError> {
        if let Some(pending) = self.pending_value(key) {
            return Ok(pending);
        }
        if let Some((value, _)) = self.reads.get(key) {
            return Ok(value.clone());
        }
        let kv = self.backend.get(key)?;
        let (value, revision) = match kv {
            Some(kv) => (Some(kv.value), kv.mod_revision),
            None => (None, 0),
        };
        self.reads
            .insert(key.to_string(), (value.clone(), revision));
        Ok(value)
    }

    fn put(&mut self, key: &str, value: Bytes) -> Result<(), LLError> {
        tracing::trace!(key, "stm buffered put");
        self.writes.push(TxnOp::put(key, value));
        Ok(())
    }

    fn delete(&mut self, key: &str) -> Result<(), LLError> {
        self.writes.push(TxnOp::delete(key));
        Ok(())
    }

    fn delete_prefix(&mut self, prefix: &str) -> Result<(), LLError> {
        self.writes.push(TxnOp::delete_prefix(prefix));
        Ok(())
    }
}

/// Run `apply` inside an [`Stm`], retrying from scratch on conflict.
///
/// `max_attempts` of `None` retries until the transaction commits; with
/// `Some(n)` the n-th conflict fails with [`LLError::Conflict`]. Errors
/// returned by `apply` abort without writing anything.
pub fn run_stm<E, F>(
    backend: &dyn KvBackend,
    max_attempts: Option<u32>,
    mut apply: F,
) -> Result<Revision, E>
where
    E: From<LLError>,
    F: FnMut(&mut Stm<'_>) -> Result<(), E>,
{
    let mut attempts = 0u32;
    loop {
        attempts = attempts.saturating_add(1);
        let mut stm = Stm::new(backend);
        apply(&mut stm)?;
        if let Some(revision) = stm.commit()? {
            tracing::trace!(attempts, revision, "stm committed");
            return Ok(revision);
        }
        tracing::warn!(attempts, "stm conflict, retrying");
        if max_attempts.is_some_and(|max| attempts >= max) {
            return Err(LLError::Conflict { attempts }.into());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{KeyValue, RangeRequest, RangeResponse, TxnResponse};
    use std::sync::Mutex;

    /// Records submitted transactions; fails the first `conflicts` guarded ones.
    struct ScriptedBackend {
        value: Option<Bytes>,
        conflicts: Mutex<u32>,
        committed: Mutex<Vec<TxnRequest>>,
    }

    impl ScriptedBackend {
        fn new(value: Option<&'static str>, conflicts: u32) -> Self {
            Self {
                value: value.map(|s| Bytes::from_static(s.as_bytes())),
                conflicts: Mutex::new(conflicts),
                committed: Mutex::new(Vec::new()),
            }
        }
    }

    impl KvBackend for ScriptedBackend {
        fn range(&self, req: &RangeRequest) -> Result<RangeResponse, LLError> {
            let kvs = self
                .value
                .iter()
                .map(|v| KeyValue {
                    key: req.key.clone(),
                    value: v.clone(),
                    create_revision: 1,
                    mod_revision: 1,
                    version: 1,
                })
                .collect::<Vec<_>>();
            Ok(RangeResponse {
                count: kvs.len(),
                kvs,
                revision: 1,
            })
        }

        fn put(&self, _key: &str, _value: Bytes) -> Result<Revision, LLError> {
            Ok(2)
        }

        fn txn(&self, req: TxnRequest) -> Result<TxnResponse, LLError> {
            let mut conflicts = self.conflicts.lock().unwrap();
            if !req.compare.is_empty() && *conflicts > 0 {
                *conflicts -= 1;
                return Ok(TxnResponse {
                    succeeded: false,
                    revision: 1,
                });
            }
            self.committed.lock().unwrap().push(req);
            Ok(TxnResponse {
                succeeded: true,
                revision: 5,
            })
        }

        fn current_revision(&self) -> Result<Revision, LLError> {
            Ok(1)
        }
    }

    #[test]
    fn stm_reads_its_own_writes() {
        let backend = ScriptedBackend::new(Some("old"), 0);
        let mut stm = Stm::new(&backend);

        assert_eq!(stm.get("/k/").unwrap(), Some(Bytes::from_static(b"old")));
        stm.put("/k/", Bytes::from_static(b"new")).unwrap();
        assert_eq!(stm.get("/k/").unwrap(), Some(Bytes::from_static(b"new")));

        stm.delete_prefix("/").unwrap();
        assert_eq!(stm.get("/k/").unwrap(), None);
        assert_eq!(
            stm.pending(),
            &[
                TxnOp::put("/k/", Bytes::from_static(b"new")),
                TxnOp::delete_prefix("/"),
            ]
        );
        assert!(backend.committed.lock().unwrap().is_empty());
    }

    #[test]
    fn stm_commit_guards_reads() {
        let backend = ScriptedBackend::new(Some("v"), 0);
        let mut stm = Stm::new(&backend);
        stm.get("/k/").unwrap();
        stm.put("/other/", Bytes::from_static(b"x")).unwrap();
        assert_eq!(stm.commit().unwrap(), Some(5));

        let committed = backend.committed.lock().unwrap();
        assert_eq!(
            committed[0].compare,
            vec![Compare::mod_revision("/k/", CompareOp::Equal, 1)]
        );
        assert_eq!(committed[0].success.len(), 1);
    }

    #[test]
    fn run_stm_retries_until_commit() {
        let backend = ScriptedBackend::new(Some("v"), 2);
        let mut runs = 0;
        let revision = run_stm::<LLError, _>(&backend, None, |stm| {
            runs += 1;
            stm.get("/k/")?;
            stm.put("/k/", Bytes::from_static(b"w"))
        })
        .unwrap();
        assert_eq!(revision, 5);
        assert_eq!(runs, 3);
    }

    #[test]
    fn run_stm_gives_up_after_budget() {
        let backend = ScriptedBackend::new(Some("v"), 10);
        let err = run_stm::<LLError, _>(&backend, Some(2), |stm| {
            stm.get("/k/")?;
            Ok(())
        })
        .unwrap_err();
        assert!(matches!(err, LLError::Conflict { attempts: 2 }));
    }

    #[test]
    fn run_stm_error_writes_nothing() {
        let backend = ScriptedBackend::new(None, 0);
        let err = run_stm::<LLError, _>(&backend, None, |stm| {
            stm.put("/k/", Bytes::from_static(b"w"))?;
            Err(LLError::NotSupported)
        })
        .unwrap_err();
        assert!(matches!(err, LLError::NotSupported));
        assert!(backend.committed.lock().unwrap().is_empty());
    }

    #[test]
    fn direct_txn_tracks_last_revision() {
        let backend = ScriptedBackend::new(None, 0);
        let mut txn = DirectTxn::new(&backend);
        assert_eq!(txn.last_revision(), None);
        txn.put("/k/", Bytes::from_static(b"v")).unwrap();
        assert_eq!(txn.last_revision(), Some(2));
        txn.delete("/k/").unwrap();
        assert_eq!(txn.last_revision(), Some(5));
    }
}
