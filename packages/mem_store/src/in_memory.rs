//! In-memory MVCC backend.
//!
//! Keeps the full version history of every key so reads can be served as of
//! any past revision.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use structkv_ll_store::{
    Bytes, Compare, CompareTarget, KeyValue, KvBackend, LLError, RangeRequest, RangeResponse,
    Revision, SortOrder, SortTarget, TxnOp, TxnRequest, TxnResponse,
};

/// One write to a key. `value == None` is a deletion marker.
#[derive(Clone, Debug)]
struct Version {
    mod_revision: Revision,
    /// Position of the write inside its transaction.
    sub: u32,
    create_revision: Revision,
    version: i64,
    value: Option<Bytes>,
}

#[derive(Debug, Default)]
struct State {
    revision: Revision,
    keys: BTreeMap<String, Vec<Version>>,
}

impl State {
    /// Latest version of `key` visible at `revision`, deletions included.
    fn version_at(&self, key: &str, revision: Revision) -> Option<&Version> {
        self.keys
            .get(key)?
            .iter()
            .rev()
            .find(|v| v.mod_revision <= revision)
    }

    /// Latest live version of `key`.
    fn live(&self, key: &str) -> Option<&Version> {
        self.version_at(key, self.revision)
            .filter(|v| v.value.is_some())
    }

    fn compare_holds(&self, compare: &Compare) -> bool {
        let live = self.live(&compare.key);
        match &compare.target {
            CompareTarget::Value(expected) => {
                let empty = Bytes::new();
                let actual = live.and_then(|v| v.value.as_ref()).unwrap_or(&empty);
                compare.holds(actual, expected)
            }
            CompareTarget::ModRevision(expected) => {
                compare.holds(&live.map_or(0, |v| v.mod_revision), expected)
            }
            CompareTarget::CreateRevision(expected) => {
                compare.holds(&live.map_or(0, |v| v.create_revision), expected)
            }
            CompareTarget::Version(expected) => {
                compare.holds(&live.map_or(0, |v| v.version), expected)
            }
        }
    }

    fn put_at(&mut self, key: &str, value: Bytes, revision: Revision, sub: u32) {
        let (create_revision, version) = match self.live(key) {
            Some(prev) => (prev.create_revision, prev.version + 1),
            None => (revision, 1),
        };
        self.keys.entry(key.to_string()).or_default().push(Version {
            mod_revision: revision,
            sub,
            create_revision,
            version,
            value: Some(value),
        });
    }

    fn delete_at(&mut self, key: &str, revision: Revision, sub: u32) -> bool {
        if self.live(key).is_none() {
            return false;
        }
        if let Some(history) = self.keys.get_mut(key) {
            history.push(Version {
                mod_revision: revision,
                sub,
                create_revision: 0,
                version: 0,
                value: None,
            });
        }
        true
    }

    /// Apply `ops` atomically at the next revision.
    fn apply(&mut self, ops: Vec<TxnOp>) -> Revision {
        if ops.is_empty() {
            return self.revision;
        }
        let revision = self.revision + 1;
        // Writes must see each other, so the visible revision moves first.
        self.revision = revision;
        let mut sub = 0u32;
        for op in ops {
            match op {
                TxnOp::Put { key, value } => {
                    self.put_at(&key, value, revision, sub);
                    sub += 1;
                }
                TxnOp::Delete { key } => {
                    if self.delete_at(&key, revision, sub) {
                        sub += 1;
                    }
                }
                TxnOp::DeletePrefix { prefix } => {
                    let doomed: Vec<String> = self
                        .keys
                        .range(prefix.clone()..)
                        .take_while(|(k, _)| k.starts_with(&prefix))
                        .map(|(k, _)| k.clone())
                        .collect();
                    for key in doomed {
                        if self.delete_at(&key, revision, sub) {
                            sub += 1;
                        }
                    }
                }
            }
        }
        revision
    }
}

/// An in-memory, MVCC-versioned key-value store.
///
/// Every successful write advances the store revision by one; all writes of
/// one transaction share a revision. History is never compacted.
///
/// # Example
///
/// ```rust
/// use structkv_ll_store::{Bytes, KvBackend, RangeRequest};
/// use structkv_mem_store::MemoryKv;
///
/// let store = MemoryKv::new();
/// let first = store.put("/name/", Bytes::from_static(b"Alice")).unwrap();
/// store.put("/name/", Bytes::from_static(b"Bob")).unwrap();
///
/// let old = store
///     .range(&RangeRequest::key("/name/").at_revision(Some(first)))
///     .unwrap();
/// assert_eq!(old.kvs[0].value, Bytes::from_static(b"Alice"));
/// ```
#[derive(Debug, Default)]
pub struct MemoryKv {
    state: Mutex<State>,
}

impl MemoryKv {
    /// Create a new empty store at revision 0.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>, LLError> {
        self.state.lock().map_err(|_| LLError::Unavailable {
            message: "in-memory store lock poisoned".to_string(),
        })
    }
}

impl KvBackend for MemoryKv {
    fn range(&self, req: &RangeRequest) -> Result<RangeResponse, LLError> {
        let state = self.lock()?;
        let revision = match req.revision {
            Some(rev) if rev > state.revision => {
                return Err(LLError::FutureRevision {
                    requested: rev,
                    current: state.revision,
                })
            }
            Some(rev) if rev > 0 => rev,
            _ => state.revision,
        };

        let mut found: Vec<(KeyValue, u32)> = state
            .keys
            .range(req.key.clone()..)
            .take_while(|(k, _)| req.matches(k))
            .filter_map(|(k, _)| {
                let v = state.version_at(k, revision)?;
                let value = v.value.as_ref()?;
                let kv = KeyValue {
                    key: k.clone(),
                    value: if req.keys_only {
                        Bytes::new()
                    } else {
                        value.clone()
                    },
                    create_revision: v.create_revision,
                    mod_revision: v.mod_revision,
                    version: v.version,
                };
                Some((kv, v.sub))
            })
            .collect();

        if let Some((target, order)) = req.sort {
            match target {
                SortTarget::Key => {}
                SortTarget::ModRevision => {
                    found.sort_by_key(|(kv, sub)| (kv.mod_revision, *sub));
                }
                SortTarget::CreateRevision => {
                    found.sort_by_key(|(kv, _)| kv.create_revision);
                }
            }
            if order == SortOrder::Descend {
                found.reverse();
            }
        }

        let count = found.len();
        if req.count_only {
            found.clear();
        } else if req.limit > 0 {
            found.truncate(req.limit);
        }

        Ok(RangeResponse {
            kvs: found.into_iter().map(|(kv, _)| kv).collect(),
            count,
            revision,
        })
    }

    fn put(&self, key: &str, value: Bytes) -> Result<Revision, LLError> {
        let mut state = self.lock()?;
        let revision = state.apply(vec![TxnOp::put(key, value)]);
        tracing::trace!(key, revision, "put");
        Ok(revision)
    }

    fn txn(&self, req: TxnRequest) -> Result<TxnResponse, LLError> {
        let mut state = self.lock()?;
        let succeeded = req.compare.iter().all(|c| state.compare_holds(c));
        let ops = if succeeded { req.success } else { req.failure };
        let revision = state.apply(ops);
        tracing::trace!(succeeded, revision, "txn");
        Ok(TxnResponse {
            succeeded,
            revision,
        })
    }

    fn current_revision(&self) -> Result<Revision, LLError> {
        Ok(self.lock()?.revision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use structkv_ll_store::CompareOp;

    fn b(s: &'static str) -> Bytes {
        Bytes::from_static(s.as_bytes())
    }

    fn keys(resp: &RangeResponse) -> Vec<&str> {
        resp.kvs.iter().map(|kv| kv.key.as_str()).collect()
    }

    #[test]
    fn basic_put_get() {
        let store = MemoryKv::new();
        assert_eq!(store.put("/foo/", b("bar")).unwrap(), 1);

        let kv = store.get("/foo/").unwrap().unwrap();
        assert_eq!(kv.value, b("bar"));
        assert_eq!(kv.create_revision, 1);
        assert_eq!(kv.mod_revision, 1);
        assert_eq!(kv.version, 1);
    }

    #[test]
    fn read_nonexistent_returns_none() {
        let store = MemoryKv::new();
        assert!(store.get("/nonexistent/").unwrap().is_none());
    }

    #[test]
    fn overwrite_keeps_create_revision() {
        let store = MemoryKv::new();
        store.put("/value/", b("first")).unwrap();
        store.put("/value/", b("second")).unwrap();

        let kv = store.get("/value/").unwrap().unwrap();
        assert_eq!(kv.value, b("second"));
        assert_eq!(kv.create_revision, 1);
        assert_eq!(kv.mod_revision, 2);
        assert_eq!(kv.version, 2);
    }

    #[test]
    fn prefix_range_is_sorted_by_key() {
        let store = MemoryKv::new();
        store.put("/a/c/", b("3")).unwrap();
        store.put("/a/b/", b("2")).unwrap();
        store.put("/ab/", b("x")).unwrap();
        store.put("/a/", b("1")).unwrap();

        let resp = store.range(&RangeRequest::prefix("/a/")).unwrap();
        assert_eq!(keys(&resp), vec!["/a/", "/a/b/", "/a/c/"]);
        assert_eq!(resp.count, 3);
    }

    #[test]
    fn sort_by_mod_revision_follows_write_order() {
        let store = MemoryKv::new();
        store.put("/d/z/", b("")).unwrap();
        store.put("/d/a/", b("")).unwrap();
        store
            .txn(TxnRequest::batch(vec![
                TxnOp::put("/d/q/", b("")),
                TxnOp::put("/d/b/", b("")),
            ]))
            .unwrap();

        let resp = store
            .range(
                &RangeRequest::prefix("/d/")
                    .keys_only()
                    .sort_by(SortTarget::ModRevision, SortOrder::Ascend),
            )
            .unwrap();
        assert_eq!(keys(&resp), vec!["/d/z/", "/d/a/", "/d/q/", "/d/b/"]);
        assert!(resp.kvs.iter().all(|kv| kv.value.is_empty()));
    }

    #[test]
    fn limit_applies_after_sort() {
        let store = MemoryKv::new();
        store.put("/d/b/", b("")).unwrap();
        store.put("/d/a/", b("")).unwrap();

        let resp = store
            .range(
                &RangeRequest::prefix("/d/")
                    .limit(1)
                    .sort_by(SortTarget::ModRevision, SortOrder::Ascend),
            )
            .unwrap();
        assert_eq!(keys(&resp), vec!["/d/b/"]);
        assert_eq!(resp.count, 2);
    }

    #[test]
    fn historical_reads_see_old_state() {
        let store = MemoryKv::new();
        let r1 = store.put("/k/", b("v1")).unwrap();
        store.put("/k/", b("v2")).unwrap();
        store
            .txn(TxnRequest::batch(vec![TxnOp::delete("/k/")]))
            .unwrap();

        assert!(store.get("/k/").unwrap().is_none());
        let old = store
            .range(&RangeRequest::key("/k/").at_revision(Some(r1)))
            .unwrap();
        assert_eq!(old.kvs[0].value, b("v1"));
    }

    #[test]
    fn future_revision_rejected() {
        let store = MemoryKv::new();
        store.put("/k/", b("v")).unwrap();
        let err = store
            .range(&RangeRequest::key("/k/").at_revision(Some(10)))
            .unwrap_err();
        assert!(matches!(err, LLError::FutureRevision { requested: 10, current: 1 }));
    }

    #[test]
    fn delete_prefix_removes_subtree_only() {
        let store = MemoryKv::new();
        store.put("/a/b/", b("1")).unwrap();
        store.put("/a/b/c/", b("2")).unwrap();
        store.put("/a/bc/", b("3")).unwrap();

        let resp = store
            .txn(TxnRequest::batch(vec![TxnOp::delete_prefix("/a/b/")]))
            .unwrap();
        assert!(resp.succeeded);
        assert_eq!(resp.revision, 4);

        let left = store.range(&RangeRequest::prefix("/a/")).unwrap();
        assert_eq!(keys(&left), vec!["/a/bc/"]);
    }

    #[test]
    fn txn_compare_failure_runs_failure_branch() {
        let store = MemoryKv::new();
        store.put("/tag/", b("7")).unwrap();

        let resp = store
            .txn(TxnRequest {
                compare: vec![Compare::create_revision("/tag/", CompareOp::Equal, 0)],
                success: vec![TxnOp::put("/tag/", b("9"))],
                failure: vec![],
            })
            .unwrap();
        assert!(!resp.succeeded);
        assert_eq!(resp.revision, 1);
        assert_eq!(store.get("/tag/").unwrap().unwrap().value, b("7"));
    }

    #[test]
    fn absent_keys_compare_as_zero() {
        let store = MemoryKv::new();
        let resp = store
            .txn(TxnRequest {
                compare: vec![
                    Compare::mod_revision("/none/", CompareOp::Equal, 0),
                    Compare::value("/none/", CompareOp::Equal, Bytes::new()),
                ],
                success: vec![TxnOp::put("/none/", b("now"))],
                failure: vec![],
            })
            .unwrap();
        assert!(resp.succeeded);
        assert_eq!(store.current_revision().unwrap(), 1);
    }

    #[test]
    fn version_compare_counts_writes() {
        let store = MemoryKv::new();
        store.put("/k/", b("a")).unwrap();
        store.put("/k/", b("b")).unwrap();

        let stale = store
            .txn(TxnRequest {
                compare: vec![Compare::version("/k/", CompareOp::Equal, 1)],
                success: vec![TxnOp::put("/k/", b("stale"))],
                failure: vec![],
            })
            .unwrap();
        assert!(!stale.succeeded);

        let fresh = store
            .txn(TxnRequest {
                compare: vec![
                    Compare::version("/k/", CompareOp::Equal, 2),
                    Compare::version("/none/", CompareOp::Equal, 0),
                ],
                success: vec![TxnOp::put("/k/", b("c"))],
                failure: vec![],
            })
            .unwrap();
        assert!(fresh.succeeded);
        assert_eq!(store.get("/k/").unwrap().unwrap().version, 3);
    }

    #[test]
    fn recreated_key_gets_new_create_revision() {
        let store = MemoryKv::new();
        store.put("/k/", b("a")).unwrap();
        store
            .txn(TxnRequest::batch(vec![TxnOp::delete("/k/")]))
            .unwrap();
        store.put("/k/", b("b")).unwrap();

        let kv = store.get("/k/").unwrap().unwrap();
        assert_eq!(kv.create_revision, 3);
        assert_eq!(kv.version, 1);
    }

    #[test]
    fn count_only_returns_no_kvs() {
        let store = MemoryKv::new();
        store.put("/c/1/", b("")).unwrap();
        store.put("/c/2/", b("")).unwrap();
        let resp = store
            .range(&RangeRequest::prefix("/c/").count_only())
            .unwrap();
        assert_eq!(resp.count, 2);
        assert!(resp.kvs.is_empty());
    }
}
