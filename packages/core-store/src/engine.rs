//! Applying mutations to the backend.
//!
//! The codec only talks to a [`KvTxn`]; this module decides which one. An
//! unlocked write hands it a [`DirectTxn`] and every key is its own store
//! operation. A locked write or any delete runs inside [`run_stm`], so either
//! the whole mutation lands in one commit or nothing does.

use structkv_ll_store::{run_stm, DirectTxn, KvTxn, Revision};

use crate::codec;
use crate::metadata::MetaStore;
use crate::{path, Config, Error, Kind, Value};

/// How a write reaches the backend.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum WriteMode {
    /// Independent writes. A failure part way leaves earlier writes applied,
    /// and concurrent writers may interleave.
    #[default]
    Unlocked,
    /// One optimistic transaction, retried on conflict.
    Locked,
}

/// Write `value` at `physical` and return the revision of the last write.
pub(crate) fn put(
    meta: &MetaStore<'_>,
    config: &Config,
    physical: &str,
    value: &Value,
    mode: WriteMode,
) -> Result<Revision, Error> {
    let write = |txn: &mut dyn KvTxn| -> Result<(), Error> {
        codec::attach(meta, txn, physical)?;
        codec::encode(meta, txn, physical, value)
    };

    let revision = match mode {
        WriteMode::Unlocked => {
            let mut txn = DirectTxn::new(meta.backend());
            write(&mut txn)?;
            match txn.last_revision() {
                Some(revision) => revision,
                None => meta.backend().current_revision()?,
            }
        }
        WriteMode::Locked => {
            run_stm(meta.backend(), config.txn_attempts, |stm| write(stm))?
        }
    };
    tracing::debug!(path = physical, revision, mode = ?mode, "put");
    Ok(revision)
}

/// Delete the node at `physical` together with its metadata.
///
/// Below the top level the parent's child order and length are updated in
/// the same transaction.
pub(crate) fn delete(meta: &MetaStore<'_>, config: &Config, physical: &str) -> Result<Revision, Error> {
    let depth = path::depth(physical);
    if depth == 0 {
        return Err(Error::invalid_argument("the store root cannot be deleted"));
    }
    let layout = meta.layout();
    let node_meta = layout.node_dir(physical);

    let revision = run_stm(meta.backend(), config.txn_attempts, |stm| {
        if depth > 1 {
            detach(meta, stm, physical)?;
        }
        stm.delete_prefix(physical)?;
        stm.delete_prefix(&node_meta)?;
        Ok::<_, Error>(())
    })?;
    tracing::debug!(path = physical, revision, "delete");
    Ok(revision)
}

/// Remove `physical` from its parent's child order.
fn detach(meta: &MetaStore<'_>, txn: &mut dyn KvTxn, physical: &str) -> Result<(), Error> {
    let parent = path::parent_d(physical, path::depth(physical) - 1);
    let name = path::base(physical).unwrap_or_default();

    match meta.kind(txn, &parent)? {
        Kind::Map | Kind::Sequence => {}
        Kind::Scalar => {
            return Err(Error::unsupported_operation(format!(
                "cannot delete {}: parent {} is a scalar",
                physical, parent
            )))
        }
        Kind::Nil => {
            return Err(Error::unsupported_operation(format!(
                "cannot delete {}: parent {} holds nothing",
                physical, parent
            )))
        }
        Kind::Invalid => {
            return Err(Error::unsupported_operation(format!(
                "cannot delete {}: parent {} has no valid kind",
                physical, parent
            )))
        }
    }

    let len = meta.len(txn, &parent)?;
    if len == 0 {
        return Err(Error::EmptyDir { path: parent });
    }
    if !meta.idx_exists(txn, &parent, name)? {
        return Err(Error::invalid_operation(format!(
            "{} is not a child of {}",
            name, parent
        )));
    }
    meta.delete_idx(txn, &parent, name)?;
    meta.put_len(txn, &parent, len - 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::element_id;
    use bytes::Bytes;
    use structkv_ll_store::{KvBackend, RangeRequest};
    use structkv_mem_store::MemoryKv;

    fn list() -> Value {
        Value::from(vec!["a", "b", "c"])
    }

    fn keys_under(kv: &MemoryKv, prefix: &str) -> Vec<String> {
        kv.range(&RangeRequest::prefix(prefix).keys_only())
            .unwrap()
            .kvs
            .into_iter()
            .map(|kv| kv.key)
            .collect()
    }

    #[test]
    fn locked_put_commits_once() {
        let kv = MemoryKv::new();
        let config = Config::default();
        let meta = MetaStore::new(&kv, &config.metadata);

        let revision = put(&meta, &config, "/l/", &list(), WriteMode::Locked).unwrap();
        assert_eq!(revision, 1);
        assert_eq!(kv.current_revision().unwrap(), 1);
    }

    #[test]
    fn unlocked_put_writes_each_key() {
        let kv = MemoryKv::new();
        let config = Config::default();
        let meta = MetaStore::new(&kv, &config.metadata);

        let revision = put(&meta, &config, "/l/", &list(), WriteMode::Unlocked).unwrap();
        assert!(revision > 1);
        assert_eq!(revision, kv.current_revision().unwrap());
    }

    #[test]
    fn locked_failure_writes_nothing() {
        let kv = MemoryKv::new();
        let config = Config::default();
        let meta = MetaStore::new(&kv, &config.metadata);

        let bad: Value = [("ok", Value::from(1i64)), ("z", Value::Null)]
            .into_iter()
            .collect();
        let err = put(&meta, &config, "/l/", &bad, WriteMode::Locked).unwrap_err();
        assert!(matches!(err, Error::UnsupportedType { .. }));
        assert_eq!(kv.current_revision().unwrap(), 0);
    }

    #[test]
    fn unlocked_failure_keeps_earlier_writes() {
        let kv = MemoryKv::new();
        let config = Config::default();
        let meta = MetaStore::new(&kv, &config.metadata);

        let bad: Value = [("ok", Value::from(1i64)), ("z", Value::Null)]
            .into_iter()
            .collect();
        put(&meta, &config, "/l/", &bad, WriteMode::Unlocked).unwrap_err();
        assert_eq!(keys_under(&kv, "/l/"), vec!["/l/ok/"]);
    }

    #[test]
    fn delete_sequence_element_updates_parent() {
        let kv = MemoryKv::new();
        let config = Config::default();
        let meta = MetaStore::new(&kv, &config.metadata);
        put(&meta, &config, "/l/", &list(), WriteMode::Locked).unwrap();

        let before = kv.current_revision().unwrap();
        let middle = format!("/l/{}/", element_id(2));
        let revision = delete(&meta, &config, &middle).unwrap();
        assert_eq!(revision, before + 1);

        assert_eq!(meta.len_at("/l/", None).unwrap(), 2);
        assert_eq!(
            meta.child_order("/l/", None, None).unwrap(),
            vec![element_id(1), element_id(3)]
        );
        assert!(kv.get(&middle).unwrap().is_none());
    }

    #[test]
    fn delete_top_level_removes_data_and_metadata() {
        let kv = MemoryKv::new();
        let config = Config::default();
        let meta = MetaStore::new(&kv, &config.metadata);
        put(&meta, &config, "/l/", &list(), WriteMode::Locked).unwrap();
        put(&meta, &config, "/keep/", &Value::from("x"), WriteMode::Locked).unwrap();

        delete(&meta, &config, "/l/").unwrap();
        assert!(keys_under(&kv, "/l/").is_empty());
        assert!(keys_under(&kv, &config.metadata.node_dir("/l/")).is_empty());
        assert_eq!(keys_under(&kv, "/keep/"), vec!["/keep/"]);
    }

    #[test]
    fn delete_root_is_rejected() {
        let kv = MemoryKv::new();
        let config = Config::default();
        let meta = MetaStore::new(&kv, &config.metadata);
        let err = delete(&meta, &config, "/").unwrap_err();
        assert!(matches!(err, Error::InvalidArgument { .. }));
    }

    #[test]
    fn delete_under_scalar_or_nil_is_unsupported() {
        let kv = MemoryKv::new();
        let config = Config::default();
        let meta = MetaStore::new(&kv, &config.metadata);
        kv.put("/s/", Bytes::from_static(b"1")).unwrap();

        let scalar = delete(&meta, &config, "/s/x/").unwrap_err();
        let nil = delete(&meta, &config, "/n/x/").unwrap_err();
        assert!(matches!(scalar, Error::UnsupportedOperation { .. }));
        assert!(matches!(nil, Error::UnsupportedOperation { .. }));
        assert_ne!(scalar.to_string(), nil.to_string());
    }

    #[test]
    fn delete_from_empty_container() {
        let kv = MemoryKv::new();
        let config = Config::default();
        let meta = MetaStore::new(&kv, &config.metadata);
        put(&meta, &config, "/m/", &Value::map(), WriteMode::Locked).unwrap();

        let err = delete(&meta, &config, "/m/x/").unwrap_err();
        assert!(matches!(err, Error::EmptyDir { .. }));
    }

    #[test]
    fn delete_missing_child() {
        let kv = MemoryKv::new();
        let config = Config::default();
        let meta = MetaStore::new(&kv, &config.metadata);
        let value: Value = [("a", 1i64)].into_iter().collect();
        put(&meta, &config, "/m/", &value, WriteMode::Locked).unwrap();

        let err = delete(&meta, &config, "/m/b/").unwrap_err();
        assert!(matches!(err, Error::InvalidOperation { .. }));
        assert_eq!(meta.len_at("/m/", None).unwrap(), 1);
    }
}
