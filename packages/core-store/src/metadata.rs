//! Per-node bookkeeping stored beside the data.
//!
//! Map and Sequence nodes record their kind, child count, last element id
//! and one child-order entry per live child under a mirror of their physical
//! path inside the metadata namespace. Writes go through a [`KvTxn`] so the
//! same code serves locked and unlocked mutations; snapshot reads go straight
//! to the backend at a chosen revision.

use bytes::Bytes;
use structkv_ll_store::{KeyValue, KvBackend, KvTxn, RangeRequest, Revision, SortOrder, SortTarget};

use crate::{Error, Kind, MetadataLayout};

/// Physical segment of the `id`-th sequence element.
pub fn element_id(id: u64) -> String {
    format!("{:019}", id)
}

pub(crate) struct MetaStore<'a> {
    backend: &'a dyn KvBackend,
    layout: &'a MetadataLayout,
}

impl<'a> MetaStore<'a> {
    pub fn new(backend: &'a dyn KvBackend, layout: &'a MetadataLayout) -> Self {
        Self { backend, layout }
    }

    pub fn layout(&self) -> &'a MetadataLayout {
        self.layout
    }

    pub fn backend(&self) -> &'a dyn KvBackend {
        self.backend
    }

    // Transaction-scoped access

    /// Kind as seen by a transaction: own value, then the kind field.
    pub fn kind(&self, txn: &mut dyn KvTxn, physical: &str) -> Result<Kind, Error> {
        if txn.get(physical)?.is_some() {
            return Ok(Kind::Scalar);
        }
        Ok(txn
            .get(&self.layout.kind_key(physical))?
            .map(|raw| parse_kind(&raw))
            .unwrap_or(Kind::Nil))
    }

    pub fn put_kind(&self, txn: &mut dyn KvTxn, physical: &str, kind: Kind) -> Result<(), Error> {
        let key = self.layout.kind_key(physical);
        tracing::trace!(key = %key, kind = %kind, "put kind");
        txn.put(&key, Bytes::from_static(kind.as_str().as_bytes()))?;
        Ok(())
    }

    pub fn len(&self, txn: &mut dyn KvTxn, physical: &str) -> Result<u64, Error> {
        let key = self.layout.len_key(physical);
        let raw = txn.get(&key)?;
        parse_counter(&key, raw.as_deref())
    }

    pub fn put_len(&self, txn: &mut dyn KvTxn, physical: &str, len: u64) -> Result<(), Error> {
        let key = self.layout.len_key(physical);
        tracing::trace!(key = %key, len, "put len");
        txn.put(&key, Bytes::from(len.to_string()))?;
        Ok(())
    }

    pub fn last_id(&self, txn: &mut dyn KvTxn, physical: &str) -> Result<u64, Error> {
        let key = self.layout.last_id_key(physical);
        let raw = txn.get(&key)?;
        parse_counter(&key, raw.as_deref())
    }

    pub fn put_last_id(&self, txn: &mut dyn KvTxn, physical: &str, id: u64) -> Result<(), Error> {
        let key = self.layout.last_id_key(physical);
        tracing::trace!(key = %key, id, "put last id");
        txn.put(&key, Bytes::from(id.to_string()))?;
        Ok(())
    }

    pub fn idx_exists(&self, txn: &mut dyn KvTxn, physical: &str, child: &str) -> Result<bool, Error> {
        Ok(txn.get(&self.layout.idx_key(physical, child))?.is_some())
    }

    /// Append `child` to the parent's child order.
    pub fn put_idx(&self, txn: &mut dyn KvTxn, physical: &str, child: &str) -> Result<(), Error> {
        let key = self.layout.idx_key(physical, child);
        tracing::trace!(key = %key, "put child order entry");
        txn.put(&key, Bytes::copy_from_slice(child.as_bytes()))?;
        Ok(())
    }

    pub fn delete_idx(&self, txn: &mut dyn KvTxn, physical: &str, child: &str) -> Result<(), Error> {
        txn.delete(&self.layout.idx_key(physical, child))?;
        Ok(())
    }

    // Snapshot reads

    fn get_at(&self, key: &str, revision: Option<Revision>) -> Result<Option<KeyValue>, Error> {
        let resp = self
            .backend
            .range(&RangeRequest::key(key).at_revision(revision))?;
        Ok(resp.kvs.into_iter().next())
    }

    /// The recorded kind field, if any.
    pub fn kind_field_at(&self, physical: &str, revision: Option<Revision>) -> Result<Option<Kind>, Error> {
        Ok(self
            .get_at(&self.layout.kind_key(physical), revision)?
            .map(|kv| parse_kind(&kv.value)))
    }

    /// Kind of the node as of `revision` (latest when `None`).
    pub fn kind_at(&self, physical: &str, revision: Option<Revision>) -> Result<Kind, Error> {
        let probe = self.backend.range(
            &RangeRequest::prefix(physical)
                .keys_only()
                .limit(1)
                .at_revision(revision),
        )?;
        if probe.kvs.first().is_some_and(|kv| kv.key == physical) {
            return Ok(Kind::Scalar);
        }
        match self.kind_field_at(physical, revision)? {
            Some(kind) => Ok(kind),
            None if probe.kvs.is_empty() => Ok(Kind::Nil),
            None => Ok(Kind::Invalid),
        }
    }

    pub fn len_at(&self, physical: &str, revision: Option<Revision>) -> Result<u64, Error> {
        let key = self.layout.len_key(physical);
        let kv = self.get_at(&key, revision)?;
        parse_counter(&key, kv.as_ref().map(|kv| &kv.value[..]))
    }

    /// Stored names of the live children, in the order they were added.
    pub fn child_order(
        &self,
        physical: &str,
        revision: Option<Revision>,
        limit: Option<usize>,
    ) -> Result<Vec<String>, Error> {
        let mut req = RangeRequest::prefix(self.layout.idxes_dir(physical))
            .sort_by(SortTarget::ModRevision, SortOrder::Ascend)
            .at_revision(revision);
        if let Some(limit) = limit {
            req = req.limit(limit);
        }
        self.backend
            .range(&req)?
            .kvs
            .into_iter()
            .map(|kv| {
                String::from_utf8(kv.value.to_vec()).map_err(|_| Error::Metadata {
                    key: kv.key.clone(),
                    message: "child order entry is not utf-8".to_string(),
                })
            })
            .collect()
    }

    /// Stored name of the child at `position` in the latest child order.
    pub fn child_at(&self, physical: &str, position: u64) -> Result<String, Error> {
        let wanted = usize::try_from(position)
            .ok()
            .and_then(|p| p.checked_add(1));
        let mut order = match wanted {
            Some(limit) => self.child_order(physical, None, Some(limit))?,
            None => Vec::new(),
        };
        if order.len() as u64 > position {
            return Ok(order.swap_remove(position as usize));
        }
        Err(Error::IndexOutOfRange {
            path: physical.to_string(),
            index: position,
            len: self.len_at(physical, None)?,
        })
    }
}

fn parse_kind(raw: &[u8]) -> Kind {
    std::str::from_utf8(raw)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(Kind::Invalid)
}

fn parse_counter(key: &str, raw: Option<&[u8]>) -> Result<u64, Error> {
    let Some(raw) = raw else {
        return Ok(0);
    };
    std::str::from_utf8(raw)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| Error::Metadata {
            key: key.to_string(),
            message: format!("expected a decimal counter, found {:?}", String::from_utf8_lossy(raw)),
        })
}
