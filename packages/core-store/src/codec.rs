//! Tree codec: stored key ranges to values and back.
//!
//! A scalar lives at its node's own key. A map child lives under the child's
//! name and a sequence element under its stable id, so a node's whole subtree
//! is one prefix range and each child's subtree is a contiguous run of it.

use std::collections::BTreeMap;

use bytes::Bytes;
use structkv_ll_store::{KeyValue, KvTxn, Revision};

use crate::metadata::{element_id, MetaStore};
use crate::{path, Error, Kind, Value};

/// Decode the sorted range `kvs` stored under `physical` as of `revision`.
///
/// Maps come back keyed lexicographically and sequences in insertion order.
pub(crate) fn decode(
    meta: &MetaStore<'_>,
    physical: &str,
    kvs: &[KeyValue],
    revision: Option<Revision>,
) -> Result<Value, Error> {
    if let Some(kv) = kvs.first().filter(|kv| kv.key == physical) {
        let text = kv.value_str().ok_or_else(|| Error::UnknownType {
            path: physical.to_string(),
            message: "scalar is not utf-8".to_string(),
        })?;
        return Ok(Value::parse_scalar(text));
    }

    let kind = match meta.kind_field_at(physical, revision)? {
        None if kvs.is_empty() => return Ok(Value::Null),
        Some(kind @ (Kind::Map | Kind::Sequence)) => kind,
        found => {
            return Err(Error::UnknownType {
                path: physical.to_string(),
                message: match found {
                    Some(kind) => format!("stored kind {} cannot hold children", kind),
                    None => "children stored without a kind".to_string(),
                },
            })
        }
    };

    // Walk the recorded child order so children without data keys, such as
    // empty containers, still decode.
    let groups: BTreeMap<&str, &[KeyValue]> = children(physical, kvs).into_iter().collect();
    let mut decoded = Vec::new();
    for name in meta.child_order(physical, revision, None)? {
        let group = groups.get(name.as_str()).copied().unwrap_or_default();
        let child = decode(meta, &path::join(&[physical, name.as_str()]), group, revision)?;
        if group.is_empty() && child.is_null() {
            continue;
        }
        decoded.push((name, child));
    }
    Ok(match kind {
        Kind::Map => Value::Map(decoded.into_iter().collect()),
        _ => Value::Array(decoded.into_iter().map(|(_, child)| child).collect()),
    })
}

/// Split a sorted range into runs sharing the first segment below `physical`.
fn children<'k>(physical: &str, kvs: &'k [KeyValue]) -> Vec<(&'k str, &'k [KeyValue])> {
    let first_segment = |kv: &'k KeyValue| -> &'k str {
        let rest = kv.key.get(physical.len()..).unwrap_or_default();
        rest.split(path::SEPARATOR).next().unwrap_or_default()
    };

    let mut groups = Vec::new();
    let mut start = 0;
    while start < kvs.len() {
        let name = first_segment(&kvs[start]);
        let len = kvs[start..]
            .iter()
            .take_while(|kv| first_segment(kv) == name)
            .count();
        if !name.is_empty() {
            groups.push((name, &kvs[start..start + len]));
        }
        start += len;
    }
    groups
}

/// Make sure every ancestor below the top level records the node as a child.
///
/// Nil and Map parents become Maps and gain the entry. A Sequence parent
/// must already hold the element, since new elements only come from writing
/// the whole sequence.
pub(crate) fn attach(meta: &MetaStore<'_>, txn: &mut dyn KvTxn, physical: &str) -> Result<(), Error> {
    let depth = path::depth(physical);
    if depth < 2 {
        return Ok(());
    }
    let parent = path::parent_d(physical, depth - 1);
    let name = path::base(physical).unwrap_or_default();

    match meta.kind(txn, &parent)? {
        kind @ (Kind::Nil | Kind::Map) => {
            if meta.idx_exists(txn, &parent, name)? {
                return Ok(());
            }
            attach(meta, txn, &parent)?;
            let len = meta.len(txn, &parent)?;
            meta.put_idx(txn, &parent, name)?;
            if kind == Kind::Nil {
                meta.put_kind(txn, &parent, Kind::Map)?;
            }
            meta.put_len(txn, &parent, len + 1)?;
            tracing::debug!(path = %parent, child = name, "attached to parent");
            Ok(())
        }
        Kind::Sequence => {
            if meta.idx_exists(txn, &parent, name)? {
                Ok(())
            } else {
                Err(Error::invalid_operation(format!(
                    "{} is not an element of sequence {}",
                    name, parent
                )))
            }
        }
        Kind::Scalar => Err(Error::KindMismatch {
            path: parent,
            stored: Kind::Scalar,
            writing: Kind::Map,
        }),
        Kind::Invalid => Err(Error::UnknownType {
            path: parent,
            message: "parent kind cannot be determined".to_string(),
        }),
    }
}

/// Write `value` at `physical`, updating the metadata of every container.
pub(crate) fn encode(
    meta: &MetaStore<'_>,
    txn: &mut dyn KvTxn,
    physical: &str,
    value: &Value,
) -> Result<(), Error> {
    let writing = value.stored_kind().ok_or(Error::UnsupportedType {
        type_name: value.type_name(),
    })?;
    let stored = meta.kind(txn, physical)?;
    if !stored.accepts(writing) {
        return Err(Error::KindMismatch {
            path: physical.to_string(),
            stored,
            writing,
        });
    }

    match value {
        Value::Map(map) => {
            let old_len = meta.len(txn, physical)?;
            let mut added = 0;
            for (name, child) in map {
                check_key(meta, name)?;
                if !meta.idx_exists(txn, physical, name)? {
                    meta.put_idx(txn, physical, name)?;
                    added += 1;
                }
                encode(meta, txn, &path::join(&[physical, name.as_str()]), child)?;
            }
            if stored == Kind::Nil {
                meta.put_kind(txn, physical, Kind::Map)?;
            }
            meta.put_len(txn, physical, old_len + added)
        }
        Value::Array(items) => {
            let old_len = meta.len(txn, physical)?;
            let mut last_id = meta.last_id(txn, physical)?;
            for item in items {
                last_id += 1;
                let id = element_id(last_id);
                meta.put_idx(txn, physical, &id)?;
                encode(meta, txn, &path::join(&[physical, id.as_str()]), item)?;
            }
            if stored == Kind::Nil {
                meta.put_kind(txn, physical, Kind::Sequence)?;
            }
            meta.put_len(txn, physical, old_len + items.len() as u64)?;
            meta.put_last_id(txn, physical, last_id)
        }
        scalar => {
            let text = scalar.scalar_text().ok_or(Error::UnsupportedType {
                type_name: scalar.type_name(),
            })?;
            txn.put(physical, Bytes::from(text))?;
            Ok(())
        }
    }
}

fn check_key(meta: &MetaStore<'_>, name: &str) -> Result<(), Error> {
    if name.is_empty() || name == "." || name == ".." || name.contains(path::SEPARATOR) {
        return Err(Error::invalid_argument(format!(
            "map key {:?} is not a single path segment",
            name
        )));
    }
    if meta.layout().is_reserved(name) {
        return Err(Error::invalid_argument(format!(
            "map key {:?} is reserved for metadata",
            name
        )));
    }
    Ok(())
}
