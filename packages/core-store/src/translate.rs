//! Logical to physical path translation.
//!
//! A logical path may address sequence elements by position. Positions move
//! when elements are deleted, so they are resolved against the parent's
//! child order at the time of translation and replaced by the element's
//! stable id. Everything else (map keys, top-level names, segments under
//! scalars) is used literally.

use crate::metadata::MetaStore;
use crate::{path, Error, Kind};

/// Physical path of `target`, starting from a known `(physical, logical)` pair.
///
/// `target` must be clean and absolute. Translation reads the latest revision.
pub(crate) fn translate(
    meta: &MetaStore<'_>,
    physical: &str,
    logical: &str,
    target: &str,
) -> Result<String, Error> {
    // Ancestors never need id resolution.
    if path::is_ancestor(target, logical) {
        let resolved = path::parent_d(physical, path::depth(target));
        tracing::debug!(to = target, path = %resolved, "translate to ancestor");
        return Ok(resolved);
    }

    if path::is_ancestor(logical, target) {
        return descend(meta, physical, logical, target);
    }

    let common = path::common_parent(logical, target);
    if common.is_empty() {
        return Err(Error::Internal {
            message: format!("no common ancestor between {} and {}", logical, target),
        });
    }
    let climbed = path::parent_d(physical, path::depth(&common));
    tracing::debug!(from = logical, to = target, via = %common, "translate through common ancestor");
    descend(meta, &climbed, &common, target)
}

fn descend(
    meta: &MetaStore<'_>,
    physical: &str,
    logical: &str,
    target: &str,
) -> Result<String, Error> {
    let (mut physical, mut start) = (physical.to_string(), path::depth(logical));

    // Top-level names are never positions.
    if path::is_root(logical) {
        physical = path::parent_d(target, 1);
        start = 1;
    }

    let segments = path::branches(target);
    for segment in segments.iter().copied().skip(start) {
        let stored = match segment.parse::<u64>() {
            Ok(position) if meta.kind_at(&physical, None)? == Kind::Sequence => {
                meta.child_at(&physical, position)?
            }
            _ => segment.to_string(),
        };
        physical = path::join(&[physical.as_str(), stored.as_str()]);
    }

    tracing::debug!(to = target, path = %physical, "translated");
    Ok(physical)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::element_id;
    use crate::MetadataLayout;
    use bytes::Bytes;
    use structkv_ll_store::{DirectTxn, KvBackend};
    use structkv_mem_store::MemoryKv;

    /// `/app/` is a map with a `list` sequence of elements 1, 3, 4, each a map.
    fn fixture() -> (MemoryKv, MetadataLayout) {
        let kv = MemoryKv::new();
        let layout = MetadataLayout::default();
        {
            let meta = MetaStore::new(&kv, &layout);
            let mut txn = DirectTxn::new(&kv);
            meta.put_kind(&mut txn, "/app/", Kind::Map).unwrap();
            meta.put_idx(&mut txn, "/app/", "list").unwrap();
            meta.put_kind(&mut txn, "/app/list/", Kind::Sequence).unwrap();
            for id in [1, 3, 4] {
                let elem = format!("/app/list/{}/", element_id(id));
                meta.put_idx(&mut txn, "/app/list/", &element_id(id)).unwrap();
                meta.put_kind(&mut txn, &elem, Kind::Map).unwrap();
                kv.put(&format!("{}name/", elem), Bytes::from(format!("e{}", id)))
                    .unwrap();
            }
            meta.put_len(&mut txn, "/app/list/", 3).unwrap();
        }
        (kv, layout)
    }

    #[test]
    fn descendant_positions_become_ids() {
        let (kv, layout) = fixture();
        let meta = MetaStore::new(&kv, &layout);

        let p = translate(&meta, "/", "/", "/app/list/1/").unwrap();
        assert_eq!(p, format!("/app/list/{}/", element_id(3)));

        let p = translate(&meta, "/", "/", "/app/list/2/name/").unwrap();
        assert_eq!(p, format!("/app/list/{}/name/", element_id(4)));
    }

    #[test]
    fn numeric_segment_under_map_is_literal() {
        let (kv, layout) = fixture();
        let meta = MetaStore::new(&kv, &layout);
        let p = translate(&meta, "/app/", "/app/", "/app/7/").unwrap();
        assert_eq!(p, "/app/7/");
    }

    #[test]
    fn top_level_segment_is_literal() {
        let (kv, layout) = fixture();
        let meta = MetaStore::new(&kv, &layout);
        let p = translate(&meta, "/", "/", "/0/list/").unwrap();
        assert_eq!(p, "/0/list/");
    }

    #[test]
    fn ancestor_keeps_resolved_prefix() {
        let (kv, layout) = fixture();
        let meta = MetaStore::new(&kv, &layout);
        let current = format!("/app/list/{}/name/", element_id(3));
        let p = translate(&meta, &current, "/app/list/1/name/", "/app/list/1/").unwrap();
        assert_eq!(p, format!("/app/list/{}/", element_id(3)));

        let p = translate(&meta, &current, "/app/list/1/name/", "/").unwrap();
        assert_eq!(p, "/");
    }

    #[test]
    fn divergent_climbs_to_common_ancestor() {
        let (kv, layout) = fixture();
        let meta = MetaStore::new(&kv, &layout);
        let current = format!("/app/list/{}/", element_id(1));
        let p = translate(&meta, &current, "/app/list/0/", "/app/list/2/name/").unwrap();
        assert_eq!(p, format!("/app/list/{}/name/", element_id(4)));
    }

    #[test]
    fn divergent_across_roots() {
        let (kv, layout) = fixture();
        let meta = MetaStore::new(&kv, &layout);
        let current = format!("/app/list/{}/", element_id(1));
        let p = translate(&meta, &current, "/app/list/0/", "/other/0/").unwrap();
        assert_eq!(p, "/other/0/");
    }

    #[test]
    fn position_past_length_is_out_of_range() {
        let (kv, layout) = fixture();
        let meta = MetaStore::new(&kv, &layout);
        let err = translate(&meta, "/", "/", "/app/list/3/").unwrap_err();
        assert!(matches!(err, Error::IndexOutOfRange { index: 3, len: 3, .. }));
    }
}
