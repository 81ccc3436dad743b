//! Named snapshots.
//!
//! A tag binds a name to a store revision, scoped to one top-level node.
//! Bindings are created with a compare-and-swap and never move, so reading
//! "as of a tag" always sees the same data.

use bytes::Bytes;
use structkv_ll_store::{
    Compare, CompareOp, KvBackend, RangeRequest, Revision, SortOrder, SortTarget, TxnOp, TxnRequest,
};

use crate::{path, Error, MetadataLayout};

pub(crate) struct Tags<'a> {
    backend: &'a dyn KvBackend,
    layout: &'a MetadataLayout,
}

impl<'a> Tags<'a> {
    pub fn new(backend: &'a dyn KvBackend, layout: &'a MetadataLayout) -> Self {
        Self { backend, layout }
    }

    /// Bind `name` to `revision` under `root`. The first binding wins.
    pub fn create(&self, root: &str, name: &str, revision: Revision) -> Result<(), Error> {
        check_name(name)?;
        let key = self.layout.tag_key(root, name);
        let resp = self.backend.txn(TxnRequest {
            compare: vec![Compare::create_revision(key.clone(), CompareOp::Equal, 0)],
            success: vec![TxnOp::put(key, Bytes::from(revision.to_string()))],
            failure: Vec::new(),
        })?;
        if !resp.succeeded {
            return Err(Error::TagExists {
                root: root.to_string(),
                name: name.to_string(),
            });
        }
        tracing::debug!(root, tag = name, revision, "tag created");
        Ok(())
    }

    /// Fails unless `name` is a valid, still unbound tag under `root`.
    pub fn ensure_free(&self, root: &str, name: &str) -> Result<(), Error> {
        check_name(name)?;
        if self.backend.get(&self.layout.tag_key(root, name))?.is_some() {
            return Err(Error::TagExists {
                root: root.to_string(),
                name: name.to_string(),
            });
        }
        Ok(())
    }

    pub fn resolve(&self, root: &str, name: &str) -> Result<Revision, Error> {
        check_name(name)?;
        let key = self.layout.tag_key(root, name);
        let kv = self.backend.get(&key)?.ok_or_else(|| Error::TagNotFound {
            root: root.to_string(),
            name: name.to_string(),
        })?;
        kv.value_str()
            .and_then(|s| s.parse().ok())
            .ok_or(Error::Metadata {
                key,
                message: "tag does not hold a revision".to_string(),
            })
    }

    /// Tag names under `root` in creation order, as of `revision`.
    pub fn list(&self, root: &str, revision: Option<Revision>) -> Result<Vec<String>, Error> {
        let dir = self.layout.tags_dir(root);
        let req = RangeRequest::prefix(dir.clone())
            .keys_only()
            .sort_by(SortTarget::CreateRevision, SortOrder::Ascend)
            .at_revision(revision);
        Ok(self
            .backend
            .range(&req)?
            .kvs
            .iter()
            .filter_map(|kv| kv.key.get(dir.len()..))
            .filter_map(|rest| path::branches(rest).first().map(|s| s.to_string()))
            .collect())
    }
}

fn check_name(name: &str) -> Result<(), Error> {
    if name.is_empty() || name == "." || name == ".." || name.contains(path::SEPARATOR) {
        return Err(Error::invalid_argument(format!(
            "tag name {:?} must be a single path segment",
            name
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use structkv_mem_store::MemoryKv;

    #[test]
    fn create_then_resolve() {
        let kv = MemoryKv::new();
        let layout = MetadataLayout::default();
        let tags = Tags::new(&kv, &layout);

        tags.create("app", "t1", 7).unwrap();
        assert_eq!(tags.resolve("app", "t1").unwrap(), 7);
        assert!(kv.get("/__metadata__/__tags__/app/t1/").unwrap().is_some());
    }

    #[test]
    fn tags_are_never_rebound() {
        let kv = MemoryKv::new();
        let layout = MetadataLayout::default();
        let tags = Tags::new(&kv, &layout);

        tags.ensure_free("app", "t1").unwrap();
        tags.create("app", "t1", 7).unwrap();
        assert!(matches!(
            tags.ensure_free("app", "t1"),
            Err(Error::TagExists { .. })
        ));
        let err = tags.create("app", "t1", 9).unwrap_err();
        assert!(matches!(err, Error::TagExists { .. }));
        assert_eq!(tags.resolve("app", "t1").unwrap(), 7);
    }

    #[test]
    fn tags_are_scoped_to_their_root() {
        let kv = MemoryKv::new();
        let layout = MetadataLayout::default();
        let tags = Tags::new(&kv, &layout);

        tags.create("app", "t1", 7).unwrap();
        let err = tags.resolve("other", "t1").unwrap_err();
        assert!(matches!(err, Error::TagNotFound { .. }));
        tags.create("other", "t1", 8).unwrap();
    }

    #[test]
    fn list_in_creation_order() {
        let kv = MemoryKv::new();
        let layout = MetadataLayout::default();
        let tags = Tags::new(&kv, &layout);

        for name in ["zz", "aa", "mm"] {
            tags.create("app", name, 1).unwrap();
        }
        tags.create("apple", "x", 1).unwrap();
        assert_eq!(tags.list("app", None).unwrap(), vec!["zz", "aa", "mm"]);
        assert_eq!(tags.list("app", Some(1)).unwrap(), vec!["zz"]);
    }

    #[test]
    fn malformed_names_are_rejected() {
        let kv = MemoryKv::new();
        let layout = MetadataLayout::default();
        let tags = Tags::new(&kv, &layout);
        for name in ["", "a/b", ".."] {
            let err = tags.create("app", name, 1).unwrap_err();
            assert!(matches!(err, Error::InvalidArgument { .. }));
        }
    }
}
