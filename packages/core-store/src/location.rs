//! The path triple that addresses one node.

use crate::{path, MetadataLayout};

/// Where a node lives: the path callers use, the key prefix its data is
/// stored under, and the prefix of its metadata.
///
/// The logical path may contain sequence positions; the physical path has
/// them replaced by stable element ids.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Location {
    logical: String,
    physical: String,
    metadata: String,
}

impl Location {
    /// The store root, `/` on both sides.
    pub fn root(layout: &MetadataLayout) -> Self {
        Self::new(path::ROOT, path::ROOT, layout)
    }

    pub fn new(logical: &str, physical: &str, layout: &MetadataLayout) -> Self {
        let physical = path::clean(physical);
        Self {
            logical: path::clean(logical),
            metadata: layout.node_dir(&physical),
            physical,
        }
    }

    /// Location of a direct child addressed by its logical key and stored name.
    pub fn child(&self, logical_key: &str, stored_name: &str, layout: &MetadataLayout) -> Self {
        Self::new(
            &path::join(&[self.logical.as_str(), logical_key]),
            &path::join(&[self.physical.as_str(), stored_name]),
            layout,
        )
    }

    pub fn logical(&self) -> &str {
        &self.logical
    }

    pub fn physical(&self) -> &str {
        &self.physical
    }

    pub fn metadata(&self) -> &str {
        &self.metadata
    }

    /// Name of the top-level node this location belongs to.
    pub fn top_level(&self) -> Option<&str> {
        path::branches(&self.physical).into_iter().next()
    }
}
