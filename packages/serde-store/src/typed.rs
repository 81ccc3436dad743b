//! Typed get and put on nodes.

use serde::de::DeserializeOwned;
use serde::Serialize;
use structkv_core_store::{Node, Options, Revision};

use crate::convert::{to_value, value_to_json};
use crate::Error;

/// Extension trait for typed node access.
///
/// Implemented for [`Node`]. Writes serialize through [`to_value`], reads
/// decode the node and deserialize the resulting tree.
///
/// ```rust
/// use serde::{Deserialize, Serialize};
/// use structkv_core_store::{Options, TreeStore};
/// use structkv_mem_store::MemoryKv;
/// use structkv_serde_store::TypedNode;
///
/// #[derive(Debug, PartialEq, Serialize, Deserialize)]
/// struct Limits {
///     max_conns: u32,
///     burst: bool,
/// }
///
/// let store = TreeStore::with_defaults(MemoryKv::new());
/// let node = store.node("/limits").unwrap();
/// let limits = Limits { max_conns: 64, burst: false };
/// node.put_as(&limits, &Options::new()).unwrap();
/// assert_eq!(node.get_as::<Limits>(&Options::new()).unwrap(), limits);
/// ```
pub trait TypedNode {
    /// Serialize `data` and write it to this node.
    fn put_as<T: Serialize>(&self, data: &T, opts: &Options) -> Result<Revision, Error>;

    /// Read this node and deserialize it into `T`.
    fn get_as<T: DeserializeOwned>(&self, opts: &Options) -> Result<T, Error>;
}

impl TypedNode for Node {
    fn put_as<T: Serialize>(&self, data: &T, opts: &Options) -> Result<Revision, Error> {
        let value = to_value(data)?;
        Ok(self.put(&value, opts)?)
    }

    fn get_as<T: DeserializeOwned>(&self, opts: &Options) -> Result<T, Error> {
        let value = self.get(opts)?;
        serde_json::from_value(value_to_json(value)).map_err(|source| Error::Deserialize {
            path: self.logical().to_string(),
            source,
        })
    }
}
