//! structkv: hierarchical values over a flat MVCC key-value store.
//!
//! A tree of maps, sequences and scalars is stored as one key per scalar,
//! plus a metadata namespace that records each container's kind, length and
//! child order. Sequence elements keep stable ids, so deleting an element
//! never renumbers the ones after it. Reads can be pinned to named tags, and
//! string values can reference other nodes with `{{path}}` templates.
//!
//! The crates are layered:
//! - `ll`: the backend contract (flat keys, revisions, transactions)
//! - `mem`: an in-memory backend
//! - core: paths, values, nodes, tags, templates (re-exported at the root)
//! - `serde`: typed access to nodes
//!
//! ```rust
//! use std::ops::ControlFlow;
//! use structkv::{mem::MemoryKv, Options, TreeStore, Value};
//!
//! let store = TreeStore::with_defaults(MemoryKv::new());
//! let queue = store.node("/jobs/queue")?;
//! queue.put(&Value::from(vec!["a", "b", "c"]), &Options::new().lock())?;
//! queue.node("1")?.delete(&Options::new())?;
//!
//! let mut left = Vec::new();
//! queue.for_each(
//!     |_, job| {
//!         left.push(job);
//!         ControlFlow::Continue(())
//!     },
//!     &Options::new(),
//! )?;
//! assert_eq!(left, vec![Value::from("a"), Value::from("c")]);
//! # Ok::<(), structkv::Error>(())
//! ```

pub use structkv_core_store::*;

/// The backend contract.
pub mod ll {
    pub use structkv_ll_store::*;
}

/// The in-memory backend.
pub mod mem {
    pub use structkv_mem_store::*;
}

/// Typed access via serde.
pub mod serde {
    pub use structkv_serde_store::*;
}
