//! Core structkv: tree-shaped values over a flat MVCC key-value store.
//!
//! This layer gives the flat keys of the LL layer a tree structure:
//! - `path`: lexical algebra on directory-style paths
//! - `Value`: the tree that nodes decode into and encode from
//! - `Node`: one addressed node, with get/put/delete/iteration
//! - `Config`: delimiters and metadata layout, held per `TreeStore`
//!
//! Every node stores its data under its physical path. Maps and sequences
//! additionally keep kind, length, last element id and child order in a
//! parallel metadata namespace, which is what lets sequence positions stay
//! meaningful across deletes and lets reads tell a map from a sequence.
//!
//! # Example
//!
//! ```rust
//! use structkv_core_store::{Options, TreeStore, Value};
//! use structkv_mem_store::MemoryKv;
//!
//! let store = TreeStore::with_defaults(MemoryKv::new());
//! let cfg = store.node("/cfg").unwrap();
//! let value: Value = [("port", Value::from(8080i64))].into_iter().collect();
//! cfg.put(&value, &Options::new().lock().tag("v1")).unwrap();
//!
//! let port = cfg.node("port").unwrap().get(&Options::new()).unwrap();
//! assert_eq!(port, Value::Float(8080.0));
//! ```

pub use bytes::Bytes;

mod codec;
mod config;
mod engine;
mod error;
mod kind;
mod location;
pub mod metadata;
mod node;
mod options;
pub mod path;
mod tag;
pub mod template;
mod translate;
mod value;

pub use config::{Config, Delimiters, MetadataLayout};
pub use engine::WriteMode;
pub use error::{Error, ErrorKind};
pub use kind::{Kind, UnknownKind};
pub use location::Location;
pub use node::{Node, TreeStore};
pub use options::Options;
pub use template::{BoxError, CheckHook, EvalOptions, FormatHook, Resolve};
pub use value::Value;

// Re-export LL types for convenience
pub use structkv_ll_store::{KvBackend, LLError, Revision};
