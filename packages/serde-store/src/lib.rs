//! Serde integration for structkv.
//!
//! This layer provides typed access to nodes via serde. It adds:
//! - `TypedNode`: read and write nodes as Rust types
//! - Value <-> serde conversions
//!
//! Numbers come back from a node as floats. Whole floats are converted to
//! integers before deserializing, so integer fields round-trip.

mod convert;
mod error;
mod typed;

pub use convert::{from_value, json_to_value, to_value, value_to_json};
pub use error::Error;
pub use typed::TypedNode;

pub use structkv_core_store::{Node, Options, Value};
