//! LL structkv: the backing-store contract.
//!
//! This is the narrow waist of the structkv stack. Everything at this level is
//! flat keys and opaque bytes - no path semantics, no value trees, no
//! metadata. The upper layers only ever talk to a store through these types:
//!
//! - [`KvBackend`]: linearizable range reads (optionally at a past revision),
//!   single-key puts, and atomic compare-then-write transactions.
//! - [`KvTxn`]: scoped get/put used by multi-key mutations, implemented by
//!   [`DirectTxn`] (unlocked) and [`Stm`] (optimistic, retried by [`run_stm`]).
//!
//! # Example
//!
//! ```rust
//! use structkv_ll_store::{KvBackend, LLError, RangeRequest, SortOrder, SortTarget};
//!
//! fn children_in_write_order(
//!     store: &dyn KvBackend,
//!     dir: &str,
//! ) -> Result<Vec<String>, LLError> {
//!     let req = RangeRequest::prefix(dir)
//!         .keys_only()
//!         .sort_by(SortTarget::ModRevision, SortOrder::Ascend);
//!     Ok(store.range(&req)?.kvs.into_iter().map(|kv| kv.key).collect())
//! }
//! ```

pub use bytes::Bytes;

mod error;
mod traits;
mod txn;

pub use error::LLError;
pub use traits::{
    Compare, CompareOp, CompareTarget, KeyValue, KvBackend, RangeRequest, RangeResponse,
    Revision, SortOrder, SortTarget, TxnOp, TxnRequest, TxnResponse,
};
pub use txn::{run_stm, DirectTxn, KvTxn, Stm};
