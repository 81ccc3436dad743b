//! In-memory backend for structkv.
//!
//! [`MemoryKv`] implements the full [`structkv_ll_store::KvBackend`] contract
//! (revisions, historical reads, compare-and-swap transactions) without a
//! server. It backs the test suites and embedded use.

pub mod in_memory;

pub use in_memory::MemoryKv;
