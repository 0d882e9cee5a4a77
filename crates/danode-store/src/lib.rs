//! Chunk storage for the danode operator.
//!
//! A received batch is itemized into its header, one header per blob, and one
//! chunk bundle per (blob, quorum) pair. All items plus an expiration index
//! entry are written as a single atomic batch, keyed by the batch header hash.
//!
//! # Backends
//!
//! [`ChunkStore`] runs on any [`KvBackend`]:
//!
//! - [`MemoryKv`] -- `BTreeMap`-based backend for tests and embedding
//! - [`RocksKv`] -- RocksDB instance; the node's durable store
//!
//! # Rules
//!
//! 1. Storing a batch twice writes nothing the second time and is not an error.
//! 2. A fresh store returns the exact keys it wrote, so the caller can undo it.
//! 3. Expired batches are removed whole, oldest first, within a time budget.

pub mod chunk_store;
pub mod error;
pub mod keys;
pub mod kv;
pub mod memory;
pub mod rocks;

pub use chunk_store::{
    unix_now, ChunkStore, RetentionPolicy, StoreKeySet, StoreOutcome, SweepReport,
    BLOCK_TIME_SECS,
};
pub use error::{StoreError, StoreResult};
pub use kv::{BatchOp, KvBackend, WriteBatch};
pub use memory::MemoryKv;
pub use rocks::{RocksKv, SyncMode};
