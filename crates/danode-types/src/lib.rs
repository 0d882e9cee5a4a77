//! Foundation types for the danode data-availability operator.
//!
//! Every other danode crate depends on `danode-types`.
//!
//! # Key Types
//!
//! - [`BatchHeader`] / [`BatchHash`] -- a batch and the hash that identifies it
//! - [`BlobMessage`] / [`RawBlob`] -- parsed and wire forms of one blob
//! - [`OperatorId`] / [`OperatorState`] -- operator identity and stake snapshot
//! - [`OperatorSocket`] -- the address an operator advertises on chain

pub mod batch;
pub mod error;
pub mod hash;
pub mod operator;
pub mod socket;

pub use batch::{
    BatchHeader, BlobHeader, BlobMessage, BlobQuorumInfo, Bundle, RawBlob, BYTES_PER_SYMBOL,
};
pub use error::TypeError;
pub use hash::BatchHash;
pub use operator::{OperatorId, OperatorInfo, OperatorState, QuorumId};
pub use socket::OperatorSocket;
