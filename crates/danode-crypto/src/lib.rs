//! Cryptographic primitives for the danode operator.
//!
//! Provides domain-separated BLAKE3 hashing of batch headers and the Ed25519
//! key pair an operator signs accepted batches with.
//!
//! All crypto operations wrap established libraries -- no custom cryptography.

pub mod hasher;
pub mod signer;

pub use hasher::{batch_header_hash, ContentHasher};
pub use signer::{KeyError, KeyPair, Signature, SignatureError, VerifyingKey};
