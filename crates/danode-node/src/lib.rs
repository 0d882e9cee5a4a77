//! Core of the danode data-availability operator.
//!
//! A [`Node`] accepts batches of blobs, stores this operator's chunks,
//! validates every blob against on-chain stake, and signs the batch header
//! hash once both succeed. Alongside the batch pipeline it runs:
//!
//! - an [`ExpirationSweeper`] deleting batches past their retention window,
//!   each sweep bounded to a tenth of the poll interval
//! - a [`SocketReconciler`] keeping the advertised socket in line with the
//!   chain and with the host's public IP
//!
//! External systems (chain reads, transactions, socket events, public IP,
//! blob validation) are traits in [`collaborators`]; [`local`] provides
//! in-process implementations.

pub mod collaborators;
pub mod config;
pub mod error;
pub mod local;
pub mod metrics;
pub mod node;
pub mod processor;
pub mod shutdown;
pub mod socket;
pub mod sweeper;
pub mod validation;

#[cfg(test)]
mod testing;

pub use collaborators::{ChainState, PublicIpProvider, SocketEventSource, Transactor, Validator};
pub use config::NodeConfig;
pub use error::{NodeError, NodeResult, ValidationError};
pub use local::{LocalChain, StaticIpProvider, StructuralValidator};
pub use metrics::{Metrics, MetricsSnapshot, NodeMetrics, NoopMetrics, Stage, StageSnapshot};
pub use node::{Node, NodeDeps};
pub use processor::BatchProcessor;
pub use shutdown::{BackgroundTasks, ShutdownSignal};
pub use socket::SocketReconciler;
pub use sweeper::{gc_budget, ExpirationSweeper};
pub use validation::BatchValidator;
