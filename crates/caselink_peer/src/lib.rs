//! # Caselink Peer
//!
//! Outbound peer synchronization: export → transfer → import against one
//! configured upstream peer, with per-peer mutual exclusion and a durable
//! job ledger.
//!
//! ## Architecture
//!
//! The [`Orchestrator`] acknowledges a caller with a job id as soon as the
//! sync job is recorded; everything after that runs detached, and outcomes
//! surface only through the [`Ledger`] and logs. At most one orchestration
//! is in flight per peer URL unless forced, guarded by the
//! [`InProgressRegistry`]; a request arriving while one runs is deferred
//! and retriggered when the running one finishes.
//!
//! ## Key Invariants
//!
//! - Job statuses never regress from a terminal state
//! - The in-progress slot is cleared on every exit path
//! - The incremental lower bound is the previous successful sync's start
//!   time minus one minute, guarding against clock skew

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
mod ledger;
mod orchestrator;
mod registry;
mod transport;

pub use config::{PeerCredentials, PeerDescriptor, PeerRegistry};
pub use error::{PeerError, PeerResult};
pub use ledger::{ExportJob, JobStatus, Ledger, MemoryLedger, SyncJob};
pub use orchestrator::{Orchestrator, OrchestratorConfig, SYNC_CLOCK_SKEW};
pub use registry::InProgressRegistry;
pub use transport::{LoopbackTransport, MockTransport, PeerTransport, UploadReceipt};
