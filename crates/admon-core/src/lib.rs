//! admon core - shared domain types for the admin control plane
//!
//! This crate provides the pure, synchronous domain model shared between the
//! daemon (admond) and the wire protocol (admon-protocol):
//! - `document` - open documents and their view sessions
//! - `registry` - the in-memory document/session registry
//! - `settings` - global document-processing settings relayed to the
//!   worker supervisor
//!
//! Nothing in this crate performs I/O or touches the async runtime. All
//! mutation happens on whichever single task owns the registry; the types
//! make no attempt to be shared across threads.

pub mod document;
pub mod registry;
pub mod settings;

// Re-exports for convenience
pub use document::{DocKey, DocumentRecord, SessionEntry};
pub use registry::{DocRegistry, RemovalOutcome};
pub use settings::DocProcSettings;
