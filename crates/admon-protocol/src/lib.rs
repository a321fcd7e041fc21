//! admon wire protocol.
//!
//! Three distinct surfaces share this crate:
//! - `message` - outbound JSON text frames pushed to authenticated admin
//!   console clients
//! - `command` - the inbound free-form command strings those clients send
//! - `ipc` - the settings payload written to the worker supervisor's pipe
//!
//! Inbound commands stay plain text (the console is scriptable with netcat
//! and a WebSocket shim); outbound frames are tagged JSON so the console UI
//! can dispatch on `type` without sniffing.

pub mod command;
pub mod ipc;
pub mod message;

// Re-exports for convenience
pub use command::{AdminCommand, Setting};
pub use message::{AdminMessage, DocumentSummary};
