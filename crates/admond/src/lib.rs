//! admon daemon - admin control plane for a collaborative document server
//!
//! This crate provides the daemon's building blocks:
//! - `admin` - the admin event loop: single owner of the document registry,
//!   stats baseline, client roster and supervisor channel
//! - `sampler` - periodic worker memory/CPU aggregation
//! - `server` - WebSocket console server and per-connection protocol handler
//! - `worker` - best-effort IPC channel to the worker supervisor
//! - `config` - environment-driven configuration
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                          admond                              │
//! ├──────────────────────────────────────────────────────────────┤
//! │                                                              │
//! │  ┌─────────────────┐      ┌──────────────────────────────┐  │
//! │  │   AdminServer   │─────▶│         AdminActor           │  │
//! │  │ (WS upgrades)   │      │ (registry + sampler owner)   │  │
//! │  └────────┬────────┘      └───────┬──────────────┬───────┘  │
//! │           │ connections           │ broadcasts   │ settings │
//! │           ▼                       ▼              ▼          │
//! │  ┌─────────────────┐      ┌──────────────┐  ┌────────────┐  │
//! │  │ConnectionHandler│◀─────│ client roster│  │ supervisor │  │
//! │  │  (per console)  │      │ (per-client  │  │ pipe (best │  │
//! │  └─────────────────┘      │  queues)     │  │  effort)   │  │
//! │                           └──────────────┘  └────────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! All admin state lives in the actor task; every other execution context
//! talks to it through [`admin::AdminHandle`]. There is no locking because
//! there is exactly one writer.

pub mod admin;
pub mod config;
pub mod sampler;
pub mod server;
pub mod worker;
