//! The admin event loop: actor, request types and client handle.
//!
//! ```text
//! ┌──────────────────┐     ┌─────────────────┐     ┌─────────────────┐
//! │ document server  │────▶│   AdminActor    │────▶│ console queues  │
//! │ supervisor calls │     │ (single writer) │     │ (per client)    │
//! │ console commands │     └─────────────────┘     └─────────────────┘
//! └──────────────────┘              │
//!        AdminRequest               │ StatsTimers + StatsSampler
//!        (mpsc inbox)               ▼
//!                            worker pid aggregation
//! ```
//!
//! The actor is the sole writer of admin state. Everything else holds an
//! [`AdminHandle`] and enqueues requests; the loop drains them in order, so
//! every attached console observes registry changes in the order they
//! happened.

use std::time::Duration;

use tokio::sync::mpsc;

mod actor;
mod handle;
mod requests;

pub use actor::AdminActor;
pub use handle::AdminHandle;
pub use requests::{AdminError, AdminRequest};

use crate::sampler::{ProcessProbe, StatsSampler};

/// Request inbox depth; senders briefly back-pressure beyond this.
const REQUEST_BUFFER: usize = 100;

/// Spawns the admin event loop and returns a handle for interaction.
///
/// `probe` supplies per-process resource figures; production passes
/// [`crate::sampler::SystemProbe`].
pub fn spawn_admin(
    mem_every: Duration,
    cpu_every: Duration,
    history_size: usize,
    probe: Box<dyn ProcessProbe>,
) -> AdminHandle {
    let (tx, rx) = mpsc::channel(REQUEST_BUFFER);

    let actor = AdminActor::new(rx, StatsSampler::new(probe), mem_every, cpu_every, history_size);
    tokio::spawn(actor.run());

    AdminHandle::new(tx)
}
