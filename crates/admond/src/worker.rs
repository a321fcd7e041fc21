//! IPC channel to the worker supervisor.
//!
//! The supervisor registers its pid and the write end of its control pipe
//! once per (re)spawn. The channel is an explicit value with open/closed
//! validity, so a dead or not-yet-registered supervisor is representable
//! without sentinel integers.
//!
//! Writes are a single non-blocking attempt. A full pipe or a dead child is
//! reported to the caller for logging and never retried here; recovery
//! happens only when the supervisor re-registers a fresh descriptor.

use std::io;
use std::os::fd::{AsRawFd, OwnedFd};

use thiserror::Error;
use tokio::net::unix::pipe;
use tracing::debug;

/// Write failures on the supervisor pipe.
#[derive(Debug, Error)]
pub enum SupervisorIpcError {
    /// No pipe registered, or the previous one was torn down
    #[error("supervisor channel is not open")]
    Closed,

    /// The pipe is full; the payload was dropped, not queued
    #[error("supervisor pipe is full, dropped {len} bytes")]
    PipeFull { len: usize },

    /// The kernel accepted only part of the payload
    #[error("short write to supervisor pipe: {written} of {len} bytes")]
    ShortWrite { written: usize, len: usize },

    /// Any other I/O failure, typically a dead child (EPIPE)
    #[error("supervisor pipe write failed: {0}")]
    Io(#[from] io::Error),
}

/// The admin plane's handle to the worker supervisor.
#[derive(Debug, Default)]
pub struct SupervisorChannel {
    pid: Option<u32>,
    pipe: Option<pipe::Sender>,
}

impl SupervisorChannel {
    /// Creates a closed channel; the supervisor has not registered yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the supervisor's process id.
    pub fn set_pid(&mut self, pid: u32) {
        debug!(pid, "Supervisor pid registered");
        self.pid = Some(pid);
    }

    /// Takes ownership of the write end of the supervisor's control pipe,
    /// replacing any previous descriptor.
    ///
    /// The descriptor is switched to non-blocking mode so a stalled child
    /// can never stall the admin loop.
    pub fn set_pipe(&mut self, fd: OwnedFd) -> io::Result<()> {
        set_nonblocking(&fd)?;
        self.pipe = Some(pipe::Sender::from_owned_fd(fd)?);
        debug!("Supervisor pipe registered");
        Ok(())
    }

    /// Supervisor pid, if registered.
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// True once both halves of the registration have arrived.
    pub fn is_open(&self) -> bool {
        self.pid.is_some() && self.pipe.is_some()
    }

    /// Writes `payload` to the pipe in a single non-blocking attempt.
    pub fn notify(&self, payload: &str) -> Result<(), SupervisorIpcError> {
        let Some(pipe) = &self.pipe else {
            return Err(SupervisorIpcError::Closed);
        };

        let bytes = payload.as_bytes();
        match pipe.try_write(bytes) {
            Ok(written) if written == bytes.len() => Ok(()),
            Ok(written) => Err(SupervisorIpcError::ShortWrite {
                written,
                len: bytes.len(),
            }),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                Err(SupervisorIpcError::PipeFull { len: bytes.len() })
            }
            Err(e) => Err(SupervisorIpcError::Io(e)),
        }
    }
}

/// Puts a descriptor into non-blocking mode.
fn set_nonblocking(fd: &OwnedFd) -> io::Result<()> {
    let raw = fd.as_raw_fd();

    let flags = unsafe { libc::fcntl(raw, libc::F_GETFL) };
    if flags < 0 {
        return Err(io::Error::last_os_error());
    }

    if unsafe { libc::fcntl(raw, libc::F_SETFL, flags | libc::O_NONBLOCK) } < 0 {
        return Err(io::Error::last_os_error());
    }

    Ok(())
}
