//! Global document-processing settings relayed to the worker supervisor.

use serde::{Deserialize, Serialize};

/// Resource limits applied to newly spawned worker processes.
///
/// A value of zero means "no limit". The admin plane only stores and relays
/// these; enforcement is the supervisor's job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DocProcSettings {
    /// Virtual memory ceiling per worker, in KiB
    pub limit_virt_mem_kb: u64,

    /// Stack size ceiling per worker, in KiB
    pub limit_stack_mem_kb: u64,

    /// Largest file a worker may open, in KiB
    pub limit_file_size_kb: u64,
}

impl DocProcSettings {
    /// Creates settings with all limits disabled.
    pub fn unlimited() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_unlimited() {
        let s = DocProcSettings::default();
        assert_eq!(s.limit_virt_mem_kb, 0);
        assert_eq!(s.limit_stack_mem_kb, 0);
        assert_eq!(s.limit_file_size_kb, 0);
    }

    #[test]
    fn test_serde_roundtrip() {
        let s = DocProcSettings {
            limit_virt_mem_kb: 512 * 1024,
            limit_stack_mem_kb: 8 * 1024,
            limit_file_size_kb: 0,
        };
        let json = serde_json::to_string(&s).unwrap();
        let back: DocProcSettings = serde_json::from_str(&json).unwrap();
        assert_eq!(back, s);
    }
}
