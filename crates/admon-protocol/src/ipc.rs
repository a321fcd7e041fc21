//! Settings payload for the worker-supervisor pipe.
//!
//! The supervisor reads newline-terminated commands from its control pipe.
//! The admin plane only ever writes one command: the current worker resource
//! limits, re-sent in full whenever any of them changes.

use admon_core::DocProcSettings;

/// Encodes the settings as a single newline-terminated pipe command.
pub fn encode_settings(settings: &DocProcSettings) -> String {
    format!(
        "setconfig limit_virt_mem_kb={} limit_stack_mem_kb={} limit_file_size_kb={}\n",
        settings.limit_virt_mem_kb, settings.limit_stack_mem_kb, settings.limit_file_size_kb
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_settings() {
        let settings = DocProcSettings {
            limit_virt_mem_kb: 524288,
            limit_stack_mem_kb: 8192,
            limit_file_size_kb: 0,
        };
        assert_eq!(
            encode_settings(&settings),
            "setconfig limit_virt_mem_kb=524288 limit_stack_mem_kb=8192 limit_file_size_kb=0\n"
        );
    }

    #[test]
    fn test_encode_is_single_line() {
        let line = encode_settings(&DocProcSettings::default());
        assert!(line.ends_with('\n'));
        assert_eq!(line.matches('\n').count(), 1);
    }
}
