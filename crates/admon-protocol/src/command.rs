//! Inbound admin console commands.
//!
//! Commands are free-form text frames. Parsing never fails: anything that
//! doesn't match a known command becomes [`AdminCommand::Unknown`], which the
//! event loop logs and drops without touching the connection.

use std::time::Duration;

/// A single `key=value` pair from a `set` command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Setting {
    /// Memory sampling cadence
    MemStatsInterval(Duration),

    /// CPU sampling cadence
    CpuStatsInterval(Duration),

    /// Worker virtual-memory ceiling, in KiB
    LimitVirtMemKb(u64),

    /// Worker stack ceiling, in KiB
    LimitStackMemKb(u64),

    /// Worker file-size ceiling, in KiB
    LimitFileSizeKb(u64),
}

/// A parsed admin console command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminCommand {
    /// Credential frame; must be the first message on a connection
    Auth {
        /// Console user name
        username: String,
        /// Console secret
        secret: String,
    },

    /// Request the current document-list snapshot
    Documents,

    /// Request aggregate worker memory usage
    TotalMem,

    /// Request the open-document count
    ActiveDocsCount,

    /// Request the live-session count
    ActiveUsersCount,

    /// Request the current settings snapshot
    Settings,

    /// Request the recorded stats history
    History,

    /// Change sampler cadence or worker limits; unknown pairs are dropped
    Set(Vec<Setting>),

    /// Force-remove a document record
    Kill {
        /// Key of the document to drop
        doc_key: String,
    },

    /// Anything unrecognized; logged and ignored
    Unknown(String),
}

impl AdminCommand {
    /// Parses one inbound text frame.
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        let mut tokens = line.split_whitespace();

        let Some(verb) = tokens.next() else {
            return Self::Unknown(String::new());
        };

        match verb {
            "auth" => {
                let username = tokens.next();
                let secret = tokens.next();
                match (username, secret, tokens.next()) {
                    (Some(username), Some(secret), None) => Self::Auth {
                        username: username.to_string(),
                        secret: secret.to_string(),
                    },
                    _ => Self::Unknown(line.to_string()),
                }
            }
            "documents" => Self::Documents,
            "total_mem" => Self::TotalMem,
            "active_docs_count" => Self::ActiveDocsCount,
            "active_users_count" => Self::ActiveUsersCount,
            "settings" => Self::Settings,
            "history" => Self::History,
            "set" => Self::Set(tokens.filter_map(parse_setting).collect()),
            "kill" => match tokens.next() {
                Some(doc_key) => Self::Kill {
                    doc_key: doc_key.to_string(),
                },
                None => Self::Unknown(line.to_string()),
            },
            _ => Self::Unknown(line.to_string()),
        }
    }

    /// True for the credential frame.
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Auth { .. })
    }
}

/// Parses one `key=value` pair; `None` for anything malformed or unknown.
fn parse_setting(pair: &str) -> Option<Setting> {
    let (key, value) = pair.split_once('=')?;
    let value: u64 = value.parse().ok()?;

    match key {
        "mem_stats_interval" => Some(Setting::MemStatsInterval(Duration::from_millis(value))),
        "cpu_stats_interval" => Some(Setting::CpuStatsInterval(Duration::from_millis(value))),
        "limit_virt_mem_kb" => Some(Setting::LimitVirtMemKb(value)),
        "limit_stack_mem_kb" => Some(Setting::LimitStackMemKb(value)),
        "limit_file_size_kb" => Some(Setting::LimitFileSizeKb(value)),
        _ => None,
    }
}
