//! Mutation commands accepted by the state mediator
//!
//! Commands arrive as JSON objects tagged by `kind`:
//!
//! ```json
//! {"kind": "add_watched_pid", "pid": 1234}
//! {"kind": "clear_watched_pids"}
//! {"kind": "set_watch_all", "enabled": true}
//! ```
//!
//! Any other `kind` decodes to [`Command::Unknown`], which the mediator logs
//! and skips.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::Pid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Command {
    /// Watch `pid` and turn watch-all off
    AddWatchedPid { pid: Pid },
    /// Forget every watched PID and turn watch-all off
    ClearWatchedPids,
    SetWatchAll { enabled: bool },
    #[serde(other)]
    Unknown,
}

impl Command {
    /// Decode a JSON command body
    ///
    /// # Errors
    /// Returns an error on malformed JSON, a missing `kind`, or missing fields
    /// for a known kind
    pub fn from_json(body: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(body)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::AddWatchedPid { pid } => write!(f, "add_watched_pid({})", pid.0),
            Command::ClearWatchedPids => f.write_str("clear_watched_pids"),
            Command::SetWatchAll { enabled } => write!(f, "set_watch_all({enabled})"),
            Command::Unknown => f.write_str("unknown"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encodes_with_kind_tag() {
        let json = serde_json::to_string(&Command::AddWatchedPid { pid: Pid(9) }).unwrap();
        assert_eq!(json, r#"{"kind":"add_watched_pid","pid":9}"#);
    }

    #[test]
    fn test_display() {
        assert_eq!(Command::SetWatchAll { enabled: true }.to_string(), "set_watch_all(true)");
        assert_eq!(Command::AddWatchedPid { pid: Pid(3) }.to_string(), "add_watched_pid(3)");
    }
}
