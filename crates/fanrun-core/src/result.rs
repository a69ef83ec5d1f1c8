//! Per-command result records returned by [`Engine::run`](crate::Engine::run).

use std::borrow::Cow;
use std::time::{Duration, SystemTime};

use serde::{Serialize, Serializer};

/// How a command ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExitState {
    /// The process exited on its own with this code.
    Exited { code: i32 },
    /// The process died from a signal the engine did not send.
    Signaled { signal: i32 },
    /// The engine force-terminated the process (per-process or aggregate timeout).
    Killed,
    /// The process could not be created.
    SpawnFailed { reason: String },
    /// Never launched: the aggregate deadline passed while it was queued.
    Aborted,
    /// Reaped without a usable status.
    Unknown,
}

impl ExitState {
    /// `true` only for a natural exit with code 0.
    pub const fn success(&self) -> bool {
        matches!(self, Self::Exited { code: 0 })
    }
}

impl std::fmt::Display for ExitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Exited { code } => write!(f, "exit {code}"),
            Self::Signaled { signal } => write!(f, "signal {signal}"),
            Self::Killed => f.write_str("killed"),
            Self::SpawnFailed { reason } => write!(f, "spawn failed: {reason}"),
            Self::Aborted => f.write_str("aborted"),
            Self::Unknown => f.write_str("unknown"),
        }
    }
}

/// Outcome of one submitted command.
///
/// Output is kept as raw bytes. When serialized, it is emitted as lossy
/// UTF-8 text.
#[derive(Debug, Clone, Serialize)]
pub struct CommandResult {
    /// OS pid; `None` for commands that never started.
    pub pid: Option<u32>,
    pub command: Vec<String>,
    #[serde(serialize_with = "lossy_utf8")]
    pub stdout: Vec<u8>,
    #[serde(serialize_with = "lossy_utf8")]
    pub stderr: Vec<u8>,
    pub stdout_truncated: bool,
    pub stderr_truncated: bool,
    pub started_at: SystemTime,
    pub finished_at: SystemTime,
    pub elapsed: Duration,
    pub status: ExitState,
    /// `true` if the engine force-killed the process.
    pub terminated: bool,
}

impl CommandResult {
    /// Record for a command whose process could not be created.
    pub(crate) fn spawn_failed(command: Vec<String>, reason: String) -> Self {
        Self::not_run(command, ExitState::SpawnFailed { reason })
    }

    /// Record for a command dropped from the queue by the aggregate deadline.
    pub(crate) fn aborted(command: Vec<String>) -> Self {
        Self::not_run(command, ExitState::Aborted)
    }

    fn not_run(command: Vec<String>, status: ExitState) -> Self {
        let now = SystemTime::now();
        Self {
            pid: None,
            command,
            stdout: Vec::new(),
            stderr: Vec::new(),
            stdout_truncated: false,
            stderr_truncated: false,
            started_at: now,
            finished_at: now,
            elapsed: Duration::ZERO,
            status,
            terminated: false,
        }
    }

    /// Exit code 0 and not force-terminated.
    pub const fn success(&self) -> bool {
        !self.terminated && self.status.success()
    }

    pub fn stdout_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.stdout)
    }

    pub fn stderr_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.stderr)
    }
}

fn lossy_utf8<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&String::from_utf8_lossy(bytes))
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn only_zero_exit_is_success() {
        assert!(ExitState::Exited { code: 0 }.success());
        assert!(!ExitState::Exited { code: 1 }.success());
        assert!(!ExitState::Killed.success());
        assert!(!ExitState::Aborted.success());
    }

    #[test]
    fn spawn_failed_record_has_no_pid() {
        let result = CommandResult::spawn_failed(vec!["nope".into()], "not found".into());
        assert_eq!(result.pid, None);
        assert!(!result.success());
        assert!(!result.terminated);
        assert_eq!(result.status.to_string(), "spawn failed: not found");
    }

    #[test]
    fn serializes_output_as_text_and_tags_status() {
        let mut result = CommandResult::aborted(vec!["echo".into(), "hi".into()]);
        result.stdout = b"hi\n".to_vec();
        result.stderr = vec![0xff, b'x'];

        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["stdout"], "hi\n");
        assert_eq!(value["stderr"], "\u{fffd}x");
        assert_eq!(value["status"]["kind"], "aborted");
        assert_eq!(value["command"][1], "hi");
    }
}
