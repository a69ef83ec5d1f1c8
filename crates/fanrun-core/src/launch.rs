//! Launch controller: fills free in-flight slots from the pending queue.

use std::process::{Child, Command, Stdio};

use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::hooks::Hooks;
use crate::result::CommandResult;
use crate::state::RunState;
use crate::subprocess::Subprocess;

impl RunState {
    /// Start queued commands, in order, until the in-flight cap is reached.
    ///
    /// A command that cannot be spawned is recorded as a failed result and
    /// does not consume a slot.
    pub(crate) fn try_spawn(&mut self, config: &EngineConfig, hooks: &mut Hooks) {
        while self.in_flight.len() < config.in_flight_cap() {
            let Some(command) = self.pending.pop_front() else {
                break;
            };
            let child = match spawn_argv(&command) {
                Ok(child) => child,
                Err(e) => {
                    warn!(command = ?command, error = %e, "Failed to spawn command");
                    self.completed
                        .push(CommandResult::spawn_failed(command, e.to_string()));
                    continue;
                }
            };

            let subprocess = Subprocess::new(command, child, config.max_buffered_bytes);
            let pid = subprocess.pid();
            debug!(pid, command = ?subprocess.command(), "Spawned subprocess");

            self.handles.register(&subprocess);
            let subprocess = self.in_flight.entry(pid).or_insert(subprocess);
            hooks.started(subprocess);
        }
    }
}

/// Execute `argv` directly with all three standard streams piped.
fn spawn_argv(argv: &[String]) -> std::io::Result<Child> {
    let (program, args) = argv.split_first().ok_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty command")
    })?;
    Command::new(program)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::result::ExitState;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    fn argv(parts: &[&str]) -> Vec<String> {
        parts.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn empty_argv_is_rejected() {
        let err = spawn_argv(&[]).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidInput);
    }

    #[test]
    fn spawn_respects_cap_and_fifo_order() {
        let config = EngineConfig::default().with_max_in_flight(2);
        let started = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&started);
        let mut hooks = Hooks {
            on_start: Some(Box::new(move |p: &Subprocess| {
                seen.lock().unwrap().push(p.command()[1].clone());
            })),
            ..Hooks::default()
        };

        let mut state = RunState::new(VecDeque::from([
            argv(&["sleep", "5"]),
            argv(&["sleep", "6"]),
            argv(&["sleep", "7"]),
        ]));
        state.try_spawn(&config, &mut hooks);

        assert_eq!(state.in_flight.len(), 2);
        assert_eq!(state.pending.len(), 1);
        assert_eq!(*started.lock().unwrap(), vec!["5", "6"]);
        assert_eq!(state.handles.len(), 4);
        // Dropping the state kills and reaps the sleepers.
    }

    #[test]
    fn spawn_failure_becomes_result_and_frees_slot() {
        let config = EngineConfig::default().with_max_in_flight(1);
        let mut hooks = Hooks::default();
        let mut state = RunState::new(VecDeque::from([
            argv(&["/nonexistent/fanrun-test-binary"]),
            argv(&["true"]),
        ]));
        state.try_spawn(&config, &mut hooks);

        assert_eq!(state.completed.len(), 1);
        assert!(matches!(
            state.completed[0].status,
            ExitState::SpawnFailed { .. }
        ));
        assert_eq!(state.in_flight.len(), 1);
        assert!(state.pending.is_empty());
    }
}
