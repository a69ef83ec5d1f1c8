//! Timeout enforcement: per-process budgets and the aggregate run deadline.

use std::time::{Duration, Instant};

use tracing::warn;

use crate::hooks::Hooks;
use crate::result::CommandResult;
use crate::state::RunState;

impl RunState {
    /// Kill every running process older than `limit`.
    pub(crate) fn enforce_timeouts(&mut self, limit: Option<Duration>, hooks: &mut Hooks) {
        let Some(limit) = limit else {
            return;
        };
        let expired: Vec<u32> = self
            .in_flight
            .values()
            .filter(|p| !p.terminated() && p.elapsed() > limit)
            .map(crate::Subprocess::pid)
            .collect();
        for pid in expired {
            warn!(pid, limit_ms = limit.as_millis(), "Process exceeded its timeout");
            self.force_terminate(pid, hooks);
        }
    }

    /// Once `deadline` has passed, kill everything in flight and record
    /// every queued command as aborted. Fires at most once per run.
    pub(crate) fn enforce_deadline(&mut self, deadline: Option<Instant>, hooks: &mut Hooks) {
        let Some(deadline) = deadline else {
            return;
        };
        if self.aborted || Instant::now() < deadline {
            return;
        }
        self.aborted = true;
        warn!(
            in_flight = self.in_flight.len(),
            pending = self.pending.len(),
            elapsed_ms = self.started.elapsed().as_millis(),
            "Aggregate timeout reached; aborting remaining work"
        );

        let live: Vec<u32> = self
            .in_flight
            .values()
            .filter(|p| !p.terminated())
            .map(crate::Subprocess::pid)
            .collect();
        for pid in live {
            self.force_terminate(pid, hooks);
        }
        self.completed
            .extend(self.pending.drain(..).map(CommandResult::aborted));
    }

    /// Fire the timeout hook, unregister and close the pipes, then SIGKILL.
    ///
    /// The process stays in flight until the reaper collects it.
    fn force_terminate(&mut self, pid: u32, hooks: &mut Hooks) {
        let Some(subprocess) = self.in_flight.get_mut(&pid) else {
            return;
        };
        hooks.timed_out(subprocess);
        self.handles.close_all(subprocess);
        subprocess.kill();
    }
}
