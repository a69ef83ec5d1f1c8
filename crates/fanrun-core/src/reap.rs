//! Reaper: collects exited children and drains their last output.

use std::time::Duration;

use tracing::{debug, warn};

use crate::error::Result;
use crate::hooks::Hooks;
use crate::multiplex::{read_ready, wait_readable};
use crate::state::RunState;
use crate::subprocess::Subprocess;

/// Upper bound on zero-timeout read passes over just-reaped pipes.
///
/// A grandchild may inherit a pipe and keep it open after the reaped
/// process is gone; the bound keeps the drain from chasing it forever.
const FINAL_DRAIN_MAX_PASSES: usize = 64;

impl RunState {
    /// Non-blocking wait on every in-flight process.
    ///
    /// Each exited process is moved out of the in-flight set, gets one
    /// bounded non-blocking drain of its pipes, fires the wait hook and is
    /// appended to the completed results.
    pub(crate) fn reap_completed(&mut self, hooks: &mut Hooks) -> Result<()> {
        let mut reaped = Vec::new();
        let pids: Vec<u32> = self.in_flight.keys().copied().collect();
        for pid in pids {
            let Some(subprocess) = self.in_flight.get_mut(&pid) else {
                continue;
            };
            let status = match subprocess.try_wait() {
                Ok(Some(status)) => Some(status),
                Ok(None) => continue,
                Err(e) => {
                    warn!(pid, error = %e, "Wait failed; treating process as gone");
                    None
                }
            };
            if let Some(mut subprocess) = self.in_flight.remove(&pid) {
                subprocess.mark_reaped(status);
                debug!(
                    pid,
                    status = %subprocess.exit_state(),
                    elapsed_ms = subprocess.elapsed().as_millis(),
                    "Reaped subprocess"
                );
                reaped.push(subprocess);
            }
        }

        if reaped.is_empty() {
            return Ok(());
        }

        self.final_drain(&mut reaped)?;

        for mut subprocess in reaped {
            self.handles.close_all(&mut subprocess);
            hooks.waited(&subprocess);
            self.completed.push(subprocess.into_result());
        }
        Ok(())
    }

    /// Read whatever the reaped processes wrote after the last multiplex
    /// pass, without ever blocking.
    fn final_drain(&mut self, reaped: &mut [Subprocess]) -> Result<()> {
        for _ in 0..FINAL_DRAIN_MAX_PASSES {
            let ready = wait_readable(reaped.iter(), Duration::ZERO)?;
            if ready.is_empty() {
                break;
            }
            read_ready(&ready, &mut self.handles, reaped)?;
        }
        Ok(())
    }
}
