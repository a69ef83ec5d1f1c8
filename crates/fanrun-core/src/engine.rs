//! Run loop and result aggregation.
//!
//! Each tick of [`Engine::run`]:
//! 1. fill free slots from the pending queue (FIFO),
//! 2. wait up to one poll period for pipe readiness and read,
//! 3. kill processes over their budget (and everything, past the deadline),
//! 4. reap exited processes and drain their final output.
//!
//! The loop ends when nothing is queued and nothing is in flight.

use std::collections::VecDeque;

use tracing::{debug, info};

use crate::config::EngineConfig;
use crate::error::Result;
use crate::hooks::Hooks;
use crate::result::CommandResult;
use crate::state::RunState;
use crate::subprocess::Subprocess;

/// Bounded-concurrency batch executor.
///
/// Commands are queued with [`add_command`](Self::add_command) and executed
/// by [`run`](Self::run). Every `run()` starts from empty per-run state, so
/// an engine can be reused for independent batches.
#[derive(Debug, Default)]
pub struct Engine {
    config: EngineConfig,
    hooks: Hooks,
    pending: VecDeque<Vec<String>>,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            hooks: Hooks::default(),
            pending: VecDeque::new(),
        }
    }

    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Number of commands queued for the next `run()`.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Queue one argv vector. The first element is the program; nothing is
    /// interpreted by a shell.
    pub fn add_command<I, S>(&mut self, argv: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.pending
            .push_back(argv.into_iter().map(Into::into).collect());
        self
    }

    /// Queue several argv vectors, preserving their order.
    pub fn add_commands<I>(&mut self, commands: I) -> &mut Self
    where
        I: IntoIterator<Item = Vec<String>>,
    {
        self.pending.extend(commands);
        self
    }

    /// Register the hook fired after each process is spawned.
    pub fn on_start<F>(&mut self, hook: F) -> &mut Self
    where
        F: FnMut(&Subprocess) + Send + 'static,
    {
        self.hooks.on_start = Some(Box::new(hook));
        self
    }

    /// Register the hook fired once per reaped process, after its final drain.
    pub fn on_wait<F>(&mut self, hook: F) -> &mut Self
    where
        F: FnMut(&Subprocess) + Send + 'static,
    {
        self.hooks.on_wait = Some(Box::new(hook));
        self
    }

    /// Register the hook fired just before a process is force-terminated.
    pub fn on_timeout<F>(&mut self, hook: F) -> &mut Self
    where
        F: FnMut(&Subprocess) + Send + 'static,
    {
        self.hooks.on_timeout = Some(Box::new(hook));
        self
    }

    /// Execute every queued command and return one result per command, in
    /// completion order.
    ///
    /// Per-command failures are reported in the results. An `Err` means the
    /// engine's own bookkeeping broke; any processes still running are then
    /// killed and reaped before returning. Either way the queue is empty
    /// afterwards.
    pub fn run(&mut self) -> Result<Vec<CommandResult>> {
        let mut state = RunState::new(std::mem::take(&mut self.pending));
        let total = state.pending.len();
        let per_process = self.config.per_process_timeout();
        // A budget too large to represent as an instant never fires.
        let deadline = self
            .config
            .aggregate_timeout()
            .and_then(|budget| state.started.checked_add(budget));
        let poll_period = self.config.poll_period();

        info!(
            commands = total,
            max_in_flight = self.config.in_flight_cap(),
            per_process_timeout = ?per_process,
            aggregate_timeout = ?self.config.aggregate_timeout(),
            "Starting batch"
        );

        while !state.is_done() {
            state.try_spawn(&self.config, &mut self.hooks);
            state.service_io(poll_period)?;
            state.enforce_timeouts(per_process, &mut self.hooks);
            state.enforce_deadline(deadline, &mut self.hooks);
            state.reap_completed(&mut self.hooks)?;

            if self.config.debug {
                debug!(
                    in_flight = state.in_flight.len(),
                    open_handles = state.handles.len(),
                    pending = state.pending.len(),
                    completed = state.completed.len(),
                    "Tick"
                );
            }
        }

        let results = state.take_results();
        info!(
            commands = results.len(),
            failed = results.iter().filter(|r| !r.success()).count(),
            elapsed_ms = state.started.elapsed().as_millis(),
            "Batch finished"
        );
        Ok(results)
    }
}
