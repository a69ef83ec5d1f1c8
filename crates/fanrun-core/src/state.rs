//! Per-run engine state.
//!
//! A fresh [`RunState`] is built for every `run()` and dropped at its end,
//! so nothing from one batch can leak into the next.

use std::collections::{HashMap, VecDeque};
use std::os::fd::RawFd;
use std::time::Instant;

use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::result::CommandResult;
use crate::subprocess::{Stream, Subprocess};

/// Pipe descriptor -> owning pid and stream.
///
/// Readiness is reported per descriptor, so this is how a ready handle is
/// traced back to its process. An entry exists exactly while the pipe is open.
#[derive(Debug, Default)]
pub(crate) struct HandleIndex {
    by_fd: HashMap<RawFd, (u32, Stream)>,
}

impl HandleIndex {
    /// Register every open output pipe of `subprocess`.
    pub(crate) fn register(&mut self, subprocess: &Subprocess) {
        for stream in [Stream::Stdout, Stream::Stderr] {
            if let Some(fd) = subprocess.raw_fd(stream) {
                self.by_fd.insert(fd, (subprocess.pid(), stream));
            }
        }
    }

    /// Owner of a reported descriptor. Unknown descriptors are fatal.
    pub(crate) fn resolve(&self, fd: RawFd) -> Result<(u32, Stream)> {
        self.by_fd
            .get(&fd)
            .copied()
            .ok_or(Error::UnknownHandle { fd })
    }

    /// Close one stream and drop its entry in the same step.
    pub(crate) fn close(&mut self, subprocess: &mut Subprocess, stream: Stream) {
        if let Some(fd) = subprocess.close(stream) {
            self.by_fd.remove(&fd);
        }
    }

    /// Close every pipe of `subprocess` and drop their entries.
    pub(crate) fn close_all(&mut self, subprocess: &mut Subprocess) {
        for fd in subprocess.close_all() {
            self.by_fd.remove(&fd);
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.by_fd.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.by_fd.is_empty()
    }
}

/// Lookup of live processes by pid.
///
/// Implemented for the in-flight map and for the batch of just-reaped
/// processes awaiting their final drain.
pub(crate) trait ProcessTable {
    fn process_mut(&mut self, pid: u32) -> Option<&mut Subprocess>;
}

impl ProcessTable for HashMap<u32, Subprocess> {
    fn process_mut(&mut self, pid: u32) -> Option<&mut Subprocess> {
        self.get_mut(&pid)
    }
}

impl ProcessTable for [Subprocess] {
    fn process_mut(&mut self, pid: u32) -> Option<&mut Subprocess> {
        self.iter_mut().find(|p| p.pid() == pid)
    }
}

/// Everything one `run()` mutates.
#[derive(Debug)]
pub(crate) struct RunState {
    /// Commands not yet started, in submission order.
    pub(crate) pending: VecDeque<Vec<String>>,
    /// Spawned, unreaped processes.
    pub(crate) in_flight: HashMap<u32, Subprocess>,
    pub(crate) handles: HandleIndex,
    /// Results in completion order.
    pub(crate) completed: Vec<CommandResult>,
    pub(crate) started: Instant,
    /// Set once the aggregate deadline has fired.
    pub(crate) aborted: bool,
}

impl RunState {
    pub(crate) fn new(pending: VecDeque<Vec<String>>) -> Self {
        Self {
            pending,
            in_flight: HashMap::new(),
            handles: HandleIndex::default(),
            completed: Vec::new(),
            started: Instant::now(),
            aborted: false,
        }
    }

    /// Nothing queued and nothing running.
    pub(crate) fn is_done(&self) -> bool {
        self.pending.is_empty() && self.in_flight.is_empty()
    }

    /// Hand back the completed records, leaving the state empty.
    pub(crate) fn take_results(&mut self) -> Vec<CommandResult> {
        std::mem::take(&mut self.completed)
    }
}

impl Drop for RunState {
    fn drop(&mut self) {
        // Only reached with live children when a run bails out early.
        for (pid, mut subprocess) in self.in_flight.drain() {
            warn!(pid, "Killing process abandoned by an aborted run");
            self.handles.close_all(&mut subprocess);
            subprocess.kill();
            if let Err(e) = subprocess.wait() {
                debug!(pid, error = %e, "Wait after abandon failed");
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn unknown_fd_is_an_error() {
        let index = HandleIndex::default();
        let err = index.resolve(12345).unwrap_err();
        assert!(matches!(err, Error::UnknownHandle { fd: 12345 }));
    }

    #[test]
    fn fresh_state_is_done_only_without_pending() {
        assert!(RunState::new(VecDeque::new()).is_done());
        let state = RunState::new(VecDeque::from([vec!["true".to_string()]]));
        assert!(!state.is_done());
    }

    #[test]
    fn dropping_unfinished_state_kills_and_reaps_children() {
        use crate::config::EngineConfig;
        use crate::hooks::Hooks;
        use nix::errno::Errno;
        use nix::sys::signal::kill;
        use nix::unistd::Pid;

        let mut state = RunState::new(VecDeque::from([vec![
            "sleep".to_string(),
            "30".to_string(),
        ]]));
        state.try_spawn(&EngineConfig::default(), &mut Hooks::default());
        let pid = *state.in_flight.keys().next().unwrap();
        let pid = Pid::from_raw(i32::try_from(pid).unwrap());
        assert_eq!(kill(pid, None), Ok(()));

        drop(state);

        // A zombie still accepts signal 0; ESRCH means it was reaped too.
        assert_eq!(kill(pid, None), Err(Errno::ESRCH));
    }
}
