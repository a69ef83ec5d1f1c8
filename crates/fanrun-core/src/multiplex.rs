//! Readiness multiplexer: one bounded `poll(2)` over every open output pipe.

use std::io;
use std::os::fd::{AsRawFd, RawFd};
use std::time::Duration;

use nix::errno::Errno;
use nix::poll::{PollFd, PollFlags, PollTimeout, poll};
use tracing::{debug, warn};

use crate::error::Result;
use crate::state::{HandleIndex, ProcessTable, RunState};
use crate::subprocess::{ReadOutcome, Subprocess};

impl RunState {
    /// Wait up to `period` for output from any live process and consume it.
    pub(crate) fn service_io(&mut self, period: Duration) -> Result<()> {
        let ready = wait_readable(self.in_flight.values(), period)?;
        read_ready(&ready, &mut self.handles, &mut self.in_flight)
    }
}

/// Poll the open stdout/stderr pipes of the non-terminated `processes`.
///
/// Returns the descriptors reported ready for any reason (data, hang-up or
/// error); each of them can be read once without blocking. An interrupted
/// wait reports nothing ready.
pub(crate) fn wait_readable<'a, I>(processes: I, period: Duration) -> Result<Vec<RawFd>>
where
    I: IntoIterator<Item = &'a Subprocess>,
{
    let mut fds = Vec::new();
    let mut interest = Vec::new();
    for subprocess in processes.into_iter().filter(|p| !p.terminated()) {
        for (_, handle) in subprocess.read_handles() {
            fds.push(handle.as_raw_fd());
            interest.push(PollFd::new(handle, PollFlags::POLLIN));
        }
    }

    let millis = u16::try_from(period.as_millis()).unwrap_or(u16::MAX);
    match poll(&mut interest, PollTimeout::from(millis)) {
        Ok(0) => return Ok(Vec::new()),
        Ok(_) => {}
        Err(Errno::EINTR) => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    }

    Ok(interest
        .iter()
        .zip(fds)
        .filter(|(pfd, _)| pfd.revents().is_some_and(|r| !r.is_empty()))
        .map(|(_, fd)| fd)
        .collect())
}

/// Read one chunk from each ready descriptor into its owner's buffer.
///
/// End of stream and read errors both close the pipe; bytes captured so far
/// are kept. A descriptor with no owner is an invariant violation.
pub(crate) fn read_ready<T>(
    ready: &[RawFd],
    handles: &mut HandleIndex,
    table: &mut T,
) -> Result<()>
where
    T: ProcessTable + ?Sized,
{
    for &fd in ready {
        let (pid, stream) = handles.resolve(fd)?;
        let subprocess = table
            .process_mut(pid)
            .ok_or(crate::Error::UnknownHandle { fd })?;

        match subprocess.read_chunk(stream) {
            Ok(ReadOutcome::Data { overflowed: false }) => {}
            Ok(ReadOutcome::Data { overflowed: true }) => {
                warn!(pid, %stream, "Output exceeds buffer cap; discarding the rest");
            }
            Ok(ReadOutcome::Eof) => {
                debug!(pid, %stream, "End of stream");
                handles.close(subprocess, stream);
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => {
                debug!(pid, %stream, error = %e, "Read failed; closing stream");
                handles.close(subprocess, stream);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::hooks::Hooks;
    use crate::subprocess::Stream;
    use std::collections::VecDeque;

    fn state_with(argv: &[&str]) -> RunState {
        let command = argv.iter().map(ToString::to_string).collect();
        let mut state = RunState::new(VecDeque::from([command]));
        state.try_spawn(&EngineConfig::default(), &mut Hooks::default());
        state
    }

    #[test]
    fn empty_interest_set_just_waits() {
        let ready = wait_readable(std::iter::empty(), Duration::from_millis(10)).unwrap();
        assert!(ready.is_empty());
    }

    #[test]
    fn reads_output_until_both_streams_close() {
        let mut state = state_with(&["echo", "hello"]);
        for _ in 0..100 {
            state.service_io(Duration::from_millis(100)).unwrap();
            if state.handles.is_empty() {
                break;
            }
        }

        let subprocess = state.in_flight.values().next().unwrap();
        assert_eq!(subprocess.stdout(), b"hello\n");
        assert!(subprocess.stderr().is_empty());
        assert!(!subprocess.is_open(Stream::Stdout));
        assert!(!subprocess.is_open(Stream::Stderr));
    }

    #[test]
    fn untracked_ready_fd_is_fatal() {
        let mut state = state_with(&["true"]);
        let err = read_ready(&[-7], &mut state.handles, &mut state.in_flight).unwrap_err();
        assert!(matches!(err, crate::Error::UnknownHandle { fd: -7 }));
    }

    #[test]
    fn buffer_cap_truncates_but_keeps_draining() {
        let command = ["head", "-c", "20000", "/dev/zero"]
            .iter()
            .map(ToString::to_string)
            .collect();
        let mut state = RunState::new(VecDeque::from([command]));
        let config = EngineConfig::default().with_max_buffered_bytes(1000);
        state.try_spawn(&config, &mut Hooks::default());

        for _ in 0..200 {
            state.service_io(Duration::from_millis(100)).unwrap();
            if state.handles.is_empty() {
                break;
            }
        }

        let subprocess = state.in_flight.values().next().unwrap();
        assert_eq!(subprocess.stdout().len(), 1000);
        assert!(subprocess.stdout_truncated());
        assert!(!subprocess.is_open(Stream::Stdout));
    }
}
