//! In-memory record for one running or completed child process.
//!
//! A [`Subprocess`] owns the parent side of the child's three pipes. Each
//! pipe end is an `Option`: `None` means closed, and a closed end is never
//! read from or written to again.

use std::io::{self, Read};
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, RawFd};
use std::os::unix::process::ExitStatusExt;
use std::process::{Child, ChildStderr, ChildStdin, ChildStdout, ExitStatus};
use std::time::{Duration, Instant, SystemTime};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::result::{CommandResult, ExitState};

/// Bytes requested from a pipe per read.
pub(crate) const READ_CHUNK: usize = 4096;

/// One of the two captured output streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stream {
    Stdout,
    Stderr,
}

impl std::fmt::Display for Stream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stdout => f.write_str("stdout"),
            Self::Stderr => f.write_str("stderr"),
        }
    }
}

/// Append-only capture with a hard size cap.
#[derive(Debug, Default)]
pub(crate) struct CaptureBuffer {
    bytes: Vec<u8>,
    limit: usize,
    truncated: bool,
}

impl CaptureBuffer {
    pub(crate) const fn new(limit: usize) -> Self {
        Self {
            bytes: Vec::new(),
            limit,
            truncated: false,
        }
    }

    /// Append `chunk`, keeping at most `limit` bytes in total.
    ///
    /// Returns `true` only on the append that first crosses the cap.
    pub(crate) fn append(&mut self, chunk: &[u8]) -> bool {
        let room = self.limit.saturating_sub(self.bytes.len());
        let keep = chunk.len().min(room);
        self.bytes.extend_from_slice(&chunk[..keep]);
        if keep < chunk.len() && !self.truncated {
            self.truncated = true;
            return true;
        }
        false
    }

    pub(crate) fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub(crate) const fn is_truncated(&self) -> bool {
        self.truncated
    }

    pub(crate) fn into_parts(self) -> (Vec<u8>, bool) {
        (self.bytes, self.truncated)
    }
}

/// What a single pipe read produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ReadOutcome {
    /// Bytes were read. `overflowed` is set on the read that first hit the cap.
    Data { overflowed: bool },
    /// Clean end of stream.
    Eof,
}

/// One child process under management.
#[derive(Debug)]
pub struct Subprocess {
    command: Vec<String>,
    pid: u32,
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: Option<ChildStdout>,
    stderr: Option<ChildStderr>,
    stdout_buf: CaptureBuffer,
    stderr_buf: CaptureBuffer,
    started_at: SystemTime,
    started: Instant,
    finished_at: Option<SystemTime>,
    elapsed: Option<Duration>,
    exit_status: Option<ExitStatus>,
    reaped: bool,
    terminated: bool,
}

impl Subprocess {
    /// Wrap a freshly spawned child, taking ownership of its pipe ends.
    pub(crate) fn new(command: Vec<String>, mut child: Child, max_buffered_bytes: usize) -> Self {
        Self {
            command,
            pid: child.id(),
            stdin: child.stdin.take(),
            stdout: child.stdout.take(),
            stderr: child.stderr.take(),
            child,
            stdout_buf: CaptureBuffer::new(max_buffered_bytes),
            stderr_buf: CaptureBuffer::new(max_buffered_bytes),
            started_at: SystemTime::now(),
            started: Instant::now(),
            finished_at: None,
            elapsed: None,
            exit_status: None,
            reaped: false,
            terminated: false,
        }
    }

    /// The argv this process was started with.
    pub fn command(&self) -> &[String] {
        &self.command
    }

    pub const fn pid(&self) -> u32 {
        self.pid
    }

    /// Bytes captured from stdout so far.
    pub fn stdout(&self) -> &[u8] {
        self.stdout_buf.as_bytes()
    }

    /// Bytes captured from stderr so far.
    pub fn stderr(&self) -> &[u8] {
        self.stderr_buf.as_bytes()
    }

    pub const fn stdout_truncated(&self) -> bool {
        self.stdout_buf.is_truncated()
    }

    pub const fn stderr_truncated(&self) -> bool {
        self.stderr_buf.is_truncated()
    }

    pub const fn started_at(&self) -> SystemTime {
        self.started_at
    }

    /// Wall-clock time of reaping; `None` while running.
    pub const fn finished_at(&self) -> Option<SystemTime> {
        self.finished_at
    }

    /// Time since spawn, frozen once reaped.
    pub fn elapsed(&self) -> Duration {
        self.elapsed.unwrap_or_else(|| self.started.elapsed())
    }

    /// OS exit status; `None` until reaped.
    pub const fn exit_status(&self) -> Option<ExitStatus> {
        self.exit_status
    }

    /// `true` once the engine has force-killed this process.
    pub const fn terminated(&self) -> bool {
        self.terminated
    }

    pub const fn is_reaped(&self) -> bool {
        self.reaped
    }

    /// `true` while the given output pipe is still open.
    pub const fn is_open(&self, stream: Stream) -> bool {
        match stream {
            Stream::Stdout => self.stdout.is_some(),
            Stream::Stderr => self.stderr.is_some(),
        }
    }

    /// Raw descriptor of an open output pipe, used as its identity.
    pub(crate) fn raw_fd(&self, stream: Stream) -> Option<RawFd> {
        match stream {
            Stream::Stdout => self.stdout.as_ref().map(AsRawFd::as_raw_fd),
            Stream::Stderr => self.stderr.as_ref().map(AsRawFd::as_raw_fd),
        }
    }

    /// Open output pipes with their stream tag.
    pub(crate) fn read_handles(&self) -> impl Iterator<Item = (Stream, BorrowedFd<'_>)> {
        let stdout = self.stdout.as_ref().map(|h| (Stream::Stdout, h.as_fd()));
        let stderr = self.stderr.as_ref().map(|h| (Stream::Stderr, h.as_fd()));
        stdout.into_iter().chain(stderr)
    }

    /// Read one chunk from `stream` into its capture buffer.
    ///
    /// Must only be called when the pipe is open and reported readable, so
    /// the read does not block.
    pub(crate) fn read_chunk(&mut self, stream: Stream) -> io::Result<ReadOutcome> {
        let mut chunk = [0u8; READ_CHUNK];
        let n = match stream {
            Stream::Stdout => match self.stdout.as_mut() {
                Some(pipe) => pipe.read(&mut chunk)?,
                None => return Ok(ReadOutcome::Eof),
            },
            Stream::Stderr => match self.stderr.as_mut() {
                Some(pipe) => pipe.read(&mut chunk)?,
                None => return Ok(ReadOutcome::Eof),
            },
        };
        if n == 0 {
            return Ok(ReadOutcome::Eof);
        }
        let buffer = match stream {
            Stream::Stdout => &mut self.stdout_buf,
            Stream::Stderr => &mut self.stderr_buf,
        };
        Ok(ReadOutcome::Data {
            overflowed: buffer.append(&chunk[..n]),
        })
    }

    /// Close one output pipe. Returns the descriptor it held, if any.
    pub(crate) fn close(&mut self, stream: Stream) -> Option<RawFd> {
        let fd = self.raw_fd(stream);
        match stream {
            Stream::Stdout => drop(self.stdout.take()),
            Stream::Stderr => drop(self.stderr.take()),
        }
        fd
    }

    /// Close every pipe end, returning the output descriptors that were open.
    pub(crate) fn close_all(&mut self) -> Vec<RawFd> {
        drop(self.stdin.take());
        [Stream::Stdout, Stream::Stderr]
            .into_iter()
            .filter_map(|stream| self.close(stream))
            .collect()
    }

    /// Send SIGKILL and mark the process as force-terminated.
    ///
    /// Pipes must already be closed and unregistered by the caller.
    pub(crate) fn kill(&mut self) {
        if let Err(e) = self.child.kill() {
            debug!(pid = self.pid, error = %e, "Kill failed; process already gone");
        }
        self.terminated = true;
    }

    /// Non-blocking wait for this child.
    pub(crate) fn try_wait(&mut self) -> io::Result<Option<ExitStatus>> {
        self.child.try_wait()
    }

    /// Blocking wait, used only after a kill when abandoning a run.
    pub(crate) fn wait(&mut self) -> io::Result<ExitStatus> {
        self.child.wait()
    }

    /// Record the end of this process's life.
    pub(crate) fn mark_reaped(&mut self, status: Option<ExitStatus>) {
        self.finished_at = Some(SystemTime::now());
        self.elapsed = Some(self.started.elapsed());
        self.exit_status = status;
        self.reaped = true;
    }

    /// Terminal state as seen by callers.
    pub fn exit_state(&self) -> ExitState {
        if self.terminated {
            return ExitState::Killed;
        }
        match self.exit_status {
            Some(status) => match (status.code(), status.signal()) {
                (Some(code), _) => ExitState::Exited { code },
                (None, Some(signal)) => ExitState::Signaled { signal },
                (None, None) => ExitState::Unknown,
            },
            None => ExitState::Unknown,
        }
    }

    /// Convert a reaped process into its result record.
    pub(crate) fn into_result(mut self) -> CommandResult {
        drop(self.close_all());
        let status = self.exit_state();
        let (stdout, stdout_truncated) = std::mem::take(&mut self.stdout_buf).into_parts();
        let (stderr, stderr_truncated) = std::mem::take(&mut self.stderr_buf).into_parts();
        CommandResult {
            pid: Some(self.pid),
            command: std::mem::take(&mut self.command),
            stdout,
            stderr,
            stdout_truncated,
            stderr_truncated,
            started_at: self.started_at,
            finished_at: self.finished_at.unwrap_or_else(SystemTime::now),
            elapsed: self.elapsed(),
            status,
            terminated: self.terminated,
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn capture_buffer_caps_and_flags_once() {
        let mut buf = CaptureBuffer::new(5);
        assert!(!buf.append(b"abc"));
        assert!(buf.append(b"defg"));
        assert!(!buf.append(b"hij"));
        assert_eq!(buf.as_bytes(), b"abcde");
        assert!(buf.is_truncated());
    }

    #[test]
    fn capture_buffer_exact_fit_is_not_truncated() {
        let mut buf = CaptureBuffer::new(4);
        assert!(!buf.append(b"abcd"));
        assert!(!buf.is_truncated());
        assert!(!buf.append(b""));
        assert!(!buf.is_truncated());
    }

    #[test]
    fn zero_limit_discards_everything() {
        let mut buf = CaptureBuffer::new(0);
        assert!(buf.append(b"x"));
        assert!(buf.as_bytes().is_empty());
    }

    #[test]
    fn stream_display() {
        assert_eq!(Stream::Stdout.to_string(), "stdout");
        assert_eq!(Stream::Stderr.to_string(), "stderr");
    }
}
