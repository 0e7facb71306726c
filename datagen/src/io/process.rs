//! Child-process execution with a timeout and bounded output capture.

use std::io::{Read, Write};
use std::process::{Command, ExitStatus, Stdio};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument, warn};
use wait_timeout::ChildExt;

/// Captured output of a finished (or killed) child process.
#[derive(Debug)]
pub struct ChildOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    /// Bytes discarded beyond the capture limit, across both streams.
    pub truncated: usize,
    pub timed_out: bool,
}

impl ChildOutput {
    pub fn stdout_text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_text(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

/// Run `cmd` with piped stdio, feed it `stdin` if given, and kill it once
/// `timeout` elapses.
///
/// stdout/stderr are drained on reader threads while the child runs, so a
/// chatty child cannot deadlock on a full pipe. Each stream keeps at most
/// `limit` bytes; the rest is counted and discarded.
#[instrument(skip_all, fields(timeout_secs = timeout.as_secs(), limit))]
pub fn run_with_timeout(
    mut cmd: Command,
    stdin: Option<&[u8]>,
    timeout: Duration,
    limit: usize,
) -> Result<ChildOutput> {
    if stdin.is_some() {
        cmd.stdin(Stdio::piped());
    } else {
        cmd.stdin(Stdio::null());
    }
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());

    debug!("spawning child process");
    let mut child = cmd.spawn().context("spawn command")?;

    if let Some(input) = stdin {
        let mut child_stdin = child
            .stdin
            .take()
            .ok_or_else(|| anyhow!("stdin was not piped"))?;
        child_stdin.write_all(input).context("write stdin")?;
    }

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;
    let stdout_handle = thread::spawn(move || drain_limited(stdout, limit));
    let stderr_handle = thread::spawn(move || drain_limited(stderr, limit));

    let mut timed_out = false;
    let status = match child.wait_timeout(timeout).context("wait for command")? {
        Some(status) => status,
        None => {
            warn!(timeout_secs = timeout.as_secs(), "command timed out, killing");
            timed_out = true;
            child.kill().context("kill command")?;
            child.wait().context("wait command after kill")?
        }
    };

    let (stdout, stdout_dropped) = join_reader(stdout_handle).context("join stdout")?;
    let (stderr, stderr_dropped) = join_reader(stderr_handle).context("join stderr")?;
    let truncated = stdout_dropped + stderr_dropped;
    if truncated > 0 {
        warn!(truncated, "child output truncated");
    }

    debug!(exit_code = ?status.code(), timed_out, "command finished");
    Ok(ChildOutput {
        status,
        stdout,
        stderr,
        truncated,
        timed_out,
    })
}

fn join_reader(handle: thread::JoinHandle<Result<(Vec<u8>, usize)>>) -> Result<(Vec<u8>, usize)> {
    handle
        .join()
        .unwrap_or_else(|_| Err(anyhow!("output reader thread panicked")))
}

fn drain_limited<R: Read>(mut reader: R, limit: usize) -> Result<(Vec<u8>, usize)> {
    let mut buf = Vec::new();
    let mut dropped = 0usize;
    let mut chunk = [0u8; 8192];
    loop {
        let n = reader.read(&mut chunk).context("read child output")?;
        if n == 0 {
            return Ok((buf, dropped));
        }
        let keep = n.min(limit.saturating_sub(buf.len()));
        buf.extend_from_slice(&chunk[..keep]);
        dropped += n - keep;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn captures_stdout_and_stdin_round_trip() {
        let cmd = Command::new("cat");
        let output = run_with_timeout(cmd, Some(b"hello"), Duration::from_secs(5), 1024)
            .expect("run cat");
        assert!(output.status.success());
        assert_eq!(output.stdout_text(), "hello");
        assert_eq!(output.truncated, 0);
        assert!(!output.timed_out);
    }

    #[test]
    fn output_beyond_the_limit_is_counted() {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg("printf 'abcdefghij'");
        let output =
            run_with_timeout(cmd, None, Duration::from_secs(5), 4).expect("run printf");
        assert_eq!(output.stdout, b"abcd");
        assert_eq!(output.truncated, 6);
    }

    #[test]
    fn slow_children_are_killed() {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg("sleep 5");
        let output =
            run_with_timeout(cmd, None, Duration::from_millis(50), 1024).expect("run sleep");
        assert!(output.timed_out);
        assert!(!output.status.success());
    }
}
