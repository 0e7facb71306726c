//! Result artifact writers.
//!
//! Everything under the success/fail directories is product output:
//! written unconditionally, deterministic, pretty-printed with a trailing
//! newline.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::core::conversation;
use crate::core::mcts::Trace;

/// Serialize `value` to pretty-printed JSON with a trailing newline,
/// creating parent directories.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let mut payload = serde_json::to_string_pretty(value).context("serialize json")?;
    payload.push('\n');
    fs::write(path, payload).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

fn task_file(dir: &Path, task_id: &str) -> PathBuf {
    dir.join(format!("{task_id}.json"))
}

/// Write the best terminal trace of a task, or the placeholder when the
/// search never reached a terminal state.
pub fn write_success(success_dir: &Path, task_id: &str, best: Option<&Trace>) -> Result<()> {
    let record = match best {
        Some(trace) => conversation::success_record(task_id, trace),
        None => conversation::placeholder(),
    };
    let path = task_file(success_dir, task_id);
    debug!(path = %path.display(), "writing success record");
    write_json(&path, &record)
}

/// Append the terminal paths observed during individual iterations to the
/// task's running iteration file.
pub fn append_iteration_successes(
    success_dir: &Path,
    task_id: &str,
    traces: &[Trace],
) -> Result<()> {
    if traces.is_empty() {
        return Ok(());
    }
    let path = success_dir.join(format!("{task_id}_iterations.json"));
    let mut records: Vec<Value> = if path.exists() {
        let contents =
            fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))?;
        serde_json::from_str(&contents).with_context(|| format!("parse {}", path.display()))?
    } else {
        Vec::new()
    };
    records.extend(conversation::iteration_records(task_id, traces));
    write_json(&path, &records)
}

/// Write the surviving failure traces of a task (placeholder when none
/// survived).
pub fn write_fail(fail_dir: &Path, task_id: &str, traces: &[Trace]) -> Result<()> {
    let record = if traces.is_empty() {
        conversation::placeholder()
    } else {
        conversation::fail_records(task_id, traces)
    };
    let path = task_file(fail_dir, task_id);
    debug!(path = %path.display(), "writing fail records");
    write_json(&path, &record)
}

/// Append filtered-out failure traces to the shared JSONL sink, one trace
/// per line.
pub fn append_useless(fail_dir: &Path, traces: &[Trace]) -> Result<()> {
    if traces.is_empty() {
        return Ok(());
    }
    fs::create_dir_all(fail_dir)
        .with_context(|| format!("create directory {}", fail_dir.display()))?;
    let path = fail_dir.join("useless_fail_trace.jsonl");
    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("open {}", path.display()))?;
    for trace in traces {
        let line = serde_json::to_string(trace).context("serialize trace")?;
        writeln!(file, "{line}").with_context(|| format!("append {}", path.display()))?;
    }
    Ok(())
}

/// Write the completed-task log: one task id per line.
pub fn write_completed_log(path: &Path, task_ids: &[String]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let mut contents = task_ids.join("\n");
    if !contents.is_empty() {
        contents.push('\n');
    }
    fs::write(path, contents).with_context(|| format!("write {}", path.display()))
}
