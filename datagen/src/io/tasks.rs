//! Task intake: JSONL files in the input directory.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::debug;

use crate::core::types::TaskSpec;

/// Load every task from the `*.jsonl` files directly under `dir`.
///
/// Files are visited in name order so runs are deterministic. Blank lines
/// are skipped; anything else that fails to parse aborts the load with
/// the offending file and line.
pub fn load_tasks(dir: &Path) -> Result<Vec<TaskSpec>> {
    let entries = fs::read_dir(dir).with_context(|| format!("read {}", dir.display()))?;
    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.extension().is_some_and(|ext| ext == "jsonl"))
        .collect();
    files.sort();
    debug!(files = files.len(), "scanning task directory");

    let mut tasks = Vec::new();
    for file in &files {
        let contents =
            fs::read_to_string(file).with_context(|| format!("read {}", file.display()))?;
        for (idx, line) in contents.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let task: TaskSpec = serde_json::from_str(line)
                .with_context(|| format!("parse {}:{}", file.display(), idx + 1))?;
            tasks.push(task);
        }
    }
    debug!(tasks = tasks.len(), "loaded tasks");
    Ok(tasks)
}
