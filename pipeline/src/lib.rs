//! Two-stage driver for the MCTS data generator.
//!
//! Resolves a directory token from the command line and invokes the
//! `datagen` executable twice in strict sequence with fixed
//! hyperparameters. A failing stage is logged but never short-circuits
//! the remaining stages; the last stage's exit code becomes the driver's
//! exit code.

use std::env;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result};
use tracing::{info, warn};

/// Directory token used when the caller provides none.
pub const DEFAULT_DIRECTORY: &str = "IL_1";

/// Resolve the directory token from the optional positional argument.
pub fn resolve_directory(arg: Option<String>) -> String {
    arg.unwrap_or_else(|| DEFAULT_DIRECTORY.to_string())
}

/// One `datagen` invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub directory: String,
    pub log_file: String,
    pub fail_path: String,
    pub success_path: String,
    pub n_iteration: u32,
    pub depth_limit: u32,
}

impl Invocation {
    fn for_token(token: &str, n_iteration: u32, depth_limit: u32) -> Self {
        Self {
            directory: format!("data_webvoyager_training/{token}"),
            log_file: format!("result/{token}/completed_tasks.log"),
            fail_path: format!("result/{token}/fail"),
            success_path: format!("result/{token}/success"),
            n_iteration,
            depth_limit,
        }
    }

    /// Argument vector passed to the generator.
    pub fn to_args(&self) -> Vec<String> {
        vec![
            "--directory".to_string(),
            self.directory.clone(),
            "--log_file".to_string(),
            self.log_file.clone(),
            "--fail_path".to_string(),
            self.fail_path.clone(),
            "--success_path".to_string(),
            self.success_path.clone(),
            "--n_iteration".to_string(),
            self.n_iteration.to_string(),
            "--depth_limit".to_string(),
            self.depth_limit.to_string(),
        ]
    }
}

/// The two generation stages: a first pass over the resolved directory,
/// then a second pass over `optim_iter2` (always `optim_iter2`,
/// whatever the token) with a wider and deeper search.
pub fn stage_invocations(token: &str) -> [Invocation; 2] {
    [
        Invocation::for_token(token, 5, 10),
        Invocation::for_token("optim_iter2", 7, 15),
    ]
}

/// Locate the generator executable: a sibling of the running binary when
/// present, `PATH` lookup otherwise.
pub fn generator_program() -> PathBuf {
    env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join("datagen")))
        .filter(|path| path.exists())
        .unwrap_or_else(|| PathBuf::from("datagen"))
}

/// Run the stages in order and return the last stage's exit code.
pub fn run_stages(program: &Path, invocations: &[Invocation]) -> Result<i32> {
    let mut last_code = 0;
    for (idx, invocation) in invocations.iter().enumerate() {
        let stage = idx + 1;
        info!(stage, directory = %invocation.directory, "starting generation stage");
        let status = Command::new(program)
            .args(invocation.to_args())
            .status()
            .with_context(|| format!("spawn {}", program.display()))?;
        last_code = status.code().unwrap_or(1);
        if status.success() {
            info!(stage, "stage finished");
        } else {
            warn!(stage, exit_code = last_code, "stage failed, continuing");
        }
    }
    Ok(last_code)
}
