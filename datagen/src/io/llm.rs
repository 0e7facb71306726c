//! Agent backend abstraction.
//!
//! The [`LlmExec`] trait decouples the agent wrappers from the model
//! backend (currently `codex exec`). Tests use scripted backends that
//! write predetermined outputs without spawning processes.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use jsonschema::Draft;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::io::process::run_with_timeout;

/// Parameters for one agent invocation.
#[derive(Debug, Clone)]
pub struct LlmRequest {
    /// Prompt text fed to the agent on stdin.
    pub prompt: String,
    /// JSON Schema file constraining the agent output.
    pub schema_path: PathBuf,
    /// Path where the agent must write its output JSON.
    pub output_path: PathBuf,
    /// Maximum time to wait for the agent.
    pub timeout: Duration,
    /// Truncate agent stdout/stderr beyond this many bytes.
    pub output_limit_bytes: usize,
}

/// Abstraction over agent execution backends.
pub trait LlmExec {
    /// Run the agent. Must write output JSON to `request.output_path`.
    fn exec(&self, request: &LlmRequest) -> Result<()>;
}

/// Backend that spawns `codex exec`.
pub struct CodexLlm {
    program: String,
}

impl CodexLlm {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl LlmExec for CodexLlm {
    #[instrument(skip_all, fields(timeout_secs = request.timeout.as_secs()))]
    fn exec(&self, request: &LlmRequest) -> Result<()> {
        info!(output = %request.output_path.display(), "starting agent exec");

        if !request.schema_path.exists() {
            return Err(anyhow!(
                "missing output schema {}",
                request.schema_path.display()
            ));
        }
        if let Some(parent) = request.output_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create output dir {}", parent.display()))?;
        }

        let mut cmd = Command::new(&self.program);
        cmd.arg("exec")
            .arg("--skip-git-repo-check")
            .arg("--output-schema")
            .arg(&request.schema_path)
            .arg("--output-last-message")
            .arg(&request.output_path)
            .arg("-");

        let output = run_with_timeout(
            cmd,
            Some(request.prompt.as_bytes()),
            request.timeout,
            request.output_limit_bytes,
        )
        .context("run agent exec")?;

        if output.timed_out {
            warn!(timeout_secs = request.timeout.as_secs(), "agent exec timed out");
            return Err(anyhow!("agent exec timed out after {:?}", request.timeout));
        }
        if !output.status.success() {
            warn!(exit_code = ?output.status.code(), "agent exec failed");
            return Err(anyhow!(
                "agent exec failed with status {:?}: {}",
                output.status.code(),
                output.stderr_text()
            ));
        }

        debug!("agent exec completed successfully");
        Ok(())
    }
}

/// Execute the agent, validate its output against `schema`, and
/// deserialize it as `T`.
#[instrument(skip_all, fields(output_path = %request.output_path.display()))]
pub fn exec_and_load<L: LlmExec, T: DeserializeOwned>(
    llm: &L,
    request: &LlmRequest,
    schema: &str,
) -> Result<T> {
    llm.exec(request)?;
    if !request.output_path.exists() {
        return Err(anyhow!(
            "missing agent output {}",
            request.output_path.display()
        ));
    }
    let contents = fs::read_to_string(&request.output_path)
        .with_context(|| format!("read agent output {}", request.output_path.display()))?;
    let instance: Value = serde_json::from_str(&contents)
        .with_context(|| format!("parse {}", request.output_path.display()))?;
    let schema: Value = serde_json::from_str(schema).context("parse output schema")?;
    validate_schema(&instance, &schema)?;
    let value = serde_json::from_value(instance)
        .with_context(|| format!("decode {}", request.output_path.display()))?;
    Ok(value)
}

/// Validate a JSON instance against a JSON Schema (Draft 2020-12).
fn validate_schema(instance: &Value, schema: &Value) -> Result<()> {
    let compiled = jsonschema::options()
        .with_draft(Draft::Draft202012)
        .build(schema)
        .context("compile json schema")?;
    let messages: Vec<String> = compiled
        .iter_errors(instance)
        .map(|err| err.to_string())
        .collect();
    if !messages.is_empty() {
        bail!("schema validation failed:\n- {}", messages.join("\n- "));
    }
    Ok(())
}

/// Write an output schema file, creating parent directories.
pub fn write_output_schema(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create schema dir {}", parent.display()))?;
    }
    fs::write(path, contents).with_context(|| format!("write schema {}", path.display()))
}
