//! MCTS data-generation CLI.
//!
//! Walks the JSONL task files in `--directory`, searches each task, and
//! writes success/failure fine-tune records plus a completed-task log.
//! Long flags use snake_case: this binary is invoked by orchestration
//! scripts that predate it.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use datagen::io::browser::CliBrowser;
use datagen::io::config::load_config;
use datagen::io::llm::CodexLlm;
use datagen::logging;
use datagen::run::{GenerateParams, generate};

#[derive(Parser)]
#[command(
    name = "datagen",
    version,
    about = "Generate MCTS fine-tune data for web tasks"
)]
struct Cli {
    /// Directory containing JSONL task files.
    #[arg(long)]
    directory: PathBuf,

    /// File receiving the ids of completed tasks.
    #[arg(long = "log_file")]
    log_file: PathBuf,

    /// Directory receiving failure-trace records.
    /// Defaults to `result/<directory-name>/fail`.
    #[arg(long = "fail_path")]
    fail_path: Option<PathBuf>,

    /// Directory receiving success records.
    /// Defaults to `result/<directory-name>/success`.
    #[arg(long = "success_path")]
    success_path: Option<PathBuf>,

    /// Search iterations per task.
    #[arg(long = "n_iteration", default_value_t = 8)]
    n_iteration: u32,

    /// Maximum search depth.
    #[arg(long = "depth_limit", default_value_t = 15)]
    depth_limit: u32,
}

impl Cli {
    fn into_params(self) -> GenerateParams {
        let token = self
            .directory
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "default".to_string());
        let fail_path = self
            .fail_path
            .unwrap_or_else(|| Path::new("result").join(&token).join("fail"));
        let success_path = self
            .success_path
            .unwrap_or_else(|| Path::new("result").join(&token).join("success"));
        GenerateParams {
            directory: self.directory,
            log_file: self.log_file,
            fail_path,
            success_path,
            n_iteration: self.n_iteration,
            depth_limit: self.depth_limit,
        }
    }
}

fn main() {
    logging::init();
    if let Err(err) = run() {
        eprintln!("{:#}", err);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(Path::new("datagen.toml")).context("load datagen.toml")?;
    let params = cli.into_params();

    let llm = CodexLlm::new(&config.llm.program);
    let driver = CliBrowser::new(
        config.browser.command.clone(),
        config.browser_timeout(),
        config.output_limit_bytes,
    );

    let summary = generate(&params, &config, &llm, &driver)?;
    info!(
        completed = summary.tasks_completed,
        total = summary.tasks_total,
        "run finished"
    );
    Ok(())
}
