//! Full generation run over a task directory.

use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::agents::Agents;
use crate::core::mcts::{Mcts, SearchParams, Trace};
use crate::core::types::{FailFilterInput, TaskSpec};
use crate::io::browser::BrowserDriver;
use crate::io::config::DatagenConfig;
use crate::io::llm::LlmExec;
use crate::io::results::{
    append_iteration_successes, append_useless, write_completed_log, write_fail, write_success,
};
use crate::io::tasks::load_tasks;
use crate::world::{BrowserWorldModel, WebPolicy};

/// Run parameters, straight from the CLI.
#[derive(Debug, Clone)]
pub struct GenerateParams {
    /// Directory containing JSONL task files.
    pub directory: PathBuf,
    /// File receiving the ids of completed tasks.
    pub log_file: PathBuf,
    /// Directory receiving failure-trace records.
    pub fail_path: PathBuf,
    /// Directory receiving success records.
    pub success_path: PathBuf,
    /// Search iterations per task.
    pub n_iteration: u32,
    /// Maximum search depth.
    pub depth_limit: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub tasks_total: usize,
    pub tasks_completed: usize,
}

/// Run the search over every task in the directory, writing artifacts as
/// each task finishes.
///
/// The completed-task log is written on every exit path: a task that
/// errors aborts the run, but the ids completed before it are still
/// recorded before the error propagates.
pub fn generate<L: LlmExec, D: BrowserDriver>(
    params: &GenerateParams,
    config: &DatagenConfig,
    llm: &L,
    driver: &D,
) -> Result<RunSummary> {
    let tasks = load_tasks(&params.directory)
        .with_context(|| format!("load tasks from {}", params.directory.display()))?;
    info!(tasks = tasks.len(), directory = %params.directory.display(), "starting run");

    let agents = Agents::new(
        &config.state_dir,
        config.agent_timeout(),
        config.output_limit_bytes,
    );

    let mut completed = Vec::new();
    let mut failure = None;
    for task in &tasks {
        info!(task_id = %task.id, "running task");
        match run_task(task, params, config, &agents, llm, driver) {
            Ok(()) => completed.push(task.id.clone()),
            Err(err) => {
                warn!(task_id = %task.id, "task failed, aborting run");
                failure = Some(err.context(format!("task {}", task.id)));
                break;
            }
        }
    }

    write_completed_log(&params.log_file, &completed)
        .with_context(|| format!("write completed-task log {}", params.log_file.display()))?;

    if let Some(err) = failure {
        return Err(err);
    }
    Ok(RunSummary {
        tasks_total: tasks.len(),
        tasks_completed: completed.len(),
    })
}

fn run_task<L: LlmExec, D: BrowserDriver>(
    task: &TaskSpec,
    params: &GenerateParams,
    config: &DatagenConfig,
    agents: &Agents,
    llm: &L,
    driver: &D,
) -> Result<()> {
    let session = config.state_dir.join("sessions").join(&task.id);
    let mut world = BrowserWorldModel::new(
        driver,
        session,
        config.homepage.clone(),
        task.objective(),
    );
    let mut policy = WebPolicy::new(llm, agents, config);
    let mut mcts = Mcts::new(SearchParams {
        n_iterations: params.n_iteration,
        depth_limit: params.depth_limit,
        exploration_weight: config.exploration_weight,
        select_restart_budget: config.select_restart_budget,
    });

    let outcome = mcts.search(&mut world, &mut policy)?;
    info!(
        successes = outcome.iteration_successes.len(),
        failures = outcome.fail_traces.len(),
        cum_reward = outcome.cum_reward,
        "search finished"
    );

    write_success(&params.success_path, &task.id, outcome.traces.first())?;
    append_iteration_successes(&params.success_path, &task.id, &outcome.iteration_successes)?;

    let (kept, useless) = filter_fail_traces(task, outcome.fail_traces, agents, llm)?;
    write_fail(&params.fail_path, &task.id, &kept)?;
    append_useless(&params.fail_path, &useless)?;
    Ok(())
}

/// Split failure traces into ones worth keeping as negative data and ones
/// the filter agent rejects.
fn filter_fail_traces<L: LlmExec>(
    task: &TaskSpec,
    traces: Vec<Trace>,
    agents: &Agents,
    llm: &L,
) -> Result<(Vec<Trace>, Vec<Trace>)> {
    let mut kept = Vec::new();
    let mut useless = Vec::new();
    for trace in traces {
        let Some(last) = trace.states.last() else {
            continue;
        };
        let verdict = agents.fail_filter.run(
            llm,
            &FailFilterInput {
                objective: last.done_objective.clone(),
                completed_tasks: last.completed_tasks.clone(),
                current_screenshot: last.screenshot_path.clone(),
                done_description: last.done_description.clone(),
            },
        )?;
        if verdict.keeps_trace() {
            kept.push(trace);
        } else {
            info!(task_id = %task.id, "fail trace filtered out");
            useless.push(trace);
        }
    }
    Ok((kept, useless))
}
