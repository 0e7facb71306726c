//! Fine-tune record rendering.
//!
//! Turns search traces into the `{"id", "conversations", "images"}`
//! records consumed by the downstream training stack. Every record opens
//! with the planner system prompt; each trajectory step contributes a
//! user message (the planner input for the state, with the screenshot
//! replaced by an `<image>` marker) and an assistant message (the chosen
//! task and its actions).

use serde::Serialize;
use serde_json::{Value, json};

use crate::core::mcts::Trace;
use crate::core::types::{BrowserState, TaskWithActions};

/// System prompt stamped into every conversation record.
pub const SYSTEM_PROMPT: &str = include_str!("finetune_system.md");

/// Placeholder written when a search produced no usable trajectory.
pub fn placeholder() -> Value {
    json!({ "debug": "No valid path found" })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    pub from: String,
    pub value: String,
}

impl Message {
    fn new(from: &str, value: String) -> Self {
        Self {
            from: from.to_string(),
            value,
        }
    }
}

/// Planner input as it appears in the user turn. The screenshot is
/// deliberately absent; the `<image>` marker stands in for it.
#[derive(Serialize)]
struct UserTurn<'a> {
    objective: &'a str,
    completed_tasks: &'a [TaskWithActions],
    current_web_text: &'a str,
}

fn step_messages(state: &BrowserState, response: &TaskWithActions, objective: &str) -> Vec<Message> {
    let turn = UserTurn {
        objective,
        completed_tasks: &state.completed_tasks,
        current_web_text: &state.web_text,
    };
    let user = serde_json::to_string(&turn).expect("planner input serializes");
    let assistant = serde_json::to_string(response).expect("task serializes");
    vec![
        Message::new("user", format!("{user}\n<image>")),
        Message::new("assistant", assistant),
    ]
}

fn conversation(trace: &Trace, objective: Option<&str>) -> (Vec<Message>, Vec<String>) {
    let mut messages = vec![Message::new("system", SYSTEM_PROMPT.to_string())];
    let mut images = Vec::new();
    for (state, action) in trace.states.iter().zip(trace.actions.iter()) {
        let objective = objective.unwrap_or(state.objective.as_str());
        messages.extend(step_messages(state, &action.task_with_action, objective));
        images.push(state.screenshot_path.clone());
    }
    (messages, images)
}

/// Record for the best terminal trajectory of a task.
pub fn success_record(task_id: &str, trace: &Trace) -> Value {
    let (messages, images) = conversation(trace, None);
    json!({
        "id": task_id,
        "conversations": messages,
        "images": images,
    })
}

/// Records for the surviving failure trajectories of a task. The stated
/// objective is rewritten to what the trajectory actually accomplished,
/// so the pair still reads as a consistent demonstration.
pub fn fail_records(task_id: &str, traces: &[Trace]) -> Value {
    let records: Vec<Value> = traces
        .iter()
        .enumerate()
        .map(|(j, trace)| {
            let done_objective = trace
                .states
                .last()
                .map(|state| state.done_objective.clone())
                .unwrap_or_default();
            let (messages, images) = conversation(trace, Some(&done_objective));
            json!({
                "id": format!("{task_id}_{j}"),
                "conversations": messages,
                "images": images,
            })
        })
        .collect();
    Value::Array(records)
}

/// Records for the terminal paths observed during individual iterations.
pub fn iteration_records(task_id: &str, traces: &[Trace]) -> Vec<Value> {
    traces
        .iter()
        .enumerate()
        .map(|(i, trace)| {
            let (messages, images) = conversation(trace, None);
            json!({
                "id": format!("{task_id}_success_iter_{i}"),
                "conversations": messages,
                "images": images,
            })
        })
        .collect()
}
