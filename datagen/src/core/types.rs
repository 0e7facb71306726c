//! Shared domain types for search, agents, and artifact rendering.
//!
//! These types define stable contracts between the search core, the
//! agent layer, and the result writers. Their serialized form is part of
//! the product output (fine-tune records), so field names are load-bearing.

use serde::{Deserialize, Serialize};

/// A primitive browser action, discriminated by its `type` tag.
///
/// `mmid` is the numeric marker attribute stamped onto interactive DOM
/// elements by the page-annotation pass; agents address elements by it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Action {
    #[serde(rename = "GOTO_URL")]
    GotoUrl {
        website: String,
        timeout: Option<f64>,
    },
    #[serde(rename = "CLICK")]
    Click {
        mmid: u64,
        wait_before_execution: Option<f64>,
    },
    #[serde(rename = "TYPE")]
    Type { mmid: u64, content: String },
    #[serde(rename = "ENTER_TEXT_AND_CLICK")]
    EnterTextAndClick {
        text_element_mmid: u64,
        text_to_enter: String,
        click_element_mmid: u64,
        wait_before_click_execution: Option<f64>,
    },
    #[serde(rename = "HOVER")]
    Hover { mmid: u64 },
    #[serde(rename = "SCROLL")]
    Scroll { direction: String },
    #[serde(rename = "KEY_PRESS")]
    KeyPress { action_str: String },
    #[serde(rename = "NEW_TAB")]
    NewTab,
    #[serde(rename = "GO_BACK")]
    GoBack,
    #[serde(rename = "GO_FORWARD")]
    GoForward,
    #[serde(rename = "PAGE_CLOSE")]
    PageClose,
    #[serde(rename = "STOP")]
    Stop { answer: String },
}

impl Action {
    pub fn is_stop(&self) -> bool {
        matches!(self, Action::Stop { .. })
    }
}

/// One line of a task file: a question to answer on a website.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSpec {
    pub id: String,
    pub ques: String,
    pub web: String,
}

impl TaskSpec {
    /// The search objective fed to the agents.
    pub fn objective(&self) -> String {
        format!("{} {}", self.ques, self.web)
    }
}

/// An actor-proposed task together with the actions that accomplish it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskWithActions {
    pub id: i64,
    pub description: String,
    pub actions_to_be_performed: Vec<Action>,
    pub result: Option<String>,
}

impl TaskWithActions {
    /// True when the proposal is a bare STOP (the actor considers the
    /// objective reached).
    pub fn is_lone_stop(&self) -> bool {
        self.actions_to_be_performed.len() == 1 && self.actions_to_be_performed[0].is_stop()
    }
}

/// A candidate task scored by the critic/vision ranking pass.
/// Higher rank is better; rank doubles as the search's fast reward.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedAction {
    pub task_with_action: TaskWithActions,
    pub rank: f64,
}

/// Snapshot of the browser between actions, as seen by the search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrowserState {
    /// Interactive-element summary of the current page
    /// (`[mmid]: <tag> "label"` lines).
    pub web_text: String,
    /// Screenshot file for the current page.
    pub screenshot_path: String,
    pub current_url: String,
    /// The original task objective.
    pub objective: String,
    /// Critic's reformulation of what was actually accomplished.
    pub done_objective: String,
    pub completed_tasks: Vec<TaskWithActions>,
    /// Critic's description of the trajectory so far.
    pub done_description: String,
}

// Agent contracts. Inputs serialize into prompts (and, for the actor,
// into the fine-tune user message); outputs deserialize from
// schema-validated agent output files.

#[derive(Debug, Clone, Serialize)]
pub struct ActorInput {
    pub objective: String,
    pub completed_tasks: Vec<TaskWithActions>,
    pub current_web_text: String,
    pub current_screenshot: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ActorOutput {
    pub thought: String,
    pub proposed_tasks: Option<Vec<TaskWithActions>>,
    pub is_complete: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct CriticInput {
    pub history_completed_tasks: Vec<TaskWithActions>,
    pub current_task: Option<TaskWithActions>,
    pub current_screenshot: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CriticOutput {
    pub thought: String,
    pub description: String,
    pub done_objective: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct VisionInput {
    pub origin_instruction: String,
    pub done_description: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VisionOutput {
    pub thought: String,
    /// How well the described outcome matches the instruction, in [0, 1].
    pub matching_score: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct FailFilterInput {
    pub objective: String,
    pub completed_tasks: Vec<TaskWithActions>,
    pub current_screenshot: String,
    pub done_description: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FailFilterOutput {
    pub thought: String,
    pub repeatability: f64,
    pub ineffectiveness: f64,
    pub exploratory: f64,
    pub logicality: f64,
    pub is_useless: bool,
}

impl FailFilterOutput {
    /// A failure trace is only worth keeping when it is non-repetitive,
    /// effective, goal-directed, and logically coherent.
    pub fn keeps_trace(&self) -> bool {
        !(self.repeatability > 0.5
            || self.ineffectiveness > 0.5
            || self.exploratory > 0.5
            || self.logicality < 0.75
            || self.is_useless)
    }
}
