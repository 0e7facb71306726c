//! The live-page side of the search: a browser-backed world model and an
//! agent-backed search policy.

use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::debug;

use crate::agents::Agents;
use crate::core::mcts::{SearchPolicy, StepScore, WorldModel};
use crate::core::types::{ActorInput, BrowserState, CriticInput, RankedAction, VisionInput};
use crate::io::browser::{BrowserDriver, BrowserOp, PageView, action_ops};
use crate::io::config::DatagenConfig;
use crate::io::llm::LlmExec;

/// Attempts per browser operation before the step is abandoned.
const ACTION_RETRIES: u32 = 3;

/// World model that executes actions in a driver session.
pub struct BrowserWorldModel<'a, D: BrowserDriver> {
    driver: &'a D,
    session: PathBuf,
    homepage: String,
    objective: String,
    retry_delay: Duration,
}

impl<'a, D: BrowserDriver> BrowserWorldModel<'a, D> {
    pub fn new(driver: &'a D, session: PathBuf, homepage: String, objective: String) -> Self {
        Self {
            driver,
            session,
            homepage,
            objective,
            retry_delay: Duration::from_secs(1),
        }
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    fn perform_with_retry(&self, op: &BrowserOp) -> Result<PageView> {
        let mut last_err = None;
        for attempt in 1..=ACTION_RETRIES {
            match self.driver.perform(&self.session, op) {
                Ok(view) => return Ok(view),
                Err(err) => {
                    debug!(attempt, %err, "browser op failed");
                    last_err = Some(err);
                    if attempt < ACTION_RETRIES {
                        thread::sleep(self.retry_delay);
                    }
                }
            }
        }
        Err(last_err.expect("at least one attempt ran"))
    }
}

impl<D: BrowserDriver> WorldModel for BrowserWorldModel<'_, D> {
    fn init_state(&mut self) -> Result<BrowserState> {
        let view = self
            .perform_with_retry(&BrowserOp::Navigate {
                url: self.homepage.clone(),
                timeout: None,
            })
            .context("open homepage")?;
        Ok(BrowserState {
            web_text: view.web_text,
            screenshot_path: view.screenshot_path,
            current_url: view.url,
            objective: self.objective.clone(),
            done_objective: self.objective.clone(),
            completed_tasks: Vec::new(),
            done_description: String::new(),
        })
    }

    fn begin_iteration(&mut self) -> Result<()> {
        self.perform_with_retry(&BrowserOp::Navigate {
            url: self.homepage.clone(),
            timeout: None,
        })
        .context("re-home session")?;
        Ok(())
    }

    fn step(&mut self, state: &BrowserState, action: &RankedAction) -> Result<BrowserState> {
        let task = &action.task_with_action;
        for primitive in &task.actions_to_be_performed {
            for op in action_ops(primitive)? {
                self.perform_with_retry(&op)
                    .with_context(|| format!("execute {op:?}"))?;
            }
        }
        let view = self
            .perform_with_retry(&BrowserOp::Observe)
            .context("observe page")?;

        let mut completed_tasks = state.completed_tasks.clone();
        completed_tasks.push(task.clone());
        Ok(BrowserState {
            web_text: view.web_text,
            screenshot_path: view.screenshot_path,
            current_url: view.url,
            objective: state.objective.clone(),
            done_objective: state.done_objective.clone(),
            completed_tasks,
            done_description: state.done_description.clone(),
        })
    }
}

/// Search policy backed by the actor/critic/vision agents.
pub struct WebPolicy<'a, L: LlmExec> {
    llm: &'a L,
    agents: &'a Agents,
    matching_threshold: f64,
    step_reward: f64,
    terminal_reward: f64,
}

impl<'a, L: LlmExec> WebPolicy<'a, L> {
    pub fn new(llm: &'a L, agents: &'a Agents, config: &DatagenConfig) -> Self {
        Self {
            llm,
            agents,
            matching_threshold: config.matching_threshold,
            step_reward: config.step_reward,
            terminal_reward: config.terminal_reward,
        }
    }
}

impl<L: LlmExec> SearchPolicy for WebPolicy<'_, L> {
    fn candidates(&mut self, state: &mut BrowserState) -> Result<Vec<RankedAction>> {
        let input = ActorInput {
            objective: state.objective.clone(),
            completed_tasks: state.completed_tasks.clone(),
            current_web_text: state.web_text.clone(),
            current_screenshot: state.screenshot_path.clone(),
        };
        let output = self.agents.actor.run(self.llm, &input)?;
        let proposed = output.proposed_tasks.unwrap_or_default();
        if output.is_complete {
            // Nothing left to explore: fold the final proposals into the
            // trajectory instead of branching on them.
            state.completed_tasks.extend(proposed);
            return Ok(Vec::new());
        }

        // The first critic description stands in for the whole candidate
        // set when the vision model scores goal fit.
        let mut description: Option<String> = None;
        let mut ranked = Vec::new();
        for task in proposed {
            let critic = self.agents.critic.run(
                self.llm,
                &CriticInput {
                    history_completed_tasks: state.completed_tasks.clone(),
                    current_task: Some(task.clone()),
                    current_screenshot: state.screenshot_path.clone(),
                },
            )?;
            let description = description.get_or_insert(critic.description).clone();
            let vision = self.agents.vision.run(
                self.llm,
                &VisionInput {
                    origin_instruction: state.objective.clone(),
                    done_description: description,
                },
            )?;
            if vision.matching_score > 0.0 {
                ranked.push(RankedAction {
                    task_with_action: task,
                    rank: vision.matching_score,
                });
            } else {
                debug!(task_id = task.id, "candidate scored zero, skipping");
            }
        }
        ranked.sort_by(|a, b| b.rank.total_cmp(&a.rank));
        Ok(ranked)
    }

    fn score(&mut self, state: &mut BrowserState) -> Result<StepScore> {
        let critic = self.agents.critic.run(
            self.llm,
            &CriticInput {
                history_completed_tasks: state.completed_tasks.clone(),
                current_task: None,
                current_screenshot: state.screenshot_path.clone(),
            },
        )?;
        state.done_objective = critic.done_objective;
        state.done_description = critic.description.clone();

        let vision = self.agents.vision.run(
            self.llm,
            &VisionInput {
                origin_instruction: state.objective.clone(),
                done_description: critic.description,
            },
        )?;
        let terminal = vision.matching_score > self.matching_threshold;
        debug!(score = vision.matching_score, terminal, "scored state");
        Ok(StepScore {
            reward: if terminal {
                self.terminal_reward
            } else {
                self.step_reward
            },
            terminal,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{Action, TaskWithActions};
    use crate::test_support::{ScriptedBrowser, ScriptedLlm, browser_state};
    use serde_json::json;

    fn ranked_click(id: i64) -> RankedAction {
        RankedAction {
            task_with_action: TaskWithActions {
                id,
                description: format!("click {id}"),
                actions_to_be_performed: vec![Action::Click {
                    mmid: id as u64,
                    wait_before_execution: None,
                }],
                result: None,
            },
            rank: 0.5,
        }
    }

    fn world<'a>(driver: &'a ScriptedBrowser) -> BrowserWorldModel<'a, ScriptedBrowser> {
        BrowserWorldModel::new(
            driver,
            PathBuf::from("session"),
            "https://home.test".to_string(),
            "objective https://home.test".to_string(),
        )
        .with_retry_delay(Duration::ZERO)
    }

    #[test]
    fn init_state_navigates_to_the_homepage() {
        let driver = ScriptedBrowser::new();
        let mut world = world(&driver);
        let state = world.init_state().expect("init");

        assert_eq!(state.objective, "objective https://home.test");
        assert_eq!(state.done_objective, state.objective);
        assert!(state.completed_tasks.is_empty());
        let ops = driver.ops.borrow();
        assert_eq!(ops.len(), 1);
        assert!(matches!(&ops[0], BrowserOp::Navigate { url, .. } if url == "https://home.test"));
    }

    #[test]
    fn step_executes_actions_then_observes_and_appends_the_task() {
        let driver = ScriptedBrowser::new();
        let mut world = world(&driver);
        let state = browser_state("https://home.test");

        let next = world.step(&state, &ranked_click(3)).expect("step");

        assert_eq!(next.completed_tasks.len(), 1);
        assert_eq!(next.completed_tasks[0].id, 3);
        let ops = driver.ops.borrow();
        assert!(matches!(ops[0], BrowserOp::Click { mmid: 3, .. }));
        assert_eq!(*ops.last().expect("ops"), BrowserOp::Observe);
    }

    #[test]
    fn transient_driver_failures_are_retried() {
        let driver = ScriptedBrowser::new();
        driver.fail_next(2);
        let mut world = world(&driver);
        let state = browser_state("https://home.test");

        world.step(&state, &ranked_click(3)).expect("step");
        // Two failed click attempts, one success, then the observe.
        assert_eq!(driver.ops.borrow().len(), 4);
    }

    #[test]
    fn persistent_driver_failures_surface_as_errors() {
        let driver = ScriptedBrowser::new();
        driver.fail_next(3);
        let mut world = world(&driver);
        let state = browser_state("https://home.test");

        let err = world.step(&state, &ranked_click(3)).unwrap_err();
        assert!(format!("{err:#}").contains("execute"));
    }

    fn policy_fixture() -> (tempfile::TempDir, Agents, DatagenConfig) {
        let temp = tempfile::tempdir().expect("tempdir");
        let agents = Agents::new(temp.path(), Duration::from_secs(5), 1024);
        (temp, agents, DatagenConfig::default())
    }

    fn actor_output(task_ids: &[i64]) -> serde_json::Value {
        let tasks: Vec<_> = task_ids
            .iter()
            .map(|id| {
                json!({
                    "id": id,
                    "description": format!("task {id}"),
                    "actions_to_be_performed": [
                        { "type": "CLICK", "mmid": id, "wait_before_execution": null }
                    ],
                    "result": null
                })
            })
            .collect();
        json!({ "thought": "t", "proposed_tasks": tasks, "is_complete": false })
    }

    fn critic_output(description: &str) -> serde_json::Value {
        json!({
            "thought": "t",
            "description": description,
            "done_objective": format!("did: {description}")
        })
    }

    fn vision_output(score: f64) -> serde_json::Value {
        json!({ "thought": "t", "matching_score": score })
    }

    #[test]
    fn candidates_are_ranked_by_matching_score() {
        let llm = ScriptedLlm::new(vec![
            actor_output(&[1, 2]),
            critic_output("went one way"),
            vision_output(0.3),
            critic_output("went another way"),
            vision_output(0.7),
        ]);
        let (_temp, agents, config) = policy_fixture();
        let mut policy = WebPolicy::new(&llm, &agents, &config);
        let mut state = browser_state("https://home.test");

        let ranked = policy.candidates(&mut state).expect("candidates");
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].task_with_action.id, 2);
        assert!((ranked[0].rank - 0.7).abs() < 1e-9);
    }

    #[test]
    fn zero_scored_candidates_are_dropped() {
        let llm = ScriptedLlm::new(vec![
            actor_output(&[1, 2]),
            critic_output("noop"),
            vision_output(0.0),
            critic_output("noop"),
            vision_output(0.4),
        ]);
        let (_temp, agents, config) = policy_fixture();
        let mut policy = WebPolicy::new(&llm, &agents, &config);
        let mut state = browser_state("https://home.test");

        let ranked = policy.candidates(&mut state).expect("candidates");
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].task_with_action.id, 2);
    }

    #[test]
    fn completion_folds_proposals_into_the_trajectory() {
        let llm = ScriptedLlm::new(vec![json!({
            "thought": "all done",
            "proposed_tasks": [{
                "id": 9,
                "description": "stop",
                "actions_to_be_performed": [ { "type": "STOP", "answer": "42" } ],
                "result": null
            }],
            "is_complete": true
        })]);
        let (_temp, agents, config) = policy_fixture();
        let mut policy = WebPolicy::new(&llm, &agents, &config);
        let mut state = browser_state("https://home.test");

        let ranked = policy.candidates(&mut state).expect("candidates");
        assert!(ranked.is_empty());
        assert_eq!(state.completed_tasks.len(), 1);
    }

    #[test]
    fn score_is_terminal_only_above_the_threshold() {
        let llm = ScriptedLlm::new(vec![
            critic_output("landed on the answer page"),
            vision_output(0.86),
            critic_output("landed somewhere else"),
            vision_output(0.85),
        ]);
        let (_temp, agents, config) = policy_fixture();
        let mut policy = WebPolicy::new(&llm, &agents, &config);

        let mut state = browser_state("https://home.test");
        let score = policy.score(&mut state).expect("score");
        assert!(score.terminal);
        assert_eq!(score.reward, 1.0);
        assert_eq!(state.done_description, "landed on the answer page");
        assert_eq!(state.done_objective, "did: landed on the answer page");

        // 0.85 is not strictly greater than the threshold.
        let mut state = browser_state("https://home.test");
        let score = policy.score(&mut state).expect("score");
        assert!(!score.terminal);
        assert_eq!(score.reward, -0.01);
    }
}
