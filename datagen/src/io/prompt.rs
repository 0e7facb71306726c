//! Prompt rendering for the agent invocations.

use anyhow::Result;
use minijinja::{Environment, context};

use crate::core::types::{ActorInput, CriticInput, FailFilterInput, VisionInput};

const ACTOR_TEMPLATE: &str = include_str!("prompts/actor.md");
const CRITIC_TEMPLATE: &str = include_str!("prompts/critic.md");
const VISION_TEMPLATE: &str = include_str!("prompts/vision.md");
const FAIL_FILTER_TEMPLATE: &str = include_str!("prompts/fail_filter.md");

/// Template engine wrapper around minijinja.
pub struct PromptEngine {
    env: Environment<'static>,
}

impl PromptEngine {
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.add_template("actor", ACTOR_TEMPLATE)
            .expect("actor template should be valid");
        env.add_template("critic", CRITIC_TEMPLATE)
            .expect("critic template should be valid");
        env.add_template("vision", VISION_TEMPLATE)
            .expect("vision template should be valid");
        env.add_template("fail_filter", FAIL_FILTER_TEMPLATE)
            .expect("fail filter template should be valid");
        Self { env }
    }

    pub fn render_actor(&self, input: &ActorInput) -> Result<String> {
        let template = self.env.get_template("actor")?;
        let rendered = template.render(context! {
            objective => input.objective,
            completed_tasks => serde_json::to_string_pretty(&input.completed_tasks)?,
            current_web_text => input.current_web_text,
            current_screenshot => input.current_screenshot,
        })?;
        Ok(rendered)
    }

    pub fn render_critic(&self, input: &CriticInput) -> Result<String> {
        let template = self.env.get_template("critic")?;
        let rendered = template.render(context! {
            history_completed_tasks => serde_json::to_string_pretty(&input.history_completed_tasks)?,
            current_task => input
                .current_task
                .as_ref()
                .map(|task| serde_json::to_string_pretty(task))
                .transpose()?,
            current_screenshot => input.current_screenshot,
        })?;
        Ok(rendered)
    }

    pub fn render_vision(&self, input: &VisionInput) -> Result<String> {
        let template = self.env.get_template("vision")?;
        let rendered = template.render(context! {
            origin_instruction => input.origin_instruction,
            done_description => input.done_description,
        })?;
        Ok(rendered)
    }

    pub fn render_fail_filter(&self, input: &FailFilterInput) -> Result<String> {
        let template = self.env.get_template("fail_filter")?;
        let rendered = template.render(context! {
            objective => input.objective,
            completed_tasks => serde_json::to_string_pretty(&input.completed_tasks)?,
            current_screenshot => input.current_screenshot,
            done_description => input.done_description,
        })?;
        Ok(rendered)
    }
}

impl Default for PromptEngine {
    fn default() -> Self {
        Self::new()
    }
}
