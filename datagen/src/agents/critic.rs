//! Critic agent: describes what a trajectory has actually accomplished.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;

use crate::core::types::{CriticInput, CriticOutput};
use crate::io::llm::{LlmExec, LlmRequest, exec_and_load, write_output_schema};
use crate::io::prompt::PromptEngine;

const CRITIC_OUTPUT_SCHEMA: &str = include_str!("../../schemas/critic_output.schema.json");

pub struct CriticAgent {
    schema_path: PathBuf,
    output_path: PathBuf,
    timeout: Duration,
    output_limit_bytes: usize,
}

impl CriticAgent {
    pub fn new(state_dir: &Path, timeout: Duration, output_limit_bytes: usize) -> Self {
        Self {
            schema_path: state_dir.join("schemas/critic_output.schema.json"),
            output_path: state_dir.join("agents/critic_output.json"),
            timeout,
            output_limit_bytes,
        }
    }

    pub fn run<L: LlmExec>(&self, llm: &L, input: &CriticInput) -> Result<CriticOutput> {
        write_output_schema(&self.schema_path, CRITIC_OUTPUT_SCHEMA)?;
        let prompt = PromptEngine::new().render_critic(input)?;
        let request = LlmRequest {
            prompt,
            schema_path: self.schema_path.clone(),
            output_path: self.output_path.clone(),
            timeout: self.timeout,
            output_limit_bytes: self.output_limit_bytes,
        };
        exec_and_load(llm, &request, CRITIC_OUTPUT_SCHEMA)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedLlm;
    use serde_json::json;

    #[test]
    fn critic_run_parses_description_and_done_objective() {
        let temp = tempfile::tempdir().expect("tempdir");
        let llm = ScriptedLlm::new(vec![json!({
            "thought": "the search page is open",
            "description": "opened the search page",
            "done_objective": "open the search page"
        })]);
        let agent = CriticAgent::new(temp.path(), Duration::from_secs(5), 1024);

        let output = agent
            .run(
                &llm,
                &CriticInput {
                    history_completed_tasks: Vec::new(),
                    current_task: None,
                    current_screenshot: "shots/1.png".to_string(),
                },
            )
            .expect("run");

        assert_eq!(output.description, "opened the search page");
        assert_eq!(output.done_objective, "open the search page");
        let requests = llm.requests.borrow();
        assert!(requests[0].prompt.contains("Review Contract"));
    }
}
