//! Actor agent: proposes candidate tasks for the current page.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;

use crate::core::types::{ActorInput, ActorOutput};
use crate::io::llm::{LlmExec, LlmRequest, exec_and_load, write_output_schema};
use crate::io::prompt::PromptEngine;

const ACTOR_OUTPUT_SCHEMA: &str = include_str!("../../schemas/actor_output.schema.json");

pub struct ActorAgent {
    schema_path: PathBuf,
    output_path: PathBuf,
    timeout: Duration,
    output_limit_bytes: usize,
}

impl ActorAgent {
    pub fn new(state_dir: &Path, timeout: Duration, output_limit_bytes: usize) -> Self {
        Self {
            schema_path: state_dir.join("schemas/actor_output.schema.json"),
            output_path: state_dir.join("agents/actor_output.json"),
            timeout,
            output_limit_bytes,
        }
    }

    pub fn run<L: LlmExec>(&self, llm: &L, input: &ActorInput) -> Result<ActorOutput> {
        write_output_schema(&self.schema_path, ACTOR_OUTPUT_SCHEMA)?;
        let prompt = PromptEngine::new().render_actor(input)?;
        let request = LlmRequest {
            prompt,
            schema_path: self.schema_path.clone(),
            output_path: self.output_path.clone(),
            timeout: self.timeout,
            output_limit_bytes: self.output_limit_bytes,
        };
        exec_and_load(llm, &request, ACTOR_OUTPUT_SCHEMA)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedLlm;
    use serde_json::json;

    #[test]
    fn actor_run_renders_prompt_and_parses_output() {
        let temp = tempfile::tempdir().expect("tempdir");
        let llm = ScriptedLlm::new(vec![json!({
            "thought": "start by opening the site",
            "proposed_tasks": [{
                "id": 1,
                "description": "open the site",
                "actions_to_be_performed": [
                    { "type": "GOTO_URL", "website": "https://a.test", "timeout": null }
                ],
                "result": null
            }],
            "is_complete": false
        })]);
        let agent = ActorAgent::new(temp.path(), Duration::from_secs(5), 1024);

        let output = agent
            .run(
                &llm,
                &ActorInput {
                    objective: "answer the question https://a.test".to_string(),
                    completed_tasks: Vec::new(),
                    current_web_text: "[1]: <a> \"start\"".to_string(),
                    current_screenshot: "shots/0.png".to_string(),
                },
            )
            .expect("run");

        assert!(!output.is_complete);
        let tasks = output.proposed_tasks.expect("tasks");
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].description, "open the site");

        let requests = llm.requests.borrow();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].prompt.contains("Proposal Contract"));
        assert!(requests[0].prompt.contains("answer the question"));
        assert!(agent.schema_path.exists());
    }
}
