//! Fail-filter agent: decides whether a failed trajectory is still useful
//! as negative training data.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;

use crate::core::types::{FailFilterInput, FailFilterOutput};
use crate::io::llm::{LlmExec, LlmRequest, exec_and_load, write_output_schema};
use crate::io::prompt::PromptEngine;

const FAIL_FILTER_OUTPUT_SCHEMA: &str =
    include_str!("../../schemas/fail_filter_output.schema.json");

pub struct FailFilterAgent {
    schema_path: PathBuf,
    output_path: PathBuf,
    timeout: Duration,
    output_limit_bytes: usize,
}

impl FailFilterAgent {
    pub fn new(state_dir: &Path, timeout: Duration, output_limit_bytes: usize) -> Self {
        Self {
            schema_path: state_dir.join("schemas/fail_filter_output.schema.json"),
            output_path: state_dir.join("agents/fail_filter_output.json"),
            timeout,
            output_limit_bytes,
        }
    }

    pub fn run<L: LlmExec>(&self, llm: &L, input: &FailFilterInput) -> Result<FailFilterOutput> {
        write_output_schema(&self.schema_path, FAIL_FILTER_OUTPUT_SCHEMA)?;
        let prompt = PromptEngine::new().render_fail_filter(input)?;
        let request = LlmRequest {
            prompt,
            schema_path: self.schema_path.clone(),
            output_path: self.output_path.clone(),
            timeout: self.timeout,
            output_limit_bytes: self.output_limit_bytes,
        };
        exec_and_load(llm, &request, FAIL_FILTER_OUTPUT_SCHEMA)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedLlm;
    use serde_json::json;

    #[test]
    fn fail_filter_run_parses_scores() {
        let temp = tempfile::tempdir().expect("tempdir");
        let llm = ScriptedLlm::new(vec![json!({
            "thought": "coherent but incomplete",
            "repeatability": 0.0,
            "ineffectiveness": 0.1,
            "exploratory": 0.2,
            "logicality": 0.9,
            "is_useless": false
        })]);
        let agent = FailFilterAgent::new(temp.path(), Duration::from_secs(5), 1024);

        let output = agent
            .run(
                &llm,
                &FailFilterInput {
                    objective: "find the docs".to_string(),
                    completed_tasks: Vec::new(),
                    current_screenshot: "shots/2.png".to_string(),
                    done_description: "opened two unrelated pages".to_string(),
                },
            )
            .expect("run");

        assert!(output.keeps_trace());
        let requests = llm.requests.borrow();
        assert!(requests[0].prompt.contains("Filter Contract"));
    }
}
