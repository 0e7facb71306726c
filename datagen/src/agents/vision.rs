//! Vision agent: scores a described outcome against the original
//! instruction.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;

use crate::core::types::{VisionInput, VisionOutput};
use crate::io::llm::{LlmExec, LlmRequest, exec_and_load, write_output_schema};
use crate::io::prompt::PromptEngine;

const VISION_OUTPUT_SCHEMA: &str = include_str!("../../schemas/vision_output.schema.json");

pub struct VisionAgent {
    schema_path: PathBuf,
    output_path: PathBuf,
    timeout: Duration,
    output_limit_bytes: usize,
}

impl VisionAgent {
    pub fn new(state_dir: &Path, timeout: Duration, output_limit_bytes: usize) -> Self {
        Self {
            schema_path: state_dir.join("schemas/vision_output.schema.json"),
            output_path: state_dir.join("agents/vision_output.json"),
            timeout,
            output_limit_bytes,
        }
    }

    pub fn run<L: LlmExec>(&self, llm: &L, input: &VisionInput) -> Result<VisionOutput> {
        write_output_schema(&self.schema_path, VISION_OUTPUT_SCHEMA)?;
        let prompt = PromptEngine::new().render_vision(input)?;
        let request = LlmRequest {
            prompt,
            schema_path: self.schema_path.clone(),
            output_path: self.output_path.clone(),
            timeout: self.timeout,
            output_limit_bytes: self.output_limit_bytes,
        };
        exec_and_load(llm, &request, VISION_OUTPUT_SCHEMA)
    }
}
