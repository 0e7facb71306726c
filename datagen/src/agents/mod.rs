//! Agent wrappers for the search policy and the failure filter.
//!
//! Each wrapper owns its output schema and scratch paths, renders its
//! prompt, invokes the [`crate::io::llm::LlmExec`] backend, and returns
//! the schema-validated output.

use std::path::Path;
use std::time::Duration;

pub mod actor;
pub mod critic;
pub mod fail_filter;
pub mod vision;

pub use actor::ActorAgent;
pub use critic::CriticAgent;
pub use fail_filter::FailFilterAgent;
pub use vision::VisionAgent;

/// The four agents a generation run needs, sharing scratch space and
/// invocation limits.
pub struct Agents {
    pub actor: ActorAgent,
    pub critic: CriticAgent,
    pub vision: VisionAgent,
    pub fail_filter: FailFilterAgent,
}

impl Agents {
    pub fn new(state_dir: &Path, timeout: Duration, output_limit_bytes: usize) -> Self {
        Self {
            actor: ActorAgent::new(state_dir, timeout, output_limit_bytes),
            critic: CriticAgent::new(state_dir, timeout, output_limit_bytes),
            vision: VisionAgent::new(state_dir, timeout, output_limit_bytes),
            fail_filter: FailFilterAgent::new(state_dir, timeout, output_limit_bytes),
        }
    }
}
