//! Test-only helpers: canned domain values and scripted backends that
//! never spawn processes.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fs;
use std::path::Path;

use anyhow::{Result, anyhow};
use serde_json::Value;

use crate::core::types::BrowserState;
use crate::io::browser::{BrowserDriver, BrowserOp, PageView};
use crate::io::llm::{LlmExec, LlmRequest};

/// Deterministic browser state for a given URL.
pub fn browser_state(url: &str) -> BrowserState {
    BrowserState {
        web_text: format!("[1]: <a> \"{url}\""),
        screenshot_path: format!("shots/{url}.png"),
        current_url: url.to_string(),
        objective: "objective".to_string(),
        done_objective: String::new(),
        completed_tasks: Vec::new(),
        done_description: String::new(),
    }
}

/// Backend that pops canned outputs and writes them where the real agent
/// would, recording every request.
pub struct ScriptedLlm {
    outputs: RefCell<VecDeque<Value>>,
    pub requests: RefCell<Vec<LlmRequest>>,
}

impl ScriptedLlm {
    pub fn new(outputs: Vec<Value>) -> Self {
        Self {
            outputs: RefCell::new(outputs.into()),
            requests: RefCell::new(Vec::new()),
        }
    }
}

impl LlmExec for ScriptedLlm {
    fn exec(&self, request: &LlmRequest) -> Result<()> {
        self.requests.borrow_mut().push(request.clone());
        let output = self
            .outputs
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| anyhow!("scripted llm has no outputs left"))?;
        if let Some(parent) = request.output_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut buf = serde_json::to_string_pretty(&output)?;
        buf.push('\n');
        fs::write(&request.output_path, buf)?;
        Ok(())
    }
}

/// Driver that synthesizes a fresh page view per operation, recording
/// every op. Can be told to fail its next operations.
pub struct ScriptedBrowser {
    counter: Cell<u64>,
    fail_remaining: Cell<u32>,
    pub ops: RefCell<Vec<BrowserOp>>,
}

impl ScriptedBrowser {
    pub fn new() -> Self {
        Self {
            counter: Cell::new(0),
            fail_remaining: Cell::new(0),
            ops: RefCell::new(Vec::new()),
        }
    }

    /// Make the next `n` operations fail before the driver recovers.
    pub fn fail_next(&self, n: u32) {
        self.fail_remaining.set(n);
    }
}

impl Default for ScriptedBrowser {
    fn default() -> Self {
        Self::new()
    }
}

impl BrowserDriver for ScriptedBrowser {
    fn perform(&self, _session: &Path, op: &BrowserOp) -> Result<PageView> {
        self.ops.borrow_mut().push(op.clone());
        let failures = self.fail_remaining.get();
        if failures > 0 {
            self.fail_remaining.set(failures - 1);
            return Err(anyhow!("scripted browser failure"));
        }
        let n = self.counter.get();
        self.counter.set(n + 1);
        Ok(PageView {
            web_text: format!("[{}]: <a> \"link\"", n + 1),
            url: format!("https://scripted.test/page-{n}"),
            screenshot_path: format!("shots/page-{n}.png"),
        })
    }
}
