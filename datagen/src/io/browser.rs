//! Browser driver abstraction.
//!
//! Page automation is delegated to an external driver executable: one
//! subprocess per operation, operation JSON on stdin, the resulting page
//! view on stdout. The [`BrowserDriver`] trait isolates this so tests use
//! scripted drivers that never spawn processes.

use std::path::Path;
use std::process::Command;
use std::sync::LazyLock;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::core::types::Action;
use crate::io::process::run_with_timeout;

/// One primitive operation the driver understands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum BrowserOp {
    Navigate {
        url: String,
        timeout: Option<f64>,
    },
    Click {
        mmid: u64,
        wait_before: Option<f64>,
    },
    TypeText {
        mmid: u64,
        text: String,
    },
    EnterTextAndClick {
        text_mmid: u64,
        text: String,
        click_mmid: u64,
        wait_before_click: Option<f64>,
    },
    Hover {
        mmid: u64,
    },
    Scroll {
        direction: ScrollDirection,
    },
    KeyPress {
        keys: String,
    },
    NewTab,
    GoBack,
    GoForward,
    PageClose,
    /// Read the current page without acting on it.
    Observe,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScrollDirection {
    Up,
    Down,
}

/// What the driver reports back after every operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageView {
    /// Interactive-element summary of the page.
    pub web_text: String,
    pub url: String,
    pub screenshot_path: String,
}

/// Abstraction over browser automation backends.
pub trait BrowserDriver {
    /// Perform `op` in the session rooted at `session` and return the
    /// resulting page view.
    fn perform(&self, session: &Path, op: &BrowserOp) -> Result<PageView>;
}

/// Driver that spawns the configured executable once per operation.
pub struct CliBrowser {
    command: Vec<String>,
    timeout: Duration,
    output_limit_bytes: usize,
}

impl CliBrowser {
    pub fn new(command: Vec<String>, timeout: Duration, output_limit_bytes: usize) -> Self {
        Self {
            command,
            timeout,
            output_limit_bytes,
        }
    }
}

impl BrowserDriver for CliBrowser {
    #[instrument(skip_all, fields(session = %session.display()))]
    fn perform(&self, session: &Path, op: &BrowserOp) -> Result<PageView> {
        let (program, args) = self
            .command
            .split_first()
            .ok_or_else(|| anyhow!("browser command is empty"))?;
        let mut cmd = Command::new(program);
        cmd.args(args).arg(session);

        let payload = serde_json::to_vec(op).context("serialize browser op")?;
        let output = run_with_timeout(cmd, Some(&payload), self.timeout, self.output_limit_bytes)
            .context("run browser driver")?;

        if output.timed_out {
            warn!("browser driver timed out");
            return Err(anyhow!("browser driver timed out after {:?}", self.timeout));
        }
        if !output.status.success() {
            warn!(exit_code = ?output.status.code(), "browser driver failed");
            return Err(anyhow!(
                "browser driver failed with status {:?}: {}",
                output.status.code(),
                output.stderr_text()
            ));
        }

        let view: PageView =
            serde_json::from_slice(&output.stdout).context("parse driver page view")?;
        debug!(url = %view.url, "browser op finished");
        Ok(view)
    }
}

/// Translate a domain action into driver operations.
///
/// STOP produces no operations: it only marks the trajectory end.
pub fn action_ops(action: &Action) -> Result<Vec<BrowserOp>> {
    let ops = match action {
        Action::GotoUrl { website, timeout } => vec![BrowserOp::Navigate {
            url: website.clone(),
            timeout: *timeout,
        }],
        Action::Click {
            mmid,
            wait_before_execution,
        } => vec![BrowserOp::Click {
            mmid: *mmid,
            wait_before: *wait_before_execution,
        }],
        Action::Type { mmid, content } => vec![BrowserOp::TypeText {
            mmid: *mmid,
            text: content.clone(),
        }],
        Action::EnterTextAndClick {
            text_element_mmid,
            text_to_enter,
            click_element_mmid,
            wait_before_click_execution,
        } => vec![BrowserOp::EnterTextAndClick {
            text_mmid: *text_element_mmid,
            text: text_to_enter.clone(),
            click_mmid: *click_element_mmid,
            wait_before_click: *wait_before_click_execution,
        }],
        Action::Hover { mmid } => vec![BrowserOp::Hover { mmid: *mmid }],
        Action::Scroll { direction } => vec![BrowserOp::Scroll {
            direction: if direction.contains("up") {
                ScrollDirection::Up
            } else {
                ScrollDirection::Down
            },
        }],
        Action::KeyPress { action_str } => vec![BrowserOp::KeyPress {
            keys: parse_key_combo(action_str)?,
        }],
        Action::NewTab => vec![BrowserOp::NewTab],
        Action::GoBack => vec![BrowserOp::GoBack],
        Action::GoForward => vec![BrowserOp::GoForward],
        Action::PageClose => vec![BrowserOp::PageClose],
        Action::Stop { .. } => Vec::new(),
    };
    Ok(ops)
}

/// Keys whose driver spelling differs from a plain lowercase token.
const SPECIAL_KEYS: &[(&str, &str)] = &[
    ("backquote", "Backquote"),
    ("minus", "Minus"),
    ("equal", "Equal"),
    ("backslash", "Backslash"),
    ("backspace", "Backspace"),
    ("meta", "Meta"),
    ("tab", "Tab"),
    ("delete", "Delete"),
    ("escape", "Escape"),
    ("arrowdown", "ArrowDown"),
    ("arrowup", "ArrowUp"),
    ("arrowright", "ArrowRight"),
    ("arrowleft", "ArrowLeft"),
    ("end", "End"),
    ("enter", "Enter"),
    ("home", "Home"),
    ("insert", "Insert"),
    ("pagedown", "PageDown"),
    ("pageup", "PageUp"),
];

/// Parse a `press [Control+Shift+T]` action string into the key combo the
/// driver expects.
fn parse_key_combo(action_str: &str) -> Result<String> {
    static PRESS_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"press ?\[(.+)\]").expect("press pattern is valid"));

    let Some(caps) = PRESS_RE.captures(action_str) else {
        bail!("invalid press action {action_str:?}");
    };
    let combo = caps
        .get(1)
        .expect("press pattern has one capture group")
        .as_str();
    let mapped: Vec<String> = combo
        .split('+')
        .map(|key| {
            let lower = key.to_lowercase();
            if lower.starts_with('f') && lower[1..].parse::<u8>().is_ok() {
                return lower.to_uppercase();
            }
            SPECIAL_KEYS
                .iter()
                .find(|(from, _)| *from == lower)
                .map(|(_, to)| (*to).to_string())
                .unwrap_or_else(|| key.to_string())
        })
        .collect();
    Ok(mapped.join("+"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stop_maps_to_no_ops() {
        let ops = action_ops(&Action::Stop {
            answer: "42".to_string(),
        })
        .expect("map");
        assert!(ops.is_empty());
    }

    #[test]
    fn scroll_direction_defaults_to_down() {
        let up = action_ops(&Action::Scroll {
            direction: "scroll up".to_string(),
        })
        .expect("map");
        assert_eq!(
            up,
            vec![BrowserOp::Scroll {
                direction: ScrollDirection::Up
            }]
        );

        let down = action_ops(&Action::Scroll {
            direction: "further".to_string(),
        })
        .expect("map");
        assert_eq!(
            down,
            vec![BrowserOp::Scroll {
                direction: ScrollDirection::Down
            }]
        );
    }

    #[test]
    fn key_combos_map_special_keys() {
        let ops = action_ops(&Action::KeyPress {
            action_str: "press [control+enter]".to_string(),
        })
        .expect("map");
        assert_eq!(
            ops,
            vec![BrowserOp::KeyPress {
                keys: "control+Enter".to_string()
            }]
        );
    }

    #[test]
    fn function_keys_are_uppercased() {
        let ops = action_ops(&Action::KeyPress {
            action_str: "press[f5]".to_string(),
        })
        .expect("map");
        assert_eq!(
            ops,
            vec![BrowserOp::KeyPress {
                keys: "F5".to_string()
            }]
        );
    }

    #[test]
    fn malformed_press_strings_are_rejected() {
        let err = action_ops(&Action::KeyPress {
            action_str: "mash the keyboard".to_string(),
        })
        .unwrap_err();
        assert!(err.to_string().contains("invalid press action"));
    }

    #[test]
    fn ops_serialize_with_op_tag() {
        let value = serde_json::to_value(BrowserOp::Navigate {
            url: "https://example.com".to_string(),
            timeout: Some(1.0),
        })
        .expect("serialize");
        assert_eq!(value["op"], "navigate");
        assert_eq!(value["url"], "https://example.com");
    }
}
