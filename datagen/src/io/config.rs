//! Generator configuration, read from `datagen.toml` in the working
//! directory.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

/// Generator configuration (TOML).
///
/// The file is optional and intended to be edited by humans; missing
/// fields default to sensible values, so a partial file is fine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DatagenConfig {
    /// Page every search iteration starts from.
    pub homepage: String,

    /// UCB1 exploration weight.
    pub exploration_weight: f64,

    /// Vision score above which a state counts as terminal.
    pub matching_threshold: f64,

    /// Reward for a non-terminal step.
    pub step_reward: f64,

    /// Reward for reaching a terminal state.
    pub terminal_reward: f64,

    /// Wall-clock budget per agent invocation, in seconds.
    pub agent_timeout_secs: u64,

    /// Wall-clock budget per browser operation, in seconds.
    pub browser_timeout_secs: u64,

    /// Truncate subprocess stdout/stderr beyond this many bytes.
    pub output_limit_bytes: usize,

    /// How many failed edge replays may restart selection from the root.
    pub select_restart_budget: u32,

    /// Scratch directory for schemas, agent outputs, and browser sessions.
    pub state_dir: PathBuf,

    pub llm: LlmConfig,
    pub browser: BrowserConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LlmConfig {
    /// Executable spawned for agent invocations.
    pub program: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            program: "codex".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BrowserConfig {
    /// Driver command to execute for browser operations (e.g.
    /// `["browser-driver", "--headless"]`).
    pub command: Vec<String>,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            command: vec!["browser-driver".to_string()],
        }
    }
}

impl Default for DatagenConfig {
    fn default() -> Self {
        Self {
            homepage: "https://www.google.com".to_string(),
            exploration_weight: 1.0,
            matching_threshold: 0.85,
            step_reward: -0.01,
            terminal_reward: 1.0,
            agent_timeout_secs: 5 * 60,
            browser_timeout_secs: 2 * 60,
            output_limit_bytes: 100_000,
            select_restart_budget: 3,
            state_dir: PathBuf::from(".datagen"),
            llm: LlmConfig::default(),
            browser: BrowserConfig::default(),
        }
    }
}

impl DatagenConfig {
    pub fn validate(&self) -> Result<()> {
        if self.agent_timeout_secs == 0 {
            return Err(anyhow!("agent_timeout_secs must be > 0"));
        }
        if self.browser_timeout_secs == 0 {
            return Err(anyhow!("browser_timeout_secs must be > 0"));
        }
        if self.output_limit_bytes == 0 {
            return Err(anyhow!("output_limit_bytes must be > 0"));
        }
        if !(0.0..=1.0).contains(&self.matching_threshold) {
            return Err(anyhow!("matching_threshold must be within [0, 1]"));
        }
        if self.exploration_weight < 0.0 {
            return Err(anyhow!("exploration_weight must be >= 0"));
        }
        if self.browser.command.is_empty() || self.browser.command[0].trim().is_empty() {
            return Err(anyhow!("browser.command must be a non-empty array"));
        }
        if self.llm.program.trim().is_empty() {
            return Err(anyhow!("llm.program must be non-empty"));
        }
        Ok(())
    }

    pub fn agent_timeout(&self) -> Duration {
        Duration::from_secs(self.agent_timeout_secs)
    }

    pub fn browser_timeout(&self) -> Duration {
        Duration::from_secs(self.browser_timeout_secs)
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `DatagenConfig::default()`.
pub fn load_config(path: &Path) -> Result<DatagenConfig> {
    if !path.exists() {
        let cfg = DatagenConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: DatagenConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, DatagenConfig::default());
    }

    #[test]
    fn partial_files_keep_defaults_for_the_rest() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("datagen.toml");
        fs::write(
            &path,
            "homepage = \"https://start.test\"\n\n[browser]\ncommand = [\"drv\", \"--headless\"]\n",
        )
        .expect("write");

        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.homepage, "https://start.test");
        assert_eq!(cfg.browser.command, vec!["drv", "--headless"]);
        assert_eq!(cfg.matching_threshold, 0.85);
    }

    #[test]
    fn invalid_values_are_rejected() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("datagen.toml");
        fs::write(&path, "matching_threshold = 1.5\n").expect("write");
        let err = load_config(&path).unwrap_err();
        assert!(err.to_string().contains("matching_threshold"));

        fs::write(&path, "agent_timeout_secs = 0\n").expect("write");
        assert!(load_config(&path).is_err());
    }
}
