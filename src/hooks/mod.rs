// ABOUTME: Hooks system for run lifecycle events.
// ABOUTME: Discovers and executes scripts at pre-run, post-run, and on-error points.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

use crate::pipeline::{DeploymentContext, Strategy};

/// Hook execution points in a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookPoint {
    /// Before the first step. Failure aborts the run.
    PreRun,
    /// After a successful run. Failure logs warning.
    PostRun,
    /// After a failed run. Failure logs warning.
    OnError,
}

impl HookPoint {
    pub fn filename(&self) -> &'static str {
        match self {
            HookPoint::PreRun => "pre-run",
            HookPoint::PostRun => "post-run",
            HookPoint::OnError => "on-error",
        }
    }

    /// Whether failure at this hook point should abort the run.
    pub fn is_fatal(&self) -> bool {
        matches!(self, HookPoint::PreRun)
    }
}

/// Context passed to hooks via environment variables.
#[derive(Debug, Clone)]
pub struct HookContext {
    pub strategy: Strategy,
    pub deployment: DeploymentContext,
    /// Step that failed, for `on-error`.
    pub failed_step: Option<String>,
}

impl HookContext {
    pub fn new(strategy: Strategy, deployment: DeploymentContext) -> Self {
        Self {
            strategy,
            deployment,
            failed_step: None,
        }
    }

    pub fn with_failed_step(mut self, step: impl Into<String>) -> Self {
        self.failed_step = Some(step.into());
        self
    }

    pub fn to_env(&self) -> HashMap<String, String> {
        let d = &self.deployment;
        let mut env = HashMap::new();
        env.insert(
            "ROLLING_REPLACER_STRATEGY".to_string(),
            self.strategy.to_string(),
        );
        env.insert(
            "ROLLING_REPLACER_INACTIVE_GROUP".to_string(),
            d.inactive_group().to_string(),
        );
        env.insert(
            "ROLLING_REPLACER_INACTIVE_TARGET_GROUP".to_string(),
            d.inactive_target_group().to_string(),
        );
        env.insert(
            "ROLLING_REPLACER_NEW_GROUP".to_string(),
            d.new_group().to_string(),
        );
        env.insert(
            "ROLLING_REPLACER_NEW_TARGET_GROUP".to_string(),
            d.new_target_group().to_string(),
        );
        env.insert(
            "ROLLING_REPLACER_LOAD_BALANCER".to_string(),
            d.load_balancer().to_string(),
        );
        if let Some(ref step) = self.failed_step {
            env.insert("ROLLING_REPLACER_FAILED_STEP".to_string(), step.clone());
        }
        env
    }
}

/// Result of running a hook.
#[derive(Debug)]
pub struct HookResult {
    pub success: bool,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl HookResult {
    /// One-line summary for warnings and errors.
    pub fn describe(&self, point: HookPoint) -> String {
        let code = self
            .exit_code
            .map_or_else(|| "no exit code".to_string(), |c| format!("exit code {c}"));
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            format!("{} hook failed ({code})", point.filename())
        } else {
            format!("{} hook failed ({code}): {stderr}", point.filename())
        }
    }
}

/// Discovers and runs hooks from a project directory.
pub struct HookRunner {
    hooks_dir: PathBuf,
}

impl HookRunner {
    /// Look for hooks in `<project_dir>/.rolling-replacer/hooks`.
    pub fn new(project_dir: &Path) -> Self {
        Self {
            hooks_dir: project_dir.join(".rolling-replacer").join("hooks"),
        }
    }

    pub fn hook_exists(&self, point: HookPoint) -> bool {
        self.hook_path(point).is_file()
    }

    fn hook_path(&self, point: HookPoint) -> PathBuf {
        self.hooks_dir.join(point.filename())
    }

    /// Run a hook if it exists.
    ///
    /// Returns None if the hook doesn't exist, or Some(HookResult) if it was run.
    pub async fn run(&self, point: HookPoint, context: &HookContext) -> Option<HookResult> {
        let hook_path = self.hook_path(point);

        if !hook_path.is_file() {
            return None;
        }

        tracing::info!("running {} hook: {}", point.filename(), hook_path.display());

        let output = Command::new(&hook_path)
            .envs(context.to_env())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await;

        match output {
            Ok(output) => {
                let result = HookResult {
                    success: output.status.success(),
                    exit_code: output.status.code(),
                    stdout: String::from_utf8_lossy(&output.stdout).to_string(),
                    stderr: String::from_utf8_lossy(&output.stderr).to_string(),
                };

                if result.success {
                    tracing::info!("{} hook completed successfully", point.filename());
                } else {
                    tracing::warn!(
                        "{} hook failed with exit code {:?}",
                        point.filename(),
                        result.exit_code
                    );
                }

                Some(result)
            }
            Err(e) => {
                tracing::error!("failed to execute {} hook: {}", point.filename(), e);
                Some(HookResult {
                    success: false,
                    exit_code: None,
                    stdout: String::new(),
                    stderr: e.to_string(),
                })
            }
        }
    }
}
