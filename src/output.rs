// ABOUTME: Output formatting for CLI feedback.
// ABOUTME: Supports normal, quiet (CI), and JSON output modes.

use serde::Serialize;
use std::time::Instant;

use crate::pipeline::StepOutcome;

/// Output mode for CLI feedback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Human-friendly output with progress messages
    Normal,
    /// Minimal output for CI (only final result)
    Quiet,
    /// JSON lines for scripting
    Json,
}

/// Handles CLI output based on the configured mode.
pub struct Output {
    mode: OutputMode,
    start_time: Option<Instant>,
}

impl Output {
    pub fn new(mode: OutputMode) -> Self {
        Self {
            mode,
            start_time: None,
        }
    }

    /// Start timing an operation.
    pub fn start_timer(&mut self) {
        self.start_time = Some(Instant::now());
    }

    /// Get elapsed time since timer started.
    pub fn elapsed_secs(&self) -> f64 {
        self.start_time
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }

    fn duration(&self) -> Option<f64> {
        self.start_time.map(|_| self.elapsed_secs())
    }

    /// Print a progress message (suppressed in quiet/json mode).
    pub fn progress(&self, message: &str) {
        if self.mode == OutputMode::Normal {
            println!("{message}");
        }
    }

    pub fn step_started(&self, step: &str) {
        match self.mode {
            OutputMode::Normal => println!("  → {step}"),
            OutputMode::Quiet => {}
            OutputMode::Json => self.emit(&StepEvent {
                event: "step_started",
                step,
                check: None,
                ok: None,
                message: None,
            }),
        }
    }

    pub fn check(&self, step: &str, check: &str, outcome: &StepOutcome) {
        match self.mode {
            OutputMode::Normal => {
                let mark = if outcome.ok { "✓" } else { "!" };
                println!("    {mark} {check}: {}", outcome.message);
            }
            OutputMode::Quiet => {}
            OutputMode::Json => self.emit(&StepEvent {
                event: "check",
                step,
                check: Some(check),
                ok: Some(outcome.ok),
                message: Some(&outcome.message),
            }),
        }
    }

    pub fn step_passed(&self, step: &str) {
        match self.mode {
            OutputMode::Normal => println!("  ✓ {step}"),
            OutputMode::Quiet => {}
            OutputMode::Json => self.emit(&StepEvent {
                event: "step_passed",
                step,
                check: None,
                ok: Some(true),
                message: None,
            }),
        }
    }

    pub fn step_failed(&self, step: &str, reason: &str) {
        match self.mode {
            OutputMode::Normal => eprintln!("  ✗ {step}: {reason}"),
            OutputMode::Quiet => {}
            OutputMode::Json => self.emit(&StepEvent {
                event: "step_failed",
                step,
                check: None,
                ok: Some(false),
                message: Some(reason),
            }),
        }
    }

    /// Print a non-fatal warning (suppressed in quiet mode).
    pub fn warning(&self, message: &str) {
        match self.mode {
            OutputMode::Normal => eprintln!("Warning: {message}"),
            OutputMode::Quiet => {}
            OutputMode::Json => self.emit(&JsonEvent {
                event: "warning",
                message,
                duration_secs: None,
            }),
        }
    }

    /// Print a success message with optional timing.
    pub fn success(&self, message: &str) {
        match self.mode {
            OutputMode::Normal => {
                let elapsed = self.elapsed_secs();
                if elapsed > 0.0 {
                    println!("{message} ({:.1}s)", elapsed);
                } else {
                    println!("{message}");
                }
            }
            OutputMode::Quiet => {
                // Print only the essential result
                println!("{message}");
            }
            OutputMode::Json => self.emit(&JsonEvent {
                event: "success",
                message,
                duration_secs: self.duration(),
            }),
        }
    }

    /// Print an error message.
    pub fn error(&self, message: &str) {
        match self.mode {
            OutputMode::Normal | OutputMode::Quiet => {
                eprintln!("Error: {message}");
            }
            OutputMode::Json => {
                let event = JsonEvent {
                    event: "error",
                    message,
                    duration_secs: self.duration(),
                };
                if let Ok(json) = serde_json::to_string(&event) {
                    eprintln!("{json}");
                }
            }
        }
    }

    fn emit<T: Serialize>(&self, event: &T) {
        if let Ok(json) = serde_json::to_string(event) {
            println!("{json}");
        }
    }
}

#[derive(Serialize)]
struct JsonEvent<'a> {
    event: &'a str,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    duration_secs: Option<f64>,
}

#[derive(Serialize)]
struct StepEvent<'a> {
    event: &'a str,
    step: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    check: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    ok: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<&'a str>,
}
