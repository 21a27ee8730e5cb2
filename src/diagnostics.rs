// ABOUTME: Diagnostics accumulator for non-fatal warnings during a run.
// ABOUTME: Collects warnings that shouldn't fail a run but should be shown to users.

/// Collects non-fatal warnings during a run.
#[derive(Default)]
pub struct Diagnostics {
    warnings: Vec<Warning>,
}

impl Diagnostics {
    /// Record a warning, auto-logging it via tracing.
    pub fn warn(&mut self, warning: Warning) {
        tracing::warn!("{}", warning.message);
        self.warnings.push(warning);
    }

    /// Get all collected warnings.
    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    /// Check if any warnings were collected.
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    pub fn count(&self, kind: WarningKind) -> usize {
        self.warnings.iter().filter(|w| w.kind == kind).count()
    }
}

/// A non-fatal warning collected during a run.
#[derive(Debug, Clone)]
pub struct Warning {
    pub kind: WarningKind,
    pub message: String,
}

impl Warning {
    /// A pre-check or post-check that did not pass.
    pub fn verification(message: impl Into<String>) -> Self {
        Self {
            kind: WarningKind::Verification,
            message: message.into(),
        }
    }

    /// Create a lock release warning.
    pub fn lock_release(message: impl Into<String>) -> Self {
        Self {
            kind: WarningKind::LockRelease,
            message: message.into(),
        }
    }

    /// A post-run or on-error hook that failed.
    pub fn hook(message: impl Into<String>) -> Self {
        Self {
            kind: WarningKind::Hook,
            message: message.into(),
        }
    }
}

/// Categories of warnings that can occur during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningKind {
    /// A check reported the provider in an unexpected state.
    Verification,
    /// Failed to release the run lock (lock file may remain).
    LockRelease,
    /// A non-fatal hook exited unsuccessfully.
    Hook,
}
