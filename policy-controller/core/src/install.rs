/// The observed state of a single node's installer.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum InstallerOutcome {
    /// The installer has not reported an exit code yet.
    Running,
    Succeeded,
    Failed { exit_code: i32 },
}

/// The policy-wide result of collapsing every node's installer outcome.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Convergence {
    /// At least one installer is still running.
    InProgress,
    /// Every installer exited successfully.
    Installed,
    /// No installer is running and at least one exited with an error.
    Failed,
}

// === impl InstallerOutcome ===

impl InstallerOutcome {
    pub fn from_exit_code(exit_code: Option<i32>) -> Self {
        match exit_code {
            None => Self::Running,
            Some(0) => Self::Succeeded,
            Some(exit_code) => Self::Failed { exit_code },
        }
    }
}

/// Aggregates per-node outcomes.
///
/// Running installers take precedence over failed ones, which take precedence
/// over successes. An empty set of outcomes is [`Convergence::Installed`].
pub fn aggregate(outcomes: impl IntoIterator<Item = InstallerOutcome>) -> Convergence {
    let mut failed = false;
    for outcome in outcomes {
        match outcome {
            InstallerOutcome::Running => return Convergence::InProgress,
            InstallerOutcome::Failed { .. } => failed = true,
            InstallerOutcome::Succeeded => {}
        }
    }

    if failed {
        Convergence::Failed
    } else {
        Convergence::Installed
    }
}
