//! Action classification
//!
//! Comparing a declaration with the loaded state of its resource yields one
//! [`Action`]. The planner uses it to decide what to show and what to run;
//! nothing here touches the host.

use std::fmt;

/// Outcome of comparing desired and actual state for one resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    /// Current state already satisfies the target
    NoOp,
    /// The declaration was folded into another declaration of the same resource
    MergedAway,
    /// Only refreshable metadata differs
    Refresh,
    /// The target is present and differs from current state
    Reconfigure,
    /// The target requests absence and the resource exists
    Destroy,
}

/// Inputs to [`Action::classify`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Comparison {
    pub satisfied: bool,
    pub merged_away: bool,
    pub refresh_only: bool,
    pub current_absent: bool,
    pub target_absent: bool,
}

impl Action {
    /// Classify a comparison.
    pub fn classify(comparison: Comparison) -> Self {
        if comparison.merged_away {
            Self::MergedAway
        } else if comparison.satisfied {
            Self::NoOp
        } else if comparison.refresh_only {
            Self::Refresh
        } else if comparison.target_absent && !comparison.current_absent {
            Self::Destroy
        } else {
            Self::Reconfigure
        }
    }

    /// Whether this action requires a host mutation.
    pub fn is_actionable(self) -> bool {
        matches!(self, Self::Refresh | Self::Reconfigure | Self::Destroy)
    }

    /// Short marker used in diff output.
    pub fn marker(self) -> &'static str {
        match self {
            Self::NoOp => " ",
            Self::MergedAway => "=",
            Self::Refresh => "*",
            Self::Reconfigure => "~",
            Self::Destroy => "-",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NoOp => "no-op",
            Self::MergedAway => "merged-away",
            Self::Refresh => "refresh",
            Self::Reconfigure => "reconfigure",
            Self::Destroy => "destroy",
        };
        write!(f, "{name}")
    }
}

/// Count of planned actions by kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActionSummary {
    pub no_op: usize,
    pub merged_away: usize,
    pub refresh: usize,
    pub reconfigure: usize,
    pub destroy: usize,
}

impl ActionSummary {
    /// Count one action.
    pub fn record(&mut self, action: Action) {
        match action {
            Action::NoOp => self.no_op += 1,
            Action::MergedAway => self.merged_away += 1,
            Action::Refresh => self.refresh += 1,
            Action::Reconfigure => self.reconfigure += 1,
            Action::Destroy => self.destroy += 1,
        }
    }

    /// Number of actions that mutate the host.
    pub fn actionable(&self) -> usize {
        self.refresh + self.reconfigure + self.destroy
    }

    /// Total number of recorded actions
    pub fn total(&self) -> usize {
        self.actionable() + self.no_op + self.merged_away
    }
}

impl FromIterator<Action> for ActionSummary {
    fn from_iter<I: IntoIterator<Item = Action>>(iter: I) -> Self {
        let mut summary = Self::default();
        for action in iter {
            summary.record(action);
        }
        summary
    }
}
