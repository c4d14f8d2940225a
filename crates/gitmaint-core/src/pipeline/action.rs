//! Actions and their legality rules.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::{MaintainError, Result, PRIMARY_SUFFIX};

/// Which branches an action runs across.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// Each local branch matching the targeting options.
    Targeted,
    /// Every branch published on the stable remote.
    AllStable,
    /// Once, not per branch.
    Global,
}

/// Static properties of an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionSpec {
    /// Fetch the stable remote before running.
    pub fetch: bool,
    /// Also fetch the validation remote.
    pub fetch_validation: bool,
    /// Check out each branch before running.
    pub checkout: bool,
    pub scope: Scope,
    /// Only legal on the primary suffix.
    pub primary_only: bool,
    pub help: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Cp,
    Steal,
    List,
    ListBranches,
    Merge,
    Pull,
    Push,
    Monitor,
    PushStable,
    MonitorStable,
    Reset,
    Release,
    Create,
    Delete,
    SubmitRelease,
}

impl Action {
    pub const ALL: [Action; 15] = [
        Action::Cp,
        Action::Steal,
        Action::List,
        Action::ListBranches,
        Action::Merge,
        Action::Pull,
        Action::Push,
        Action::Monitor,
        Action::PushStable,
        Action::MonitorStable,
        Action::Reset,
        Action::Release,
        Action::Create,
        Action::Delete,
        Action::SubmitRelease,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Action::Cp => "cp",
            Action::Steal => "steal",
            Action::List => "list",
            Action::ListBranches => "list_branches",
            Action::Merge => "merge",
            Action::Pull => "pull",
            Action::Push => "push",
            Action::Monitor => "monitor",
            Action::PushStable => "push_stable",
            Action::MonitorStable => "monitor_stable",
            Action::Reset => "reset",
            Action::Release => "release",
            Action::Create => "create",
            Action::Delete => "delete",
            Action::SubmitRelease => "submit_release",
        }
    }

    pub fn spec(self) -> ActionSpec {
        let targeted = |fetch: bool, checkout: bool, help: &'static str| ActionSpec {
            fetch,
            fetch_validation: false,
            checkout,
            scope: Scope::Targeted,
            primary_only: false,
            help,
        };
        match self {
            Action::Cp => targeted(false, true, "Backport the given commits"),
            Action::Steal => targeted(true, true, "Backport relevant upstream fixes"),
            Action::List => targeted(true, false, "List commits not yet on the stable branch"),
            Action::ListBranches => ActionSpec {
                scope: Scope::Global,
                ..targeted(false, false, "List local stable branches")
            },
            Action::Merge => targeted(false, true, "Merge another suffix into the branch"),
            Action::Pull => targeted(true, true, "Rebase onto the stable branch"),
            Action::Push => ActionSpec {
                fetch_validation: true,
                ..targeted(true, false, "Push to the validation remote")
            },
            Action::Monitor => targeted(false, false, "Show CI state of the validation branch"),
            Action::PushStable => ActionSpec {
                primary_only: true,
                ..targeted(true, false, "Push CI-validated branches to the stable remote")
            },
            Action::MonitorStable => targeted(true, false, "Show CI state of the stable branch"),
            Action::Reset => targeted(true, true, "Reset the branch to the stable branch"),
            Action::Release => ActionSpec {
                primary_only: true,
                ..targeted(false, true, "Tag a new release")
            },
            Action::Create => ActionSpec {
                scope: Scope::AllStable,
                ..targeted(true, false, "Create local branches for every stable branch")
            },
            Action::Delete => targeted(false, false, "Delete local or validation branches"),
            Action::SubmitRelease => ActionSpec {
                scope: Scope::Global,
                primary_only: true,
                ..targeted(true, false, "Push release tags to the stable remote")
            },
        }
    }

    /// Reject suffixes the action may not run on.
    pub fn check_suffix(self, suffix: &str, delete_remote: bool) -> Result<()> {
        if self.spec().primary_only && suffix != PRIMARY_SUFFIX {
            return Err(MaintainError::InvalidSuffix {
                action: self.name().to_string(),
                required: PRIMARY_SUFFIX.to_string(),
                suffix: suffix.to_string(),
            });
        }
        if self == Action::Delete && !delete_remote && suffix == PRIMARY_SUFFIX {
            return Err(MaintainError::InvalidAction(format!(
                "local '{PRIMARY_SUFFIX}' branches cannot be deleted, only their remote copies"
            )));
        }
        Ok(())
    }

    /// `name: help` lines for usage output.
    pub fn usage() -> Vec<String> {
        Action::ALL
            .iter()
            .map(|a| format!("{:<16}{}", a.name(), a.spec().help))
            .collect()
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Action {
    type Err = MaintainError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.replace('-', "_");
        Action::ALL
            .into_iter()
            .find(|a| a.name() == wanted)
            .ok_or_else(|| MaintainError::InvalidAction(s.to_string()))
    }
}
