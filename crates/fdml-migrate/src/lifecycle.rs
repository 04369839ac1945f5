//! Migration lifecycle state machine.
//!
//! Every migration id is `Pending` or `Applied` at rest. `Applying` and
//! `RollingBack` only exist while the engine is working on it.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationPhase {
    /// Not applied to the document.
    Pending,
    /// Up operations are running on a working copy.
    Applying,
    /// Recorded in the migration state.
    Applied,
    /// Down operations are running on a working copy.
    RollingBack,
}

impl MigrationPhase {
    /// Valid transitions from this phase.
    pub fn valid_transitions(&self) -> &'static [MigrationPhase] {
        use MigrationPhase::*;
        match self {
            Pending => &[Applying],
            // a failed apply returns to Pending
            Applying => &[Applied, Pending],
            Applied => &[RollingBack],
            // a failed rollback stays Applied
            RollingBack => &[Pending, Applied],
        }
    }

    pub fn can_transition_to(&self, target: MigrationPhase) -> bool {
        self.valid_transitions().contains(&target)
    }
}

impl fmt::Display for MigrationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MigrationPhase::Pending => write!(f, "PENDING"),
            MigrationPhase::Applying => write!(f, "APPLYING"),
            MigrationPhase::Applied => write!(f, "APPLIED"),
            MigrationPhase::RollingBack => write!(f, "ROLLING_BACK"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_path() {
        assert!(MigrationPhase::Pending.can_transition_to(MigrationPhase::Applying));
        assert!(MigrationPhase::Applying.can_transition_to(MigrationPhase::Applied));
        assert!(!MigrationPhase::Pending.can_transition_to(MigrationPhase::Applied));
    }

    #[test]
    fn rollback_path() {
        assert!(MigrationPhase::Applied.can_transition_to(MigrationPhase::RollingBack));
        assert!(MigrationPhase::RollingBack.can_transition_to(MigrationPhase::Pending));
        assert!(!MigrationPhase::Pending.can_transition_to(MigrationPhase::RollingBack));
        assert!(!MigrationPhase::Applied.can_transition_to(MigrationPhase::Applying));
    }
}
