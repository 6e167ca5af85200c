//! Lease status automaton
//!
//! ```text
//! Acquiring -> Acquired       (provisioning succeeded within budget)
//! Acquiring -> Failed         (unrecoverable error before/at provisioning)
//! Acquiring -> SashiTimeout   (budget exceeded before or during provisioning)
//! Acquired  -> Expired        (expiry sweep destroyed the resource)
//! ```
//!
//! `Acquiring` is the only initial state. `Failed`, `Expired` and `SashiTimeout`
//! are terminal.

use serde::{Deserialize, Serialize};

/// Status of a lease record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LeaseStatus {
    /// Record created, provisioning not yet finished
    Acquiring,
    /// Resource provisioned and tracked for expiry
    Acquired,
    /// Provisioning failed
    Failed,
    /// Resource destroyed after the paid duration elapsed
    Expired,
    /// Acquisition budget exceeded
    SashiTimeout,
}

impl LeaseStatus {
    pub const ALL: [LeaseStatus; 5] = [
        LeaseStatus::Acquiring,
        LeaseStatus::Acquired,
        LeaseStatus::Failed,
        LeaseStatus::Expired,
        LeaseStatus::SashiTimeout,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LeaseStatus::Acquiring => "Acquiring",
            LeaseStatus::Acquired => "Acquired",
            LeaseStatus::Failed => "Failed",
            LeaseStatus::Expired => "Expired",
            LeaseStatus::SashiTimeout => "SashiTimeout",
        }
    }

    /// Whether the automaton permits moving from `self` to `target`
    pub fn can_transition_to(&self, target: LeaseStatus) -> bool {
        matches!(
            (self, target),
            (LeaseStatus::Acquiring, LeaseStatus::Acquired)
                | (LeaseStatus::Acquiring, LeaseStatus::Failed)
                | (LeaseStatus::Acquiring, LeaseStatus::SashiTimeout)
                | (LeaseStatus::Acquired, LeaseStatus::Expired)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            LeaseStatus::Failed | LeaseStatus::Expired | LeaseStatus::SashiTimeout
        )
    }
}

impl std::fmt::Display for LeaseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for LeaseStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Acquiring" => Ok(LeaseStatus::Acquiring),
            "Acquired" => Ok(LeaseStatus::Acquired),
            "Failed" => Ok(LeaseStatus::Failed),
            "Expired" => Ok(LeaseStatus::Expired),
            "SashiTimeout" => Ok(LeaseStatus::SashiTimeout),
            _ => Err(format!("Invalid lease status: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn any_status() -> impl Strategy<Value = LeaseStatus> {
        prop::sample::select(LeaseStatus::ALL.to_vec())
    }

    #[test]
    fn test_permitted_transitions() {
        assert!(LeaseStatus::Acquiring.can_transition_to(LeaseStatus::Acquired));
        assert!(LeaseStatus::Acquiring.can_transition_to(LeaseStatus::Failed));
        assert!(LeaseStatus::Acquiring.can_transition_to(LeaseStatus::SashiTimeout));
        assert!(LeaseStatus::Acquired.can_transition_to(LeaseStatus::Expired));
    }

    #[test]
    fn test_expired_only_from_acquired() {
        assert!(!LeaseStatus::Acquiring.can_transition_to(LeaseStatus::Expired));
        for status in LeaseStatus::ALL {
            if status != LeaseStatus::Acquired {
                assert!(!status.can_transition_to(LeaseStatus::Expired));
            }
        }
    }

    #[test]
    fn test_status_round_trip_through_str() {
        for status in LeaseStatus::ALL {
            assert_eq!(status.as_str().parse::<LeaseStatus>().unwrap(), status);
        }
        assert!("acquired".parse::<LeaseStatus>().is_err());
    }

    #[test]
    fn test_serde_uses_variant_names() {
        let json = serde_json::to_string(&LeaseStatus::SashiTimeout).unwrap();
        assert_eq!(json, "\"SashiTimeout\"");
    }

    proptest! {
        #[test]
        fn terminal_states_have_no_outgoing_transitions(from in any_status(), to in any_status()) {
            if from.is_terminal() {
                prop_assert!(!from.can_transition_to(to));
            }
        }

        #[test]
        fn transitions_never_return_to_acquiring(from in any_status()) {
            prop_assert!(!from.can_transition_to(LeaseStatus::Acquiring));
        }
    }
}
