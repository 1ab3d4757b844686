//! Stack State Machine
//!
//! ```text
//! Uninitialized
//!   ↓ setup requested
//! Initializing ──→ Failed
//!   ↓                ↓ retry
//! Ready          Initializing
//! ```

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StackState {
    /// No setup has been requested yet
    #[default]
    Uninitialized,
    /// The store is being opened
    Initializing,
    /// Store open, main context published
    Ready,
    /// The last setup attempt failed
    Failed,
}

impl StackState {
    /// Check if transition to another state is valid
    pub fn can_transition_to(&self, target: StackState) -> bool {
        matches!(
            (self, target),
            (StackState::Uninitialized, StackState::Initializing)
                | (StackState::Initializing, StackState::Ready)
                | (StackState::Initializing, StackState::Failed)
                | (StackState::Failed, StackState::Initializing)
        )
    }

    /// Returns true if save requests may be serviced
    pub fn is_ready(&self) -> bool {
        matches!(self, StackState::Ready)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StackState::Uninitialized => "uninitialized",
            StackState::Initializing => "initializing",
            StackState::Ready => "ready",
            StackState::Failed => "failed",
        }
    }
}

impl std::fmt::Display for StackState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for StackState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "uninitialized" => Ok(StackState::Uninitialized),
            "initializing" => Ok(StackState::Initializing),
            "ready" => Ok(StackState::Ready),
            "failed" => Ok(StackState::Failed),
            _ => Err(format!("Unknown stack state: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_transitions() {
        assert!(StackState::Uninitialized.can_transition_to(StackState::Initializing));
        assert!(StackState::Initializing.can_transition_to(StackState::Ready));
        assert!(StackState::Initializing.can_transition_to(StackState::Failed));
        // Failed -> Initializing (retry)
        assert!(StackState::Failed.can_transition_to(StackState::Initializing));
    }

    #[test]
    fn test_ready_is_terminal() {
        assert!(!StackState::Ready.can_transition_to(StackState::Initializing));
        assert!(!StackState::Ready.can_transition_to(StackState::Failed));
        assert!(!StackState::Ready.can_transition_to(StackState::Uninitialized));
        assert!(!StackState::Uninitialized.can_transition_to(StackState::Ready));
    }

    #[test]
    fn test_parse_round_trip() {
        for state in [
            StackState::Uninitialized,
            StackState::Initializing,
            StackState::Ready,
            StackState::Failed,
        ] {
            assert_eq!(state.as_str().parse::<StackState>(), Ok(state));
        }
        assert!("open".parse::<StackState>().is_err());
    }
}
