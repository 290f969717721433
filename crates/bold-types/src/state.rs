//! The simulation lifecycle state and its fixed transition cycle.
//!
//! ```text
//! Created -> Configured -> Initializing -> Ready -> Running -> Replaying -> Cleaning
//!                 ^                                                            |
//!                 +------------------------------------------------------------+
//! ```
//!
//! Every state has exactly one successor. The only self-loop is
//! `Running -> Running` (a tick that does not terminate the run), which is
//! not a transition and is never published.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle state of the simulation engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SimulationState {
    /// Engine constructed, built-in programs not yet registered.
    Created,
    /// Accepting registration calls.
    Configured,
    /// Registration closed; waiting for the start signal, then loading the
    /// dataset and running single updates.
    Initializing,
    /// Slot 0 is open; the scheduler is about to start.
    Ready,
    /// Scheduler ticks drive continuous updates.
    Running,
    /// Replaying the change history offline.
    Replaying,
    /// Clearing histories and restoring the live store.
    Cleaning,
}

impl SimulationState {
    /// All states in cycle order.
    pub const ALL: [Self; 7] = [
        Self::Created,
        Self::Configured,
        Self::Initializing,
        Self::Ready,
        Self::Running,
        Self::Replaying,
        Self::Cleaning,
    ];

    /// The unique successor of this state in the fixed cycle.
    pub const fn successor(self) -> Self {
        match self {
            Self::Created => Self::Configured,
            Self::Configured => Self::Initializing,
            Self::Initializing => Self::Ready,
            Self::Ready => Self::Running,
            Self::Running => Self::Replaying,
            Self::Replaying => Self::Cleaning,
            Self::Cleaning => Self::Configured,
        }
    }

    /// Whether `self -> next` is an edge of the fixed cycle.
    pub fn can_transition_to(self, next: Self) -> bool {
        self.successor() == next
    }

    /// Whether a run is in progress (from the start signal until cleanup
    /// completes).
    pub const fn run_in_progress(self) -> bool {
        matches!(
            self,
            Self::Ready | Self::Running | Self::Replaying | Self::Cleaning
        )
    }

    /// Lower-case label used in logs and JSON bodies.
    pub const fn label(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Configured => "configured",
            Self::Initializing => "initializing",
            Self::Ready => "ready",
            Self::Running => "running",
            Self::Replaying => "replaying",
            Self::Cleaning => "cleaning",
        }
    }
}

impl fmt::Display for SimulationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A realized state transition, as published to transition subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    /// State before the transition.
    pub from: SimulationState,
    /// State after the transition.
    pub to: SimulationState,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycle_visits_every_state_after_created() {
        let mut state = SimulationState::Configured;
        let mut seen = Vec::new();
        for _ in 0..6 {
            seen.push(state);
            state = state.successor();
        }
        assert_eq!(state, SimulationState::Configured);
        assert_eq!(seen.len(), 6);
        assert!(!seen.contains(&SimulationState::Created));
    }

    #[test]
    fn only_cycle_edges_are_legal() {
        for from in SimulationState::ALL {
            let legal: Vec<_> = SimulationState::ALL
                .into_iter()
                .filter(|to| from.can_transition_to(*to))
                .collect();
            assert_eq!(legal, vec![from.successor()]);
        }
        assert!(!SimulationState::Running.can_transition_to(SimulationState::Cleaning));
        assert!(!SimulationState::Cleaning.can_transition_to(SimulationState::Created));
    }

    #[test]
    fn state_serializes_as_variant_name() {
        let json = serde_json::to_string(&SimulationState::Replaying).ok();
        assert_eq!(json.as_deref(), Some("\"Replaying\""));
    }
}
