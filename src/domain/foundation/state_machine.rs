//! State machine trait for status enums.
//!
//! Ledger rows and bookings move through guarded lifecycles driven by
//! processor events. Each status enum declares its legal edges here and
//! handlers ask before writing.

use super::ValidationError;

/// Trait for status enums that represent state machines.
///
/// ```ignore
/// let next = PaymentStatus::Pending.transition_to(PaymentStatus::Paid)?;
/// assert!(!PaymentStatus::Refunded.can_transition_to(&PaymentStatus::Paid));
/// ```
pub trait StateMachine: Sized + Copy + PartialEq + std::fmt::Debug + 'static {
    /// Every state, used to derive reverse lookups.
    const ALL: &'static [Self];

    /// Returns true if transition from self to target is valid.
    fn can_transition_to(&self, target: &Self) -> bool;

    /// Returns all valid target states from current state.
    fn valid_transitions(&self) -> Vec<Self> {
        Self::ALL
            .iter()
            .copied()
            .filter(|candidate| self.can_transition_to(candidate))
            .collect()
    }

    /// States from which `target` may be reached.
    ///
    /// Persistence adapters turn this into a `WHERE status IN (...)` guard
    /// so the check and the write happen in one statement.
    fn sources_of(target: Self) -> Vec<Self> {
        Self::ALL
            .iter()
            .copied()
            .filter(|source| source.can_transition_to(&target))
            .collect()
    }

    /// Performs transition with validation, returning error if invalid.
    fn transition_to(&self, target: Self) -> Result<Self, ValidationError> {
        if self.can_transition_to(&target) {
            Ok(target)
        } else {
            Err(ValidationError::invalid_format(
                "state_transition",
                format!("Cannot transition from {:?} to {:?}", self, target),
            ))
        }
    }

    /// Checks if current state is terminal (no valid outgoing transitions).
    fn is_terminal(&self) -> bool {
        self.valid_transitions().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Light {
        Red,
        Green,
        Amber,
        Off,
    }

    impl StateMachine for Light {
        const ALL: &'static [Self] = &[Light::Red, Light::Green, Light::Amber, Light::Off];

        fn can_transition_to(&self, target: &Self) -> bool {
            use Light::*;
            matches!(
                (self, target),
                (Red, Green) | (Green, Amber) | (Amber, Red) | (Red, Off) | (Amber, Off)
            )
        }
    }

    #[test]
    fn transition_to_succeeds_for_valid_transition() {
        assert_eq!(Light::Red.transition_to(Light::Green), Ok(Light::Green));
    }

    #[test]
    fn transition_to_fails_for_invalid_transition() {
        assert!(Light::Green.transition_to(Light::Red).is_err());
    }

    #[test]
    fn valid_transitions_derived_from_edges() {
        assert_eq!(Light::Red.valid_transitions(), vec![Light::Green, Light::Off]);
        assert!(Light::Off.is_terminal());
    }

    #[test]
    fn sources_of_inverts_edges() {
        assert_eq!(Light::sources_of(Light::Off), vec![Light::Red, Light::Amber]);
        assert!(Light::sources_of(Light::Red).contains(&Light::Amber));
    }
}
