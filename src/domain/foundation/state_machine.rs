//! Transition table trait for status enums.

use std::fmt;

/// A rejected status change, carrying both ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionRejected<S> {
    pub from: S,
    pub to: S,
}

impl<S: fmt::Debug> fmt::Display for TransitionRejected<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "no transition from {:?} to {:?}", self.from, self.to)
    }
}

/// Status enums whose allowed moves form a fixed table.
///
/// Implementors list the table in `can_transition_to`; everything else is
/// derived from it.
pub trait StateMachine: Sized + Copy + PartialEq + fmt::Debug + 'static {
    /// Every value of the enum, in declaration order.
    const ALL: &'static [Self];

    fn can_transition_to(&self, target: &Self) -> bool;

    fn valid_transitions(&self) -> Vec<Self> {
        Self::ALL
            .iter()
            .copied()
            .filter(|target| self.can_transition_to(target))
            .collect()
    }

    fn transition_to(&self, target: Self) -> Result<Self, TransitionRejected<Self>> {
        if self.can_transition_to(&target) {
            Ok(target)
        } else {
            Err(TransitionRejected {
                from: *self,
                to: target,
            })
        }
    }

    /// No outgoing transitions at all.
    fn is_terminal(&self) -> bool {
        self.valid_transitions().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Charge {
        Pending,
        Declined,
        Captured,
        Refunded,
    }

    impl StateMachine for Charge {
        const ALL: &'static [Self] = &[
            Charge::Pending,
            Charge::Declined,
            Charge::Captured,
            Charge::Refunded,
        ];

        fn can_transition_to(&self, target: &Self) -> bool {
            use Charge::*;
            matches!(
                (self, target),
                (Pending, Declined) | (Pending, Captured) | (Declined, Pending) | (Captured, Refunded)
            )
        }
    }

    #[test]
    fn allowed_move_returns_target() {
        assert_eq!(
            Charge::Pending.transition_to(Charge::Captured),
            Ok(Charge::Captured)
        );
    }

    #[test]
    fn rejected_move_reports_both_ends() {
        let err = Charge::Declined.transition_to(Charge::Refunded).unwrap_err();
        assert_eq!(err.from, Charge::Declined);
        assert_eq!(err.to, Charge::Refunded);
        assert_eq!(err.to_string(), "no transition from Declined to Refunded");
    }

    #[test]
    fn valid_transitions_follow_the_table() {
        assert_eq!(
            Charge::Pending.valid_transitions(),
            vec![Charge::Declined, Charge::Captured]
        );
        assert!(Charge::Refunded.is_terminal());
        assert!(!Charge::Declined.is_terminal());
    }
}
