//! Per-request attempt state machine
//!
//! ```text
//! Pending -> Attempting -> Success
//!                |
//!                +-> SoftFailed | HardFailed -> Attempting (budget left)
//!                                            -> Exhausted
//! ```

use crate::error::{AttemptError, StealthError};
use crate::models::FailureKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptState {
    Pending,
    Attempting { attempt: u32 },
    SoftFailed { attempt: u32 },
    HardFailed { attempt: u32 },
    Success { attempt: u32 },
    Exhausted { attempts: u32 },
}

impl AttemptState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, AttemptState::Success { .. } | AttemptState::Exhausted { .. })
    }
}

#[derive(Debug)]
pub struct RetryTracker {
    max_attempts: u32,
    attempts: u32,
    state: AttemptState,
    last_error: Option<AttemptError>,
}

impl RetryTracker {
    /// A budget of zero is treated as one attempt
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            attempts: 0,
            state: AttemptState::Pending,
            last_error: None,
        }
    }

    pub fn state(&self) -> AttemptState {
        self.state
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn last_error(&self) -> Option<&AttemptError> {
        self.last_error.as_ref()
    }

    /// Whether the next attempt is a retry and should be preceded by a pause
    pub fn is_retry(&self) -> bool {
        self.attempts > 0
    }

    /// Start the next attempt, returning its 1-based number
    ///
    /// Returns `None` and moves to `Exhausted` once the budget is spent.
    pub fn begin(&mut self) -> Option<u32> {
        match self.state {
            AttemptState::Success { .. } | AttemptState::Exhausted { .. } => return None,
            AttemptState::Attempting { .. } => return Some(self.attempts),
            _ => {}
        }

        if self.attempts >= self.max_attempts {
            self.state = AttemptState::Exhausted {
                attempts: self.attempts,
            };
            return None;
        }

        self.attempts += 1;
        self.state = AttemptState::Attempting {
            attempt: self.attempts,
        };
        Some(self.attempts)
    }

    pub fn succeed(&mut self) {
        self.state = AttemptState::Success {
            attempt: self.attempts,
        };
    }

    pub fn fail(&mut self, kind: FailureKind, error: AttemptError) {
        self.last_error = Some(error);
        self.state = match kind {
            FailureKind::Soft => AttemptState::SoftFailed {
                attempt: self.attempts,
            },
            FailureKind::Hard => AttemptState::HardFailed {
                attempt: self.attempts,
            },
        };
    }

    /// Terminal error for a request that never succeeded
    pub fn into_error(self) -> StealthError {
        StealthError::AllAttemptsFailed {
            attempts: self.attempts,
            last_error: self.last_error.unwrap_or(AttemptError::NotAttempted),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;

    #[test]
    fn test_zero_budget_still_allows_one_attempt() {
        let mut tracker = RetryTracker::new(0);
        assert_eq!(tracker.max_attempts(), 1);
        assert_eq!(tracker.begin(), Some(1));
        tracker.fail(FailureKind::Soft, AttemptError::Status(429));
        assert_eq!(tracker.begin(), None);
        assert_eq!(tracker.state(), AttemptState::Exhausted { attempts: 1 });
    }

    #[test]
    fn test_runs_until_budget_spent() {
        let mut tracker = RetryTracker::new(3);
        assert_eq!(tracker.state(), AttemptState::Pending);
        assert!(!tracker.is_retry());

        for expected in 1..=3 {
            assert_eq!(tracker.begin(), Some(expected));
            assert_eq!(tracker.state(), AttemptState::Attempting { attempt: expected });
            tracker.fail(FailureKind::Hard, AttemptError::Status(500));
            assert!(tracker.is_retry());
        }

        assert_eq!(tracker.begin(), None);
        assert!(tracker.state().is_terminal());

        match tracker.into_error() {
            StealthError::AllAttemptsFailed {
                attempts,
                last_error,
            } => {
                assert_eq!(attempts, 3);
                assert_eq!(last_error, AttemptError::Status(500));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_success_stops_the_machine() {
        let mut tracker = RetryTracker::new(5);
        tracker.begin();
        tracker.fail(
            FailureKind::Soft,
            AttemptError::Transport(TransportError::Timeout),
        );
        assert_eq!(tracker.state(), AttemptState::SoftFailed { attempt: 1 });

        assert_eq!(tracker.begin(), Some(2));
        tracker.succeed();
        assert_eq!(tracker.state(), AttemptState::Success { attempt: 2 });
        assert_eq!(tracker.begin(), None);
        assert_eq!(tracker.attempts(), 2);
    }

    #[test]
    fn test_last_error_tracks_most_recent_failure() {
        let mut tracker = RetryTracker::new(2);
        tracker.begin();
        tracker.fail(FailureKind::Soft, AttemptError::Status(403));
        tracker.begin();
        tracker.fail(FailureKind::Hard, AttemptError::Status(404));
        assert_eq!(tracker.last_error(), Some(&AttemptError::Status(404)));
        assert_eq!(tracker.state(), AttemptState::HardFailed { attempt: 2 });
    }

    #[test]
    fn test_error_without_attempts() {
        let tracker = RetryTracker::new(3);
        match tracker.into_error() {
            StealthError::AllAttemptsFailed {
                attempts,
                last_error,
            } => {
                assert_eq!(attempts, 0);
                assert_eq!(last_error, AttemptError::NotAttempted);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
