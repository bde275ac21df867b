//! Explicit state machine for a generation step with one fallback.
//!
//! ```text
//! NotStarted -> Running -> Succeeded
//!                      \-> Failed(reason) -> RetryingFallback -> Running -> ...
//! ```
//!
//! A fallback may be taken once; a second failure is terminal.

use std::fmt;

/// State of one generation step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptState {
    NotStarted,
    Running,
    Succeeded,
    Failed(String),
    RetryingFallback,
}

impl fmt::Display for AttemptState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptState::NotStarted => f.write_str("not-started"),
            AttemptState::Running => f.write_str("running"),
            AttemptState::Succeeded => f.write_str("succeeded"),
            AttemptState::Failed(reason) => write!(f, "failed ({reason})"),
            AttemptState::RetryingFallback => f.write_str("retrying-fallback"),
        }
    }
}

/// Tracks the state of a named generation step.
#[derive(Debug, Clone)]
pub struct Attempt {
    label: &'static str,
    state: AttemptState,
    fallback_taken: bool,
}

impl Attempt {
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            state: AttemptState::NotStarted,
            fallback_taken: false,
        }
    }

    pub fn state(&self) -> &AttemptState {
        &self.state
    }

    pub fn is_fallback(&self) -> bool {
        self.fallback_taken
    }

    /// `NotStarted | RetryingFallback -> Running`.
    pub fn start(&mut self) -> flix_core::Result<()> {
        match self.state {
            AttemptState::NotStarted | AttemptState::RetryingFallback => {
                self.set(AttemptState::Running);
                Ok(())
            }
            _ => Err(self.invalid("start")),
        }
    }

    /// `Running -> Succeeded`.
    pub fn succeed(&mut self) -> flix_core::Result<()> {
        match self.state {
            AttemptState::Running => {
                self.set(AttemptState::Succeeded);
                Ok(())
            }
            _ => Err(self.invalid("succeed")),
        }
    }

    /// `Running -> Failed(reason)`.
    pub fn fail(&mut self, reason: impl Into<String>) -> flix_core::Result<()> {
        match self.state {
            AttemptState::Running => {
                self.set(AttemptState::Failed(reason.into()));
                Ok(())
            }
            _ => Err(self.invalid("fail")),
        }
    }

    /// `Failed -> RetryingFallback`, allowed once. Returns `false` when the
    /// fallback has already been used, leaving the state terminal.
    pub fn retry_fallback(&mut self) -> flix_core::Result<bool> {
        match self.state {
            AttemptState::Failed(_) if self.fallback_taken => Ok(false),
            AttemptState::Failed(_) => {
                self.fallback_taken = true;
                self.set(AttemptState::RetryingFallback);
                Ok(true)
            }
            _ => Err(self.invalid("retry")),
        }
    }

    /// Succeeded, or failed with the fallback already used.
    pub fn is_terminal(&self) -> bool {
        match self.state {
            AttemptState::Succeeded => true,
            AttemptState::Failed(_) => self.fallback_taken,
            _ => false,
        }
    }

    fn set(&mut self, next: AttemptState) {
        tracing::trace!(step = self.label, from = %self.state, to = %next, "Attempt transition");
        self.state = next;
    }

    fn invalid(&self, action: &str) -> flix_core::Error {
        flix_core::Error::Internal(format!(
            "{}: cannot {action} from state {}",
            self.label, self.state
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primary_success() {
        let mut a = Attempt::new("thumbnail");
        a.start().unwrap();
        a.succeed().unwrap();
        assert_eq!(a.state(), &AttemptState::Succeeded);
        assert!(a.is_terminal());
        assert!(!a.is_fallback());
    }

    #[test]
    fn fallback_then_success() {
        let mut a = Attempt::new("thumbnail");
        a.start().unwrap();
        a.fail("exit 1").unwrap();
        assert!(!a.is_terminal());
        assert!(a.retry_fallback().unwrap());
        assert_eq!(a.state(), &AttemptState::RetryingFallback);
        a.start().unwrap();
        a.succeed().unwrap();
        assert!(a.is_fallback());
    }

    #[test]
    fn second_failure_is_terminal() {
        let mut a = Attempt::new("thumbnail");
        a.start().unwrap();
        a.fail("first").unwrap();
        a.retry_fallback().unwrap();
        a.start().unwrap();
        a.fail("second").unwrap();
        assert!(!a.retry_fallback().unwrap());
        assert!(a.is_terminal());
        assert_eq!(a.state(), &AttemptState::Failed("second".into()));
    }

    #[test]
    fn invalid_transitions_are_errors() {
        let mut a = Attempt::new("rendition");
        assert!(a.succeed().is_err());
        assert!(a.fail("x").is_err());
        assert!(a.retry_fallback().is_err());
        a.start().unwrap();
        assert!(a.start().is_err());
    }
}
