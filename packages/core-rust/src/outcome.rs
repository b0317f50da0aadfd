//! Terminal outcome of an operation and the rule for folding many into one.

use std::fmt;

/// Terminal result of a completed operation.
///
/// Variants are ordered by severity so that the aggregate of a set of
/// outcomes is simply the most severe one: `Error` dominates `Stopped`,
/// which dominates `Success`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Outcome {
    /// The operation finished all of its work.
    Success,
    /// The operation observed a stop request and halted early.
    Stopped,
    /// The operation (or one of its children) failed unexpectedly.
    Error,
}

impl Outcome {
    /// Returns the more severe of two outcomes.
    #[must_use]
    pub fn combine(self, other: Outcome) -> Outcome {
        self.max(other)
    }

    /// Folds a set of outcomes into one. An empty set is a success.
    #[must_use]
    pub fn aggregate<I>(outcomes: I) -> Outcome
    where
        I: IntoIterator<Item = Outcome>,
    {
        outcomes
            .into_iter()
            .fold(Outcome::Success, Outcome::combine)
    }

    #[must_use]
    pub fn is_success(self) -> bool {
        self == Outcome::Success
    }

    /// Upper-case label used in logs and summaries.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::Success => "SUCCESS",
            Outcome::Stopped => "STOPPED",
            Outcome::Error => "ERROR",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
