use std::fmt;

/// Result of a best-effort step. Failures are recorded, never propagated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Succeeded,
    SkippedAbsent,
    FailedIgnored(String),
}

impl Outcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, Outcome::FailedIgnored(_))
    }

    /// Print the outcome of `what` to the operator.
    pub fn report(&self, what: &str) {
        match self {
            Outcome::Succeeded => crate::output::success(what),
            Outcome::SkippedAbsent => crate::output::info(&format!("{} (nothing to do)", what)),
            Outcome::FailedIgnored(reason) => {
                crate::output::warning(&format!("{} failed, continuing: {}", what, reason))
            }
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Succeeded => f.write_str("succeeded"),
            Outcome::SkippedAbsent => f.write_str("skipped (absent)"),
            Outcome::FailedIgnored(reason) => write!(f, "failed (ignored): {}", reason),
        }
    }
}
