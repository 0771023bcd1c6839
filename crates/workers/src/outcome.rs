//! What the poll loop should do with a message once its handler returns.

/// Per-message result of a handler.
///
/// Handlers derive the right action from persisted state, so the only
/// decision left to the loop is whether to acknowledge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    /// Work done (or already done by someone else); acknowledge.
    Handled,
    /// Nothing to do for this message; acknowledge.
    Skip,
    /// Leave unacknowledged; the queue redelivers after its visibility timeout.
    Retry,
}

impl Outcome {
    pub fn acknowledges(&self) -> bool {
        matches!(self, Outcome::Handled | Outcome::Skip)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Handled => "handled",
            Outcome::Skip => "skip",
            Outcome::Retry => "retry",
        }
    }
}

impl core::fmt::Display for Outcome {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_retry_keeps_the_message() {
        assert!(Outcome::Handled.acknowledges());
        assert!(Outcome::Skip.acknowledges());
        assert!(!Outcome::Retry.acknowledges());
    }
}
