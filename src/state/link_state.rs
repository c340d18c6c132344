/// Link state definitions for tracking crawl progress
///
/// Every discovered link walks this state machine exactly once per run:
///
/// ```text
/// Pending -> Skipped
/// Pending -> Fetching -> Extracting -> Persisted
///                     -> Aborted
///                     -> Failed
/// ```
use std::fmt;

/// Represents the current state of a link within one run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkState {
    // ===== Active States =====
    /// Link has been discovered but not yet looked at
    Pending,

    /// Detail page navigation is in flight
    Fetching,

    /// Page was loaded, records are being pulled out of it
    Extracting,

    // ===== Terminal Success States =====
    /// Records and progress entry were durably written
    Persisted,

    /// Link was already in the progress set
    Skipped,

    // ===== Terminal Error States =====
    /// Navigation failed for a reason unrelated to authentication;
    /// the link is retried on the next run
    Failed,

    /// Navigation landed on the login page; the whole run stops
    Aborted,
}

impl LinkState {
    /// Returns true if the link needs no further work in any later run
    pub fn is_done(&self) -> bool {
        matches!(self, Self::Persisted | Self::Skipped)
    }

    /// Returns true if this represents an error state
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Failed | Self::Aborted)
    }

    /// Returns true if the state machine allows moving from `self` to `next`
    pub fn can_transition_to(&self, next: LinkState) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Skipped)
                | (Self::Pending, Self::Fetching)
                | (Self::Fetching, Self::Extracting)
                | (Self::Fetching, Self::Aborted)
                | (Self::Fetching, Self::Failed)
                | (Self::Extracting, Self::Persisted)
        )
    }

    /// Moves to `next`, rejecting transitions the state machine does not allow
    pub fn advance(self, next: LinkState) -> Result<LinkState, crate::HarvestError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(crate::HarvestError::InvalidTransition {
                from: self,
                to: next,
            })
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Fetching => "fetching",
            Self::Extracting => "extracting",
            Self::Persisted => "persisted",
            Self::Skipped => "skipped",
            Self::Failed => "failed",
            Self::Aborted => "aborted",
        }
    }

}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
