use crate::crawler::LinkId;
use std::fmt;

/// How a crawl run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStatus {
    /// Every discovered link was visited
    Completed,

    /// The site redirected a detail page to its login page
    Aborted {
        /// The link whose navigation was redirected
        link: LinkId,
        /// Where the navigation was sent
        target: String,
    },

    /// The operator asked the run to stop (Ctrl+C)
    Interrupted,
}

impl RunStatus {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self, Self::Aborted { .. })
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed => write!(f, "completed"),
            Self::Aborted { link, target } => {
                write!(f, "aborted at {} (redirected to {})", link, target)
            }
            Self::Interrupted => write!(f, "interrupted"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_predicates() {
        assert!(RunStatus::Completed.is_completed());
        assert!(!RunStatus::Interrupted.is_completed());

        let aborted = RunStatus::Aborted {
            link: LinkId::new("1234"),
            target: "https://example.org/login".to_string(),
        };
        assert!(aborted.is_aborted());
        assert!(!aborted.is_completed());
    }

    #[test]
    fn test_display_names_link_and_target() {
        let aborted = RunStatus::Aborted {
            link: LinkId::new("1234"),
            target: "https://example.org/login".to_string(),
        };
        assert_eq!(
            aborted.to_string(),
            "aborted at 1234 (redirected to https://example.org/login)"
        );
    }
}
