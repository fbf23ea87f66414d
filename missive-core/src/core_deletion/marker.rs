//! Deletion state machine
//!
//! ```text
//!  none ──► soft ──► hard
//!    └──────────────►
//! ```
//!
//! `hard` is terminal.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Deletion marker carried by every message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeletionMarker {
    #[default]
    None,
    /// Deleted for the sender only
    Soft,
    /// Deleted for everyone; content scrubbed
    Hard,
}

impl DeletionMarker {
    pub fn is_terminal(&self) -> bool {
        matches!(self, DeletionMarker::Hard)
    }

    /// Whether `self -> next` is one of the legal transitions
    pub fn can_transition_to(&self, next: DeletionMarker) -> bool {
        matches!(
            (self, next),
            (DeletionMarker::None, DeletionMarker::Soft)
                | (DeletionMarker::None, DeletionMarker::Hard)
                | (DeletionMarker::Soft, DeletionMarker::Hard)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DeletionMarker::None => "none",
            DeletionMarker::Soft => "soft",
            DeletionMarker::Hard => "hard",
        }
    }
}

impl fmt::Display for DeletionMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use DeletionMarker::*;

    #[test]
    fn test_only_forward_transitions_are_legal() {
        let all = [None, Soft, Hard];
        let legal: Vec<_> = all
            .iter()
            .flat_map(|from| all.iter().map(move |to| (*from, *to)))
            .filter(|(from, to)| from.can_transition_to(*to))
            .collect();

        assert_eq!(legal, vec![(None, Soft), (None, Hard), (Soft, Hard)]);
    }

    #[test]
    fn test_hard_is_terminal() {
        assert!(Hard.is_terminal());
        assert!(!Soft.is_terminal());
        assert!(!None.is_terminal());
    }

    #[test]
    fn test_serde_names() {
        assert_eq!(serde_json::to_string(&Soft).unwrap(), r#""soft""#);
        assert_eq!(Hard.to_string(), "hard");
    }
}
