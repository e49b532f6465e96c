//! Severity levels attached to every finding and to the overall audit.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Severity of a finding, ordered by precedence (`Low < Medium < High < Critical`).
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum Severity {
    #[default]
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Raise `self` to at least `other`. Severity never decreases.
    #[inline]
    pub fn raise(&mut self, other: Severity) {
        if other > *self {
            *self = other;
        }
    }

    /// Map a CVSS-style score onto a severity.
    pub fn from_score(score: f64) -> Self {
        if score >= 9.0 {
            Self::Critical
        } else if score >= 7.0 {
            Self::High
        } else if score >= 4.0 {
            Self::Medium
        } else {
            Self::Low
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "Low",
            Self::Medium => "Medium",
            Self::High => "High",
            Self::Critical => "Critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_precedence() {
        assert!(Severity::Critical > Severity::High);
        assert!(Severity::High > Severity::Medium);
        assert!(Severity::Medium > Severity::Low);
        assert_eq!(Severity::default(), Severity::Low);
    }

    #[test]
    fn test_raise_never_lowers() {
        let mut s = Severity::Critical;
        s.raise(Severity::Medium);
        assert_eq!(s, Severity::Critical);

        let mut s = Severity::Low;
        s.raise(Severity::High);
        assert_eq!(s, Severity::High);
    }

    #[test]
    fn test_from_score() {
        assert_eq!(Severity::from_score(9.8), Severity::Critical);
        assert_eq!(Severity::from_score(8.1), Severity::High);
        assert_eq!(Severity::from_score(5.0), Severity::Medium);
        assert_eq!(Severity::from_score(1.2), Severity::Low);
    }

    #[test]
    fn test_serde_uses_capitalized_names() {
        assert_eq!(serde_json::to_string(&Severity::High).unwrap(), "\"High\"");
        assert_eq!(
            serde_json::from_str::<Severity>("\"Critical\"").unwrap(),
            Severity::Critical
        );
    }
}
