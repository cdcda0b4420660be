//! Outage severity bands.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Severity band for an outage score
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Normal,
    Low,
    Degraded,
    High,
    Critical,
}

impl Severity {
    /// Map a raw outage score onto its band.
    pub fn classify(score: f64) -> Self {
        if score <= 0.0 || score.is_nan() {
            Severity::Normal
        } else if score < 1_000.0 {
            Severity::Low
        } else if score < 50_000.0 {
            Severity::Degraded
        } else if score < 200_000.0 {
            Severity::High
        } else {
            Severity::Critical
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_breakpoints() {
        assert_eq!(Severity::classify(0.0), Severity::Normal);
        assert_eq!(Severity::classify(-3.0), Severity::Normal);
        assert_eq!(Severity::classify(0.5), Severity::Low);
        assert_eq!(Severity::classify(999.0), Severity::Low);
        assert_eq!(Severity::classify(1000.0), Severity::Degraded);
        assert_eq!(Severity::classify(49_999.0), Severity::Degraded);
        assert_eq!(Severity::classify(50_000.0), Severity::High);
        assert_eq!(Severity::classify(199_999.0), Severity::High);
        assert_eq!(Severity::classify(200_000.0), Severity::Critical);
        assert_eq!(Severity::classify(f64::INFINITY), Severity::Critical);
    }

    #[test]
    fn test_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&Severity::Degraded).unwrap(),
            "\"degraded\""
        );
    }
}
