use serde::{Deserialize, Serialize};
use std::fmt;

/// Totally ordered severity scale. `Good` is the fallback, `Critical` the worst.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum SeverityLevel {
    #[default]
    Good,
    Moderate,
    High,
    Severe,
    Critical,
}

impl SeverityLevel {
    pub const LOWEST: SeverityLevel = SeverityLevel::Good;
    pub const WORST: SeverityLevel = SeverityLevel::Critical;

    pub const ALL: [SeverityLevel; 5] = [
        SeverityLevel::Good,
        SeverityLevel::Moderate,
        SeverityLevel::High,
        SeverityLevel::Severe,
        SeverityLevel::Critical,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SeverityLevel::Good => "good",
            SeverityLevel::Moderate => "moderate",
            SeverityLevel::High => "high",
            SeverityLevel::Severe => "severe",
            SeverityLevel::Critical => "critical",
        }
    }

    /// Escalate-only merge: never returns a level below `self`.
    pub fn escalate(self, candidate: SeverityLevel) -> SeverityLevel {
        self.max(candidate)
    }
}

impl fmt::Display for SeverityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Domain-specific display names for severity levels ("Quiet", "Loud", ...).
///
/// Unset levels fall back to the level's own name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SeverityLabels {
    #[serde(default)]
    pub good: Option<String>,
    #[serde(default)]
    pub moderate: Option<String>,
    #[serde(default)]
    pub high: Option<String>,
    #[serde(default)]
    pub severe: Option<String>,
    #[serde(default)]
    pub critical: Option<String>,
}

impl SeverityLabels {
    pub fn label(&self, level: SeverityLevel) -> String {
        let custom = match level {
            SeverityLevel::Good => &self.good,
            SeverityLevel::Moderate => &self.moderate,
            SeverityLevel::High => &self.high,
            SeverityLevel::Severe => &self.severe,
            SeverityLevel::Critical => &self.critical,
        };
        custom
            .clone()
            .unwrap_or_else(|| level.as_str().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levels_are_totally_ordered() {
        for pair in SeverityLevel::ALL.windows(2) {
            assert!(pair[0] < pair[1]);
        }
        assert_eq!(SeverityLevel::ALL[0], SeverityLevel::LOWEST);
        assert_eq!(SeverityLevel::ALL[4], SeverityLevel::WORST);
    }

    #[test]
    fn test_escalate_never_lowers() {
        assert_eq!(
            SeverityLevel::High.escalate(SeverityLevel::Moderate),
            SeverityLevel::High
        );
        assert_eq!(
            SeverityLevel::Moderate.escalate(SeverityLevel::Critical),
            SeverityLevel::Critical
        );
    }

    #[test]
    fn test_labels_fall_back_to_level_name() {
        let labels = SeverityLabels {
            good: Some("Quiet".to_string()),
            ..Default::default()
        };
        assert_eq!(labels.label(SeverityLevel::Good), "Quiet");
        assert_eq!(labels.label(SeverityLevel::High), "high");
    }

    #[test]
    fn test_serde_names() {
        let json = serde_json::to_string(&SeverityLevel::Severe).unwrap();
        assert_eq!(json, "\"severe\"");
        let level: SeverityLevel = serde_json::from_str("\"critical\"").unwrap();
        assert_eq!(level, SeverityLevel::Critical);
    }
}
