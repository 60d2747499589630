// Threshold classification: readings -> (severity, operator message)

mod severity;

pub use severity::{SeverityLabels, SeverityLevel};

use serde::{Deserialize, Serialize};

/// One breakpoint range of a reading rule: `[min, max)`.
///
/// A missing `min` or `max` leaves that side open.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Band {
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
    pub level: SeverityLevel,
    /// Message fragment; `{value}` is replaced with the reading
    #[serde(default)]
    pub message: Option<String>,
}

impl Band {
    pub fn contains(&self, value: f64) -> bool {
        self.min.map_or(true, |min| value >= min) && self.max.map_or(true, |max| value < max)
    }
}

/// Ordered breakpoint list for one quantity (e.g. "co2")
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadingRule {
    pub quantity: String,
    pub bands: Vec<Band>,
}

impl ReadingRule {
    /// Map a value onto its band. `None` when no band covers the value.
    pub fn evaluate(&self, value: f64) -> Option<Finding> {
        if !value.is_finite() {
            return None;
        }
        let band = self.bands.iter().find(|band| band.contains(value))?;
        Some(Finding {
            source: self.quantity.clone(),
            level: band.level,
            fragment: band
                .message
                .as_deref()
                .map(|m| render_fragment(m, value))
                .unwrap_or_default(),
        })
    }

    /// Check that bands are ordered, contiguous and monotonic in deviation.
    ///
    /// Levels must fall towards a single safe band and rise away from it, so
    /// moving a reading further from its safe range never lowers severity.
    pub fn validate(&self) -> Result<(), String> {
        if self.bands.is_empty() {
            return Err("at least one band is required".to_string());
        }

        for band in &self.bands {
            if let (Some(min), Some(max)) = (band.min, band.max) {
                if !(min < max) {
                    return Err(format!("band [{}, {}) is empty", min, max));
                }
            }
        }

        for pair in self.bands.windows(2) {
            let (lower, upper) = (&pair[0], &pair[1]);
            match (lower.max, upper.min) {
                (Some(max), Some(min)) if max == min => {}
                (Some(max), Some(min)) => {
                    return Err(format!(
                        "bands must be listed in ascending, contiguous order (gap or overlap at {} / {})",
                        max, min
                    ));
                }
                _ => return Err("only the first band may be open below and only the last open above".to_string()),
            }
        }

        let levels: Vec<SeverityLevel> = self.bands.iter().map(|b| b.level).collect();
        let safe = levels
            .iter()
            .enumerate()
            .min_by_key(|(_, level)| **level)
            .map(|(i, _)| i)
            .unwrap_or(0);

        let falls_to_safe = levels[..=safe].windows(2).all(|w| w[0] >= w[1]);
        let rises_from_safe = levels[safe..].windows(2).all(|w| w[0] <= w[1]);
        if !(falls_to_safe && rises_from_safe) {
            return Err("band levels must not decrease moving away from the safe band".to_string());
        }

        Ok(())
    }
}

/// Bound test used by compound rules
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub quantity: String,
    /// Holds when the reading is strictly above this value
    #[serde(default)]
    pub above: Option<f64>,
    /// Holds when the reading is strictly below this value
    #[serde(default)]
    pub below: Option<f64>,
}

impl Condition {
    pub fn holds(&self, value: f64) -> bool {
        value.is_finite()
            && self.above.map_or(true, |above| value > above)
            && self.below.map_or(true, |below| value < below)
    }
}

/// Rule that fires only when every condition holds at once
/// (e.g. high humidity AND low pressure => flood risk).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompoundRule {
    pub name: String,
    pub conditions: Vec<Condition>,
    pub level: SeverityLevel,
    pub message: String,
}

impl CompoundRule {
    pub fn matches(&self, readings: &[(&str, f64)]) -> bool {
        !self.conditions.is_empty()
            && self.conditions.iter().all(|cond| {
                lookup(readings, &cond.quantity).map_or(false, |value| cond.holds(value))
            })
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.conditions.len() < 2 {
            return Err("compound rules need at least two conditions".to_string());
        }
        for cond in &self.conditions {
            if cond.above.is_none() && cond.below.is_none() {
                return Err(format!(
                    "condition on '{}' needs 'above' or 'below'",
                    cond.quantity
                ));
            }
        }
        Ok(())
    }
}

/// A single rule result contributing to a classification
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Finding {
    /// Quantity name or compound rule name
    pub source: String,
    pub level: SeverityLevel,
    pub fragment: String,
}

/// Result of classifying one station's readings
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Classification {
    pub level: SeverityLevel,
    pub label: String,
    pub message: String,
    /// Every finding above the lowest level, in evaluation order
    pub findings: Vec<Finding>,
}

/// Maps a tuple of readings to an overall severity and message.
///
/// Single-reading rules are evaluated first, compound rules after; the overall
/// level only ever escalates. Unmapped readings count as the lowest level.
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdClassifier {
    rules: Vec<ReadingRule>,
    compound: Vec<CompoundRule>,
    normal_message: String,
    labels: SeverityLabels,
}

impl ThresholdClassifier {
    pub fn new(
        rules: Vec<ReadingRule>,
        compound: Vec<CompoundRule>,
        normal_message: impl Into<String>,
        labels: SeverityLabels,
    ) -> Self {
        Self {
            rules,
            compound,
            normal_message: normal_message.into(),
            labels,
        }
    }

    pub fn rules(&self) -> &[ReadingRule] {
        &self.rules
    }

    pub fn labels(&self) -> &SeverityLabels {
        &self.labels
    }

    /// Classify `(quantity, value)` pairs. Total: always returns a result.
    pub fn classify(&self, readings: &[(&str, f64)]) -> Classification {
        let mut level = SeverityLevel::LOWEST;
        let mut findings = Vec::new();

        for rule in &self.rules {
            let Some(value) = lookup(readings, &rule.quantity) else {
                continue;
            };
            if let Some(finding) = rule.evaluate(value) {
                if finding.level > SeverityLevel::LOWEST {
                    level = level.escalate(finding.level);
                    findings.push(finding);
                }
            }
        }

        for rule in &self.compound {
            if rule.matches(readings) {
                level = level.escalate(rule.level);
                findings.push(Finding {
                    source: rule.name.clone(),
                    level: rule.level,
                    fragment: rule.message.clone(),
                });
            }
        }

        let message = if level == SeverityLevel::LOWEST {
            self.normal_message.clone()
        } else {
            let fragments: Vec<&str> = findings
                .iter()
                .filter(|f| f.level == level && !f.fragment.is_empty())
                .map(|f| f.fragment.as_str())
                .collect();
            if fragments.is_empty() {
                self.labels.label(level)
            } else {
                fragments.join("; ")
            }
        };

        Classification {
            level,
            label: self.labels.label(level),
            message,
            findings,
        }
    }
}

fn lookup(readings: &[(&str, f64)], quantity: &str) -> Option<f64> {
    readings
        .iter()
        .find(|(name, _)| *name == quantity)
        .map(|(_, value)| *value)
}

fn render_fragment(template: &str, value: f64) -> String {
    template.replace("{value}", &value.to_string())
}
