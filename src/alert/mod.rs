// Fleet-wide aggregates, standing alerts and transient alerts


use crate::classify::SeverityLevel;
use crate::snapshot::StationStatus;
use crate::state::{Entity, Phase, Reading};
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;
use uuid::Uuid;

/// Source name used for fleet-wide standing alerts
pub const FLEET_SCOPE: &str = "fleet";

/// Operator-facing alert.
///
/// Standing alerts have no TTL and live until their condition clears;
/// transient alerts expire `ttl_ticks` after `created_tick`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: Uuid,
    /// Station id, entity id or `FLEET_SCOPE`
    pub source: String,
    pub severity: SeverityLevel,
    pub message: String,
    pub created_tick: u64,
    pub created_at: DateTime<Utc>,
    pub ttl_ticks: Option<u64>,
}

impl Alert {
    /// Create an alert whose id is drawn from the simulation RNG, so seeded
    /// runs reproduce identical ids.
    pub fn new<R: Rng + ?Sized>(
        rng: &mut R,
        source: impl Into<String>,
        severity: SeverityLevel,
        message: impl Into<String>,
        tick: u64,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Builder::from_random_bytes(rng.gen()).into_uuid(),
            source: source.into(),
            severity,
            message: message.into(),
            created_tick: tick,
            created_at: now,
            ttl_ticks: None,
        }
    }

    pub fn with_ttl(mut self, ttl_ticks: u64) -> Self {
        self.ttl_ticks = Some(ttl_ticks);
        self
    }

    /// First tick at which the alert is gone, if it expires at all
    pub fn expires_at_tick(&self) -> Option<u64> {
        self.ttl_ticks
            .map(|ttl| self.created_tick.saturating_add(ttl))
    }

    pub fn is_live(&self, tick: u64) -> bool {
        self.expires_at_tick().map_or(true, |expiry| tick < expiry)
    }

    /// Headline ordering: more severe wins, then more recent
    pub fn outranks(&self, other: &Alert) -> bool {
        (self.severity, self.created_tick) > (other.severity, other.created_tick)
    }
}

/// Fleet-wide aggregate recomputed every tick
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub entity_count: usize,
    pub phase_counts: BTreeMap<Phase, usize>,
    /// Entities currently in an attention phase
    pub attention_count: usize,
    pub attention_fraction: f64,
    /// Entities currently in the active (occupied) phase
    pub active_fraction: f64,
    pub mean_score: Option<f64>,
    /// Arithmetic mean per quantity across all stations
    pub reading_means: BTreeMap<String, f64>,
    pub level_counts: BTreeMap<SeverityLevel, usize>,
    pub worst_level: SeverityLevel,
    /// Entities carrying a long-dwell warning
    pub warning_count: usize,
}

impl Summary {
    pub fn attention_percent(&self) -> f64 {
        self.attention_fraction * 100.0
    }
}

/// Outcome of re-evaluating the standing alert
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StandingChange {
    Raised,
    Cleared,
}

/// Derives aggregates and alert state from a tick's entities and stations.
#[derive(Clone, Debug, PartialEq)]
pub struct AlertAggregator {
    pub attention_phases: Vec<Phase>,
    /// Standing alert is raised when the attention fraction exceeds this
    pub raise_threshold: f64,
    /// Standing alert clears when the fraction is at or below this
    pub clear_threshold: f64,
    pub standing_level: SeverityLevel,
    /// `{percent}`, `{count}` and `{total}` are substituted
    pub standing_message: String,
    pub transient_ttl_ticks: u64,
    /// Lowest severity that produces a transient alert
    pub transient_min_level: SeverityLevel,
}

impl Default for AlertAggregator {
    fn default() -> Self {
        Self {
            attention_phases: vec![Phase::MaintenanceNeeded],
            raise_threshold: 0.30,
            clear_threshold: 0.30,
            standing_level: SeverityLevel::High,
            standing_message: "{percent}% of entities need attention".to_string(),
            transient_ttl_ticks: 5,
            transient_min_level: SeverityLevel::Critical,
        }
    }
}

impl AlertAggregator {
    /// Recompute all aggregates. Pure: identical input gives identical output.
    pub fn summarize(
        &self,
        readings: &[Reading],
        stations: &[StationStatus],
        entities: &[Entity],
    ) -> Summary {
        let entity_count = entities.len();

        let mut phase_counts: BTreeMap<Phase, usize> = BTreeMap::new();
        for entity in entities {
            *phase_counts.entry(entity.phase).or_default() += 1;
        }

        let attention_count = entities
            .iter()
            .filter(|e| self.attention_phases.contains(&e.phase))
            .count();
        let active_count = phase_counts.get(&Phase::Active).copied().unwrap_or(0);

        let mean_score = if entity_count == 0 {
            None
        } else {
            Some(entities.iter().map(|e| e.score).sum::<f64>() / entity_count as f64)
        };

        let mut sums: BTreeMap<String, (f64, usize)> = BTreeMap::new();
        for reading in readings {
            let entry = sums.entry(reading.quantity.clone()).or_insert((0.0, 0));
            entry.0 += reading.value;
            entry.1 += 1;
        }
        let reading_means = sums
            .into_iter()
            .map(|(quantity, (sum, n))| (quantity, sum / n as f64))
            .collect();

        let mut level_counts: BTreeMap<SeverityLevel, usize> = BTreeMap::new();
        for station in stations {
            *level_counts.entry(station.level).or_default() += 1;
        }
        let worst_level = stations
            .iter()
            .map(|s| s.level)
            .max()
            .unwrap_or(SeverityLevel::LOWEST);

        Summary {
            entity_count,
            phase_counts,
            attention_count,
            attention_fraction: fraction(attention_count, entity_count),
            active_fraction: fraction(active_count, entity_count),
            mean_score,
            reading_means,
            level_counts,
            worst_level,
            warning_count: entities.iter().filter(|e| e.warning.is_some()).count(),
        }
    }

    /// Re-evaluate the standing alert against a fresh summary.
    ///
    /// A live standing alert keeps its id and creation tick while the
    /// condition persists; only its message is refreshed.
    pub fn update_standing<R: Rng + ?Sized>(
        &self,
        previous: Option<&Alert>,
        summary: &Summary,
        tick: u64,
        now: DateTime<Utc>,
        rng: &mut R,
    ) -> (Option<Alert>, Option<StandingChange>) {
        let fraction = summary.attention_fraction;

        match previous {
            Some(alert) if fraction <= self.clear_threshold => {
                info!(
                    tick = tick,
                    alert_id = %alert.id,
                    attention_percent = summary.attention_percent(),
                    "Standing alert cleared"
                );
                (None, Some(StandingChange::Cleared))
            }
            Some(alert) => {
                let mut alert = alert.clone();
                alert.message = self.render_standing(summary);
                (Some(alert), None)
            }
            None if fraction > self.raise_threshold => {
                let alert = Alert::new(
                    rng,
                    FLEET_SCOPE,
                    self.standing_level,
                    self.render_standing(summary),
                    tick,
                    now,
                );
                info!(
                    tick = tick,
                    alert_id = %alert.id,
                    attention_percent = summary.attention_percent(),
                    "Standing alert raised"
                );
                (Some(alert), Some(StandingChange::Raised))
            }
            None => (None, None),
        }
    }

    /// Build a transient alert, or `None` when `severity` is below the
    /// configured minimum.
    pub fn transient<R: Rng + ?Sized>(
        &self,
        source: &str,
        severity: SeverityLevel,
        message: &str,
        tick: u64,
        now: DateTime<Utc>,
        rng: &mut R,
    ) -> Option<Alert> {
        if severity < self.transient_min_level {
            return None;
        }
        Some(Alert::new(rng, source, severity, message, tick, now).with_ttl(self.transient_ttl_ticks))
    }

    fn render_standing(&self, summary: &Summary) -> String {
        self.standing_message
            .replace("{percent}", &format!("{:.0}", summary.attention_percent()))
            .replace("{count}", &summary.attention_count.to_string())
            .replace("{total}", &summary.entity_count.to_string())
    }
}

/// Drop the displayed transient alert once its TTL has elapsed.
pub fn expire(current: Option<&Alert>, tick: u64) -> Option<Alert> {
    current.filter(|alert| alert.is_live(tick)).cloned()
}

/// Offer a newly fired transient alert for display.
///
/// It replaces the displayed alert when nothing live is shown or when it is at
/// least as severe; a lower-severity alert never preempts a live higher one.
/// Returns whether the candidate was accepted.
pub fn offer(current: &mut Option<Alert>, candidate: Alert, tick: u64) -> bool {
    let accept = match current.as_ref() {
        Some(shown) if shown.is_live(tick) => candidate.severity >= shown.severity,
        _ => true,
    };
    if accept {
        *current = Some(candidate);
    }
    accept
}

/// Pick the single most relevant alert among the given ones
pub fn headline<'a>(alerts: impl IntoIterator<Item = &'a Alert>) -> Option<&'a Alert> {
    alerts.into_iter().fold(None, |best: Option<&Alert>, alert| match best {
        Some(b) if !alert.outranks(b) => Some(b),
        _ => Some(alert),
    })
}

fn fraction(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}
