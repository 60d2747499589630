use crate::alert::{self, Alert, Summary};
use crate::classify::SeverityLevel;
use crate::state::{Entity, Reading};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[cfg(test)]
mod tests;

/// Classified status of one station
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StationStatus {
    pub id: String,
    pub name: String,
    pub level: SeverityLevel,
    /// Domain label of `level` (e.g., "Loud")
    pub label: String,
    pub message: String,
}

/// World state at the end of one tick.
///
/// Produced once per tick from the previous snapshot and never mutated
/// afterwards; renderers receive shared, read-only copies.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub tick: u64,

    pub generated_at: DateTime<Utc>,

    pub readings: Vec<Reading>,

    pub stations: Vec<StationStatus>,

    pub entities: Vec<Entity>,

    pub summary: Summary,

    /// Condition-driven fleet alert, present while the attention fraction is high
    pub standing_alert: Option<Alert>,

    /// Most relevant live transient alert
    pub transient_alert: Option<Alert>,
}

impl Snapshot {
    pub fn entity(&self, id: &str) -> Option<&Entity> {
        self.entities.iter().find(|e| e.id == id)
    }

    pub fn reading(&self, id: &str) -> Option<&Reading> {
        self.readings.iter().find(|r| r.id == id)
    }

    pub fn station(&self, id: &str) -> Option<&StationStatus> {
        self.stations.iter().find(|s| s.id == id)
    }

    /// Single headline alert: the most severe of the standing and transient
    /// alerts, newest among equals.
    pub fn headline(&self) -> Option<&Alert> {
        alert::headline(self.transient_alert.iter().chain(self.standing_alert.iter()))
    }

    /// All alerts currently shown, including per-entity ones
    pub fn active_alerts(&self) -> Vec<&Alert> {
        self.standing_alert
            .iter()
            .chain(self.transient_alert.iter())
            .chain(self.entities.iter().filter_map(|e| e.alert.as_ref()))
            .collect()
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }
}
