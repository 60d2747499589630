use crate::alert::Alert;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Role of an entity state within the shared machine shape.
///
/// Kinds give each phase their own label ("vacant", "occupied", ...) and may
/// omit the maintenance phases entirely.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    Active,
    MaintenanceNeeded,
    MaintenanceInProgress,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::Active => "active",
            Phase::MaintenanceNeeded => "maintenance_needed",
            Phase::MaintenanceInProgress => "maintenance_in_progress",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Simulated entity (restroom stall, parking slot, hospital bed, ...)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Unique entity identifier (e.g., "stall-03")
    pub id: String,

    /// Entity kind name, selects the state machine
    pub kind: String,

    pub phase: Phase,

    /// Kind-specific label of the current phase (e.g., "needs_cleaning")
    pub state: String,

    /// Tick at which the current phase was entered
    pub entered_tick: u64,

    pub entered_at: DateTime<Utc>,

    /// Usage and secondary-action counters
    pub counters: BTreeMap<String, u64>,

    /// Degrading quality score (e.g., cleanliness)
    pub score: f64,

    /// Long-dwell annotation; never drives a transition
    pub warning: Option<String>,

    /// Standing per-entity alert (e.g., "needs cleaning")
    pub alert: Option<Alert>,
}

impl Entity {
    /// Ticks spent in the current phase as of `tick`
    pub fn dwell(&self, tick: u64) -> u64 {
        tick.saturating_sub(self.entered_tick)
    }

    pub fn counter(&self, name: &str) -> u64 {
        self.counters.get(name).copied().unwrap_or(0)
    }
}

/// One observed phase change
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    pub entity_id: String,
    pub from: Phase,
    pub to: Phase,
    pub tick: u64,
    /// True when applied through a manual override
    pub manual: bool,
}
