use crate::alert::{Alert, Summary};
use crate::snapshot::{Snapshot, StationStatus};
use crate::state::{Entity, Reading};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Client → Server message types
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// Restrict entity updates to the subscribed ids
    #[serde(rename = "subscribe")]
    Subscribe { entity_id: String },
    #[serde(rename = "unsubscribe")]
    Unsubscribe { entity_id: String },
}

/// Server → Client: one tick of the simulation
#[derive(Debug, Clone, Serialize)]
pub struct SnapshotMessage {
    #[serde(rename = "type")]
    pub msg_type: String,
    pub tick: u64,
    pub timestamp: DateTime<Utc>,
    pub readings: Vec<Reading>,
    pub stations: Vec<StationStatus>,
    pub entities: Vec<Entity>,
    pub summary: Summary,
    pub headline: Option<Alert>,
    pub standing_alert: Option<Alert>,
    pub transient_alert: Option<Alert>,
}

impl SnapshotMessage {
    /// Build a message, keeping only `entity_ids` when the set is non-empty
    pub fn filtered(snapshot: &Snapshot, entity_ids: &HashSet<String>) -> Self {
        let entities = snapshot
            .entities
            .iter()
            .filter(|e| entity_ids.is_empty() || entity_ids.contains(&e.id))
            .cloned()
            .collect();

        Self {
            msg_type: "snapshot".to_string(),
            tick: snapshot.tick,
            timestamp: snapshot.generated_at,
            readings: snapshot.readings.clone(),
            stations: snapshot.stations.clone(),
            entities,
            summary: snapshot.summary.clone(),
            headline: snapshot.headline().cloned(),
            standing_alert: snapshot.standing_alert.clone(),
            transient_alert: snapshot.transient_alert.clone(),
        }
    }
}

impl From<&Snapshot> for SnapshotMessage {
    fn from(snapshot: &Snapshot) -> Self {
        Self::filtered(snapshot, &HashSet::new())
    }
}

/// Server → Client: Error message
#[derive(Debug, Clone, Serialize)]
pub struct ErrorMessage {
    #[serde(rename = "type")]
    pub msg_type: String,
    pub error: String,
}

impl ErrorMessage {
    pub fn new(error: String) -> Self {
        Self {
            msg_type: "error".to_string(),
            error,
        }
    }
}
