use crate::alert::AlertAggregator;
use crate::classify::ThresholdClassifier;
use crate::config::{build_model, ConfigError, FleetConfig};
use crate::state::EntityStateMachine;
use crate::walk::BoundedRandomWalk;
use std::collections::BTreeMap;
use std::time::Duration;

/// Validated, immutable simulation model compiled from a `FleetConfig`.
#[derive(Debug, Clone)]
pub struct Model {
    pub tick_period: Duration,
    pub seed: Option<u64>,
    pub stations: Vec<StationModel>,
    pub classifier: ThresholdClassifier,
    pub machines: BTreeMap<String, EntityStateMachine>,
    pub entities: Vec<EntitySeed>,
    pub aggregator: AlertAggregator,
}

#[derive(Debug, Clone)]
pub struct StationModel {
    pub id: String,
    pub name: String,
    pub readings: Vec<ReadingModel>,
}

#[derive(Debug, Clone)]
pub struct ReadingModel {
    pub id: String,
    pub quantity: String,
    pub unit: String,
    pub initial: f64,
    pub walk: BoundedRandomWalk,
}

/// Entity created at simulation start
#[derive(Debug, Clone)]
pub struct EntitySeed {
    pub id: String,
    pub kind: String,
    pub initial_score: Option<f64>,
}

impl Model {
    pub fn from_config(config: &FleetConfig) -> Result<Self, ConfigError> {
        build_model(config)
    }

    pub fn machine(&self, kind: &str) -> Option<&EntityStateMachine> {
        self.machines.get(kind)
    }

    pub fn station(&self, id: &str) -> Option<&StationModel> {
        self.stations.iter().find(|s| s.id == id)
    }
}
