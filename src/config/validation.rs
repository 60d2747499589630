use super::{AlertConfig, ConfigError, FleetConfig};
use crate::classify::ThresholdClassifier;
use crate::model::{EntitySeed, Model, ReadingModel, StationModel};
use crate::state::{EntityStateMachine, Reading};
use crate::walk::BoundedRandomWalk;
use std::collections::{BTreeMap, HashSet};
use std::time::Duration;

/// Highest supported decimal precision for readings
const MAX_PRECISION: u32 = 6;

/// Validates a configuration and compiles it into a `Model`.
///
/// Validation rules:
/// - Tick period must be positive
/// - Station ids and entity ids are unique; quantities unique per station
/// - Reading bounds ordered, initial value within bounds, amplitude non-negative
/// - Spike probability in [0, 1] with `low <= high`
/// - Breakpoint bands contiguous and monotonic in deviation from the safe band
/// - Entity kinds reference only declared phases with probabilities in [0, 1]
/// - Alert thresholds in [0, 1] with `clear <= raise`
pub fn build_model(config: &FleetConfig) -> Result<Model, ConfigError> {
    if config.simulation.tick_period_ms == 0 {
        return Err(ConfigError::InvalidSimulation(
            "tick_period_ms must be positive".to_string(),
        ));
    }

    let stations = build_stations(config)?;
    let classifier = build_classifier(config)?;
    let machines = build_machines(config)?;
    let entities = build_entities(config, &machines)?;

    if stations.is_empty() && entities.is_empty() {
        return Err(ConfigError::Empty);
    }

    let alerts = config.alerts.clone().unwrap_or_default();
    validate_alerts(&alerts)?;

    Ok(Model {
        tick_period: Duration::from_millis(config.simulation.tick_period_ms),
        seed: config.simulation.seed,
        stations,
        classifier,
        machines,
        entities,
        aggregator: alerts.to_aggregator(),
    })
}

fn build_stations(config: &FleetConfig) -> Result<Vec<StationModel>, ConfigError> {
    let mut seen = HashSet::new();
    let mut stations = Vec::with_capacity(config.stations.len());

    for station in &config.stations {
        if station.id.is_empty() {
            return Err(ConfigError::InvalidReading {
                id: String::new(),
                reason: "station id must not be empty".to_string(),
            });
        }
        if !seen.insert(station.id.clone()) {
            return Err(ConfigError::DuplicateId(station.id.clone()));
        }

        let mut quantities = HashSet::new();
        let mut readings = Vec::with_capacity(station.readings.len());
        for reading in &station.readings {
            let id = Reading::reading_id(&station.id, &reading.quantity);
            if !quantities.insert(reading.quantity.clone()) {
                return Err(ConfigError::DuplicateId(id));
            }
            let invalid = |reason: &str| ConfigError::InvalidReading {
                id: id.clone(),
                reason: reason.to_string(),
            };

            if !(reading.lower <= reading.upper) {
                return Err(invalid("lower bound must not exceed upper bound"));
            }
            if !(reading.lower <= reading.initial && reading.initial <= reading.upper) {
                return Err(invalid("initial value outside bounds"));
            }
            if !(reading.amplitude >= 0.0) || !(2.0 * reading.amplitude).is_finite() {
                return Err(invalid("amplitude must be a non-negative number"));
            }
            if reading.precision > MAX_PRECISION {
                return Err(invalid("precision too large"));
            }

            let mut walk = BoundedRandomWalk::new(reading.lower, reading.upper, reading.amplitude)
                .with_precision(reading.precision);
            if let Some(spike) = reading.spike {
                if !(0.0..=1.0).contains(&spike.probability) {
                    return Err(invalid("spike probability outside [0, 1]"));
                }
                if !(spike.low <= spike.high) {
                    return Err(invalid("spike low must not exceed spike high"));
                }
                if !(spike.high - spike.low).is_finite() {
                    return Err(invalid("spike range must be finite"));
                }
                walk = walk.with_spike(spike.probability, spike.low, spike.high);
            }

            readings.push(ReadingModel {
                id,
                quantity: reading.quantity.clone(),
                unit: reading.unit.clone(),
                initial: walk.settle(reading.initial),
                walk,
            });
        }

        stations.push(StationModel {
            id: station.id.clone(),
            name: station.name.clone().unwrap_or_else(|| station.id.clone()),
            readings,
        });
    }

    Ok(stations)
}

fn build_classifier(config: &FleetConfig) -> Result<ThresholdClassifier, ConfigError> {
    let classifier = config.classifier.clone().unwrap_or_default();

    let mut quantities = HashSet::new();
    for rule in &classifier.rules {
        if !quantities.insert(rule.quantity.clone()) {
            return Err(ConfigError::InvalidRule {
                rule: rule.quantity.clone(),
                reason: "more than one rule for this quantity".to_string(),
            });
        }
        rule.validate().map_err(|reason| ConfigError::InvalidRule {
            rule: rule.quantity.clone(),
            reason,
        })?;
    }
    for rule in &classifier.compound {
        rule.validate().map_err(|reason| ConfigError::InvalidRule {
            rule: rule.name.clone(),
            reason,
        })?;
    }

    Ok(ThresholdClassifier::new(
        classifier.rules,
        classifier.compound,
        classifier.normal_message,
        classifier.labels,
    ))
}

fn build_machines(
    config: &FleetConfig,
) -> Result<BTreeMap<String, EntityStateMachine>, ConfigError> {
    let mut machines = BTreeMap::new();
    for def in &config.entity_kinds {
        if machines.contains_key(&def.name) {
            return Err(ConfigError::DuplicateId(def.name.clone()));
        }
        let machine =
            EntityStateMachine::new(def.clone()).map_err(|reason| ConfigError::InvalidKind {
                kind: def.name.clone(),
                reason,
            })?;
        machines.insert(def.name.clone(), machine);
    }
    Ok(machines)
}

fn build_entities(
    config: &FleetConfig,
    machines: &BTreeMap<String, EntityStateMachine>,
) -> Result<Vec<EntitySeed>, ConfigError> {
    let mut seen = HashSet::new();
    let mut entities = Vec::new();

    for group in &config.entity_groups {
        if !machines.contains_key(&group.kind) {
            return Err(ConfigError::UnknownKind(group.kind.clone()));
        }
        if let Some(score) = group.initial_score {
            if !score.is_finite() {
                return Err(ConfigError::InvalidKind {
                    kind: group.kind.clone(),
                    reason: format!("initial_score {} is not a number", score),
                });
            }
        }
        let prefix = group.id_prefix.as_deref().unwrap_or(&group.kind);
        for n in 1..=group.count {
            let id = format!("{}-{:02}", prefix, n);
            if !seen.insert(id.clone()) {
                return Err(ConfigError::DuplicateId(id));
            }
            entities.push(EntitySeed {
                id,
                kind: group.kind.clone(),
                initial_score: group.initial_score,
            });
        }
    }

    Ok(entities)
}

fn validate_alerts(alerts: &AlertConfig) -> Result<(), ConfigError> {
    let in_unit = |v: f64| (0.0..=1.0).contains(&v);

    if !in_unit(alerts.raise_threshold) {
        return Err(ConfigError::InvalidAlerts(
            "raise_threshold must be within [0, 1]".to_string(),
        ));
    }
    if let Some(clear) = alerts.clear_threshold {
        if !in_unit(clear) || clear > alerts.raise_threshold {
            return Err(ConfigError::InvalidAlerts(
                "clear_threshold must be within [0, raise_threshold]".to_string(),
            ));
        }
    }
    if alerts.attention_phases.is_empty() {
        return Err(ConfigError::InvalidAlerts(
            "attention_phases must not be empty".to_string(),
        ));
    }
    if alerts.transient_ttl_ticks == 0 {
        return Err(ConfigError::InvalidAlerts(
            "transient_ttl_ticks must be positive".to_string(),
        ));
    }

    Ok(())
}
