use crate::alert::{self, Alert, StandingChange};
use crate::classify::SeverityLevel;
use crate::clock::Clock;
use crate::model::Model;
use crate::snapshot::{Snapshot, StationStatus};
use crate::state::entity::{Entity, Transition};
use crate::state::machine::{ManualAction, OverrideError};
use crate::state::reading::Reading;
use rand::Rng;
use std::sync::Arc;
use tracing::{debug, info};

/// Result of advancing the world by one tick
#[derive(Clone, Debug)]
pub struct TickOutcome {
    pub snapshot: Snapshot,
    pub transitions: Vec<Transition>,
    /// Transient alerts fired this tick, whether or not they were displayed
    pub fired: Vec<Alert>,
    pub standing_change: Option<StandingChange>,
}

/// Result of an accepted manual override
#[derive(Clone, Debug)]
pub struct OverrideOutcome {
    pub snapshot: Snapshot,
    pub entity: Entity,
    pub transition: Transition,
    pub standing_change: Option<StandingChange>,
}

/// Produces snapshots from previous snapshots.
///
/// Every operation is a pure function of its inputs plus the injected RNG and
/// clock: the same seed and the same start snapshot reproduce the same run.
#[derive(Clone, Debug)]
pub struct StateEngine {
    model: Arc<Model>,
}

impl StateEngine {
    pub fn new(model: Arc<Model>) -> Self {
        Self { model }
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    /// Build the tick-0 snapshot from the model's initial values
    pub fn initial<R: Rng + ?Sized>(&self, rng: &mut R, clock: &dyn Clock) -> Snapshot {
        let now = clock.now();
        let model = &self.model;

        let readings: Vec<Reading> = model
            .stations
            .iter()
            .flat_map(|station| {
                station.readings.iter().map(move |rm| Reading {
                    id: rm.id.clone(),
                    station: station.id.clone(),
                    quantity: rm.quantity.clone(),
                    unit: rm.unit.clone(),
                    value: rm.initial,
                    lower: rm.walk.lower,
                    upper: rm.walk.upper,
                    last_updated: now,
                })
            })
            .collect();

        let entities: Vec<Entity> = model
            .entities
            .iter()
            .filter_map(|seed| {
                model
                    .machine(&seed.kind)
                    .map(|machine| machine.spawn(&seed.id, seed.initial_score, 0, now))
            })
            .collect();

        let stations = self.classify_stations(&readings);
        let summary = model.aggregator.summarize(&readings, &stations, &entities);
        let (standing_alert, _) = model
            .aggregator
            .update_standing(None, &summary, 0, now, rng);

        Snapshot {
            tick: 0,
            generated_at: now,
            readings,
            stations,
            entities,
            summary,
            standing_alert,
            transient_alert: None,
        }
    }

    /// Advance every reading and entity by one tick.
    ///
    /// Each reading and entity moves from its own value in `prev` only, so all
    /// of them move simultaneously. Classification and alerts are then derived
    /// from the freshly advanced values of this same tick.
    pub fn advance<R: Rng + ?Sized>(
        &self,
        prev: &Snapshot,
        rng: &mut R,
        clock: &dyn Clock,
    ) -> TickOutcome {
        let model = &self.model;
        let tick = prev.tick + 1;
        let now = clock.now();

        let mut readings = Vec::with_capacity(prev.readings.len());
        for station in &model.stations {
            for rm in &station.readings {
                let previous = prev.reading(&rm.id).map_or(rm.initial, |r| r.value);
                readings.push(Reading {
                    id: rm.id.clone(),
                    station: station.id.clone(),
                    quantity: rm.quantity.clone(),
                    unit: rm.unit.clone(),
                    value: rm.walk.step(previous, rng),
                    lower: rm.walk.lower,
                    upper: rm.walk.upper,
                    last_updated: now,
                });
            }
        }

        let mut transitions = Vec::new();
        let mut entities = Vec::with_capacity(prev.entities.len());
        for entity in &prev.entities {
            match model.machine(&entity.kind) {
                Some(machine) => {
                    let (next, transition) = machine.step(entity, tick, now, rng);
                    transitions.extend(transition);
                    entities.push(next);
                }
                None => entities.push(entity.clone()),
            }
        }

        let stations = self.classify_stations(&readings);
        let summary = model.aggregator.summarize(&readings, &stations, &entities);
        let (standing_alert, standing_change) = model.aggregator.update_standing(
            prev.standing_alert.as_ref(),
            &summary,
            tick,
            now,
            rng,
        );

        let mut fired = Vec::new();
        for status in &stations {
            let before = prev
                .station(&status.id)
                .map_or(SeverityLevel::LOWEST, |s| s.level);
            if status.level > before {
                let message = format!("{}: {}", status.name, status.message);
                fired.extend(
                    model
                        .aggregator
                        .transient(&status.id, status.level, &message, tick, now, rng),
                );
            }
        }
        for entity in &entities {
            if let Some(entity_alert) = entity.alert.as_ref().filter(|a| a.created_tick == tick) {
                fired.extend(model.aggregator.transient(
                    &entity.id,
                    entity_alert.severity,
                    &entity_alert.message,
                    tick,
                    now,
                    rng,
                ));
            }
        }

        let mut transient_alert = alert::expire(prev.transient_alert.as_ref(), tick);
        for candidate in &fired {
            let shown = alert::offer(&mut transient_alert, candidate.clone(), tick);
            info!(
                tick = tick,
                source = %candidate.source,
                severity = %candidate.severity,
                shown = shown,
                "Transient alert fired"
            );
        }

        debug!(
            tick = tick,
            transitions = transitions.len(),
            worst_level = %summary.worst_level,
            attention_percent = summary.attention_percent(),
            "Tick advanced"
        );

        TickOutcome {
            snapshot: Snapshot {
                tick,
                generated_at: now,
                readings,
                stations,
                entities,
                summary,
                standing_alert,
                transient_alert,
            },
            transitions,
            fired,
            standing_change,
        }
    }

    /// Apply an operator action to one entity of `prev`.
    ///
    /// The action is validated against the entity's current phase; on
    /// rejection nothing changes. Accepted actions go through the same
    /// transition effects as automatic ones and keep the tick number.
    pub fn apply_override<R: Rng + ?Sized>(
        &self,
        prev: &Snapshot,
        entity_id: &str,
        action: ManualAction,
        rng: &mut R,
        clock: &dyn Clock,
    ) -> Result<OverrideOutcome, OverrideError> {
        let model = &self.model;
        let index = prev
            .entities
            .iter()
            .position(|e| e.id == entity_id)
            .ok_or_else(|| OverrideError::UnknownEntity(entity_id.to_string()))?;
        let current = &prev.entities[index];
        let machine = model
            .machine(&current.kind)
            .ok_or_else(|| OverrideError::UnknownEntity(entity_id.to_string()))?;

        let tick = prev.tick;
        let now = clock.now();
        let (entity, transition) = machine.apply_manual(current, action, tick, now, rng)?;

        let mut entities = prev.entities.clone();
        entities[index] = entity.clone();

        let summary = model
            .aggregator
            .summarize(&prev.readings, &prev.stations, &entities);
        let (standing_alert, standing_change) = model.aggregator.update_standing(
            prev.standing_alert.as_ref(),
            &summary,
            tick,
            now,
            rng,
        );

        let mut transient_alert = alert::expire(prev.transient_alert.as_ref(), tick);
        if let Some(entity_alert) = &entity.alert {
            if let Some(candidate) = model.aggregator.transient(
                &entity.id,
                entity_alert.severity,
                &entity_alert.message,
                tick,
                now,
                rng,
            ) {
                alert::offer(&mut transient_alert, candidate, tick);
            }
        }

        info!(
            entity_id = %entity.id,
            action = %action,
            from = %transition.from,
            to = %transition.to,
            tick = tick,
            "Manual override applied"
        );

        Ok(OverrideOutcome {
            snapshot: Snapshot {
                tick,
                generated_at: now,
                readings: prev.readings.clone(),
                stations: prev.stations.clone(),
                entities,
                summary,
                standing_alert,
                transient_alert,
            },
            entity,
            transition,
            standing_change,
        })
    }

    fn classify_stations(&self, readings: &[Reading]) -> Vec<StationStatus> {
        self.model
            .stations
            .iter()
            .map(|station| {
                let values: Vec<(&str, f64)> = readings
                    .iter()
                    .filter(|r| r.station == station.id)
                    .map(|r| (r.quantity.as_str(), r.value))
                    .collect();
                let result = self.model.classifier.classify(&values);
                StationStatus {
                    id: station.id.clone(),
                    name: station.name.clone(),
                    level: result.level,
                    label: result.label,
                    message: result.message,
                }
            })
            .collect()
    }
}

