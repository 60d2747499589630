use crate::alert::Alert;
use crate::classify::SeverityLevel;
use crate::state::entity::{Entity, Phase, Transition};
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

/// Kind-specific names for each phase. A kind without a maintenance label
/// does not have that phase.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PhaseLabels {
    pub idle: String,
    pub active: String,
    #[serde(default)]
    pub maintenance_needed: Option<String>,
    #[serde(default)]
    pub maintenance_in_progress: Option<String>,
}

/// Declared transition. Edges leaving the same phase are tried in the
/// order they are listed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub from: Phase,
    pub to: Phase,
    /// Per-tick Bernoulli probability. Zero declares an edge that only fires
    /// when forced or requested manually.
    pub probability: f64,
    /// Ticks the entity must have spent in `from` before the trial is drawn
    #[serde(default)]
    pub min_dwell_ticks: u64,
}

/// Score loss applied on every active -> idle transition
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Degradation {
    #[serde(default = "default_max_score")]
    pub max_score: f64,
    pub min_drop: f64,
    pub max_drop: f64,
    /// Falling below this forces the maintenance-needed phase
    pub floor: f64,
}

fn default_max_score() -> f64 {
    100.0
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CounterTrigger {
    EnterActive,
    LeaveActive,
}

/// Counter bumped on a qualifying transition with its own probability
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CounterRule {
    pub name: String,
    pub on: CounterTrigger,
    #[serde(default = "default_counter_probability")]
    pub probability: f64,
}

fn default_counter_probability() -> f64 {
    1.0
}

/// Warning raised while the active phase lasts longer than `after_ticks`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LongDwell {
    pub after_ticks: u64,
    pub message: String,
}

/// Full definition of one entity kind
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct KindDefinition {
    pub name: String,
    pub labels: PhaseLabels,
    pub edges: Vec<Edge>,
    #[serde(default)]
    pub degradation: Option<Degradation>,
    #[serde(default)]
    pub counters: Vec<CounterRule>,
    #[serde(default)]
    pub long_dwell: Option<LongDwell>,
    /// Severity of the per-entity alert raised on entering maintenance-needed
    #[serde(default = "default_alert_level")]
    pub alert_level: SeverityLevel,
}

fn default_alert_level() -> SeverityLevel {
    SeverityLevel::High
}

/// Operator-requested transition
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ManualAction {
    FlagMaintenance,
    StartMaintenance,
    CompleteMaintenance,
}

impl ManualAction {
    pub fn target(&self) -> Phase {
        match self {
            ManualAction::FlagMaintenance => Phase::MaintenanceNeeded,
            ManualAction::StartMaintenance => Phase::MaintenanceInProgress,
            ManualAction::CompleteMaintenance => Phase::Idle,
        }
    }

    fn applicable_from(&self, phase: Phase) -> bool {
        match self {
            ManualAction::CompleteMaintenance => phase == Phase::MaintenanceInProgress,
            _ => phase != self.target(),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ManualAction::FlagMaintenance => "flag_maintenance",
            ManualAction::StartMaintenance => "start_maintenance",
            ManualAction::CompleteMaintenance => "complete_maintenance",
        }
    }
}

impl fmt::Display for ManualAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rejected manual override. The entity is left untouched.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum OverrideError {
    #[error("entity '{0}' not found")]
    UnknownEntity(String),

    #[error("{action} is not applicable in current state '{state}' of entity '{entity_id}'")]
    NotApplicable {
        entity_id: String,
        action: ManualAction,
        state: String,
    },

    #[error("scheduler is not running")]
    SchedulerStopped,
}

/// Stochastic, dwell-gated state machine for one entity kind.
#[derive(Clone, Debug, PartialEq)]
pub struct EntityStateMachine {
    def: KindDefinition,
}

impl EntityStateMachine {
    /// Validate a kind definition and build its machine
    pub fn new(def: KindDefinition) -> Result<Self, String> {
        let machine = Self { def };
        machine.validate()?;
        Ok(machine)
    }

    fn validate(&self) -> Result<(), String> {
        for edge in &self.def.edges {
            if edge.from == edge.to {
                return Err(format!("self-loop edge on '{}'", edge.from));
            }
            for phase in [edge.from, edge.to] {
                if !self.has_phase(phase) {
                    return Err(format!(
                        "edge {} -> {} uses undeclared phase '{}'",
                        edge.from, edge.to, phase
                    ));
                }
            }
            if !(0.0..=1.0).contains(&edge.probability) {
                return Err(format!(
                    "edge {} -> {} probability {} outside [0, 1]",
                    edge.from, edge.to, edge.probability
                ));
            }
        }

        if let Some(d) = &self.def.degradation {
            if !(d.max_score > 0.0) {
                return Err("degradation max_score must be positive".to_string());
            }
            if !(0.0 <= d.min_drop && d.min_drop <= d.max_drop) {
                return Err("degradation needs 0 <= min_drop <= max_drop".to_string());
            }
            if !d.max_drop.is_finite() || !d.max_score.is_finite() {
                return Err("degradation bounds must be finite".to_string());
            }
            if !self.def.edges.iter().any(|e| e.to == Phase::MaintenanceInProgress) {
                return Err(
                    "degradation requires an edge into maintenance_in_progress to restore the score"
                        .to_string(),
                );
            }
            if !(d.floor < d.max_score) {
                return Err("degradation floor must be below max_score".to_string());
            }
            if self.has_phase(Phase::MaintenanceNeeded)
                && !self.allows(Phase::Active, Phase::MaintenanceNeeded)
            {
                return Err(
                    "degradation requires a declared active -> maintenance_needed edge".to_string(),
                );
            }
        }

        for counter in &self.def.counters {
            if counter.name.is_empty() {
                return Err("counter name must not be empty".to_string());
            }
            if !(0.0..=1.0).contains(&counter.probability) {
                return Err(format!(
                    "counter '{}' probability {} outside [0, 1]",
                    counter.name, counter.probability
                ));
            }
        }

        if let Some(long_dwell) = &self.def.long_dwell {
            if long_dwell.after_ticks == 0 {
                return Err("long_dwell.after_ticks must be positive".to_string());
            }
        }

        Ok(())
    }

    pub fn kind(&self) -> &str {
        &self.def.name
    }

    pub fn definition(&self) -> &KindDefinition {
        &self.def
    }

    pub fn has_phase(&self, phase: Phase) -> bool {
        match phase {
            Phase::Idle | Phase::Active => true,
            Phase::MaintenanceNeeded => self.def.labels.maintenance_needed.is_some(),
            Phase::MaintenanceInProgress => self.def.labels.maintenance_in_progress.is_some(),
        }
    }

    pub fn label(&self, phase: Phase) -> &str {
        let labels = &self.def.labels;
        match phase {
            Phase::Idle => &labels.idle,
            Phase::Active => &labels.active,
            Phase::MaintenanceNeeded => labels
                .maintenance_needed
                .as_deref()
                .unwrap_or(phase.as_str()),
            Phase::MaintenanceInProgress => labels
                .maintenance_in_progress
                .as_deref()
                .unwrap_or(phase.as_str()),
        }
    }

    /// Whether `from -> to` belongs to the declared edge set
    pub fn allows(&self, from: Phase, to: Phase) -> bool {
        self.def.edges.iter().any(|e| e.from == from && e.to == to)
    }

    pub fn max_score(&self) -> f64 {
        self.def
            .degradation
            .as_ref()
            .map_or_else(default_max_score, |d| d.max_score)
    }

    /// Create a fresh idle entity of this kind
    pub fn spawn(
        &self,
        id: &str,
        initial_score: Option<f64>,
        tick: u64,
        now: DateTime<Utc>,
    ) -> Entity {
        let max = self.max_score();
        let counters: BTreeMap<String, u64> = self
            .def
            .counters
            .iter()
            .map(|c| (c.name.clone(), 0))
            .collect();

        Entity {
            id: id.to_string(),
            kind: self.def.name.clone(),
            phase: Phase::Idle,
            state: self.label(Phase::Idle).to_string(),
            entered_tick: tick,
            entered_at: now,
            counters,
            score: initial_score
                .filter(|s| s.is_finite())
                .unwrap_or(max)
                .clamp(0.0, max),
            warning: None,
            alert: None,
        }
    }

    /// Advance one entity by one tick.
    ///
    /// Outgoing edges are tried in declaration order; dwell-gated edges are
    /// skipped before drawing. At most one transition fires.
    pub fn step<R: Rng + ?Sized>(
        &self,
        entity: &Entity,
        tick: u64,
        now: DateTime<Utc>,
        rng: &mut R,
    ) -> (Entity, Option<Transition>) {
        let mut next = entity.clone();
        let dwell = entity.dwell(tick);

        let mut target = None;
        for edge in self.def.edges.iter().filter(|e| e.from == entity.phase) {
            if dwell < edge.min_dwell_ticks || edge.probability <= 0.0 {
                continue;
            }
            if rng.gen_bool(edge.probability) {
                target = Some(edge.to);
                break;
            }
        }

        let transition = target.map(|to| self.enter(&mut next, to, tick, now, rng, false));
        self.refresh_warning(&mut next, tick);
        (next, transition)
    }

    /// Apply an operator action, validated against the current phase.
    pub fn apply_manual<R: Rng + ?Sized>(
        &self,
        entity: &Entity,
        action: ManualAction,
        tick: u64,
        now: DateTime<Utc>,
        rng: &mut R,
    ) -> Result<(Entity, Transition), OverrideError> {
        let target = action.target();
        if !action.applicable_from(entity.phase)
            || !self.has_phase(target)
            || !self.allows(entity.phase, target)
        {
            return Err(OverrideError::NotApplicable {
                entity_id: entity.id.clone(),
                action,
                state: entity.state.clone(),
            });
        }

        let mut next = entity.clone();
        let transition = self.enter(&mut next, target, tick, now, rng, true);
        self.refresh_warning(&mut next, tick);
        Ok((next, transition))
    }

    /// Shared effects of every transition, automatic or manual
    fn enter<R: Rng + ?Sized>(
        &self,
        entity: &mut Entity,
        to: Phase,
        tick: u64,
        now: DateTime<Utc>,
        rng: &mut R,
        manual: bool,
    ) -> Transition {
        let from = entity.phase;
        let mut to = to;

        if from == Phase::Active {
            self.bump_counters(entity, CounterTrigger::LeaveActive, rng);

            if to == Phase::Idle {
                if let Some(d) = &self.def.degradation {
                    let width = d.max_drop - d.min_drop;
                    let drop = if width > 0.0 && width.is_finite() {
                        rng.gen_range(d.min_drop..=d.max_drop)
                    } else {
                        d.min_drop
                    };
                    entity.score = (entity.score - drop).max(0.0);
                    if entity.score < d.floor && self.allows(Phase::Active, Phase::MaintenanceNeeded)
                    {
                        to = Phase::MaintenanceNeeded;
                    }
                }
            }
        }

        if to == Phase::Active {
            self.bump_counters(entity, CounterTrigger::EnterActive, rng);
        }

        entity.phase = to;
        entity.state = self.label(to).to_string();
        entity.entered_tick = tick;
        entity.entered_at = now;

        match to {
            Phase::MaintenanceNeeded => {
                let message = format!("{}: {}", entity.id, entity.state.replace('_', " "));
                entity.alert = Some(Alert::new(
                    rng,
                    entity.id.as_str(),
                    self.def.alert_level,
                    message,
                    tick,
                    now,
                ));
            }
            Phase::MaintenanceInProgress => {
                entity.score = self.max_score();
                entity.alert = None;
            }
            Phase::Idle | Phase::Active => entity.alert = None,
        }

        debug!(
            entity_id = %entity.id,
            from = %from,
            to = %to,
            tick = tick,
            manual = manual,
            score = entity.score,
            "Entity transition"
        );

        Transition {
            entity_id: entity.id.clone(),
            from,
            to,
            tick,
            manual,
        }
    }

    fn bump_counters<R: Rng + ?Sized>(
        &self,
        entity: &mut Entity,
        trigger: CounterTrigger,
        rng: &mut R,
    ) {
        for rule in self.def.counters.iter().filter(|c| c.on == trigger) {
            if rng.gen_bool(rule.probability) {
                *entity.counters.entry(rule.name.clone()).or_default() += 1;
            }
        }
    }

    fn refresh_warning(&self, entity: &mut Entity, tick: u64) {
        entity.warning = match &self.def.long_dwell {
            Some(long_dwell)
                if entity.phase == Phase::Active && entity.dwell(tick) > long_dwell.after_ticks =>
            {
                Some(long_dwell.message.clone())
            }
            _ => None,
        };
    }
}
