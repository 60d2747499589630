pub mod presets;
mod validation;

pub use validation::build_model;

use crate::alert::AlertAggregator;
use crate::classify::{CompoundRule, ReadingRule, SeverityLabels, SeverityLevel};
use crate::state::{KindDefinition, Phase};
use crate::walk::Spike;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::warn;

/// Configuration loading and validation errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("unknown preset '{0}'")]
    UnknownPreset(String),

    #[error("invalid simulation settings: {0}")]
    InvalidSimulation(String),

    #[error("invalid reading '{id}': {reason}")]
    InvalidReading { id: String, reason: String },

    #[error("invalid classifier rule '{rule}': {reason}")]
    InvalidRule { rule: String, reason: String },

    #[error("invalid entity kind '{kind}': {reason}")]
    InvalidKind { kind: String, reason: String },

    #[error("entity group references unknown kind '{0}'")]
    UnknownKind(String),

    #[error("duplicate id '{0}'")]
    DuplicateId(String),

    #[error("invalid alert settings: {0}")]
    InvalidAlerts(String),

    #[error("nothing to simulate: no stations and no entities configured")]
    Empty,
}

/// Complete fleetwatch configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FleetConfig {
    #[serde(default)]
    pub simulation: SimulationConfig,
    #[serde(default)]
    pub stations: Vec<StationConfig>,
    #[serde(default)]
    pub classifier: Option<ClassifierConfig>,
    #[serde(default)]
    pub entity_kinds: Vec<KindDefinition>,
    #[serde(default)]
    pub entity_groups: Vec<EntityGroupConfig>,
    #[serde(default)]
    pub alerts: Option<AlertConfig>,
    #[serde(default)]
    pub api: ApiConfig,
}

/// Tick driver settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    #[serde(default = "default_tick_period_ms")]
    pub tick_period_ms: u64,
    /// Fixed RNG seed; entropy-seeded when absent
    #[serde(default)]
    pub seed: Option<u64>,
    /// Built-in domain preset filling any section left empty
    #[serde(default)]
    pub preset: Option<String>,
}

fn default_tick_period_ms() -> u64 {
    2000
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            tick_period_ms: default_tick_period_ms(),
            seed: None,
            preset: None,
        }
    }
}

/// Group of readings classified together (one dashboard tile)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StationConfig {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub readings: Vec<ReadingConfig>,
}

/// One numeric quantity and its walk parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadingConfig {
    pub quantity: String,
    #[serde(default)]
    pub unit: String,
    pub initial: f64,
    pub lower: f64,
    pub upper: f64,
    pub amplitude: f64,
    /// Decimal places kept after every step
    #[serde(default)]
    pub precision: u32,
    #[serde(default)]
    pub spike: Option<Spike>,
}

/// Breakpoint and compound rules shared by all stations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    #[serde(default = "default_normal_message")]
    pub normal_message: String,
    #[serde(default)]
    pub rules: Vec<ReadingRule>,
    #[serde(default)]
    pub compound: Vec<CompoundRule>,
    #[serde(default)]
    pub labels: SeverityLabels,
}

fn default_normal_message() -> String {
    "All readings normal".to_string()
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            normal_message: default_normal_message(),
            rules: Vec::new(),
            compound: Vec::new(),
            labels: SeverityLabels::default(),
        }
    }
}

/// `count` entities of one kind, named "{id_prefix}-01", "{id_prefix}-02", ...
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityGroupConfig {
    pub kind: String,
    pub count: usize,
    #[serde(default)]
    pub id_prefix: Option<String>,
    #[serde(default)]
    pub initial_score: Option<f64>,
}

/// Standing and transient alert policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertConfig {
    #[serde(default = "default_attention_phases")]
    pub attention_phases: Vec<Phase>,
    #[serde(default = "default_raise_threshold")]
    pub raise_threshold: f64,
    /// Separate clear threshold; defaults to `raise_threshold`
    #[serde(default)]
    pub clear_threshold: Option<f64>,
    #[serde(default = "default_standing_level")]
    pub standing_level: SeverityLevel,
    #[serde(default = "default_standing_message")]
    pub standing_message: String,
    #[serde(default = "default_transient_ttl_ticks")]
    pub transient_ttl_ticks: u64,
    #[serde(default = "default_transient_min_level")]
    pub transient_min_level: SeverityLevel,
}

fn default_attention_phases() -> Vec<Phase> {
    vec![Phase::MaintenanceNeeded]
}

fn default_raise_threshold() -> f64 {
    0.30
}

fn default_standing_level() -> SeverityLevel {
    SeverityLevel::High
}

fn default_standing_message() -> String {
    "{percent}% of entities need attention".to_string()
}

fn default_transient_ttl_ticks() -> u64 {
    5
}

fn default_transient_min_level() -> SeverityLevel {
    SeverityLevel::Critical
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            attention_phases: default_attention_phases(),
            raise_threshold: default_raise_threshold(),
            clear_threshold: None,
            standing_level: default_standing_level(),
            standing_message: default_standing_message(),
            transient_ttl_ticks: default_transient_ttl_ticks(),
            transient_min_level: default_transient_min_level(),
        }
    }
}

impl AlertConfig {
    pub fn to_aggregator(&self) -> AlertAggregator {
        AlertAggregator {
            attention_phases: self.attention_phases.clone(),
            raise_threshold: self.raise_threshold,
            clear_threshold: self.clear_threshold.unwrap_or(self.raise_threshold),
            standing_level: self.standing_level,
            standing_message: self.standing_message.clone(),
            transient_ttl_ticks: self.transient_ttl_ticks,
            transient_min_level: self.transient_min_level,
        }
    }
}

/// Renderer-facing HTTP API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_api_enabled")]
    pub enabled: bool,
    #[serde(default = "default_bind")]
    pub bind: String,
}

fn default_api_enabled() -> bool {
    true
}

fn default_bind() -> String {
    "0.0.0.0:3000".to_string()
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: default_api_enabled(),
            bind: default_bind(),
        }
    }
}

impl FleetConfig {
    /// Configuration consisting of a single preset
    pub fn from_preset(name: &str) -> Result<Self, ConfigError> {
        let mut config = FleetConfig::default();
        config.simulation.preset = Some(name.to_string());
        config.resolve_preset()
    }

    /// Fill empty sections from `simulation.preset`, if one is named.
    ///
    /// Sections present in the file win over the preset's.
    pub fn resolve_preset(mut self) -> Result<Self, ConfigError> {
        let Some(name) = self.simulation.preset.clone() else {
            return Ok(self);
        };
        let preset = presets::load(&name)?;

        if self.stations.is_empty() {
            self.stations = preset.stations;
        }
        if self.classifier.is_none() {
            self.classifier = preset.classifier;
        }
        if self.entity_kinds.is_empty() {
            self.entity_kinds = preset.entity_kinds;
        }
        if self.entity_groups.is_empty() {
            self.entity_groups = preset.entity_groups;
        }
        if self.alerts.is_none() {
            self.alerts = preset.alerts;
        }

        Ok(self)
    }

    /// Apply `FLEETWATCH_*` environment overrides
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from a key lookup, ignoring unparsable values.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("FLEETWATCH_TICK_MS") {
            match v.parse::<u64>() {
                Ok(ms) => self.simulation.tick_period_ms = ms,
                Err(_) => warn!(value = %v, "Ignoring invalid FLEETWATCH_TICK_MS"),
            }
        }
        if let Some(v) = lookup("FLEETWATCH_SEED") {
            match v.parse::<u64>() {
                Ok(seed) => self.simulation.seed = Some(seed),
                Err(_) => warn!(value = %v, "Ignoring invalid FLEETWATCH_SEED"),
            }
        }
        if let Some(v) = lookup("FLEETWATCH_PRESET") {
            if !v.is_empty() {
                self.simulation.preset = Some(v);
            }
        }
        if let Some(v) = lookup("FLEETWATCH_BIND") {
            if !v.is_empty() {
                self.api.bind = v;
            }
        }
    }
}

/// Load configuration from TOML file
pub fn load_config(path: impl AsRef<Path>) -> Result<FleetConfig, ConfigError> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    parse_config(&contents)
}

/// Parse configuration from TOML text
pub fn parse_config(contents: &str) -> Result<FleetConfig, ConfigError> {
    Ok(toml::from_str(contents)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = FleetConfig::default();
        assert_eq!(config.simulation.tick_period_ms, 2000);
        assert_eq!(config.simulation.seed, None);
        assert!(config.api.enabled);
        assert_eq!(config.api.bind, "0.0.0.0:3000");
        assert!(config.stations.is_empty());

        let alerts = AlertConfig::default();
        assert_eq!(alerts.raise_threshold, 0.30);
        assert_eq!(alerts.attention_phases, vec![Phase::MaintenanceNeeded]);
        assert_eq!(alerts.to_aggregator().clear_threshold, 0.30);
    }

    #[test]
    fn test_config_deserialization() {
        let toml = r#"
            [simulation]
            tick_period_ms = 3000
            seed = 42

            [[stations]]
            id = "lab-1"
            name = "Lab 1"

            [[stations.readings]]
            quantity = "co2"
            unit = "ppm"
            initial = 600.0
            lower = 400.0
            upper = 2500.0
            amplitude = 50.0
            spike = { probability = 0.05, low = 1500.0, high = 2200.0 }

            [classifier]
            normal_message = "Air is fine"

            [[classifier.rules]]
            quantity = "co2"
            bands = [
                { max = 800.0, level = "good" },
                { min = 800.0, max = 1200.0, level = "moderate", message = "CO2 {value} ppm" },
                { min = 1200.0, level = "high", message = "CO2 high" },
            ]

            [[entity_kinds]]
            name = "slot"
            labels = { idle = "free", active = "occupied" }
            edges = [
                { from = "idle", to = "active", probability = 0.2 },
                { from = "active", to = "idle", probability = 0.1, min_dwell_ticks = 3 },
            ]

            [[entity_groups]]
            kind = "slot"
            count = 4

            [alerts]
            attention_phases = ["active"]
            raise_threshold = 0.9
            clear_threshold = 0.8

            [api]
            enabled = false
            bind = "127.0.0.1:4000"
        "#;

        let config = parse_config(toml).unwrap();
        assert_eq!(config.simulation.tick_period_ms, 3000);
        assert_eq!(config.simulation.seed, Some(42));
        assert_eq!(config.stations[0].readings[0].spike.unwrap().probability, 0.05);
        let classifier = config.classifier.as_ref().unwrap();
        assert_eq!(classifier.normal_message, "Air is fine");
        assert_eq!(classifier.rules[0].bands.len(), 3);
        assert_eq!(config.entity_kinds[0].edges[1].min_dwell_ticks, 3);
        assert_eq!(config.entity_groups[0].count, 4);
        let alerts = config.alerts.as_ref().unwrap();
        assert_eq!(alerts.attention_phases, vec![Phase::Active]);
        assert_eq!(alerts.to_aggregator().clear_threshold, 0.8);
        assert!(!config.api.enabled);

        assert!(build_model(&config).is_ok());
    }

    #[test]
    fn test_partial_config() {
        // Missing sections use defaults
        let toml = r#"
            [simulation]
            preset = "parking"
        "#;

        let config = parse_config(toml).unwrap().resolve_preset().unwrap();
        assert_eq!(config.simulation.tick_period_ms, 2000);
        assert!(!config.entity_kinds.is_empty());
        assert!(config.api.enabled);
    }

    #[test]
    fn test_file_sections_win_over_preset() {
        let toml = r#"
            [simulation]
            preset = "restroom"

            [alerts]
            raise_threshold = 0.5
        "#;

        let config = parse_config(toml).unwrap().resolve_preset().unwrap();
        assert_eq!(config.alerts.unwrap().raise_threshold, 0.5);
        assert_eq!(config.entity_kinds[0].name, "stall");
    }

    #[test]
    fn test_unknown_preset() {
        let err = FleetConfig::from_preset("spaceport").unwrap_err();
        assert!(matches!(err, ConfigError::UnknownPreset(name) if name == "spaceport"));
    }

    #[test]
    fn test_parse_error() {
        let err = parse_config("[simulation\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_missing_file() {
        let err = load_config("/nonexistent/fleetwatch.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            ("FLEETWATCH_TICK_MS", "500"),
            ("FLEETWATCH_SEED", "not-a-number"),
            ("FLEETWATCH_PRESET", "noise"),
            ("FLEETWATCH_BIND", "127.0.0.1:9000"),
        ]
        .into_iter()
        .collect();

        let mut config = FleetConfig::default();
        config.simulation.seed = Some(1);
        config.apply_overrides(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.simulation.tick_period_ms, 500);
        assert_eq!(config.simulation.seed, Some(1)); // invalid value ignored
        assert_eq!(config.simulation.preset.as_deref(), Some("noise"));
        assert_eq!(config.api.bind, "127.0.0.1:9000");
    }
}
