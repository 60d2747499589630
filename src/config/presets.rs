// Built-in domain presets, embedded as TOML

use super::{ConfigError, FleetConfig};

/// Names accepted by `load`
pub const NAMES: [&str; 7] = [
    "restroom",
    "parking",
    "hospital",
    "noise",
    "air_quality",
    "power_grid",
    "weather",
];

fn source(name: &str) -> Option<&'static str> {
    let text = match name {
        "restroom" => include_str!("presets/restroom.toml"),
        "parking" => include_str!("presets/parking.toml"),
        "hospital" => include_str!("presets/hospital.toml"),
        "noise" => include_str!("presets/noise.toml"),
        "air_quality" => include_str!("presets/air_quality.toml"),
        "power_grid" => include_str!("presets/power_grid.toml"),
        "weather" => include_str!("presets/weather.toml"),
        _ => return None,
    };
    Some(text)
}

/// Parse a preset by name
pub fn load(name: &str) -> Result<FleetConfig, ConfigError> {
    let text = source(name).ok_or_else(|| ConfigError::UnknownPreset(name.to_string()))?;
    Ok(toml::from_str(text)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Phase;

    #[test]
    fn test_all_presets_parse() {
        for name in NAMES {
            assert!(load(name).is_ok(), "preset {} failed to parse", name);
        }
    }

    #[test]
    fn test_restroom_preset_shape() {
        let config = load("restroom").unwrap();
        let stall = &config.entity_kinds[0];
        assert_eq!(stall.labels.idle, "vacant");
        assert_eq!(stall.labels.maintenance_needed.as_deref(), Some("needs_cleaning"));
        assert!(stall.degradation.is_some());
        assert_eq!(stall.counters.len(), 3);
        assert_eq!(
            config.alerts.unwrap().attention_phases,
            vec![Phase::MaintenanceNeeded]
        );
    }

    #[test]
    fn test_air_quality_has_co2_breakpoints() {
        let config = load("air_quality").unwrap();
        let classifier = config.classifier.unwrap();
        let co2 = classifier
            .rules
            .iter()
            .find(|r| r.quantity == "co2")
            .unwrap();
        let edges: Vec<f64> = co2.bands.iter().filter_map(|b| b.max).collect();
        assert_eq!(edges, vec![800.0, 1200.0, 1800.0]);
    }

    #[test]
    fn test_unknown_preset() {
        assert!(matches!(load("moonbase"), Err(ConfigError::UnknownPreset(_))));
    }
}
