// End-to-end simulation runs over the public library API

use fleetwatch::classify::SeverityLevel;
use fleetwatch::clock::ManualClock;
use fleetwatch::config::{build_model, load_config, parse_config, presets, FleetConfig};
use fleetwatch::snapshot::Snapshot;
use fleetwatch::state::{Phase, StateEngine};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::io::Write;
use std::sync::Arc;

fn run(config: &FleetConfig, seed: u64, ticks: u64) -> Vec<Snapshot> {
    let engine = StateEngine::new(Arc::new(build_model(config).unwrap()));
    let clock = ManualClock::at_epoch();
    let mut rng = StdRng::seed_from_u64(seed);

    let mut snapshots = vec![engine.initial(&mut rng, &clock)];
    for _ in 0..ticks {
        clock.advance(chrono::Duration::seconds(2));
        let next = engine
            .advance(snapshots.last().unwrap(), &mut rng, &clock)
            .snapshot;
        snapshots.push(next);
    }
    snapshots
}

#[test]
fn test_every_preset_runs_within_invariants() {
    for name in presets::NAMES {
        let config = FleetConfig::from_preset(name).unwrap();
        let snapshots = run(&config, 99, 200);

        for snapshot in &snapshots {
            for reading in &snapshot.readings {
                assert!(reading.in_bounds(), "{}: {} out of bounds", name, reading.id);
            }
            for entity in &snapshot.entities {
                // Per-entity alerts exist exactly while maintenance is needed
                assert_eq!(
                    entity.alert.is_some(),
                    entity.phase == Phase::MaintenanceNeeded,
                    "{}: {}",
                    name,
                    entity.id
                );
            }
            if let Some(transient) = &snapshot.transient_alert {
                assert!(transient.is_live(snapshot.tick));
            }
        }
    }
}

#[test]
fn test_standing_alert_tracks_threshold() {
    let config = FleetConfig::from_preset("restroom").unwrap();
    let aggregator = config.alerts.clone().unwrap().to_aggregator();

    for snapshot in run(&config, 5, 500) {
        let fraction = snapshot.summary.attention_fraction;
        if fraction > aggregator.raise_threshold {
            assert!(snapshot.standing_alert.is_some(), "tick {}", snapshot.tick);
        }
        if fraction <= aggregator.clear_threshold {
            assert!(snapshot.standing_alert.is_none(), "tick {}", snapshot.tick);
        }
    }
}

#[test]
fn test_transient_alerts_expire_on_schedule() {
    let config = FleetConfig::from_preset("noise").unwrap();
    let ttl = config.alerts.clone().unwrap_or_default().transient_ttl_ticks;

    for snapshot in run(&config, 1234, 400) {
        if let Some(alert) = &snapshot.transient_alert {
            assert!(snapshot.tick >= alert.created_tick);
            assert!(snapshot.tick < alert.created_tick + ttl);
        }
    }
}

#[test]
fn test_station_level_matches_worst_reading() {
    let config = FleetConfig::from_preset("air_quality").unwrap();
    let model = build_model(&config).unwrap();

    for snapshot in run(&config, 8, 100) {
        for station in &snapshot.stations {
            let values: Vec<(&str, f64)> = snapshot
                .readings
                .iter()
                .filter(|r| r.station == station.id)
                .map(|r| (r.quantity.as_str(), r.value))
                .collect();
            let single_max = model
                .classifier
                .rules()
                .iter()
                .filter_map(|rule| {
                    values
                        .iter()
                        .find(|(q, _)| *q == rule.quantity)
                        .and_then(|(_, v)| rule.evaluate(*v))
                        .map(|f| f.level)
                })
                .max()
                .unwrap_or(SeverityLevel::LOWEST);
            assert!(station.level >= single_max);
        }
    }
}

#[test]
fn test_identical_seeds_identical_runs() {
    let config = FleetConfig::from_preset("hospital").unwrap();
    assert_eq!(run(&config, 77, 150), run(&config, 77, 150));
}

#[test]
fn test_load_config_file_with_preset() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
[simulation]
tick_period_ms = 500
seed = 3
preset = "parking"

[alerts]
attention_phases = ["active"]
raise_threshold = 0.5
"#
    )
    .unwrap();

    let config = load_config(file.path()).unwrap().resolve_preset().unwrap();
    let model = build_model(&config).unwrap();

    assert_eq!(model.tick_period.as_millis(), 500);
    assert_eq!(model.seed, Some(3));
    assert_eq!(model.aggregator.raise_threshold, 0.5);
    assert!(!model.entities.is_empty());
}

#[test]
fn test_missing_config_file_reports_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.toml");

    let err = load_config(&path).unwrap_err();
    assert!(err.to_string().contains("absent.toml"));
}

#[test]
fn test_custom_station_config() {
    let config = parse_config(
        r#"
[[stations]]
id = "hall"
readings = [
    { quantity = "noise_db", unit = "dB", initial = 50.0, lower = 30.0, upper = 120.0, amplitude = 0.0 },
]

[classifier]
normal_message = "Quiet"

[[classifier.rules]]
quantity = "noise_db"
bands = [
    { max = 70.0, level = "good" },
    { min = 70.0, level = "high", message = "Loud ({value} dB)" },
]
"#,
    )
    .unwrap();

    let snapshots = run(&config, 1, 3);
    let last = snapshots.last().unwrap();
    assert_eq!(last.reading("hall.noise_db").unwrap().value, 50.0);
    assert_eq!(last.station("hall").unwrap().message, "Quiet");
    assert_eq!(last.summary.worst_level, SeverityLevel::Good);
}
