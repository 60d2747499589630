use super::*;
use crate::alert::AlertAggregator;
use crate::clock::ManualClock;
use crate::config::{build_model, FleetConfig};
use crate::state::{ManualAction, StateEngine};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;

fn epoch() -> DateTime<Utc> {
    DateTime::<Utc>::UNIX_EPOCH
}

fn empty_snapshot() -> Snapshot {
    Snapshot {
        tick: 12,
        generated_at: epoch(),
        readings: Vec::new(),
        stations: Vec::new(),
        entities: Vec::new(),
        summary: AlertAggregator::default().summarize(&[], &[], &[]),
        standing_alert: None,
        transient_alert: None,
    }
}

fn engine(preset: &str) -> StateEngine {
    let config = FleetConfig::from_preset(preset).unwrap();
    StateEngine::new(Arc::new(build_model(&config).unwrap()))
}

#[test]
fn test_headline_none_without_alerts() {
    assert!(empty_snapshot().headline().is_none());
    assert!(empty_snapshot().active_alerts().is_empty());
}

#[test]
fn test_headline_picks_more_severe_alert() {
    let mut rng = StdRng::seed_from_u64(1);
    let mut snapshot = empty_snapshot();
    snapshot.standing_alert = Some(Alert::new(
        &mut rng,
        "fleet",
        SeverityLevel::High,
        "4 of 10 stalls need cleaning",
        3,
        epoch(),
    ));
    snapshot.transient_alert = Some(
        Alert::new(&mut rng, "zone-a", SeverityLevel::Critical, "Ammonia hazard", 10, epoch())
            .with_ttl(5),
    );

    assert_eq!(snapshot.headline().unwrap().source, "zone-a");
    assert_eq!(snapshot.active_alerts().len(), 2);
}

#[test]
fn test_headline_tie_goes_to_transient() {
    let mut rng = StdRng::seed_from_u64(1);
    let mut snapshot = empty_snapshot();
    snapshot.standing_alert = Some(Alert::new(
        &mut rng,
        "fleet",
        SeverityLevel::High,
        "standing",
        7,
        epoch(),
    ));
    snapshot.transient_alert = Some(
        Alert::new(&mut rng, "zone-a", SeverityLevel::High, "transient", 7, epoch()).with_ttl(5),
    );

    assert_eq!(snapshot.headline().unwrap().message, "transient");
}

#[test]
fn test_lookups_by_id() {
    let engine = engine("restroom");
    let clock = ManualClock::at_epoch();
    let mut rng = StdRng::seed_from_u64(8);
    let snapshot = engine.initial(&mut rng, &clock);

    assert_eq!(snapshot.tick, 0);
    assert_eq!(snapshot.entity_count(), 10);
    assert_eq!(snapshot.entity("stall-03").unwrap().state, "vacant");
    assert!(snapshot.entity("stall-11").is_none());
    assert_eq!(snapshot.reading("restroom-air.humidity").unwrap().value, 50.0);
    assert_eq!(snapshot.station("restroom-air").unwrap().name, "Restroom air");
}

#[test]
fn test_active_alerts_include_entity_alerts() {
    let engine = engine("restroom");
    let clock = ManualClock::at_epoch();
    let mut rng = StdRng::seed_from_u64(8);
    let snapshot = engine.initial(&mut rng, &clock);

    let flagged = engine
        .apply_override(&snapshot, "stall-02", ManualAction::FlagMaintenance, &mut rng, &clock)
        .unwrap()
        .snapshot;

    assert!(flagged
        .active_alerts()
        .iter()
        .any(|a| a.source == "stall-02"));
}

#[test]
fn test_snapshot_json_shape() {
    let engine = engine("noise");
    let clock = ManualClock::at_epoch();
    let mut rng = StdRng::seed_from_u64(8);
    let snapshot = engine.initial(&mut rng, &clock);

    let json = serde_json::to_value(&snapshot).unwrap();
    assert_eq!(json["tick"], 0);
    assert!(json["readings"].is_array());
    assert!(json["stations"][0]["level"].is_string());
    assert!(json["summary"]["worst_level"].is_string());

    let back: Snapshot = serde_json::from_value(json).unwrap();
    assert_eq!(back.stations, snapshot.stations);
    assert_eq!(back.readings.len(), snapshot.readings.len());
}
