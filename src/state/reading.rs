use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Current value of one numeric sensor quantity.
///
/// `lower <= value <= upper` holds after every update.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    /// "{station}.{quantity}" (e.g., "lab-1.co2")
    pub id: String,

    pub station: String,

    /// Quantity name matched by classifier rules (e.g., "co2", "noise_db")
    pub quantity: String,

    pub unit: String,

    pub value: f64,

    pub lower: f64,

    pub upper: f64,

    pub last_updated: DateTime<Utc>,
}

impl Reading {
    pub fn reading_id(station: &str, quantity: &str) -> String {
        format!("{}.{}", station, quantity)
    }

    pub fn in_bounds(&self) -> bool {
        self.value >= self.lower && self.value <= self.upper
    }
}
