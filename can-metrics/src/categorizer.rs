//! Signal categorization
//!
//! Maps a signal name to functional domains with a fixed keyword table.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Functional domain of a signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Battery,
    Drivetrain,
    Temperature,
    Electrical,
    VehicleStatus,
    Hvac,
    Other,
}

impl Category {
    pub const ALL: [Category; 7] = [
        Category::Battery,
        Category::Drivetrain,
        Category::Temperature,
        Category::Electrical,
        Category::VehicleStatus,
        Category::Hvac,
        Category::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Battery => "battery",
            Category::Drivetrain => "drivetrain",
            Category::Temperature => "temperature",
            Category::Electrical => "electrical",
            Category::VehicleStatus => "vehicle_status",
            Category::Hvac => "hvac",
            Category::Other => "other",
        }
    }

    /// Parse a category name as used in queries (case-insensitive)
    pub fn parse(name: &str) -> Option<Category> {
        let name = name.trim();
        Category::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Keyword rules, matched as substrings of the lowercased signal name
const CATEGORY_RULES: &[(Category, &[&str])] = &[
    (Category::Battery, &["battery", "soc", "charge", "bms"]),
    (Category::Drivetrain, &["motor", "drive", "power", "torque", "rpm"]),
    (Category::Temperature, &["temp", "temperature", "thermal"]),
    (Category::Electrical, &["volt", "current", "amp", "electric"]),
    (Category::VehicleStatus, &["speed", "velocity", "accel", "brake", "steer"]),
    // "ac" also matches e.g. "accel" and "tractive"
    (Category::Hvac, &["hvac", "ac", "heat", "cool", "fan"]),
];

/// Categories for a signal name; never empty
pub fn categorize(signal_name: &str) -> BTreeSet<Category> {
    let lowered = signal_name.to_lowercase();
    let mut categories: BTreeSet<Category> = CATEGORY_RULES
        .iter()
        .filter(|(_, keywords)| keywords.iter().any(|kw| lowered.contains(kw)))
        .map(|(category, _)| *category)
        .collect();

    if categories.is_empty() {
        categories.insert(Category::Other);
    }
    categories
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_category() {
        assert_eq!(
            categorize("BMS_Soc"),
            BTreeSet::from([Category::Battery])
        );
        assert_eq!(
            categorize("WheelSpeedFL"),
            BTreeSet::from([Category::VehicleStatus])
        );
    }

    #[test]
    fn test_multiple_categories() {
        let cats = categorize("BatteryTemperature");
        assert_eq!(cats, BTreeSet::from([Category::Battery, Category::Temperature]));

        // "accel" also contains "ac"
        let cats = categorize("AccelPedal");
        assert!(cats.contains(&Category::VehicleStatus));
        assert!(cats.contains(&Category::Hvac));
    }

    #[test]
    fn test_case_insensitive() {
        assert_eq!(categorize("MOTOR_RPM"), categorize("motor_rpm"));
        assert!(categorize("MOTOR_RPM").contains(&Category::Drivetrain));
    }

    #[test]
    fn test_fallback_is_other() {
        assert_eq!(categorize("Odometer"), BTreeSet::from([Category::Other]));
        assert_eq!(categorize(""), BTreeSet::from([Category::Other]));
    }

    #[test]
    fn test_idempotent_and_total() {
        for name in ["CellVoltageMin", "GearPosition", "HvacFanLevel", "x", "ÄÖÜ"] {
            let first = categorize(name);
            assert_eq!(first, categorize(name));
            assert!(!first.is_empty());
        }
    }

    #[test]
    fn test_parse_category() {
        assert_eq!(Category::parse("Vehicle_Status"), Some(Category::VehicleStatus));
        assert_eq!(Category::parse(" hvac "), Some(Category::Hvac));
        assert_eq!(Category::parse("chassis"), None);
        assert_eq!(serde_json::to_string(&Category::VehicleStatus).unwrap(), "\"vehicle_status\"");
    }
}
