//! Core domain types for the caffeine tracker.
//!
//! This module defines the fundamental types used throughout the system:
//! - Doses and the records exchanged with the health-record store
//! - Three-way banding used for level and daily intake
//! - Drink definitions for the built-in catalog

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// Dose Types
// ============================================================================

/// A single caffeine intake event.
///
/// Immutable once created. Equality compares every field and is used by the
/// store to detect unchanged snapshots.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Dose {
    pub id: Uuid,
    pub amount_mg: f64,
    pub consumed_at: DateTime<Utc>,
}

impl Dose {
    /// Create a dose with a freshly generated id
    pub fn new(amount_mg: f64, consumed_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            amount_mg,
            consumed_at,
        }
    }
}

/// A dose as seen by the external health-record store.
///
/// `external_id` is the stable correlation id shared with the external
/// store; it doubles as the ledger id of the matching [`Dose`].
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct DoseRecord {
    pub external_id: Uuid,
    pub amount_mg: f64,
    pub consumed_at: DateTime<Utc>,
}

impl From<&Dose> for DoseRecord {
    fn from(dose: &Dose) -> Self {
        DoseRecord {
            external_id: dose.id,
            amount_mg: dose.amount_mg,
            consumed_at: dose.consumed_at,
        }
    }
}

impl From<DoseRecord> for Dose {
    fn from(record: DoseRecord) -> Self {
        Dose {
            id: record.external_id,
            amount_mg: record.amount_mg,
            consumed_at: record.consumed_at,
        }
    }
}

// ============================================================================
// Banding
// ============================================================================

/// Three-way classification of a caffeine level or daily intake
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Band {
    Low,
    Moderate,
    High,
}

impl Band {
    /// Classify `value` given the lower bounds of the moderate and high bands
    pub fn classify(value: f64, moderate_from: f64, high_from: f64) -> Self {
        if value < moderate_from {
            Band::Low
        } else if value < high_from {
            Band::Moderate
        } else {
            Band::High
        }
    }
}

impl std::fmt::Display for Band {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Band::Low => "low",
            Band::Moderate => "moderate",
            Band::High => "high",
        };
        f.write_str(name)
    }
}

// ============================================================================
// Drink Types
// ============================================================================

/// Broad family a drink belongs to
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DrinkKind {
    Coffee,
    Espresso,
    Tea,
    SoftDrink,
    EnergyDrink,
    Chocolate,
}

impl std::fmt::Display for DrinkKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            DrinkKind::Coffee => "coffee",
            DrinkKind::Espresso => "espresso",
            DrinkKind::Tea => "tea",
            DrinkKind::SoftDrink => "soft drink",
            DrinkKind::EnergyDrink => "energy drink",
            DrinkKind::Chocolate => "chocolate",
        };
        f.pad(name)
    }
}

/// A catalog entry: a named drink and its caffeine per serving
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Drink {
    pub id: String,
    pub name: String,
    pub kind: DrinkKind,
    pub mg_per_serving: f64,
}

/// Render a value with up to three significant digits ("95", "47.5", "0.123")
pub fn format_sig3(value: f64) -> String {
    if !value.is_finite() {
        return value.to_string();
    }
    if value == 0.0 {
        return "0".into();
    }
    let magnitude = value.abs().log10().floor() as i32;
    let decimals = (2 - magnitude).max(0) as usize;
    let text = format!("{:.*}", decimals, value);
    if text.contains('.') {
        text.trim_end_matches('0').trim_end_matches('.').to_string()
    } else {
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_band_boundaries() {
        assert_eq!(Band::classify(199.9, 200.0, 400.0), Band::Low);
        assert_eq!(Band::classify(200.0, 200.0, 400.0), Band::Moderate);
        assert_eq!(Band::classify(399.0, 200.0, 400.0), Band::Moderate);
        assert_eq!(Band::classify(400.0, 200.0, 400.0), Band::High);
    }

    #[test]
    fn test_record_conversion_keeps_id() {
        let dose = Dose::new(95.0, Utc::now());
        let record = DoseRecord::from(&dose);
        assert_eq!(record.external_id, dose.id);
        assert_eq!(Dose::from(record), dose);
    }

    #[test]
    fn test_format_sig3() {
        assert_eq!(format_sig3(95.0), "95");
        assert_eq!(format_sig3(47.5), "47.5");
        assert_eq!(format_sig3(1.0), "1");
        assert_eq!(format_sig3(0.0), "0");
        assert_eq!(format_sig3(123.456), "123");
        assert_eq!(format_sig3(0.12345), "0.123");
    }

    #[test]
    fn test_drink_kind_display_pads() {
        assert_eq!(format!("{:<8}|", DrinkKind::Tea), "tea     |");
        assert_eq!(DrinkKind::EnergyDrink.to_string(), "energy drink");
    }
}
