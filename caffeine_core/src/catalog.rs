//! Default catalog of drinks and their caffeine content.
//!
//! Values are typical per-serving amounts, good enough for logging by name.

use crate::types::*;
use crate::{Error, Result};
use once_cell::sync::Lazy;

/// Cached default catalog - built once and reused across all operations
static DEFAULT_CATALOG: Lazy<Vec<Drink>> = Lazy::new(build_default_catalog);

/// Caffeine in one small cup of coffee, the "one cup" reference serving
pub const REFERENCE_SERVING_MG: f64 = 95.0;

/// Get a reference to the cached default catalog
pub fn get_default_catalog() -> &'static [Drink] {
    &DEFAULT_CATALOG
}

/// Look up a drink by id, accepting `-` in place of `_` ("small-coffee")
pub fn find_drink(name: &str) -> Result<&'static Drink> {
    let wanted = name.trim().to_lowercase().replace('-', "_");
    get_default_catalog()
        .iter()
        .find(|d| d.id == wanted)
        .ok_or_else(|| Error::UnknownDrink(name.to_string()))
}

/// Builds the default catalog
pub fn build_default_catalog() -> Vec<Drink> {
    fn drink(id: &str, name: &str, kind: DrinkKind, mg_per_serving: f64) -> Drink {
        Drink {
            id: id.into(),
            name: name.into(),
            kind,
            mg_per_serving,
        }
    }

    vec![
        // Coffee, by cup size
        drink("small_coffee", "Small coffee (8 oz)", DrinkKind::Coffee, REFERENCE_SERVING_MG),
        drink("medium_coffee", "Medium coffee (12 oz)", DrinkKind::Coffee, 142.0),
        drink("large_coffee", "Large coffee (16 oz)", DrinkKind::Coffee, 190.0),
        drink("single_espresso", "Single espresso", DrinkKind::Espresso, 64.0),
        drink("double_espresso", "Double espresso", DrinkKind::Espresso, 128.0),
        drink("quad_espresso", "Quad espresso", DrinkKind::Espresso, 256.0),
        drink("black_tea", "Black tea (8 oz)", DrinkKind::Tea, 47.0),
        drink("green_tea", "Green tea (8 oz)", DrinkKind::Tea, 28.0),
        drink("cola", "Cola (12 oz)", DrinkKind::SoftDrink, 34.0),
        drink("energy_drink", "Energy drink (8 oz)", DrinkKind::EnergyDrink, 80.0),
        drink("dark_chocolate", "Dark chocolate (1 oz)", DrinkKind::Chocolate, 24.0),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_catalog_ids_unique() {
        let catalog = get_default_catalog();
        let ids: HashSet<_> = catalog.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids.len(), catalog.len());
    }

    #[test]
    fn test_reference_drink_is_one_cup() {
        let reference = find_drink("small_coffee").unwrap();
        assert_eq!(reference.mg_per_serving, REFERENCE_SERVING_MG);
    }

    #[test]
    fn test_find_drink_accepts_dashes() {
        let drink = find_drink("Double-Espresso").unwrap();
        assert_eq!(drink.id, "double_espresso");
    }

    #[test]
    fn test_find_unknown_drink() {
        assert!(matches!(find_drink("mate"), Err(Error::UnknownDrink(_))));
    }

    #[test]
    fn test_amounts_non_negative() {
        assert!(get_default_catalog().iter().all(|d| d.mg_per_serving >= 0.0));
    }
}
