//! Single-compartment exponential decay of a caffeine dose.

use crate::Dose;
use chrono::{DateTime, Utc};

/// Elimination half-life of caffeine in a typical adult
pub const DEFAULT_HALF_LIFE_HOURS: f64 = 5.0;

/// Stateless decay model parameterised by the half-life.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DecayModel {
    half_life_hours: f64,
}

impl Default for DecayModel {
    fn default() -> Self {
        Self::new(DEFAULT_HALF_LIFE_HOURS)
    }
}

impl DecayModel {
    pub fn new(half_life_hours: f64) -> Self {
        Self { half_life_hours }
    }

    pub fn half_life_hours(&self) -> f64 {
        self.half_life_hours
    }

    /// Amount of `dose` still active at `at`.
    ///
    /// Zero before the dose was consumed, the full amount at the moment of
    /// consumption, then `amount * 0.5^(elapsed / half_life)`.
    pub fn remaining(&self, dose: &Dose, at: DateTime<Utc>) -> f64 {
        if at < dose.consumed_at {
            return 0.0;
        }
        let elapsed_ms = (at - dose.consumed_at).num_milliseconds() as f64;
        let elapsed_hours = elapsed_ms / 3_600_000.0;
        dose.amount_mg * 0.5_f64.powf(elapsed_hours / self.half_life_hours)
    }

    /// Sum of [`remaining`](Self::remaining) over `doses`
    pub fn total<'a, I>(&self, doses: I, at: DateTime<Utc>) -> f64
    where
        I: IntoIterator<Item = &'a Dose>,
    {
        doses.into_iter().map(|d| self.remaining(d, at)).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use proptest::prelude::*;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 7, 8, 0, 0).unwrap()
    }

    fn dose_at(amount_mg: f64, consumed_at: DateTime<Utc>) -> Dose {
        Dose::new(amount_mg, consumed_at)
    }

    #[test]
    fn test_half_life_halves_amount() {
        let model = DecayModel::default();
        let dose = dose_at(95.0, t0());
        let left = model.remaining(&dose, t0() + Duration::hours(5));
        assert!((left - 47.5).abs() < 1e-9);
    }

    #[test]
    fn test_two_half_lives() {
        let model = DecayModel::new(4.0);
        let dose = dose_at(200.0, t0());
        let left = model.remaining(&dose, t0() + Duration::hours(8));
        assert!((left - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_nothing_before_consumption() {
        let model = DecayModel::default();
        let dose = dose_at(95.0, t0());
        assert_eq!(model.remaining(&dose, t0() - Duration::seconds(1)), 0.0);
    }

    #[test]
    fn test_total_sums_doses() {
        let model = DecayModel::default();
        let doses = vec![
            dose_at(100.0, t0()),
            dose_at(50.0, t0() + Duration::hours(5)),
            dose_at(80.0, t0() + Duration::hours(6)), // not yet consumed
        ];
        let total = model.total(&doses, t0() + Duration::hours(5));
        assert!((total - 100.0).abs() < 1e-9);
    }

    fn amount() -> impl Strategy<Value = f64> {
        0.0f64..1_000.0
    }

    proptest! {
        #[test]
        fn prop_zero_before_consumption(mg in amount(), secs_before in 1i64..200_000) {
            let model = DecayModel::default();
            let dose = dose_at(mg, t0());
            prop_assert_eq!(model.remaining(&dose, t0() - Duration::seconds(secs_before)), 0.0);
        }

        #[test]
        fn prop_full_amount_at_consumption(mg in amount()) {
            let model = DecayModel::default();
            let dose = dose_at(mg, t0());
            prop_assert_eq!(model.remaining(&dose, t0()), mg);
        }

        #[test]
        fn prop_monotonic_decay(mg in amount(), a in 0i64..200_000, b in 0i64..200_000) {
            let model = DecayModel::default();
            let dose = dose_at(mg, t0());
            let (early, late) = if a <= b { (a, b) } else { (b, a) };
            let r_early = model.remaining(&dose, t0() + Duration::seconds(early));
            let r_late = model.remaining(&dose, t0() + Duration::seconds(late));
            prop_assert!(r_early >= r_late);
        }

        #[test]
        fn prop_half_life(mg in amount(), half_life in 0.5f64..24.0) {
            let model = DecayModel::new(half_life);
            let dose = dose_at(mg, t0());
            let at = t0() + Duration::milliseconds((half_life * 3_600_000.0).round() as i64);
            let left = model.remaining(&dose, at);
            prop_assert!((left - mg / 2.0).abs() < 1e-6 * mg.max(1.0));
        }
    }
}
