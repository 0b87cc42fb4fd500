//! Temperature severity classification.
//!
//! A reading is scored against an ordered list of guards (the first guard
//! that matches wins, the bands overlap on purpose) and the score is then
//! bucketed by its ratio to the maximum score.

use std::fmt;

use log::info;
use serde_derive::{Deserialize, Serialize};

/// Highest score a temperature reading can produce.
pub const MAX_SCORE: u8 = 3;

/// Guards evaluated in order; `(predicate, score)`.
const TEMPERATURE_GUARDS: [(fn(f32) -> bool, u8); 4] = [
    (|t: f32| t > 36.0 && t <= 38.0, 0),
    (|t: f32| t > 35.0 && t <= 39.0, 1),
    (|t: f32| t > 39.0, 2),
    (|t: f32| t <= 35.0, 3),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    Undefined,
    Normal,
    Critical,
    VeryCritical,
}

impl Severity {
    pub fn from_ratio(ratio: f32) -> Self {
        if (0.0..0.3).contains(&ratio) {
            Severity::Normal
        } else if (0.3..0.7).contains(&ratio) {
            Severity::Critical
        } else if (0.7..=1.0).contains(&ratio) {
            Severity::VeryCritical
        } else {
            Severity::Undefined
        }
    }

    /// Numeric code reported alongside the category (-1 for undefined).
    pub fn code(&self) -> i8 {
        match self {
            Severity::Undefined => -1,
            Severity::Normal => 0,
            Severity::Critical => 1,
            Severity::VeryCritical => 2,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Undefined => write!(f, "UNKNOWN"),
            Severity::Normal => write!(f, "NORMAL"),
            Severity::Critical => write!(f, "CRITICAL"),
            Severity::VeryCritical => write!(f, "VERY CRITICAL"),
        }
    }
}

/// Scores a temperature, `None` when no guard matches (NaN).
pub fn score(temperature: f32) -> Option<u8> {
    TEMPERATURE_GUARDS
        .iter()
        .find(|(guard, _)| guard(temperature))
        .map(|(_, score)| *score)
}

pub fn classify(temperature: f32) -> Severity {
    match score(temperature) {
        Some(score) => {
            let ratio = f32::from(score) / f32::from(MAX_SCORE);
            info!("Temperature {temperature:.2} scored {score} (ratio {ratio:.3})");
            Severity::from_ratio(ratio)
        }
        None => Severity::Undefined,
    }
}

/// Most recent decoded reading; lives in the retained region.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ReadingCache {
    // empty until the first data frame arrives
    value: Option<f32>,
}

impl ReadingCache {
    pub fn store(&mut self, temperature: f32) {
        self.value = Some(temperature);
    }

    pub fn latest(&self) -> f32 {
        self.value.unwrap_or(f32::NAN)
    }

    pub fn classify(&self) -> Severity {
        classify(self.latest())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_score_guards() {
        assert_eq!(score(37.0), Some(0));
        assert_eq!(score(38.0), Some(0));
        assert_eq!(score(38.5), Some(1));
        assert_eq!(score(36.0), Some(1));
        assert_eq!(score(39.0), Some(1));
        assert_eq!(score(39.5), Some(2));
        assert_eq!(score(34.0), Some(3));
        assert_eq!(score(35.0), Some(3));
        assert_eq!(score(-20.0), Some(3));
        assert_eq!(score(f32::NAN), None);
    }

    #[test]
    fn test_classify_end_to_end() {
        assert_eq!(classify(37.0), Severity::Normal);
        assert_eq!(classify(38.5), Severity::Critical);
        // 2/3 sits below the 0.7 boundary
        assert_eq!(classify(40.0), Severity::Critical);
        assert_eq!(classify(34.0), Severity::VeryCritical);
        assert_eq!(classify(f32::NAN), Severity::Undefined);
    }

    #[test]
    fn test_from_ratio_boundaries() {
        assert_eq!(Severity::from_ratio(0.0), Severity::Normal);
        assert_eq!(Severity::from_ratio(0.3), Severity::Critical);
        assert_eq!(Severity::from_ratio(0.7), Severity::VeryCritical);
        assert_eq!(Severity::from_ratio(1.0), Severity::VeryCritical);
        assert_eq!(Severity::from_ratio(-1.0 / 3.0), Severity::Undefined);
        assert_eq!(Severity::from_ratio(1.1), Severity::Undefined);
    }

    #[test]
    fn test_reading_cache() {
        let mut cache = ReadingCache::default();
        assert!(cache.latest().is_nan());
        assert_eq!(cache.classify(), Severity::Undefined);

        cache.store(36.6);
        cache.store(39.5);
        assert_eq!(cache.latest(), 39.5);
        assert_eq!(cache.classify(), Severity::Critical);
    }

    #[test]
    fn test_severity_codes() {
        assert_eq!(Severity::Undefined.code(), -1);
        assert_eq!(Severity::VeryCritical.code(), 2);
        assert_eq!(format!("{}", Severity::VeryCritical), "VERY CRITICAL");
    }
}
