// src/simulation/value_engine.rs
//! Synthetic value engine
//!
//! Computes a provider's current value from its definition, its previous
//! sample and the current time. Pure and synchronous: the caller owns the
//! previous sample and supplies the random source.
//!
//! # Patterns
//!
//! - **RANDOM**: uniform pick from the candidate set, held for the interval
//! - **RANGE**: uniform draw from `[min, max]`, held for the interval
//! - **RAMP**: continuous waveform, recomputed on every call
//!
//! ```text
//!  max ┤    ╭─╮         ╭─╮
//!      │   ╱   ╲       ╱   ╲
//!  min ┼──╯     ╰─────╯     ╰──
//!      0   T/4   T/2  3T/4   T
//! ```

use crate::model::provider::{NumericBounds, ProviderDefinition, UpdatePattern, ValueType};
use crate::simulation::precision::round_to;
use crate::utils::errors::{EngineError, Result};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::fmt;

/// A generated value, before the protocol engine encodes it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProviderValue {
    Integer(i64),
    Number(f64),
    Text(String),
}

impl ProviderValue {
    /// Numeric view of the value, parsing text when needed
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ProviderValue::Integer(i) => Some(*i as f64),
            ProviderValue::Number(n) => Some(*n),
            ProviderValue::Text(s) => s.trim().parse().ok(),
        }
    }
}

impl fmt::Display for ProviderValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderValue::Integer(i) => write!(f, "{}", i),
            ProviderValue::Number(n) => write!(f, "{}", n),
            ProviderValue::Text(s) => f.write_str(s),
        }
    }
}

/// The last value pushed for a provider and when it was computed
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub value: ProviderValue,

    /// Milliseconds since the Unix epoch
    pub refreshed_at: u64,
}

/// Outcome of one refresh
#[derive(Debug, Clone, PartialEq)]
pub struct Refresh {
    /// Current sample; the previous one, untouched, when throttled
    pub sample: Sample,

    /// True when the value differs from the previous sample
    pub changed: bool,
}

/// Compute the current value of `provider` at `now_ms`
pub fn compute_value<R: Rng + ?Sized>(
    provider: &ProviderDefinition,
    previous: Option<&Sample>,
    now_ms: u64,
    rng: &mut R,
) -> Result<Refresh> {
    let raw = match &provider.pattern {
        UpdatePattern::Random { candidates } => {
            if let Some(held) = throttled(provider, previous, now_ms) {
                return Ok(held);
            }
            let pick = candidates.choose(rng).ok_or_else(|| {
                EngineError::Validation(format!("Provider '{}' has no candidates", provider.name))
            })?;
            ProviderValue::Text(pick.clone())
        }
        UpdatePattern::Range { min, max } => {
            if let Some(held) = throttled(provider, previous, now_ms) {
                return Ok(held);
            }
            let bounds = NumericBounds::parse(min, max)?;
            ProviderValue::Number(range_value(&bounds, rng))
        }
        UpdatePattern::Ramp { min, max } => {
            let bounds = NumericBounds::parse(min, max)?;
            if provider.update_interval_ms == 0 {
                return Err(EngineError::Validation(format!(
                    "Provider '{}' has a zero RAMP period",
                    provider.name
                )));
            }
            ProviderValue::Number(ramp_value(&bounds, provider.update_interval_ms, now_ms))
        }
    };

    let value = coerce(raw, provider.value_type).map_err(|e| match e {
        EngineError::Validation(msg) => {
            EngineError::Validation(format!("Provider '{}': {}", provider.name, msg))
        }
        other => other,
    })?;
    let changed = previous.map_or(true, |p| p.value != value);

    Ok(Refresh {
        sample: Sample {
            value,
            refreshed_at: now_ms,
        },
        changed,
    })
}

/// Previous sample, if it is still inside the update interval
fn throttled(
    provider: &ProviderDefinition,
    previous: Option<&Sample>,
    now_ms: u64,
) -> Option<Refresh> {
    previous
        .filter(|p| now_ms.saturating_sub(p.refreshed_at) <= provider.update_interval_ms)
        .map(|p| Refresh {
            sample: p.clone(),
            changed: false,
        })
}

/// Uniform draw from the bounds, rounded to their precision
pub fn range_value<R: Rng + ?Sized>(bounds: &NumericBounds, rng: &mut R) -> f64 {
    if bounds.min == bounds.max {
        return bounds.min;
    }
    let drawn = rng.gen_range(bounds.min..=bounds.max);
    round_to(drawn, bounds.precision).clamp(bounds.min, bounds.max)
}

/// Waveform value at `now_ms` for a period of `period_ms`
///
/// Trough at `t ≡ 0`, peak at `t ≡ period/4`.
pub fn ramp_value(bounds: &NumericBounds, period_ms: u64, now_ms: u64) -> f64 {
    let amplitude = (bounds.max - bounds.min).abs() / 2.0;
    let offset = amplitude + bounds.min;
    let phase = (now_ms % period_ms) as f64 / period_ms as f64;

    let value = offset - amplitude * (4.0 * PI * phase).cos();
    round_to(value, bounds.precision)
}

/// Apply the provider's declared value type
pub fn coerce(value: ProviderValue, value_type: ValueType) -> Result<ProviderValue> {
    match value_type {
        ValueType::Integer => match value {
            ProviderValue::Integer(_) => Ok(value),
            other => other
                .as_f64()
                .map(|n| ProviderValue::Integer(n.trunc() as i64))
                .ok_or_else(|| {
                    EngineError::Validation(format!("'{}' is not an integer", other))
                }),
        },
        ValueType::OctetString => match value {
            ProviderValue::Text(_) => Ok(value),
            other => Ok(ProviderValue::Text(other.to_string())),
        },
        _ => Ok(value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::oid::Oid;
    use proptest::prelude::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn oid() -> Oid {
        "1.3.6.1.4.1.99999.1".parse().unwrap()
    }

    fn ramp(min: &str, max: &str, period: u64) -> ProviderDefinition {
        ProviderDefinition::new("ramp", oid(), UpdatePattern::ramp(min, max).unwrap())
            .with_value_type(ValueType::Gauge)
            .with_interval(period)
    }

    fn range(min: &str, max: &str) -> ProviderDefinition {
        ProviderDefinition::new("range", oid(), UpdatePattern::range(min, max).unwrap())
            .with_value_type(ValueType::Gauge)
    }

    fn number(refresh: &Refresh) -> f64 {
        refresh.sample.value.as_f64().unwrap()
    }

    #[test]
    fn test_range_respects_bounds_and_precision() {
        let provider = range("1.50", "3.0");
        let mut rng = StdRng::seed_from_u64(7);

        for i in 0..500 {
            let refresh = compute_value(&provider, None, i, &mut rng).unwrap();
            let value = number(&refresh);
            assert!((1.5..=3.0).contains(&value), "{} out of range", value);

            let text = value.to_string();
            let digits = text.split('.').nth(1).map_or(0, str::len);
            assert!(digits <= 2, "{} has too many digits", text);
        }
    }

    #[test]
    fn test_ramp_anchor_points() {
        let provider = ramp("0", "10", 1000);
        let mut rng = StdRng::seed_from_u64(1);

        let at = |t: u64, rng: &mut StdRng| number(&compute_value(&provider, None, t, rng).unwrap());

        assert_eq!(at(0, &mut rng), 0.0);
        assert_eq!(at(250, &mut rng), 10.0);
        assert_eq!(at(1000, &mut rng), 0.0);
        assert_eq!(at(1250, &mut rng), 10.0);
    }

    #[test]
    fn test_ramp_is_periodic() {
        let provider = ramp("-5.5", "20.25", 1000);
        let mut rng = StdRng::seed_from_u64(1);

        for t in (0..1000).step_by(37) {
            let first = compute_value(&provider, None, t, &mut rng).unwrap();
            let later = compute_value(&provider, None, t + 3 * 1000, &mut rng).unwrap();
            assert_eq!(first.sample.value, later.sample.value);
        }
    }

    #[test]
    fn test_ramp_ignores_throttling() {
        let provider = ramp("0", "10", 1000);
        let mut rng = StdRng::seed_from_u64(1);

        let first = compute_value(&provider, None, 0, &mut rng).unwrap();
        let second = compute_value(&provider, Some(&first.sample), 250, &mut rng).unwrap();

        assert!(second.changed);
        assert_eq!(second.sample.refreshed_at, 250);
        assert_eq!(number(&second), 10.0);
    }

    #[test]
    fn test_random_is_held_within_interval() {
        let candidates = ["alpha", "beta", "gamma", "delta"];
        let provider = ProviderDefinition::new("sysDescr", oid(), UpdatePattern::random(candidates).unwrap())
            .with_interval(1_000);
        let mut rng = StdRng::seed_from_u64(3);

        let first = compute_value(&provider, None, 10_000, &mut rng).unwrap();
        assert!(first.changed);

        let held = compute_value(&provider, Some(&first.sample), 10_500, &mut rng).unwrap();
        assert_eq!(held.sample, first.sample);
        assert!(!held.changed);

        // exactly at the interval is still held
        let edge = compute_value(&provider, Some(&first.sample), 11_000, &mut rng).unwrap();
        assert_eq!(edge.sample.refreshed_at, 10_000);

        let later = compute_value(&provider, Some(&first.sample), 11_001, &mut rng).unwrap();
        assert_eq!(later.sample.refreshed_at, 11_001);
        let text = later.sample.value.to_string();
        assert!(candidates.contains(&text.as_str()));
    }

    #[test]
    fn test_single_candidate_and_zero_width() {
        let mut rng = StdRng::seed_from_u64(11);

        let single = ProviderDefinition::new("one", oid(), UpdatePattern::random(["only"]).unwrap());
        for t in 0..20 {
            let refresh = compute_value(&single, None, t, &mut rng).unwrap();
            assert_eq!(refresh.sample.value, ProviderValue::Text("only".into()));
        }

        let flat_range = range("4.2", "4.2");
        let flat_ramp = ramp("4.2", "4.2", 600);
        for t in [0, 150, 299, 12_345] {
            assert_eq!(number(&compute_value(&flat_range, None, t, &mut rng).unwrap()), 4.2);
            assert_eq!(number(&compute_value(&flat_ramp, None, t, &mut rng).unwrap()), 4.2);
        }
    }

    #[test]
    fn test_overflowing_range_is_rejected() {
        // built without the validating constructor, as a stored definition would be
        let provider = ProviderDefinition::new(
            "huge",
            oid(),
            UpdatePattern::Range {
                min: "-1e308".into(),
                max: "1e308".into(),
            },
        );
        let mut rng = StdRng::seed_from_u64(3);

        let result = compute_value(&provider, None, 0, &mut rng);
        assert!(matches!(result, Err(EngineError::Validation(_))));
    }

    #[test]
    fn test_integer_coercion_truncates() {
        assert_eq!(
            coerce(ProviderValue::Number(12.9), ValueType::Integer).unwrap(),
            ProviderValue::Integer(12)
        );
        assert_eq!(
            coerce(ProviderValue::Number(-3.7), ValueType::Integer).unwrap(),
            ProviderValue::Integer(-3)
        );
        assert_eq!(
            coerce(ProviderValue::Text("42.5".into()), ValueType::Integer).unwrap(),
            ProviderValue::Integer(42)
        );
        assert!(coerce(ProviderValue::Text("up".into()), ValueType::Integer).is_err());
    }

    #[test]
    fn test_string_coercion_and_passthrough() {
        assert_eq!(
            coerce(ProviderValue::Number(1.5), ValueType::OctetString).unwrap(),
            ProviderValue::Text("1.5".into())
        );
        assert_eq!(
            coerce(ProviderValue::Number(3.0), ValueType::OctetString).unwrap(),
            ProviderValue::Text("3".into())
        );
        assert_eq!(
            coerce(ProviderValue::Number(7.25), ValueType::Gauge).unwrap(),
            ProviderValue::Number(7.25)
        );
    }

    proptest! {
        #[test]
        fn prop_range_within_bounds(lo in -1_000i32..1_000, width in 0u32..5_000, seed in any::<u64>()) {
            let min = format!("{}.5", lo);
            let max = format!("{}.25", lo as i64 + width as i64);
            prop_assume!(min.parse::<f64>().unwrap() <= max.parse::<f64>().unwrap());

            let provider = range(&min, &max);
            let mut rng = StdRng::seed_from_u64(seed);
            let value = number(&compute_value(&provider, None, 0, &mut rng).unwrap());

            prop_assert!(value >= min.parse::<f64>().unwrap());
            prop_assert!(value <= max.parse::<f64>().unwrap());
        }

        #[test]
        fn prop_ramp_within_bounds(t in any::<u64>(), period in 1u64..100_000) {
            let provider = ramp("-2.5", "7.75", period);
            let mut rng = StdRng::seed_from_u64(0);
            let value = number(&compute_value(&provider, None, t, &mut rng).unwrap());

            prop_assert!((-2.5..=7.75).contains(&value));
        }
    }
}
