// src/model/provider.rs
//! Provider definitions: one named, independently updating value

use crate::model::oid::Oid;
use crate::simulation::precision::fractional_digits;
use crate::utils::errors::{EngineError, Result};
use serde::{Deserialize, Serialize};

/// Default refresh interval (one minute)
pub const DEFAULT_UPDATE_INTERVAL_MS: u64 = 60_000;

fn default_update_interval() -> u64 {
    DEFAULT_UPDATE_INTERVAL_MS
}

/// Shape of the management object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ObjectKind {
    #[default]
    Scalar,
    Table,
}

/// Declared value type of a provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValueType {
    Boolean,
    Integer,
    #[default]
    OctetString,
    Null,
    Oid,
    IpAddress,
    Counter,
    Gauge,
    TimeTicks,
    Opaque,
    #[serde(rename = "COUNTER_64")]
    Counter64,
    NoSuchObject,
    NoSuchInstance,
    EndOfMibView,
}

impl ValueType {
    /// Numeric types whose generated values must parse as numbers
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            ValueType::Integer
                | ValueType::Counter
                | ValueType::Gauge
                | ValueType::TimeTicks
                | ValueType::Counter64
        )
    }
}

/// How a provider's value evolves over time
///
/// `RANDOM` and `RANGE` only change once `update_interval_ms` has elapsed
/// since the last refresh. `RAMP` is a continuous waveform whose period is
/// `update_interval_ms`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "update_type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UpdatePattern {
    Random { candidates: Vec<String> },
    Range { min: String, max: String },
    Ramp { min: String, max: String },
}

/// Parsed `[min, max]` bounds with the precision implied by their text
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NumericBounds {
    pub min: f64,
    pub max: f64,
    pub precision: u32,
}

impl NumericBounds {
    /// Parse textual bounds, requiring finite numbers with `min <= max`
    pub fn parse(min: &str, max: &str) -> Result<Self> {
        let lo = parse_bound(min)?;
        let hi = parse_bound(max)?;

        if lo > hi {
            return Err(EngineError::Validation(format!(
                "Range minimum {} is greater than maximum {}",
                min, max
            )));
        }
        if !(hi - lo).is_finite() {
            return Err(EngineError::Validation(format!(
                "Range width between {} and {} is not representable",
                min, max
            )));
        }

        Ok(Self {
            min: lo,
            max: hi,
            precision: fractional_digits(min).max(fractional_digits(max)),
        })
    }
}

fn parse_bound(raw: &str) -> Result<f64> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| EngineError::Validation(format!("Range bound is not a number: '{}'", raw)))
}

impl UpdatePattern {
    /// `RANDOM` over a non-empty candidate set
    pub fn random<I, S>(candidates: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let pattern = UpdatePattern::Random {
            candidates: candidates.into_iter().map(Into::into).collect(),
        };
        pattern.validate()?;
        Ok(pattern)
    }

    /// `RANGE` between two decimal strings
    pub fn range(min: impl Into<String>, max: impl Into<String>) -> Result<Self> {
        let pattern = UpdatePattern::Range {
            min: min.into(),
            max: max.into(),
        };
        pattern.validate()?;
        Ok(pattern)
    }

    /// `RAMP` between two decimal strings
    pub fn ramp(min: impl Into<String>, max: impl Into<String>) -> Result<Self> {
        let pattern = UpdatePattern::Ramp {
            min: min.into(),
            max: max.into(),
        };
        pattern.validate()?;
        Ok(pattern)
    }

    /// Check the value range has the shape its pattern requires
    pub fn validate(&self) -> Result<()> {
        match self {
            UpdatePattern::Random { candidates } if candidates.is_empty() => Err(
                EngineError::Validation("RANDOM requires at least one candidate value".into()),
            ),
            UpdatePattern::Random { .. } => Ok(()),
            UpdatePattern::Range { min, max } | UpdatePattern::Ramp { min, max } => {
                NumericBounds::parse(min, max).map(|_| ())
            }
        }
    }
}

/// One provider exposed by an agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderDefinition {
    /// Unique within the owning agent
    pub name: String,

    pub oid: Oid,

    #[serde(default)]
    pub kind: ObjectKind,

    #[serde(default)]
    pub value_type: ValueType,

    /// RANDOM/RANGE: minimum time between changes. RAMP: waveform period.
    #[serde(default = "default_update_interval")]
    pub update_interval_ms: u64,

    #[serde(flatten)]
    pub pattern: UpdatePattern,
}

impl ProviderDefinition {
    /// Scalar octet-string provider refreshed once a minute
    pub fn new(name: impl Into<String>, oid: Oid, pattern: UpdatePattern) -> Self {
        Self {
            name: name.into(),
            oid,
            kind: ObjectKind::Scalar,
            value_type: ValueType::OctetString,
            update_interval_ms: DEFAULT_UPDATE_INTERVAL_MS,
            pattern,
        }
    }

    pub fn with_value_type(mut self, value_type: ValueType) -> Self {
        self.value_type = value_type;
        self
    }

    pub fn with_kind(mut self, kind: ObjectKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_interval(mut self, update_interval_ms: u64) -> Self {
        self.update_interval_ms = update_interval_ms;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(EngineError::Validation("Provider name must not be empty".into()));
        }

        self.pattern.validate().map_err(|e| match e {
            EngineError::Validation(msg) => {
                EngineError::Validation(format!("Provider '{}': {}", self.name, msg))
            }
            other => other,
        })?;

        if let UpdatePattern::Ramp { .. } = self.pattern {
            if self.update_interval_ms == 0 {
                return Err(EngineError::Validation(format!(
                    "Provider '{}': RAMP requires a non-zero update interval",
                    self.name
                )));
            }
        }

        if let UpdatePattern::Random { candidates } = &self.pattern {
            if self.value_type.is_numeric() {
                if let Some(bad) = candidates.iter().find(|c| c.trim().parse::<f64>().is_err()) {
                    return Err(EngineError::Validation(format!(
                        "Provider '{}': candidate '{}' is not numeric",
                        self.name, bad
                    )));
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn oid(s: &str) -> Oid {
        s.parse().unwrap()
    }

    #[test]
    fn test_random_requires_candidates() {
        assert!(UpdatePattern::random(Vec::<String>::new()).is_err());
        assert!(UpdatePattern::random(["up"]).is_ok());
    }

    #[test]
    fn test_range_bounds() {
        assert!(UpdatePattern::range("1.50", "3.0").is_ok());
        assert!(UpdatePattern::range("5", "5").is_ok());
        assert!(matches!(
            UpdatePattern::range("10", "1"),
            Err(EngineError::Validation(_))
        ));
        assert!(matches!(
            UpdatePattern::ramp("low", "1"),
            Err(EngineError::Validation(_))
        ));
        assert!(UpdatePattern::range("NaN", "1").is_err());
    }

    #[test]
    fn test_range_width_must_be_finite() {
        assert!(matches!(
            UpdatePattern::range("-1e308", "1e308"),
            Err(EngineError::Validation(_))
        ));
        assert!(NumericBounds::parse("-1e308", "1e307").is_ok());
    }

    #[test]
    fn test_bounds_precision() {
        let bounds = NumericBounds::parse("1.50", "3.0").unwrap();
        assert_eq!(bounds.min, 1.5);
        assert_eq!(bounds.max, 3.0);
        assert_eq!(bounds.precision, 2);

        let whole = NumericBounds::parse("0", "10").unwrap();
        assert_eq!(whole.precision, 0);
    }

    #[test]
    fn test_ramp_needs_interval() {
        let provider = ProviderDefinition::new("temp", oid("1.3.6.1.4.1.1"), UpdatePattern::ramp("0", "10").unwrap())
            .with_interval(0);
        assert!(provider.validate().is_err());
    }

    #[test]
    fn test_numeric_random_candidates() {
        let provider = ProviderDefinition::new(
            "ifCount",
            oid("1.3.6.1.2.1.2.1"),
            UpdatePattern::random(["1", "two"]).unwrap(),
        )
        .with_value_type(ValueType::Integer);
        assert!(provider.validate().is_err());
    }

    #[test]
    fn test_serde_shape() {
        let json = r#"{
            "name": "sysDescr",
            "oid": "1.3.6.1.2.1.1.1",
            "update_type": "RANGE",
            "min": "1.50",
            "max": "3.0"
        }"#;

        let provider: ProviderDefinition = serde_json::from_str(json).unwrap();
        assert_eq!(provider.kind, ObjectKind::Scalar);
        assert_eq!(provider.value_type, ValueType::OctetString);
        assert_eq!(provider.update_interval_ms, DEFAULT_UPDATE_INTERVAL_MS);
        assert_eq!(provider.pattern, UpdatePattern::range("1.50", "3.0").unwrap());

        let counter: ValueType = serde_json::from_str("\"COUNTER_64\"").unwrap();
        assert_eq!(counter, ValueType::Counter64);
    }
}
