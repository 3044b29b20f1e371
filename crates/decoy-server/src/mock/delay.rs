//! Response delay: fixed or uniformly random within `[min, max)`.

use rand::Rng;
use serde::de::{self, Deserializer};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Delay applied before a response is written.
///
/// Accepted forms: a duration string (`"10ms"`, `"1m30s"`), a number of
/// milliseconds, `{value}` for a fixed delay, or `{min, max}` for a range.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Delay {
    pub min: Duration,
    pub max: Duration,
}

impl Delay {
    pub fn fixed(value: Duration) -> Self {
        Self {
            min: value,
            max: value,
        }
    }

    pub fn range(min: Duration, max: Duration) -> Self {
        Self { min, max }
    }

    pub fn is_zero(&self) -> bool {
        self.min.is_zero() && self.max.is_zero()
    }

    pub fn is_fixed(&self) -> bool {
        self.min >= self.max
    }

    /// Effective delay for one request.
    pub fn pick(&self) -> Duration {
        if self.min < self.max {
            rand::thread_rng().gen_range(self.min..self.max)
        } else {
            self.min
        }
    }
}

impl fmt::Display for Delay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_fixed() {
            write!(f, "{}", humantime::format_duration(self.min))
        } else {
            write!(
                f,
                "{}..{}",
                humantime::format_duration(self.min),
                humantime::format_duration(self.max)
            )
        }
    }
}

impl Serialize for Delay {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if self.is_fixed() {
            serializer.collect_str(&humantime::format_duration(self.min))
        } else {
            let mut map = serializer.serialize_map(Some(2))?;
            map.serialize_entry("min", &humantime::format_duration(self.min).to_string())?;
            map.serialize_entry("max", &humantime::format_duration(self.max).to_string())?;
            map.end()
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Scalar {
    Millis(u64),
    FractionalMillis(f64),
    Text(String),
}

impl Scalar {
    fn into_duration<E: de::Error>(self) -> Result<Duration, E> {
        match self {
            Scalar::Millis(ms) => Ok(Duration::from_millis(ms)),
            Scalar::FractionalMillis(ms) if ms >= 0.0 && ms.is_finite() => {
                Ok(Duration::from_secs_f64(ms / 1000.0))
            }
            Scalar::FractionalMillis(ms) => Err(E::custom(format!("invalid delay {ms}"))),
            Scalar::Text(text) => parse_duration(&text).map_err(E::custom),
        }
    }
}

/// Parse a duration string; a bare number is milliseconds.
pub fn parse_duration(text: &str) -> Result<Duration, String> {
    let text = text.trim();
    if text.is_empty() {
        return Ok(Duration::ZERO);
    }
    if let Ok(ms) = text.parse::<u64>() {
        return Ok(Duration::from_millis(ms));
    }
    humantime::parse_duration(text).map_err(|e| format!("invalid delay {text:?}: {e}"))
}

impl<'de> Deserialize<'de> for Delay {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Scalar(Scalar),
            Object {
                #[serde(default)]
                value: Option<Scalar>,
                #[serde(default)]
                min: Option<Scalar>,
                #[serde(default)]
                max: Option<Scalar>,
            },
        }

        let scalar = |s: Option<Scalar>| -> Result<Duration, D::Error> {
            s.map(Scalar::into_duration).transpose().map(Option::unwrap_or_default)
        };

        match Option::<Repr>::deserialize(deserializer)? {
            None => Ok(Delay::default()),
            Some(Repr::Scalar(s)) => Ok(Delay::fixed(s.into_duration()?)),
            Some(Repr::Object { value, min, max }) => {
                let value = scalar(value)?;
                if !value.is_zero() {
                    return Ok(Delay::fixed(value));
                }
                let min = scalar(min)?;
                let max = scalar(max)?;
                Ok(Delay::range(min, max.max(min)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn delay(value: serde_json::Value) -> Delay {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_accepted_forms() {
        assert_eq!(delay(json!("10ms")), Delay::fixed(Duration::from_millis(10)));
        assert_eq!(delay(json!("1m30s")), Delay::fixed(Duration::from_secs(90)));
        assert_eq!(delay(json!(250)), Delay::fixed(Duration::from_millis(250)));
        assert_eq!(delay(json!("250")), Delay::fixed(Duration::from_millis(250)));
        assert_eq!(delay(json!({"value": "1s"})), Delay::fixed(Duration::from_secs(1)));
        assert_eq!(
            delay(json!({"min": "0", "max": "100ms"})),
            Delay::range(Duration::ZERO, Duration::from_millis(100))
        );
        assert_eq!(delay(json!(null)), Delay::default());
    }

    #[test]
    fn test_invalid_delay() {
        assert!(serde_json::from_value::<Delay>(json!("soon")).is_err());
        assert!(serde_json::from_value::<Delay>(json!(-5)).is_err());
    }

    #[test]
    fn test_pick_fixed_is_exact() {
        let d = Delay::range(Duration::from_millis(10), Duration::from_millis(10));
        for _ in 0..100 {
            assert_eq!(d.pick(), Duration::from_millis(10));
        }
    }

    #[test]
    fn test_pick_range_stays_in_bounds() {
        let d = Delay::range(Duration::ZERO, Duration::from_millis(100));
        for _ in 0..1000 {
            assert!(d.pick() < Duration::from_millis(100));
        }
    }

    #[test]
    fn test_serialization() {
        assert_eq!(
            serde_json::to_value(Delay::fixed(Duration::from_millis(10))).unwrap(),
            json!("10ms")
        );
        assert_eq!(
            serde_json::to_value(Delay::range(Duration::ZERO, Duration::from_secs(1))).unwrap(),
            json!({"min": "0s", "max": "1s"})
        );
    }
}
