//! Lenient decoding of numeric ids.
//!
//! Mobile clients and some token issuers encode ids as JSON floats (`7.0`)
//! or strings (`"7"`). Every id-bearing field that crosses the wire goes
//! through [`deserialize`] so all of these decode to the same `i64`.

use serde::Deserialize;
use serde::de::{self, Deserializer};

#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Int(i64),
    Float(f64),
    Text(String),
    Null,
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    match RawId::deserialize(deserializer)? {
        RawId::Int(v) => Ok(v),
        RawId::Float(v) => float_to_id(v).ok_or_else(|| de::Error::custom(format!("invalid id: {v}"))),
        RawId::Text(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().and_then(float_to_id))
                .ok_or_else(|| de::Error::custom(format!("invalid id: {s:?}")))
        }
        RawId::Null => Ok(0),
    }
}

/// Decodes a list of ids with the same leniency as [`deserialize`].
pub fn deserialize_vec<'de, D>(deserializer: D) -> Result<Vec<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    struct Wrapped(#[serde(deserialize_with = "deserialize")] i64);

    let raw = Option::<Vec<Wrapped>>::deserialize(deserializer)?;
    Ok(raw.unwrap_or_default().into_iter().map(|w| w.0).collect())
}

fn float_to_id(v: f64) -> Option<i64> {
    // 2^63 is exactly representable; anything at or above it overflows i64.
    if v.is_finite() && v.fract() == 0.0 && v >= i64::MIN as f64 && v < i64::MAX as f64 {
        Some(v as i64)
    } else {
        None
    }
}
