//! Canonical tag derivation.
//!
//! Backends send tags as arbitrary JSON. Two structurally equal values must map
//! to the same index key, so objects are rebuilt with sorted keys before they
//! are serialized. With [`KeyOrder::Preserved`] the source order is kept and
//! `{"a":1,"b":2}` and `{"b":2,"a":1}` become distinct tags. Integral numbers
//! are written without a fraction either way, so `1.0` and `1` are one tag.

use serde_json::{Map, Number, Value};

use super::keys::Tag;

/// How object keys are ordered while canonicalizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyOrder {
    #[default]
    Sorted,
    Preserved,
}

impl KeyOrder {
    pub fn from_preserve_flag(preserve: bool) -> Self {
        if preserve { Self::Preserved } else { Self::Sorted }
    }
}

/// Turn any JSON value into a tag. Total: every value, `null` included, yields
/// a deterministic string.
pub fn canonicalize(value: &Value, order: KeyOrder) -> Tag {
    Tag::from_canonical(normalize(value, order).to_string())
}

/// Canonicalize every element of a tag list.
pub fn canonicalize_all<'a, I>(values: I, order: KeyOrder) -> Vec<Tag>
where
    I: IntoIterator<Item = &'a Value>,
{
    values
        .into_iter()
        .map(|value| canonicalize(value, order))
        .collect()
}

fn normalize(value: &Value, order: KeyOrder) -> Value {
    match value {
        Value::Array(items) => {
            Value::Array(items.iter().map(|item| normalize(item, order)).collect())
        }
        Value::Object(object) => {
            let mut fields: Vec<(&String, &Value)> = object.iter().collect();
            if order == KeyOrder::Sorted {
                fields.sort_by(|(left, _), (right, _)| left.cmp(right));
            }
            let mut rebuilt = Map::with_capacity(object.len());
            for (key, nested) in fields {
                rebuilt.insert(key.clone(), normalize(nested, order));
            }
            Value::Object(rebuilt)
        }
        Value::Number(number) => Value::Number(integral(number)),
        scalar => scalar.clone(),
    }
}

/// Largest magnitude below which every integral `f64` is exact.
const MAX_EXACT_INTEGER: f64 = 9_007_199_254_740_992.0;

/// Integral floats are written as integers: `1.0`, `1e0` and `1` are one tag,
/// and `-0.0` is `0`.
fn integral(number: &Number) -> Number {
    match number.as_f64() {
        Some(float)
            if number.is_f64() && float.fract() == 0.0 && float.abs() < MAX_EXACT_INTEGER =>
        {
            Number::from(float as i64)
        }
        _ => number.clone(),
    }
}
