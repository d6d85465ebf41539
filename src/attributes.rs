//! Canonical attribute sets.
//!
//! An [`AttributeSet`] is the dimension key of every measurement: an
//! ordered, de-duplicated list of key/value pairs with a fingerprint
//! cached at construction. Record-time hot paths hash the fingerprint;
//! colliding fingerprints fall back to structural equality.

use crate::core::error::{KerroError, Result};
use ahash::RandomState;
use serde::{Deserialize, Serialize};
use std::hash::{BuildHasher, Hash, Hasher};

/// A typed attribute value.
///
/// Floating-point values compare and hash by bit pattern, so `NaN == NaN`
/// inside an attribute set and `-0.0 != 0.0`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AttributeValue {
    /// Boolean value.
    Bool(bool),
    /// Signed 64-bit integer.
    I64(i64),
    /// IEEE-754 double.
    F64(f64),
    /// UTF-8 string.
    String(String),
    /// Homogeneous boolean array.
    BoolArray(Vec<bool>),
    /// Homogeneous integer array.
    I64Array(Vec<i64>),
    /// Homogeneous double array.
    F64Array(Vec<f64>),
    /// Homogeneous string array.
    StringArray(Vec<String>),
}

impl AttributeValue {
    fn is_empty_string(&self) -> bool {
        matches!(self, AttributeValue::String(s) if s.is_empty())
    }
}

impl PartialEq for AttributeValue {
    fn eq(&self, other: &Self) -> bool {
        use AttributeValue::*;
        match (self, other) {
            (Bool(a), Bool(b)) => a == b,
            (I64(a), I64(b)) => a == b,
            (F64(a), F64(b)) => a.to_bits() == b.to_bits(),
            (String(a), String(b)) => a == b,
            (BoolArray(a), BoolArray(b)) => a == b,
            (I64Array(a), I64Array(b)) => a == b,
            (F64Array(a), F64Array(b)) => {
                a.len() == b.len()
                    && a.iter()
                        .zip(b.iter())
                        .all(|(x, y)| x.to_bits() == y.to_bits())
            }
            (StringArray(a), StringArray(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for AttributeValue {}

impl Hash for AttributeValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        use AttributeValue::*;
        match self {
            Bool(v) => {
                state.write_u8(0);
                v.hash(state);
            }
            I64(v) => {
                state.write_u8(1);
                v.hash(state);
            }
            F64(v) => {
                state.write_u8(2);
                v.to_bits().hash(state);
            }
            String(v) => {
                state.write_u8(3);
                v.hash(state);
            }
            BoolArray(v) => {
                state.write_u8(4);
                v.hash(state);
            }
            I64Array(v) => {
                state.write_u8(5);
                v.hash(state);
            }
            F64Array(v) => {
                state.write_u8(6);
                for x in v {
                    x.to_bits().hash(state);
                }
            }
            StringArray(v) => {
                state.write_u8(7);
                v.hash(state);
            }
        }
    }
}

impl From<bool> for AttributeValue {
    fn from(v: bool) -> Self {
        AttributeValue::Bool(v)
    }
}

impl From<i64> for AttributeValue {
    fn from(v: i64) -> Self {
        AttributeValue::I64(v)
    }
}

impl From<f64> for AttributeValue {
    fn from(v: f64) -> Self {
        AttributeValue::F64(v)
    }
}

impl From<&str> for AttributeValue {
    fn from(v: &str) -> Self {
        AttributeValue::String(v.to_owned())
    }
}

impl From<String> for AttributeValue {
    fn from(v: String) -> Self {
        AttributeValue::String(v)
    }
}

impl From<Vec<bool>> for AttributeValue {
    fn from(v: Vec<bool>) -> Self {
        AttributeValue::BoolArray(v)
    }
}

impl From<Vec<i64>> for AttributeValue {
    fn from(v: Vec<i64>) -> Self {
        AttributeValue::I64Array(v)
    }
}

impl From<Vec<f64>> for AttributeValue {
    fn from(v: Vec<f64>) -> Self {
        AttributeValue::F64Array(v)
    }
}

impl From<Vec<String>> for AttributeValue {
    fn from(v: Vec<String>) -> Self {
        AttributeValue::StringArray(v)
    }
}

// Fixed seeds keep fingerprints stable across process runs.
const SEED_A: u64 = 0x9e37_79b9_7f4a_7c15;
const SEED_B: u64 = 0x6a09_e667_f3bc_c908;
const SEED_C: u64 = 0xbb67_ae85_84ca_a73b;
const SEED_D: u64 = 0x3c6e_f372_fe94_f82b;

fn fingerprint_state() -> RandomState {
    RandomState::with_seeds(SEED_A, SEED_B, SEED_C, SEED_D)
}

/// The sentinel set carried by overflow series.
pub const OVERFLOW_ATTRIBUTE_KEY: &str = "otel.metric.overflow";

/// Canonical, immutable set of key/value pairs.
///
/// Keys are sorted ordinally; duplicates resolve last-write-wins; entries
/// with an empty-string value are removed. Once constructed the set never
/// changes, so the fingerprint computed here is valid for its lifetime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttributeSet {
    entries: Vec<(String, AttributeValue)>,
    fingerprint: u64,
}

impl AttributeSet {
    /// Builds a canonical set from arbitrary pairs.
    ///
    /// Returns `InvalidAttribute` when any key is empty. An entry whose
    /// value is the empty string removes that key from the set.
    pub fn new<K, V, I>(pairs: I) -> Result<Self>
    where
        K: Into<String>,
        V: Into<AttributeValue>,
        I: IntoIterator<Item = (K, V)>,
    {
        let mut entries: Vec<(String, AttributeValue)> = Vec::new();
        for (key, value) in pairs {
            let key = key.into();
            if key.is_empty() {
                return Err(KerroError::invalid_attribute("attribute key is empty"));
            }
            let value = value.into();
            if value.is_empty_string() {
                entries.retain(|(k, _)| *k != key);
                continue;
            }
            match entries.iter_mut().find(|(k, _)| *k == key) {
                Some(slot) => slot.1 = value,
                None => entries.push((key, value)),
            }
        }
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        let fingerprint = Self::compute_fingerprint(&entries);
        Ok(Self {
            entries,
            fingerprint,
        })
    }

    /// The canonical empty set.
    pub fn empty() -> Self {
        let entries = Vec::new();
        let fingerprint = Self::compute_fingerprint(&entries);
        Self {
            entries,
            fingerprint,
        }
    }

    /// The sentinel set for measurements beyond the cardinality cap.
    pub(crate) fn overflow() -> Self {
        AttributeSet::new([(OVERFLOW_ATTRIBUTE_KEY, AttributeValue::Bool(true))])
            .expect("overflow sentinel key is valid")
    }

    fn compute_fingerprint(entries: &[(String, AttributeValue)]) -> u64 {
        let mut hasher = fingerprint_state().build_hasher();
        for (key, value) in entries {
            key.hash(&mut hasher);
            value.hash(&mut hasher);
        }
        hasher.finish()
    }

    /// The 64-bit fingerprint cached at construction. Stable across
    /// process runs.
    pub fn fingerprint(&self) -> u64 {
        self.fingerprint
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no entries are present.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Looks up a value by key.
    pub fn get(&self, key: &str) -> Option<&AttributeValue> {
        self.entries
            .binary_search_by(|(k, _)| k.as_str().cmp(key))
            .ok()
            .map(|idx| &self.entries[idx].1)
    }

    /// Iterates entries in key-sorted order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &AttributeValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl Default for AttributeSet {
    fn default() -> Self {
        Self::empty()
    }
}

impl PartialEq for AttributeSet {
    fn eq(&self, other: &Self) -> bool {
        self.fingerprint == other.fingerprint && self.entries == other.entries
    }
}

impl Eq for AttributeSet {}

impl Hash for AttributeSet {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.fingerprint);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sorted_iteration() {
        let set = AttributeSet::new([("b", 2i64), ("a", 1i64), ("c", 3i64)]).unwrap();
        let keys: Vec<&str> = set.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_last_write_wins() {
        let set = AttributeSet::new([("k", 1i64), ("k", 2i64)]).unwrap();
        assert_eq!(set.len(), 1);
        assert_eq!(set.get("k"), Some(&AttributeValue::I64(2)));
    }

    #[test]
    fn test_empty_string_removes_key() {
        let set = AttributeSet::new([
            ("k", AttributeValue::from("value")),
            ("k", AttributeValue::from("")),
        ])
        .unwrap();
        assert!(set.is_empty());
    }

    #[test]
    fn test_empty_key_rejected() {
        let result = AttributeSet::new([("", 1i64)]);
        assert!(result.is_err());
    }

    #[test]
    fn test_equality_ignores_input_order() {
        let a = AttributeSet::new([("x", 1i64), ("y", 2i64)]).unwrap();
        let b = AttributeSet::new([("y", 2i64), ("x", 1i64)]).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_fingerprint_differs_for_different_sets() {
        let a = AttributeSet::new([("x", 1i64)]).unwrap();
        let b = AttributeSet::new([("x", 2i64)]).unwrap();
        assert_ne!(a, b);
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_nan_equals_itself() {
        let a = AttributeSet::new([("f", f64::NAN)]).unwrap();
        let b = AttributeSet::new([("f", f64::NAN)]).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_mixed_value_types() {
        let set = AttributeSet::new([
            ("flag", AttributeValue::Bool(true)),
            ("count", AttributeValue::I64(7)),
            ("ratio", AttributeValue::F64(0.5)),
            ("host", AttributeValue::from("api-1")),
            ("ports", AttributeValue::I64Array(vec![80, 443])),
        ])
        .unwrap();
        assert_eq!(set.len(), 5);
        assert_eq!(set.get("flag"), Some(&AttributeValue::Bool(true)));
        assert_eq!(
            set.get("ports"),
            Some(&AttributeValue::I64Array(vec![80, 443]))
        );
    }

    #[test]
    fn test_overflow_sentinel() {
        let set = AttributeSet::overflow();
        assert_eq!(
            set.get(OVERFLOW_ATTRIBUTE_KEY),
            Some(&AttributeValue::Bool(true))
        );
    }

    #[test]
    fn test_empty_set_fingerprint_is_stable() {
        assert_eq!(
            AttributeSet::empty().fingerprint(),
            AttributeSet::empty().fingerprint()
        );
    }
}
