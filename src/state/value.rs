//! Symbolic state values and the matching rules that govern them.
//!
//! World state mixes booleans, numbers, short string tags, sequences, and
//! nested records in one bag. `StateValue` models that as a tagged union with
//! an explicit `Unspecified` wildcard, and `Requirement` models the *required*
//! side of a comparison, including threshold operators (`>N`, `>=N`, `<N`,
//! `!null`) parsed once at load time rather than reparsed on the hot path.

use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};

// ---------------------------------------------------------------------------
// StateValue
// ---------------------------------------------------------------------------

/// A single value in symbolic world state.
///
/// `Unspecified` is the wildcard sentinel: it matches anything, and as an
/// effect value it leaves the target key unchanged.
#[derive(Debug, Clone, PartialEq)]
pub enum StateValue {
    Unspecified,
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Seq(Vec<StateValue>),
    Record(BTreeMap<String, StateValue>),
}

impl StateValue {
    /// Whether this is the wildcard sentinel.
    pub fn is_unspecified(&self) -> bool {
        matches!(self, Self::Unspecified)
    }

    /// Whether this is an explicit null.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Numeric view, shared between `Int` and `Float`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(n) => Some(*n as f64),
            Self::Float(x) => Some(*x),
            _ => None,
        }
    }

    /// Whether a candidate value satisfies a required value.
    ///
    /// Rules, in order:
    /// 1. Either side unspecified → true.
    /// 2. Nulls are equal only to nulls.
    /// 3. Booleans and strings compare by identity.
    /// 4. Numbers compare numerically, cross-type between int and float.
    /// 5. Sequences compare element-wise, same length, order-sensitive.
    /// 6. Records match by subset: every key the required side names must be
    ///    present in the candidate and recursively match; extra candidate
    ///    keys are ignored.
    pub fn matches(&self, required: &StateValue) -> bool {
        if self.is_unspecified() || required.is_unspecified() {
            return true;
        }

        match (self, required) {
            (Self::Null, Self::Null) => true,
            (Self::Null, _) | (_, Self::Null) => false,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::Seq(a), Self::Seq(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.matches(y))
            }
            (Self::Record(candidate), Self::Record(required)) => required
                .iter()
                .all(|(key, req)| candidate.get(key).is_some_and(|v| v.matches(req))),
            _ => match (self.as_f64(), required.as_f64()) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            },
        }
    }

    /// Deep-merge `other` into `self`.
    ///
    /// Record values merge per-key recursively; every other kind overwrites.
    /// Unspecified on the incoming side leaves the existing value alone.
    pub fn deep_merge(&mut self, other: &StateValue) {
        if other.is_unspecified() {
            return;
        }
        match (self, other) {
            (Self::Record(base), Self::Record(incoming)) => {
                for (key, value) in incoming {
                    match base.get_mut(key) {
                        Some(existing) => existing.deep_merge(value),
                        None => {
                            base.insert(key.clone(), value.clone());
                        }
                    }
                }
            }
            (slot, other) => *slot = other.clone(),
        }
    }

    /// Feed this value into a hasher. Used for search-node identity and the
    /// plan cache; floats hash by bit pattern.
    pub fn hash_into<H: Hasher>(&self, hasher: &mut H) {
        match self {
            Self::Unspecified => 0u8.hash(hasher),
            Self::Null => 1u8.hash(hasher),
            Self::Bool(b) => {
                2u8.hash(hasher);
                b.hash(hasher);
            }
            Self::Int(n) => {
                3u8.hash(hasher);
                n.hash(hasher);
            }
            Self::Float(x) => {
                4u8.hash(hasher);
                x.to_bits().hash(hasher);
            }
            Self::Str(s) => {
                5u8.hash(hasher);
                s.hash(hasher);
            }
            Self::Seq(items) => {
                6u8.hash(hasher);
                items.len().hash(hasher);
                for item in items {
                    item.hash_into(hasher);
                }
            }
            Self::Record(map) => {
                7u8.hash(hasher);
                map.len().hash(hasher);
                for (key, value) in map {
                    key.hash(hasher);
                    value.hash_into(hasher);
                }
            }
        }
    }

    /// Convert from a TOML value (configuration files).
    ///
    /// The string `"*"` is the wildcard sentinel; datetimes are carried as
    /// their string form.
    pub fn from_toml(value: &toml::Value) -> StateValue {
        match value {
            toml::Value::String(s) if s == "*" => Self::Unspecified,
            toml::Value::String(s) => Self::Str(s.clone()),
            toml::Value::Integer(n) => Self::Int(*n),
            toml::Value::Float(x) => Self::Float(*x),
            toml::Value::Boolean(b) => Self::Bool(*b),
            toml::Value::Datetime(dt) => Self::Str(dt.to_string()),
            toml::Value::Array(items) => Self::Seq(items.iter().map(Self::from_toml).collect()),
            toml::Value::Table(table) => Self::Record(
                table
                    .iter()
                    .map(|(k, v)| (k.clone(), Self::from_toml(v)))
                    .collect(),
            ),
        }
    }

    /// Convert from a JSON value (server responses, persisted caches).
    pub fn from_json(value: &serde_json::Value) -> StateValue {
        match value {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Self::Int(i),
                None => Self::Float(n.as_f64().unwrap_or(0.0)),
            },
            serde_json::Value::String(s) if s == "*" => Self::Unspecified,
            serde_json::Value::String(s) => Self::Str(s.clone()),
            serde_json::Value::Array(items) => {
                Self::Seq(items.iter().map(Self::from_json).collect())
            }
            serde_json::Value::Object(map) => Self::Record(
                map.iter()
                    .map(|(k, v)| (k.clone(), Self::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Convert to a JSON value. Inverse of [`StateValue::from_json`];
    /// `Unspecified` round-trips as the string `"*"`.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Unspecified => serde_json::Value::String("*".into()),
            Self::Null => serde_json::Value::Null,
            Self::Bool(b) => serde_json::Value::Bool(*b),
            Self::Int(n) => serde_json::Value::from(*n),
            Self::Float(x) => serde_json::Value::from(*x),
            Self::Str(s) => serde_json::Value::String(s.clone()),
            Self::Seq(items) => {
                serde_json::Value::Array(items.iter().map(Self::to_json).collect())
            }
            Self::Record(map) => serde_json::Value::Object(
                map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
        }
    }
}

impl serde::Serialize for StateValue {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> serde::Deserialize<'de> for StateValue {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let json = serde_json::Value::deserialize(deserializer)?;
        Ok(Self::from_json(&json))
    }
}

impl From<bool> for StateValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for StateValue {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<f64> for StateValue {
    fn from(x: f64) -> Self {
        Self::Float(x)
    }
}

impl From<&str> for StateValue {
    fn from(s: &str) -> Self {
        Self::Str(s.into())
    }
}

impl From<String> for StateValue {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl std::fmt::Display for StateValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unspecified => write!(f, "*"),
            Self::Null => write!(f, "null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(n) => write!(f, "{n}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Str(s) => write!(f, "{s}"),
            Self::Seq(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Self::Record(map) => {
                write!(f, "{{")?;
                for (i, (key, value)) in map.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{key}: {value}")?;
                }
                write!(f, "}}")
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Requirement
// ---------------------------------------------------------------------------

/// The required side of a comparison: a literal value, a nested requirement
/// record, or a threshold operator evaluated against the candidate at match
/// time. Thresholds are never rewritten into literals.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Requirement {
    Value(StateValue),
    GreaterThan(f64),
    AtLeast(f64),
    LessThan(f64),
    NotNull,
    Record(BTreeMap<String, Requirement>),
}

impl Requirement {
    /// Parse a raw state value into a requirement.
    ///
    /// Threshold strings (`">N"`, `">=N"`, `"<N"`, `"!null"`) become operator
    /// variants; records are parsed recursively so thresholds work on nested
    /// keys; everything else is a literal.
    pub fn parse(raw: &StateValue) -> Requirement {
        match raw {
            StateValue::Str(s) => Self::parse_str(s),
            StateValue::Record(map) => Self::Record(
                map.iter()
                    .map(|(k, v)| (k.clone(), Self::parse(v)))
                    .collect(),
            ),
            other => Self::Value(other.clone()),
        }
    }

    fn parse_str(s: &str) -> Requirement {
        if s == "!null" {
            return Self::NotNull;
        }
        if let Some(rest) = s.strip_prefix(">=") {
            if let Ok(n) = rest.trim().parse::<f64>() {
                return Self::AtLeast(n);
            }
        } else if let Some(rest) = s.strip_prefix('>') {
            if let Ok(n) = rest.trim().parse::<f64>() {
                return Self::GreaterThan(n);
            }
        } else if let Some(rest) = s.strip_prefix('<') {
            if let Ok(n) = rest.trim().parse::<f64>() {
                return Self::LessThan(n);
            }
        }
        Self::Value(StateValue::Str(s.into()))
    }

    /// Whether a candidate value satisfies this requirement.
    ///
    /// Thresholds fail on non-numeric candidates; `NotNull` accepts any
    /// present, non-null value.
    pub fn satisfied_by(&self, candidate: &StateValue) -> bool {
        match self {
            Self::Value(required) => candidate.matches(required),
            Self::GreaterThan(n) => candidate.as_f64().is_some_and(|v| v > *n),
            Self::AtLeast(n) => candidate.as_f64().is_some_and(|v| v >= *n),
            Self::LessThan(n) => candidate.as_f64().is_some_and(|v| v < *n),
            Self::NotNull => !candidate.is_null() && !candidate.is_unspecified(),
            Self::Record(required) => match candidate {
                StateValue::Unspecified => true,
                StateValue::Record(map) => required
                    .iter()
                    .all(|(key, req)| map.get(key).is_some_and(|v| req.satisfied_by(v))),
                _ => false,
            },
        }
    }

    /// Whether this requirement is the wildcard (matches anything).
    pub fn is_wildcard(&self) -> bool {
        matches!(self, Self::Value(StateValue::Unspecified))
    }
}

impl std::fmt::Display for Requirement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Value(v) => write!(f, "{v}"),
            Self::GreaterThan(n) => write!(f, ">{n}"),
            Self::AtLeast(n) => write!(f, ">={n}"),
            Self::LessThan(n) => write!(f, "<{n}"),
            Self::NotNull => write!(f, "!null"),
            Self::Record(map) => {
                write!(f, "{{")?;
                for (i, (key, req)) in map.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{key}: {req}")?;
                }
                write!(f, "}}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(pairs: &[(&str, StateValue)]) -> StateValue {
        StateValue::Record(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        )
    }

    #[test]
    fn unspecified_matches_everything() {
        let values = [
            StateValue::Null,
            StateValue::Bool(true),
            StateValue::Int(7),
            StateValue::Float(2.5),
            StateValue::Str("copper".into()),
            record(&[("safe", StateValue::Bool(false))]),
        ];
        for value in &values {
            assert!(value.matches(&StateValue::Unspecified));
            assert!(StateValue::Unspecified.matches(value));
        }
    }

    #[test]
    fn null_only_matches_null() {
        assert!(StateValue::Null.matches(&StateValue::Null));
        assert!(!StateValue::Null.matches(&StateValue::Bool(false)));
        assert!(!StateValue::Int(0).matches(&StateValue::Null));
    }

    #[test]
    fn numeric_equality_crosses_int_and_float() {
        assert!(StateValue::Int(5).matches(&StateValue::Float(5.0)));
        assert!(StateValue::Float(5.0).matches(&StateValue::Int(5)));
        assert!(!StateValue::Int(5).matches(&StateValue::Float(5.5)));
    }

    #[test]
    fn record_matching_is_subset() {
        let candidate = record(&[
            ("safe", StateValue::Bool(true)),
            ("alive", StateValue::Bool(true)),
            ("hp", StateValue::Int(80)),
        ]);
        let required = record(&[("safe", StateValue::Bool(true))]);
        assert!(candidate.matches(&required));
        // The other direction is not a subset.
        assert!(!required.matches(&candidate));

        let missing = record(&[("rested", StateValue::Bool(true))]);
        assert!(!candidate.matches(&missing));
    }

    #[test]
    fn sequences_compare_elementwise_and_ordered() {
        let a = StateValue::Seq(vec![StateValue::Int(1), StateValue::Int(2)]);
        let b = StateValue::Seq(vec![StateValue::Int(1), StateValue::Int(2)]);
        let c = StateValue::Seq(vec![StateValue::Int(2), StateValue::Int(1)]);
        let short = StateValue::Seq(vec![StateValue::Int(1)]);
        assert!(a.matches(&b));
        assert!(!a.matches(&c));
        assert!(!a.matches(&short));
    }

    #[test]
    fn threshold_parsing() {
        assert_eq!(
            Requirement::parse(&StateValue::Str(">80".into())),
            Requirement::GreaterThan(80.0)
        );
        assert_eq!(
            Requirement::parse(&StateValue::Str(">=3".into())),
            Requirement::AtLeast(3.0)
        );
        assert_eq!(
            Requirement::parse(&StateValue::Str("<30".into())),
            Requirement::LessThan(30.0)
        );
        assert_eq!(
            Requirement::parse(&StateValue::Str("!null".into())),
            Requirement::NotNull
        );
        // Not a threshold: stays a literal string.
        assert_eq!(
            Requirement::parse(&StateValue::Str("copper_ore".into())),
            Requirement::Value(StateValue::Str("copper_ore".into()))
        );
    }

    #[test]
    fn thresholds_evaluate_against_candidate() {
        assert!(Requirement::GreaterThan(80.0).satisfied_by(&StateValue::Int(81)));
        assert!(!Requirement::GreaterThan(80.0).satisfied_by(&StateValue::Int(80)));
        assert!(Requirement::AtLeast(80.0).satisfied_by(&StateValue::Int(80)));
        assert!(Requirement::LessThan(30.0).satisfied_by(&StateValue::Float(29.5)));
        assert!(!Requirement::LessThan(30.0).satisfied_by(&StateValue::Str("30".into())));
        assert!(Requirement::NotNull.satisfied_by(&StateValue::Str("iron_sword".into())));
        assert!(!Requirement::NotNull.satisfied_by(&StateValue::Null));
    }

    #[test]
    fn nested_requirement_records() {
        let req = Requirement::parse(&record(&[(
            "character_status",
            record(&[("hp_percentage", StateValue::Str(">50".into()))]),
        )]));
        let healthy = record(&[(
            "character_status",
            record(&[
                ("hp_percentage", StateValue::Int(80)),
                ("safe", StateValue::Bool(true)),
            ]),
        )]);
        let hurt = record(&[(
            "character_status",
            record(&[("hp_percentage", StateValue::Int(40))]),
        )]);
        assert!(req.satisfied_by(&healthy));
        assert!(!req.satisfied_by(&hurt));
    }

    #[test]
    fn deep_merge_preserves_sibling_keys() {
        let mut base = record(&[
            ("x", StateValue::Int(1)),
            ("y", StateValue::Int(2)),
        ]);
        base.deep_merge(&record(&[("y", StateValue::Int(9))]));
        assert_eq!(
            base,
            record(&[("x", StateValue::Int(1)), ("y", StateValue::Int(9))])
        );
    }

    #[test]
    fn json_round_trip() {
        let original = record(&[
            ("level", StateValue::Int(12)),
            ("weapon", StateValue::Str("iron_sword".into())),
            ("any", StateValue::Unspecified),
            ("slot", StateValue::Null),
        ]);
        let json = original.to_json();
        assert_eq!(StateValue::from_json(&json), original);
    }

    #[test]
    fn toml_wildcard_sentinel() {
        let value = toml::Value::String("*".into());
        assert_eq!(StateValue::from_toml(&value), StateValue::Unspecified);
        let literal = toml::Value::String("copper".into());
        assert_eq!(
            StateValue::from_toml(&literal),
            StateValue::Str("copper".into())
        );
    }
}
