//! Option dictionaries and their validation against declared tables.

use std::collections::BTreeMap;
use std::fmt;

use crate::error::{Error, Result};

/// A single option value.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum OptionValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Dict(Options),
}

/// The type an option expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionKind {
    Bool,
    Int,
    Float,
    Str,
    Dict,
}

impl OptionValue {
    pub fn kind(&self) -> OptionKind {
        match self {
            OptionValue::Bool(_) => OptionKind::Bool,
            OptionValue::Int(_) => OptionKind::Int,
            OptionValue::Float(_) => OptionKind::Float,
            OptionValue::Str(_) => OptionKind::Str,
            OptionValue::Dict(_) => OptionKind::Dict,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            OptionValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            OptionValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Floats, and integers widened to floats.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            OptionValue::Float(v) => Some(*v),
            OptionValue::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            OptionValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_dict(&self) -> Option<&Options> {
        match self {
            OptionValue::Dict(d) => Some(d),
            _ => None,
        }
    }
}

impl From<bool> for OptionValue {
    fn from(v: bool) -> Self {
        OptionValue::Bool(v)
    }
}

impl From<i64> for OptionValue {
    fn from(v: i64) -> Self {
        OptionValue::Int(v)
    }
}

impl From<f64> for OptionValue {
    fn from(v: f64) -> Self {
        OptionValue::Float(v)
    }
}

impl From<&str> for OptionValue {
    fn from(v: &str) -> Self {
        OptionValue::Str(v.to_string())
    }
}

impl From<String> for OptionValue {
    fn from(v: String) -> Self {
        OptionValue::Str(v)
    }
}

impl From<Options> for OptionValue {
    fn from(v: Options) -> Self {
        OptionValue::Dict(v)
    }
}

impl fmt::Display for OptionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionValue::Bool(b) => write!(f, "{}", b),
            OptionValue::Int(i) => write!(f, "{}", i),
            OptionValue::Float(v) => write!(f, "{}", v),
            OptionValue::Str(s) => write!(f, "\"{}\"", s),
            OptionValue::Dict(d) => write!(f, "{}", d),
        }
    }
}

/// Ordered option dictionary.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Options(BTreeMap<String, OptionValue>);

/// Declaration of one recognised option.
#[derive(Debug, Clone, Copy)]
pub struct OptionSpec {
    pub name: &'static str,
    pub kind: OptionKind,
    pub doc: &'static str,
    /// Recognised but no longer supported; setting it is an error.
    pub retired: bool,
}

impl OptionSpec {
    pub const fn new(name: &'static str, kind: OptionKind, doc: &'static str) -> Self {
        OptionSpec {
            name,
            kind,
            doc,
            retired: false,
        }
    }

    pub const fn retired(name: &'static str, kind: OptionKind, doc: &'static str) -> Self {
        OptionSpec {
            name,
            kind,
            doc,
            retired: true,
        }
    }
}

impl Options {
    pub fn new() -> Self {
        Options(BTreeMap::new())
    }

    /// Builder-style insert.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<OptionValue>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }

    /// Insert, returning the previous value.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<OptionValue>) -> Option<OptionValue> {
        self.0.insert(name.into(), value.into())
    }

    pub fn get(&self, name: &str) -> Option<&OptionValue> {
        self.0.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &OptionValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// `name` as a bool, or `default` when unset.
    pub fn bool_or(&self, name: &str, default: bool) -> bool {
        self.get(name).and_then(OptionValue::as_bool).unwrap_or(default)
    }

    pub fn int_or(&self, name: &str, default: i64) -> i64 {
        self.get(name).and_then(OptionValue::as_int).unwrap_or(default)
    }

    pub fn float_or(&self, name: &str, default: f64) -> f64 {
        self.get(name).and_then(OptionValue::as_float).unwrap_or(default)
    }

    /// Check every entry against `specs`. Unknown names fail with
    /// [`Error::UnknownOption`]; retired names and type mismatches fail with
    /// [`Error::UnsupportedOption`]. An integer is accepted where a float is
    /// declared.
    pub fn validate(&self, owner: &str, specs: &[OptionSpec]) -> Result<()> {
        for (name, value) in &self.0 {
            let spec = specs.iter().find(|s| s.name == name).ok_or_else(|| Error::UnknownOption {
                owner: owner.to_string(),
                name: name.clone(),
            })?;
            if spec.retired {
                return Err(Error::UnsupportedOption {
                    name: name.clone(),
                    reason: format!("'{}' no longer supports this option", owner),
                });
            }
            let kind = value.kind();
            let widened = spec.kind == OptionKind::Float && kind == OptionKind::Int;
            if kind != spec.kind && !widened {
                return Err(Error::UnsupportedOption {
                    name: name.clone(),
                    reason: format!("expected {:?}, got {:?}", spec.kind, kind),
                });
            }
        }
        Ok(())
    }
}

impl fmt::Display for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (k, v)) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}: {}", k, v)?;
        }
        write!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SPECS: &[OptionSpec] = &[
        OptionSpec::new("tol", OptionKind::Float, "tolerance"),
        OptionSpec::new("verbose", OptionKind::Bool, "chatty output"),
        OptionSpec::retired("compiler", OptionKind::Str, "external compiler"),
    ];

    #[test]
    fn known_options_pass() {
        let opts = Options::new().with("tol", 1e-8).with("verbose", true);
        opts.validate("test", SPECS).unwrap();
        // Integers widen to floats.
        Options::new().with("tol", 1i64).validate("test", SPECS).unwrap();
    }

    #[test]
    fn unknown_and_retired_options_fail() {
        let err = Options::new().with("tolerance", 1e-8).validate("test", SPECS).unwrap_err();
        assert!(matches!(err, Error::UnknownOption { .. }));
        let err = Options::new().with("compiler", "gcc").validate("test", SPECS).unwrap_err();
        assert!(matches!(err, Error::UnsupportedOption { .. }));
        let err = Options::new().with("verbose", 1i64).validate("test", SPECS).unwrap_err();
        assert!(matches!(err, Error::UnsupportedOption { .. }));
    }

    #[test]
    fn display_is_ordered() {
        let opts = Options::new().with("b", 2i64).with("a", "x");
        assert_eq!(opts.to_string(), "{a: \"x\", b: 2}");
    }
}
