//! # Identity Newtypes
//!
//! Domain-primitive newtypes for the names that flow through validation.
//! A [`TypeRef`] cannot be passed where a [`FieldName`] is expected, and
//! neither can be built from a string that breaks its grammar.
//!
//! ## Validation
//!
//! - [`TypeRef`]: `NAMESPACE/TYPE_NAME`, exactly one `/`, both parts non-empty.
//! - [`FieldName`]: lowercase snake case, optionally followed by numeric
//!   suffixes (`zone_air_temperature_sensor_2`).
//!
//! Both validate at construction and at deserialization, so a malformed
//! value never reaches the checkers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize, Serializer};

use crate::error::MalformedInput;

/// Implements `Deserialize` for string newtypes by routing the raw string
/// through the type's validating `FromStr`.
macro_rules! impl_validating_deserialize {
    ($ty:ident) => {
        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                let raw = String::deserialize(deserializer)?;
                raw.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Type references
// ---------------------------------------------------------------------------

/// Reference to a type definition within the universe.
///
/// Encoded in instance files as `NAMESPACE/TYPE_NAME`, e.g. `HVAC/FAN_SS`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeRef {
    namespace: String,
    type_name: String,
}

impl_validating_deserialize!(TypeRef);

impl TypeRef {
    /// Build a type reference from its two components.
    ///
    /// # Errors
    ///
    /// Returns [`MalformedInput::InvalidTypeRef`] if either component is
    /// empty or contains the `/` separator.
    pub fn new(
        namespace: impl Into<String>,
        type_name: impl Into<String>,
    ) -> Result<Self, MalformedInput> {
        let namespace = namespace.into();
        let type_name = type_name.into();
        if !Self::valid_component(&namespace) || !Self::valid_component(&type_name) {
            return Err(MalformedInput::InvalidTypeRef(format!(
                "{namespace}/{type_name}"
            )));
        }
        Ok(Self {
            namespace,
            type_name,
        })
    }

    /// Parse a `NAMESPACE/TYPE_NAME` string.
    ///
    /// # Errors
    ///
    /// Returns [`MalformedInput::InvalidTypeRef`] if the separator is
    /// missing, repeated, or either side is empty.
    pub fn parse(raw: &str) -> Result<Self, MalformedInput> {
        let (namespace, type_name) = raw
            .split_once('/')
            .ok_or_else(|| MalformedInput::InvalidTypeRef(raw.to_string()))?;
        Self::new(namespace, type_name)
            .map_err(|_| MalformedInput::InvalidTypeRef(raw.to_string()))
    }

    fn valid_component(s: &str) -> bool {
        !s.is_empty() && !s.contains('/') && !s.chars().any(char::is_whitespace)
    }

    /// The namespace component.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// The type name component.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }
}

impl FromStr for TypeRef {
    type Err = MalformedInput;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.type_name)
    }
}

impl Serialize for TypeRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

// ---------------------------------------------------------------------------
// Field names
// ---------------------------------------------------------------------------

/// Name of a standard ontology field, e.g. `supply_air_temperature_sensor`.
///
/// Grammar: one or more `_`-separated segments of `[a-z][a-z0-9]*`,
/// followed by zero or more `_`-separated numeric segments.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct FieldName(String);

impl_validating_deserialize!(FieldName);

impl FieldName {
    /// Create a field name, validating its grammar.
    ///
    /// # Errors
    ///
    /// Returns [`MalformedInput::InvalidFieldName`] if the name does not
    /// follow the field grammar.
    pub fn new(value: impl Into<String>) -> Result<Self, MalformedInput> {
        let s = value.into();
        if Self::is_valid(&s) {
            Ok(Self(s))
        } else {
            Err(MalformedInput::InvalidFieldName(s))
        }
    }

    fn is_valid(s: &str) -> bool {
        let mut segments = s.split('_');
        // The first segment is always a word segment.
        match segments.next() {
            Some(first) if is_word_segment(first) => {}
            _ => return false,
        }
        let mut in_suffix = false;
        for segment in segments {
            if !in_suffix && is_word_segment(segment) {
                continue;
            }
            if is_numeric_segment(segment) {
                in_suffix = true;
                continue;
            }
            return false;
        }
        true
    }

    /// Access the name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn is_word_segment(segment: &str) -> bool {
    let mut chars = segment.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_lowercase())
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
}

fn is_numeric_segment(segment: &str) -> bool {
    !segment.is_empty() && segment.chars().all(|c| c.is_ascii_digit())
}

impl FromStr for FieldName {
    type Err = MalformedInput;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl fmt::Display for FieldName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for FieldName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::borrow::Borrow<str> for FieldName {
    fn borrow(&self) -> &str {
        &self.0
    }
}
