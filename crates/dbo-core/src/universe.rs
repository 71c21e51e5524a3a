//! # Ontology Universe
//!
//! The read-only index of type definitions and connection relations that
//! every entity instance is checked against.
//!
//! ```text
//! Universe
//!   ├── type_universe:        namespace ─▶ type name ─▶ TypeDefinition
//!   │                                                    └── field ─▶ FieldSpec
//!   └── connections_universe: { CONTAINS, CONTROLS, FEEDS, ... }
//! ```
//!
//! Field sets arrive already flattened: every [`TypeDefinition`] carries
//! the union of its own and its inherited fields. Assembling the type
//! graph is the job of whoever builds the universe; this module only
//! stores the result and answers lookups.
//!
//! ## Ownership
//!
//! A `Universe` is built once per run and then passed by shared reference
//! into every check. Nothing here hands out mutable access after
//! construction, and all types are `Send + Sync`.

use std::collections::{BTreeMap, BTreeSet};

use serde::Deserialize;

use crate::error::{LookupError, UniverseError};
use crate::identity::{FieldName, TypeRef};

// ---------------------------------------------------------------------------
// Field specifications
// ---------------------------------------------------------------------------

/// The value kind of a field, with the vocabulary it admits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldKind {
    /// Bare presence. No unit or state payload is modeled.
    Plain,
    /// A measured value; translations must name units from this family.
    Measurement {
        /// Allowed standard unit names.
        units: BTreeSet<String>,
    },
    /// An enumerated multi-state signal; translations must map these states.
    MultiState {
        /// Allowed standard state names.
        states: BTreeSet<String>,
    },
}

/// A field as expected by a type definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    name: FieldName,
    kind: FieldKind,
    optional: bool,
}

impl FieldSpec {
    /// A required presence-only field.
    pub fn plain(name: FieldName) -> Self {
        Self {
            name,
            kind: FieldKind::Plain,
            optional: false,
        }
    }

    /// A required measurement field admitting the given unit family.
    pub fn measurement<I, S>(name: FieldName, units: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name,
            kind: FieldKind::Measurement {
                units: units.into_iter().map(Into::into).collect(),
            },
            optional: false,
        }
    }

    /// A required multi-state field admitting the given states.
    pub fn multi_state<I, S>(name: FieldName, states: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name,
            kind: FieldKind::MultiState {
                states: states.into_iter().map(Into::into).collect(),
            },
            optional: false,
        }
    }

    /// Mark the field optional.
    #[must_use]
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// The field name.
    pub fn name(&self) -> &FieldName {
        &self.name
    }

    /// The value kind.
    pub fn kind(&self) -> &FieldKind {
        &self.kind
    }

    /// Whether an instance may omit this field.
    pub fn is_optional(&self) -> bool {
        self.optional
    }
}

// ---------------------------------------------------------------------------
// Type definitions
// ---------------------------------------------------------------------------

/// A type in the universe, with its flattened field set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeDefinition {
    type_ref: TypeRef,
    is_abstract: bool,
    fields: BTreeMap<FieldName, FieldSpec>,
}

impl TypeDefinition {
    /// A concrete type with no fields.
    pub fn new(type_ref: TypeRef) -> Self {
        Self {
            type_ref,
            is_abstract: false,
            fields: BTreeMap::new(),
        }
    }

    /// Mark the type abstract: inheritable, never instantiable.
    #[must_use]
    pub fn into_abstract(mut self) -> Self {
        self.is_abstract = true;
        self
    }

    /// Add a field to the flattened field set, replacing any field of the
    /// same name.
    #[must_use]
    pub fn with_field(mut self, spec: FieldSpec) -> Self {
        self.fields.insert(spec.name.clone(), spec);
        self
    }

    /// The reference under which this type is indexed.
    pub fn type_ref(&self) -> &TypeRef {
        &self.type_ref
    }

    /// The namespace of the type.
    pub fn namespace(&self) -> &str {
        self.type_ref.namespace()
    }

    /// The type name.
    pub fn name(&self) -> &str {
        self.type_ref.type_name()
    }

    /// Whether the type is abstract.
    pub fn is_abstract(&self) -> bool {
        self.is_abstract
    }

    /// Look up a field by name.
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.get(name)
    }

    /// Whether the type recognizes the field.
    pub fn has_field(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// All fields, ordered by name.
    pub fn fields(&self) -> impl Iterator<Item = &FieldSpec> {
        self.fields.values()
    }

    /// Fields an instance must declare.
    pub fn required_fields(&self) -> impl Iterator<Item = &FieldSpec> {
        self.fields.values().filter(|f| !f.optional)
    }
}

// ---------------------------------------------------------------------------
// Universe
// ---------------------------------------------------------------------------

/// The complete, read-only validation authority.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Universe {
    type_universe: BTreeMap<String, BTreeMap<String, TypeDefinition>>,
    connections_universe: BTreeSet<String>,
}

impl Universe {
    /// An empty universe.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a type definition, indexed by its namespace and name.
    #[must_use]
    pub fn with_type(mut self, definition: TypeDefinition) -> Self {
        self.insert_type(definition);
        self
    }

    /// Add allowed connection relation names.
    #[must_use]
    pub fn with_connections<I, S>(mut self, relations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.connections_universe
            .extend(relations.into_iter().map(Into::into));
        self
    }

    fn insert_type(&mut self, definition: TypeDefinition) {
        self.type_universe
            .entry(definition.namespace().to_string())
            .or_default()
            .insert(definition.name().to_string(), definition);
    }

    /// Resolve a type reference.
    ///
    /// Looks up the namespace first, then the type name, so callers can
    /// tell an unknown namespace from a missing type. Abstract types
    /// resolve successfully; rejecting them is the caller's decision.
    ///
    /// # Errors
    ///
    /// Returns [`LookupError::NamespaceNotFound`] or
    /// [`LookupError::TypeNotFoundInNamespace`].
    pub fn resolve(&self, type_ref: &TypeRef) -> Result<&TypeDefinition, LookupError> {
        let namespace = self.type_universe.get(type_ref.namespace()).ok_or_else(|| {
            LookupError::NamespaceNotFound {
                namespace: type_ref.namespace().to_string(),
            }
        })?;
        namespace
            .get(type_ref.type_name())
            .ok_or_else(|| LookupError::TypeNotFoundInNamespace {
                namespace: type_ref.namespace().to_string(),
                type_name: type_ref.type_name().to_string(),
            })
    }

    /// Whether `relation` is an allowed connection relation.
    pub fn is_known_connection(&self, relation: &str) -> bool {
        self.connections_universe.contains(relation)
    }

    /// namespace ─▶ type name ─▶ definition.
    pub fn type_universe(&self) -> &BTreeMap<String, BTreeMap<String, TypeDefinition>> {
        &self.type_universe
    }

    /// The allowed connection relation names.
    pub fn connections_universe(&self) -> &BTreeSet<String> {
        &self.connections_universe
    }

    /// Total number of type definitions across all namespaces.
    pub fn type_count(&self) -> usize {
        self.type_universe.values().map(BTreeMap::len).sum()
    }

    /// Load a universe from a pre-flattened YAML document.
    ///
    /// ```yaml
    /// connections: [CONTAINS, CONTROLS, FEEDS]
    /// namespaces:
    ///   HVAC:
    ///     FAN_SS:
    ///       abstract: false
    ///       fields:
    ///         run_command: {}
    ///         run_status: { kind: multi_state, states: [ON, OFF] }
    ///         zone_air_temperature_sensor: { kind: measurement, units: [degrees_celsius] }
    ///         speed_percentage_command: { optional: true }
    /// ```
    ///
    /// # Errors
    ///
    /// Returns [`UniverseError::Document`] if the YAML does not match the
    /// layout above, or [`UniverseError::InvalidEntry`] if a type or field
    /// name is malformed or a field's vocabulary disagrees with its kind.
    pub fn from_yaml_str(source: &str) -> Result<Self, UniverseError> {
        let document: UniverseDocument = serde_yaml::from_str(source)?;
        document.into_universe()
    }
}

// ---------------------------------------------------------------------------
// Document layout
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct UniverseDocument {
    #[serde(default)]
    connections: BTreeSet<String>,
    #[serde(default)]
    namespaces: BTreeMap<String, BTreeMap<String, TypeDocument>>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TypeDocument {
    #[serde(default, rename = "abstract")]
    is_abstract: bool,
    #[serde(default)]
    fields: BTreeMap<String, FieldDocument>,
}

#[derive(Debug, Default, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
enum KindTag {
    #[default]
    Plain,
    Measurement,
    MultiState,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct FieldDocument {
    #[serde(default)]
    kind: KindTag,
    #[serde(default)]
    optional: bool,
    #[serde(default)]
    units: BTreeSet<String>,
    #[serde(default)]
    states: BTreeSet<String>,
}

impl UniverseDocument {
    fn into_universe(self) -> Result<Universe, UniverseError> {
        let mut universe = Universe::new().with_connections(self.connections);
        for (namespace, types) in self.namespaces {
            for (name, doc) in types {
                let entry = format!("{namespace}/{name}");
                let type_ref = TypeRef::new(namespace.clone(), name).map_err(|e| {
                    UniverseError::InvalidEntry {
                        entry: entry.clone(),
                        reason: e.to_string(),
                    }
                })?;
                let mut definition = TypeDefinition::new(type_ref);
                definition.is_abstract = doc.is_abstract;
                for (field, field_doc) in doc.fields {
                    let spec = field_doc.into_spec(&entry, field)?;
                    definition = definition.with_field(spec);
                }
                universe.insert_type(definition);
            }
        }
        Ok(universe)
    }
}

impl FieldDocument {
    fn into_spec(self, type_entry: &str, field: String) -> Result<FieldSpec, UniverseError> {
        let entry = format!("{type_entry}.{field}");
        let invalid = |reason: &str| UniverseError::InvalidEntry {
            entry: entry.clone(),
            reason: reason.to_string(),
        };
        let name = FieldName::new(field).map_err(|e| invalid(&e.to_string()))?;
        let spec = match self.kind {
            KindTag::Plain => {
                if !self.units.is_empty() || !self.states.is_empty() {
                    return Err(invalid("plain fields take no units or states"));
                }
                FieldSpec::plain(name)
            }
            KindTag::Measurement => {
                if self.units.is_empty() {
                    return Err(invalid("measurement fields need a unit family"));
                }
                if !self.states.is_empty() {
                    return Err(invalid("measurement fields take no states"));
                }
                FieldSpec::measurement(name, self.units)
            }
            KindTag::MultiState => {
                if self.states.is_empty() {
                    return Err(invalid("multi-state fields need a state set"));
                }
                if !self.units.is_empty() {
                    return Err(invalid("multi-state fields take no units"));
                }
                FieldSpec::multi_state(name, self.states)
            }
        };
        Ok(if self.optional { spec.optional() } else { spec })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(name: &str) -> FieldName {
        FieldName::new(name).unwrap()
    }

    fn sample() -> Universe {
        Universe::new()
            .with_type(
                TypeDefinition::new(TypeRef::parse("HVAC/FAN_SS").unwrap())
                    .with_field(FieldSpec::plain(field("run_command")))
                    .with_field(FieldSpec::multi_state(field("run_status"), ["ON", "OFF"]))
                    .with_field(
                        FieldSpec::measurement(field("speed_frequency_sensor"), ["hertz"])
                            .optional(),
                    ),
            )
            .with_type(
                TypeDefinition::new(TypeRef::parse("HVAC/EQUIPMENT").unwrap()).into_abstract(),
            )
            .with_connections(["CONTAINS", "FEEDS"])
    }

    #[test]
    fn resolve_finds_concrete_type() {
        let u = sample();
        let def = u.resolve(&TypeRef::parse("HVAC/FAN_SS").unwrap()).unwrap();
        assert_eq!(def.namespace(), "HVAC");
        assert_eq!(def.name(), "FAN_SS");
        assert!(!def.is_abstract());
        assert_eq!(def.fields().count(), 3);
        assert_eq!(def.required_fields().count(), 2);
    }

    #[test]
    fn resolve_distinguishes_missing_namespace_from_missing_type() {
        let u = sample();
        let err = u.resolve(&TypeRef::parse("LIGHTING/FAN_SS").unwrap()).unwrap_err();
        assert_eq!(
            err,
            LookupError::NamespaceNotFound {
                namespace: "LIGHTING".to_string()
            }
        );

        let err = u.resolve(&TypeRef::parse("HVAC/AHU").unwrap()).unwrap_err();
        assert_eq!(
            err,
            LookupError::TypeNotFoundInNamespace {
                namespace: "HVAC".to_string(),
                type_name: "AHU".to_string()
            }
        );
    }

    #[test]
    fn abstract_types_still_resolve() {
        let u = sample();
        let def = u.resolve(&TypeRef::parse("HVAC/EQUIPMENT").unwrap()).unwrap();
        assert!(def.is_abstract());
    }

    #[test]
    fn connections_are_exact_matches() {
        let u = sample();
        assert!(u.is_known_connection("CONTAINS"));
        assert!(!u.is_known_connection("contains"));
        assert!(!u.is_known_connection("CONTROLS"));
    }

    #[test]
    fn loads_flattened_document() {
        let source = r#"
connections: [CONTAINS, CONTROLS, FEEDS]
namespaces:
  FACILITIES:
    BUILDING: {}
  HVAC:
    EQUIPMENT:
      abstract: true
    FAN_SS:
      fields:
        run_command: {}
        run_status: { kind: multi_state, states: [ON, OFF] }
        zone_air_temperature_sensor:
          kind: measurement
          units: [degrees_celsius, kelvins]
        speed_percentage_command: { optional: true }
"#;
        let u = Universe::from_yaml_str(source).unwrap();
        assert_eq!(u.type_count(), 3);
        assert_eq!(u.connections_universe().len(), 3);

        let fan = u.resolve(&TypeRef::parse("HVAC/FAN_SS").unwrap()).unwrap();
        assert!(matches!(
            fan.field("run_status").map(FieldSpec::kind),
            Some(FieldKind::MultiState { states }) if states.contains("OFF")
        ));
        assert!(fan.field("speed_percentage_command").unwrap().is_optional());
        assert!(u
            .resolve(&TypeRef::parse("HVAC/EQUIPMENT").unwrap())
            .unwrap()
            .is_abstract());
    }

    #[test]
    fn rejects_measurement_without_units() {
        let source = r#"
namespaces:
  HVAC:
    FAN_SS:
      fields:
        zone_air_temperature_sensor: { kind: measurement }
"#;
        let err = Universe::from_yaml_str(source).unwrap_err();
        assert!(
            matches!(&err, UniverseError::InvalidEntry { entry, .. } if entry == "HVAC/FAN_SS.zone_air_temperature_sensor"),
            "unexpected error: {err}"
        );
    }

    #[test]
    fn rejects_malformed_field_name() {
        let source = r#"
namespaces:
  HVAC:
    FAN_SS:
      fields:
        RunStatus: {}
"#;
        assert!(matches!(
            Universe::from_yaml_str(source),
            Err(UniverseError::InvalidEntry { .. })
        ));
    }

    #[test]
    fn rejects_unknown_document_keys() {
        assert!(matches!(
            Universe::from_yaml_str("types: {}"),
            Err(UniverseError::Document(_))
        ));
    }
}
