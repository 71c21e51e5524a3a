//! # Entity Instance Model
//!
//! Turns one raw entity block (a YAML mapping) into a typed, immutable
//! [`EntityInstance`]. All structural normalization happens here, once:
//! the type reference is parsed, translation payloads are sorted into the
//! closed [`FieldTranslation`] variants, and links and connections are
//! flattened into lists. The checkers never look at raw YAML.
//!
//! ## Raw Layout
//!
//! ```yaml
//! type: HVAC/FAN_SS
//! id: "device-42"
//! translation:
//!   run_command: points.run_command.present_value
//!   run_status:
//!     present_value: points.run_status.present_value
//!     states: { ON: "1", OFF: "0" }
//!   zone_air_temperature_sensor:
//!     present_value: points.zone_temp.present_value
//!     units:
//!       key: pointset.points.zone_temp.units
//!       values: { degrees_celsius: degC }
//! links:
//!   AHU-1: { supply_air_temperature_sensor: discharge_air_temperature_sensor }
//! connections:
//!   FLOOR-1: CONTAINS
//! ```
//!
//! ## Errors
//!
//! A block that cannot be interpreted fails with [`MalformedInput`]. Blocks
//! that are well-formed but disagree with the ontology construct fine and
//! are rejected later by validation.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_yaml::{Mapping, Value};

use dbo_core::{FieldName, MalformedInput, TypeRef};

/// Translation value declaring a device that reports ontology fields natively.
pub const COMPLIANT: &str = "COMPLIANT";

/// Sibling entities keyed by entity name, used for link resolution.
pub type EntityMap = BTreeMap<String, EntityInstance>;

const KEY_TYPE: &str = "type";
const KEY_ID: &str = "id";
const KEY_TRANSLATION: &str = "translation";
const KEY_LINKS: &str = "links";
const KEY_CONNECTIONS: &str = "connections";
const KEY_METADATA: &str = "metadata";

const KEY_PRESENT_VALUE: &str = "present_value";
const KEY_UNITS: &str = "units";
const KEY_UNIT_VALUES: &str = "unit_values";
const KEY_STATES: &str = "states";
const KEY_UNITS_KEY: &str = "key";
const KEY_UNITS_VALUES: &str = "values";

// ---------------------------------------------------------------------------
// Translations
// ---------------------------------------------------------------------------

/// How an entity maps its device points onto ontology fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Translation {
    /// The device already reports ontology fields; nothing is mapped.
    Compliant,
    /// Explicit per-field translations.
    Fields(BTreeMap<FieldName, FieldTranslation>),
}

/// A single field translation. Exactly one of three shapes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum FieldTranslation {
    /// Bare presence: the raw point carrying the value.
    Plain {
        /// Raw point path, if declared.
        present_value: Option<String>,
    },
    /// A measured value with a unit mapping.
    Measurement {
        /// Raw point path, if declared.
        present_value: Option<String>,
        /// Standard unit to raw unit mapping.
        units: UnitMapping,
    },
    /// A multi-state value with a state mapping.
    MultiState {
        /// Raw point path, if declared.
        present_value: Option<String>,
        /// Standard state name to raw device value.
        states: BTreeMap<String, String>,
    },
}

impl FieldTranslation {
    /// The raw point path the value is read from.
    pub fn present_value(&self) -> Option<&str> {
        match self {
            Self::Plain { present_value }
            | Self::Measurement { present_value, .. }
            | Self::MultiState { present_value, .. } => present_value.as_deref(),
        }
    }
}

/// Unit mapping of a measurement translation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UnitMapping {
    /// Raw point path of the unit value. Absent for the `unit_values` shorthand.
    pub key: Option<String>,
    /// Standard unit name to raw device unit.
    pub values: BTreeMap<String, String>,
}

// ---------------------------------------------------------------------------
// Links and connections
// ---------------------------------------------------------------------------

/// A reference from one of this entity's fields to a field on another entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Link {
    target_entity: String,
    local_field: FieldName,
    target_field: FieldName,
}

impl Link {
    /// Name of the entity owning the referenced field.
    pub fn target_entity(&self) -> &str {
        &self.target_entity
    }

    /// The field on this entity that the link provides.
    pub fn local_field(&self) -> &FieldName {
        &self.local_field
    }

    /// The field on the target entity that is referenced.
    pub fn target_field(&self) -> &FieldName {
        &self.target_field
    }
}

/// A directed relation from a source entity to this entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Connection {
    source_entity: String,
    relation: String,
}

impl Connection {
    /// Name of the entity at the other end of the relation.
    pub fn source_entity(&self) -> &str {
        &self.source_entity
    }

    /// Relation name, e.g. `FEEDS`.
    pub fn relation(&self) -> &str {
        &self.relation
    }
}

// ---------------------------------------------------------------------------
// Entity instance
// ---------------------------------------------------------------------------

/// One entity declaration, normalized and immutable.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityInstance {
    name: String,
    id: String,
    type_ref: TypeRef,
    translation: Translation,
    links: Vec<Link>,
    connections: Vec<Connection>,
    metadata: Option<Value>,
}

impl EntityInstance {
    /// Build an instance from its raw YAML block.
    ///
    /// # Errors
    ///
    /// Returns [`MalformedInput`] if the block is not a mapping, lacks a
    /// `type`, carries an unknown key, has a type reference without the
    /// `NAMESPACE/TYPE_NAME` shape, or has a translation, link or
    /// connection entry that omits a required part.
    pub fn from_yaml(name: impl Into<String>, raw: &Value) -> Result<Self, MalformedInput> {
        let name = name.into();
        let block = as_mapping(raw, &name, "a mapping of entity attributes")?;

        for key in block.keys() {
            let key = key_str(key, &name)?;
            if ![
                KEY_TYPE,
                KEY_ID,
                KEY_TRANSLATION,
                KEY_LINKS,
                KEY_CONNECTIONS,
                KEY_METADATA,
            ]
            .contains(&key)
            {
                return Err(MalformedInput::UnexpectedKey {
                    context: name,
                    key: key.to_string(),
                });
            }
        }

        let type_ref = match block.get(KEY_TYPE) {
            None | Some(Value::Null) => {
                return Err(MalformedInput::MissingKey {
                    context: name,
                    key: KEY_TYPE.to_string(),
                })
            }
            Some(Value::String(raw_type)) => TypeRef::parse(raw_type)?,
            Some(_) => {
                return Err(MalformedInput::UnexpectedShape {
                    context: format!("{name}.{KEY_TYPE}"),
                    expected: "a NAMESPACE/TYPE_NAME string",
                })
            }
        };

        let id = match block.get(KEY_ID) {
            None | Some(Value::Null) => {
                return Err(MalformedInput::MissingKey {
                    context: name,
                    key: KEY_ID.to_string(),
                })
            }
            Some(value) => scalar_string(value).ok_or_else(|| MalformedInput::UnexpectedShape {
                context: format!("{name}.{KEY_ID}"),
                expected: "a scalar identifier",
            })?,
        };

        let translation = parse_translation(&name, block.get(KEY_TRANSLATION))?;
        let links = parse_links(&name, block.get(KEY_LINKS))?;
        let connections = parse_connections(&name, block.get(KEY_CONNECTIONS))?;
        let metadata = block.get(KEY_METADATA).cloned();

        Ok(Self {
            name,
            id,
            type_ref,
            translation,
            links,
            connections,
            metadata,
        })
    }

    /// The entity name (its key in the instance file).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The opaque device identifier.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The declared type.
    pub fn type_ref(&self) -> &TypeRef {
        &self.type_ref
    }

    /// The declared translation.
    pub fn translation(&self) -> &Translation {
        &self.translation
    }

    /// Whether the translation is `COMPLIANT`.
    pub fn is_compliant(&self) -> bool {
        matches!(self.translation, Translation::Compliant)
    }

    /// Explicitly translated fields. Empty for compliant devices.
    pub fn fields(&self) -> impl Iterator<Item = (&FieldName, &FieldTranslation)> {
        let fields = match &self.translation {
            Translation::Fields(fields) => Some(fields.iter()),
            Translation::Compliant => None,
        };
        fields.into_iter().flatten()
    }

    /// Whether the entity declares a translation for `field`.
    pub fn declares_field(&self, field: &str) -> bool {
        match &self.translation {
            Translation::Fields(fields) => fields.contains_key(field),
            Translation::Compliant => false,
        }
    }

    /// Declared links, in document order.
    pub fn links(&self) -> &[Link] {
        &self.links
    }

    /// Declared connections, in document order.
    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    /// The opaque `metadata` block, if any.
    pub fn metadata(&self) -> Option<&Value> {
        self.metadata.as_ref()
    }
}

// ---------------------------------------------------------------------------
// Raw block parsing
// ---------------------------------------------------------------------------

fn parse_translation(entity: &str, raw: Option<&Value>) -> Result<Translation, MalformedInput> {
    let context = format!("{entity}.{KEY_TRANSLATION}");
    let raw = match raw {
        None | Some(Value::Null) => return Ok(Translation::Fields(BTreeMap::new())),
        Some(Value::String(s)) if s == COMPLIANT => return Ok(Translation::Compliant),
        Some(raw) => raw,
    };
    let map = as_mapping(raw, &context, "COMPLIANT or a mapping of field translations")?;

    let mut fields = BTreeMap::new();
    for (key, value) in map {
        let field = FieldName::new(key_str(key, &context)?)?;
        let field_context = format!("{context}.{field}");
        let translation = parse_field_translation(&field, &field_context, value)?;
        fields.insert(field, translation);
    }
    Ok(Translation::Fields(fields))
}

fn parse_field_translation(
    field: &FieldName,
    context: &str,
    raw: &Value,
) -> Result<FieldTranslation, MalformedInput> {
    let payload = match raw {
        Value::Null => return Ok(FieldTranslation::Plain { present_value: None }),
        Value::Mapping(payload) => payload,
        other => {
            return scalar_string(other)
                .map(|s| FieldTranslation::Plain {
                    present_value: non_empty(s),
                })
                .ok_or_else(|| MalformedInput::UnexpectedShape {
                    context: context.to_string(),
                    expected: "a raw point path or a translation mapping",
                })
        }
    };

    let mut present_value = None;
    let mut units: Option<UnitMapping> = None;
    let mut states: Option<BTreeMap<String, String>> = None;

    for (key, value) in payload {
        let key = key_str(key, context)?;
        let value_context = format!("{context}.{key}");
        match key {
            KEY_PRESENT_VALUE => {
                present_value = match value {
                    Value::Null => None,
                    value => non_empty(scalar_string(value).ok_or_else(|| {
                        MalformedInput::UnexpectedShape {
                            context: value_context,
                            expected: "a raw point path",
                        }
                    })?),
                };
            }
            KEY_UNITS | KEY_UNIT_VALUES => {
                if units.is_some() {
                    return Err(MalformedInput::UnexpectedKey {
                        context: context.to_string(),
                        key: key.to_string(),
                    });
                }
                units = Some(if key == KEY_UNITS {
                    parse_units(&value_context, value)?
                } else {
                    UnitMapping {
                        key: None,
                        values: string_map(&value_context, value)?,
                    }
                });
            }
            KEY_STATES => {
                let map = string_map(&value_context, value)?;
                if let Some(bad) = map.keys().find(|state| !is_valid_state_name(state)) {
                    return Err(MalformedInput::InvalidStateName(bad.clone()));
                }
                states = Some(map);
            }
            other => {
                return Err(MalformedInput::UnexpectedKey {
                    context: context.to_string(),
                    key: other.to_string(),
                })
            }
        }
    }

    match (units, states) {
        (Some(_), Some(_)) => Err(MalformedInput::AmbiguousTranslation {
            field: field.to_string(),
        }),
        (Some(units), None) => Ok(FieldTranslation::Measurement {
            present_value,
            units,
        }),
        (None, Some(states)) => Ok(FieldTranslation::MultiState {
            present_value,
            states,
        }),
        (None, None) => Ok(FieldTranslation::Plain { present_value }),
    }
}

fn parse_units(context: &str, raw: &Value) -> Result<UnitMapping, MalformedInput> {
    let map = as_mapping(raw, context, "a mapping with 'key' and 'values'")?;
    let mut key = None;
    let mut values = None;
    for (k, v) in map {
        match key_str(k, context)? {
            KEY_UNITS_KEY => {
                key = Some(scalar_string(v).ok_or_else(|| MalformedInput::UnexpectedShape {
                    context: format!("{context}.{KEY_UNITS_KEY}"),
                    expected: "a raw unit point path",
                })?);
            }
            KEY_UNITS_VALUES => {
                values = Some(string_map(&format!("{context}.{KEY_UNITS_VALUES}"), v)?);
            }
            other => {
                return Err(MalformedInput::UnexpectedKey {
                    context: context.to_string(),
                    key: other.to_string(),
                })
            }
        }
    }
    let missing = |k: &str| MalformedInput::MissingKey {
        context: context.to_string(),
        key: k.to_string(),
    };
    Ok(UnitMapping {
        key: Some(key.ok_or_else(|| missing(KEY_UNITS_KEY))?),
        values: values.ok_or_else(|| missing(KEY_UNITS_VALUES))?,
    })
}

fn parse_links(entity: &str, raw: Option<&Value>) -> Result<Vec<Link>, MalformedInput> {
    let context = format!("{entity}.{KEY_LINKS}");
    let raw = match raw {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(raw) => raw,
    };
    let map = as_mapping(raw, &context, "a mapping of target entity to field map")?;

    let mut links = Vec::new();
    for (target, field_map) in map {
        let target = key_str(target, &context)?;
        let target_context = format!("{context}.{target}");
        let field_map = match field_map {
            Value::Mapping(m) if !m.is_empty() => m,
            Value::Null => {
                return Err(MalformedInput::MissingKey {
                    context: target_context,
                    key: "field map".to_string(),
                })
            }
            _ => {
                return Err(MalformedInput::UnexpectedShape {
                    context: target_context,
                    expected: "a non-empty mapping of local field to target field",
                })
            }
        };
        for (local, remote) in field_map {
            let local = FieldName::new(key_str(local, &target_context)?)?;
            let remote = match remote {
                Value::String(s) => FieldName::new(s.as_str())?,
                Value::Null => {
                    return Err(MalformedInput::MissingKey {
                        context: format!("{target_context}.{local}"),
                        key: "target field".to_string(),
                    })
                }
                _ => {
                    return Err(MalformedInput::UnexpectedShape {
                        context: format!("{target_context}.{local}"),
                        expected: "a target field name",
                    })
                }
            };
            links.push(Link {
                target_entity: target.to_string(),
                local_field: local,
                target_field: remote,
            });
        }
    }
    Ok(links)
}

fn parse_connections(entity: &str, raw: Option<&Value>) -> Result<Vec<Connection>, MalformedInput> {
    let context = format!("{entity}.{KEY_CONNECTIONS}");
    let mut connections = Vec::new();
    match raw {
        None | Some(Value::Null) => {}
        Some(Value::Mapping(map)) => {
            collect_connections(&context, map, &mut connections)?;
        }
        Some(Value::Sequence(items)) => {
            for (i, item) in items.iter().enumerate() {
                let item_context = format!("{context}[{i}]");
                let map = as_mapping(item, &item_context, "a mapping of source entity to relation")?;
                if map.is_empty() {
                    return Err(MalformedInput::MissingKey {
                        context: item_context,
                        key: "source entity".to_string(),
                    });
                }
                collect_connections(&item_context, map, &mut connections)?;
            }
        }
        Some(_) => {
            return Err(MalformedInput::UnexpectedShape {
                context,
                expected: "a mapping or sequence of source entity to relation",
            })
        }
    }
    Ok(connections)
}

fn collect_connections(
    context: &str,
    map: &Mapping,
    out: &mut Vec<Connection>,
) -> Result<(), MalformedInput> {
    for (source, relation) in map {
        let source = key_str(source, context)?;
        if source.is_empty() {
            return Err(MalformedInput::MissingKey {
                context: context.to_string(),
                key: "source entity".to_string(),
            });
        }
        let relation = match relation {
            Value::String(r) if !r.is_empty() => r.clone(),
            Value::Null | Value::String(_) => {
                return Err(MalformedInput::MissingKey {
                    context: format!("{context}.{source}"),
                    key: "relation".to_string(),
                })
            }
            _ => {
                return Err(MalformedInput::UnexpectedShape {
                    context: format!("{context}.{source}"),
                    expected: "a relation name",
                })
            }
        };
        out.push(Connection {
            source_entity: source.to_string(),
            relation,
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// YAML helpers
// ---------------------------------------------------------------------------

fn as_mapping<'a>(
    value: &'a Value,
    context: &str,
    expected: &'static str,
) -> Result<&'a Mapping, MalformedInput> {
    value.as_mapping().ok_or_else(|| MalformedInput::UnexpectedShape {
        context: context.to_string(),
        expected,
    })
}

fn key_str<'a>(key: &'a Value, context: &str) -> Result<&'a str, MalformedInput> {
    key.as_str().ok_or_else(|| MalformedInput::UnexpectedShape {
        context: context.to_string(),
        expected: "string keys",
    })
}

/// Render a YAML scalar as a string. Device values are often unquoted
/// numbers or booleans (`ON: 1`).
fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Tagged(tagged) => scalar_string(&tagged.value),
        Value::Null | Value::Sequence(_) | Value::Mapping(_) => None,
    }
}

fn string_map(context: &str, raw: &Value) -> Result<BTreeMap<String, String>, MalformedInput> {
    let map = as_mapping(raw, context, "a mapping of names to raw values")?;
    let mut out = BTreeMap::new();
    for (k, v) in map {
        let k = key_str(k, context)?;
        let v = scalar_string(v).ok_or_else(|| MalformedInput::UnexpectedShape {
            context: format!("{context}.{k}"),
            expected: "a scalar raw value",
        })?;
        out.insert(k.to_string(), v);
    }
    Ok(out)
}

/// Standard state names: an uppercase letter followed by one or more
/// uppercase letters or underscores (`ON`, `OCCUPIED`, `LOW_SPEED`).
fn is_valid_state_name(state: &str) -> bool {
    let mut chars = state.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_uppercase())
        && !chars.as_str().is_empty()
        && chars.all(|c| c.is_ascii_uppercase() || c == '_')
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_exact(yaml: &str) -> Result<EntityInstance, MalformedInput> {
        let raw: Value = serde_yaml::from_str(yaml).unwrap();
        EntityInstance::from_yaml("ENTITY-NAME", &raw)
    }

    /// Builds the block with a device id prepended.
    fn build(yaml: &str) -> Result<EntityInstance, MalformedInput> {
        build_exact(&format!("id: DEVICE-ID-1\n{yaml}"))
    }

    #[test]
    fn builds_minimal_instance() {
        let e = build_exact("type: FACILITIES/BUILDING\nid: FACILITIES/123456").unwrap();
        assert_eq!(e.name(), "ENTITY-NAME");
        assert_eq!(e.type_ref().namespace(), "FACILITIES");
        assert_eq!(e.type_ref().type_name(), "BUILDING");
        assert_eq!(e.id(), "FACILITIES/123456");
        assert_eq!(e.fields().count(), 0);
        assert!(e.links().is_empty());
        assert!(e.connections().is_empty());
        assert!(!e.is_compliant());
    }

    #[test]
    fn type_without_separator_is_malformed() {
        let err = build("type: FACILITIESBUILDING").unwrap_err();
        assert_eq!(
            err,
            MalformedInput::InvalidTypeRef("FACILITIESBUILDING".to_string())
        );
    }

    #[test]
    fn missing_type_is_malformed() {
        assert!(matches!(
            build_exact("id: abc"),
            Err(MalformedInput::MissingKey { key, .. }) if key == "type"
        ));
    }

    #[test]
    fn missing_id_is_malformed() {
        for yaml in ["type: FACILITIES/BUILDING", "type: FACILITIES/BUILDING\nid:"] {
            assert!(matches!(
                build_exact(yaml),
                Err(MalformedInput::MissingKey { context, key }) if key == "id" && context == "ENTITY-NAME"
            ));
        }
    }

    #[test]
    fn numeric_id_is_kept_as_text() {
        let e = build_exact("type: FACILITIES/BUILDING\nid: 123456").unwrap();
        assert_eq!(e.id(), "123456");
    }

    #[test]
    fn state_names_follow_grammar() {
        for bad in ["on", "A", "ON-1", "1ON", "On"] {
            let yaml = format!(
                "type: HVAC/FAN_SS\ntranslation:\n  run_status:\n    present_value: points.run_status.present_value\n    states: {{ \"{bad}\": \"1\" }}\n"
            );
            assert_eq!(
                build(&yaml).unwrap_err(),
                MalformedInput::InvalidStateName(bad.to_string()),
                "{bad:?}"
            );
        }
        let yaml = "type: HVAC/FAN_SS\ntranslation:\n  run_status:\n    present_value: points.run_status.present_value\n    states: { LOW_SPEED: \"1\", ON: \"2\" }\n";
        assert!(build(yaml).is_ok());
    }

    #[test]
    fn unknown_top_level_key_is_malformed() {
        assert!(matches!(
            build("type: HVAC/FAN\nfields: {}"),
            Err(MalformedInput::UnexpectedKey { key, .. }) if key == "fields"
        ));
    }

    #[test]
    fn non_mapping_block_is_malformed() {
        let raw = Value::String("HVAC/FAN".to_string());
        assert!(matches!(
            EntityInstance::from_yaml("X", &raw),
            Err(MalformedInput::UnexpectedShape { .. })
        ));
    }

    #[test]
    fn sorts_translations_into_shapes() {
        let e = build(
            r#"
type: HVAC/FAN_SS
translation:
  run_command: points.run_command.present_value
  run_status:
    present_value: points.run_status.present_value
    states:
      ON: 1
      OFF: "0"
  zone_air_temperature_sensor:
    present_value: points.zone_temp.present_value
    units:
      key: pointset.points.zone_temp.units
      values:
        degrees_celsius: degC
  discharge_air_temperature_sensor:
    present_value: points.dat.present_value
    unit_values:
      degrees_fahrenheit: degF
"#,
        )
        .unwrap();

        let fields: BTreeMap<_, _> = e.fields().map(|(k, v)| (k.as_str(), v)).collect();
        assert_eq!(fields.len(), 4);
        assert!(matches!(
            fields["run_command"],
            FieldTranslation::Plain { present_value: Some(p) } if p == "points.run_command.present_value"
        ));
        match fields["run_status"] {
            FieldTranslation::MultiState { states, .. } => {
                assert_eq!(states["ON"], "1");
                assert_eq!(states["OFF"], "0");
            }
            other => panic!("expected multi-state, got {other:?}"),
        }
        match fields["zone_air_temperature_sensor"] {
            FieldTranslation::Measurement { units, .. } => {
                assert_eq!(units.key.as_deref(), Some("pointset.points.zone_temp.units"));
                assert_eq!(units.values["degrees_celsius"], "degC");
            }
            other => panic!("expected measurement, got {other:?}"),
        }
        match fields["discharge_air_temperature_sensor"] {
            FieldTranslation::Measurement { units, .. } => {
                assert_eq!(units.key, None);
                assert_eq!(units.values["degrees_fahrenheit"], "degF");
            }
            other => panic!("expected measurement, got {other:?}"),
        }
    }

    #[test]
    fn compliant_translation() {
        let e = build("type: HVAC/FAN_SS\ntranslation: COMPLIANT").unwrap();
        assert!(e.is_compliant());
        assert_eq!(e.fields().count(), 0);
    }

    #[test]
    fn other_translation_strings_are_malformed() {
        assert!(matches!(
            build("type: HVAC/FAN_SS\ntranslation: compliant"),
            Err(MalformedInput::UnexpectedShape { .. })
        ));
    }

    #[test]
    fn absent_present_value_is_kept_for_validation() {
        let e = build(
            r#"
type: HVAC/FAN_SS
translation:
  run_command:
  run_status:
    states: { ON: "1" }
"#,
        )
        .unwrap();
        assert!(e.fields().all(|(_, t)| t.present_value().is_none()));
    }

    #[test]
    fn bad_field_name_is_malformed() {
        assert!(matches!(
            build("type: HVAC/FAN_SS\ntranslation:\n  RunStatus: points.x"),
            Err(MalformedInput::InvalidFieldName(name)) if name == "RunStatus"
        ));
    }

    #[test]
    fn unknown_payload_key_is_malformed() {
        let err = build(
            r#"
type: HVAC/FAN_SS
translation:
  run_status:
    present_value: points.run_status.present_value
    scale: 10
"#,
        )
        .unwrap_err();
        assert!(matches!(err, MalformedInput::UnexpectedKey { key, .. } if key == "scale"));
    }

    #[test]
    fn units_without_values_is_malformed() {
        let err = build(
            r#"
type: HVAC/FAN_SS
translation:
  zone_air_temperature_sensor:
    present_value: points.zone_temp.present_value
    units:
      key: pointset.points.zone_temp.units
"#,
        )
        .unwrap_err();
        assert!(matches!(err, MalformedInput::MissingKey { key, .. } if key == "values"));
    }

    #[test]
    fn units_and_states_together_are_ambiguous() {
        let err = build(
            r#"
type: HVAC/FAN_SS
translation:
  run_status:
    present_value: points.run_status.present_value
    states: { ON: "1" }
    unit_values: { percent: pct }
"#,
        )
        .unwrap_err();
        assert_eq!(
            err,
            MalformedInput::AmbiguousTranslation {
                field: "run_status".to_string()
            }
        );
    }

    #[test]
    fn links_flatten_in_document_order() {
        let e = build(
            r#"
type: HVAC/VAV
links:
  AHU-1:
    supply_air_temperature_sensor: discharge_air_temperature_sensor
    supply_air_static_pressure_sensor: discharge_air_static_pressure_sensor
  BOILER-1:
    supply_water_temperature_sensor: supply_water_temperature_sensor
"#,
        )
        .unwrap();
        let links: Vec<_> = e
            .links()
            .iter()
            .map(|l| (l.target_entity(), l.local_field().as_str(), l.target_field().as_str()))
            .collect();
        assert_eq!(
            links,
            vec![
                ("AHU-1", "supply_air_temperature_sensor", "discharge_air_temperature_sensor"),
                ("AHU-1", "supply_air_static_pressure_sensor", "discharge_air_static_pressure_sensor"),
                ("BOILER-1", "supply_water_temperature_sensor", "supply_water_temperature_sensor"),
            ]
        );
    }

    #[test]
    fn link_without_field_map_is_malformed() {
        assert!(matches!(
            build("type: HVAC/VAV\nlinks:\n  AHU-1:"),
            Err(MalformedInput::MissingKey { .. })
        ));
        assert!(matches!(
            build("type: HVAC/VAV\nlinks:\n  AHU-1: {}"),
            Err(MalformedInput::UnexpectedShape { .. })
        ));
        assert!(matches!(
            build("type: HVAC/VAV\nlinks:\n  AHU-1:\n    zone_air_temperature_sensor:"),
            Err(MalformedInput::MissingKey { key, .. }) if key == "target field"
        ));
    }

    #[test]
    fn connections_accept_mapping_and_sequence() {
        let e = build("type: HVAC/VAV\nconnections:\n  AHU-1: FEEDS\n  FLOOR-1: CONTAINS").unwrap();
        assert_eq!(e.connections().len(), 2);
        assert_eq!(e.connections()[0].source_entity(), "AHU-1");
        assert_eq!(e.connections()[0].relation(), "FEEDS");

        let e = build("type: HVAC/VAV\nconnections:\n  - AHU-1: FEEDS\n  - AHU-1: CONTROLS").unwrap();
        let relations: Vec<_> = e.connections().iter().map(Connection::relation).collect();
        assert_eq!(relations, vec!["FEEDS", "CONTROLS"]);
    }

    #[test]
    fn connection_without_relation_is_malformed() {
        assert!(matches!(
            build("type: HVAC/VAV\nconnections:\n  AHU-1:"),
            Err(MalformedInput::MissingKey { key, .. }) if key == "relation"
        ));
        assert!(matches!(
            build("type: HVAC/VAV\nconnections:\n  - {}"),
            Err(MalformedInput::MissingKey { key, .. }) if key == "source entity"
        ));
    }

    #[test]
    fn metadata_is_retained() {
        let e = build("type: HVAC/VAV\nmetadata:\n  floor: 3").unwrap();
        assert!(e.metadata().is_some());
    }
}
