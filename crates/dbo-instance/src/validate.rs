//! # Instance Validation
//!
//! Conformance checks of an [`EntityInstance`] against the [`Universe`].
//!
//! ## Evaluation Order
//!
//! 1. Resolve the declared type. An unknown namespace, an unknown type or
//!    an abstract type ends evaluation: nothing else is meaningful.
//! 2. Field conformance: required fields present, no extraneous fields.
//! 3. Translation conformance: units and states against the field kind.
//! 4. Link conformance, only when a sibling map is supplied.
//! 5. Connection conformance against the universe relation vocabulary.
//!
//! Steps 2 to 5 all run and accumulate [`Violation`]s, so a report lists
//! every problem with an entity rather than the first one.
//!
//! ## Error Contract
//!
//! Validation never fails with an `Err`. Non-conformance is an expected
//! outcome and is returned as a [`ValidationReport`]; only construction
//! of the instance itself can fail (see [`crate::entity`]).
//!
//! ## Thread Safety
//!
//! Every check is a pure read of the instance, the universe and the
//! sibling map. Concurrent validation of different entities sharing one
//! universe needs no synchronization.

use std::collections::BTreeSet;
use std::fmt;

use serde::Serialize;

use dbo_core::{FieldKind, LookupError, TypeDefinition, Universe};

use crate::entity::{EntityInstance, EntityMap, FieldTranslation};

// ---------------------------------------------------------------------------
// Violations
// ---------------------------------------------------------------------------

/// Category of a conformance failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    /// The declared namespace is not in the universe.
    NamespaceNotFound,
    /// The namespace exists but lacks the declared type.
    TypeNotFound,
    /// The declared type is abstract.
    AbstractType,
    /// A required field of the type is neither translated nor linked.
    MissingField,
    /// A declared field is not part of the type.
    ExtraneousField,
    /// A translation does not name its raw point.
    MissingRawField,
    /// A measurement field declares no unit.
    MissingUnit,
    /// A declared unit is outside the field's unit family.
    UnitNotInFamily,
    /// A multi-state field declares no states.
    MissingStates,
    /// A declared state is outside the field's state set.
    StateNotInSet,
    /// A translation carries a payload the field kind does not model.
    UnexpectedPayload,
    /// A link names an entity that is not in the sibling map.
    DanglingLink,
    /// A link's local field is not part of this entity's type.
    UnknownLocalField,
    /// A link's target field is not part of the target entity's type.
    UnknownRemoteField,
    /// A connection uses a relation outside the universe vocabulary.
    UnknownConnection,
}

/// A single conformance failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Violation {
    /// What kind of failure this is.
    pub kind: ViolationKind,
    /// Dotted path of the offending declaration within the entity
    /// (`type`, `translation.run_status`, `links.AHU-1.zone_air_temperature_sensor`).
    pub path: String,
    /// Human-readable description.
    pub message: String,
}

impl Violation {
    fn new(kind: ViolationKind, path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            path: path.into(),
            message: message.into(),
        }
    }

    fn from_lookup(err: &LookupError) -> Self {
        let kind = match err {
            LookupError::NamespaceNotFound { .. } => ViolationKind::NamespaceNotFound,
            LookupError::TypeNotFoundInNamespace { .. } => ViolationKind::TypeNotFound,
        };
        Self::new(kind, "type", err.to_string())
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "  {}: {}", self.path, self.message)
    }
}

/// Outcome of validating one entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    entity: String,
    violations: Vec<Violation>,
}

impl ValidationReport {
    fn new(entity: &str) -> Self {
        Self {
            entity: entity.to_string(),
            violations: Vec::new(),
        }
    }

    fn push(&mut self, violation: Violation) {
        self.violations.push(violation);
    }

    fn extend(&mut self, violations: Vec<Violation>) {
        self.violations.extend(violations);
    }

    /// The validated entity's name.
    pub fn entity(&self) -> &str {
        &self.entity
    }

    /// True when no check failed.
    pub fn is_valid(&self) -> bool {
        self.violations.is_empty()
    }

    /// Returns the number of violations.
    pub fn len(&self) -> usize {
        self.violations.len()
    }

    /// Returns true if there are no violations.
    pub fn is_empty(&self) -> bool {
        self.violations.is_empty()
    }

    /// Returns a slice of all violations.
    pub fn violations(&self) -> &[Violation] {
        &self.violations
    }

    /// Whether any violation has the given kind.
    pub fn has(&self, kind: ViolationKind) -> bool {
        self.violations.iter().any(|v| v.kind == kind)
    }

    /// Consumes self and returns the inner Vec.
    pub fn into_inner(self) -> Vec<Violation> {
        self.violations
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            return write!(f, "{}: OK", self.entity);
        }
        write!(f, "{}: INVALID", self.entity)?;
        for v in &self.violations {
            writeln!(f)?;
            write!(f, "{v}")?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Validation engine
// ---------------------------------------------------------------------------

impl EntityInstance {
    /// Validate this entity and report every violation found.
    ///
    /// Link checks run only when `siblings` is supplied; without it an
    /// entity never fails because of its links.
    pub fn validate(&self, universe: &Universe, siblings: Option<&EntityMap>) -> ValidationReport {
        let mut report = ValidationReport::new(self.name());

        let definition = match universe.resolve(self.type_ref()) {
            Ok(definition) => definition,
            Err(err) => {
                tracing::debug!(entity = self.name(), type_ref = %self.type_ref(), "type did not resolve");
                report.push(Violation::from_lookup(&err));
                return finish(report);
            }
        };
        if definition.is_abstract() {
            report.push(Violation::new(
                ViolationKind::AbstractType,
                "type",
                format!("type '{}' is abstract and cannot be instantiated", self.type_ref()),
            ));
            return finish(report);
        }

        report.extend(check_fields(definition, self));
        report.extend(check_translations(definition, self));
        match siblings {
            Some(siblings) => report.extend(check_links(definition, self, siblings, universe)),
            None => tracing::debug!(entity = self.name(), "no sibling map supplied, skipping link checks"),
        }
        report.extend(check_connections(self, universe));

        finish(report)
    }

    /// Whether this entity conforms to the universe.
    pub fn is_valid_entity_instance(&self, universe: &Universe, siblings: Option<&EntityMap>) -> bool {
        self.validate(universe, siblings).is_valid()
    }
}

fn finish(report: ValidationReport) -> ValidationReport {
    if report.is_valid() {
        tracing::debug!(entity = report.entity(), "entity instance is valid");
    } else {
        tracing::warn!(
            entity = report.entity(),
            violations = report.len(),
            "entity instance failed validation"
        );
    }
    report
}

/// Validate every entity of a corpus, using the corpus itself as the
/// sibling map when `resolve_links` is set. Reports are ordered by entity name.
pub fn validate_all(
    entities: &EntityMap,
    universe: &Universe,
    resolve_links: bool,
) -> Vec<ValidationReport> {
    let siblings = resolve_links.then_some(entities);
    entities
        .values()
        .map(|entity| entity.validate(universe, siblings))
        .collect()
}

// ---------------------------------------------------------------------------
// Field conformance
// ---------------------------------------------------------------------------

/// Compare declared fields with the type's expected fields, both ways.
///
/// A required field is satisfied by a translation or by a link whose
/// local field it is. Only translated fields can be extraneous; unknown
/// link fields are reported by [`check_links`].
///
/// Compliant entities declare no explicit fields and are skipped.
pub fn check_fields(definition: &TypeDefinition, entity: &EntityInstance) -> Vec<Violation> {
    if entity.is_compliant() {
        return Vec::new();
    }
    let mut violations = Vec::new();
    let linked: BTreeSet<&str> = entity
        .links()
        .iter()
        .map(|link| link.local_field().as_str())
        .collect();

    for spec in definition.required_fields() {
        let name = spec.name().as_str();
        if !entity.declares_field(name) && !linked.contains(name) {
            violations.push(Violation::new(
                ViolationKind::MissingField,
                format!("translation.{}", spec.name()),
                format!(
                    "required field '{}' of {} is neither translated nor linked",
                    spec.name(),
                    definition.type_ref()
                ),
            ));
        }
    }

    for (field, _) in entity.fields() {
        if !definition.has_field(field.as_str()) {
            violations.push(Violation::new(
                ViolationKind::ExtraneousField,
                format!("translation.{field}"),
                format!("field '{field}' is not defined for {}", definition.type_ref()),
            ));
        }
    }

    violations
}

// ---------------------------------------------------------------------------
// Translation conformance
// ---------------------------------------------------------------------------

/// Check units and states of each translated field against its kind.
///
/// Fields the type does not define are left to [`check_fields`].
pub fn check_translations(definition: &TypeDefinition, entity: &EntityInstance) -> Vec<Violation> {
    let mut violations = Vec::new();

    for (field, translation) in entity.fields() {
        let Some(spec) = definition.field(field.as_str()) else {
            continue;
        };
        let path = format!("translation.{field}");

        if translation.present_value().is_none() {
            violations.push(Violation::new(
                ViolationKind::MissingRawField,
                &path,
                format!("translation for '{field}' does not name a raw point"),
            ));
        }

        match (spec.kind(), translation) {
            (FieldKind::Plain, FieldTranslation::Plain { .. }) => {}
            (FieldKind::Plain, FieldTranslation::Measurement { .. }) => {
                violations.push(Violation::new(
                    ViolationKind::UnexpectedPayload,
                    &path,
                    format!("field '{field}' is not a measurement but declares units"),
                ));
            }
            (FieldKind::Plain, FieldTranslation::MultiState { .. }) => {
                violations.push(Violation::new(
                    ViolationKind::UnexpectedPayload,
                    &path,
                    format!("field '{field}' is not multi-state but declares states"),
                ));
            }

            (FieldKind::Measurement { units: family }, FieldTranslation::Measurement { units, .. }) => {
                if units.values.is_empty() {
                    violations.push(Violation::new(
                        ViolationKind::MissingUnit,
                        &path,
                        format!("measurement field '{field}' declares no unit"),
                    ));
                }
                for unit in units.values.keys() {
                    if !family.contains(unit) {
                        violations.push(Violation::new(
                            ViolationKind::UnitNotInFamily,
                            &path,
                            format!("unit '{unit}' is not valid for field '{field}'"),
                        ));
                    }
                }
            }
            (FieldKind::Measurement { .. }, FieldTranslation::Plain { .. }) => {
                violations.push(Violation::new(
                    ViolationKind::MissingUnit,
                    &path,
                    format!("measurement field '{field}' declares no unit"),
                ));
            }
            (FieldKind::Measurement { .. }, FieldTranslation::MultiState { .. }) => {
                violations.push(Violation::new(
                    ViolationKind::UnexpectedPayload,
                    &path,
                    format!("measurement field '{field}' declares states"),
                ));
            }

            (FieldKind::MultiState { states: allowed }, FieldTranslation::MultiState { states, .. }) => {
                if states.is_empty() {
                    violations.push(Violation::new(
                        ViolationKind::MissingStates,
                        &path,
                        format!("multi-state field '{field}' declares no states"),
                    ));
                }
                for state in states.keys() {
                    if !allowed.contains(state) {
                        violations.push(Violation::new(
                            ViolationKind::StateNotInSet,
                            &path,
                            format!("state '{state}' is not valid for field '{field}'"),
                        ));
                    }
                }
            }
            (FieldKind::MultiState { .. }, FieldTranslation::Plain { .. }) => {
                violations.push(Violation::new(
                    ViolationKind::MissingStates,
                    &path,
                    format!("multi-state field '{field}' declares no states"),
                ));
            }
            (FieldKind::MultiState { .. }, FieldTranslation::Measurement { .. }) => {
                violations.push(Violation::new(
                    ViolationKind::UnexpectedPayload,
                    &path,
                    format!("multi-state field '{field}' declares units"),
                ));
            }
        }
    }

    violations
}

// ---------------------------------------------------------------------------
// Link conformance
// ---------------------------------------------------------------------------

/// Check each link against the sibling map: the target exists, the local
/// field is on this entity's type, and the target field is on the
/// target's type. The target entity is not validated further.
pub fn check_links(
    definition: &TypeDefinition,
    entity: &EntityInstance,
    siblings: &EntityMap,
    universe: &Universe,
) -> Vec<Violation> {
    let mut violations = Vec::new();

    for link in entity.links() {
        let path = format!("links.{}.{}", link.target_entity(), link.local_field());

        if !definition.has_field(link.local_field().as_str()) {
            violations.push(Violation::new(
                ViolationKind::UnknownLocalField,
                &path,
                format!(
                    "linked field '{}' is not defined for {}",
                    link.local_field(),
                    definition.type_ref()
                ),
            ));
        }

        let Some(target) = siblings.get(link.target_entity()) else {
            violations.push(Violation::new(
                ViolationKind::DanglingLink,
                &path,
                format!("linked entity '{}' does not exist", link.target_entity()),
            ));
            continue;
        };

        match universe.resolve(target.type_ref()) {
            Ok(target_definition) if target_definition.has_field(link.target_field().as_str()) => {}
            Ok(target_definition) => violations.push(Violation::new(
                ViolationKind::UnknownRemoteField,
                &path,
                format!(
                    "field '{}' is not defined for {} ({})",
                    link.target_field(),
                    target_definition.type_ref(),
                    link.target_entity()
                ),
            )),
            Err(err) => violations.push(Violation::new(
                ViolationKind::UnknownRemoteField,
                &path,
                format!(
                    "field '{}' cannot be checked on '{}': {err}",
                    link.target_field(),
                    link.target_entity()
                ),
            )),
        }
    }

    violations
}

// ---------------------------------------------------------------------------
// Connection conformance
// ---------------------------------------------------------------------------

/// Check every connection relation against the universe vocabulary.
pub fn check_connections(entity: &EntityInstance, universe: &Universe) -> Vec<Violation> {
    entity
        .connections()
        .iter()
        .filter(|c| !universe.is_known_connection(c.relation()))
        .map(|c| {
            Violation::new(
                ViolationKind::UnknownConnection,
                format!("connections.{}", c.source_entity()),
                format!("relation '{}' is not a known connection type", c.relation()),
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use dbo_core::{FieldName, FieldSpec, TypeRef};
    use serde_yaml::Value;

    fn field(name: &str) -> FieldName {
        FieldName::new(name).unwrap()
    }

    fn universe() -> Universe {
        Universe::new()
            .with_type(TypeDefinition::new(TypeRef::parse("FACILITIES/BUILDING").unwrap()))
            .with_type(
                TypeDefinition::new(TypeRef::parse("HVAC/EQUIPMENT").unwrap()).into_abstract(),
            )
            .with_type(
                TypeDefinition::new(TypeRef::parse("HVAC/FAN_SS").unwrap())
                    .with_field(FieldSpec::plain(field("run_command")))
                    .with_field(FieldSpec::multi_state(field("run_status"), ["ON", "OFF"]))
                    .with_field(
                        FieldSpec::measurement(
                            field("zone_air_temperature_sensor"),
                            ["degrees_celsius", "degrees_fahrenheit", "kelvins"],
                        )
                        .optional(),
                    ),
            )
            .with_connections(["CONTAINS", "CONTROLS", "FEEDS"])
    }

    /// Builds an entity whose device id is its name.
    fn entity(name: &str, yaml: &str) -> EntityInstance {
        let raw: Value = serde_yaml::from_str(&format!("id: {name}\n{yaml}")).unwrap();
        EntityInstance::from_yaml(name, &raw).unwrap()
    }

    const GOOD_FAN: &str = r#"
type: HVAC/FAN_SS
translation:
  run_command: points.run_command.present_value
  run_status:
    present_value: points.run_status.present_value
    states: { ON: "1", OFF: "0" }
  zone_air_temperature_sensor:
    present_value: points.zone_temp.present_value
    units:
      key: pointset.points.zone_temp.units
      values: { degrees_celsius: degC }
"#;

    #[test]
    fn well_formed_fan_is_valid() {
        let report = entity("FAN-1", GOOD_FAN).validate(&universe(), None);
        assert!(report.is_valid(), "{report}");
        assert_eq!(report.entity(), "FAN-1");
    }

    #[test]
    fn unknown_namespace_and_type_are_distinguished() {
        let u = universe();
        let report = entity("X", "type: LIGHTING/FAN_SS").validate(&u, None);
        assert!(report.has(ViolationKind::NamespaceNotFound));
        assert_eq!(report.len(), 1);

        let report = entity("X", "type: HVAC/AHU").validate(&u, None);
        assert!(report.has(ViolationKind::TypeNotFound));
        assert_eq!(report.len(), 1);
    }

    #[test]
    fn abstract_type_stops_evaluation() {
        let report = entity(
            "X",
            "type: HVAC/EQUIPMENT\nconnections:\n  Y: NOT_A_RELATION",
        )
        .validate(&universe(), None);
        assert_eq!(report.len(), 1);
        assert!(report.has(ViolationKind::AbstractType));
    }

    #[test]
    fn missing_required_and_extra_fields_are_both_reported() {
        let u = universe();
        let def = u.resolve(&TypeRef::parse("HVAC/FAN_SS").unwrap()).unwrap();
        let e = entity(
            "X",
            r#"
type: HVAC/FAN_SS
translation:
  run_status:
    present_value: points.run_status.present_value
    states: { ON: "1" }
  supply_air_flowrate_sensor: points.flow.present_value
"#,
        );
        let violations = check_fields(def, &e);
        let kinds: Vec<_> = violations.iter().map(|v| v.kind).collect();
        assert_eq!(
            kinds,
            vec![ViolationKind::MissingField, ViolationKind::ExtraneousField]
        );
        assert_eq!(violations[0].path, "translation.run_command");
        assert_eq!(violations[1].path, "translation.supply_air_flowrate_sensor");
    }

    #[test]
    fn linked_field_satisfies_required_field() {
        let u = universe();
        let def = u.resolve(&TypeRef::parse("HVAC/FAN_SS").unwrap()).unwrap();
        let e = entity(
            "FAN-1",
            r#"
type: HVAC/FAN_SS
translation:
  run_status:
    present_value: points.run_status.present_value
    states: { ON: "1", OFF: "0" }
links:
  FAN-2:
    run_command: run_command
"#,
        );
        assert!(check_fields(def, &e).is_empty());

        let mut siblings = EntityMap::new();
        siblings.insert("FAN-2".to_string(), entity("FAN-2", GOOD_FAN));
        let report = e.validate(&u, Some(&siblings));
        assert!(report.is_valid(), "{report}");
    }

    #[test]
    fn linked_field_does_not_count_as_extraneous() {
        let u = universe();
        let def = u.resolve(&TypeRef::parse("HVAC/FAN_SS").unwrap()).unwrap();
        let e = entity(
            "FAN-1",
            &format!("{GOOD_FAN}links:\n  FAN-2:\n    supply_air_flowrate_sensor: run_command\n"),
        );
        assert!(check_fields(def, &e).is_empty());
    }

    #[test]
    fn optional_fields_may_be_absent() {
        let e = entity(
            "X",
            r#"
type: HVAC/FAN_SS
translation:
  run_command: points.run_command.present_value
  run_status:
    present_value: points.run_status.present_value
    states: { ON: "1", OFF: "0" }
"#,
        );
        assert!(e.is_valid_entity_instance(&universe(), None));
    }

    #[test]
    fn compliant_devices_skip_field_checks() {
        let e = entity("X", "type: HVAC/FAN_SS\ntranslation: COMPLIANT");
        assert!(e.is_valid_entity_instance(&universe(), None));
    }

    #[test]
    fn unit_outside_family_is_rejected() {
        let e = entity("X", &GOOD_FAN.replace("degrees_celsius: degC", "pascals: Pa"));
        let report = e.validate(&universe(), None);
        assert!(report.has(ViolationKind::UnitNotInFamily));
        assert_eq!(report.len(), 1);
    }

    #[test]
    fn measurement_without_unit_is_rejected() {
        let e = entity(
            "X",
            r#"
type: HVAC/FAN_SS
translation:
  run_command: points.run_command.present_value
  run_status:
    present_value: points.run_status.present_value
    states: { ON: "1", OFF: "0" }
  zone_air_temperature_sensor: points.zone_temp.present_value
"#,
        );
        let report = e.validate(&universe(), None);
        assert!(report.has(ViolationKind::MissingUnit), "{report}");
    }

    #[test]
    fn state_outside_set_is_rejected() {
        let e = entity("X", &GOOD_FAN.replace("OFF: \"0\"", "AUTO: \"2\""));
        let report = e.validate(&universe(), None);
        assert!(report.has(ViolationKind::StateNotInSet), "{report}");
    }

    #[test]
    fn plain_field_with_states_is_unexpected_payload() {
        let e = entity(
            "X",
            &GOOD_FAN.replace(
                "run_command: points.run_command.present_value",
                "run_command:\n    present_value: points.run_command.present_value\n    states: { ON: \"1\" }",
            ),
        );
        let report = e.validate(&universe(), None);
        assert!(report.has(ViolationKind::UnexpectedPayload), "{report}");
    }

    #[test]
    fn translation_without_raw_point_is_rejected() {
        let e = entity(
            "X",
            &GOOD_FAN.replace(
                "run_command: points.run_command.present_value",
                "run_command:",
            ),
        );
        let report = e.validate(&universe(), None);
        assert!(report.has(ViolationKind::MissingRawField), "{report}");
    }

    #[test]
    fn connections_checked_against_vocabulary() {
        let u = universe();
        let good = entity("X", "type: FACILITIES/BUILDING\nconnections:\n  Y: CONTAINS");
        assert!(check_connections(&good, &u).is_empty());

        let bad = entity("X", "type: FACILITIES/BUILDING\nconnections:\n  Y: CONTAINED_BY");
        let violations = check_connections(&bad, &u);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].kind, ViolationKind::UnknownConnection);
        assert_eq!(violations[0].path, "connections.Y");
    }

    #[test]
    fn link_failures_are_classified() {
        let u = universe();
        let target = entity("FAN-2", GOOD_FAN);
        let mut siblings = EntityMap::new();
        siblings.insert("FAN-2".to_string(), target);

        let linked = |body: &str| {
            entity(
                "FAN-1",
                &format!("{GOOD_FAN}links:\n  {body}\n"),
            )
        };

        let ok = linked("FAN-2: { run_command: run_command }");
        assert!(ok.validate(&u, Some(&siblings)).is_valid());

        let dangling = linked("FAN-9: { run_command: run_command }");
        assert!(dangling.validate(&u, Some(&siblings)).has(ViolationKind::DanglingLink));

        let bad_local = linked("FAN-2: { supply_air_flowrate_sensor: run_command }");
        assert!(bad_local
            .validate(&u, Some(&siblings))
            .has(ViolationKind::UnknownLocalField));

        let bad_remote = linked("FAN-2: { run_command: supply_air_flowrate_sensor }");
        assert!(bad_remote
            .validate(&u, Some(&siblings))
            .has(ViolationKind::UnknownRemoteField));

        // Without siblings, links are not checked at all.
        assert!(dangling.validate(&u, None).is_valid());
    }

    #[test]
    fn validate_all_orders_reports_by_name() {
        let mut entities = EntityMap::new();
        entities.insert("B".to_string(), entity("B", "type: FACILITIES/BUILDING"));
        entities.insert("A".to_string(), entity("A", "type: HVAC/EQUIPMENT"));
        let reports = validate_all(&entities, &universe(), true);
        let summary: Vec<_> = reports.iter().map(|r| (r.entity(), r.is_valid())).collect();
        assert_eq!(summary, vec![("A", false), ("B", true)]);
    }

    #[test]
    fn report_display_lists_violations() {
        let report = entity("X", "type: HVAC/AHU").validate(&universe(), None);
        let text = report.to_string();
        assert!(text.starts_with("X: INVALID"));
        assert!(text.contains("  type: type 'AHU' is not defined in namespace 'HVAC'"));
    }
}
