//! # dbo-instance: Entity Instances and Their Validation
//!
//! Reads building configuration files, turns each entity block into a
//! typed [`EntityInstance`], and checks it against a
//! [`dbo_core::Universe`].
//!
//! ## Pipeline
//!
//! ```text
//! files ──▶ InstanceParser ──▶ ParsedInstances ──▶ EntityMap ──▶ validate ──▶ ValidationReport
//!           (names, mode,       (raw blocks)        (typed,       (fields, translations,
//!            duplicates)                             immutable)     links, connections)
//! ```
//!
//! ## Two Failure Channels
//!
//! - Structural problems (bad YAML, a type reference without `/`, a unit
//!   mapping without `values`) are `Err` values: [`ParseError`] and
//!   [`dbo_core::MalformedInput`]. The data file must be fixed.
//! - Ontology non-conformance (unknown type, missing field, unit outside
//!   its family) is an ordinary [`ValidationReport`] with `is_valid() ==
//!   false`.
//!
//! ## Crate Policy
//!
//! - Depends only on `dbo-core` internally.
//! - Instances are immutable after construction; validation borrows them.

pub mod entity;
pub mod parser;
pub mod validate;

pub use entity::{
    Connection, EntityInstance, EntityMap, FieldTranslation, Link, Translation, UnitMapping,
    COMPLIANT,
};
pub use parser::{ConfigMode, InstanceParser, ParseError, ParsedInstances};
pub use validate::{validate_all, ValidationReport, Violation, ViolationKind};
