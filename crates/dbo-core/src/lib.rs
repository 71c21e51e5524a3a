//! # dbo-core: Foundational Types for the Instance Validator
//!
//! This crate is the leaf of the workspace. It defines the names and the
//! ontology model that every other crate reasons about, and depends on
//! nothing internal.
//!
//! ## Key Design Principles
//!
//! 1. **Newtype wrappers for ontology names.** [`TypeRef`] and [`FieldName`]
//!    validate their grammar at construction. No bare strings reach the
//!    checkers for these.
//!
//! 2. **Explicit universe handle.** [`Universe`] is an ordinary value built
//!    once and passed by `&` into every check. There is no global instance.
//!
//! 3. **Distinguishable lookup failures.** [`Universe::resolve`] reports
//!    [`LookupError::NamespaceNotFound`] separately from
//!    [`LookupError::TypeNotFoundInNamespace`].
//!
//! 4. **Closed field kinds.** [`FieldKind`] has exactly three variants;
//!    every consumer matches exhaustively.
//!
//! ## Crate Policy
//!
//! - No dependencies on other `dbo-*` crates.
//! - No `unsafe` code.
//! - No `panic!()` or `.unwrap()` outside tests.

pub mod error;
pub mod identity;
pub mod universe;

// Re-export primary types for ergonomic imports.
pub use error::{LookupError, MalformedInput, UniverseError};
pub use identity::{FieldName, TypeRef};
pub use universe::{FieldKind, FieldSpec, TypeDefinition, Universe};
