//! # Error Types: Structured Error Hierarchy
//!
//! Defines the error types shared by the validator crates. All errors use
//! `thiserror` for derive-based `Display` and `Error` implementations.
//!
//! ## Design
//!
//! - [`MalformedInput`] is raised while constructing an entity instance
//!   from a raw mapping. It means the record cannot be interpreted at all
//!   and the data file must be fixed.
//! - [`LookupError`] describes why a type reference did not resolve. The
//!   validation engine folds it into a violation; it never escapes as an
//!   `Err` from validation.
//! - [`UniverseError`] covers loading a flattened universe document.
//!
//! Semantic non-conformance is *not* an error type. It is reported as a
//! boolean plus a list of violations by `dbo-instance`.

use thiserror::Error;

/// A raw entity record that cannot be turned into a typed instance.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MalformedInput {
    /// The type reference is not encoded as `NAMESPACE/TYPE_NAME`.
    #[error("type reference '{0}' is not of the form NAMESPACE/TYPE_NAME")]
    InvalidTypeRef(String),

    /// A field name does not follow the ontology field grammar.
    #[error("'{0}' is not a valid field name")]
    InvalidFieldName(String),

    /// A declared state name is not uppercase words joined by underscores.
    #[error("'{0}' is not a valid state name")]
    InvalidStateName(String),

    /// A required key is absent.
    #[error("{context}: missing required key '{key}'")]
    MissingKey {
        /// Where the key was expected (entity name, translation path, ...).
        context: String,
        /// The key that is absent.
        key: String,
    },

    /// A key that the record format does not define.
    #[error("{context}: unexpected key '{key}'")]
    UnexpectedKey {
        /// Where the key was found.
        context: String,
        /// The offending key.
        key: String,
    },

    /// A value has the wrong YAML shape.
    #[error("{context}: expected {expected}")]
    UnexpectedShape {
        /// Where the value was found.
        context: String,
        /// Description of the accepted shape.
        expected: &'static str,
    },

    /// A translation payload carries both unit and state mappings.
    #[error("translation for field '{field}' declares both units and states")]
    AmbiguousTranslation {
        /// The translated field.
        field: String,
    },
}

/// Why a type reference failed to resolve against the universe.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LookupError {
    /// The namespace itself is unknown.
    #[error("namespace '{namespace}' is not defined in the universe")]
    NamespaceNotFound {
        /// The namespace that was looked up.
        namespace: String,
    },

    /// The namespace exists but does not define the type.
    #[error("type '{type_name}' is not defined in namespace '{namespace}'")]
    TypeNotFoundInNamespace {
        /// The namespace that was searched.
        namespace: String,
        /// The type name that was looked up.
        type_name: String,
    },
}

/// Error loading a flattened universe document.
#[derive(Error, Debug)]
pub enum UniverseError {
    /// The document is not valid YAML or does not match the expected layout.
    #[error("invalid universe document: {0}")]
    Document(#[from] serde_yaml::Error),

    /// A type or field name in the document is malformed.
    #[error("invalid universe entry '{entry}': {reason}")]
    InvalidEntry {
        /// Path of the entry (`NAMESPACE/TYPE` or `NAMESPACE/TYPE.field`).
        entry: String,
        /// Reason the entry was rejected.
        reason: String,
    },
}
