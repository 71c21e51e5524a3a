//! # Instance File Parser
//!
//! Collects entity blocks from one or more building configuration files
//! and hands them out as a single keyed corpus.
//!
//! A configuration file is a YAML mapping from entity name to entity
//! block. One optional `CONFIG_METADATA` block, in any file, selects the
//! processing mode:
//!
//! ```yaml
//! CONFIG_METADATA:
//!   operation: UPDATE
//!
//! FAN-1:
//!   type: HVAC/FAN_SS
//!   id: "device-42"
//! ```
//!
//! ## Modes
//!
//! - [`ConfigMode::Initialize`] (default): every block must declare `type`.
//! - [`ConfigMode::Update`]: blocks may omit `type`. Such blocks are partial
//!   updates; they are kept apart and never reach validation.
//!
//! Every block must declare `id` in either mode.
//!
//! ## Lifecycle
//!
//! Add any number of documents, then [`InstanceParser::finalize`]. The
//! mode is only known once every document has been seen, so the
//! mode-dependent checks run at finalization.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde_yaml::{Mapping, Value};
use thiserror::Error;

use dbo_core::MalformedInput;

use crate::entity::{EntityInstance, EntityMap};

/// Name of the block carrying file-level configuration.
pub const CONFIG_METADATA: &str = "CONFIG_METADATA";

const KEY_OPERATION: &str = "operation";
const KEY_TYPE: &str = "type";
const KEY_ID: &str = "id";

/// Error raised while reading configuration files.
#[derive(Error, Debug)]
pub enum ParseError {
    /// The document is not valid YAML.
    #[error("{source_name}: invalid YAML: {source}")]
    Yaml {
        /// File or document name.
        source_name: String,
        /// Underlying parser error.
        #[source]
        source: serde_yaml::Error,
    },

    /// The document is not a mapping of entity names to blocks.
    #[error("{source_name}: expected a mapping of entity names to entity blocks")]
    DocumentShape {
        /// File or document name.
        source_name: String,
    },

    /// A second `CONFIG_METADATA` block was found.
    #[error("{source_name}: metadata block defined multiple times")]
    MetadataRedefined {
        /// File or document name of the second block.
        source_name: String,
    },

    /// The `CONFIG_METADATA` block has an unusable layout.
    #[error("{source_name}: invalid CONFIG_METADATA block: {reason}")]
    InvalidMetadata {
        /// File or document name.
        source_name: String,
        /// What is wrong with the block.
        reason: String,
    },

    /// The `operation` value is not a known mode.
    #[error("unknown config operation '{0}' (expected INITIALIZE or UPDATE)")]
    UnknownMode(String),

    /// An entity key does not follow the entity name grammar.
    #[error("{source_name}: '{name}' is not a valid entity name")]
    InvalidEntityName {
        /// File or document name.
        source_name: String,
        /// The rejected key.
        name: String,
    },

    /// The same entity name appears twice across the corpus.
    #[error("duplicate entity '{name}' (first seen in {first}, again in {second})")]
    DuplicateEntity {
        /// The repeated name.
        name: String,
        /// Where it was first declared.
        first: String,
        /// Where it was declared again.
        second: String,
    },

    /// An entity block lacks `id`.
    #[error("entity '{0}' has no id")]
    MissingId(String),

    /// An entity block lacks `type` in INITIALIZE mode.
    #[error("entity '{0}' has no type (required in INITIALIZE mode)")]
    MissingType(String),

    /// An entity block could not be turned into an instance.
    #[error("entity '{entity}' is malformed")]
    Malformed {
        /// The entity name.
        entity: String,
        /// What is wrong with the block.
        #[source]
        source: MalformedInput,
    },

    /// A configuration file could not be read.
    #[error("failed to read {}: {source}", path.display())]
    Io {
        /// The file path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

// ---------------------------------------------------------------------------
// Config mode
// ---------------------------------------------------------------------------

/// How a configuration corpus is to be applied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConfigMode {
    /// A full building configuration; every entity is complete.
    #[default]
    Initialize,
    /// An incremental update; entities may omit fields they don't change.
    Update,
}

impl ConfigMode {
    /// The canonical string of the mode.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initialize => "INITIALIZE",
            Self::Update => "UPDATE",
        }
    }
}

impl FromStr for ConfigMode {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "INITIALIZE" => Ok(Self::Initialize),
            "UPDATE" => Ok(Self::Update),
            other => Err(ParseError::UnknownMode(other.to_string())),
        }
    }
}

impl fmt::Display for ConfigMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether `name` follows the entity name grammar: an uppercase letter
/// followed by one or more uppercase letters, digits or hyphens.
pub fn is_valid_entity_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_uppercase())
        && !chars.as_str().is_empty()
        && chars.all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '-')
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct RawBlock {
    source_name: String,
    body: Value,
}

/// Accumulates entity blocks across configuration documents.
#[derive(Debug, Default)]
pub struct InstanceParser {
    mode: Option<ConfigMode>,
    blocks: BTreeMap<String, RawBlock>,
}

impl InstanceParser {
    /// Create an empty parser.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a configuration file from disk.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::Io`] if the file cannot be read, or any error
    /// of [`InstanceParser::add_document`].
    pub fn add_file(&mut self, path: &Path) -> Result<(), ParseError> {
        let content = std::fs::read_to_string(path).map_err(|source| ParseError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        self.add_document(&path.display().to_string(), &content)
    }

    /// Add one configuration document. `source_name` only labels errors.
    ///
    /// An empty document contributes nothing.
    ///
    /// # Errors
    ///
    /// Fails on invalid YAML, a non-mapping document, a repeated or invalid
    /// metadata block, an invalid entity name, or an entity name already
    /// seen in this or an earlier document.
    pub fn add_document(&mut self, source_name: &str, content: &str) -> Result<(), ParseError> {
        if content.lines().all(is_blank_line) {
            return Ok(());
        }
        let document: Value = serde_yaml::from_str(content).map_err(|source| ParseError::Yaml {
            source_name: source_name.to_string(),
            source,
        })?;
        let mapping = match document {
            Value::Null => return Ok(()),
            Value::Mapping(mapping) => mapping,
            _ => {
                return Err(ParseError::DocumentShape {
                    source_name: source_name.to_string(),
                })
            }
        };

        let mut added = 0usize;
        for (key, body) in mapping {
            let Value::String(name) = key else {
                return Err(ParseError::DocumentShape {
                    source_name: source_name.to_string(),
                });
            };

            if name == CONFIG_METADATA {
                self.set_metadata(source_name, &body)?;
                continue;
            }
            if !is_valid_entity_name(&name) {
                return Err(ParseError::InvalidEntityName {
                    source_name: source_name.to_string(),
                    name,
                });
            }
            if let Some(first) = self.blocks.get(&name) {
                return Err(ParseError::DuplicateEntity {
                    first: first.source_name.clone(),
                    second: source_name.to_string(),
                    name,
                });
            }
            self.blocks.insert(
                name,
                RawBlock {
                    source_name: source_name.to_string(),
                    body,
                },
            );
            added += 1;
        }

        tracing::debug!(source = source_name, entities = added, "added configuration document");
        Ok(())
    }

    fn set_metadata(&mut self, source_name: &str, body: &Value) -> Result<(), ParseError> {
        if self.mode.is_some() {
            return Err(ParseError::MetadataRedefined {
                source_name: source_name.to_string(),
            });
        }
        let invalid = |reason: &str| ParseError::InvalidMetadata {
            source_name: source_name.to_string(),
            reason: reason.to_string(),
        };

        let mode = match body {
            Value::Null => ConfigMode::default(),
            Value::Mapping(block) => metadata_mode(block, &invalid)?,
            _ => return Err(invalid("expected a mapping")),
        };
        tracing::debug!(source = source_name, mode = %mode, "configuration mode set");
        self.mode = Some(mode);
        Ok(())
    }

    /// Close the parser, applying the default mode if none was declared
    /// and checking mode-dependent requirements.
    ///
    /// # Errors
    ///
    /// Checks blocks in name order. Returns [`ParseError::MissingId`] for a
    /// block without `id`, and [`ParseError::MissingType`] for a block
    /// without `type` in INITIALIZE mode.
    pub fn finalize(self) -> Result<ParsedInstances, ParseError> {
        let mode = self.mode.unwrap_or_default();
        for (name, block) in &self.blocks {
            if !declares(&block.body, KEY_ID) {
                return Err(ParseError::MissingId(name.clone()));
            }
            if mode == ConfigMode::Initialize && !declares_type(&block.body) {
                return Err(ParseError::MissingType(name.clone()));
            }
        }
        tracing::info!(mode = %mode, entities = self.blocks.len(), "configuration parsed");
        Ok(ParsedInstances {
            mode,
            blocks: self.blocks,
        })
    }
}

fn metadata_mode(
    block: &Mapping,
    invalid: &impl Fn(&str) -> ParseError,
) -> Result<ConfigMode, ParseError> {
    let mut mode = ConfigMode::default();
    for (key, value) in block {
        match (key.as_str(), value) {
            (Some(KEY_OPERATION), Value::String(op)) => mode = op.parse()?,
            (Some(KEY_OPERATION), Value::Null) => {}
            (Some(KEY_OPERATION), _) => return Err(invalid("operation must be a string")),
            _ => return Err(invalid("only 'operation' is allowed")),
        }
    }
    Ok(mode)
}

fn is_blank_line(line: &str) -> bool {
    let line = line.trim();
    line.is_empty() || line.starts_with('#')
}

fn declares_type(body: &Value) -> bool {
    declares(body, KEY_TYPE)
}

fn declares(body: &Value, key: &str) -> bool {
    match body {
        Value::Mapping(block) => !matches!(block.get(key), None | Some(Value::Null)),
        _ => false,
    }
}

// ---------------------------------------------------------------------------
// Parsed corpus
// ---------------------------------------------------------------------------

/// The finalized corpus: a mode plus raw entity blocks keyed by name.
#[derive(Debug, Clone)]
pub struct ParsedInstances {
    mode: ConfigMode,
    blocks: BTreeMap<String, RawBlock>,
}

impl ParsedInstances {
    /// The processing mode in effect.
    pub fn mode(&self) -> ConfigMode {
        self.mode
    }

    /// Number of entity blocks.
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Whether the corpus has no entity blocks.
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Entity names, in order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.blocks.keys().map(String::as_str)
    }

    /// The raw block of an entity.
    pub fn raw(&self, name: &str) -> Option<&Value> {
        self.blocks.get(name).map(|b| &b.body)
    }

    /// Names of UPDATE-mode blocks that omit `type`.
    pub fn partial_updates(&self) -> impl Iterator<Item = &str> {
        self.blocks
            .iter()
            .filter(|(_, b)| !declares_type(&b.body))
            .map(|(name, _)| name.as_str())
    }

    /// Build every typed block into an [`EntityInstance`].
    ///
    /// Partial updates are skipped; they carry no type to validate against.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::Malformed`] for the first block (by name) that
    /// cannot be constructed.
    pub fn into_entities(self) -> Result<EntityMap, ParseError> {
        let mut entities = EntityMap::new();
        for (name, block) in self.blocks {
            if !declares_type(&block.body) {
                tracing::info!(entity = %name, "partial update without type, not validated");
                continue;
            }
            let entity = EntityInstance::from_yaml(name.clone(), &block.body).map_err(|source| {
                ParseError::Malformed {
                    entity: name.clone(),
                    source,
                }
            })?;
            entities.insert(name, entity);
        }
        Ok(entities)
    }
}
