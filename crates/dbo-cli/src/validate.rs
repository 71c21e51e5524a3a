//! # Validate Subcommand
//!
//! Validates building configuration files against a flattened universe.
//!
//! ```text
//! dbo validate --universe universe.yaml building_config.yaml [more.yaml ...]
//! ```
//!
//! ## Exit Codes
//!
//! - `0`: every entity conforms.
//! - `1`: the input could not be processed (unreadable file, bad YAML,
//!   malformed entity block, invalid universe).
//! - `2`: the input was processed and at least one entity does not conform.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use serde::Serialize;

use dbo_core::Universe;
use dbo_instance::{validate_all, ConfigMode, InstanceParser, ValidationReport};

/// Arguments for the `dbo validate` subcommand.
#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Flattened universe document (YAML).
    #[arg(long)]
    pub universe: PathBuf,

    /// Building configuration files to validate.
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Skip link checks across entities.
    #[arg(long)]
    pub no_links: bool,

    /// Output format.
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

/// Report output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// One line per entity, violations indented beneath.
    Text,
    /// A single JSON document.
    Json,
}

/// Result of validating a set of files.
#[derive(Debug, Serialize)]
pub struct ValidationOutcome {
    /// The configuration mode the files declared.
    pub mode: &'static str,
    /// Whether every entity conforms.
    pub valid: bool,
    /// Per-entity reports, ordered by entity name.
    pub reports: Vec<ValidationReport>,
}

impl ValidationOutcome {
    /// Process exit code for this outcome.
    pub fn exit_code(&self) -> u8 {
        if self.valid {
            0
        } else {
            2
        }
    }
}

/// Execute the validate subcommand.
pub fn run_validate(args: &ValidateArgs) -> Result<u8> {
    let outcome = validate_files(&args.universe, &args.files, !args.no_links)?;
    let stdout = std::io::stdout();
    render(&outcome, args.format, &mut stdout.lock())?;
    Ok(outcome.exit_code())
}

/// Load the universe, parse every file and validate all entities.
pub fn validate_files(
    universe_path: &Path,
    files: &[PathBuf],
    resolve_links: bool,
) -> Result<ValidationOutcome> {
    let universe = load_universe(universe_path)?;

    let mut parser = InstanceParser::new();
    for file in files {
        parser
            .add_file(file)
            .with_context(|| format!("failed to parse {}", file.display()))?;
    }
    let parsed = parser.finalize().context("invalid building configuration")?;
    let mode = parsed.mode();
    if mode == ConfigMode::Update {
        tracing::info!("UPDATE mode: entities without a type are not validated");
    }
    let entities = parsed
        .into_entities()
        .context("invalid building configuration")?;

    let reports = validate_all(&entities, &universe, resolve_links);
    let valid = reports.iter().all(ValidationReport::is_valid);
    tracing::info!(
        entities = reports.len(),
        invalid = reports.iter().filter(|r| !r.is_valid()).count(),
        "validation complete"
    );

    Ok(ValidationOutcome {
        mode: mode.as_str(),
        valid,
        reports,
    })
}

fn load_universe(path: &Path) -> Result<Universe> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read universe: {}", path.display()))?;
    let universe = Universe::from_yaml_str(&content)
        .with_context(|| format!("invalid universe in {}", path.display()))?;
    tracing::debug!(
        types = universe.type_count(),
        connections = universe.connections_universe().len(),
        "universe loaded"
    );
    Ok(universe)
}

/// Write the outcome in the requested format.
pub fn render(outcome: &ValidationOutcome, format: OutputFormat, out: &mut impl Write) -> Result<()> {
    match format {
        OutputFormat::Text => {
            for report in &outcome.reports {
                writeln!(out, "{report}")?;
            }
            let invalid = outcome.reports.iter().filter(|r| !r.is_valid()).count();
            if outcome.valid {
                writeln!(out, "OK: {} entities valid", outcome.reports.len())?;
            } else {
                writeln!(
                    out,
                    "FAILED: {invalid} of {} entities invalid",
                    outcome.reports.len()
                )?;
            }
        }
        OutputFormat::Json => {
            writeln!(out, "{}", serde_json::to_string_pretty(outcome)?)?;
        }
    }
    Ok(())
}
