//! # dbo-cli: Building Instance Validator Command-Line Interface
//!
//! Wraps the instance parser and validation engine in a clap-based CLI.
//!
//! ## Subcommands
//!
//! - `validate`: check building configuration files against a universe.
//!
//! ## Crate Policy
//!
//! - CLI construction (argument parsing) is separated from business logic.
//! - Handler functions delegate to `dbo-instance`; no validation logic here.
//! - Handlers return an exit code; `main` maps `Err` to exit code 1.

pub mod validate;
