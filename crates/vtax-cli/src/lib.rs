//! # vtax-cli: VoIP Tax Engine Command-Line Interface
//!
//! Offline operator tooling over a catalog file. Nothing here talks to the
//! HTTP service or a database.
//!
//! ## Subcommands
//!
//! - `validate`: load a catalog file and report errors and warnings
//! - `resolve`: list the jurisdictions that tax an address
//! - `calculate`: tax one line item and print the breakdown
//! - `seed`: emit the default catalog for a company
//!
//! Handlers delegate to the domain crates and write to a caller-supplied
//! sink, returning the process exit code.

pub mod address;
pub mod calculate;
pub mod resolve;
pub mod seed;
pub mod validate;
