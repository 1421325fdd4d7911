#![cfg_attr(docsrs, feature(doc_auto_cfg))]
#![warn(clippy::all, clippy::cargo, clippy::nursery, missing_docs)]
#![doc = include_str!("../README.md")]

/// Electrical constants, tolerances and unit helpers.
pub mod constants;
/// Shared numerical primitives (scalar aliases, complex helpers).
pub mod math;
/// Analysis configuration.
pub mod config;
/// Circuit data model, topology extraction, system construction and solvers.
pub mod circuits;
/// Frequency sweep builders and CSV export.
pub mod sweep;
/// Error and warning types shared across the crate.
pub mod errors;

/// Common exports for downstream crates.
pub mod prelude;
