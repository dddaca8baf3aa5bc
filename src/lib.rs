//! # beiwe-registry
//!
//! A Rust library for normalizing Beiwe study configurations and inventorying the raw data a
//! study collects.
//!
//! ## Overview
//!
//! beiwe-registry has two halves that meet in a project:
//!
//! - **Study configurations.** A configuration document (device settings plus surveys) may be
//!   stored in one of several historical formats. The library detects the format, projects every
//!   attribute into one canonical model, and gives every study, survey and question a stable
//!   identifier plus a human readable name.
//! - **Raw-data registries.** Raw uploads are laid out as `<root>/<user id>/<stream>/<hour>.csv`.
//!   The library scans those trees into per-user inventories, merges users split across several
//!   roots, and records structural anomalies as flags rather than failing.
//!
//! ### Key Features
//!
//! - **Format-independent equality**: the same configuration stored in two formats compares equal
//! - **Stable identifiers**: names are a separate, persisted mapping; renames are all-or-nothing
//! - **Order-independent merges**: conflicting hour buckets are flagged and both sizes retained
//! - **Round-trip records**: studies and projects export to folders that reload to equal values
//!
//! ## Architecture
//!
//! - **[`study`]**: format detection, normalization, surveys and questions, names, records
//! - **[`registry`]**: stream inventories, device records, user and project registries, flags
//! - **[`config`]**: scan, coverage and export options (TOML)
//! - **[`summary`]**: plain-text summaries of studies, users and projects
//! - **[`time`]**: hour buckets and human readable time helpers
//!
//! ## Quick Start
//!
//! ### Normalizing a configuration
//!
//! ```rust,no_run
//! use beiwe_registry::study::Study;
//! use std::collections::BTreeMap;
//!
//! fn main() -> Result<(), beiwe_registry::RegistryError> {
//!     let mut study = Study::load("Sleep_Study_surveys_and_settings.json", None)?;
//!     for warning in study.warnings() {
//!         println!("{warning}");
//!     }
//!     let renames = BTreeMap::from([("Survey 1".to_string(), "Evening Diary".to_string())]);
//!     study.update_names(&renames)?;
//!     study.export("./records", &Default::default())?;
//!     Ok(())
//! }
//! ```
//!
//! ### Building a project registry
//!
//! ```rust,no_run
//! use beiwe_registry::{
//!     config::RegistryConfig,
//!     registry::{ConfigurationAssignment, Flag, ProjectRegistry, UserSelection},
//! };
//!
//! fn main() -> Result<(), beiwe_registry::RegistryError> {
//!     let project = ProjectRegistry::create(
//!         ["/data/raw_2020", "/data/raw_2021"],
//!         UserSelection::All,
//!         ConfigurationAssignment::All("Sleep_Study_surveys_and_settings.json".into()),
//!         RegistryConfig::from_file("registry.toml")?,
//!     )?;
//!     for user in project.flags().users(Flag::MergeConflicts) {
//!         println!("conflicting uploads for {user}");
//!     }
//!     let record = project.export("Sleep Study", "./records")?;
//!     assert_eq!(ProjectRegistry::load(record)?, project);
//!     Ok(())
//! }
//! ```
//!
//! ## Logging
//!
//! The library emits `tracing` events and never installs a subscriber. Every warning and flag is
//! logged at `warn` level as it is recorded.

pub mod config;
pub mod error;
pub mod registry;
pub mod study;
pub mod summary;
pub mod time;

#[cfg(test)]
mod tests;

pub use error::*;
