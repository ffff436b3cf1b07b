//! # ride-core
//!
//! Controller and model layer of an editor for keyword-driven test data.
//!
//! ## Overview
//!
//! ride-core loads a directory tree of table-formatted data files (`.robot`, `.txt`, `.tsv`,
//! `.html`, `.resource`) into a [`Project`](controller::Project): an arena of controllers, one
//! per data file or directory. Every edit is a [`Command`](controller::Command) executed against
//! a controller; applied commands record their inverse on that controller's undo stack, mark
//! it and its ancestors dirty and publish an event. Saving writes back only the rows that
//! changed, so files nobody edited are reproduced byte for byte.
//!
//! ### Key Features
//!
//! - **Byte-preserving codecs**: space, pipe, TSV and HTML dialects, see [`codec`]
//! - **Namespace resolution**: keywords and variables through imports, libraries, variable
//!   files and built-ins, with answers cached per generation of the files they read
//! - **Undoable commands**: cell edits, row and element operations, renames that span files
//! - **Out-of-process work**: library introspection and test runs are child processes whose
//!   output comes back as events
//!
//! ## Architecture
//!
//! - **[`codec`]** and **[`model`]**: reading, modelling and writing data files
//! - **[`namespace`]** and **[`library`]**: name resolution and library introspection
//! - **[`controller`]**: the project tree, commands, undo/redo, save/reload
//! - **[`occurrences`]**: finding and renaming keyword and variable references
//! - **[`publisher`]** and **[`event`]**: the topic-based event bus
//! - **[`runner`]**: the test runner driver
//! - **[`config`]**, **[`registry`]**, **[`console`]**, **[`backup`]**: settings, editor
//!   providers, the debug console and backup-on-save
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ride_core::controller::{Command, ControllerId, Project, ProjectOptions};
//! use ride_core::model::TableKind;
//!
//! fn main() -> Result<(), ride_core::RideError> {
//!     let mut project = Project::open("./acceptance", ProjectOptions::default())?;
//!     let root = project.root().expect("loaded");
//!     let settings = ControllerId::Table(root, TableKind::Settings);
//!     let outcome = project.execute(
//!         settings,
//!         Command::AddRow {
//!             index: 0,
//!             cells: vec!["Library".into(), "Collections".into()],
//!         },
//!     );
//!     assert!(outcome.is_applied());
//!     project.undo(settings)?;
//!     project.save_all()?;
//!     Ok(())
//! }
//! ```

pub mod backup;
pub mod cache;
pub mod codec;
pub mod config;
pub mod console;
pub mod controller;
pub mod error;
pub mod event;
pub mod library;
pub mod model;
pub mod namespace;
pub mod occurrences;
pub mod publisher;
pub mod registry;
pub mod runner;
#[cfg(test)]
mod tests;

pub use error::*;
