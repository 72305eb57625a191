//! tu-flatten: single translation unit assembly
//!
//! Compilation services accept one source file. This crate inlines quoted
//! `#include` directives of a multi-file project into one text, using a
//! `compile_commands.json` build database to recover include paths when
//! one is available.

pub mod build_db;
pub mod error;
pub mod flatten;
pub mod options;

pub use build_db::{
    find_companion_source, ArgsSource, BuildDatabase, BuildDbMatch, CompanionLookup, IncludeDirs,
};
pub use error::{FlattenError, Result};
pub use flatten::{flatten, read_source, FlattenStats, Flattened};
pub use options::FlattenOptions;
