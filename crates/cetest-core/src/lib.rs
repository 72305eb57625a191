//! cetest core library
//!
//! Groups a compiler catalog into `(family, platform, series)` partitions,
//! resolves per-compiler library sets, and binary-searches each group for
//! the oldest compiler that still accepts a snippet.

pub mod classify;
pub mod config;
pub mod error;
pub mod fakes;
pub mod flags;
pub mod libraries;
pub mod probe;
pub mod report;
pub mod summary;
pub mod telemetry;
pub mod workers;

pub use classify::{
    family, family_sort_key, group_compilers, platform, series, CatalogStats, CompilerGroups,
    GroupKey, GroupTree, ProbeJob, UNKNOWN_SERIES,
};
pub use config::{CetestConfig, ServiceConfig};
pub use error::{CoreError, Result};
pub use flags::{build_user_args, std_flags_for_family, ExtraFlags, FlagStyle};
pub use libraries::{clean_rules, effective_libraries, LibraryRule, RawLibraryRule, RuleScope};
pub use probe::{probe_groups, GroupProber, ProbeRequest};
pub use report::{render_group_line, ProbeReport};
pub use summary::{overall_lowest, CompileAttempt, GroupStatus, GroupSummary};
pub use telemetry::init_tracing;
pub use workers::{spawn_catalog_load, spawn_probe, CatalogOutcome, ProbeEvent};
