//! ce-client: Compiler Explorer API access for cetest
//!
//! Catalog listing and cached compiles against a Compiler Explorer
//! deployment, with a process-wide request throttle, retry with
//! exponential backoff and cooperative cancellation.
//!
//! The probing layer depends only on the [`CompileService`] trait so it can
//! run against in-memory fakes.

pub mod cache;
pub mod client;
pub mod error;
pub mod limiter;
pub mod metrics;
pub mod models;
pub mod retry;
pub mod semver;
pub mod service;

pub use cache::{CompileCache, CompileKey};
pub use client::{compile_payload, encode_path_segment, CeClient, ClientConfig};
pub use error::CeError;
pub use limiter::RateLimiter;
pub use metrics::{ClientMetrics, MetricsSnapshot};
pub use models::{
    parse_compiler_catalog, parse_library_catalog, CompileRequest, CompileResponse,
    CompilerRecord, LibraryInfo, LibrarySelection, CODE_ABORTED, CODE_TIMEOUT,
    CODE_TRANSPORT_ERROR,
};
pub use retry::{retry_with_backoff, sleep_cancellable, RetryPolicy};
pub use semver::SemverKey;
pub use service::CompileService;

// Re-exported so callers share one token type with this crate.
pub use tokio_util::sync::CancellationToken;

/// Result type for ce-client operations
pub type Result<T> = std::result::Result<T, CeError>;
