//! The seam between probing logic and the remote service.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::models::{CompileRequest, CompileResponse, CompilerRecord};
use crate::Result;

/// Remote compilation operations the prober needs.
///
/// [`crate::CeClient`] is the production implementation; tests substitute
/// in-memory fakes with scripted outcomes.
#[async_trait]
pub trait CompileService: Send + Sync {
    /// Load the C++ compiler catalog.
    async fn list_compilers(&self, cancel: &CancellationToken) -> Result<Vec<CompilerRecord>>;

    /// Compile one snippet, possibly answered from a cache.
    async fn compile(
        &self,
        request: &CompileRequest,
        cancel: &CancellationToken,
    ) -> Result<CompileResponse>;
}
