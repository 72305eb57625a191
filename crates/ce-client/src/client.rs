//! Compiler Explorer HTTP client
//!
//! Every request goes through the shared [`RateLimiter`] and the retry loop
//! in [`crate::retry`]. Compile results are memoized in a [`CompileCache`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, RETRY_AFTER};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::cache::{CompileCache, CompileKey};
use crate::error::CeError;
use crate::limiter::RateLimiter;
use crate::metrics::ClientMetrics;
use crate::models::{
    parse_compiler_catalog, parse_library_catalog, CompileRequest, CompileResponse,
    CompilerRecord, LibraryInfo,
};
use crate::retry::{retry_with_backoff, RetryPolicy};
use crate::service::CompileService;
use crate::Result;

const CATALOG_FIELDS: &str = "id,name,lang,compilerType,semver,instructionSet";
const BODY_LOG_LIMIT: usize = 4000;

/// Client configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Service root, e.g. `https://godbolt.org`
    pub base_url: String,
    /// Minimum spacing between any two requests
    pub min_request_interval: Duration,
    /// Per-attempt timeout
    pub request_timeout: Duration,
    /// Backoff schedule for retryable failures
    pub retry: RetryPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig::new("https://godbolt.org")
    }
}

impl ClientConfig {
    /// Create config for a specific service root
    pub fn new(base_url: &str) -> Self {
        ClientConfig {
            base_url: base_url.to_string(),
            min_request_interval: Duration::from_millis(120),
            request_timeout: Duration::from_secs(45),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_min_interval(mut self, interval: Duration) -> Self {
        self.min_request_interval = interval;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn root(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }
}

/// Compiler Explorer client
pub struct CeClient {
    config: ClientConfig,
    http_client: reqwest::Client,
    limiter: Arc<RateLimiter>,
    cache: Arc<CompileCache>,
    metrics: Arc<ClientMetrics>,
}

impl CeClient {
    /// Create a client with its own limiter and cache
    pub fn new(config: ClientConfig) -> Result<Self> {
        let limiter = Arc::new(RateLimiter::new(config.min_request_interval));
        Self::with_parts(config, limiter, Arc::new(CompileCache::new()))
    }

    /// Create a client sharing an existing limiter and cache
    pub fn with_parts(
        config: ClientConfig,
        limiter: Arc<RateLimiter>,
        cache: Arc<CompileCache>,
    ) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("cetest/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| CeError::Config(e.to_string()))?;

        Ok(CeClient {
            config,
            http_client,
            limiter,
            cache,
            metrics: Arc::new(ClientMetrics::new()),
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<CompileCache> {
        &self.cache
    }

    pub fn metrics(&self) -> &Arc<ClientMetrics> {
        &self.metrics
    }

    /// Send one JSON request with throttling and retries.
    async fn request_json(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        cancel: &CancellationToken,
    ) -> Result<Value> {
        let url = format!("{}{}", self.config.root(), path);
        let label = format!("{} {}", method, path);

        retry_with_backoff(&self.config.retry, &self.limiter, cancel, &label, |attempt| {
            let method = method.clone();
            let url = url.clone();
            async move {
                self.metrics.inc_requests();
                if attempt > 1 {
                    self.metrics.inc_retries();
                }
                debug!(%method, %url, attempt, timeout_s = self.config.request_timeout.as_secs_f64(), "HTTP request");
                self.send_once(method, &url, body).await
            }
        })
        .await
    }

    async fn send_once(&self, method: Method, url: &str, body: Option<&Value>) -> Result<Value> {
        let mut req = self
            .http_client
            .request(method, url)
            .header(ACCEPT, "application/json")
            .timeout(self.config.request_timeout);
        if let Some(body) = body {
            req = req.json(body);
        }

        let response = req.send().await.map_err(|e| CeError::from_reqwest(url, e))?;
        let status = response.status();

        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| parse_retry_after(v, self.config.retry.max_backoff));
            let mut body = response.text().await.unwrap_or_default();
            if body.len() > BODY_LOG_LIMIT {
                let mut cut = BODY_LOG_LIMIT;
                while !body.is_char_boundary(cut) {
                    cut -= 1;
                }
                body.truncate(cut);
            }
            return Err(CeError::Http {
                status: status.as_u16(),
                url: url.to_string(),
                body,
                retry_after,
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| CeError::from_reqwest(url, e))?;
        serde_json::from_slice(&bytes).map_err(|e| CeError::Decode {
            url: url.to_string(),
            detail: e.to_string(),
        })
    }

    /// Fetch the C++ compiler catalog.
    pub async fn list_compilers(&self, cancel: &CancellationToken) -> Result<Vec<CompilerRecord>> {
        let path = format!(
            "/api/compilers/{}?fields={}",
            encode_path_segment("c++"),
            CATALOG_FIELDS
        );
        let raw = self.request_json(Method::GET, &path, None, cancel).await?;
        let out = parse_compiler_catalog(&raw);
        debug!(count = out.len(), "loaded raw C++ compilers");
        Ok(out)
    }

    /// Fetch the C++ library catalog.
    pub async fn list_libraries(&self, cancel: &CancellationToken) -> Result<Vec<LibraryInfo>> {
        let path = format!("/api/libraries/{}", encode_path_segment("c++"));
        let raw = self.request_json(Method::GET, &path, None, cancel).await?;
        Ok(parse_library_catalog(&raw))
    }

    /// Compile a snippet, answering from the cache when possible.
    pub async fn compile_cached(
        &self,
        request: &CompileRequest,
        cancel: &CancellationToken,
    ) -> Result<CompileResponse> {
        let key = CompileKey::for_request(request);
        if let Some(hit) = self.cache.get(&key) {
            self.metrics.inc_cache_hits();
            debug!(compiler_id = %request.compiler_id, "compile cache hit");
            return Ok(hit);
        }

        debug!(
            compiler_id = %request.compiler_id,
            args = %request.user_arguments,
            source_len = request.source.len(),
            "compile"
        );
        let path = format!(
            "/api/compiler/{}/compile",
            encode_path_segment(&request.compiler_id)
        );
        let payload = compile_payload(request);
        let raw = self
            .request_json(Method::POST, &path, Some(&payload), cancel)
            .await?;
        self.metrics.inc_compiles();

        let response = CompileResponse::from_json(&raw);
        self.cache.insert(key, response.clone());
        Ok(response)
    }
}

#[async_trait]
impl CompileService for CeClient {
    async fn list_compilers(&self, cancel: &CancellationToken) -> Result<Vec<CompilerRecord>> {
        CeClient::list_compilers(self, cancel).await
    }

    async fn compile(
        &self,
        request: &CompileRequest,
        cancel: &CancellationToken,
    ) -> Result<CompileResponse> {
        self.compile_cached(request, cancel).await
    }
}

/// Request body for `POST /api/compiler/<id>/compile`.
pub fn compile_payload(request: &CompileRequest) -> Value {
    json!({
        "source": request.source,
        "options": {
            "userArguments": request.user_arguments,
            "compilerOptions": {
                "skipAsm": true,
                "executorRequest": false,
                "overrides": [],
            },
            "filters": {
                "binary": false,
                "binaryObject": false,
                "commentOnly": true,
                "demangle": true,
                "directives": true,
                "execute": false,
                "intel": true,
                "labels": true,
                "libraryCode": false,
                "trim": true,
                "debugCalls": false,
            },
            "tools": [],
            "libraries": request.libraries,
        },
        "lang": "c++",
        "allowStoreCodeDebug": true,
    })
}

/// `Retry-After` in delta-seconds form, capped at `max`. HTTP-date values
/// are ignored.
fn parse_retry_after(value: &str, max: Duration) -> Option<Duration> {
    let secs = value.trim().parse::<f64>().ok().filter(|s| *s >= 0.0)?;
    // too large for a Duration
    let wait = Duration::try_from_secs_f64(secs).unwrap_or(max);
    Some(wait.min(max))
}

/// Percent-encode a single URL path segment.
pub fn encode_path_segment(segment: &str) -> String {
    urlencoding::encode(segment).into_owned()
}
