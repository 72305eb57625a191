//! Boundary search over a group's compilers, newest to oldest.
//!
//! Candidates are assumed to flip from OK to FAIL at most once along the
//! list. The prober finds that flip with a logarithmic number of compiles
//! and never guesses a boundary when the service faults: a timeout or
//! transport error stops the group and marks it inconclusive. Cancellation
//! stops it the same way, recording the pending compile as aborted.

use std::collections::BTreeMap;

use ce_client::{
    CancellationToken, CeError, CompileRequest, CompileService, CODE_ABORTED, CODE_TIMEOUT,
    CODE_TRANSPORT_ERROR,
};
use tracing::{debug, info, warn};

use crate::classify::ProbeJob;
use crate::error::CoreError;
use crate::flags::{build_user_args, ExtraFlags};
use crate::libraries::{effective_libraries, LibraryRule};
use crate::summary::{CompileAttempt, GroupSummary};
use crate::Result;

/// Everything a multi-group probe run needs.
#[derive(Debug, Clone, Default)]
pub struct ProbeRequest {
    /// Snippet to compile, usually flattened
    pub source: String,
    /// Language standard, e.g. `c++20`
    pub std: String,
    pub extra_flags: ExtraFlags,
    pub library_rules: Vec<LibraryRule>,
    /// Groups in probe order
    pub jobs: Vec<ProbeJob>,
}

/// Probes single groups against a [`CompileService`].
pub struct GroupProber<'a> {
    service: &'a dyn CompileService,
    source: &'a str,
    std: &'a str,
    extra_flags: &'a ExtraFlags,
    library_rules: &'a [LibraryRule],
}

impl<'a> GroupProber<'a> {
    pub fn new(service: &'a dyn CompileService, request: &'a ProbeRequest) -> Self {
        Self {
            service,
            source: &request.source,
            std: &request.std,
            extra_flags: &request.extra_flags,
            library_rules: &request.library_rules,
        }
    }

    /// Find the support boundary of one group.
    ///
    /// Service faults and cancellation are folded into the summary: the
    /// search stops and the summary is inconclusive, with the pending
    /// compile as `first_failure` (see [`GroupSummary::is_aborted`]). Only
    /// errors that are neither propagate.
    pub async fn probe_group(
        &self,
        job: &ProbeJob,
        cancel: &CancellationToken,
    ) -> Result<GroupSummary> {
        let mut search = Search {
            prober: self,
            job,
            cancel,
            user_args: build_user_args(&job.key, self.std, self.extra_flags),
            attempts: BTreeMap::new(),
            inconclusive: None,
        };
        search.run().await
    }
}

struct Search<'p, 'a> {
    prober: &'p GroupProber<'a>,
    job: &'p ProbeJob,
    cancel: &'p CancellationToken,
    user_args: String,
    attempts: BTreeMap<usize, CompileAttempt>,
    inconclusive: Option<String>,
}

impl Search<'_, '_> {
    async fn run(&mut self) -> Result<GroupSummary> {
        let n = self.job.compilers.len();
        let mut summary = GroupSummary::empty(self.job.key.clone());
        if n == 0 {
            return Ok(summary);
        }

        let newest = self.test(0).await?;
        if self.inconclusive.is_some() {
            return Ok(self.halt(summary, newest));
        }
        if !newest.ok() {
            summary.attempts = vec![newest.clone()];
            summary.first_failure = Some(newest);
            return Ok(summary);
        }
        summary.highest_supported = Some(newest.clone());
        if n == 1 {
            summary.lowest_supported = Some(newest.clone());
            summary.attempts = vec![newest];
            return Ok(summary);
        }

        let oldest = self.test(n - 1).await?;
        if self.inconclusive.is_some() {
            return Ok(self.halt(summary, oldest));
        }
        if oldest.ok() {
            summary.lowest_supported = Some(oldest);
            summary.attempts = self.tested();
            return Ok(summary);
        }

        // index `low` compiles, index `high` does not
        let (mut low, mut high) = (0, n - 1);
        while high - low > 1 {
            let mid = low + (high - low) / 2;
            let attempt = self.test(mid).await?;
            if self.inconclusive.is_some() {
                return Ok(self.halt(summary, attempt));
            }
            if attempt.ok() {
                low = mid;
            } else {
                high = mid;
            }
        }

        let lowest = self.test(low).await?;
        let first_fail = self.test(high).await?;
        summary.lowest_supported = lowest.ok().then_some(lowest);
        summary.first_failure = (!first_fail.ok()).then_some(first_fail);
        summary.attempts = self.tested();
        Ok(summary)
    }

    /// Stop the search at a faulting attempt.
    fn halt(&mut self, mut summary: GroupSummary, fault: CompileAttempt) -> GroupSummary {
        summary.lowest_supported = None;
        summary.first_failure = Some(fault);
        summary.attempts = self.tested();
        summary.inconclusive_reason = self.inconclusive.take();
        summary
    }

    fn tested(&self) -> Vec<CompileAttempt> {
        self.attempts.values().cloned().collect()
    }

    async fn test(&mut self, idx: usize) -> Result<CompileAttempt> {
        if let Some(hit) = self.attempts.get(&idx) {
            return Ok(hit.clone());
        }

        let job = self.job;
        let compiler = &job.compilers[idx];
        let key = &job.key;
        if self.cancel.is_cancelled() {
            return Ok(self.abort(idx));
        }
        let request = CompileRequest {
            compiler_id: compiler.id.clone(),
            source: self.prober.source.to_string(),
            user_arguments: self.user_args.clone(),
            libraries: effective_libraries(self.prober.library_rules, &key.family, &compiler.id),
        };
        debug!(
            group = %key,
            compiler_id = %compiler.id,
            index = idx,
            "testing compiler"
        );

        let (code, stderr) = match self.prober.service.compile(&request, self.cancel).await {
            Ok(response) => (response.code, response.stderr),
            Err(e) if e.is_cancelled() => return Ok(self.abort(idx)),
            Err(e) if e.is_timeout() => {
                warn!(compiler_id = %compiler.id, error = %e, "compile timed out");
                self.inconclusive = Some(format!(
                    "timeout talking to the compilation service (compiler id={})",
                    compiler.id
                ));
                (CODE_TIMEOUT, e.to_string())
            }
            Err(
                e @ (CeError::Http { .. } | CeError::Connection { .. } | CeError::Decode { .. }),
            ) => {
                warn!(compiler_id = %compiler.id, error = %e, "compile transport error");
                self.inconclusive = Some(format!(
                    "transport error talking to the compilation service (compiler id={})",
                    compiler.id
                ));
                (CODE_TRANSPORT_ERROR, e.to_string())
            }
            Err(e) => return Err(e.into()),
        };

        let attempt = CompileAttempt::new(key, compiler, code, stderr);
        self.attempts.insert(idx, attempt.clone());
        Ok(attempt)
    }

    /// Record the compile at `idx` as aborted and stop the search.
    fn abort(&mut self, idx: usize) -> CompileAttempt {
        let job = self.job;
        let compiler = &job.compilers[idx];
        debug!(group = %job.key, compiler_id = %compiler.id, "search aborted");
        self.inconclusive = Some(format!("aborted by user (compiler id={})", compiler.id));
        let attempt = CompileAttempt::new(&job.key, compiler, CODE_ABORTED, "aborted".into());
        self.attempts.insert(idx, attempt.clone());
        attempt
    }
}

/// Probe `request.jobs` one group at a time.
///
/// `on_group` sees every summary as soon as its group finishes. A group
/// whose probe fails with anything but cancellation is reported as an
/// inconclusive probe-error summary and the run continues. Cancellation
/// stops the run with `CoreError::Cancelled`, after the interrupted
/// group's partial summary has been passed to `on_group`.
pub async fn probe_groups<F>(
    service: &dyn CompileService,
    request: &ProbeRequest,
    cancel: &CancellationToken,
    mut on_group: F,
) -> Result<Vec<GroupSummary>>
where
    F: FnMut(&GroupSummary),
{
    let prober = GroupProber::new(service, request);
    let mut summaries = Vec::with_capacity(request.jobs.len());

    for job in &request.jobs {
        if cancel.is_cancelled() {
            return Err(CoreError::Cancelled);
        }
        info!(group = %job.key, candidates = job.compilers.len(), "probing group");

        let summary = match prober.probe_group(job, cancel).await {
            Ok(summary) => summary,
            Err(e) if e.is_cancelled() => return Err(CoreError::Cancelled),
            Err(e) => {
                warn!(group = %job.key, error = %e, "group probe failed");
                GroupSummary::probe_error(job.key.clone(), &e.to_string())
            }
        };

        info!(
            group = %job.key,
            attempts = summary.attempts.len(),
            inconclusive = summary.is_inconclusive(),
            "group finished"
        );
        let aborted = summary.is_aborted();
        on_group(&summary);
        summaries.push(summary);
        if aborted {
            return Err(CoreError::Cancelled);
        }
    }

    Ok(summaries)
}
