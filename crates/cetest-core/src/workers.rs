//! Background tasks for catalog loading and probe runs.
//!
//! Both report back over channels so a front end can render partial
//! results while work continues.

use std::sync::Arc;

use ce_client::{CancellationToken, CompileService, CompilerRecord};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{error, info, info_span, Instrument};
use uuid::Uuid;

use crate::probe::{probe_groups, ProbeRequest};
use crate::summary::GroupSummary;

/// Progress of a probe run. Exactly one terminal event ends the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeEvent {
    GroupCompleted(GroupSummary),
    Finished,
    Aborted,
    Failed(String),
}

impl ProbeEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ProbeEvent::GroupCompleted(_))
    }
}

/// Result of a background catalog load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogOutcome {
    Loaded(Vec<CompilerRecord>),
    Failed(String),
    Aborted,
}

/// Load the compiler catalog in the background.
pub fn spawn_catalog_load(
    service: Arc<dyn CompileService>,
    cancel: CancellationToken,
) -> oneshot::Receiver<CatalogOutcome> {
    let (tx, rx) = oneshot::channel();
    tokio::spawn(async move {
        let outcome = match service.list_compilers(&cancel).await {
            Ok(records) => {
                info!(compilers = records.len(), "compiler catalog loaded");
                CatalogOutcome::Loaded(records)
            }
            Err(e) if e.is_cancelled() => CatalogOutcome::Aborted,
            Err(e) => {
                error!(error = %e, "compiler catalog load failed");
                CatalogOutcome::Failed(e.to_string())
            }
        };
        // receiver may have gone away
        let _ = tx.send(outcome);
    });
    rx
}

/// Run a multi-group probe in the background.
///
/// Emits `GroupCompleted` per group as it finishes, then one of
/// `Finished`, `Aborted` or `Failed`. A panic inside the run is reported
/// as `Failed`.
pub fn spawn_probe(
    service: Arc<dyn CompileService>,
    request: ProbeRequest,
    cancel: CancellationToken,
) -> (JoinHandle<()>, mpsc::UnboundedReceiver<ProbeEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let run_id = Uuid::new_v4();
    let span = info_span!("cetest.probe", run_id = %run_id);

    let handle = tokio::spawn(async move {
        let events = tx.clone();
        let run = tokio::spawn(
            async move {
                info!(groups = request.jobs.len(), std = %request.std, "probe run started");
                let result = probe_groups(service.as_ref(), &request, &cancel, |summary| {
                    let _ = events.send(ProbeEvent::GroupCompleted(summary.clone()));
                })
                .await;
                match result {
                    Ok(summaries) => {
                        info!(groups = summaries.len(), "probe run finished");
                        ProbeEvent::Finished
                    }
                    Err(e) if e.is_cancelled() => {
                        info!("probe run aborted");
                        ProbeEvent::Aborted
                    }
                    Err(e) => {
                        error!(error = %e, "probe run failed");
                        ProbeEvent::Failed(e.to_string())
                    }
                }
            }
            .instrument(span),
        );

        let terminal = match run.await {
            Ok(event) => event,
            Err(e) => ProbeEvent::Failed(format!("probe task failed: {e}")),
        };
        let _ = tx.send(terminal);
    });

    (handle, rx)
}
