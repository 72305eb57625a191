//! Boundary search and multi-group runs against the scripted service.

use std::sync::Arc;

use ce_client::{
    CancellationToken, CompilerRecord, CODE_ABORTED, CODE_TIMEOUT, CODE_TRANSPORT_ERROR,
};
use cetest_core::fakes::{Scripted, ScriptedService};
use cetest_core::{
    group_compilers, probe_groups, spawn_catalog_load, spawn_probe, CatalogOutcome, CoreError,
    ExtraFlags, GroupKey, GroupProber, GroupSummary, LibraryRule, ProbeEvent, ProbeJob, ProbeRequest,
};

fn record(id: &str, name: &str, semver: &str) -> CompilerRecord {
    CompilerRecord {
        id: id.into(),
        name: name.into(),
        lang: "c++".into(),
        compiler_type: "gcc".into(),
        semver: Some(semver.into()),
        instruction_set: Some("amd64".into()),
    }
}

/// `n` compilers, newest first, ids `c0..c{n-1}`.
fn job(family: &str, n: usize) -> ProbeJob {
    ProbeJob {
        key: GroupKey::new(family, "x86-64", format!("x86-64 {family}")),
        compilers: (0..n)
            .map(|i| {
                let version = 100 - i;
                record(&format!("c{i}"), &format!("{family} {version}"), &format!("{version}.0"))
            })
            .collect(),
    }
}

fn request(jobs: Vec<ProbeJob>) -> ProbeRequest {
    ProbeRequest {
        source: "int main() { return 0; }".into(),
        std: "c++20".into(),
        extra_flags: ExtraFlags::default(),
        library_rules: Vec::new(),
        jobs,
    }
}

/// Script indices above `last_ok` to fail.
fn boundary_service(n: usize, last_ok: usize) -> ScriptedService {
    let svc = ScriptedService::new(Vec::new());
    for i in last_ok + 1..n {
        svc.script(&format!("c{i}"), Scripted::Fail);
    }
    svc
}

async fn probe_one(svc: &ScriptedService, job: &ProbeJob) -> cetest_core::Result<GroupSummary> {
    let req = request(vec![job.clone()]);
    let prober = GroupProber::new(svc, &req);
    prober.probe_group(job, &CancellationToken::new()).await
}

#[tokio::test]
async fn boundary_is_found_in_logarithmic_calls() {
    let job = job("gcc", 16);
    let svc = boundary_service(16, 5);

    let summary = probe_one(&svc, &job).await.unwrap();

    assert_eq!(summary.highest_supported.as_ref().unwrap().compiler_id, "c0");
    assert_eq!(summary.lowest_supported.as_ref().unwrap().compiler_id, "c5");
    assert_eq!(summary.first_failure.as_ref().unwrap().compiler_id, "c6");
    assert!(summary.inconclusive_reason.is_none());
    assert!(svc.call_count() <= 6, "calls: {:?}", svc.called_ids());
    // memoized: no compiler is asked twice
    let mut ids = svc.called_ids();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), svc.call_count());
    assert_eq!(summary.attempts.len(), svc.call_count());
}

#[tokio::test]
async fn every_boundary_position_is_found() {
    for n in 2..=12 {
        for last_ok in 0..n - 1 {
            let job = job("gcc", n);
            let svc = boundary_service(n, last_ok);
            let summary = probe_one(&svc, &job).await.unwrap();
            assert_eq!(
                summary.lowest_supported.as_ref().unwrap().compiler_id,
                format!("c{last_ok}"),
                "n={n} last_ok={last_ok}"
            );
            assert_eq!(
                summary.first_failure.as_ref().unwrap().compiler_id,
                format!("c{}", last_ok + 1)
            );
        }
    }
}

#[tokio::test]
async fn attempts_are_in_candidate_order() {
    let job = job("gcc", 16);
    let svc = boundary_service(16, 5);

    let summary = probe_one(&svc, &job).await.unwrap();

    let order: Vec<usize> = summary
        .attempts
        .iter()
        .map(|a| a.compiler_id[1..].parse().unwrap())
        .collect();
    let mut sorted = order.clone();
    sorted.sort();
    assert_eq!(order, sorted);
}

#[tokio::test]
async fn newest_failing_stops_after_one_call() {
    let job = job("gcc", 8);
    let svc = boundary_service(8, 0);
    svc.script("c0", Scripted::Fail);

    let summary = probe_one(&svc, &job).await.unwrap();

    assert_eq!(svc.call_count(), 1);
    assert!(summary.highest_supported.is_none());
    assert!(summary.lowest_supported.is_none());
    assert_eq!(summary.first_failure.as_ref().unwrap().compiler_id, "c0");
    assert_eq!(summary.attempts.len(), 1);
    assert!(summary.inconclusive_reason.is_none());
}

#[tokio::test]
async fn oldest_passing_needs_two_calls() {
    let job = job("gcc", 10);
    let svc = ScriptedService::new(Vec::new());

    let summary = probe_one(&svc, &job).await.unwrap();

    assert_eq!(svc.called_ids(), vec!["c0", "c9"]);
    assert_eq!(summary.highest_supported.as_ref().unwrap().compiler_id, "c0");
    assert_eq!(summary.lowest_supported.as_ref().unwrap().compiler_id, "c9");
    assert!(summary.first_failure.is_none());
}

#[tokio::test]
async fn single_candidate_is_both_ends() {
    let job = job("gcc", 1);
    let svc = ScriptedService::new(Vec::new());

    let summary = probe_one(&svc, &job).await.unwrap();

    assert_eq!(svc.call_count(), 1);
    assert_eq!(summary.highest_supported, summary.lowest_supported);
    assert!(summary.highest_supported.is_some());
}

#[tokio::test]
async fn empty_group_makes_no_calls() {
    let job = job("gcc", 0);
    let svc = ScriptedService::new(Vec::new());

    let summary = probe_one(&svc, &job).await.unwrap();

    assert_eq!(svc.call_count(), 0);
    assert!(summary.attempts.is_empty());
    assert!(summary.highest_supported.is_none());
    assert!(summary.first_failure.is_none());
    assert!(summary.inconclusive_reason.is_none());
}

#[tokio::test]
async fn fault_at_any_tested_index_is_inconclusive() {
    let n = 16;
    // probe order for a boundary at 5 is 0, 15, 7, 3, 5, 6
    for (faulty, fault) in [
        ("c0", Scripted::Timeout),
        ("c15", Scripted::Transport),
        ("c7", Scripted::Timeout),
        ("c3", Scripted::Transport),
        ("c5", Scripted::Transport),
        ("c6", Scripted::Timeout),
    ] {
        let job = job("gcc", n);
        let svc = boundary_service(n, 5);
        svc.script(faulty, fault.clone());

        let summary = probe_one(&svc, &job).await.unwrap();

        let reason = summary.inconclusive_reason.as_deref().unwrap();
        assert!(reason.contains(faulty), "{reason}");
        let failure = summary.first_failure.as_ref().unwrap();
        assert_eq!(failure.compiler_id, faulty);
        let expected = if fault == Scripted::Timeout {
            CODE_TIMEOUT
        } else {
            CODE_TRANSPORT_ERROR
        };
        assert_eq!(failure.code, expected);
        assert!(summary.lowest_supported.is_none());
        assert_eq!(svc.called_ids().last().map(String::as_str), Some(faulty));
        if faulty == "c0" {
            assert!(summary.highest_supported.is_none());
        } else {
            assert_eq!(summary.highest_supported.as_ref().unwrap().compiler_id, "c0");
        }
    }
}

#[tokio::test]
async fn flags_and_libraries_reach_the_service() {
    let job = job("gcc", 1);
    let svc = ScriptedService::new(Vec::new());
    let mut req = request(vec![job.clone()]);
    req.extra_flags = ExtraFlags {
        extra_gnu: "-Wall".into(),
        ..ExtraFlags::default()
    };
    req.library_rules = vec![
        LibraryRule::all("fmt", "9.0"),
        LibraryRule::family("gcc", "fmt", "11.0"),
        LibraryRule::compiler("c0", "boost", "1.84.0"),
    ];

    GroupProber::new(&svc, &req)
        .probe_group(&job, &CancellationToken::new())
        .await
        .unwrap();

    let sent = &svc.requests()[0];
    assert_eq!(sent.user_arguments, "-std=c++20 -fsyntax-only -Wall");
    let libs: Vec<(&str, &str)> = sent
        .libraries
        .iter()
        .map(|l| (l.id.as_str(), l.version.as_str()))
        .collect();
    assert_eq!(libs, vec![("fmt", "11.0"), ("boost", "1.84.0")]);
}

#[tokio::test]
async fn group_error_is_contained() {
    let broken = job("clang", 4);
    let fine = job("gcc", 4);
    let svc = ScriptedService::new(Vec::new());
    // ids of the second group are renamed so the script only hits the first
    svc.script("c0", Scripted::Error);
    let fine = ProbeJob {
        compilers: fine
            .compilers
            .into_iter()
            .map(|mut c| {
                c.id = format!("g{}", c.id);
                c
            })
            .collect(),
        ..fine
    };
    let req = request(vec![broken, fine]);

    let mut seen = Vec::new();
    let summaries = probe_groups(&svc, &req, &CancellationToken::new(), |s| {
        seen.push(s.key.clone())
    })
    .await
    .unwrap();

    assert_eq!(summaries.len(), 2);
    assert_eq!(seen.len(), 2);
    let err = &summaries[0];
    assert!(err.inconclusive_reason.as_deref().unwrap().starts_with("probe error:"));
    let failure = err.first_failure.as_ref().unwrap();
    assert_eq!(failure.compiler_name, "(probe error)");
    assert_eq!(failure.code, CODE_TRANSPORT_ERROR);
    assert!(err.attempts.is_empty());
    assert_eq!(summaries[1].lowest_supported.as_ref().unwrap().compiler_id, "gc3");
}

#[tokio::test]
async fn cancellation_mid_search_aborts() {
    let svc = boundary_service(16, 5);
    let cancel = CancellationToken::new();
    svc.cancel_after(2, cancel.clone());
    let req = request(vec![job("gcc", 16)]);

    let mut seen = Vec::new();
    let err = probe_groups(&svc, &req, &cancel, |s| seen.push(s.clone()))
        .await
        .unwrap_err();

    assert!(matches!(err, CoreError::Cancelled));
    assert_eq!(svc.call_count(), 2);
    // the interrupted group is still delivered, marked aborted
    assert_eq!(seen.len(), 1);
    let partial = &seen[0];
    assert!(partial.is_aborted());
    assert!(partial.inconclusive_reason.as_deref().unwrap().contains("c7"));
    let pending = partial.first_failure.as_ref().unwrap();
    assert_eq!(pending.compiler_id, "c7");
    assert_eq!(pending.code, CODE_ABORTED);
    assert_eq!(partial.highest_supported.as_ref().unwrap().compiler_id, "c0");
    assert!(partial.lowest_supported.is_none());
    let ids: Vec<&str> = partial.attempts.iter().map(|a| a.compiler_id.as_str()).collect();
    assert_eq!(ids, vec!["c0", "c7", "c15"]);
}

#[tokio::test]
async fn cancelled_before_first_compile_records_newest_as_aborted() {
    let job = job("gcc", 4);
    let svc = ScriptedService::new(Vec::new());
    let req = request(vec![job.clone()]);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let summary = GroupProber::new(&svc, &req)
        .probe_group(&job, &cancel)
        .await
        .unwrap();

    assert_eq!(svc.call_count(), 0);
    assert!(summary.is_aborted());
    assert!(summary.highest_supported.is_none());
    assert_eq!(summary.first_failure.as_ref().unwrap().compiler_id, "c0");
    assert_eq!(summary.attempts.len(), 1);
}

#[tokio::test]
async fn completed_group_is_not_aborted() {
    let job = job("gcc", 3);
    let svc = ScriptedService::new(Vec::new());

    let summary = probe_one(&svc, &job).await.unwrap();

    assert!(!summary.is_aborted());
}

#[tokio::test]
async fn spawned_probe_streams_groups_then_finishes() {
    let svc = Arc::new(ScriptedService::new(Vec::new()));
    let jobs = vec![job("gcc", 3), job("clang", 3)];
    let (handle, mut events) = spawn_probe(svc.clone(), request(jobs), CancellationToken::new());

    let mut got = Vec::new();
    while let Some(event) = events.recv().await {
        got.push(event);
    }
    handle.await.unwrap();

    assert_eq!(got.len(), 3);
    assert!(matches!(&got[0], ProbeEvent::GroupCompleted(s) if s.key.family == "gcc"));
    assert!(matches!(&got[1], ProbeEvent::GroupCompleted(s) if s.key.family == "clang"));
    assert_eq!(got[2], ProbeEvent::Finished);
}

#[tokio::test]
async fn spawned_probe_reports_abort_distinctly() {
    let svc = Arc::new(ScriptedService::new(Vec::new()));
    let cancel = CancellationToken::new();
    // first group takes two calls, the second group never starts
    svc.cancel_after(2, cancel.clone());
    let jobs = vec![job("gcc", 3), job("clang", 3)];
    let (handle, mut events) = spawn_probe(svc.clone(), request(jobs), cancel);

    let mut got = Vec::new();
    while let Some(event) = events.recv().await {
        got.push(event);
    }
    handle.await.unwrap();

    assert_eq!(got.len(), 2);
    assert!(matches!(&got[0], ProbeEvent::GroupCompleted(_)));
    assert_eq!(got[1], ProbeEvent::Aborted);
    assert!(got[1].is_terminal());
}

#[tokio::test]
async fn catalog_load_groups_into_jobs() {
    let catalog = vec![
        record("g91", "x86-64 gcc 9.1", "9.1"),
        record("g132", "x86-64 gcc 13.2", "13.2"),
        record("g114", "x86-64 gcc 11.4", "11.4"),
    ];
    let svc = Arc::new(ScriptedService::new(catalog));

    let outcome = spawn_catalog_load(svc, CancellationToken::new()).await.unwrap();
    let CatalogOutcome::Loaded(records) = outcome else {
        panic!("catalog did not load: {outcome:?}");
    };

    let groups = group_compilers(&records);
    assert_eq!(groups.len(), 1);
    let keys = groups.select(&["gcc".to_string()]);
    let jobs = groups.jobs(&keys);
    let ids: Vec<&str> = jobs[0].compilers.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, vec!["g132", "g114", "g91"]);
}

#[tokio::test]
async fn catalog_load_observes_cancellation() {
    let svc = Arc::new(ScriptedService::new(Vec::new()));
    let cancel = CancellationToken::new();
    cancel.cancel();

    let outcome = spawn_catalog_load(svc, cancel).await.unwrap();

    assert_eq!(outcome, CatalogOutcome::Aborted);
}
