//! Integration tests for the run coordinator, driven by scripted fakes.

mod common;

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use common::{config_for, coordinator, files_in, input_dir, FakeMuxer, FakeProber};
use muxpair_core::{MergeStatus, RunEvent, RunState, StreamKind};
use tokio_util::sync::CancellationToken;

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn close_durations_merge() {
    let input = input_dir(&["clip_video.m4s", "clip_audio.m4s"]);
    let output = tempfile::tempdir().unwrap();
    let prober = FakeProber::new()
        .video("clip_video.m4s", 60.0)
        .audio("clip_audio.m4s", 60.2);
    let muxer = Arc::new(FakeMuxer::new());

    let report = coordinator(config_for(input.path(), output.path()), prober, muxer.clone())
        .run(CancellationToken::new())
        .await;

    assert_eq!(report.state, RunState::Done);
    assert_eq!(report.succeeded(), 1);
    assert!(report.unmatched.is_empty());
    assert_eq!(report.outcomes[0].attempts, 1);
    assert!(report.outcomes[0].output.starts_with(output.path()));
    assert!(report.outcomes[0].output.exists());
    assert_eq!(muxer.total_calls(), 1);
}

#[tokio::test]
async fn distant_durations_stay_unmatched() {
    let input = input_dir(&["clip_video.m4s", "clip_audio.m4s"]);
    let output = tempfile::tempdir().unwrap();
    let prober = FakeProber::new()
        .video("clip_video.m4s", 60.0)
        .audio("clip_audio.m4s", 120.0);
    let muxer = Arc::new(FakeMuxer::new());

    let report = coordinator(config_for(input.path(), output.path()), prober, muxer.clone())
        .run(CancellationToken::new())
        .await;

    assert_eq!(report.state, RunState::Done);
    assert!(report.outcomes.is_empty());
    assert_eq!(report.unmatched.len(), 2);
    assert_eq!(muxer.total_calls(), 0);
    assert!(files_in(output.path()).is_empty());
}

#[tokio::test]
async fn delete_sources_after_success() {
    let input = input_dir(&["clip_video.m4s", "clip_audio.m4s"]);
    let output = tempfile::tempdir().unwrap();
    let prober = FakeProber::new()
        .video("clip_video.m4s", 30.0)
        .audio("clip_audio.m4s", 30.0);
    let mut config = config_for(input.path(), output.path());
    config.merge.delete_sources = true;

    let report = coordinator(config, prober, Arc::new(FakeMuxer::new()))
        .run(CancellationToken::new())
        .await;

    let outcome = &report.outcomes[0];
    assert_eq!(outcome.status, MergeStatus::Success);
    assert!(outcome.deleted_sources);
    assert!(files_in(input.path()).is_empty());
    let merged = std::fs::metadata(&outcome.output).unwrap();
    assert!(merged.len() > 0);
}

#[tokio::test]
async fn delete_sources_kept_when_merge_fails() {
    let input = input_dir(&["clip_video.m4s", "clip_audio.m4s"]);
    let output = tempfile::tempdir().unwrap();
    let prober = FakeProber::new()
        .video("clip_video.m4s", 30.0)
        .audio("clip_audio.m4s", 30.0);
    let mut config = config_for(input.path(), output.path());
    config.merge.delete_sources = true;
    let muxer = Arc::new(FakeMuxer::new().failing_for("clip_video.m4s"));

    let report = coordinator(config, prober, muxer)
        .run(CancellationToken::new())
        .await;

    assert_eq!(report.state, RunState::Done);
    assert_eq!(report.failed(), 1);
    assert!(!report.outcomes[0].deleted_sources);
    assert_eq!(
        files_in(input.path()),
        vec!["clip_audio.m4s", "clip_video.m4s"]
    );
    assert!(files_in(output.path()).is_empty());
}

// ---------------------------------------------------------------------------
// Retries and isolation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn failing_pair_is_tried_max_retries_plus_one_times() {
    let input = input_dir(&["v.m4s", "a.m4s"]);
    let output = tempfile::tempdir().unwrap();
    let prober = FakeProber::new().video("v.m4s", 10.0).audio("a.m4s", 10.0);
    let mut config = config_for(input.path(), output.path());
    config.merge.max_retries = 3;
    let muxer = Arc::new(FakeMuxer::new().failing_for("v.m4s"));

    let report = coordinator(config, prober, muxer.clone())
        .run(CancellationToken::new())
        .await;

    assert_eq!(muxer.attempts_for("v.m4s"), 4);
    assert_eq!(report.outcomes[0].attempts, 4);
    assert_matches!(&report.outcomes[0].status, MergeStatus::Failed { reason } if reason.contains("scripted failure"));
}

#[tokio::test]
async fn retry_switch_off_means_single_attempt() {
    let input = input_dir(&["v.m4s", "a.m4s"]);
    let output = tempfile::tempdir().unwrap();
    let prober = FakeProber::new().video("v.m4s", 10.0).audio("a.m4s", 10.0);
    let mut config = config_for(input.path(), output.path());
    config.merge.max_retries = 3;
    config.merge.retry_on_failure = false;
    let muxer = Arc::new(FakeMuxer::new().failing_for("v.m4s"));

    coordinator(config, prober, muxer.clone())
        .run(CancellationToken::new())
        .await;

    assert_eq!(muxer.attempts_for("v.m4s"), 1);
}

#[tokio::test]
async fn one_failure_does_not_affect_other_pairs() {
    let names = [
        "a_video.m4s",
        "a_audio.m4s",
        "b_video.m4s",
        "b_audio.m4s",
        "c_video.m4s",
        "c_audio.m4s",
    ];
    let input = input_dir(&names);
    let output = tempfile::tempdir().unwrap();
    let prober = FakeProber::new()
        .video("a_video.m4s", 10.0)
        .audio("a_audio.m4s", 10.1)
        .video("b_video.m4s", 50.0)
        .audio("b_audio.m4s", 50.1)
        .video("c_video.m4s", 90.0)
        .audio("c_audio.m4s", 90.1);
    let mut config = config_for(input.path(), output.path());
    config.merge.delete_sources = true;
    config.matching.max_duration_diff = 1.0;
    let muxer = Arc::new(FakeMuxer::new().failing_for("b_video.m4s"));

    let report = coordinator(config, prober, muxer)
        .run(CancellationToken::new())
        .await;

    let statuses: Vec<bool> = report.outcomes.iter().map(|o| o.status.is_success()).collect();
    assert_eq!(statuses, vec![true, false, true]);
    assert_eq!(files_in(input.path()), vec!["b_audio.m4s", "b_video.m4s"]);
    assert_eq!(files_in(output.path()).len(), 2);
}

#[tokio::test]
async fn outcomes_follow_submission_order() {
    let input = input_dir(&["1v.m4s", "1a.m4s", "2v.m4s", "2a.m4s", "3v.m4s", "3a.m4s"]);
    let output = tempfile::tempdir().unwrap();
    let prober = FakeProber::new()
        .video("1v.m4s", 100.0)
        .audio("1a.m4s", 100.0)
        .video("2v.m4s", 200.0)
        .audio("2a.m4s", 200.0)
        .video("3v.m4s", 300.0)
        .audio("3a.m4s", 300.0);
    let mut config = config_for(input.path(), output.path());
    config.concurrency.merge_workers = 3;
    config.naming.template = "{idx}".into();
    let muxer = Arc::new(FakeMuxer::new().with_delay(Duration::from_millis(10)));

    let report = coordinator(config, prober, muxer)
        .run(CancellationToken::new())
        .await;

    let videos: Vec<String> = report
        .outcomes
        .iter()
        .map(|o| common::file_name(o.pair.video.path()))
        .collect();
    assert_eq!(videos, vec!["1v.m4s", "2v.m4s", "3v.m4s"]);
    let outputs: Vec<String> = report
        .outcomes
        .iter()
        .map(|o| common::file_name(&o.output))
        .collect();
    assert_eq!(outputs, vec!["1.mp4", "2.mp4", "3.mp4"]);
}

// ---------------------------------------------------------------------------
// Naming
// ---------------------------------------------------------------------------

#[tokio::test]
async fn fixed_template_still_yields_distinct_outputs() {
    let input = input_dir(&["1v.m4s", "1a.m4s", "2v.m4s", "2a.m4s", "3v.m4s", "3a.m4s"]);
    let output = tempfile::tempdir().unwrap();
    std::fs::write(output.path().join("merged.mp4"), b"existing").unwrap();
    let prober = FakeProber::new()
        .video("1v.m4s", 100.0)
        .audio("1a.m4s", 100.0)
        .video("2v.m4s", 200.0)
        .audio("2a.m4s", 200.0)
        .video("3v.m4s", 300.0)
        .audio("3a.m4s", 300.0);
    let mut config = config_for(input.path(), output.path());
    config.naming.template = "merged".into();

    let report = coordinator(config, prober, Arc::new(FakeMuxer::new()))
        .run(CancellationToken::new())
        .await;

    assert_eq!(report.succeeded(), 3);
    assert_eq!(
        files_in(output.path()),
        vec!["merged.mp4", "merged_1.mp4", "merged_2.mp4", "merged_3.mp4"]
    );
    assert_eq!(std::fs::read(output.path().join("merged.mp4")).unwrap(), b"existing");
}

// ---------------------------------------------------------------------------
// Edge cases
// ---------------------------------------------------------------------------

#[tokio::test]
async fn empty_directory_is_done() {
    let input = input_dir(&[]);
    let report = coordinator(
        config_for(input.path(), input.path()),
        FakeProber::new(),
        Arc::new(FakeMuxer::new()),
    )
    .run(CancellationToken::new())
    .await;

    assert_eq!(report.state, RunState::Done);
    assert!(report.outcomes.is_empty());
    assert!(report.unmatched.is_empty());
    assert!(report.error.is_none());
}

#[tokio::test]
async fn unreadable_directory_fails_run() {
    let output = tempfile::tempdir().unwrap();
    let missing = output.path().join("does-not-exist");
    let report = coordinator(
        config_for(&missing, output.path()),
        FakeProber::new(),
        Arc::new(FakeMuxer::new()),
    )
    .run(CancellationToken::new())
    .await;

    assert_eq!(report.state, RunState::Failed);
    assert!(report.error.as_deref().unwrap().contains("Directory unreadable"));
    assert!(report.outcomes.is_empty());
}

#[tokio::test]
async fn probe_failure_is_recorded_not_fatal() {
    let input = input_dir(&["v.m4s", "a.m4s", "broken.m4s", "notes.txt"]);
    let output = tempfile::tempdir().unwrap();
    let prober = FakeProber::new()
        .video("v.m4s", 10.0)
        .audio("a.m4s", 10.0)
        .failing("broken.m4s", "invalid data found");

    let report = coordinator(
        config_for(input.path(), output.path()),
        prober,
        Arc::new(FakeMuxer::new()),
    )
    .run(CancellationToken::new())
    .await;

    assert_eq!(report.state, RunState::Done);
    assert_eq!(report.succeeded(), 1);
    assert_eq!(report.unmatched.len(), 1);
    let broken = &report.unmatched[0];
    assert_eq!(broken.kind, StreamKind::Unknown);
    assert!(broken.error.as_deref().unwrap().contains("invalid data found"));
}

#[tokio::test]
async fn dry_run_skips_every_pair() {
    let input = input_dir(&["v.m4s", "a.m4s"]);
    let output = tempfile::tempdir().unwrap();
    let prober = FakeProber::new().video("v.m4s", 10.0).audio("a.m4s", 10.0);
    let mut config = config_for(input.path(), output.path());
    config.dry_run = true;
    let muxer = Arc::new(FakeMuxer::new());

    let report = coordinator(config, prober, muxer.clone())
        .run(CancellationToken::new())
        .await;

    assert_eq!(report.state, RunState::Done);
    assert_eq!(report.skipped(), 1);
    assert_eq!(report.outcomes[0].attempts, 0);
    assert_eq!(muxer.total_calls(), 0);
    assert!(files_in(output.path()).is_empty());
}

#[tokio::test]
async fn invalid_config_is_rejected_up_front() {
    let mut config = muxpair::config::Config::default();
    config.concurrency.probe_workers = 0;
    let result = muxpair::RunCoordinator::new(
        config,
        Arc::new(FakeProber::new()),
        Arc::new(FakeMuxer::new()),
    );
    assert!(result.is_err());
}

// ---------------------------------------------------------------------------
// Events and cancellation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn events_trace_the_state_machine() {
    let input = input_dir(&["v.m4s", "a.m4s", "x.m4s"]);
    let output = tempfile::tempdir().unwrap();
    let prober = FakeProber::new()
        .video("v.m4s", 10.0)
        .audio("a.m4s", 10.0)
        .failing("x.m4s", "bad");

    let coord = coordinator(
        config_for(input.path(), output.path()),
        prober,
        Arc::new(FakeMuxer::new()),
    );
    let mut rx = coord.subscribe();
    let handle = coord.start();
    let report = handle.wait().await.unwrap();

    let mut states = Vec::new();
    let mut probe_ok = 0;
    let mut probe_failed = 0;
    let mut saw_match = false;
    let mut merged = 0;
    let mut completed = false;
    while let Ok(event) = rx.try_recv() {
        match event.payload {
            RunEvent::StateChanged { state } => states.push(state),
            RunEvent::ScanComplete { files } => assert_eq!(files, 3),
            RunEvent::ProbeComplete { .. } => probe_ok += 1,
            RunEvent::ProbeFailed { .. } => probe_failed += 1,
            RunEvent::MatchComplete { pairs, unmatched } => {
                assert_eq!((pairs, unmatched), (1, 1));
                saw_match = true;
            }
            RunEvent::MergeComplete { index, .. } => {
                assert_eq!(index, 1);
                merged += 1;
            }
            RunEvent::MergeFailed { .. } => panic!("unexpected merge failure"),
            RunEvent::RunComplete { report: r } => {
                assert_eq!(r.succeeded(), report.succeeded());
                completed = true;
            }
        }
    }

    assert_eq!(
        states,
        vec![
            RunState::Scanning,
            RunState::Probing,
            RunState::Matching,
            RunState::Merging,
            RunState::Done,
        ]
    );
    assert_eq!((probe_ok, probe_failed), (2, 1));
    assert!(saw_match);
    assert_eq!(merged, 1);
    assert!(completed);
}

#[tokio::test]
async fn cancel_before_start_does_nothing() {
    let input = input_dir(&["v.m4s", "a.m4s"]);
    let prober = FakeProber::new().video("v.m4s", 10.0).audio("a.m4s", 10.0);
    let muxer = Arc::new(FakeMuxer::new());
    let coord = coordinator(config_for(input.path(), input.path()), prober, muxer.clone());

    let cancel = CancellationToken::new();
    cancel.cancel();
    let report = coord.run(cancel).await;

    assert_eq!(report.state, RunState::Cancelled);
    assert!(report.outcomes.is_empty());
    assert_eq!(muxer.total_calls(), 0);
}

#[tokio::test]
async fn cancel_during_merging_stops_dispatch() {
    let names = ["1v.m4s", "1a.m4s", "2v.m4s", "2a.m4s", "3v.m4s", "3a.m4s"];
    let input = input_dir(&names);
    let output = tempfile::tempdir().unwrap();
    let prober = FakeProber::new()
        .video("1v.m4s", 100.0)
        .audio("1a.m4s", 100.0)
        .video("2v.m4s", 200.0)
        .audio("2a.m4s", 200.0)
        .video("3v.m4s", 300.0)
        .audio("3a.m4s", 300.0);
    let mut config = config_for(input.path(), output.path());
    config.concurrency.merge_workers = 1;
    config.merge.delete_sources = true;
    let muxer = Arc::new(FakeMuxer::new().with_delay(Duration::from_secs(30)));

    let coord = coordinator(config, prober, muxer.clone());
    let mut rx = coord.subscribe();
    let handle = coord.start();

    loop {
        let event = rx.recv().await.unwrap();
        if let RunEvent::StateChanged {
            state: RunState::Merging,
        } = event.payload
        {
            break;
        }
    }
    handle.cancel();
    let report = tokio::time::timeout(Duration::from_secs(10), handle.wait())
        .await
        .expect("run did not stop after cancellation")
        .unwrap();

    assert_eq!(report.state, RunState::Cancelled);
    assert_eq!(report.outcomes.len(), 3);
    assert_eq!(report.succeeded(), 0);
    assert!(report.failed() <= 1);
    assert!(report.skipped() >= 2);
    assert!(muxer.total_calls() <= 1);
    for outcome in &report.outcomes {
        assert!(!outcome.output.exists());
        assert!(!outcome.deleted_sources);
    }
    assert_eq!(files_in(input.path()).len(), names.len());
    assert!(files_in(output.path()).is_empty());
}

#[tokio::test]
async fn cancel_during_probing_stops_running_probes() {
    let names = ["1v.m4s", "1a.m4s", "2v.m4s", "2a.m4s", "3v.m4s", "3a.m4s"];
    let input = input_dir(&names);
    let output = tempfile::tempdir().unwrap();
    let prober = FakeProber::new()
        .video("1v.m4s", 100.0)
        .audio("1a.m4s", 100.0)
        .video("2v.m4s", 200.0)
        .audio("2a.m4s", 200.0)
        .video("3v.m4s", 300.0)
        .audio("3a.m4s", 300.0)
        .with_delay(Duration::from_secs(30));
    let mut config = config_for(input.path(), output.path());
    config.concurrency.probe_workers = 1;
    let muxer = Arc::new(FakeMuxer::new());

    let coord = coordinator(config, prober, muxer.clone());
    let mut rx = coord.subscribe();
    let handle = coord.start();

    loop {
        let event = rx.recv().await.unwrap();
        if let RunEvent::StateChanged {
            state: RunState::Probing,
        } = event.payload
        {
            break;
        }
    }
    tokio::time::sleep(Duration::from_millis(50)).await;
    handle.cancel();
    let report = tokio::time::timeout(Duration::from_secs(5), handle.wait())
        .await
        .expect("run did not stop after cancellation")
        .unwrap();

    assert_eq!(report.state, RunState::Cancelled);
    assert!(report.outcomes.is_empty());
    assert_eq!(muxer.total_calls(), 0);

    // Every scanned file is still accounted for, marked cancelled.
    assert_eq!(report.unmatched.len(), names.len());
    for result in &report.unmatched {
        assert_eq!(result.kind, StreamKind::Unknown);
        assert_eq!(result.error.as_deref(), Some("cancelled"));
    }
    assert_eq!(files_in(input.path()).len(), names.len());
}
