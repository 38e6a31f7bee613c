//! Dispatcher behaviour: FIFO spacing, dedupe, retries, stale submits.

mod common;

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use scenegen_core::job::JobStatus;
use scenegen_orchestrator::JobEvent;

use common::{build, clip, clip_key, status, test_config, MemorySink, PollScript, ScriptedProvider, SubmitScript};

// ---------------------------------------------------------------------------
// Ordering and spacing
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn batch_dispatches_in_order_with_spacing_and_isolated_failure() {
    let provider = ScriptedProvider::new("reel");
    provider.on_submit("p1", [SubmitScript::Accept("t1".into())]);
    provider.on_submit("p2", [SubmitScript::Reject("prompt blocked".into())]);
    provider.on_submit("p3", [SubmitScript::Accept("t3".into())]);
    provider.on_poll("t1", [PollScript::Pending, PollScript::Succeed("https://cdn/s1.mp4".into())]);
    provider.on_poll("t3", [PollScript::Succeed("https://cdn/s3.mp4".into())]);

    let orchestrator = build(&test_config(), &provider, None);
    assert!(orchestrator.schedule(clip("s1", "p1")).await);
    assert!(orchestrator.schedule(clip("s2", "p2")).await);
    assert!(orchestrator.schedule(clip("s3", "p3")).await);

    tokio::time::sleep(Duration::from_secs(10)).await;

    assert_eq!(provider.submitted_prompts(), vec!["p1", "p2", "p3"]);
    let times: Vec<_> = provider.submitted.lock().unwrap().iter().map(|(_, t)| *t).collect();
    for pair in times.windows(2) {
        assert!(pair[1] - pair[0] >= Duration::from_millis(500));
    }

    assert_eq!(status(&orchestrator, &clip_key("s1")).await, Some(JobStatus::Succeeded));
    assert_eq!(status(&orchestrator, &clip_key("s3")).await, Some(JobStatus::Succeeded));

    let failed = orchestrator.state(&clip_key("s2")).await.unwrap();
    assert_eq!(failed.status, JobStatus::Failed);
    assert!(failed.error.unwrap().contains("prompt blocked"));

    orchestrator.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn ticker_restarts_after_draining() {
    let provider = ScriptedProvider::new("reel");
    provider.on_submit("p1", [SubmitScript::Complete("https://cdn/a.mp4".into())]);
    provider.on_submit("p2", [SubmitScript::Complete("https://cdn/b.mp4".into())]);

    let orchestrator = build(&test_config(), &provider, None);
    orchestrator.schedule(clip("s1", "p1")).await;
    tokio::time::sleep(Duration::from_secs(3)).await;

    orchestrator.schedule(clip("s2", "p2")).await;
    tokio::time::sleep(Duration::from_secs(3)).await;

    assert_eq!(provider.submitted_prompts(), vec!["p1", "p2"]);
    assert_eq!(status(&orchestrator, &clip_key("s2")).await, Some(JobStatus::Succeeded));
}

// ---------------------------------------------------------------------------
// Enqueue dedupe
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn enqueue_twice_dispatches_once() {
    let provider = ScriptedProvider::new("reel");
    provider.on_submit("p1", [SubmitScript::AcceptAfter("t1".into(), Duration::from_secs(1))]);

    let orchestrator = build(&test_config(), &provider, None);
    assert!(orchestrator.enqueue(clip("s1", "p1")).await);
    assert!(!orchestrator.enqueue(clip("s1", "p1")).await);
    orchestrator.start().await;
    orchestrator.start().await;

    // Submit still in flight.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(status(&orchestrator, &clip_key("s1")).await, Some(JobStatus::Pending));
    assert!(!orchestrator.schedule(clip("s1", "p1")).await);

    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(status(&orchestrator, &clip_key("s1")).await, Some(JobStatus::Queueing));
    assert!(!orchestrator.schedule(clip("s1", "p1")).await);
    assert_eq!(provider.submitted_prompts(), vec!["p1"]);

    orchestrator.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn failed_job_can_be_enqueued_again() {
    let provider = ScriptedProvider::new("reel");
    provider.on_submit("p1", [SubmitScript::Reject("nope".into())]);
    provider.on_submit("p1", [SubmitScript::Complete("https://cdn/a.mp4".into())]);

    let orchestrator = build(&test_config(), &provider, None);
    orchestrator.schedule(clip("s1", "p1")).await;
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(status(&orchestrator, &clip_key("s1")).await, Some(JobStatus::Failed));

    assert!(orchestrator.schedule(clip("s1", "p1")).await);
    tokio::time::sleep(Duration::from_secs(2)).await;
    let state = orchestrator.state(&clip_key("s1")).await.unwrap();
    assert_eq!(state.status, JobStatus::Succeeded);
    assert_eq!(state.attempt, 2);
    assert!(state.error.is_none());
}

#[tokio::test(start_paused = true)]
async fn reset_removes_queued_entry() {
    let provider = ScriptedProvider::new("reel");
    let orchestrator = build(&test_config(), &provider, None);

    orchestrator.schedule(clip("s1", "p1")).await;
    orchestrator.schedule(clip("s2", "p2")).await;
    orchestrator.reset(&clip_key("s2")).await;

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(provider.submitted_prompts(), vec!["p1"]);
    assert_eq!(status(&orchestrator, &clip_key("s2")).await, Some(JobStatus::Idle));
    assert!(orchestrator.enqueue(clip("s2", "p2")).await);

    orchestrator.shutdown().await;
}

// ---------------------------------------------------------------------------
// Submit errors
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn transient_submit_errors_are_requeued() {
    let provider = ScriptedProvider::new("reel");
    provider.on_submit("p1", [SubmitScript::HttpError(503), SubmitScript::HttpError(429)]);

    let orchestrator = build(&test_config(), &provider, None);
    orchestrator.schedule(clip("s1", "p1")).await;
    tokio::time::sleep(Duration::from_secs(5)).await;

    assert_eq!(provider.submitted_prompts().len(), 3);
    assert_eq!(status(&orchestrator, &clip_key("s1")).await, Some(JobStatus::Queueing));

    orchestrator.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn retry_limit_exhaustion_fails_the_job() {
    let provider = ScriptedProvider::new("reel");
    provider.on_submit(
        "p1",
        [
            SubmitScript::HttpError(502),
            SubmitScript::HttpError(502),
            SubmitScript::HttpError(502),
        ],
    );

    let orchestrator = build(&test_config(), &provider, None);
    orchestrator.schedule(clip("s1", "p1")).await;
    tokio::time::sleep(Duration::from_secs(5)).await;

    assert_eq!(provider.submitted_prompts().len(), 3);
    let state = orchestrator.state(&clip_key("s1")).await.unwrap();
    assert_eq!(state.status, JobStatus::Failed);
    assert!(state.error.unwrap().contains("502"));
}

#[tokio::test(start_paused = true)]
async fn direct_generate_fails_immediately_on_transient_error() {
    let provider = ScriptedProvider::new("reel");
    provider.on_submit("p1", [SubmitScript::HttpError(503)]);

    let orchestrator = build(&test_config(), &provider, None);
    let outcome = orchestrator.generate(clip("s1", "p1")).await;

    assert_eq!(outcome, JobStatus::Failed);
    assert_eq!(provider.submitted_prompts().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn unknown_provider_fails_the_job() {
    let provider = ScriptedProvider::new("reel");
    let orchestrator = build(&test_config(), &provider, None);

    let outcome = orchestrator
        .generate(clip("s1", "p1").with_provider("ghost"))
        .await;

    assert_eq!(outcome, JobStatus::Failed);
    let state = orchestrator.state(&clip_key("s1")).await.unwrap();
    assert_eq!(state.provider.as_deref(), Some("ghost"));
    assert!(provider.submitted_prompts().is_empty());
}

// ---------------------------------------------------------------------------
// Synchronous completion and hand-off
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn synchronous_artifact_is_persisted_without_polling() {
    let provider = ScriptedProvider::new("reel");
    provider.on_submit("p1", [SubmitScript::Complete("data:video/mp4;base64,AAAA".into())]);
    let sink = Arc::new(MemorySink::default());

    let orchestrator = build(&test_config(), &provider, Some(sink.clone()));
    let outcome = orchestrator.generate(clip("s1", "p1")).await;

    assert_eq!(outcome, JobStatus::Succeeded);
    assert_eq!(orchestrator.active_pollers().await, 0);

    // The hand-off runs in the background.
    tokio::time::sleep(Duration::from_millis(10)).await;
    let records = sink.records.lock().unwrap().clone();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].metadata["provider"], "reel");
    assert_eq!(records[0].metadata["prompt"], "p1");

    let state = orchestrator.state(&clip_key("s1")).await.unwrap();
    assert_matches!(state.asset, Some(ref asset) if asset.version == 1);
}

#[tokio::test(start_paused = true)]
async fn rejected_artifact_is_recorded_on_the_job() {
    let provider = ScriptedProvider::new("reel");
    provider.on_submit("p1", [SubmitScript::Complete("https://cdn/a.png".into())]);
    let sink = MemorySink::rejecting("disk full");

    let orchestrator = build(&test_config(), &provider, Some(sink));
    let mut events = orchestrator.subscribe();
    orchestrator.generate(clip("s1", "p1")).await;
    tokio::time::sleep(Duration::from_millis(10)).await;

    let state = orchestrator.state(&clip_key("s1")).await.unwrap();
    assert_eq!(state.status, JobStatus::Succeeded);
    assert!(state.asset.is_none());
    assert!(state.persist_error.unwrap().contains("disk full"));

    let mut persist_failures = 0;
    while let Ok(event) = events.try_recv() {
        if matches!(event, JobEvent::PersistFailed { .. }) {
            persist_failures += 1;
        }
    }
    assert_eq!(persist_failures, 1);
}

#[tokio::test(start_paused = true)]
async fn reset_during_submit_discards_handle_and_cancels_it() {
    let provider = ScriptedProvider::new("reel");
    provider.on_submit("p1", [SubmitScript::AcceptAfter("t-late".into(), Duration::from_secs(2))]);

    let orchestrator = build(&test_config(), &provider, None);
    orchestrator.schedule(clip("s1", "p1")).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(status(&orchestrator, &clip_key("s1")).await, Some(JobStatus::Pending));

    orchestrator.reset(&clip_key("s1")).await;
    tokio::time::sleep(Duration::from_secs(5)).await;

    assert_eq!(status(&orchestrator, &clip_key("s1")).await, Some(JobStatus::Idle));
    assert_eq!(provider.cancelled(), vec!["t-late"]);
    assert_eq!(provider.polls_for("t-late"), 0);
    assert_eq!(orchestrator.active_pollers().await, 0);
}
