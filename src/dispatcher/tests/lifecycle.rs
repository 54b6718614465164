use std::time::Duration;

use crate::dispatcher::Dispatcher;
use crate::dispatcher::test_helpers::{
    StubFetcher, create_test_dispatcher, create_test_dispatcher_with, test_config,
    wait_for_terminal,
};
use crate::error::Error;
use crate::types::{Event, JobId, JobState, SubmitRequest};

fn request(url: &str) -> SubmitRequest {
    SubmitRequest {
        url: url.to_string(),
        format: "best".to_string(),
        filename: None,
    }
}

// -----------------------------------------------------------------------
// submitted_job_finishes_with_artifact
// -----------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn submitted_job_finishes_with_artifact() {
    let (dispatcher, _temp_dir) =
        create_test_dispatcher(StubFetcher::produce("mp4", vec![25.0, 50.0, 100.0])).await;

    let job = dispatcher
        .submit(request("https://example.com/v"))
        .await
        .unwrap();
    assert_eq!(job.state, JobState::Queued);
    assert_eq!(job.progress, 0.0);

    let finished = wait_for_terminal(&dispatcher, &job.id, Duration::from_secs(5)).await;

    assert_eq!(finished.state, JobState::Finished);
    assert_eq!(finished.progress, 100.0);
    assert!(finished.error.is_none());
    let artifact = finished.artifact_path.expect("finished job must carry a path");
    assert!(artifact.exists(), "artifact file must exist on disk");
    assert_eq!(
        artifact.file_name().unwrap().to_string_lossy(),
        format!("{}.mp4", job.id),
        "output should be namespaced by the job id"
    );
}

// -----------------------------------------------------------------------
// progress_reports_reach_the_store
// -----------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn progress_reports_reach_the_store() {
    let (dispatcher, _temp_dir) = create_test_dispatcher(StubFetcher::produce_after(
        "mp4",
        vec![30.0],
        Duration::from_millis(300),
    ))
    .await;

    let job = dispatcher
        .submit(request("https://example.com/v"))
        .await
        .unwrap();

    // The stub reports 30% and then sleeps, so the running snapshot must
    // show that percentage before completion overwrites it with 100.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    loop {
        let snapshot = dispatcher.status(&job.id).await.unwrap();
        if snapshot.state == JobState::InProgress && snapshot.progress == 30.0 {
            break;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "never observed the in-flight progress, last: {:?} {}",
            snapshot.state,
            snapshot.progress
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let finished = wait_for_terminal(&dispatcher, &job.id, Duration::from_secs(5)).await;
    assert_eq!(finished.state, JobState::Finished);
    assert_eq!(finished.progress, 100.0);
}

// -----------------------------------------------------------------------
// failed_fetch_records_the_tool_message
// -----------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn failed_fetch_records_the_tool_message() {
    let (dispatcher, _temp_dir) =
        create_test_dispatcher(StubFetcher::failing("Unsupported URL: nope")).await;

    let job = dispatcher
        .submit(request("https://example.com/v"))
        .await
        .unwrap();
    let failed = wait_for_terminal(&dispatcher, &job.id, Duration::from_secs(5)).await;

    assert_eq!(failed.state, JobState::Failed);
    assert!(failed.artifact_path.is_none());
    let message = failed.error.expect("failed job must carry a message");
    assert!(
        message.contains("Unsupported URL"),
        "message should surface the tool error, got: {message}"
    );
}

// -----------------------------------------------------------------------
// timeout_fails_the_job_and_frees_the_slot
// -----------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn timeout_fails_the_job_and_frees_the_slot() {
    let (dispatcher, _temp_dir) =
        create_test_dispatcher_with(StubFetcher::hanging(), |config| {
            config.download.fetch_timeout_secs = 1;
            config.download.max_concurrent_fetches = 1;
        })
        .await;

    let job = dispatcher
        .submit(request("https://example.com/v"))
        .await
        .unwrap();
    let failed = wait_for_terminal(&dispatcher, &job.id, Duration::from_secs(5)).await;

    assert_eq!(failed.state, JobState::Failed);
    let message = failed.error.expect("timed-out job must carry a message");
    assert!(
        message.contains("timed out"),
        "message should name the timeout, got: {message}"
    );

    // The permit is dropped when the task winds down; poll briefly
    let crate::dispatcher::Backend::Local(local) = dispatcher.backend.as_ref() else {
        panic!("expected local backend");
    };
    let deadline = tokio::time::Instant::now() + Duration::from_secs(1);
    while local.concurrent_limit.available_permits() != 1 {
        assert!(
            tokio::time::Instant::now() < deadline,
            "slot was never released after the timeout"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(local.active_count().await, 0);
}

// -----------------------------------------------------------------------
// events_follow_the_lifecycle
// -----------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn events_follow_the_lifecycle() {
    // The delay after the progress report keeps the forwarded Progress
    // event ahead of Finished in the stream.
    let (dispatcher, _temp_dir) = create_test_dispatcher(StubFetcher::produce_after(
        "mp4",
        vec![50.0],
        Duration::from_millis(100),
    ))
    .await;

    // Subscribe before submitting so nothing is missed
    let mut events = dispatcher.subscribe();
    let job = dispatcher
        .submit(request("https://example.com/v"))
        .await
        .unwrap();

    let mut seen = Vec::new();
    let collected = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match events.recv().await {
                Ok(event @ Event::Finished { .. }) | Ok(event @ Event::Failed { .. }) => {
                    seen.push(event);
                    break;
                }
                Ok(event) => seen.push(event),
                Err(_) => break,
            }
        }
    })
    .await;
    assert!(collected.is_ok(), "never saw a terminal event: {seen:?}");

    assert!(
        matches!(&seen[0], Event::Queued { id, url } if *id == job.id && url == "https://example.com/v"),
        "first event should be Queued, got {seen:?}"
    );
    assert!(
        matches!(&seen[1], Event::Started { id } if *id == job.id),
        "second event should be Started, got {seen:?}"
    );
    assert!(
        seen.iter()
            .any(|e| matches!(e, Event::Progress { id, percent } if *id == job.id && *percent == 50.0)),
        "progress event missing: {seen:?}"
    );
    assert!(
        matches!(seen.last().unwrap(), Event::Finished { id, .. } if *id == job.id),
        "last event should be Finished, got {seen:?}"
    );
}

// -----------------------------------------------------------------------
// validation_rejects_before_any_record_exists
// -----------------------------------------------------------------------

#[tokio::test]
async fn validation_rejects_before_any_record_exists() {
    let (dispatcher, _temp_dir) =
        create_test_dispatcher(StubFetcher::produce("mp4", vec![])).await;

    let err = dispatcher
        .submit(request("ftp://example.com/v"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));

    let err = dispatcher
        .submit(SubmitRequest {
            url: "https://example.com/v".to_string(),
            format: "best".to_string(),
            filename: Some("../escape.mp4".to_string()),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));

    assert!(dispatcher.store.is_empty().await, "no record may be created");
}

// -----------------------------------------------------------------------
// custom_filename_is_used_for_the_artifact
// -----------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn custom_filename_is_used_for_the_artifact() {
    let (dispatcher, _temp_dir) =
        create_test_dispatcher(StubFetcher::produce("mp4", vec![])).await;

    let job = dispatcher
        .submit(SubmitRequest {
            url: "https://example.com/v".to_string(),
            format: "best".to_string(),
            filename: Some("my-clip.mp4".to_string()),
        })
        .await
        .unwrap();
    let finished = wait_for_terminal(&dispatcher, &job.id, Duration::from_secs(5)).await;

    assert_eq!(finished.state, JobState::Finished);
    let artifact = finished.artifact_path.unwrap();
    assert_eq!(artifact.file_name().unwrap().to_string_lossy(), "my-clip.mp4");
}

// -----------------------------------------------------------------------
// shutdown_rejects_new_jobs_and_cancels_active_ones
// -----------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn shutdown_rejects_new_jobs_and_cancels_active_ones() {
    let (dispatcher, _temp_dir) = create_test_dispatcher(StubFetcher::hanging()).await;

    let job = dispatcher
        .submit(request("https://example.com/v"))
        .await
        .unwrap();

    // Let the job enter the running phase before pulling the plug
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while dispatcher.status(&job.id).await.unwrap().state != JobState::InProgress {
        assert!(tokio::time::Instant::now() < deadline);
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    dispatcher.shutdown().await;

    let cancelled = dispatcher.status(&job.id).await.unwrap();
    assert_eq!(cancelled.state, JobState::Failed);
    assert!(
        cancelled.error.unwrap().contains("cancelled"),
        "cancellation should be visible in the message"
    );

    let err = dispatcher
        .submit(request("https://example.com/other"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ShuttingDown));
}

// -----------------------------------------------------------------------
// unknown_job_is_not_found
// -----------------------------------------------------------------------

#[tokio::test]
async fn unknown_job_is_not_found() {
    let (dispatcher, _temp_dir) =
        create_test_dispatcher(StubFetcher::produce("mp4", vec![])).await;

    let err = dispatcher.status(&JobId::from("missing")).await.unwrap_err();

    assert!(matches!(
        err,
        Error::Job(crate::error::JobError::NotFound { .. })
    ));
}

// -----------------------------------------------------------------------
// missing_fetcher_binary_fails_jobs_but_not_the_service
// -----------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn missing_fetcher_binary_fails_jobs_but_not_the_service() {
    let temp_dir = tempfile::tempdir().unwrap();
    let config = test_config(temp_dir.path());
    // Real fetcher, but PATH search is off and no explicit binary is set
    let dispatcher = Dispatcher::new(config).await.unwrap();

    let health = dispatcher.health();
    assert!(!health.fetcher_available);
    assert_eq!(health.status, "ok");

    let job = dispatcher
        .submit(request("https://example.com/v"))
        .await
        .unwrap();
    let failed = wait_for_terminal(&dispatcher, &job.id, Duration::from_secs(5)).await;

    assert_eq!(failed.state, JobState::Failed);
    assert!(
        failed.error.unwrap().contains("not available"),
        "message should say the fetcher is missing"
    );
}

// -----------------------------------------------------------------------
// preview_validates_and_delegates
// -----------------------------------------------------------------------

#[tokio::test]
async fn preview_validates_and_delegates() {
    let (dispatcher, _temp_dir) =
        create_test_dispatcher(StubFetcher::produce("mp4", vec![])).await;

    let err = dispatcher.preview("not a url").await.unwrap_err();
    assert!(matches!(err, Error::Validation(_)));

    let info = dispatcher.preview("https://example.com/v").await.unwrap();
    assert_eq!(info.url, "https://example.com/v");
    assert_eq!(info.formats.len(), 1);
}

// -----------------------------------------------------------------------
// health_reports_local_backend
// -----------------------------------------------------------------------

#[tokio::test]
async fn health_reports_local_backend() {
    let (dispatcher, _temp_dir) =
        create_test_dispatcher(StubFetcher::produce("mp4", vec![])).await;

    let health = dispatcher.health();

    assert_eq!(health.status, "ok");
    assert_eq!(health.backend, "local");
    assert!(health.fetcher_available);
    assert!(health.broker.is_none());
}
