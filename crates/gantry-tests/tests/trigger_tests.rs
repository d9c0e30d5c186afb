//! Trigger acceptance scenarios through the full coordinator path.

use gantry_core::Error;
use gantry_core::ports::InMemoryEventBus;
use gantry_core::run::RunStatus;
use gantry_scheduler::{RunCoordinator, TriggerEvent};
use gantry_tests::{CollectingReporter, PipelineFixture, ScriptedJobExecutor};
use pretty_assertions::assert_eq;
use std::sync::Arc;

fn coordinator(
    executor: ScriptedJobExecutor,
) -> (RunCoordinator, Arc<CollectingReporter>) {
    let reporter = Arc::new(CollectingReporter::new());
    let coordinator = RunCoordinator::new(
        Arc::new(executor),
        Arc::new(InMemoryEventBus::default()),
        reporter.clone(),
    );
    (coordinator, reporter)
}

#[tokio::test]
async fn test_push_to_master_is_accepted() {
    gantry_tests::init_test_logging();
    let (coordinator, reporter) = coordinator(ScriptedJobExecutor::new());
    let definition = PipelineFixture::ci();

    let event = TriggerEvent::Push {
        git_ref: "master".to_string(),
    };
    let result = coordinator
        .handle_event(&definition, &event)
        .await
        .unwrap()
        .expect("push to master triggers the pipeline");

    assert_eq!(result.status, RunStatus::Success);
    assert_eq!(reporter.reported().len(), 1);
}

#[tokio::test]
async fn test_push_to_other_branch_produces_no_run() {
    let (coordinator, reporter) = coordinator(ScriptedJobExecutor::new());
    let definition = PipelineFixture::ci();

    let event = TriggerEvent::Push {
        git_ref: "feature-x".to_string(),
    };
    let result = coordinator.handle_event(&definition, &event).await.unwrap();

    assert!(result.is_none());
    assert!(reporter.reported().is_empty(), "ignored events report nothing");
}

#[tokio::test]
async fn test_pull_request_on_master_is_accepted() {
    let (coordinator, _reporter) = coordinator(ScriptedJobExecutor::new());
    let definition = PipelineFixture::ci();

    let event = TriggerEvent::PullRequest {
        git_ref: "master".to_string(),
    };
    let result = coordinator.handle_event(&definition, &event).await.unwrap();
    assert!(result.is_some());
}

#[tokio::test]
async fn test_manual_dispatch_requires_a_manual_rule() {
    let (coordinator, _reporter) = coordinator(ScriptedJobExecutor::new());
    // The ci fixture declares push and pull_request triggers only.
    let definition = PipelineFixture::ci();

    let event = TriggerEvent::Manual {
        actor: Some("dev".to_string()),
    };
    let result = coordinator.handle_event(&definition, &event).await.unwrap();
    assert!(result.is_none());
}

#[tokio::test]
async fn test_malformed_event_is_a_configuration_error() {
    let (coordinator, reporter) = coordinator(ScriptedJobExecutor::new());
    let definition = PipelineFixture::ci();

    let event = TriggerEvent::Push {
        git_ref: String::new(),
    };
    let err = coordinator
        .handle_event(&definition, &event)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::MalformedEvent(_)));
    assert!(reporter.reported().is_empty());
}

#[tokio::test]
async fn test_trigger_info_records_the_event() {
    let (coordinator, _reporter) = coordinator(ScriptedJobExecutor::new());
    let definition = PipelineFixture::ci();

    let event = TriggerEvent::Push {
        git_ref: "master".to_string(),
    };
    let result = coordinator
        .handle_event(&definition, &event)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(result.trigger.git_ref.as_deref(), Some("master"));
    assert_eq!(result.pipeline_name, "ci");
}
