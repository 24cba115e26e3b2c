// Copyright © 2025 lituus-io <spicyzhug@gmail.com>
// All Rights Reserved.
// Licensed under PolyForm Noncommercial 1.0.0

//! End-to-end tests for the session lifecycle.
//!
//! These tests drive full sessions through a mock backend and check the
//! stage machine, artifact extraction and failure isolation together.

use jebi::{
    Backend, ControllerConfig, Error, FailingBackend, MockBackend, ModelInfo, RetryPolicy,
    SessionController, Stage,
};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

fn scripted_backend() -> MockBackend {
    MockBackend::new()
        .on_generate(|_task, request| {
            format!(
                "Here is the prompt:\n<prompt_to_copy>\nYou are a novelist. {request}\n</prompt_to_copy>\n改进说明：added a role"
            )
        })
        .on_judge(|_prompt, _request| {
            json!({
                "evaluation_summary": {
                    "overall_score": 3.8,
                    "main_strengths": "clear role",
                    "main_weaknesses": "no length limit"
                },
                "dimension_scores": {
                    "clarity": {"score": 4, "justification": "readable"},
                    "completeness": {"score": 3, "justification": "missing constraints"}
                }
            })
        })
        .on_refine(|prompt, _evaluation| {
            format!("<prompt_to_copy>\n{prompt}\nKeep it under 500 words.\n</prompt_to_copy>")
        })
        .with_model(ModelInfo::new("gemini-2.5-flash", "google"))
}

#[tokio::test]
async fn test_full_happy_path() {
    let mut controller = SessionController::new(scripted_backend());
    let id = controller.create(
        "writing",
        "write a short story about a fox",
        Some(ModelInfo::new("gemini-2.5-flash", "google")),
    );

    let p1 = controller.generate_p1(&id).await.unwrap();
    assert!(p1.starts_with("You are a novelist."));
    assert!(!p1.contains("prompt_to_copy"));
    assert!(!p1.contains("改进说明"));

    let report = controller.evaluate(&id).await.unwrap();
    assert_eq!(report.overall_score, 3.8);
    assert_eq!(report.criteria.len(), 2);

    let refined = controller.refine(&id).await.unwrap();
    assert!(refined.contains("Keep it under 500 words."));
    assert!(refined.contains("You are a novelist."));

    let final_prompt = controller.complete(&id).unwrap();
    assert_eq!(final_prompt, refined);

    let session = controller.get_status(&id).unwrap();
    assert_eq!(session.stage, Stage::Completed);
    assert_eq!(session.final_prompt.as_deref(), Some(final_prompt.as_str()));
    assert_eq!(session.rounds().len(), 1);
    assert_eq!(session.retries, Default::default());
}

#[tokio::test]
async fn test_stage_gating() {
    let mut controller = SessionController::new(scripted_backend());
    let id = controller.create("writing", "write a short story", None);

    // Nothing but generate is legal from a fresh session.
    assert!(matches!(
        controller.evaluate(&id).await,
        Err(Error::TerminalSession {
            stage: Stage::Created,
            operation: "evaluate",
        })
    ));
    assert!(matches!(
        controller.refine(&id).await,
        Err(Error::TerminalSession { .. })
    ));
    assert!(matches!(
        controller.complete(&id),
        Err(Error::TerminalSession { .. })
    ));

    controller.generate_p1(&id).await.unwrap();

    // Refine requires a verdict first.
    assert!(matches!(
        controller.refine(&id).await,
        Err(Error::TerminalSession {
            stage: Stage::P1Generated,
            operation: "refine",
        })
    ));

    controller.evaluate(&id).await.unwrap();
    controller.refine(&id).await.unwrap();
    controller.complete(&id).unwrap();

    // Completed is terminal for every transition, edits included.
    assert!(matches!(
        controller.generate_p1(&id).await,
        Err(Error::TerminalSession { .. })
    ));
    assert!(matches!(
        controller.user_update(&id, "manual text"),
        Err(Error::TerminalSession {
            stage: Stage::Completed,
            operation: "user_update",
        })
    ));
}

#[tokio::test]
async fn test_failed_transition_leaves_session_unchanged() {
    let mut controller = SessionController::with_config(
        FailingBackend::new("connection reset"),
        ControllerConfig {
            retry: RetryPolicy::new(2, Duration::from_millis(1)),
            ..ControllerConfig::default()
        },
    );
    let id = controller.create("general", "anything at all", None);

    let err = controller.generate_p1(&id).await.unwrap_err();
    assert!(matches!(err, Error::Transport(_)));

    let session = controller.get_status(&id).unwrap();
    assert_eq!(session.stage, Stage::Created);
    assert!(session.p1_prompt.is_none());
    assert_eq!(session.retries.generate, 1);
    assert!(session.last_error.as_deref().unwrap().contains("connection reset"));
    assert_eq!(session.error_stage, Some(Stage::Created));

    // The transition stays re-triggerable after a failure.
    let err = controller.generate_p1(&id).await.unwrap_err();
    assert!(matches!(err, Error::Transport(_)));
    assert_eq!(controller.get_status(&id).unwrap().retries.generate, 2);
}

/// Backend whose generate fails transiently before succeeding, to
/// exercise in-transition retry.
struct FlakyBackend {
    calls: AtomicU32,
    failures: u32,
}

impl FlakyBackend {
    fn new(failures: u32) -> Self {
        Self {
            calls: AtomicU32::new(0),
            failures,
        }
    }
}

impl Backend for FlakyBackend {
    type GenerateFut<'a>
        = std::future::Ready<jebi::Result<String>>
    where
        Self: 'a;
    type JudgeFut<'a>
        = std::future::Ready<jebi::Result<Value>>
    where
        Self: 'a;
    type RefineFut<'a>
        = std::future::Ready<jebi::Result<String>>
    where
        Self: 'a;

    fn generate<'a>(
        &'a self,
        _task_type: &'a str,
        raw_request: &'a str,
        _model: Option<&'a ModelInfo>,
    ) -> Self::GenerateFut<'a> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if n < self.failures {
            std::future::ready(Err(Error::transport("HTTP 503")))
        } else {
            std::future::ready(Ok(format!(
                "<prompt_to_copy>\nDraft for: {raw_request}\n</prompt_to_copy>"
            )))
        }
    }

    fn judge<'a>(&'a self, _current_prompt: &'a str, _raw_request: &'a str) -> Self::JudgeFut<'a> {
        std::future::ready(Ok(json!({"scores": {"clarity": 7}})))
    }

    fn refine<'a>(
        &'a self,
        _current_prompt: &'a str,
        _evaluation: &'a Value,
    ) -> Self::RefineFut<'a> {
        std::future::ready(Ok("<prompt_to_copy>\nrefined draft text\n</prompt_to_copy>".into()))
    }
}

#[tokio::test]
async fn test_transient_failures_are_retried_within_transition() {
    let mut controller = SessionController::with_config(
        FlakyBackend::new(2),
        ControllerConfig {
            retry: RetryPolicy::new(3, Duration::from_millis(1)),
            ..ControllerConfig::default()
        },
    );
    let id = controller.create("general", "summarize this article", None);

    // Two 503s are absorbed by the retry budget; the caller only sees success.
    let p1 = controller.generate_p1(&id).await.unwrap();
    assert_eq!(p1, "Draft for: summarize this article");

    let session = controller.get_status(&id).unwrap();
    assert_eq!(session.stage, Stage::P1Generated);
    assert_eq!(session.retries.generate, 0);
    assert!(session.last_error.is_none());
}

#[tokio::test]
async fn test_retry_budget_exhaustion_surfaces_last_error() {
    let mut controller = SessionController::with_config(
        FlakyBackend::new(5),
        ControllerConfig {
            retry: RetryPolicy::new(3, Duration::from_millis(1)),
            ..ControllerConfig::default()
        },
    );
    let id = controller.create("general", "summarize this article", None);

    let err = controller.generate_p1(&id).await.unwrap_err();
    assert!(matches!(err, Error::Transport(_)));
    assert_eq!(controller.get_status(&id).unwrap().stage, Stage::Created);
}

#[tokio::test]
async fn test_user_update_rewraps_artifact() {
    let mut controller = SessionController::new(scripted_backend());
    let id = controller.create("writing", "write a short story about a fox", None);
    controller.generate_p1(&id).await.unwrap();

    controller
        .user_update(&id, "You are a poet. Write about a fox.")
        .unwrap();

    let session = controller.get_status(&id).unwrap();
    // Stage is untouched and surrounding commentary survives the edit.
    assert_eq!(session.stage, Stage::P1Generated);
    let raw = session.p1_prompt.as_deref().unwrap();
    assert!(raw.contains("Here is the prompt:"));
    assert!(raw.contains("改进说明：added a role"));
    assert!(raw.contains("You are a poet. Write about a fox."));
    assert!(!raw.contains("You are a novelist."));
    assert_eq!(session.edits.len(), 1);
    assert_eq!(session.edits[0].stage, Stage::P1Generated);
    assert!(session.edits[0].stats.has_changes());

    // The edited body is what later transitions operate on.
    controller.evaluate(&id).await.unwrap();
    controller.refine(&id).await.unwrap();
    let final_prompt = controller.complete(&id).unwrap();
    assert!(final_prompt.contains("You are a poet."));
}

#[tokio::test]
async fn test_user_update_in_created_replaces_request() {
    let mut controller = SessionController::new(scripted_backend());
    let id = controller.create("writing", "first request", None);

    controller.user_update(&id, "second request").unwrap();
    assert_eq!(controller.get_status(&id).unwrap().raw_request, "second request");

    let p1 = controller.generate_p1(&id).await.unwrap();
    assert!(p1.contains("second request"));
}

#[tokio::test]
async fn test_evaluate_refine_loop_accumulates_rounds() {
    let mut controller = SessionController::new(scripted_backend());
    let id = controller.create("writing", "write a short story", None);
    controller.generate_p1(&id).await.unwrap();

    for _ in 0..3 {
        controller.evaluate(&id).await.unwrap();
        controller.refine(&id).await.unwrap();
    }

    let session = controller.get_status(&id).unwrap();
    assert_eq!(session.stage, Stage::Refined);
    assert_eq!(session.evaluations.len(), 3);
    assert_eq!(session.refined_prompts.len(), 3);
    assert_eq!(session.rounds().len(), 4);

    let summaries = controller.summaries();
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].rounds, 4);
    assert_eq!(summaries[0].last_overall_score, Some(3.8));
}

#[tokio::test]
async fn test_complete_requires_refined() {
    let mut controller = SessionController::new(scripted_backend());
    let id = controller.create("writing", "write a short story about a fox", None);
    controller.generate_p1(&id).await.unwrap();

    assert!(matches!(
        controller.complete(&id),
        Err(Error::TerminalSession {
            stage: Stage::P1Generated,
            operation: "complete",
        })
    ));

    controller.evaluate(&id).await.unwrap();
    assert!(matches!(
        controller.complete(&id),
        Err(Error::TerminalSession {
            stage: Stage::Evaluated,
            operation: "complete",
        })
    ));

    controller.refine(&id).await.unwrap();
    let final_prompt = controller.complete(&id).unwrap();
    assert!(final_prompt.contains("You are a novelist."));
    assert_eq!(controller.get_status(&id).unwrap().stage, Stage::Completed);
}

#[tokio::test]
async fn test_short_refined_artifact_is_rejected() {
    let backend = scripted_backend().on_refine(|_prompt, _evaluation| {
        "<prompt_to_copy>\nx\n</prompt_to_copy>".to_string()
    });
    let mut controller = SessionController::new(backend);
    let id = controller.create("writing", "write a short story about a fox", None);
    controller.generate_p1(&id).await.unwrap();
    controller.evaluate(&id).await.unwrap();

    let err = controller.refine(&id).await.unwrap_err();
    assert!(matches!(err, Error::MalformedArtifact(_)));
    assert_eq!(controller.get_status(&id).unwrap().stage, Stage::Evaluated);
    assert_eq!(controller.get_status(&id).unwrap().retries.refine, 1);
}

#[tokio::test]
async fn test_complete_falls_back_to_first_draft() {
    let mut controller = SessionController::new(scripted_backend());
    let id = controller.create("writing", "write a short story about a fox", None);
    controller.generate_p1(&id).await.unwrap();
    controller.evaluate(&id).await.unwrap();
    controller.refine(&id).await.unwrap();

    // A manual edit leaves the refined artifact unusably short; the
    // final payload then comes from the first draft instead.
    controller.user_update(&id, "x").unwrap();

    let final_prompt = controller.complete(&id).unwrap();
    assert!(final_prompt.contains("You are a novelist."));
    assert_eq!(controller.get_status(&id).unwrap().stage, Stage::Completed);
}
