// Copyright © 2025 lituus-io <spicyzhug@gmail.com>
// All Rights Reserved.
// Licensed under PolyForm Noncommercial 1.0.0

//! Refinement session state machine.
//!
//! A session carries one user request through a linear pipeline of
//! model-produced artifacts:
//!
//! ```text
//! created -> p1_generated -> evaluated -> refined -> completed
//!                               ^            |
//!                               +------------+
//! ```
//!
//! Evaluate/refine may loop any number of times before completion, and
//! any stage can drop to [`Stage::Error`] via [`SessionController::abort`].
//! Transitions mutate the session only after the backend call and all
//! shape checks succeed, so a failed or cancelled transition leaves the
//! session exactly as it was.

mod backend;
mod retry;

pub use backend::{Backend, FailingBackend, MockBackend, ModelInfo};
pub use retry::{attempt, poll_ready, RetryPolicy, DEFAULT_ATTEMPTS, DEFAULT_DELAY};

use crate::diff::DiffStats;
use crate::error::{Error, Result};
use crate::extract::Extractor;
use crate::normalize::{NormalizedReport, Normalizer, ReportShape};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

/// Lifecycle stage of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Session exists; no artifact yet.
    Created,
    /// First-draft prompt produced.
    P1Generated,
    /// Current prompt has been judged.
    Evaluated,
    /// A refined prompt supersedes the judged one.
    Refined,
    /// Final artifact extracted; terminal.
    Completed,
    /// Aborted or irrecoverably failed; terminal.
    Error,
}

impl Stage {
    /// Whether no further transitions are permitted.
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }

    /// Stable wire name, matching the serde representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::P1Generated => "p1_generated",
            Self::Evaluated => "evaluated",
            Self::Refined => "refined",
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One stored judge verdict: the raw payload plus its normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRecord {
    /// When the verdict was stored.
    pub at: DateTime<Utc>,
    /// Raw judge payload, unmodified.
    pub raw: Value,
    /// Canonical form of the payload.
    pub report: NormalizedReport,
}

/// One manual edit applied through [`SessionController::user_update`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserEdit {
    /// When the edit was applied.
    pub at: DateTime<Utc>,
    /// Stage the session was in; edits never change the stage.
    pub stage: Stage,
    /// Line-level change size of the edit.
    pub stats: DiffStats,
}

/// Per-transition retry counters, cumulative over the session's life.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryCounters {
    /// Failed `generate_p1` transitions.
    pub generate: u32,
    /// Failed `evaluate` transitions.
    pub evaluate: u32,
    /// Failed `refine` transitions.
    pub refine: u32,
}

/// A refinement session and its full artifact history.
///
/// Serializable as a self-contained snapshot; raw model outputs are kept
/// verbatim so artifacts can be re-extracted after a format change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Unique session id, `sess_<hex12>_<unix_secs>`.
    pub id: String,
    /// Task category hint passed to the backend.
    pub task_type: String,
    /// The user's original request, as last edited.
    pub raw_request: String,
    /// Model override for this session's calls.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<ModelInfo>,
    /// Current lifecycle stage.
    pub stage: Stage,
    /// Raw first-draft output, sentinels and commentary included.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub p1_prompt: Option<String>,
    /// Raw refined outputs, oldest first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub refined_prompts: Vec<String>,
    /// Judge verdicts, oldest first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub evaluations: Vec<EvaluationRecord>,
    /// Extracted final artifact, set on completion.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_prompt: Option<String>,
    /// Manual edits, oldest first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub edits: Vec<UserEdit>,
    /// Cumulative failed-transition counters.
    #[serde(default)]
    pub retries: RetryCounters,
    /// Message of the most recent transition failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// Stage the session was in when `last_error` occurred.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_stage: Option<Stage>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last mutation time.
    pub updated_at: DateTime<Utc>,
}

impl Session {
    fn new(
        id: String,
        task_type: impl Into<String>,
        raw_request: impl Into<String>,
        model: Option<ModelInfo>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            task_type: task_type.into(),
            raw_request: raw_request.into(),
            model,
            stage: Stage::Created,
            p1_prompt: None,
            refined_prompts: Vec::new(),
            evaluations: Vec::new(),
            final_prompt: None,
            edits: Vec::new(),
            retries: RetryCounters::default(),
            last_error: None,
            error_stage: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// The raw output currently representing the prompt: the latest
    /// refined output, or the first draft before any refinement.
    pub fn current_artifact(&self) -> Option<&str> {
        self.refined_prompts
            .last()
            .or(self.p1_prompt.as_ref())
            .map(String::as_str)
    }

    /// Most recent judge verdict.
    pub fn latest_evaluation(&self) -> Option<&EvaluationRecord> {
        self.evaluations.last()
    }

    /// Pair up artifacts and verdicts into refinement rounds.
    ///
    /// Round 1 starts at the first draft; each verdict closes the round
    /// it judged, and the refined output that answered it opens the next.
    pub fn rounds(&self) -> Vec<Round<'_>> {
        let Some(p1) = self.p1_prompt.as_deref() else {
            return Vec::new();
        };
        let mut befores = vec![p1];
        befores.extend(self.refined_prompts.iter().map(String::as_str));

        befores
            .into_iter()
            .enumerate()
            .map(|(i, before)| Round {
                step_number: (i + 1) as u32,
                prompt_before: before,
                evaluation: self.evaluations.get(i).map(|record| &record.report),
                prompt_after: self.refined_prompts.get(i).map(String::as_str),
            })
            .collect()
    }

    /// Condensed view for listings.
    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            id: self.id.clone(),
            task_type: self.task_type.clone(),
            stage: self.stage,
            rounds: self.rounds().len(),
            last_overall_score: self.latest_evaluation().map(|r| r.report.overall_score),
            updated_at: self.updated_at,
        }
    }

    fn record_error(&mut self, err: &Error) {
        self.last_error = Some(err.to_string());
        self.error_stage = Some(self.stage);
        self.updated_at = Utc::now();
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// One refinement round, borrowed from a [`Session`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Round<'a> {
    /// 1-based round number.
    pub step_number: u32,
    /// Raw artifact the round started from.
    pub prompt_before: &'a str,
    /// Verdict on `prompt_before`, if the round was judged.
    pub evaluation: Option<&'a NormalizedReport>,
    /// Raw refined artifact, if the round was answered.
    pub prompt_after: Option<&'a str>,
}

/// Condensed session view for listings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    /// Session id.
    pub id: String,
    /// Task category hint.
    pub task_type: String,
    /// Current stage.
    pub stage: Stage,
    /// Number of started refinement rounds.
    pub rounds: usize,
    /// Overall score from the latest verdict.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_overall_score: Option<f64>,
    /// Last mutation time.
    pub updated_at: DateTime<Utc>,
}

/// Tunables for a [`SessionController`].
#[derive(Debug, Clone, Copy)]
pub struct ControllerConfig {
    /// Minimum character count an extracted artifact must have.
    /// Anything shorter is treated as a malformed backend response.
    pub min_artifact_len: usize,
    /// Retry policy applied to every backend call.
    pub retry: RetryPolicy,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            min_artifact_len: 8,
            retry: RetryPolicy::default(),
        }
    }
}

/// Drives sessions through their lifecycle against a [`Backend`].
///
/// The controller owns its sessions; callers refer to them by id. All
/// methods uphold the mutate-after-success rule: a transition that
/// returns an error has recorded the failure on the session but left
/// its stage and artifacts untouched.
pub struct SessionController<B: Backend> {
    backend: B,
    extractor: Extractor,
    normalizer: Normalizer,
    config: ControllerConfig,
    sessions: HashMap<String, Session>,
}

impl<B: Backend> SessionController<B> {
    /// Create a controller with default config.
    pub fn new(backend: B) -> Self {
        Self::with_config(backend, ControllerConfig::default())
    }

    /// Create a controller with explicit config.
    pub fn with_config(backend: B, config: ControllerConfig) -> Self {
        Self {
            backend,
            extractor: Extractor::default(),
            normalizer: Normalizer::new(),
            config,
            sessions: HashMap::new(),
        }
    }

    /// Create a session in [`Stage::Created`] and return its id.
    pub fn create(
        &mut self,
        task_type: impl Into<String>,
        raw_request: impl Into<String>,
        model: Option<ModelInfo>,
    ) -> String {
        let id = mint_session_id();
        let session = Session::new(id.clone(), task_type, raw_request, model);
        tracing::info!(session = %id, "session created");
        self.sessions.insert(id.clone(), session);
        id
    }

    /// Look up a session by id.
    pub fn get_status(&self, id: &str) -> Result<&Session> {
        self.sessions
            .get(id)
            .ok_or_else(|| Error::UnknownSession(id.to_string()))
    }

    /// Summaries of all sessions, most recently updated first.
    /// Timestamp ties break on id so the order is stable across calls.
    pub fn summaries(&self) -> Vec<SessionSummary> {
        let mut all: Vec<SessionSummary> = self.sessions.values().map(Session::summary).collect();
        all.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then_with(|| a.id.cmp(&b.id)));
        all
    }

    /// Produce the first-draft prompt. `created -> p1_generated`.
    ///
    /// Returns the extracted copyable body.
    pub async fn generate_p1(&mut self, id: &str) -> Result<String> {
        let session = require_stage(&self.sessions, id, &[Stage::Created], "generate_p1")?;
        let task_type = session.task_type.clone();
        let raw_request = session.raw_request.clone();
        let model = session.model.clone();

        let backend = &self.backend;
        let result = attempt(self.config.retry, || {
            backend.generate(&task_type, &raw_request, model.as_ref())
        })
        .await
        .and_then(|raw| {
            self.check_artifact(&raw)?;
            Ok(raw)
        });

        let session = self.sessions.get_mut(id).expect("checked above");
        match result {
            Ok(raw) => {
                let body = self.extractor.extract(&raw).to_string();
                tracing::info!(session = %id, chars = body.chars().count(), "first draft generated");
                session.p1_prompt = Some(raw);
                session.stage = Stage::P1Generated;
                session.touch();
                Ok(body)
            }
            Err(err) => {
                tracing::warn!(session = %id, error = %err, "generate_p1 failed");
                session.retries.generate += 1;
                session.record_error(&err);
                Err(err)
            }
        }
    }

    /// Judge the current prompt. `p1_generated | refined -> evaluated`.
    ///
    /// Never fails on report shape: unrecognized payloads degrade to a
    /// zero-valued report and are logged.
    pub async fn evaluate(&mut self, id: &str) -> Result<NormalizedReport> {
        let session = require_stage(
            &self.sessions,
            id,
            &[Stage::P1Generated, Stage::Refined],
            "evaluate",
        )?;
        let raw_request = session.raw_request.clone();
        let current = session
            .current_artifact()
            .ok_or_else(|| Error::other("no artifact to evaluate"))?;
        let current_prompt = self.extractor.extract(current).to_string();

        let backend = &self.backend;
        let result = attempt(self.config.retry, || {
            backend.judge(&current_prompt, &raw_request)
        })
        .await;

        let session = self.sessions.get_mut(id).expect("checked above");
        match result {
            Ok(raw) => {
                let report = self.normalizer.normalize(&raw);
                match report.shape {
                    ReportShape::FreeText | ReportShape::Generic => {
                        tracing::warn!(session = %id, shape = ?report.shape, "evaluation parsed via fallback shape");
                    }
                    ReportShape::Empty => {
                        tracing::warn!(session = %id, "evaluation unparseable, stored as empty report");
                    }
                    _ => {}
                }
                tracing::info!(session = %id, score = report.overall_score, "evaluation stored");
                session.evaluations.push(EvaluationRecord {
                    at: Utc::now(),
                    raw,
                    report: report.clone(),
                });
                session.stage = Stage::Evaluated;
                session.touch();
                Ok(report)
            }
            Err(err) => {
                tracing::warn!(session = %id, error = %err, "evaluate failed");
                session.retries.evaluate += 1;
                session.record_error(&err);
                Err(err)
            }
        }
    }

    /// Rewrite the current prompt from the latest verdict.
    /// `evaluated -> refined`.
    ///
    /// Returns the extracted copyable body of the refined prompt.
    pub async fn refine(&mut self, id: &str) -> Result<String> {
        let session = require_stage(&self.sessions, id, &[Stage::Evaluated], "refine")?;
        let current = session
            .current_artifact()
            .ok_or_else(|| Error::other("no artifact to refine"))?;
        let current_prompt = self.extractor.extract(current).to_string();
        let evaluation = session
            .latest_evaluation()
            .map(|record| record.raw.clone())
            .ok_or_else(|| Error::other("no evaluation to refine from"))?;

        let backend = &self.backend;
        let result = attempt(self.config.retry, || {
            backend.refine(&current_prompt, &evaluation)
        })
        .await
        .and_then(|raw| {
            self.check_artifact(&raw)?;
            Ok(raw)
        });

        let session = self.sessions.get_mut(id).expect("checked above");
        match result {
            Ok(raw) => {
                let body = self.extractor.extract(&raw).to_string();
                tracing::info!(session = %id, round = session.refined_prompts.len() + 1, "prompt refined");
                session.refined_prompts.push(raw);
                session.stage = Stage::Refined;
                session.touch();
                Ok(body)
            }
            Err(err) => {
                tracing::warn!(session = %id, error = %err, "refine failed");
                session.retries.refine += 1;
                session.record_error(&err);
                Err(err)
            }
        }
    }

    /// Apply a manual edit to the artifact the session currently
    /// carries. The stage never changes.
    ///
    /// In [`Stage::Created`] the edit replaces the raw request. In any
    /// later non-terminal stage the replacement body is rewrapped into
    /// the current raw artifact, preserving surrounding commentary.
    pub fn user_update(&mut self, id: &str, replacement: &str) -> Result<()> {
        let session = self
            .sessions
            .get_mut(id)
            .ok_or_else(|| Error::UnknownSession(id.to_string()))?;
        if session.stage.is_terminal() {
            return Err(Error::TerminalSession {
                stage: session.stage,
                operation: "user_update",
            });
        }

        let stats = match session.stage {
            Stage::Created => {
                let stats = DiffStats::from_parts(&crate::diff::line_diff(
                    &session.raw_request,
                    replacement,
                ));
                session.raw_request = replacement.to_string();
                stats
            }
            _ => {
                let current = session
                    .current_artifact()
                    .ok_or_else(|| Error::other("no artifact to edit"))?;
                let updated = self.extractor.rewrap(current, replacement);
                let stats = DiffStats::from_parts(&crate::diff::line_diff(current, &updated));
                if let Some(last) = session.refined_prompts.last_mut() {
                    *last = updated;
                } else {
                    session.p1_prompt = Some(updated);
                }
                stats
            }
        };

        tracing::info!(session = %id, changes = %stats.compact(), "user edit applied");
        session.edits.push(UserEdit {
            at: Utc::now(),
            stage: session.stage,
            stats,
        });
        session.touch();
        Ok(())
    }

    /// Extract the final artifact and close the session.
    /// `refined -> completed`.
    ///
    /// The final payload comes from the latest refined output, falling
    /// back to the first draft if its extraction is unusable.
    pub fn complete(&mut self, id: &str) -> Result<String> {
        let session = require_stage(&self.sessions, id, &[Stage::Refined], "complete")?;
        let body = session
            .refined_prompts
            .last()
            .into_iter()
            .chain(session.p1_prompt.as_ref())
            .map(|raw| self.extractor.extract(raw))
            .find(|body| body.chars().count() >= self.config.min_artifact_len)
            .map(str::to_string);
        let Some(body) = body else {
            let err = Error::malformed("no artifact yields a usable final payload");
            self.sessions
                .get_mut(id)
                .expect("checked above")
                .record_error(&err);
            return Err(err);
        };

        let session = self.sessions.get_mut(id).expect("checked above");
        tracing::info!(session = %id, rounds = session.rounds().len(), "session completed");
        session.final_prompt = Some(body.clone());
        session.stage = Stage::Completed;
        session.touch();
        Ok(body)
    }

    /// Drop a session into [`Stage::Error`] from any non-terminal stage.
    pub fn abort(&mut self, id: &str, reason: impl Into<String>) -> Result<()> {
        let session = self
            .sessions
            .get_mut(id)
            .ok_or_else(|| Error::UnknownSession(id.to_string()))?;
        if session.stage.is_terminal() {
            return Err(Error::TerminalSession {
                stage: session.stage,
                operation: "abort",
            });
        }
        let reason = reason.into();
        tracing::info!(session = %id, %reason, "session aborted");
        session.record_error(&Error::other(reason));
        session.stage = Stage::Error;
        session.touch();
        Ok(())
    }

    fn check_artifact(&self, raw: &str) -> Result<()> {
        let body = self.extractor.extract(raw);
        let chars = body.chars().count();
        if chars < self.config.min_artifact_len {
            return Err(Error::malformed(format!(
                "extracted artifact too short: {chars} chars"
            )));
        }
        Ok(())
    }
}

fn require_stage<'a>(
    sessions: &'a HashMap<String, Session>,
    id: &str,
    allowed: &[Stage],
    operation: &'static str,
) -> Result<&'a Session> {
    let session = sessions
        .get(id)
        .ok_or_else(|| Error::UnknownSession(id.to_string()))?;
    if !allowed.contains(&session.stage) {
        return Err(Error::TerminalSession {
            stage: session.stage,
            operation,
        });
    }
    Ok(session)
}

fn mint_session_id() -> String {
    let uuid = Uuid::new_v4().simple().to_string();
    format!("sess_{}_{}", &uuid[..12], Utc::now().timestamp())
}
