// Copyright © 2025 lituus-io <spicyzhug@gmail.com>
// All Rights Reserved.
// Licensed under PolyForm Noncommercial 1.0.0

//! Backend trait using Generic Associated Types (GATs).
//!
//! This module provides the [`Backend`] trait which defines the three
//! model-facing calls of a refinement session. Using GATs instead of
//! `async_trait` allows zero-cost async without boxing.
//!
//! # Examples
//!
//! ```
//! use jebi::{Backend, MockBackend};
//!
//! // Create a mock backend for testing
//! let backend = MockBackend::new()
//!     .on_generate(|_task, request| format!("<prompt_to_copy>\n{request}\n</prompt_to_copy>"));
//! ```

use crate::error::Result;
use serde_json::Value;
use std::future::Future;

/// Identity of the model serving a session's calls.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ModelInfo {
    /// Model identifier, e.g. "gemini-2.5-flash".
    pub model: String,
    /// Provider name, e.g. "google".
    pub provider: String,
}

impl ModelInfo {
    /// Create a model descriptor.
    pub fn new(model: impl Into<String>, provider: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            provider: provider.into(),
        }
    }
}

/// Trait for the external model service behind a session.
///
/// This trait uses GATs for zero-cost async without boxing.
/// Implementations can be synchronous (returning `Ready<T>`) or
/// asynchronous (returning custom futures).
///
/// All three calls return raw, unprocessed model output; extraction and
/// normalization happen in the session layer.
pub trait Backend: Send + Sync {
    /// The future type returned by `generate()`.
    type GenerateFut<'a>: Future<Output = Result<String>> + Send + 'a
    where
        Self: 'a;

    /// The future type returned by `judge()`.
    type JudgeFut<'a>: Future<Output = Result<Value>> + Send + 'a
    where
        Self: 'a;

    /// The future type returned by `refine()`.
    type RefineFut<'a>: Future<Output = Result<String>> + Send + 'a
    where
        Self: 'a;

    /// Produce a first-draft prompt from the user's raw request.
    ///
    /// # Arguments
    ///
    /// * `task_type` - Task category hint, e.g. "general" or "coding"
    /// * `raw_request` - The user's unmodified request text
    /// * `model` - Optional model override for this call
    fn generate<'a>(
        &'a self,
        task_type: &'a str,
        raw_request: &'a str,
        model: Option<&'a ModelInfo>,
    ) -> Self::GenerateFut<'a>;

    /// Score the current prompt against the original request.
    ///
    /// The returned value is the judge's payload as-is; any of the
    /// schemas understood by the normalizer may come back.
    fn judge<'a>(&'a self, current_prompt: &'a str, raw_request: &'a str) -> Self::JudgeFut<'a>;

    /// Rewrite the current prompt guided by an evaluation payload.
    fn refine<'a>(&'a self, current_prompt: &'a str, evaluation: &'a Value)
        -> Self::RefineFut<'a>;

    /// Model identity for logging and session metadata.
    fn model_info(&self) -> ModelInfo {
        ModelInfo::new("unknown", "unknown")
    }
}

type GenerateFn = Box<dyn Fn(&str, &str) -> String + Send + Sync>;
type JudgeFn = Box<dyn Fn(&str, &str) -> Value + Send + Sync>;
type RefineFn = Box<dyn Fn(&str, &Value) -> String + Send + Sync>;

/// A mock backend for testing and examples.
///
/// Each call is served by a closure returning synchronously. Defaults
/// echo the input wrapped in copy sentinels and score everything 8/10.
pub struct MockBackend {
    generate: GenerateFn,
    judge: JudgeFn,
    refine: RefineFn,
    model: ModelInfo,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBackend {
    /// Create a mock backend with echo defaults.
    pub fn new() -> Self {
        Self {
            generate: Box::new(|_task, request| {
                format!("<prompt_to_copy>\nYou are an assistant. {request}\n</prompt_to_copy>")
            }),
            judge: Box::new(|_prompt, _request| {
                serde_json::json!({"scores": {"clarity": 8, "fidelity": 8}})
            }),
            refine: Box::new(|prompt, _evaluation| {
                format!("<prompt_to_copy>\n{}\nBe concise.\n</prompt_to_copy>", crate::extract::extract(prompt))
            }),
            model: ModelInfo::new("mock", "mock"),
        }
    }

    /// Replace the generate closure.
    pub fn on_generate<F>(mut self, f: F) -> Self
    where
        F: Fn(&str, &str) -> String + Send + Sync + 'static,
    {
        self.generate = Box::new(f);
        self
    }

    /// Replace the judge closure.
    pub fn on_judge<F>(mut self, f: F) -> Self
    where
        F: Fn(&str, &str) -> Value + Send + Sync + 'static,
    {
        self.judge = Box::new(f);
        self
    }

    /// Replace the refine closure.
    pub fn on_refine<F>(mut self, f: F) -> Self
    where
        F: Fn(&str, &Value) -> String + Send + Sync + 'static,
    {
        self.refine = Box::new(f);
        self
    }

    /// Set the reported model identity.
    pub fn with_model(mut self, model: ModelInfo) -> Self {
        self.model = model;
        self
    }
}

impl Backend for MockBackend {
    type GenerateFut<'a>
        = std::future::Ready<Result<String>>
    where
        Self: 'a;
    type JudgeFut<'a>
        = std::future::Ready<Result<Value>>
    where
        Self: 'a;
    type RefineFut<'a>
        = std::future::Ready<Result<String>>
    where
        Self: 'a;

    fn generate<'a>(
        &'a self,
        task_type: &'a str,
        raw_request: &'a str,
        _model: Option<&'a ModelInfo>,
    ) -> Self::GenerateFut<'a> {
        std::future::ready(Ok((self.generate)(task_type, raw_request)))
    }

    fn judge<'a>(&'a self, current_prompt: &'a str, raw_request: &'a str) -> Self::JudgeFut<'a> {
        std::future::ready(Ok((self.judge)(current_prompt, raw_request)))
    }

    fn refine<'a>(
        &'a self,
        current_prompt: &'a str,
        evaluation: &'a Value,
    ) -> Self::RefineFut<'a> {
        std::future::ready(Ok((self.refine)(current_prompt, evaluation)))
    }

    fn model_info(&self) -> ModelInfo {
        self.model.clone()
    }
}

/// A backend that fails every call with a transport error.
///
/// Useful for testing error handling in session transitions.
#[derive(Debug, Clone)]
pub struct FailingBackend {
    message: String,
}

impl FailingBackend {
    /// Create a failing backend with the given error message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl Backend for FailingBackend {
    type GenerateFut<'a>
        = std::future::Ready<Result<String>>
    where
        Self: 'a;
    type JudgeFut<'a>
        = std::future::Ready<Result<Value>>
    where
        Self: 'a;
    type RefineFut<'a>
        = std::future::Ready<Result<String>>
    where
        Self: 'a;

    fn generate<'a>(
        &'a self,
        _task_type: &'a str,
        _raw_request: &'a str,
        _model: Option<&'a ModelInfo>,
    ) -> Self::GenerateFut<'a> {
        std::future::ready(Err(crate::error::Error::transport(self.message.clone())))
    }

    fn judge<'a>(&'a self, _current_prompt: &'a str, _raw_request: &'a str) -> Self::JudgeFut<'a> {
        std::future::ready(Err(crate::error::Error::transport(self.message.clone())))
    }

    fn refine<'a>(
        &'a self,
        _current_prompt: &'a str,
        _evaluation: &'a Value,
    ) -> Self::RefineFut<'a> {
        std::future::ready(Err(crate::error::Error::transport(self.message.clone())))
    }
}
