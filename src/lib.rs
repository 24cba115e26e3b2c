// Copyright © 2025 lituus-io <spicyzhug@gmail.com>
// All Rights Reserved.
// Licensed under PolyForm Noncommercial 1.0.0

//! # Jebi - Iterative Prompt Refinement Sessions
//!
//! Embeddable engine for driving a user request through generate,
//! evaluate and refine rounds against a language model backend, with
//! robust extraction of copyable prompt bodies from noisy model output.
//!
//! ## Architecture
//!
//! - **Session state machine**: linear stages with explicit gating;
//!   failed transitions never mutate the session
//! - **GATs**: Generic Associated Types for zero-cost async without boxing
//! - **Tolerant parsing**: evaluator payloads of any known shape are
//!   normalized, never rejected; artifact extraction is zero-copy
//!
//! ## Quick Start
//!
//! ```
//! use jebi::{MockBackend, SessionController};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> jebi::Result<()> {
//! let mut controller = SessionController::new(MockBackend::new());
//! let id = controller.create("general", "write a short story about a fox", None);
//!
//! controller.generate_p1(&id).await?;
//! let report = controller.evaluate(&id).await?;
//! if report.overall_score < 9.0 {
//!     controller.refine(&id).await?;
//! }
//! let final_prompt = controller.complete(&id)?;
//! assert!(!final_prompt.contains("<prompt_to_copy>"));
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![allow(clippy::new_ret_no_self)]
#![allow(clippy::type_complexity)]

pub mod diff;
pub mod error;
pub mod extract;
pub mod normalize;
pub mod session;

pub use diff::{line_diff, word_diff, DiffPart, DiffRenderer, DiffStats, RenderMode};
pub use error::{Error, Result};
pub use extract::{extract, Extractor};
pub use normalize::{Criterion, NormalizedReport, Normalizer, ReportShape, Risk, RiskLevel};
pub use session::{
    attempt, poll_ready, Backend, ControllerConfig, EvaluationRecord, FailingBackend, MockBackend,
    ModelInfo, RetryCounters, RetryPolicy, Round, Session, SessionController, SessionSummary,
    Stage, UserEdit,
};
