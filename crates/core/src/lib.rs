//! # HRA Core
//!
//! Core engine for the health risk assessment system.
//!
//! This crate contains the pure scoring pipeline and the draft workflow state
//! machine:
//! - Domain catalog with per-domain questions and flag triggers
//! - Domain scoring and overall risk aggregation
//! - Recommendation generation with priorities and due dates
//! - Resumable draft workflow with snapshot persistence
//! - Trend computation over completed assessments
//!
//! **No transport or UI concerns**: HTTP/gRPC servers, report rendering and
//! chart rendering belong to the callers of this crate. Persistence is
//! consumed through the [`store::DraftStore`] trait; the durable
//! implementation lives in the `hra-store` crate.

pub mod catalog;
pub mod config;
pub mod error;
pub mod flags;
pub mod recommend;
pub mod scoring;
pub mod store;
pub mod trend;
pub mod workflow;

pub use catalog::Catalog;
pub use config::CoreConfig;
pub use error::{EngineError, EngineResult};
pub use recommend::{Category, Priority, Recommendation};
pub use scoring::{AnswerMap, Assessment, DomainResult, RiskLevel};
pub use store::{CompletedAssessment, DraftSession, DraftStatus, DraftStore, StoreError};
pub use trend::{DomainDelta, DomainSeries, Trend};
pub use workflow::{
    CompleteOutcome, DraftWorkflow, NextOutcome, ResumePrompt, WorkflowStart, WorkflowState,
};
