//! Core data model.
//!
//! A batch groups markups (raw units awaiting a label) under one priority and
//! overlap setting. Assessors answer markups; each answer is an assessment.

pub mod assessment;
pub mod batch;
pub mod identity;

pub use assessment::{
    Assessment, AssessmentField, AssessmentFilters, AssessmentId, UserId, UserStats,
};
pub use batch::{
    Batch, BatchId, BatchSettings, BatchStats, Markup, MarkupId, MarkupStatus, MarkupTypeField,
    MarkupTypeFieldId, MarkupView, NewBatch,
};
pub use identity::Identity;
