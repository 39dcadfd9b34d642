//! ClipSync Application Orchestration Layer
//!
//! This crate contains the synchronization engine: upload pipeline,
//! reconciliation cache, and the lifecycle supervisor that re-establishes
//! session, subscription and pending flushes on every (re)start.

pub mod context;
pub mod deps;
pub mod lifecycle;
pub mod sync;
pub mod usecases;

pub use context::SyncContext;
pub use deps::SyncDeps;
pub use lifecycle::{FlushReport, InitOutcome, LifecycleSupervisor};
pub use usecases::{
    CaptureEvent, CaptureOutcome, CaptureSource, ItemCache, MessageRouter, UploadOptions,
    UploadPipeline,
};
