//! Research engine for health-influencer trust scoring.
//!
//! The pipeline runs four stages per subject: gather public content,
//! extract health claims, verify each claim against scientific
//! literature, and aggregate a recency-weighted trust score. Completed
//! snapshots are cached per subject key; in-flight jobs are
//! deduplicated so identical submissions share one pipeline run.

pub mod aggregator;
pub mod cache;
pub mod discovery;
pub mod extractor;
pub mod gateway;
pub mod job;
pub mod orchestrator;
pub mod service;
pub mod traits;
pub mod util;
pub mod verifier;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

#[cfg(test)]
mod pipeline_tests;

pub use job::JobStatus;
pub use orchestrator::SubmitOutcome;
pub use service::{InfluencerLookup, ResearchService};
