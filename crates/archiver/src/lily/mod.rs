//! Lily node API
//!
//! The archiver uses two calls on the node: submit a walk and list jobs.
//! Connections are short-lived: every attempt asks the [`Connector`] for a
//! fresh [`LilyApi`] handle and drops it when the attempt ends, so a node
//! restart only costs the attempt in flight.

pub mod client;
pub mod endpoints;
pub mod types;

use async_trait::async_trait;

use crate::error::Result;

pub use client::{HttpConnector, LilyClient};
pub use types::{JobId, JobListResult, JobSubmitResult, WalkConfig, WALK_JOB_TYPE};

#[async_trait]
pub trait LilyApi: Send + Sync {
    /// Schedule a walk
    async fn walk(&self, cfg: &WalkConfig) -> Result<JobSubmitResult>;

    /// Every job the node knows about, running or finished
    async fn job_list(&self) -> Result<Vec<JobListResult>>;
}

/// Source of API handles
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn LilyApi>>;
}
