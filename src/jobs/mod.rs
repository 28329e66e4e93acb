//! Export jobs: records, storage, orchestration and background execution.
//!
//! The [`ExportManager`] and its methods are organized by concern:
//! - [`model`] - Job record and state machine
//! - [`repository`] - Job storage trait and in-memory implementation
//! - [`manager`] - Job creation, polling and the download proxy
//! - [`worker`] - Background export of one job
//! - [`maintenance`] - Expired job cleanup
//! - [`lifecycle`] - Shutdown coordination

mod lifecycle;
mod maintenance;
mod manager;
pub mod model;
pub mod repository;
mod worker;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

pub use manager::{Collaborators, ExportManager};
pub use model::{ALL_ITEMS_FAILED, ExportJob, JobUpdate};
pub use repository::{JobRepository, MemoryJobRepository};
