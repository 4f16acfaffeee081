//! Data Transfer Objects for the orchestrator API
//!
//! Request and response shapes shared by the orchestrator, the HTTP client
//! and the CLI.

pub mod approval;
pub mod pipeline;
pub mod queue;
