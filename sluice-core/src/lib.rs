//! Sluice Core
//!
//! Core types and scheduling logic for the Sluice CI/CD orchestrator.
//!
//! This crate contains:
//! - Domain types: pipelines, workflows, steps, tasks and approval gates
//! - Admission: whether a task should run given its dependencies' outcomes
//! - Roll-up: deriving workflow and pipeline status from their children
//! - DTOs: Data transfer objects for the orchestrator API
//!
//! Everything here is synchronous and free of I/O so it can be called from
//! any thread without locking.

pub mod admission;
pub mod approval;
pub mod domain;
pub mod dto;
pub mod error;
pub mod rollup;
