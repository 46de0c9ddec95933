//! Shared domain types for Capsmith.
//!
//! This crate contains the types used across the engine: capability
//! descriptors and their manifests, task contexts, activation plans, dispatch
//! events, configuration, and the error taxonomy.
//!
//! Zero infrastructure dependencies -- only serde, semver, thiserror.

pub mod config;
pub mod descriptor;
pub mod error;
pub mod plan;
