//! Resolution engine for Capsmith.
//!
//! Matches task contexts against a registry of capability descriptors,
//! resolves dependencies under a budget and dispatches the resulting plan.
//! This crate performs no filesystem or network IO; content arrives through
//! the [`registry::ContentSource`] trait implemented in `capsmith-infra`.

pub mod dispatch;
pub mod engine;
pub mod manifest;
pub mod matcher;
pub mod policy;
pub mod registry;
pub mod resolver;

#[cfg(test)]
pub(crate) mod testing;

pub use engine::Engine;
