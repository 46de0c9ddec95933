//! Infrastructure layer for Capsmith.
//!
//! Implements the IO-facing pieces the core crate leaves abstract: the
//! directory-tree [`source::FsContentSource`], `capsmith.toml` loading, and
//! the file watcher that drives hot reload.

pub mod config;
pub mod source;
pub mod watch;
