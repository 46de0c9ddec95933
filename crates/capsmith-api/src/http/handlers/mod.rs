//! HTTP request handlers for the REST API.

pub mod admin;
pub mod descriptor;
pub mod resolve;
