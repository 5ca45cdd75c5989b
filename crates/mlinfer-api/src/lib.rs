//! mlinfer-api: HTTP API for a loaded model
//!
//! This crate provides the routes of the inference server:
//! - Model status and descriptor
//! - Row-oriented prediction
//! - OpenAPI document and interactive reference

pub mod openapi;
pub mod rest;

pub use rest::{create_router, ModelState};
