//! mlinfer-core: Core types for mlinfer
//!
//! This crate provides the types shared by every other mlinfer crate:
//! - The `MLmodel` descriptor and its pyfunc flavor
//! - Backend worker and endpoint information
//! - Server and image build configuration
//! - Error handling

pub mod config;
pub mod descriptor;
pub mod error;
pub mod model;

pub use config::*;
pub use descriptor::*;
pub use error::*;
pub use model::*;
