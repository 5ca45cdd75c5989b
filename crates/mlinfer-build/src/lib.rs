//! mlinfer-build: Docker images for pyfunc models
//!
//! This crate bundles a model, its Python dependencies and the inference
//! server binary into a docker build context and builds an image from it.

pub mod binary;
pub mod builder;
pub mod dockerfile;

pub use binary::check_server_binary;
pub use builder::{download_manylinux_package, DockerImageBuilder};
pub use dockerfile::{generate_dockerfile, DockerfileOptions};
