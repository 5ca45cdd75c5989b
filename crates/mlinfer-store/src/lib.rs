//! mlinfer-store: Model artifact resolution
//!
//! This crate turns model URIs into local directories:
//! - URI classification (local, registry, run, remote)
//! - Artifact download, delegated to the mlflow CLI for non-local URIs
//! - Descriptor and pyfunc flavor extraction

pub mod artifact;
pub mod uri;

pub use artifact::{copy_tree, copy_tree_async, ArtifactStore};
pub use uri::{local_file_uri, ModelUri};
