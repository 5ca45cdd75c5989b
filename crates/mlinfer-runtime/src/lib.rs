//! mlinfer-runtime: Process runtime and model backend
//!
//! This crate provides everything that runs outside the server process:
//! - Streamed execution of external tools
//! - A process runtime for `mlflow models serve` scoring workers
//! - The pyfunc model, which loads a model onto workers and forwards predictions

pub mod exec;
pub mod process;
pub mod pyfunc;
pub mod traits;

pub use exec::{run_inherited, run_streaming, run_streaming_to};
pub use process::{ProcessRuntime, ProcessRuntimeConfig};
pub use pyfunc::PyfuncModel;
pub use traits::{Predictor, Row, Runtime};
