//! mlinfer CLI
//!
//! Serve pyfunc models locally or package them as docker images.

mod commands;

use clap::{Parser, Subcommand};
use mlinfer_core::{DEFAULT_PORT, MODEL_URI_ENV};
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// mlinfer - serve and package MLflow pyfunc models
#[derive(Parser, Debug)]
#[command(name = "mlinfer")]
#[command(version, about, long_about = None, arg_required_else_help = true)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to the mlinfer-server binary (defaults to the one next to this executable)
    #[arg(long, global = true)]
    server_bin: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Serve a model over HTTP
    Serve {
        /// Model URI (local path, models:/, runs:/ or remote)
        #[arg(short, long, env = MODEL_URI_ENV)]
        model_uri: String,

        /// Port to listen on
        #[arg(short, long, default_value_t = DEFAULT_PORT)]
        port: u16,

        /// Number of scoring workers
        #[arg(short, long, default_value_t = 1)]
        workers: u32,
    },

    /// Build a docker image serving a model
    BuildDocker {
        /// Model URI (local path, models:/, runs:/ or remote)
        #[arg(short, long)]
        model_uri: String,

        /// Image name (defaults to the last two URI segments, e.g. iris:3)
        #[arg(short, long)]
        name: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::WARN
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);

    match cli.command {
        Commands::Serve {
            model_uri,
            port,
            workers,
        } => {
            commands::serve(&model_uri, port, workers, cli.server_bin).await?;
        }
        Commands::BuildDocker { model_uri, name } => {
            commands::build_docker(&model_uri, name, cli.server_bin).await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_serve_defaults() {
        let cli = Cli::parse_from(["mlinfer", "serve", "-m", "models:/iris/3"]);
        match cli.command {
            Commands::Serve {
                model_uri,
                port,
                workers,
            } => {
                assert_eq!(model_uri, "models:/iris/3");
                assert_eq!(port, 8008);
                assert_eq!(workers, 1);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_build_docker_args() {
        let cli = Cli::parse_from([
            "mlinfer",
            "build-docker",
            "--model-uri",
            "runs:/abc/model",
            "-n",
            "iris:latest",
            "--server-bin",
            "/usr/local/bin/mlinfer-server",
        ]);
        assert_eq!(
            cli.server_bin,
            Some(PathBuf::from("/usr/local/bin/mlinfer-server"))
        );
        match cli.command {
            Commands::BuildDocker { model_uri, name } => {
                assert_eq!(model_uri, "runs:/abc/model");
                assert_eq!(name.as_deref(), Some("iris:latest"));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_missing_subcommand() {
        assert!(Cli::try_parse_from(["mlinfer"]).is_err());
    }
}
