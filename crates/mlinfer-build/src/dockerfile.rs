//! Dockerfile templating

use mlinfer_core::{BuildConfig, PyfuncFlavor, DEFAULT_PORT, SERVER_ARGS_ENV};

/// Where the build context lands inside the image
pub const MODEL_ROOT: &str = "/opt/ml_model";

/// Build context directory holding downloaded Python packages
pub const EXTRA_LIBS_DIR: &str = "extra_libs";

/// Build context directory holding the server binary
pub const BIN_DIR: &str = "bin";

/// File name of the inference server binary
pub const SERVER_BINARY: &str = "mlinfer-server";

/// Image-level settings for the generated Dockerfile
#[derive(Debug, Clone)]
pub struct DockerfileOptions {
    /// Base image
    pub base_image: String,
    /// Port the server listens on and the image exposes
    pub port: u16,
}

impl Default for DockerfileOptions {
    fn default() -> Self {
        Self {
            base_image: "continuumio/miniconda3:latest".to_string(),
            port: DEFAULT_PORT,
        }
    }
}

impl From<&BuildConfig> for DockerfileOptions {
    fn from(config: &BuildConfig) -> Self {
        Self {
            base_image: config.base_image.clone(),
            port: config.port,
        }
    }
}

/// Render the Dockerfile for a model.
///
/// The conda section is emitted only when the flavor names an environment
/// file, the pip section only when there are extra packages.
pub fn generate_dockerfile(
    flavor: &PyfuncFlavor,
    extra_packages: &[String],
    options: &DockerfileOptions,
) -> String {
    let mut dockerfile = format!(
        r#"FROM {base_image}

SHELL ["/bin/bash", "-c"]

RUN apt-get -y update \
    && apt-get -y upgrade \
    && apt-get install -y --no-install-recommends \
        cmake \
        build-essential \
    && apt-get -y autoremove \
    && rm -rf /var/lib/apt/lists/*

# Set up the program in the image
WORKDIR {root}

COPY . {root}
"#,
        base_image = options.base_image,
        root = MODEL_ROOT,
    );

    if let Some(conda_env) = flavor.conda_env() {
        dockerfile.push_str(&format!(
            "\nRUN conda env update -n base -f {}/{}\n",
            MODEL_ROOT, conda_env
        ));
    }

    if !extra_packages.is_empty() {
        dockerfile.push_str(&format!(
            "\nRUN pip install -U {} --find-links {}/{}/\n",
            extra_packages.join(" "),
            MODEL_ROOT,
            EXTRA_LIBS_DIR
        ));
    }

    dockerfile.push_str(&format!(
        r#"
EXPOSE {port}

CMD MODEL_URI={root} \
 {root}/{bin}/{server} \
 --host 0.0.0.0 --port {port} --workers 1 ${{{args}}}
"#,
        port = options.port,
        root = MODEL_ROOT,
        bin = BIN_DIR,
        server = SERVER_BINARY,
        args = SERVER_ARGS_ENV,
    ));

    dockerfile
}
