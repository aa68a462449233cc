#![forbid(unsafe_code)]

use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

/// Failure to obtain a usable program model. Always fatal for the run.
#[derive(Debug, Error, Diagnostic)]
pub enum ModelError {
    #[error("failed to read program snapshot {}", path.display())]
    #[diagnostic(
        code(mutex_check::model::io),
        help("run the front end first, or point --snapshot at its output")
    )]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse program snapshot {}", path.display())]
    #[diagnostic(code(mutex_check::model::parse))]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("package {package} failed to load: {message}")]
    #[diagnostic(code(mutex_check::model::package))]
    Package { package: String, message: String },

    #[error("program snapshot is inconsistent: {message}")]
    #[diagnostic(code(mutex_check::model::inconsistent))]
    Inconsistent { message: String },
}
