//! Error types for the selection pipeline.

use std::path::{Path, PathBuf};

use crate::evaluator::EngineError;
use crate::pgn::PgnError;

/// Fatal failures. Each variant names the stage that failed so the CLI can
/// print a single line identifying it.
#[derive(Debug, thiserror::Error)]
pub enum SelectorError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("engine failure: {0}")]
    Engine(#[from] EngineError),

    #[error("input error: {0}")]
    Input(PgnError),

    #[error("i/o failure on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config file {}: {source}", path.display())]
    ConfigFile {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("failed to write run summary: {0}")]
    Summary(#[from] serde_json::Error),
}

impl SelectorError {
    pub fn config(msg: impl Into<String>) -> Self {
        SelectorError::Config(msg.into())
    }

    pub fn io(path: &Path, source: std::io::Error) -> Self {
        SelectorError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    /// Short name of the failed stage.
    pub fn stage(&self) -> &'static str {
        match self {
            SelectorError::Config(_) | SelectorError::ConfigFile { .. } => "configuration",
            SelectorError::Engine(_) => "engine",
            SelectorError::Input(_) => "input",
            SelectorError::Io { .. } => "i/o",
            SelectorError::Summary(_) => "summary",
        }
    }
}

pub type Result<T, E = SelectorError> = std::result::Result<T, E>;
