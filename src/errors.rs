use std::{io, path::PathBuf};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("couldn't read the descriptor file {path:?}: {source}")]
    Load {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid descriptor: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("the descriptor field `{0}` must not be empty")]
    MissingField(&'static str),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("build engine error: {0}")]
    Engine(String),

    #[error("build hook failed: {0}")]
    Hook(String),
}
