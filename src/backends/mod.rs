use std::str::FromStr;

mod cli;
mod docker_api;

pub use cli::CliEngine;
pub use docker_api::{parse_image_ref, DockerApiEngine};

/// Selects how the image gets built.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum EngineKind {
    /// Talk to the Docker daemon over its API.
    Api,
    /// Run a docker compatible command line tool.
    Cli,
}

impl EngineKind {
    pub const VARIANTS: &'static [&'static str] = &["api", "cli"];
}

impl FromStr for EngineKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "api" => Ok(EngineKind::Api),
            "cli" => Ok(EngineKind::Cli),
            other => Err(format!("unknown engine {:?}, expected api or cli", other)),
        }
    }
}
