use log::info;
use serde::de::DeserializeOwned;
use std::{
    env,
    fs::File,
    path::{Path, PathBuf},
};

use crate::{
    errors::{Error, Result},
    models::Descriptor,
};

pub const ENV_MAINTAINER: &str = "DOCKERFILE_MAINTAINER";
pub const ENV_DOCKER_HOST: &str = "DOCKER_HOST";

pub const DEFAULT_DOCKER_HOST: &str = "unix:///var/run/docker.sock";

const DESCRIPTOR_FILE_NAMES: &[&str] = &["docker-builder.yml", "docker-builder.yaml"];

/// Looks for a descriptor file in `path` or any of its parents.
pub fn find_descriptor_file<P: AsRef<Path>>(path: P) -> Option<PathBuf> {
    for path in path.as_ref().ancestors() {
        for file_name in DESCRIPTOR_FILE_NAMES {
            let descriptor_path = path.join(file_name);
            if descriptor_path.exists() {
                return Some(descriptor_path);
            }
        }
    }

    None
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}

impl Descriptor {
    /// Loads a descriptor from a YAML file. Required fields are checked when
    /// the manifest is rendered, not here.
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Descriptor> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| Error::Load {
            path: path.to_owned(),
            source,
        })?;

        let descriptor: Descriptor = serde_yaml::from_reader(file)?;
        info!("loaded descriptor {:?}", path);

        Ok(descriptor)
    }

    pub fn from_yaml_str(document: &str) -> Result<Descriptor> {
        Ok(serde_yaml::from_str(document)?)
    }

    /// The maintainer from the descriptor, falling back to
    /// `DOCKERFILE_MAINTAINER`.
    pub fn maintainer(&self) -> Option<String> {
        self.maintainer
            .clone()
            .filter(|maintainer| !maintainer.trim().is_empty())
            .or_else(|| non_empty_var(ENV_MAINTAINER))
    }

    /// The engine address from the descriptor, falling back to `DOCKER_HOST`
    /// and then to the local socket.
    pub fn docker_host(&self) -> String {
        self.docker_host
            .clone()
            .filter(|host| !host.trim().is_empty())
            .or_else(|| non_empty_var(ENV_DOCKER_HOST))
            .unwrap_or_else(|| DEFAULT_DOCKER_HOST.into())
    }

    pub fn extension(&self, key: &str) -> Option<&serde_yaml::Value> {
        self.extensions.get(key)
    }

    /// Reads an extension key as `T`. Returns `Ok(None)` if the key is absent.
    pub fn extension_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.extensions.get(key) {
            Some(value) => Ok(Some(serde_yaml::from_value(value.clone())?)),
            None => Ok(None),
        }
    }
}
