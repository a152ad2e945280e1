use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap as Map;

/// The declarative description of an image build, as read from a
/// `docker-builder.yml` file.
///
/// Keys that are not known to the builder are kept in `extensions` so that
/// hooks can read their own settings from the same document.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Descriptor {
    pub source_image: String,

    pub target_image: String,

    pub maintainer: Option<String>,

    /// Raw directive lines, inserted into the manifest verbatim.
    pub commands: Vec<String>,

    pub exposed_ports: Vec<u16>,

    pub entrypoint: Option<Instruction>,

    pub cmd: Option<Instruction>,

    pub docker_host: Option<String>,

    /// Push the target image once it has been built.
    pub push: bool,

    #[serde(flatten)]
    pub extensions: Map<String, serde_yaml::Value>,
}

impl Descriptor {
    /// Returns a copy of this descriptor building `source_image` into
    /// `target_image`.
    pub fn with_image_names<S, T>(&self, source_image: S, target_image: T) -> Descriptor
    where
        S: Into<String>,
        T: Into<String>,
    {
        Descriptor {
            source_image: source_image.into(),
            target_image: target_image.into(),
            ..self.clone()
        }
    }
}

/// An `ENTRYPOINT` or `CMD` argument, either a list of arguments or a
/// single shell string.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Instruction {
    Exec(Vec<String>),
    Shell(String),
}

impl Instruction {
    pub fn is_empty(&self) -> bool {
        match self {
            Instruction::Exec(args) => args.is_empty(),
            Instruction::Shell(line) => line.trim().is_empty(),
        }
    }
}

impl From<Vec<String>> for Instruction {
    fn from(args: Vec<String>) -> Self {
        Instruction::Exec(args)
    }
}

impl From<&str> for Instruction {
    fn from(line: &str) -> Self {
        Instruction::Shell(line.into())
    }
}

/// A single progress entry reported by a build engine, kept exactly as the
/// engine produced it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProgressEvent(pub Value);

impl ProgressEvent {
    pub fn from_stream_line<S: Into<String>>(line: S) -> ProgressEvent {
        ProgressEvent(json!({ "stream": line.into() }))
    }

    pub fn stream(&self) -> Option<&str> {
        self.0.get("stream").and_then(Value::as_str)
    }

    pub fn status(&self) -> Option<&str> {
        self.0.get("status").and_then(Value::as_str)
    }

    pub fn progress(&self) -> Option<&str> {
        self.0.get("progress").and_then(Value::as_str)
    }

    /// The error message carried by this event, if any. Docker reports
    /// failures either as `error` or as `errorDetail.message`.
    pub fn error(&self) -> Option<&str> {
        self.0
            .get("error")
            .and_then(Value::as_str)
            .or_else(|| {
                self.0
                    .get("errorDetail")
                    .and_then(|detail| detail.get("message"))
                    .and_then(Value::as_str)
            })
            .filter(|message| !message.is_empty())
    }
}
