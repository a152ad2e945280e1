use log::{debug, info, warn};
use std::{
    io::{BufRead, BufReader},
    path::Path,
    process::{Command, Stdio},
};

use crate::{
    errors::{Error, Result},
    models::ProgressEvent,
    services::{BuildEngine, Observer},
};

/// Builds images by running a docker compatible command line tool.
pub struct CliEngine {
    binary: String,
}

impl CliEngine {
    pub fn new<S: Into<String>>(binary: S) -> CliEngine {
        CliEngine {
            binary: binary.into(),
        }
    }

    /// Runs the tool with `args`, forwarding each stdout line as a stream
    /// event. Stderr is left attached to the terminal.
    fn run(&self, args: &[&str], observer: &mut Observer) -> Result<bool> {
        info!("running {} {}", self.binary, args.join(" "));

        let mut child = Command::new(&self.binary)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .spawn()
            .map_err(|err| Error::Engine(format!("couldn't run {:?}: {}", self.binary, err)))?;

        if let Some(stdout) = child.stdout.take() {
            let mut stdout = BufReader::new(stdout);
            let mut buffer = Vec::new();
            loop {
                buffer.clear();
                match stdout.read_until(b'\n', &mut buffer) {
                    Ok(0) => break,
                    Ok(_) => {
                        // Build output isn't guaranteed to be utf-8.
                        let line = String::from_utf8_lossy(&buffer);
                        let line = line.trim_end_matches(|c: char| c == '\n' || c == '\r');
                        debug!("{}", line);
                        observer(&ProgressEvent::from_stream_line(format!("{}\n", line)));
                    }
                    Err(err) => {
                        warn!("couldn't read output of {}: {}", self.binary, err);
                        break;
                    }
                }
            }
        }

        let status = child.wait()?;
        info!("{} exited with {}", self.binary, status);

        Ok(status.success())
    }
}

impl Default for CliEngine {
    fn default() -> Self {
        CliEngine::new("docker")
    }
}

impl BuildEngine for CliEngine {
    fn build_image(&mut self, context: &Path, tag: &str, observer: &mut Observer) -> Result<bool> {
        let context = context.to_string_lossy();
        self.run(&["build", "-t", tag, &*context], observer)
    }

    fn push_image(&mut self, tag: &str, observer: &mut Observer) -> Result<bool> {
        self.run(&["push", tag], observer)
    }
}
