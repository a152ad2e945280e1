//! Renders a [`Descriptor`] into Dockerfile text.
//!
//! Directive arguments are written as given. Nothing is escaped or
//! validated beyond the required image names, so descriptors must come from
//! a trusted source.

use crate::{
    errors::{Error, Result},
    models::{Descriptor, Instruction},
};

pub const MANIFEST_FILE_NAME: &str = "Dockerfile";

pub fn render(descriptor: &Descriptor) -> Result<String> {
    if descriptor.source_image.trim().is_empty() {
        return Err(Error::MissingField("source_image"));
    }
    if descriptor.target_image.trim().is_empty() {
        return Err(Error::MissingField("target_image"));
    }

    let mut lines = vec![format!("FROM {}", descriptor.source_image)];

    if let Some(maintainer) = descriptor.maintainer() {
        lines.push(format!("MAINTAINER {}", maintainer));
    }

    lines.extend(descriptor.commands.iter().cloned());

    if !descriptor.exposed_ports.is_empty() {
        let ports = descriptor
            .exposed_ports
            .iter()
            .map(|port| port.to_string())
            .collect::<Vec<_>>();
        lines.push(format!("EXPOSE {}", ports.join(" ")));
    }

    // An unset entrypoint is left to the base image.
    if let Some(entrypoint) = descriptor.entrypoint.as_ref().filter(|e| !e.is_empty()) {
        lines.push(format!("ENTRYPOINT {}", instruction_argument(entrypoint)));
    }

    if let Some(cmd) = descriptor.cmd.as_ref().filter(|c| !c.is_empty()) {
        lines.push(format!("CMD {}", instruction_argument(cmd)));
    }

    Ok(lines.join("\n"))
}

fn instruction_argument(instruction: &Instruction) -> String {
    match instruction {
        Instruction::Shell(line) => line.clone(),
        Instruction::Exec(args) => {
            let args = args.iter().map(|arg| quote(arg)).collect::<Vec<_>>();
            format!("[{}]", args.join(", "))
        }
    }
}

/// Quotes a list item with single quotes, switching to double quotes when
/// the value contains a single quote but no double quote.
fn quote(value: &str) -> String {
    let delimiter = if value.contains('\'') && !value.contains('"') {
        '"'
    } else {
        '\''
    };

    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push(delimiter);
    for c in value.chars() {
        match c {
            '\\' => quoted.push_str("\\\\"),
            '\n' => quoted.push_str("\\n"),
            '\r' => quoted.push_str("\\r"),
            '\t' => quoted.push_str("\\t"),
            c if c == delimiter => {
                quoted.push('\\');
                quoted.push(c);
            }
            c => quoted.push(c),
        }
    }
    quoted.push(delimiter);

    quoted
}
