use anyhow::{anyhow, Result};
use crossterm::{
    style::{self, Color, Colorize, Styler},
    QueueableCommand,
};
use log::{info, warn};
use std::{
    env,
    io::{stdout, Write},
    path::PathBuf,
};
use structopt::StructOpt;

use docker_builder::{
    backends::{CliEngine, DockerApiEngine, EngineKind},
    config::find_descriptor_file,
    manifest,
    services::BuildEngine,
    Builder, Descriptor, ProgressEvent,
};

#[derive(Debug, StructOpt)]
#[structopt(
    name = "docker-builder",
    about = "Builds docker images from a declarative docker-builder.yml file."
)]
struct Opt {
    #[structopt(short, long, parse(from_os_str))]
    /// The descriptor file, defaults to the closest docker-builder.yml.
    file: Option<PathBuf>,

    #[structopt(subcommand)]
    command: Command,
}

#[derive(Debug, StructOpt)]
enum Command {
    /// Prints the Dockerfile rendered from the descriptor.
    Render,
    /// Builds the image, and pushes it if requested.
    Build {
        #[structopt(long)]
        /// Push the image after a successful build.
        push: bool,

        #[structopt(long, default_value = "api", possible_values = EngineKind::VARIANTS)]
        engine: EngineKind,

        #[structopt(long, default_value = "docker")]
        /// The command line tool used by the cli engine.
        binary: String,

        #[structopt(short, long)]
        /// Only print errors and the final result.
        quiet: bool,
    },
}

fn main() -> Result<()> {
    pretty_env_logger::init_custom_env("LOG");

    let opt = Opt::from_args();

    let descriptor_path = match opt.file {
        Some(path) => path,
        None => find_descriptor_file(env::current_dir()?).ok_or_else(|| {
            anyhow!("Couldn't find a docker-builder.yml file in the current working directory or any of its parents.")
        })?,
    };
    info!("found descriptor file {:?}", descriptor_path);

    let descriptor = Descriptor::from_yaml_file(&descriptor_path)?;

    match opt.command {
        Command::Render => {
            println!("{}", manifest::render(&descriptor)?);
        }
        Command::Build {
            push,
            engine,
            binary,
            quiet,
        } => {
            let engine: Box<dyn BuildEngine> = match engine {
                EngineKind::Api => Box::new(DockerApiEngine::connect(&descriptor.docker_host())?),
                EngineKind::Cli => Box::new(CliEngine::new(binary)),
            };

            let push = push || descriptor.push;
            let mut builder = Builder::new(descriptor, engine).push(push);
            let target = builder.descriptor().target_image.clone();

            let mut stdout = stdout();
            let success = {
                let mut observer = |event: &ProgressEvent| {
                    if let Err(err) = print_event(&mut stdout, event, quiet) {
                        warn!("couldn't print progress: {}", err);
                    }
                };
                builder.build(Some(&mut observer))?
            };

            if !success {
                return Err(anyhow!("Building {} failed.", target));
            }

            stdout
                .queue(style::PrintStyledContent("DONE: ".green().bold()))?
                .queue(style::Print(format!("built {}\n", target)))?
                .flush()?;
        }
    }

    Ok(())
}

fn print_event(stdout: &mut impl Write, event: &ProgressEvent, quiet: bool) -> Result<()> {
    if let Some(message) = event.error() {
        stdout
            .queue(style::PrintStyledContent("ERROR: ".red().bold()))?
            .queue(style::Print(format!("{}\n", message.trim_end())))?
            .flush()?;
        return Ok(());
    }

    if quiet {
        return Ok(());
    }

    if let Some(line) = event.stream() {
        let line = line.trim_end();
        if !line.is_empty() {
            stdout.queue(style::Print(format!("{}\n", line)))?;
        }
    } else if let Some(status) = event.status() {
        stdout.queue(style::PrintStyledContent(
            style::style(status.to_string()).with(Color::Cyan),
        ))?;
        if let Some(progress) = event.progress() {
            stdout.queue(style::Print(format!(" {}", progress)))?;
        }
        stdout.queue(style::Print("\n"))?;
    }

    stdout.flush()?;

    Ok(())
}
