use log::{error, info, warn};
use std::{fs, path::Path};
use tempfile::Builder as TempDirBuilder;

use crate::{
    errors::Result,
    manifest::{self, MANIFEST_FILE_NAME},
    models::{Descriptor, ProgressEvent},
    services::{BuildEngine, BuildHooks, NoHooks, Observer},
};

const SCRATCH_PREFIX: &str = "docker-builder.";

/// Runs a single descriptor through an engine: stage the manifest in a
/// fresh scratch directory, build, optionally push, then clean up.
pub struct Builder {
    descriptor: Descriptor,
    engine: Box<dyn BuildEngine>,
    hooks: Box<dyn BuildHooks>,
    push: bool,
}

impl Builder {
    pub fn new<E>(descriptor: Descriptor, engine: E) -> Builder
    where
        E: 'static + BuildEngine,
    {
        let push = descriptor.push;

        Builder {
            descriptor,
            engine: Box::new(engine),
            hooks: Box::new(NoHooks),
            push,
        }
    }

    pub fn with_hooks<H>(mut self, hooks: H) -> Builder
    where
        H: 'static + BuildHooks,
    {
        self.hooks = Box::new(hooks);
        self
    }

    pub fn push(mut self, push: bool) -> Builder {
        self.push = push;
        self
    }

    pub fn descriptor(&self) -> &Descriptor {
        &self.descriptor
    }

    /// The manifest this builder would stage, with the hooks' image names.
    pub fn manifest(&self) -> Result<String> {
        manifest::render(&self.resolved_descriptor())
    }

    /// Builds the image and pushes it if requested. Returns `Ok(false)` when
    /// the engine reports a failure. The scratch directory is removed before
    /// returning, whatever the outcome.
    pub fn build(&mut self, observer: Option<&mut Observer>) -> Result<bool> {
        let scratch = TempDirBuilder::new().prefix(SCRATCH_PREFIX).tempdir()?;
        info!("created scratch directory {:?}", scratch.path());

        let outcome = self.build_in(scratch.path(), observer);

        let scratch_path = scratch.path().to_owned();
        match scratch.close() {
            Ok(()) => info!("removed scratch directory {:?}", scratch_path),
            Err(err) => warn!(
                "couldn't remove scratch directory {:?}: {}",
                scratch_path, err
            ),
        }

        outcome
    }

    fn build_in(&mut self, context: &Path, observer: Option<&mut Observer>) -> Result<bool> {
        let mut discard = |_: &ProgressEvent| {};
        let observer: &mut Observer = match observer {
            Some(observer) => observer,
            None => &mut discard,
        };

        self.hooks.before_build(context)?;

        let descriptor = self.resolved_descriptor();
        let target = descriptor.target_image.clone();

        let manifest = manifest::render(&descriptor)?;
        fs::write(context.join(MANIFEST_FILE_NAME), manifest)?;
        info!("staged {} for {}", MANIFEST_FILE_NAME, target);

        let mut success = engine_outcome(
            "build",
            &target,
            self.engine.build_image(context, &target, observer),
        );

        if success && self.push {
            success = engine_outcome("push", &target, self.engine.push_image(&target, observer));
        }

        self.hooks.after_build(context)?;

        Ok(success)
    }

    fn resolved_descriptor(&self) -> Descriptor {
        let source_image = self.hooks.source_image_name(&self.descriptor);
        let target_image = self.hooks.target_image_name(&self.descriptor);

        self.descriptor.with_image_names(source_image, target_image)
    }
}

fn engine_outcome(step: &str, target: &str, result: Result<bool>) -> bool {
    match result {
        Ok(true) => {
            info!("{} of {} succeeded", step, target);
            true
        }
        Ok(false) => {
            error!("{} of {} failed", step, target);
            false
        }
        Err(err) => {
            error!("{} of {} failed: {}", step, target, err);
            false
        }
    }
}
