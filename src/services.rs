use std::path::Path;

use crate::{
    errors::Result,
    models::{Descriptor, ProgressEvent},
};

pub type Observer<'a> = dyn FnMut(&ProgressEvent) + 'a;

pub trait BuildEngine {
    /// Builds the context directory into an image tagged `tag`, forwarding
    /// every progress event to `observer`. Returns `false` if the engine
    /// reported a failure.
    fn build_image(&mut self, context: &Path, tag: &str, observer: &mut Observer) -> Result<bool>;

    fn push_image(&mut self, tag: &str, observer: &mut Observer) -> Result<bool>;
}

/// Customisation points around a build. Every method has a default, so
/// implementors only override what they need.
pub trait BuildHooks {
    fn source_image_name(&self, descriptor: &Descriptor) -> String {
        descriptor.source_image.clone()
    }

    fn target_image_name(&self, descriptor: &Descriptor) -> String {
        descriptor.target_image.clone()
    }

    /// Runs once the scratch directory exists and before the manifest is
    /// written into it.
    fn before_build(&mut self, _context: &Path) -> Result<()> {
        Ok(())
    }

    fn after_build(&mut self, _context: &Path) -> Result<()> {
        Ok(())
    }
}

pub struct NoHooks;

impl BuildHooks for NoHooks {}

impl<E: BuildEngine + ?Sized> BuildEngine for Box<E> {
    fn build_image(&mut self, context: &Path, tag: &str, observer: &mut Observer) -> Result<bool> {
        (**self).build_image(context, tag, observer)
    }

    fn push_image(&mut self, tag: &str, observer: &mut Observer) -> Result<bool> {
        (**self).push_image(tag, observer)
    }
}
