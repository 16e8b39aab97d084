//! The generic processing stage trait shared by [`crate::Pipeline`] and
//! [`crate::ChannelPipeline`].

use std::sync::Arc;

use crate::{PipelineError, StreamerContext};

/// A single pipeline stage.
///
/// A processor consumes one item of `T` at a time and emits zero or more
/// items of `T` via `output`. Implementations are expected to be
/// synchronous and are run inside `spawn_blocking` by [`crate::ChannelPipeline`].
pub trait Processor<T>: Send {
    /// Process one input item, emitting any number of output items via `output`.
    fn process(
        &mut self,
        context: &Arc<StreamerContext>,
        input: T,
        output: &mut dyn FnMut(T) -> Result<(), PipelineError>,
    ) -> Result<(), PipelineError>;

    /// Called once after the input stream is exhausted, to flush any buffered state.
    ///
    /// The default implementation does nothing.
    fn finish(
        &mut self,
        context: &Arc<StreamerContext>,
        output: &mut dyn FnMut(T) -> Result<(), PipelineError>,
    ) -> Result<(), PipelineError> {
        let _ = (context, output);
        Ok(())
    }

    /// A short, stable name used in logs and error messages.
    fn name(&self) -> &'static str;
}
