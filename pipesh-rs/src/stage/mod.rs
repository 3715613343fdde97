//! Ways of running one pipeline stage concurrently with its siblings.
//!
//! The executor only ever talks to [`StageBackend`]: it asks for conduits to
//! connect neighbouring stages, launches each stage with its streams and
//! later waits on the returned handle. Whether a stage is a thread or a
//! forked process is the backend's business.

use std::io;

use tracing::debug;

use crate::command::Command;
use crate::config::PipelineModel;
use crate::env::Environment;
use crate::stream::{Input, Output, Streams};

#[cfg(unix)]
pub mod fork;
pub mod threads;

#[cfg(unix)]
pub use fork::ForkBackend;
pub use threads::ThreadBackend;

/// Everything a stage needs except its streams.
pub struct StageJob {
    pub command: Box<dyn Command>,
    /// Base environment plus this stage's own assignments.
    pub env: Environment,
    pub label: String,
}

impl StageJob {
    pub fn new(command: Box<dyn Command>, env: Environment, index: usize) -> Self {
        StageJob { label: format!("stage-{index}-{}", command.name()), command, env }
    }
}

/// A launched stage.
pub trait StageHandle: Send {
    /// Blocks until the stage finished and returns its exit status.
    fn wait(self: Box<Self>) -> i32;
}

pub trait StageBackend {
    fn name(&self) -> &'static str;

    /// A connected `(write end, read end)` pair for two neighbouring stages.
    fn conduit(&self) -> io::Result<(Output, Input)>;

    /// Starts `job` on `io`. The stage owns the streams and closes them when it
    /// ends; on error they have already been dropped.
    fn launch(&self, job: StageJob, io: Streams) -> io::Result<Box<dyn StageHandle>>;
}

/// Resolves `model` against the shell endpoints of the pipeline about to run.
pub fn backend_for(model: PipelineModel, endpoints: &Streams) -> Box<dyn StageBackend> {
    match model {
        PipelineModel::Threads => Box::new(ThreadBackend::new()),
        #[cfg(unix)]
        PipelineModel::Fork => Box::new(ForkBackend::new()),
        #[cfg(unix)]
        PipelineModel::Auto if endpoints.is_native() => Box::new(ForkBackend::new()),
        _ => {
            debug!(?model, "using thread stages");
            Box::new(ThreadBackend::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auto_falls_back_to_threads_for_in_memory_endpoints() {
        let (out, _) = Output::buffer();
        let io = Streams::new(Input::Null, out, Output::Stderr);
        assert_eq!(backend_for(PipelineModel::Auto, &io).name(), "threads");
        assert_eq!(backend_for(PipelineModel::Threads, &Streams::inherit()).name(), "threads");
    }

    #[cfg(unix)]
    #[test]
    fn auto_forks_on_native_endpoints() {
        assert_eq!(backend_for(PipelineModel::Auto, &Streams::inherit()).name(), "fork");
        let (out, _) = Output::buffer();
        assert_eq!(backend_for(PipelineModel::Fork, &Streams::new(Input::Null, out, Output::Stderr)).name(), "fork");
    }
}
