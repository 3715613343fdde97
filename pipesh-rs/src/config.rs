use clap::ValueEnum;

pub const DEFAULT_PROMPT: &str = "pipesh> ";

/// How the stages of a multi-stage pipeline are run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum PipelineModel {
    /// `fork` when the platform has it and every shell endpoint is an OS
    /// stream, `threads` otherwise.
    #[default]
    Auto,
    /// One thread per stage, in-memory conduits.
    Threads,
    /// One forked process per stage, OS pipes.
    Fork,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellConfig {
    pub prompt: String,
    /// Print the prompt before each line.
    pub interactive: bool,
    pub pipeline_model: PipelineModel,
}

impl Default for ShellConfig {
    fn default() -> Self {
        ShellConfig { prompt: DEFAULT_PROMPT.to_string(), interactive: false, pipeline_model: PipelineModel::Auto }
    }
}

impl ShellConfig {
    pub fn interactive(mut self, yes: bool) -> Self { self.interactive = yes; self }
}
