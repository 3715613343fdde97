use std::io::Write;

use anyhow::Result;
use clap::Parser;

use pipesh::config::DEFAULT_PROMPT;
use pipesh::{LineSource, PipelineModel, Shell, ShellConfig, Streams};

#[derive(Parser, Debug)]
#[command(name = "pipesh", version, about = "Line-oriented shell with concurrent pipelines")]
struct Cli {
    /// Run SCRIPT (one command line per line) instead of reading stdin
    #[arg(short = 'c', value_name = "SCRIPT")]
    script: Option<String>,
    /// How stages of multi-stage pipelines are run
    #[arg(long, value_enum, env = "PIPESH_PIPELINE_MODEL", default_value_t = PipelineModel::Auto)]
    pipeline_model: PipelineModel,
    /// Prompt shown before each line in interactive use
    #[arg(long, env = "PIPESH_PROMPT", default_value = DEFAULT_PROMPT)]
    prompt: String,
    /// Never print the prompt
    #[arg(long)]
    no_prompt: bool,
}

fn main() -> Result<()> {
    pipesh::logging::init();
    let cli = Cli::parse();
    let interactive = cli.script.is_none() && !cli.no_prompt && atty::is(atty::Stream::Stdin);
    let config = ShellConfig { prompt: cli.prompt, interactive, pipeline_model: cli.pipeline_model };
    tracing::debug!(?config, "starting shell");

    let mut lines = match &cli.script {
        Some(script) => LineSource::script(script),
        None => LineSource::Stdin,
    };
    let mut shell = Shell::new(config);
    let code = shell.run(&mut lines, &mut Streams::inherit());
    std::io::stdout().flush()?;
    std::process::exit(code);
}
