//! Runs a parsed pipeline.
//!
//! A single command runs directly on the shell's streams so that `exit` can
//! end the shell. Longer pipelines get one conduit between each pair of
//! neighbours and every stage is launched through a [`StageBackend`] before
//! any of them is waited for.

use std::io::{self, Write};

use tracing::{debug, warn};

use crate::command::{CommandFactory, CommandResult};
use crate::config::PipelineModel;
use crate::env::Environment;
use crate::external::SPAWN_FAILED;
use crate::parser::{ParsedCommand, Pipeline};
use crate::stage::{self, StageBackend, StageHandle, StageJob};
use crate::stream::{Input, Output, Streams};

pub struct PipelineExecutor<'a> {
    factory: &'a CommandFactory,
    model: PipelineModel,
}

enum Stage {
    Running(Box<dyn StageHandle>),
    /// Never started; the status is already known.
    Finished(i32),
}

impl<'a> PipelineExecutor<'a> {
    pub fn new(factory: &'a CommandFactory, model: PipelineModel) -> Self { PipelineExecutor { factory, model } }

    /// Executes `pipeline` against the shell endpoints `io`. Only a
    /// single-command pipeline can carry a termination request out.
    pub fn run(&self, pipeline: &Pipeline, io: &mut Streams, base: &Environment) -> CommandResult {
        match pipeline.stages.as_slice() {
            [] => CommandResult::success(),
            [only] if only.is_assignment_only() => CommandResult::success(),
            [only] => {
                let env = base.with_overrides(&only.assignments);
                let command = self.factory.create(&only.name, &only.args);
                let result = command.execute(io, &env);
                debug!(command = %only.name, code = result.code, flow = ?result.flow, "command finished");
                result
            }
            stages => {
                let backend = stage::backend_for(self.model, io);
                CommandResult::code(self.run_stages(backend.as_ref(), stages, io, base))
            }
        }
    }

    /// Launches every stage, then waits for all of them. Returns the last
    /// stage's status.
    pub fn run_stages(&self, backend: &dyn StageBackend, stages: &[ParsedCommand], io: &mut Streams, base: &Environment) -> i32 {
        let n = stages.len();
        debug!(stages = n, backend = backend.name(), "launching pipeline");
        let mut launched = Vec::with_capacity(n);
        let mut upstream: Option<Input> = None;

        for (i, parsed) in stages.iter().enumerate() {
            let input = if i == 0 { endpoint_input(&io.input) } else { upstream.take().unwrap_or(Input::Null) };
            let output = if i + 1 == n {
                endpoint_output(&io.output, "output")
            } else {
                match backend.conduit() {
                    Ok((w, r)) => { upstream = Some(r); w }
                    Err(e) => {
                        // dropping `input` here lets the previous stage finish;
                        // the next one starts on an empty input
                        warn!(stage = i, error = %e, "conduit creation failed");
                        report(&mut io.error, &parsed.name, &e);
                        launched.push(Stage::Finished(SPAWN_FAILED));
                        continue;
                    }
                }
            };
            if parsed.is_assignment_only() {
                // nothing to run; the dropped ends read as EOF/EPIPE for the neighbours
                launched.push(Stage::Finished(0));
                continue;
            }
            let error = endpoint_output(&io.error, "error");
            let job = StageJob::new(self.factory.create(&parsed.name, &parsed.args), base.with_overrides(&parsed.assignments), i);
            match backend.launch(job, Streams::new(input, output, error)) {
                Ok(handle) => launched.push(Stage::Running(handle)),
                Err(e) => {
                    report(&mut io.error, &parsed.name, &e);
                    launched.push(Stage::Finished(SPAWN_FAILED));
                }
            }
        }

        let mut status = 0;
        for (i, stage) in launched.into_iter().enumerate() {
            status = match stage { Stage::Running(h) => h.wait(), Stage::Finished(code) => code };
            debug!(stage = i, code = status, "stage finished");
        }
        status
    }
}

fn endpoint_input(input: &Input) -> Input {
    input.try_clone().unwrap_or_else(|e| {
        warn!(error = %e, "shell input cannot be shared with a stage");
        Input::Null
    })
}

fn endpoint_output(output: &Output, which: &str) -> Output {
    output.try_clone().unwrap_or_else(|e| {
        warn!(which, error = %e, "shell stream cannot be shared with a stage");
        Output::Null
    })
}

fn report(err: &mut Output, name: &str, e: &io::Error) {
    let _ = writeln!(err, "pipesh: {name}: {e}");
    let _ = err.flush();
}
