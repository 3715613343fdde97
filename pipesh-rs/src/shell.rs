use std::collections::VecDeque;
use std::io::{self, BufRead, Read, Write};

use tracing::{debug, warn};

use crate::command::{CommandFactory, Flow};
use crate::config::ShellConfig;
use crate::env::Environment;
use crate::error::ShellError;
use crate::executor::PipelineExecutor;
use crate::expand::expand;
use crate::lexer::tokenize;
use crate::parser::{parse, Pipeline};
use crate::stream::{RawStdin, Streams};

/// Status after a line that failed to parse.
pub const SYNTAX_ERROR: i32 = 2;

/// Where the shell reads its lines from. Kept apart from the command
/// streams so a stage reading the shell's input never swallows script lines.
pub enum LineSource {
    /// Process stdin, read a byte at a time up to each newline. The rest
    /// stays in the descriptor for whichever command reads stdin next.
    Stdin,
    Script(VecDeque<String>),
    Reader(Box<dyn BufRead + Send>),
}

impl LineSource {
    pub fn script(text: &str) -> Self { LineSource::Script(text.lines().map(str::to_string).collect()) }

    pub fn next_line(&mut self) -> Result<Option<String>, ShellError> {
        let line = match self {
            LineSource::Script(lines) => return Ok(lines.pop_front()),
            LineSource::Stdin => read_line_unbuffered(&mut RawStdin),
            LineSource::Reader(r) => {
                let mut line = String::new();
                r.read_line(&mut line).map(|n| (n > 0).then_some(line))
            }
        }
        .map_err(ShellError::Read)?;
        let Some(mut line) = line else { return Ok(None) };
        if line.ends_with('\n') { line.pop(); }
        if line.ends_with('\r') { line.pop(); }
        Ok(Some(line))
    }
}

/// One line including its `\n`, never reading past it. `None` at end of input.
pub fn read_line_unbuffered<R: Read>(r: &mut R) -> io::Result<Option<String>> {
    let mut bytes = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        match r.read(&mut byte) {
            Ok(0) => break,
            Ok(_) => {
                bytes.push(byte[0]);
                if byte[0] == b'\n' { break; }
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    if bytes.is_empty() { return Ok(None); }
    Ok(Some(String::from_utf8_lossy(&bytes).into_owned()))
}

pub struct Shell {
    env: Environment,
    factory: CommandFactory,
    config: ShellConfig,
    last_status: i32,
}

impl Shell {
    pub fn new(config: ShellConfig) -> Self { Self::with_environment(config, Environment::capture()) }

    pub fn with_environment(config: ShellConfig, env: Environment) -> Self {
        Shell { env, factory: CommandFactory::new(), config, last_status: 0 }
    }

    /// The base environment every command snapshot derives from.
    pub fn environment(&self) -> &Environment { &self.env }

    pub fn last_status(&self) -> i32 { self.last_status }

    /// Reads and runs lines until `exit` or end of input; returns the shell's exit code.
    pub fn run(&mut self, lines: &mut LineSource, io: &mut Streams) -> i32 {
        loop {
            if self.config.interactive {
                let _ = write!(io.output, "{}", self.config.prompt);
                let _ = io.output.flush();
            }
            let line = match lines.next_line() {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "line source failed");
                    let _ = writeln!(io.error, "pipesh: {e}");
                    return 1;
                }
            };
            if let Flow::Exit(code) = self.run_line(&line, io) {
                debug!(code, "exit requested");
                return code;
            }
        }
        if self.config.interactive { let _ = writeln!(io.output); }
        0
    }

    /// Expands, parses and runs one line.
    pub fn run_line(&mut self, line: &str, io: &mut Streams) -> Flow {
        let pipeline = match self.parse_line(line) {
            Ok(Some(p)) => p,
            Ok(None) => return Flow::Continue,
            Err(e) => {
                let _ = writeln!(io.error, "pipesh: {e}");
                let _ = io.error.flush();
                self.last_status = SYNTAX_ERROR;
                return Flow::Continue;
            }
        };
        if let Some(assignments) = pipeline.assignment_only() {
            for (name, value) in assignments { self.env.set(name.as_str(), value.as_str()); }
            self.last_status = 0;
            return Flow::Continue;
        }
        let result = PipelineExecutor::new(&self.factory, self.config.pipeline_model).run(&pipeline, io, &self.env);
        self.last_status = result.code;
        result.flow
    }

    pub fn parse_line(&self, line: &str) -> Result<Option<Pipeline>, ShellError> {
        let expanded = expand(line, &self.env, self.last_status);
        Ok(parse(&tokenize(&expanded)?)?)
    }
}
