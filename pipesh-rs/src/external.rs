use std::io::{self, Write};
use std::process::{self, ExitStatus, Stdio};
use std::thread;

use tracing::{debug, warn};

use crate::command::{Command, CommandResult};
use crate::env::Environment;
use crate::pump::pump_logged;
use crate::stream::{Output, Streams};

/// Exit status reported when a program cannot be started.
pub const SPAWN_FAILED: i32 = 127;

/// Runs a program found through the environment's `PATH` as a child process.
#[derive(Debug, Clone)]
pub struct ExternalCommand { program: String, args: Vec<String> }

impl ExternalCommand {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self { ExternalCommand { program: program.into(), args } }

    /// argv (program + args, no shell re-interpretation) with exactly `env` as environment.
    fn command(&self, env: &Environment) -> process::Command {
        let mut cmd = process::Command::new(&self.program);
        cmd.args(&self.args);
        env.apply_to(&mut cmd);
        cmd
    }

    /// Replaces the current process image with the program. Only returns on failure.
    #[cfg(unix)]
    pub fn exec_in_place(&self, env: &Environment) -> io::Error {
        use std::os::unix::process::CommandExt;
        self.command(env).exec()
    }

    pub(crate) fn report_spawn_error(&self, err_out: &mut Output, e: &io::Error) {
        let _ = match e.kind() {
            io::ErrorKind::NotFound => writeln!(err_out, "pipesh: {}: command not found", self.program),
            _ => writeln!(err_out, "pipesh: {}: {e}", self.program),
        };
        let _ = err_out.flush();
    }

    fn spawn_failed(&self, io: &mut Streams, e: io::Error) -> CommandResult {
        debug!(program = %self.program, error = %e, "spawn failed");
        self.report_spawn_error(&mut io.error, &e);
        CommandResult::code(SPAWN_FAILED)
    }
}

/// The child's stdio for each stream: the native handle itself, or a pipe to pump through.
fn child_stdio(io: &Streams) -> io::Result<[Stdio; 3]> {
    let wire = |native: Option<Stdio>| native.unwrap_or_else(Stdio::piped);
    Ok([wire(io.input.native_stdio()?), wire(io.output.native_stdio()?), wire(io.error.native_stdio()?)])
}

impl Command for ExternalCommand {
    fn name(&self) -> &str { &self.program }

    fn execute(&self, io: &mut Streams, env: &Environment) -> CommandResult {
        let mut cmd = self.command(env);
        let [stdin, stdout, stderr] = match child_stdio(io) {
            Ok(w) => w,
            Err(e) => return self.spawn_failed(io, e),
        };
        cmd.stdin(stdin).stdout(stdout).stderr(stderr);
        // our own buffered output must land before the child's
        let _ = io.output.flush();
        let _ = io.error.flush();

        let mut child = match cmd.spawn() {
            Ok(c) => c,
            Err(e) => return self.spawn_failed(io, e),
        };
        debug!(program = %self.program, pid = child.id(), "spawned");
        let (child_in, child_out, child_err) = (child.stdin.take(), child.stdout.take(), child.stderr.take());
        let Streams { input, output, error } = io;

        let status = thread::scope(|s| {
            if let Some(mut w) = child_in {
                let spawned = thread::Builder::new().name("pump-stdin".into()).spawn_scoped(s, move || {
                    pump_logged("stdin", input, &mut w);
                    // `w` drops here: the child sees EOF
                });
                if let Err(e) = spawned { warn!(error = %e, "stdin pump not started"); }
            }
            if let Some(mut r) = child_out {
                let spawned = thread::Builder::new().name("pump-stdout".into()).spawn_scoped(s, move || pump_logged("stdout", &mut r, output));
                if let Err(e) = spawned { warn!(error = %e, "stdout pump not started"); }
            }
            if let Some(mut r) = child_err {
                let spawned = thread::Builder::new().name("pump-stderr".into()).spawn_scoped(s, move || pump_logged("stderr", &mut r, error));
                if let Err(e) = spawned { warn!(error = %e, "stderr pump not started"); }
            }
            child.wait()
            // leaving the scope joins every pump, so trailing output is never lost
        });

        let code = match status {
            Ok(st) => exit_code(st),
            Err(e) => { warn!(program = %self.program, error = %e, "wait failed"); SPAWN_FAILED }
        };
        debug!(program = %self.program, code, "exited");
        CommandResult::code(code)
    }

    fn as_external(&self) -> Option<&ExternalCommand> { Some(self) }
}

/// Normal exit -> its code; killed by a signal -> 128 + signal number.
pub fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() { return code; }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(sig) = status.signal() { return 128 + sig; }
    }
    SPAWN_FAILED
}
