use crate::builtins::Builtin;
use crate::env::Environment;
use crate::external::ExternalCommand;
use crate::stream::Streams;

/// What the shell loop should do after a command finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    /// Terminate the shell with this exit code.
    Exit(i32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandResult {
    pub code: i32,
    pub flow: Flow,
}

impl CommandResult {
    pub const fn code(code: i32) -> Self { CommandResult { code, flow: Flow::Continue } }

    pub const fn success() -> Self { Self::code(0) }

    /// Successful command asking the shell to terminate with `shell_code`.
    pub const fn exit(shell_code: i32) -> Self { CommandResult { code: 0, flow: Flow::Exit(shell_code) } }

    pub fn termination(&self) -> Option<i32> {
        match self.flow { Flow::Exit(n) => Some(n), Flow::Continue => None }
    }

    /// Status when the command ran as one stage of a multi-stage pipeline.
    /// A termination request cannot leave the stage; it becomes the stage's
    /// own exit status instead.
    pub fn stage_status(&self) -> i32 { self.termination().unwrap_or(self.code) }
}

/// A unit of execution: a builtin or an external program.
pub trait Command: Send {
    fn name(&self) -> &str;

    fn execute(&self, io: &mut Streams, env: &Environment) -> CommandResult;

    fn as_external(&self) -> Option<&ExternalCommand> { None }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinKind { Echo, Pwd, Cat, Wc, Exit, Grep }

impl BuiltinKind {
    pub const ALL: [BuiltinKind; 6] = [BuiltinKind::Echo, BuiltinKind::Pwd, BuiltinKind::Cat, BuiltinKind::Wc, BuiltinKind::Exit, BuiltinKind::Grep];

    pub fn name(self) -> &'static str {
        match self {
            BuiltinKind::Echo => "echo",
            BuiltinKind::Pwd => "pwd",
            BuiltinKind::Cat => "cat",
            BuiltinKind::Wc => "wc",
            BuiltinKind::Exit => "exit",
            BuiltinKind::Grep => "grep",
        }
    }

    /// Exact, case-sensitive lookup.
    pub fn lookup(name: &str) -> Option<BuiltinKind> { Self::ALL.into_iter().find(|k| k.name() == name) }
}

/// Maps a command name to its implementation; unknown names run as external programs.
#[derive(Debug, Default, Clone, Copy)]
pub struct CommandFactory;

impl CommandFactory {
    pub fn new() -> Self { CommandFactory }

    pub fn create(&self, name: &str, args: &[String]) -> Box<dyn Command> {
        match BuiltinKind::lookup(name) {
            Some(kind) => Box::new(Builtin::new(kind, args.to_vec())),
            None => Box::new(ExternalCommand::new(name, args.to_vec())),
        }
    }
}
