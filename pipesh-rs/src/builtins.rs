use std::fmt::Display;
use std::fs::File;
use std::io::{self, Read, Write};

use crate::command::{BuiltinKind, Command, CommandResult};
use crate::env::Environment;
use crate::pump::pump;
use crate::stream::Streams;

/// Status of a builtin whose output reader went away: the same status a
/// program killed by `SIGPIPE` reports.
pub const OUTPUT_CLOSED: i32 = 128 + 13;

/// An in-process command from the fixed builtin table.
#[derive(Debug, Clone)]
pub struct Builtin { kind: BuiltinKind, args: Vec<String> }

impl Builtin {
    pub fn new(kind: BuiltinKind, args: Vec<String>) -> Self { Builtin { kind, args } }
}

impl Command for Builtin {
    fn name(&self) -> &str { self.kind.name() }

    fn execute(&self, io: &mut Streams, _env: &Environment) -> CommandResult {
        let args = &self.args;
        let code = match self.kind {
            BuiltinKind::Echo => run_echo(args, io),
            BuiltinKind::Pwd => run_pwd(args, io),
            BuiltinKind::Cat => run_cat(args, io),
            BuiltinKind::Wc => run_wc(args, io),
            BuiltinKind::Grep => crate::grep::run_grep(args, io),
            BuiltinKind::Exit => return run_exit(args, io),
        };
        let _ = io.output.flush();
        CommandResult::code(code)
    }
}

/// Writes `<name>: <msg>` to the command's error stream.
pub(crate) fn report(io: &mut Streams, name: &str, msg: impl Display) {
    let _ = writeln!(io.error, "{name}: {msg}");
    let _ = io.error.flush();
}

/// A vanished reader stops the command without a message; any other write
/// error is reported.
pub(crate) fn write_failed(io: &mut Streams, name: &str, e: io::Error) -> i32 {
    if e.kind() == io::ErrorKind::BrokenPipe { return OUTPUT_CLOSED; }
    report(io, name, format_args!("write error: {e}"));
    1
}

fn run_echo(args: &[String], io: &mut Streams) -> i32 {
    let line = format!("{}\n", args.join(" "));
    match io.output.write_all(line.as_bytes()) {
        Ok(()) => 0,
        Err(e) => write_failed(io, "echo", e),
    }
}

fn run_pwd(args: &[String], io: &mut Streams) -> i32 {
    if !args.is_empty() { report(io, "pwd", "too many arguments"); return 2; }
    let cwd = match std::env::current_dir() {
        Ok(p) => p,
        Err(_) => { report(io, "pwd", "failed to get current directory"); return 1; }
    };
    match writeln!(io.output, "{}", cwd.display()) {
        Ok(()) => 0,
        Err(e) => write_failed(io, "pwd", e),
    }
}

fn run_cat(args: &[String], io: &mut Streams) -> i32 {
    if args.is_empty() {
        return match pump(&mut io.input, &mut io.output) {
            Ok(_) => 0,
            Err(e) if e.kind() == io::ErrorKind::BrokenPipe => OUTPUT_CLOSED,
            Err(e) => { report(io, "cat", e); 1 }
        };
    }
    let mut code = 0;
    for path in args {
        let mut f = match File::open(path) {
            Ok(f) => f,
            Err(_) => { report(io, "cat", format_args!("cannot open file: {path}")); code = 1; continue; }
        };
        match pump(&mut f, &mut io.output) {
            Ok(_) => {}
            // later files have nowhere to go either
            Err(e) if e.kind() == io::ErrorKind::BrokenPipe => return OUTPUT_CLOSED,
            Err(e) => { report(io, "cat", format_args!("{path}: {e}")); code = 1; }
        }
    }
    code
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WcStats { pub lines: usize, pub words: usize, pub bytes: usize }

/// Counts like POSIX `wc`: newlines, maximal runs of non-space bytes, bytes.
pub fn count_stream<R: Read + ?Sized>(r: &mut R) -> io::Result<WcStats> {
    let mut s = WcStats::default();
    let mut in_word = false;
    let mut buf = [0u8; 8192];
    loop {
        let n = match r.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        s.bytes += n;
        for &c in &buf[..n] {
            if c == b'\n' { s.lines += 1; }
            // C isspace(): includes \v and \f, unlike u8::is_ascii_whitespace
            let ws = matches!(c, b' ' | b'\t' | b'\n' | b'\r' | 0x0b | 0x0c);
            if ws { in_word = false; } else if !in_word { s.words += 1; in_word = true; }
        }
    }
    Ok(s)
}

fn run_wc(args: &[String], io: &mut Streams) -> i32 {
    let stats = match args {
        [] => count_stream(&mut io.input),
        [path] => match File::open(path) {
            Ok(mut f) => count_stream(&mut f),
            Err(_) => { report(io, "wc", format_args!("cannot open file: {path}")); return 1; }
        },
        _ => { report(io, "wc", "expected exactly one file argument"); return 2; }
    };
    let s = match stats {
        Ok(s) => s,
        Err(e) => { report(io, "wc", e); return 1; }
    };
    match writeln!(io.output, "{} {} {}", s.lines, s.words, s.bytes) {
        Ok(()) => 0,
        Err(e) => write_failed(io, "wc", e),
    }
}

fn run_exit(args: &[String], io: &mut Streams) -> CommandResult {
    match args {
        [] => CommandResult::exit(0),
        [code] => match code.trim().parse::<i32>() {
            Ok(n) => CommandResult::exit(n),
            Err(_) => { report(io, "exit", "expected numeric exit code"); CommandResult::code(2) }
        },
        _ => { report(io, "exit", "too many arguments"); CommandResult::code(1) }
    }
}
