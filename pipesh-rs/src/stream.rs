//! Logical streams handed to a command invocation.
//!
//! `Stdin`/`Stdout`/`Stderr`/`File`/`Null` are backed by an OS descriptor and
//! can be given to a child process as-is. Conduits, shared readers and
//! buffers live in memory; a child process reaches them through an OS pipe
//! and a pump thread.

use std::fmt;
use std::fs::File;
use std::io::{self, Cursor, Read, Write};
use std::process::Stdio;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::conduit::{ConduitReader, ConduitWriter};

pub type SharedReader = Arc<Mutex<Box<dyn Read + Send>>>;

/// Growable byte buffer shared between a writer and whoever inspects it afterwards.
#[derive(Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub fn new() -> Self { Self::default() }
    fn lock(&self) -> MutexGuard<'_, Vec<u8>> { self.0.lock().unwrap_or_else(|e| e.into_inner()) }
    pub fn contents(&self) -> Vec<u8> { self.lock().clone() }
    pub fn to_string_lossy(&self) -> String { String::from_utf8_lossy(&self.lock()).into_owned() }
}

/// The process's descriptor 0, read without std's stdin buffer. Bytes
/// nobody has asked for stay in the descriptor, where forked stages and
/// child processes will find them.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawStdin;

impl Read for RawStdin {
    #[cfg(unix)]
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            match nix::unistd::read(0, buf) {
                Ok(n) => return Ok(n),
                Err(nix::errno::Errno::EINTR) => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    #[cfg(not(unix))]
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> { io::stdin().read(buf) }
}

impl fmt::Debug for SharedBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "SharedBuffer({} bytes)", self.lock().len()) }
}

pub enum Input {
    Stdin,
    Null,
    File(File),
    Conduit(ConduitReader),
    Shared(SharedReader),
}

pub enum Output {
    Stdout,
    Stderr,
    Null,
    File(File),
    Conduit(ConduitWriter),
    Buffer(SharedBuffer),
}

impl Input {
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Input {
        Input::Shared(Arc::new(Mutex::new(Box::new(Cursor::new(bytes.into())))))
    }

    pub fn is_native(&self) -> bool { matches!(self, Input::Stdin | Input::Null | Input::File(_)) }

    /// Duplicates a shell endpoint. Conduit ends have a single owner and refuse.
    pub fn try_clone(&self) -> io::Result<Input> {
        Ok(match self {
            Input::Stdin => Input::Stdin,
            Input::Null => Input::Null,
            Input::File(f) => Input::File(f.try_clone()?),
            Input::Shared(r) => Input::Shared(r.clone()),
            Input::Conduit(_) => return Err(single_owner()),
        })
    }

    /// Stdio handing this stream straight to a child, or `None` when a pipe is needed.
    pub fn native_stdio(&self) -> io::Result<Option<Stdio>> {
        Ok(match self {
            Input::Stdin => Some(Stdio::inherit()),
            Input::Null => Some(Stdio::null()),
            Input::File(f) => Some(Stdio::from(f.try_clone()?)),
            Input::Conduit(_) | Input::Shared(_) => None,
        })
    }
}

impl Output {
    pub fn buffer() -> (Output, SharedBuffer) {
        let buf = SharedBuffer::new();
        (Output::Buffer(buf.clone()), buf)
    }

    pub fn is_native(&self) -> bool { matches!(self, Output::Stdout | Output::Stderr | Output::Null | Output::File(_)) }

    pub fn try_clone(&self) -> io::Result<Output> {
        Ok(match self {
            Output::Stdout => Output::Stdout,
            Output::Stderr => Output::Stderr,
            Output::Null => Output::Null,
            Output::File(f) => Output::File(f.try_clone()?),
            Output::Buffer(b) => Output::Buffer(b.clone()),
            Output::Conduit(_) => return Err(single_owner()),
        })
    }

    pub fn native_stdio(&self) -> io::Result<Option<Stdio>> {
        Ok(match self {
            Output::Stdout => Some(Stdio::from(io::stdout())),
            Output::Stderr => Some(Stdio::from(io::stderr())),
            Output::Null => Some(Stdio::null()),
            Output::File(f) => Some(Stdio::from(f.try_clone()?)),
            Output::Conduit(_) | Output::Buffer(_) => None,
        })
    }
}

fn single_owner() -> io::Error { io::Error::new(io::ErrorKind::Unsupported, "conduit ends cannot be duplicated") }

impl Read for Input {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Input::Stdin => RawStdin.read(buf),
            Input::Null => Ok(0),
            Input::File(f) => f.read(buf),
            Input::Conduit(r) => r.read(buf),
            Input::Shared(r) => r.lock().unwrap_or_else(|e| e.into_inner()).read(buf),
        }
    }
}

impl Write for Output {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Output::Stdout => io::stdout().write(buf),
            Output::Stderr => io::stderr().write(buf),
            Output::Null => Ok(buf.len()),
            Output::File(f) => f.write(buf),
            Output::Conduit(w) => w.write(buf),
            Output::Buffer(b) => { b.lock().extend_from_slice(buf); Ok(buf.len()) }
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Output::Stdout => io::stdout().flush(),
            Output::Stderr => io::stderr().flush(),
            Output::File(f) => f.flush(),
            Output::Conduit(w) => w.flush(),
            Output::Null | Output::Buffer(_) => Ok(()),
        }
    }
}

impl fmt::Debug for Input {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self { Input::Stdin => "Stdin", Input::Null => "Null", Input::File(_) => "File", Input::Conduit(_) => "Conduit", Input::Shared(_) => "Shared" })
    }
}

impl fmt::Debug for Output {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self { Output::Stdout => "Stdout", Output::Stderr => "Stderr", Output::Null => "Null", Output::File(_) => "File", Output::Conduit(_) => "Conduit", Output::Buffer(_) => "Buffer" })
    }
}

/// The `{in, out, err}` triple bound to one command invocation.
#[derive(Debug)]
pub struct Streams {
    pub input: Input,
    pub output: Output,
    pub error: Output,
}

impl Streams {
    pub fn new(input: Input, output: Output, error: Output) -> Self { Streams { input, output, error } }

    /// The shell process's own stdin/stdout/stderr.
    pub fn inherit() -> Self { Streams::new(Input::Stdin, Output::Stdout, Output::Stderr) }

    pub fn is_native(&self) -> bool { self.input.is_native() && self.output.is_native() && self.error.is_native() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_input_clones_read_the_same_cursor() {
        let mut a = Input::from_bytes("abcdef");
        let mut b = a.try_clone().unwrap();
        let mut buf = [0u8; 3];
        a.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"abc");
        let mut rest = String::new();
        b.read_to_string(&mut rest).unwrap();
        assert_eq!(rest, "def");
    }

    #[test]
    fn buffer_output_is_visible_through_the_handle() {
        let (mut out, buf) = Output::buffer();
        let mut second = out.try_clone().unwrap();
        out.write_all(b"one ").unwrap();
        second.write_all(b"two").unwrap();
        assert_eq!(buf.to_string_lossy(), "one two");
    }

    #[test]
    fn conduit_ends_refuse_to_clone() {
        let (w, r) = crate::conduit::conduit(8);
        assert!(Output::Conduit(w).try_clone().is_err());
        assert!(Input::Conduit(r).try_clone().is_err());
    }

    #[test]
    fn nativeness() {
        assert!(Streams::inherit().is_native());
        let (out, _) = Output::buffer();
        assert!(!Streams::new(Input::Null, out, Output::Stderr).is_native());
    }
}
