//! Stages as forked processes connected by OS pipes.
//!
//! The child puts its three streams on descriptors 0/1/2, closes every other
//! pipe end this backend created that is still open, then either `exec`s the external program
//! in place or runs the builtin and exits with its status. Endpoints that
//! live in memory are bridged through an extra pipe and a pump thread in the
//! parent.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::os::fd::{AsRawFd, FromRawFd, RawFd};
use std::sync::{Mutex, MutexGuard};
use std::thread::JoinHandle;

use nix::errno::Errno;
use nix::fcntl::{fcntl, FcntlArg, FdFlag};
use nix::sys::stat::fstat;
use nix::sys::wait::{waitpid, WaitStatus};
use nix::unistd::{close, dup, dup2, fork, pipe, ForkResult, Pid};
use tracing::{debug, warn};

use super::{StageBackend, StageHandle, StageJob};
use crate::external::SPAWN_FAILED;
use crate::pump::spawn_pump;
use crate::stream::{Input, Output, Streams};

const DEV_NULL: &str = "/dev/null";

/// A pipe end this backend created. The number alone is not enough: once
/// the end is closed, the number can come back as an unrelated descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PipeFd { fd: RawFd, dev: u64, ino: u64 }

impl PipeFd {
    fn of(fd: RawFd) -> io::Result<PipeFd> {
        let st = fstat(fd)?;
        Ok(PipeFd { fd, dev: st.st_dev as u64, ino: st.st_ino as u64 })
    }

    /// Still open and still the same pipe.
    fn is_live(&self) -> bool { PipeFd::of(self.fd).is_ok_and(|now| now == *self) }
}

/// Backend for one pipeline run. Remembers the pipe ends it handed out so
/// that children can close the ones that are not theirs.
#[derive(Debug, Default)]
pub struct ForkBackend { pipe_fds: Mutex<Vec<PipeFd>> }

impl ForkBackend {
    pub fn new() -> Self { Self::default() }

    fn fds(&self) -> MutexGuard<'_, Vec<PipeFd>> { self.pipe_fds.lock().unwrap_or_else(|e| e.into_inner()) }

    /// Registered ends that are still open, dropping the rest from the registry.
    fn live_fds(&self) -> Vec<PipeFd> {
        let mut fds = self.fds();
        fds.retain(PipeFd::is_live);
        fds.clone()
    }

    /// Closes the parent's copies of a child's descriptors and forgets them.
    fn release(&self, fds: [ChildFd; 3]) {
        let mut registry = self.fds();
        for fd in fds {
            if let ChildFd::Owned(f) = fd {
                registry.retain(|p| p.fd != f.as_raw_fd());
                // closed under the lock so no launch sees the number in between
                drop(f);
            }
        }
    }

    /// `(read, write)` pipe, close-on-exec on both ends.
    fn pipe(&self) -> io::Result<(File, File)> {
        let (r, w) = pipe()?;
        for fd in [r.as_raw_fd(), w.as_raw_fd()] {
            fcntl(fd, FcntlArg::F_SETFD(FdFlag::FD_CLOEXEC))?;
        }
        let ends = [PipeFd::of(r.as_raw_fd())?, PipeFd::of(w.as_raw_fd())?];
        self.fds().extend(ends);
        Ok((File::from(r), File::from(w)))
    }

    fn child_input(&self, input: Input, pumps: &mut Vec<JoinHandle<()>>) -> io::Result<ChildFd> {
        Ok(match input {
            Input::Stdin => ChildFd::Std(0),
            Input::File(f) => ChildFd::Owned(f),
            Input::Null => ChildFd::Owned(File::open(DEV_NULL)?),
            other => {
                let (r, w) = self.pipe()?;
                pumps.push(spawn_pump("bridge-in", other, w)?);
                ChildFd::Owned(r)
            }
        })
    }

    fn child_output(&self, output: Output, pumps: &mut Vec<JoinHandle<()>>) -> io::Result<ChildFd> {
        Ok(match output {
            Output::Stdout => ChildFd::Std(1),
            Output::Stderr => ChildFd::Std(2),
            Output::File(f) => ChildFd::Owned(f),
            Output::Null => ChildFd::Owned(OpenOptions::new().write(true).open(DEV_NULL)?),
            other => {
                let (r, w) = self.pipe()?;
                pumps.push(spawn_pump("bridge-out", r, other)?);
                ChildFd::Owned(w)
            }
        })
    }
}

/// A descriptor the child will see as one of 0/1/2.
enum ChildFd {
    /// One of the shell's own standard descriptors.
    Std(RawFd),
    Owned(File),
}

impl ChildFd {
    fn raw(&self) -> RawFd {
        match self { ChildFd::Std(fd) => *fd, ChildFd::Owned(f) => f.as_raw_fd() }
    }
}

struct ForkStage { label: String, pid: Pid, pumps: Vec<JoinHandle<()>> }

impl StageHandle for ForkStage {
    fn wait(self: Box<Self>) -> i32 {
        let code = loop {
            match waitpid(self.pid, None) {
                Ok(WaitStatus::Exited(_, code)) => break code,
                Ok(WaitStatus::Signaled(_, sig, _)) => break 128 + sig as i32,
                Ok(_) => continue,
                Err(Errno::EINTR) => continue,
                Err(e) => { warn!(stage = %self.label, pid = %self.pid, error = %e, "waitpid failed"); break SPAWN_FAILED; }
            }
        };
        // bridged output is complete only once its pump saw EOF
        for p in self.pumps {
            if p.join().is_err() { warn!(stage = %self.label, "bridge pump panicked"); }
        }
        debug!(stage = %self.label, code, "fork stage exited");
        code
    }
}

impl StageBackend for ForkBackend {
    fn name(&self) -> &'static str { "fork" }

    fn conduit(&self) -> io::Result<(Output, Input)> {
        let (r, w) = self.pipe()?;
        Ok((Output::File(w), Input::File(r)))
    }

    fn launch(&self, job: StageJob, io: Streams) -> io::Result<Box<dyn StageHandle>> {
        let mut pumps = Vec::new();
        let Streams { input, output, error } = io;
        let fds = [self.child_input(input, &mut pumps)?, self.child_output(output, &mut pumps)?, self.child_output(error, &mut pumps)?];
        let inherited = self.live_fds();
        let _ = io::stdout().flush();
        let _ = io::stderr().flush();

        // SAFETY: the child only rewires descriptors, then execs or runs the
        // builtin to completion and exits without returning into the caller.
        match unsafe { fork() } {
            Ok(ForkResult::Child) => run_child(job, fds, &inherited),
            Ok(ForkResult::Parent { child }) => {
                // the child holds its own copies now
                self.release(fds);
                debug!(stage = %job.label, pid = %child, "forked stage");
                Ok(Box::new(ForkStage { label: job.label, pid: child, pumps }))
            }
            Err(e) => {
                self.release(fds);
                // pumps end by themselves once their pipe peer is gone
                warn!(stage = %job.label, error = %e, "fork failed");
                Err(e.into())
            }
        }
    }
}

fn run_child(job: StageJob, fds: [ChildFd; 3], inherited: &[PipeFd]) -> ! {
    let raw = [fds[0].raw(), fds[1].raw(), fds[2].raw()];
    for (target, &src) in raw.iter().enumerate() {
        let target = target as RawFd;
        if src != target && dup2(src, target).is_err() {
            // SAFETY: terminating the forked child without unwinding
            unsafe { libc::_exit(SPAWN_FAILED) }
        }
    }
    // closed below by number
    std::mem::forget(fds);
    for p in inherited {
        if p.fd > 2 && p.is_live() { let _ = close(p.fd); }
    }
    for fd in raw {
        if fd > 2 { let _ = close(fd); }
    }

    if let Some(ext) = job.command.as_external() {
        let err = ext.exec_in_place(&job.env);
        let mut stderr = std_output(2);
        ext.report_spawn_error(&mut stderr, &err);
        // SAFETY: see above
        unsafe { libc::_exit(SPAWN_FAILED) }
    }
    let input = match dup(0) {
        // SAFETY: `dup` returned a fresh descriptor nobody else owns
        Ok(fd) => Input::File(unsafe { File::from_raw_fd(fd) }),
        Err(_) => Input::Null,
    };
    let mut io = Streams::new(input, std_output(1), std_output(2));
    let code = job.command.execute(&mut io, &job.env).stage_status();
    drop(io);
    std::process::exit(code)
}

/// Private handle on one of the child's standard output descriptors, so the
/// builtin never touches the process-wide `stdout()` lock inherited from the parent.
fn std_output(fd: RawFd) -> Output {
    match dup(fd) {
        // SAFETY: `dup` returned a fresh descriptor nobody else owns
        Ok(fd) => Output::File(unsafe { File::from_raw_fd(fd) }),
        Err(_) => Output::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::CommandFactory;
    use crate::env::Environment;
    use std::io::Read;

    fn job(name: &str, args: &[&str], index: usize) -> StageJob {
        let args: Vec<String> = args.iter().map(|s| s.to_string()).collect();
        StageJob::new(CommandFactory::new().create(name, &args), Environment::capture(), index)
    }

    #[test]
    fn builtin_stages_talk_through_a_pipe() {
        let backend = ForkBackend::new();
        let (w, r) = backend.conduit().unwrap();
        let (out, buf) = Output::buffer();
        let a = backend.launch(job("echo", &["hi"], 0), Streams::new(Input::Null, w, Output::Null)).unwrap();
        let b = backend.launch(job("wc", &[], 1), Streams::new(r, out, Output::Null)).unwrap();
        assert_eq!(a.wait(), 0);
        assert_eq!(b.wait(), 0);
        assert_eq!(buf.to_string_lossy(), "1 1 3\n");
    }

    #[test]
    fn external_stage_reads_bridged_input() {
        let backend = ForkBackend::new();
        let (out, buf) = Output::buffer();
        let h = backend.launch(job("cat", &[], 0), Streams::new(Input::from_bytes("bridged\n"), out, Output::Null)).unwrap();
        assert_eq!(h.wait(), 0);
        assert_eq!(buf.to_string_lossy(), "bridged\n");
    }

    #[test]
    fn exec_failure_and_signals_map_to_status() {
        let backend = ForkBackend::new();
        let (err, err_buf) = Output::buffer();
        let h = backend.launch(job("pipesh-no-such-program", &[], 0), Streams::new(Input::Null, Output::Null, err)).unwrap();
        assert_eq!(h.wait(), SPAWN_FAILED);
        assert!(err_buf.to_string_lossy().contains("pipesh-no-such-program"));

        let h = backend.launch(job("sh", &["-c", "kill -KILL $$"], 0), Streams::new(Input::Null, Output::Null, Output::Null)).unwrap();
        assert_eq!(h.wait(), 128 + 9);
    }

    #[test]
    fn exit_in_a_forked_stage_is_its_status() {
        let backend = ForkBackend::new();
        let h = backend.launch(job("exit", &["5"], 0), Streams::new(Input::Null, Output::Null, Output::Null)).unwrap();
        assert_eq!(h.wait(), 5);
    }

    #[test]
    fn registry_holds_only_open_pipe_ends() {
        let backend = ForkBackend::new();
        let (w, r) = backend.conduit().unwrap();
        assert_eq!(backend.live_fds().len(), 2);
        // closed outside any launch; its number may be handed out again
        drop(r);
        let reused = File::open(DEV_NULL).unwrap();
        assert!(backend.live_fds().iter().all(|p| p.fd != reused.as_raw_fd()));
        assert_eq!(backend.live_fds().len(), 1);

        let h = backend.launch(job("echo", &["x"], 0), Streams::new(Input::Null, w, Output::Null)).unwrap();
        assert!(backend.live_fds().is_empty());
        assert!(backend.fds().is_empty());
        h.wait();
    }

    #[test]
    fn conduit_ends_are_close_on_exec() {
        let backend = ForkBackend::new();
        let (w, mut r) = backend.conduit().unwrap();
        let Output::File(wf) = &w else { panic!("expected a pipe end") };
        let flags = fcntl(wf.as_raw_fd(), FcntlArg::F_GETFD).unwrap();
        assert!(FdFlag::from_bits_truncate(flags).contains(FdFlag::FD_CLOEXEC));
        drop(w);
        let mut rest = Vec::new();
        r.read_to_end(&mut rest).unwrap();
        assert!(rest.is_empty());
    }
}
