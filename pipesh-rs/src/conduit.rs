//! In-memory byte conduit between two pipeline stages.
//!
//! Reads block while the conduit is empty and the writer is alive; writes
//! block while it is full and the reader is alive. Dropping the writer is
//! EOF for the reader, dropping the reader turns further writes into
//! `BrokenPipe`.

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};

pub const DEFAULT_CAPACITY: usize = 64 * 1024;

struct State { buf: VecDeque<u8>, writer_open: bool, reader_open: bool }

struct Shared { state: Mutex<State>, readable: Condvar, writable: Condvar, capacity: usize }

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        // a panicking peer must still be able to signal EOF
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

pub struct ConduitWriter { shared: Arc<Shared> }

pub struct ConduitReader { shared: Arc<Shared> }

/// Creates a conduit holding at most `capacity` unread bytes.
pub fn conduit(capacity: usize) -> (ConduitWriter, ConduitReader) {
    let shared = Arc::new(Shared {
        state: Mutex::new(State { buf: VecDeque::new(), writer_open: true, reader_open: true }),
        readable: Condvar::new(),
        writable: Condvar::new(),
        capacity: capacity.max(1),
    });
    (ConduitWriter { shared: shared.clone() }, ConduitReader { shared })
}

impl Write for ConduitWriter {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        if data.is_empty() { return Ok(0); }
        let mut st = self.shared.lock();
        loop {
            if !st.reader_open { return Err(io::Error::new(io::ErrorKind::BrokenPipe, "conduit reader closed")); }
            let room = self.shared.capacity.saturating_sub(st.buf.len());
            if room > 0 {
                let n = room.min(data.len());
                st.buf.extend(&data[..n]);
                self.shared.readable.notify_all();
                return Ok(n);
            }
            st = self.shared.writable.wait(st).unwrap_or_else(|e| e.into_inner());
        }
    }

    fn flush(&mut self) -> io::Result<()> { Ok(()) }
}

impl Drop for ConduitWriter {
    fn drop(&mut self) {
        let mut st = self.shared.lock();
        st.writer_open = false;
        self.shared.readable.notify_all();
    }
}

impl Read for ConduitReader {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        if out.is_empty() { return Ok(0); }
        let mut st = self.shared.lock();
        loop {
            if !st.buf.is_empty() {
                let n = out.len().min(st.buf.len());
                for (slot, b) in out.iter_mut().zip(st.buf.drain(..n)) { *slot = b; }
                self.shared.writable.notify_all();
                return Ok(n);
            }
            if !st.writer_open { return Ok(0); }
            st = self.shared.readable.wait(st).unwrap_or_else(|e| e.into_inner());
        }
    }
}

impl Drop for ConduitReader {
    fn drop(&mut self) {
        let mut st = self.shared.lock();
        st.reader_open = false;
        st.buf.clear();
        self.shared.writable.notify_all();
    }
}
