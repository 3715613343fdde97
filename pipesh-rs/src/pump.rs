use std::io::{self, Read, Write};
use std::thread::{self, JoinHandle};

use tracing::debug;

const CHUNK: usize = 4096;

/// Copies `from` into `to` until EOF, flushing after every chunk so a
/// downstream reader sees data as soon as it is produced.
pub fn pump<R: Read + ?Sized, W: Write + ?Sized>(from: &mut R, to: &mut W) -> io::Result<u64> {
    let mut buf = [0u8; CHUNK];
    let mut total = 0u64;
    loop {
        let n = match from.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        to.write_all(&buf[..n])?;
        to.flush()?;
        total += n as u64;
    }
    Ok(total)
}

/// Runs [`pump`] and logs the outcome. A broken pipe just means the other
/// side went away first and is not reported.
pub fn pump_logged<R: Read + ?Sized, W: Write + ?Sized>(label: &str, from: &mut R, to: &mut W) {
    match pump(from, to) {
        Ok(n) => debug!(label, bytes = n, "pump drained"),
        Err(e) if e.kind() == io::ErrorKind::BrokenPipe => debug!(label, "pump stopped: peer closed"),
        Err(e) => debug!(label, error = %e, "pump stopped"),
    }
}

/// Pump on its own thread; both ends are dropped (closed) when it finishes.
pub fn spawn_pump<R, W>(label: &'static str, mut from: R, mut to: W) -> io::Result<JoinHandle<()>>
where
    R: Read + Send + 'static,
    W: Write + Send + 'static,
{
    thread::Builder::new().name(format!("pump-{label}")).spawn(move || pump_logged(label, &mut from, &mut to))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conduit::conduit;

    #[test]
    fn copies_everything_in_order() {
        let mut src: &[u8] = b"0123456789abcdef";
        let mut dst = Vec::new();
        assert_eq!(pump(&mut src, &mut dst).unwrap(), 16);
        assert_eq!(dst, b"0123456789abcdef");
    }

    #[test]
    fn thread_pump_closes_its_sink() {
        let (w, mut r) = conduit(16);
        let src = std::io::Cursor::new(vec![b'x'; 5000]);
        let h = spawn_pump("test", src, w).unwrap();
        let mut got = Vec::new();
        r.read_to_end(&mut got).unwrap();
        h.join().unwrap();
        assert_eq!(got.len(), 5000);
    }
}
