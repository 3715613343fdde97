use std::io;
use std::thread::{self, JoinHandle};

use tracing::{debug, warn};

use super::{StageBackend, StageHandle, StageJob};
use crate::conduit::{conduit, DEFAULT_CAPACITY};
use crate::stream::{Input, Output, Streams};

/// Status of a stage whose thread panicked.
pub const STAGE_PANICKED: i32 = 1;

/// Every stage on its own thread, connected by in-memory conduits. Builtins
/// run in-process; external commands pump the conduits through OS pipes.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadBackend;

impl ThreadBackend {
    pub fn new() -> Self { ThreadBackend }
}

struct ThreadStage { label: String, handle: JoinHandle<i32> }

impl StageHandle for ThreadStage {
    fn wait(self: Box<Self>) -> i32 {
        match self.handle.join() {
            Ok(code) => code,
            Err(_) => { warn!(stage = %self.label, "stage thread panicked"); STAGE_PANICKED }
        }
    }
}

impl StageBackend for ThreadBackend {
    fn name(&self) -> &'static str { "threads" }

    fn conduit(&self) -> io::Result<(Output, Input)> {
        let (w, r) = conduit(DEFAULT_CAPACITY);
        Ok((Output::Conduit(w), Input::Conduit(r)))
    }

    fn launch(&self, job: StageJob, io: Streams) -> io::Result<Box<dyn StageHandle>> {
        let label = job.label.clone();
        debug!(stage = %label, "launching thread stage");
        let handle = thread::Builder::new().name(label.clone()).spawn(move || {
            let mut io = io;
            let result = job.command.execute(&mut io, &job.env);
            // closes our conduit ends: the next stage sees EOF, the previous one EPIPE
            drop(io);
            result.stage_status()
        })?;
        Ok(Box::new(ThreadStage { label, handle }))
    }
}
