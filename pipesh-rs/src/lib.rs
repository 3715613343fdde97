//! `pipesh`: a small line-oriented shell built around a concurrent pipeline
//! executor. Builtins and external programs can be mixed freely in a
//! pipeline; stages run as threads over in-memory conduits or as forked
//! processes over OS pipes.

pub mod builtins;
pub mod command;
pub mod conduit;
pub mod config;
pub mod env;
pub mod error;
pub mod executor;
pub mod expand;
pub mod external;
pub mod grep;
pub mod lexer;
pub mod logging;
pub mod parser;
pub mod pump;
pub mod shell;
pub mod stage;
pub mod stream;

pub use command::{Command, CommandFactory, CommandResult, Flow};
pub use config::{PipelineModel, ShellConfig};
pub use env::Environment;
pub use error::{ParseError, ShellError};
pub use executor::PipelineExecutor;
pub use shell::{LineSource, Shell};
pub use stream::{Input, Output, Streams};
