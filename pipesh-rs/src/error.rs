use std::io;

use thiserror::Error;

/// Why a line could not be turned into a pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("unterminated {0} quote")]
    UnterminatedQuote(char),
    #[error("trailing backslash")]
    TrailingBackslash,
    #[error("missing command before '|'")]
    EmptyStageBefore,
    #[error("missing command after '|'")]
    EmptyStageAfter,
}

#[derive(Debug, Error)]
pub enum ShellError {
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),
    #[error("read error: {0}")]
    Read(#[source] io::Error),
}
