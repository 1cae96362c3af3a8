use std::num::ParseIntError;

use thiserror::Error;

/// Errors at the UCI parsing boundary. Search-internal interruption is
/// not an error; see [`crate::util::Unwind`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UciError {
    #[error("unknown command {0:?}")]
    UnknownCommand(String),
    #[error("expected a token after {0:?}")]
    MissingToken(&'static str),
    #[error("invalid position: {0}")]
    InvalidPosition(String),
    #[error("illegal move {0:?}")]
    IllegalMove(String),
    #[error("cannot parse move {0:?}")]
    InvalidMove(String),
    #[error("bad go parameter: {0}")]
    ParseGo(String),
    #[error("bad option: {0}")]
    ParseOption(String),
}

impl From<ParseIntError> for UciError {
    fn from(err: ParseIntError) -> Self {
        Self::ParseGo(err.to_string())
    }
}
