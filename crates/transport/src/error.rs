use sealink_proto::{DecodeError, FrameType};
use thiserror::Error;

/// Errors that can occur on the framed link.
#[derive(Error, Debug)]
pub enum LinkError {
    #[error("link I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("link closed by peer")]
    Closed,

    #[error("frame protocol violation: {0}")]
    Frame(#[from] DecodeError),

    #[error("unexpected {0} frame for the current mode")]
    UnexpectedFrame(FrameType),
}

pub type Result<T> = std::result::Result<T, LinkError>;
