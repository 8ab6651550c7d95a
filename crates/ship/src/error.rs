use thiserror::Error;

#[derive(Error, Debug)]
pub enum ShipError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cannot resolve offshore host {host}: {source}")]
    Resolve {
        host: String,
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, ShipError>;
