use thiserror::Error;

#[derive(Error, Debug)]
pub enum KvError {
    #[error("decode error: {0}")]
    Decode(String),

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("node has failed")]
    NodeFailed,
}

pub type Result<T> = std::result::Result<T, KvError>;
