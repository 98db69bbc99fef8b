use thiserror::Error;

#[derive(Error, Debug)]
pub enum RiptideError {
    #[error("Buffer too small: required {required} bytes, available {available}")]
    BufferTooSmall { required: usize, available: usize },

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Checksum mismatch: expected {expected:#x}, got {actual:#x}")]
    ChecksumMismatch { expected: u16, actual: u16 },

    #[error("Pool {0} has no reachable server")]
    PoolUnavailable(u16),

    #[error("Channel disconnected: {0}")]
    ChannelDisconnected(&'static str),

    #[error("Critical error on '{0}'")]
    Critical(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, RiptideError>;
