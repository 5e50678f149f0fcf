use thiserror::Error;

#[derive(Error, Debug)]
pub enum FarmError {
    #[error("Invalid worker host {0:?}: hosts must be ASCII")]
    InvalidHost(String),

    #[error("Invalid worker public key: {0}")]
    InvalidKey(String),

    #[error("Invalid signing key: {0}")]
    InvalidSigningKey(String),

    #[error("Pool is shut down")]
    PoolClosed,
}

pub type Result<T> = std::result::Result<T, FarmError>;
