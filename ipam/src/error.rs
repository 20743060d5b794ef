use thiserror::Error;

#[derive(Error, Debug)]
pub enum IpamError {
    #[error("unknown pool: {0}")]
    UnknownPool(String),

    #[error("address pool exhausted")]
    PoolExhausted,

    #[error("invalid address: {0}")]
    InvalidAddress(String),
}
