use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("socket: {0}")]
    Io(#[from] std::io::Error),

    #[error("osc encode: {0}")]
    Encode(#[from] rosc::OscError),
}

pub type Result<T> = std::result::Result<T, Error>;
