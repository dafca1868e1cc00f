use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("pool exhausted: requested {requested} samples, {available} available")]
    PoolExhausted { requested: usize, available: usize },

    #[error("reserve is only valid while no transient allocations are live")]
    ReserveAfterAlloc,
}

pub type Result<T> = core::result::Result<T, Error>;
