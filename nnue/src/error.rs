use std::io;

/// Errors raised while loading, quantizing or (de)serializing a network.
#[derive(thiserror::Error, Debug)]
pub enum NnueError {
    /// A quantized value does not fit the storage width of its tensor.
    #[error("{tensor}: quantized range [{min}, {max}] does not fit in {bits}-bit storage")]
    OutOfRange {
        tensor: &'static str,
        min: i64,
        max: i64,
        bits: u32,
    },

    /// Network file length does not match the assumed architecture.
    #[error("network file is {actual} bytes, architecture expects {expected}")]
    ArchitectureMismatch { expected: usize, actual: usize },

    /// Tensor has the wrong number of elements for the architecture.
    #[error("{tensor}: expected {expected} values, got {actual}")]
    ShapeMismatch {
        tensor: String,
        expected: usize,
        actual: usize,
    },

    #[error("checkpoint is missing tensor '{0}'")]
    MissingTensor(String),

    #[error("invalid architecture: {0}")]
    InvalidArchitecture(String),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Candle(#[from] candle_core::Error),

    #[error(transparent)]
    Persist(#[from] tempfile::PersistError),
}

pub type Result<T> = std::result::Result<T, NnueError>;
