pub mod architecture;
pub mod batch;
pub mod codec;
pub mod error;
pub mod features;
pub mod network;
pub mod quantizer;

pub use architecture::{Activation, Architecture, FORMAT_VERSION};
pub use batch::{drain, Batch, BatchSource};
pub use error::{NnueError, Result};
pub use network::{Network, Parameters, QuantizedNetwork, SparseInput};
pub use quantizer::quantize;
