pub mod inference;
pub mod model;
pub mod parameters;

pub use inference::QuantizedNetwork;
pub use model::{clamp_weights, Network, SparseInput};
pub use parameters::Parameters;

// Tensor names shared by the training network and checkpoints.
pub const FT_WEIGHT: &str = "ft.weight";
pub const FT_BIAS: &str = "ft.bias";
pub const HIDDEN1_WEIGHT: &str = "hidden1.weight";
pub const HIDDEN1_BIAS: &str = "hidden1.bias";
pub const HIDDEN2_WEIGHT: &str = "hidden2.weight";
pub const HIDDEN2_BIAS: &str = "hidden2.bias";
pub const OUTPUT_WEIGHT: &str = "output.weight";
pub const OUTPUT_BIAS: &str = "output.bias";

/// Weights clamped to `±127 / 2^SHIFT` during training and before quantization.
pub const CLAMPED_WEIGHTS: [&str; 3] = [HIDDEN1_WEIGHT, HIDDEN2_WEIGHT, OUTPUT_WEIGHT];
