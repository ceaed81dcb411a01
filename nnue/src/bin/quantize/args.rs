use clap::Parser;
use nnue::{Activation, Architecture};

#[derive(Parser, Debug)]
#[command(name = "NNUE Quantizer")]
#[command(author = "Jørgen Hanssen <jorgen@hanssen.io>")]
#[command(version = "0.1.0")]
pub struct Args {
    /// Trained `.safetensors` checkpoint. The network is written next to it
    /// with the `.nnue` extension.
    pub checkpoint: String,

    /// Accumulator width per perspective the checkpoint was trained with.
    #[arg(long, default_value_t = 256)]
    pub k_half_dimensions: usize,

    /// The checkpoint has no psqt shortcut column.
    #[arg(long)]
    pub no_psqt: bool,

    /// Leaky activation slope the checkpoint was trained with.
    #[arg(long)]
    pub leaky_slope: Option<f32>,

    /// Read the written file back and compare it to the quantized network.
    #[arg(long)]
    pub verify: bool,
}

impl Args {
    pub fn architecture(&self) -> Architecture {
        Architecture {
            k_half_dimensions: self.k_half_dimensions,
            psqt: !self.no_psqt,
            activation: match self.leaky_slope {
                Some(slope) => Activation::LeakyClipped { slope },
                None => Activation::Clipped,
            },
            ..Architecture::default()
        }
    }
}
