use clap::{Parser, ValueEnum};
use nnue::{Activation, Architecture};

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LossKind {
    Mse,
    Huber,
}

#[derive(Parser, Debug, Clone)]
#[command(name = "NNUE Trainer")]
#[command(author = "Jørgen Hanssen <jorgen@hanssen.io>")]
#[command(version = "0.1.0")]
pub struct Args {
    /// Directory of `fen,score` CSV files.
    #[arg(long)]
    pub data: String,

    /// Directory of validation CSV files. Without it every n-th record of
    /// the training data is held out (see --val-ratio).
    #[arg(long)]
    pub val: Option<String>,

    /// Checkpoint written whenever validation loss improves.
    #[arg(long, default_value = "model.safetensors")]
    pub out: String,

    /// Number of positions per training batch.
    #[arg(long, default_value_t = 8192)]
    pub batch_size: usize,

    /// Initial learning rate for optimizer.
    #[arg(long, default_value_t = 0.001)]
    pub learning_rate: f64,

    /// Maximum number of training epochs.
    #[arg(long, default_value_t = 100)]
    pub epochs: usize,

    /// Number of data loader workers.
    #[arg(long, default_value_t = 4)]
    pub workers: usize,

    /// Fraction of records held out for validation when --val is not given.
    #[arg(long, default_value_t = 0.05)]
    pub val_ratio: f64,

    /// Learning rate decay factor per epoch.
    #[arg(long, default_value_t = 0.95)]
    pub lr_decay: f64,

    /// Epochs without improvement before early stopping.
    #[arg(long, default_value_t = 2)]
    pub patience: u64,

    #[arg(long, value_enum, default_value_t = LossKind::Mse)]
    pub loss: LossKind,

    /// Accumulator width per perspective.
    #[arg(long, default_value_t = 256)]
    pub k_half_dimensions: usize,

    /// Train without the psqt shortcut column.
    #[arg(long)]
    pub no_psqt: bool,

    /// Slope of the leaky clipped activation outside [0, 1]. Plain clipping when absent.
    #[arg(long)]
    pub leaky_slope: Option<f32>,
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
