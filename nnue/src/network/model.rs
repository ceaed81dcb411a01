use candle_core::{DType, Device, Error, Result, Tensor};
use candle_nn::{linear, Init, Linear, VarBuilder, VarMap};

use crate::architecture::{Activation, Architecture};

use super::CLAMPED_WEIGHTS;

const FT_INIT_RANGE: f64 = 0.01;

/// Active features of one perspective for a whole batch, as
/// (sample row, feature index) pairs.
pub struct SparseInput {
    rows: Tensor,
    features: Tensor,
    active: usize,
    size: usize,
}

impl SparseInput {
    pub fn new(pairs: &[[i32; 2]], size: usize, device: &Device) -> Result<Self> {
        let active = pairs.len();
        let rows: Vec<u32> = pairs.iter().map(|pair| pair[0] as u32).collect();
        let features: Vec<u32> = pairs.iter().map(|pair| pair[1] as u32).collect();

        Ok(Self {
            rows: Tensor::from_vec(rows, active, device)?,
            features: Tensor::from_vec(features, active, device)?,
            active,
            size,
        })
    }

    /// Builds an input from one feature list per sample.
    pub fn from_samples(samples: &[Vec<usize>], device: &Device) -> Result<Self> {
        let pairs: Vec<[i32; 2]> = samples
            .iter()
            .enumerate()
            .flat_map(|(row, features)| features.iter().map(move |&f| [row as i32, f as i32]))
            .collect();

        Self::new(&pairs, samples.len(), device)
    }

    pub fn size(&self) -> usize {
        self.size
    }
}

// Candle network definition (used for training and checkpoint loading)
pub struct Network {
    // [feature_idx][column], virtual rows included
    pub(crate) ft_weight: Tensor,
    pub(crate) ft_bias: Tensor,
    pub(crate) hidden1: Linear,
    pub(crate) hidden2: Linear,
    pub(crate) output: Linear,
    arch: Architecture,
}

impl Network {
    pub fn new(vs: &VarBuilder, arch: &Architecture) -> Result<Self> {
        let ft = vs.pp("ft");
        let columns = arch.ft_columns();

        Ok(Self {
            ft_weight: ft.get_with_hints(
                (arch.ft_rows(), columns),
                "weight",
                Init::Uniform {
                    lo: -FT_INIT_RANGE,
                    up: FT_INIT_RANGE,
                },
            )?,
            ft_bias: ft.get_with_hints(columns, "bias", Init::Const(0.0))?,
            hidden1: linear(arch.ft_out_dims(), arch.hidden_dims, vs.pp("hidden1"))?,
            hidden2: linear(arch.hidden_dims, arch.hidden_dims, vs.pp("hidden2"))?,
            output: linear(arch.hidden_dims, 1, vs.pp("output"))?,
            arch: arch.clone(),
        })
    }

    pub fn architecture(&self) -> &Architecture {
        &self.arch
    }

    /// Evaluates a batch from both perspectives, side to move first.
    pub fn forward(&self, own: &SparseInput, opponent: &SparseInput) -> Result<Tensor> {
        let k = self.arch.k_half_dimensions;
        let own = self.transform(own)?;
        let opponent = self.transform(opponent)?;

        let x = Tensor::cat(&[own.narrow(1, 0, k)?, opponent.narrow(1, 0, k)?], 1)?;
        let x = self.activate(&x)?;
        let x = self.activate(&x.apply(&self.hidden1)?)?;
        let x = self.activate(&x.apply(&self.hidden2)?)?;
        let x = x.apply(&self.output)?;

        if !self.arch.psqt {
            return Ok(x);
        }

        // Linear shortcut, bypasses every activation
        let psqt = (own.narrow(1, k, 1)? - opponent.narrow(1, k, 1)?)?.affine(0.5, 0.0)?;
        x + psqt
    }

    // Sparse matrix product: sums the weight rows of the active features per sample.
    fn transform(&self, input: &SparseInput) -> Result<Tensor> {
        let columns = self.arch.ft_columns();
        let acc = Tensor::zeros((input.size, columns), DType::F32, self.ft_weight.device())?;

        let acc = if input.active > 0 {
            let rows = self.ft_weight.index_select(&input.features, 0)?;
            acc.index_add(&input.rows, &rows, 0)?
        } else {
            acc
        };

        acc.broadcast_add(&self.ft_bias)
    }

    fn activate(&self, x: &Tensor) -> Result<Tensor> {
        let clipped = x.clamp(0f32, 1f32)?;
        match self.arch.activation {
            Activation::Clipped => Ok(clipped),
            Activation::LeakyClipped { slope } => {
                let leak = (x - &clipped)?.affine(slope as f64, 0.0)?;
                clipped + leak
            }
        }
    }
}

/// Clamps hidden and output weights in place to `±127 / 2^SHIFT`.
pub fn clamp_weights(varmap: &VarMap, arch: &Architecture) -> Result<()> {
    let limit = arch.weight_clamp();
    let data = varmap
        .data()
        .lock()
        .map_err(|_| Error::Msg("varmap lock poisoned".into()))?;

    for name in CLAMPED_WEIGHTS {
        if let Some(var) = data.get(name) {
            let clamped = var.as_tensor().clamp(-limit, limit)?;
            var.set(&clamped)?;
        }
    }

    Ok(())
}
