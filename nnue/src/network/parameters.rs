use std::collections::HashMap;
use std::path::Path;

use candle_core::{DType, Device, Tensor};

use crate::architecture::Architecture;
use crate::error::{NnueError, Result};

use super::model::Network;
use super::{
    FT_BIAS, FT_WEIGHT, HIDDEN1_BIAS, HIDDEN1_WEIGHT, HIDDEN2_BIAS, HIDDEN2_WEIGHT, OUTPUT_BIAS,
    OUTPUT_WEIGHT,
};

/// Immutable floating-point parameter bundle of a trained network.
///
/// Layouts are row-major. The feature transformer is feature-major
/// (`[ft_rows][ft_columns]`, virtual rows last, psqt column last); every other
/// layer is `[out][in]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameters {
    pub ft_weights: Vec<f32>,
    pub ft_biases: Vec<f32>,
    pub hidden1_weights: Vec<f32>,
    pub hidden1_biases: Vec<f32>,
    pub hidden2_weights: Vec<f32>,
    pub hidden2_biases: Vec<f32>,
    pub output_weights: Vec<f32>,
    pub output_biases: Vec<f32>,
}

impl Parameters {
    pub fn zeros(arch: &Architecture) -> Self {
        let hidden = arch.hidden_dims;
        Self {
            ft_weights: vec![0.0; arch.ft_rows() * arch.ft_columns()],
            ft_biases: vec![0.0; arch.ft_columns()],
            hidden1_weights: vec![0.0; hidden * arch.ft_out_dims()],
            hidden1_biases: vec![0.0; hidden],
            hidden2_weights: vec![0.0; hidden * hidden],
            hidden2_biases: vec![0.0; hidden],
            output_weights: vec![0.0; hidden],
            output_biases: vec![0.0; 1],
        }
    }

    /// Copies the parameters out of a live training network.
    pub fn from_network(network: &Network) -> Result<Self> {
        let params = Self {
            ft_weights: values(&network.ft_weight)?,
            ft_biases: values(&network.ft_bias)?,
            hidden1_weights: values(network.hidden1.weight())?,
            hidden1_biases: values(bias(network.hidden1.bias(), HIDDEN1_BIAS)?)?,
            hidden2_weights: values(network.hidden2.weight())?,
            hidden2_biases: values(bias(network.hidden2.bias(), HIDDEN2_BIAS)?)?,
            output_weights: values(network.output.weight())?,
            output_biases: values(bias(network.output.bias(), OUTPUT_BIAS)?)?,
        };
        params.validate(network.architecture())?;
        Ok(params)
    }

    /// Loads a safetensors checkpoint written by the training network.
    pub fn load(path: &Path, arch: &Architecture) -> Result<Self> {
        let tensors = candle_core::safetensors::load(path, &Device::Cpu)?;
        let get = |name: &str| -> Result<Vec<f32>> {
            let tensor = tensors
                .get(name)
                .ok_or_else(|| NnueError::MissingTensor(name.to_string()))?;
            values(tensor)
        };

        let params = Self {
            ft_weights: get(FT_WEIGHT)?,
            ft_biases: get(FT_BIAS)?,
            hidden1_weights: get(HIDDEN1_WEIGHT)?,
            hidden1_biases: get(HIDDEN1_BIAS)?,
            hidden2_weights: get(HIDDEN2_WEIGHT)?,
            hidden2_biases: get(HIDDEN2_BIAS)?,
            output_weights: get(OUTPUT_WEIGHT)?,
            output_biases: get(OUTPUT_BIAS)?,
        };
        params.validate(arch)?;
        Ok(params)
    }

    /// Writes the bundle as a safetensors checkpoint under the training names.
    pub fn save(&self, path: &Path, arch: &Architecture) -> Result<()> {
        self.validate(arch)?;
        let hidden = arch.hidden_dims;
        let tensor = |data: &[f32], shape: &[usize]| Tensor::from_slice(data, shape, &Device::Cpu);

        let tensors: HashMap<String, Tensor> = [
            (FT_WEIGHT, tensor(&self.ft_weights, &[arch.ft_rows(), arch.ft_columns()])?),
            (FT_BIAS, tensor(&self.ft_biases, &[arch.ft_columns()])?),
            (HIDDEN1_WEIGHT, tensor(&self.hidden1_weights, &[hidden, arch.ft_out_dims()])?),
            (HIDDEN1_BIAS, tensor(&self.hidden1_biases, &[hidden])?),
            (HIDDEN2_WEIGHT, tensor(&self.hidden2_weights, &[hidden, hidden])?),
            (HIDDEN2_BIAS, tensor(&self.hidden2_biases, &[hidden])?),
            (OUTPUT_WEIGHT, tensor(&self.output_weights, &[1, hidden])?),
            (OUTPUT_BIAS, tensor(&self.output_biases, &[1])?),
        ]
        .into_iter()
        .map(|(name, t)| (name.to_string(), t))
        .collect();

        candle_core::safetensors::save(&tensors, path)?;
        Ok(())
    }

    pub fn validate(&self, arch: &Architecture) -> Result<()> {
        arch.validate()?;
        let hidden = arch.hidden_dims;

        check_len(FT_WEIGHT, &self.ft_weights, arch.ft_rows() * arch.ft_columns())?;
        check_len(FT_BIAS, &self.ft_biases, arch.ft_columns())?;
        check_len(HIDDEN1_WEIGHT, &self.hidden1_weights, hidden * arch.ft_out_dims())?;
        check_len(HIDDEN1_BIAS, &self.hidden1_biases, hidden)?;
        check_len(HIDDEN2_WEIGHT, &self.hidden2_weights, hidden * hidden)?;
        check_len(HIDDEN2_BIAS, &self.hidden2_biases, hidden)?;
        check_len(OUTPUT_WEIGHT, &self.output_weights, hidden)?;
        check_len(OUTPUT_BIAS, &self.output_biases, 1)
    }

    /// Clamps hidden and output weights to `±127 / 2^SHIFT`.
    pub fn clamp_weights(&mut self, arch: &Architecture) {
        let limit = arch.weight_clamp();
        for w in self
            .hidden1_weights
            .iter_mut()
            .chain(self.hidden2_weights.iter_mut())
            .chain(self.output_weights.iter_mut())
        {
            *w = w.clamp(-limit, limit);
        }
    }

    /// Floating-point reference forward pass. Features may include virtual indices.
    pub fn forward(&self, arch: &Architecture, own: &[usize], opponent: &[usize]) -> f32 {
        let k = arch.k_half_dimensions;
        let own = self.transform(arch, own);
        let opponent = self.transform(arch, opponent);

        let input: Vec<f32> = own[..k]
            .iter()
            .chain(&opponent[..k])
            .map(|&x| arch.activation.apply(x))
            .collect();

        let mut hidden1 = affine(&self.hidden1_weights, &self.hidden1_biases, &input);
        hidden1.iter_mut().for_each(|x| *x = arch.activation.apply(*x));

        let mut hidden2 = affine(&self.hidden2_weights, &self.hidden2_biases, &hidden1);
        hidden2.iter_mut().for_each(|x| *x = arch.activation.apply(*x));

        let output = affine(&self.output_weights, &self.output_biases, &hidden2)[0];

        if arch.psqt {
            output + 0.5 * (own[k] - opponent[k])
        } else {
            output
        }
    }

    fn transform(&self, arch: &Architecture, features: &[usize]) -> Vec<f32> {
        let columns = arch.ft_columns();
        let mut acc = self.ft_biases.clone();

        for &idx in features {
            let row = &self.ft_weights[idx * columns..(idx + 1) * columns];
            for (a, &w) in acc.iter_mut().zip(row) {
                *a += w;
            }
        }

        acc
    }
}

fn affine(weights: &[f32], biases: &[f32], input: &[f32]) -> Vec<f32> {
    biases
        .iter()
        .zip(weights.chunks_exact(input.len()))
        .map(|(&b, row)| b + row.iter().zip(input).map(|(&w, &x)| w * x).sum::<f32>())
        .collect()
}

fn values(tensor: &Tensor) -> Result<Vec<f32>> {
    Ok(tensor.flatten_all()?.to_dtype(DType::F32)?.to_vec1()?)
}

fn bias<'a>(bias: Option<&'a Tensor>, name: &str) -> Result<&'a Tensor> {
    bias.ok_or_else(|| NnueError::MissingTensor(name.to_string()))
}

fn check_len(name: &str, values: &[f32], expected: usize) -> Result<()> {
    if values.len() != expected {
        return Err(NnueError::ShapeMismatch {
            tensor: name.to_string(),
            expected,
            actual: values.len(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_arch() -> Architecture {
        Architecture {
            k_half_dimensions: 4,
            hidden_dims: 2,
            ..Architecture::default()
        }
    }

    #[test]
    fn test_save_and_load_checkpoint() {
        let arch = small_arch();
        let mut params = Parameters::zeros(&arch);
        params.ft_weights[17] = 0.25;
        params.hidden1_weights[3] = -0.5;
        params.output_biases[0] = 0.125;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.safetensors");
        params.save(&path, &arch).unwrap();

        let loaded = Parameters::load(&path, &arch).unwrap();
        assert_eq!(loaded, params);
    }

    #[test]
    fn test_load_rejects_other_architecture() {
        let arch = small_arch();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.safetensors");
        Parameters::zeros(&arch).save(&path, &arch).unwrap();

        let other = Architecture {
            k_half_dimensions: 8,
            ..arch
        };
        assert!(matches!(
            Parameters::load(&path, &other),
            Err(NnueError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_clamp_weights_limits_hidden_and_output_only() {
        let arch = small_arch();
        let mut params = Parameters::zeros(&arch);
        params.ft_weights[0] = 10.0;
        params.hidden1_weights[0] = 10.0;
        params.hidden2_weights[0] = -10.0;
        params.output_weights[0] = 3.0;
        params.output_biases[0] = 10.0;

        params.clamp_weights(&arch);

        let limit = 127.0 / 64.0;
        assert_eq!(params.ft_weights[0], 10.0);
        assert_eq!(params.hidden1_weights[0], limit);
        assert_eq!(params.hidden2_weights[0], -limit);
        assert_eq!(params.output_weights[0], limit);
        assert_eq!(params.output_biases[0], 10.0);
    }

    #[test]
    fn test_psqt_bypasses_activations() {
        let arch = small_arch();
        let k = arch.k_half_dimensions;
        let columns = arch.ft_columns();
        let mut params = Parameters::zeros(&arch);
        // Large psqt contributions that any clamp would cut off
        params.ft_weights[3 * columns + k] = 6.0;
        params.ft_weights[5 * columns + k] = 2.0;

        let eval = params.forward(&arch, &[3], &[5]);
        assert_eq!(eval, 0.5 * (6.0 - 2.0));
    }
}
