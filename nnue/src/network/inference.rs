use crate::architecture::{Activation, Architecture};

/// Fixed-point network as loaded by the engine.
///
/// Values are signed; the file stores them as two's complement in
/// u16 (feature transformer), u32 (biases) and u8 (weights) fields.
/// Layouts match [`Parameters`](super::Parameters) with the virtual rows folded away.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuantizedNetwork {
    pub ft_biases: Vec<i16>,
    // [feature_idx][column]
    pub ft_weights: Vec<i16>,
    pub hidden1_biases: Vec<i32>,
    // [out][in]
    pub hidden1_weights: Vec<i8>,
    pub hidden2_biases: Vec<i32>,
    pub hidden2_weights: Vec<i8>,
    pub output_biases: Vec<i32>,
    pub output_weights: Vec<i8>,
}

impl QuantizedNetwork {
    /// Fixed-point forward pass over real feature indices, side to move first.
    /// Returns the evaluation in engine units.
    ///
    /// Sums wrap on overflow, as the engine's two's complement integer
    /// arithmetic does.
    pub fn evaluate(&self, arch: &Architecture, own: &[usize], opponent: &[usize]) -> i32 {
        let k = arch.k_half_dimensions;
        let own = self.transform(arch, own);
        let opponent = self.transform(arch, opponent);

        let input: Vec<i32> = own[..k]
            .iter()
            .chain(&opponent[..k])
            .map(|&acc| arch.activation.apply_fixed(acc, arch.shift))
            .collect();

        let hidden1 = affine_propagate(
            &input,
            &self.hidden1_biases,
            &self.hidden1_weights,
            arch.shift,
            arch.activation,
        );
        let hidden2 = affine_propagate(
            &hidden1,
            &self.hidden2_biases,
            &self.hidden2_weights,
            arch.shift,
            arch.activation,
        );

        let mut sum = dot(self.output_biases[0], &self.output_weights, &hidden2);

        if arch.psqt {
            // psqt is in feature transformer units, lift it to output units
            let psqt = own[k].wrapping_sub(opponent[k]) << (arch.shift - arch.ft_shift);
            sum = sum.wrapping_add(psqt / 2);
        }

        sum / arch.fv_scale
    }

    fn transform(&self, arch: &Architecture, features: &[usize]) -> Vec<i32> {
        let columns = arch.ft_columns();
        let mut acc: Vec<i32> = self.ft_biases.iter().map(|&b| b as i32).collect();

        for &idx in features {
            let row = &self.ft_weights[idx * columns..(idx + 1) * columns];
            for (a, &w) in acc.iter_mut().zip(row) {
                *a = a.wrapping_add(w as i32);
            }
        }

        acc
    }
}

fn affine_propagate(
    input: &[i32],
    biases: &[i32],
    weights: &[i8],
    shift: u32,
    activation: Activation,
) -> Vec<i32> {
    biases
        .iter()
        .zip(weights.chunks_exact(input.len()))
        .map(|(&b, row)| activation.apply_fixed(dot(b, row, input) >> shift, shift))
        .collect()
}

#[inline(always)]
fn dot(bias: i32, weights: &[i8], input: &[i32]) -> i32 {
    weights
        .iter()
        .zip(input)
        .fold(bias, |sum, (&w, &x)| sum.wrapping_add((w as i32).wrapping_mul(x)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny_arch(activation: Activation) -> Architecture {
        Architecture {
            k_half_dimensions: 1,
            ft_in_dims: 4,
            virtual_dims: 2,
            hidden_dims: 2,
            psqt: false,
            activation,
            ..Architecture::default()
        }
    }

    fn zero_network(arch: &Architecture) -> QuantizedNetwork {
        let hidden = arch.hidden_dims;
        QuantizedNetwork {
            ft_biases: vec![0; arch.ft_columns()],
            ft_weights: vec![0; arch.ft_in_dims * arch.ft_columns()],
            hidden1_biases: vec![0; hidden],
            hidden1_weights: vec![0; hidden * arch.ft_out_dims()],
            hidden2_biases: vec![0; hidden],
            hidden2_weights: vec![0; hidden * hidden],
            output_biases: vec![0],
            output_weights: vec![0; hidden],
        }
    }

    #[test]
    fn test_leaky_slope_passes_negative_hidden_values() {
        let arch = tiny_arch(Activation::LeakyClipped { slope: 0.5 });
        let mut network = zero_network(&arch);
        // -1.0 in bias units, weights of 1.0
        network.hidden2_biases = vec![-127 * 64; 2];
        network.output_weights = vec![64; 2];

        // Float: 2 * 1.0 * (0.5 * -1.0) = -1.0, i.e. -508 engine units
        let eval = network.evaluate(&arch, &[], &[]);
        assert_eq!(eval, 2 * 64 * -64 / 16);

        let clipped = Architecture {
            activation: Activation::Clipped,
            ..arch
        };
        assert_eq!(network.evaluate(&clipped, &[], &[]), 0);
    }

    #[test]
    fn test_sums_wrap_instead_of_overflowing() {
        let arch = tiny_arch(Activation::Clipped);
        let mut network = zero_network(&arch);
        network.output_biases = vec![i32::MAX];
        network.hidden2_biases = vec![127 * 64; 2];
        network.output_weights = vec![1; 2];

        let expected = i32::MAX.wrapping_add(2 * 127) / arch.fv_scale;
        assert_eq!(network.evaluate(&arch, &[], &[]), expected);
    }
}
