use cozy_chess::{Color, Piece, Square};
use log::{error, info};

use crate::architecture::Architecture;
use crate::codec::Word;
use crate::error::{NnueError, Result};
use crate::features::make_index;
use crate::network::{Parameters, QuantizedNetwork};

/// Pieces reported by [`piece_values`], in order.
pub const VALUED_PIECES: [Piece; 5] = [
    Piece::Pawn,
    Piece::Knight,
    Piece::Bishop,
    Piece::Rook,
    Piece::Queen,
];

/// Range of one quantized tensor, reported for every tensor that is written.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TensorStats {
    pub min: i64,
    pub max: i64,
    pub abs_mean: f64,
}

impl TensorStats {
    fn collect(values: &[i64]) -> Self {
        let min = values.iter().copied().min().unwrap_or(0);
        let max = values.iter().copied().max().unwrap_or(0);
        let abs_mean = if values.is_empty() {
            0.0
        } else {
            values.iter().map(|v| v.unsigned_abs() as f64).sum::<f64>() / values.len() as f64
        };
        Self { min, max, abs_mean }
    }
}

/// Adds each virtual row onto every real row with the same position in its
/// bucket (`real[i] + virtual[i mod virtual_dims]`). Runs in float, before
/// any scaling, so each folded weight is rounded once.
pub fn fold_virtual(params: &Parameters, arch: &Architecture) -> Vec<f32> {
    let columns = arch.ft_columns();
    let (real, virt) = params.ft_weights.split_at(arch.ft_in_dims * columns);
    let mut folded = real.to_vec();

    for (idx, row) in folded.chunks_exact_mut(columns).enumerate() {
        let v = idx % arch.virtual_dims;
        let virtual_row = &virt[v * columns..(v + 1) * columns];
        for (w, &vw) in row.iter_mut().zip(virtual_row) {
            *w += vw;
        }
    }

    folded
}

/// Scales, rounds half to even and narrows one tensor. Any value outside the
/// storage type is an error; nothing is saturated.
pub fn quantize_tensor<W: Word>(name: &'static str, values: &[f32], scale: f32) -> Result<Vec<W>> {
    let rounded: Vec<i64> = values
        .iter()
        .map(|&v| {
            let scaled = (v * scale).round_ties_even();
            // NaN and infinities report as overflow
            if scaled.is_finite() {
                scaled as i64
            } else {
                i64::MAX
            }
        })
        .collect();

    let stats = TensorStats::collect(&rounded);
    if stats.min < W::MIN || stats.max > W::MAX {
        error!(
            "{} out of range: [{}, {}] does not fit in {} bits",
            name,
            stats.min,
            stats.max,
            W::BITS
        );
        return Err(NnueError::OutOfRange {
            tensor: name,
            min: stats.min,
            max: stats.max,
            bits: W::BITS,
        });
    }

    info!(
        "{:>8} <= {:<16} <= {:<8} | abs mean {:.2}",
        stats.min, name, stats.max, stats.abs_mean
    );

    Ok(rounded.into_iter().map(W::narrow).collect())
}

/// Converts a float parameter bundle into the fixed-point network.
///
/// The input is left untouched: virtual rows are folded into a copy and the
/// hidden and output weights are clamped on the fly. Tensors are processed in
/// file order.
pub fn quantize(params: &Parameters, arch: &Architecture) -> Result<QuantizedNetwork> {
    params.validate(arch)?;

    let ft_scale = arch.ft_scale();
    let bias_scale = arch.bias_scale();
    let weight_scale = arch.weight_scale();
    let limit = arch.weight_clamp();

    Ok(QuantizedNetwork {
        ft_biases: quantize_tensor("ft_biases", &params.ft_biases, ft_scale)?,
        ft_weights: quantize_tensor("ft_weights", &fold_virtual(params, arch), ft_scale)?,
        hidden1_biases: quantize_tensor("hidden1_biases", &params.hidden1_biases, bias_scale)?,
        hidden1_weights: quantize_tensor(
            "hidden1_weights",
            &clamped(&params.hidden1_weights, limit),
            weight_scale,
        )?,
        hidden2_biases: quantize_tensor("hidden2_biases", &params.hidden2_biases, bias_scale)?,
        hidden2_weights: quantize_tensor(
            "hidden2_weights",
            &clamped(&params.hidden2_weights, limit),
            weight_scale,
        )?,
        output_biases: quantize_tensor("output_biases", &params.output_biases, bias_scale)?,
        output_weights: quantize_tensor(
            "output_weights",
            &clamped(&params.output_weights, limit),
            weight_scale,
        )?,
    })
}

/// Average material value per piece type read off the virtual psqt column,
/// in engine units. `None` without a psqt column.
///
/// Each value averages the psqt difference of a white piece seen by both
/// perspectives over all squares, which is what the psqt shortcut adds to
/// the output.
pub fn piece_values(params: &Parameters, arch: &Architecture) -> Option<[f32; 5]> {
    if !arch.psqt || params.validate(arch).is_err() {
        return None;
    }

    let columns = arch.ft_columns();
    let k = arch.k_half_dimensions;
    let psqt = |idx: usize| params.ft_weights[(arch.ft_in_dims + idx) * columns + k];
    let to_engine = arch.bias_scale() / arch.fv_scale as f32;

    let mut values = [0.0; 5];
    for (value, piece) in values.iter_mut().zip(VALUED_PIECES) {
        let mut total = 0.0;
        for square in Square::ALL {
            let own = make_index(Color::White, square, piece, Color::White)?;
            let opponent = make_index(Color::Black, square, piece, Color::White)?;
            total += psqt(own) - psqt(opponent);
        }
        *value = 0.5 * total / Square::NUM as f32 * to_engine;
    }

    Some(values)
}

pub fn log_piece_values(values: &[f32; 5]) {
    let line = VALUED_PIECES
        .iter()
        .zip(values)
        .map(|(piece, value)| format!("{:?}={:.0}", piece, value))
        .collect::<Vec<_>>()
        .join(" ");
    info!("Piece values: {}", line);
}

fn clamped(weights: &[f32], limit: f32) -> Vec<f32> {
    weights.iter().map(|w| w.clamp(-limit, limit)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn small_arch() -> Architecture {
        Architecture {
            k_half_dimensions: 4,
            ft_in_dims: 128,
            virtual_dims: 16,
            hidden_dims: 3,
            ..Architecture::default()
        }
    }

    fn random_params(arch: &Architecture, seed: u64) -> Parameters {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut fill = |values: &mut Vec<f32>, range: f32| {
            values
                .iter_mut()
                .for_each(|v| *v = rng.gen_range(-range..range));
        };

        let mut params = Parameters::zeros(arch);
        fill(&mut params.ft_weights, 0.5);
        fill(&mut params.ft_biases, 0.5);
        fill(&mut params.hidden1_weights, 3.0);
        fill(&mut params.hidden1_biases, 1.0);
        fill(&mut params.hidden2_weights, 3.0);
        fill(&mut params.hidden2_biases, 1.0);
        fill(&mut params.output_weights, 3.0);
        fill(&mut params.output_biases, 1.0);
        params
    }

    #[test]
    fn test_quantize_is_deterministic() {
        let arch = small_arch();
        let params = random_params(&arch, 1);

        let first = codec::encode(&quantize(&params, &arch).unwrap(), &arch).unwrap();
        let second = codec::encode(&quantize(&params, &arch).unwrap(), &arch).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_quantize_leaves_input_untouched() {
        let arch = small_arch();
        let params = random_params(&arch, 2);
        let before = params.clone();

        quantize(&params, &arch).unwrap();
        assert_eq!(params, before);
    }

    #[test]
    fn test_fold_adds_matching_virtual_row() {
        let arch = small_arch();
        let params = random_params(&arch, 3);
        let columns = arch.ft_columns();
        let folded = fold_virtual(&params, &arch);

        assert_eq!(folded.len(), arch.ft_in_dims * columns);
        for idx in [0, 15, 16, 17, 100, arch.ft_in_dims - 1] {
            let v = arch.ft_in_dims + idx % arch.virtual_dims;
            for c in 0..columns {
                assert_eq!(
                    folded[idx * columns + c],
                    params.ft_weights[idx * columns + c] + params.ft_weights[v * columns + c]
                );
            }
        }
    }

    #[test]
    fn test_fold_of_ones_at_full_size() {
        let arch = Architecture {
            k_half_dimensions: 1,
            psqt: false,
            hidden_dims: 1,
            ..Architecture::default()
        };
        let mut params = Parameters::zeros(&arch);
        params.ft_weights.iter_mut().for_each(|w| *w = 1.0);

        let network = quantize(&params, &arch).unwrap();
        assert_eq!(network.ft_weights.len(), 40960);
        assert!(network.ft_weights.iter().all(|&w| w == 254));
    }

    #[test]
    fn test_fold_happens_before_rounding() {
        let arch = small_arch();
        let columns = arch.ft_columns();
        let mut params = Parameters::zeros(&arch);
        // 0.4 + 0.4 rounds to 1, while each alone rounds to 0
        params.ft_weights[0] = 0.4 / 127.0;
        params.ft_weights[arch.ft_in_dims * columns] = 0.4 / 127.0;

        let network = quantize(&params, &arch).unwrap();
        assert_eq!(network.ft_weights[0], 1);
        assert_eq!(network.ft_weights[arch.virtual_dims * columns], 0);
    }

    #[test]
    fn test_ties_round_to_even() {
        let arch = small_arch();
        let mut params = Parameters::zeros(&arch);
        params.hidden1_weights[0] = 2.5 / 64.0;
        params.hidden1_weights[1] = 3.5 / 64.0;
        params.hidden1_weights[2] = -2.5 / 64.0;

        let network = quantize(&params, &arch).unwrap();
        assert_eq!(&network.hidden1_weights[..3], &[2, 4, -2]);
    }

    #[test]
    fn test_hidden_weights_are_clamped_before_scaling() {
        let arch = small_arch();
        let params = random_params(&arch, 4);

        let network = quantize(&params, &arch).unwrap();
        let weights = network
            .hidden1_weights
            .iter()
            .chain(&network.hidden2_weights)
            .chain(&network.output_weights);
        assert!(weights.clone().all(|&w| (-127..=127).contains(&w)));
        assert!(weights.clone().any(|&w| w == 127));
        assert!(weights.clone().any(|&w| w == -127));
    }

    #[test]
    fn test_feature_transformer_overflow_is_reported() {
        let arch = small_arch();
        let mut params = Parameters::zeros(&arch);
        params.ft_weights[5] = 300.0;

        let result = quantize(&params, &arch);
        assert!(matches!(
            result,
            Err(NnueError::OutOfRange { tensor: "ft_weights", bits: 16, .. })
        ));
    }

    #[test]
    fn test_bias_overflow_is_reported() {
        let arch = small_arch();
        let mut params = Parameters::zeros(&arch);
        // 127 * 64 * 300000 exceeds i32
        params.hidden2_biases[1] = -300_000.0;

        let result = quantize(&params, &arch);
        assert!(matches!(
            result,
            Err(NnueError::OutOfRange { tensor: "hidden2_biases", bits: 32, .. })
        ));
    }

    #[test]
    fn test_nan_is_reported() {
        let values = [0.0, f32::NAN];
        assert!(matches!(
            quantize_tensor::<i8>("weights", &values, 64.0),
            Err(NnueError::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_shape_mismatch_is_reported() {
        let arch = small_arch();
        let mut params = Parameters::zeros(&arch);
        params.output_biases.push(0.0);

        assert!(matches!(
            quantize(&params, &arch),
            Err(NnueError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_piece_values_from_virtual_psqt() {
        let arch = Architecture {
            k_half_dimensions: 2,
            hidden_dims: 1,
            ..Architecture::default()
        };
        let columns = arch.ft_columns();
        let k = arch.k_half_dimensions;
        let mut params = Parameters::zeros(&arch);

        // Own pawns worth 1.0, opponent pawns worth -1.0 on every square
        for square in Square::ALL {
            let own = make_index(Color::White, square, Piece::Pawn, Color::White).unwrap();
            let opp = make_index(Color::Black, square, Piece::Pawn, Color::White).unwrap();
            params.ft_weights[(arch.ft_in_dims + own) * columns + k] = 1.0;
            params.ft_weights[(arch.ft_in_dims + opp) * columns + k] = -1.0;
        }

        let values = piece_values(&params, &arch).unwrap();
        assert_eq!(values[0], 127.0 * 64.0 / 16.0);
        assert_eq!(&values[1..], &[0.0; 4]);

        let no_psqt = Architecture { psqt: false, ..arch };
        assert!(piece_values(&Parameters::zeros(&no_psqt), &no_psqt).is_none());
    }
}
