use crate::error::{NnueError, Result};
use crate::features::{FT_IN_DIMS, VIRTUAL_DIMS};

/// Version of the quantization convention written by this crate.
///
/// Version 1: FT_SHIFT = 0, SHIFT = 6, FV_SCALE = 16, psqt column enabled,
/// signed values stored as two's complement in u16/u32/u8 fields.
/// The file itself carries no header, so engine and quantizer must agree on it.
pub const FORMAT_VERSION: u32 = 1;

/// Clipped activation applied after the feature transformer and each hidden layer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Activation {
    /// `clamp(x, 0, 1)`
    Clipped,
    /// `clamp(x, 0, 1) + slope * (x - clamp(x, 0, 1))`
    LeakyClipped { slope: f32 },
}

impl Activation {
    #[inline(always)]
    pub fn apply(&self, x: f32) -> f32 {
        let clipped = x.clamp(0.0, 1.0);
        match *self {
            Activation::Clipped => clipped,
            Activation::LeakyClipped { slope } => clipped + slope * (x - clipped),
        }
    }

    /// Fixed-point counterpart of [`apply`](Self::apply) on values where
    /// 127 stands for 1.0. The slope is taken in steps of `1 / 2^shift` and
    /// the leak rounds towards negative infinity.
    #[inline(always)]
    pub fn apply_fixed(&self, x: i32, shift: u32) -> i32 {
        let clipped = x.clamp(0, 127);
        match *self {
            Activation::Clipped => clipped,
            Activation::LeakyClipped { slope } => {
                let slope = (slope * (1u32 << shift) as f32).round_ties_even() as i32;
                clipped.wrapping_add(x.wrapping_sub(clipped).wrapping_mul(slope) >> shift)
            }
        }
    }
}

/// Architecture constants shared by the networks, the quantizer and the codec.
///
/// The network file has no header: every tensor boundary is derived from
/// these values, so they must match the file's provenance.
#[derive(Debug, Clone, PartialEq)]
pub struct Architecture {
    pub k_half_dimensions: usize,
    pub ft_in_dims: usize,
    pub virtual_dims: usize,
    pub hidden_dims: usize,
    pub psqt: bool,
    pub shift: u32,
    pub ft_shift: u32,
    pub fv_scale: i32,
    pub activation: Activation,
}

impl Default for Architecture {
    fn default() -> Self {
        Self {
            k_half_dimensions: 256,
            ft_in_dims: FT_IN_DIMS,
            virtual_dims: VIRTUAL_DIMS,
            hidden_dims: 32,
            psqt: true,
            shift: 6,
            ft_shift: 0,
            fv_scale: 16,
            activation: Activation::Clipped,
        }
    }
}

impl Architecture {
    pub fn validate(&self) -> Result<()> {
        if self.k_half_dimensions == 0 {
            return Err(invalid("k_half_dimensions must be non-zero"));
        }
        if self.ft_in_dims == 0 || self.virtual_dims == 0 || self.hidden_dims == 0 {
            return Err(invalid("dimensions must be non-zero"));
        }
        // 127 * 2^shift must stay representable in the i32 accumulators
        if self.shift > 23 {
            return Err(invalid("shift must be at most 23"));
        }
        if self.ft_shift > self.shift {
            return Err(invalid("ft_shift must not exceed shift"));
        }
        if self.fv_scale <= 0 {
            return Err(invalid("fv_scale must be positive"));
        }
        if let Activation::LeakyClipped { slope } = self.activation {
            if !(0.0..=1.0).contains(&slope) {
                return Err(invalid("leaky slope must lie in [0, 1]"));
            }
        }
        Ok(())
    }

    /// Columns of the feature transformer: accumulator values plus psqt.
    #[inline(always)]
    pub fn ft_columns(&self) -> usize {
        self.k_half_dimensions + self.psqt as usize
    }

    /// Width of the concatenated perspective accumulators.
    #[inline(always)]
    pub fn ft_out_dims(&self) -> usize {
        2 * self.k_half_dimensions
    }

    /// Feature transformer rows during training, virtual rows included.
    #[inline(always)]
    pub fn ft_rows(&self) -> usize {
        self.ft_in_dims + self.virtual_dims
    }

    /// Scale of feature transformer weights and biases.
    pub fn ft_scale(&self) -> f32 {
        127.0 * (1u32 << self.ft_shift) as f32
    }

    /// Scale of hidden and output biases.
    pub fn bias_scale(&self) -> f32 {
        127.0 * (1u32 << self.shift) as f32
    }

    /// Scale of hidden and output weights.
    pub fn weight_scale(&self) -> f32 {
        (1u32 << self.shift) as f32
    }

    /// Hidden and output weights are clamped to this magnitude before
    /// quantization so that scaling by `weight_scale` stays within i8.
    pub fn weight_clamp(&self) -> f32 {
        127.0 / self.weight_scale()
    }

    /// Exact byte length of a network file for this architecture.
    pub fn file_size(&self) -> usize {
        let ft = (self.ft_columns() + self.ft_in_dims * self.ft_columns()) * 2;
        let hidden1 = self.hidden_dims * 4 + self.hidden_dims * self.ft_out_dims();
        let hidden2 = self.hidden_dims * 4 + self.hidden_dims * self.hidden_dims;
        let output = 4 + self.hidden_dims;
        ft + hidden1 + hidden2 + output
    }
}

fn invalid(reason: &str) -> NnueError {
    NnueError::InvalidArchitecture(reason.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_file_size() {
        let arch = Architecture::default();
        let expected = 257 * 2
            + 40960 * 257 * 2
            + 32 * 4
            + 32 * 512
            + 32 * 4
            + 32 * 32
            + 4
            + 32;
        assert_eq!(arch.file_size(), expected);
        assert!(arch.validate().is_ok());
    }

    #[test]
    fn test_clamped_weights_fit_in_i8() {
        let arch = Architecture::default();
        let max = (arch.weight_clamp() * arch.weight_scale()).round_ties_even();
        assert_eq!(max, 127.0);
    }

    #[test]
    fn test_invalid_shift_is_rejected() {
        let arch = Architecture {
            ft_shift: 7,
            ..Architecture::default()
        };
        assert!(matches!(
            arch.validate(),
            Err(NnueError::InvalidArchitecture(_))
        ));
    }

    #[test]
    fn test_empty_accumulator_is_rejected() {
        for psqt in [true, false] {
            let arch = Architecture {
                k_half_dimensions: 0,
                psqt,
                ..Architecture::default()
            };
            assert!(matches!(
                arch.validate(),
                Err(NnueError::InvalidArchitecture(_))
            ));
        }
    }

    #[test]
    fn test_leaky_slope_out_of_range_is_rejected() {
        for slope in [-0.1, 1.5, f32::NAN] {
            let arch = Architecture {
                activation: Activation::LeakyClipped { slope },
                ..Architecture::default()
            };
            assert!(arch.validate().is_err(), "slope {} accepted", slope);
        }
    }

    #[test]
    fn test_fixed_point_activation() {
        assert_eq!(Activation::Clipped.apply_fixed(-40, 6), 0);
        assert_eq!(Activation::Clipped.apply_fixed(300, 6), 127);

        let leaky = Activation::LeakyClipped { slope: 0.5 };
        assert_eq!(leaky.apply_fixed(64, 6), 64);
        assert_eq!(leaky.apply_fixed(-127, 6), -64);
        assert_eq!(leaky.apply_fixed(227, 6), 177);
    }

    #[test]
    fn test_leaky_activation_keeps_slope_outside_unit_range() {
        let leaky = Activation::LeakyClipped { slope: 0.125 };
        assert_eq!(leaky.apply(0.5), 0.5);
        assert_eq!(leaky.apply(2.0), 1.125);
        assert_eq!(leaky.apply(-1.0), -0.125);
        assert_eq!(Activation::Clipped.apply(-1.0), 0.0);
    }
}
