use candle_core::{DType, Result, Tensor};

use crate::args::LossKind;

const HUBER_DELTA: f64 = 1.0;

pub fn loss(kind: LossKind, pred: &Tensor, target: &Tensor) -> Result<Tensor> {
    match kind {
        LossKind::Mse => candle_nn::loss::mse(pred, target),
        LossKind::Huber => huber(pred, target),
    }
}

pub fn huber(pred: &Tensor, target: &Tensor) -> Result<Tensor> {
    let diff = (pred - target)?.abs()?;

    let mask = diff.lt(HUBER_DELTA)?.to_dtype(DType::F32)?;

    let l2 = (diff.sqr()? * 0.5)?;
    let l1 = ((diff * HUBER_DELTA)? - (0.5 * HUBER_DELTA * HUBER_DELTA))?;

    let inverted_mask = (1.0 - &mask)?;
    let loss = (mask.broadcast_mul(&l2)? + inverted_mask.broadcast_mul(&l1)?)?;
    loss.mean_all()
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;

    #[test]
    fn test_huber_is_quadratic_then_linear() -> Result<()> {
        let pred = Tensor::new(&[[0.5f32], [3.0]], &Device::Cpu)?;
        let target = Tensor::zeros((2, 1), DType::F32, &Device::Cpu)?;

        let value = huber(&pred, &target)?.to_vec0::<f32>()?;
        // (0.5 * 0.25 + (3.0 - 0.5)) / 2
        assert!((value - 1.3125).abs() < 1e-6);

        let mse = loss(LossKind::Mse, &pred, &target)?.to_vec0::<f32>()?;
        assert!((mse - 4.625).abs() < 1e-6);
        Ok(())
    }
}
