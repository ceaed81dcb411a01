use candle_core::{Device, Tensor};
use nnue::batch::{drain, BatchSource};
use nnue::network::{Network, SparseInput};
use std::error::Error;

use crate::args::LossKind;
use crate::utils::loss::loss;

/// Mean loss of `network` over every batch of `source`.
pub fn evaluate(
    network: &Network,
    source: &mut dyn BatchSource,
    batch_size: usize,
    kind: LossKind,
    device: &Device,
) -> Result<f32, Box<dyn Error>> {
    let mut total_loss = 0.0;

    let batches = drain(source, batch_size, |batch| {
        let own = SparseInput::new(batch.own, batch.size, device)?;
        let opponent = SparseInput::new(batch.opponent, batch.size, device)?;
        let y = Tensor::from_slice(batch.targets, (batch.size, 1), device)?;

        let preds = network.forward(&own, &opponent)?;
        total_loss += loss(kind, &preds, &y)?.to_vec0::<f32>()?;
        Ok(())
    })?;

    Ok(total_loss / batches.max(1) as f32)
}
