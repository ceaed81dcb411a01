use candle_core::{DType, Device, Tensor};
use candle_nn::{AdamW, Optimizer, ParamsAdamW, VarBuilder, VarMap};
use nnue::batch::drain;
use nnue::network::{clamp_weights, Network, SparseInput};
use nnue::quantizer::{log_piece_values, piece_values};
use nnue::{Architecture, Parameters};
use std::error::Error;
use std::path::PathBuf;

use crate::args::{Args, LossKind};
use crate::dataset::Dataset;
use crate::training::evaluation::evaluate;
use crate::training::metrics::MetricsTracker;
use crate::training::progress::TrainingProgressBar;
use crate::utils::device::get_device;
use crate::utils::loss::loss;

pub struct Trainer {
    network: Network,
    optimizer: AdamW,
    varmap: VarMap,
    device: Device,
    arch: Architecture,
    loss: LossKind,
    batch_size: usize,
    epochs: usize,
    lr_decay: f64,
    patience: u64,
    model_path: PathBuf,
}

impl Trainer {
    pub fn new(args: &Args, arch: &Architecture) -> Result<Self, Box<dyn Error>> {
        let device = get_device()?;

        let varmap = VarMap::new();
        let vs = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let network = Network::new(&vs, arch)?;
        clamp_weights(&varmap, arch)?;

        let optimizer = AdamW::new(
            varmap.all_vars(),
            ParamsAdamW {
                lr: args.learning_rate,
                ..Default::default()
            },
        )?;

        Ok(Self {
            network,
            optimizer,
            varmap,
            device,
            arch: arch.clone(),
            loss: args.loss,
            batch_size: args.batch_size.max(1),
            epochs: args.epochs,
            lr_decay: args.lr_decay,
            patience: args.patience,
            model_path: PathBuf::from(&args.out),
        })
    }

    pub fn train(&mut self, dataset: &Dataset) -> Result<(), Box<dyn Error>> {
        let mut metrics = MetricsTracker::new(self.patience);

        for epoch in 1..=self.epochs {
            let val_loss = self.train_epoch(epoch, dataset)?;

            if metrics.update(epoch, val_loss) {
                self.save_model()?;
            }

            if metrics.should_stop() {
                log::info!("Early stopping after {} epochs", epoch);
                break;
            }

            self.decay_learning_rate();
        }

        let (best_epoch, best_loss) = metrics.best();
        log::info!(
            "Best validation loss {:.6} at epoch {}, saved to {}",
            best_loss,
            best_epoch,
            self.model_path.display()
        );

        self.report_piece_values()
    }

    fn train_epoch(&mut self, epoch: usize, dataset: &Dataset) -> Result<f32, Box<dyn Error>> {
        let num_batches = dataset.train_len().div_ceil(self.batch_size);
        let progress = TrainingProgressBar::new(epoch, num_batches)?;

        let mut source = dataset.train_source();
        let mut total_loss = 0.0;
        let mut batches_processed = 0;
        let mut train_loss = 0.0;

        drain(&mut source, self.batch_size, |batch| {
            let own = SparseInput::new(batch.own, batch.size, &self.device)?;
            let opponent = SparseInput::new(batch.opponent, batch.size, &self.device)?;
            let y = Tensor::from_slice(batch.targets, (batch.size, 1), &self.device)?;

            let preds = self.network.forward(&own, &opponent)?;
            let loss = loss(self.loss, &preds, &y)?;

            self.optimizer.backward_step(&loss)?;
            clamp_weights(&self.varmap, &self.arch)?;

            total_loss += loss.to_vec0::<f32>()?;
            batches_processed += 1;

            train_loss = total_loss / batches_processed as f32;
            progress.update(train_loss);
            Ok(())
        })?;

        let mut val_source = dataset.val_source();
        let val_loss = evaluate(
            &self.network,
            &mut val_source,
            self.batch_size,
            self.loss,
            &self.device,
        )?;

        progress.finish(val_loss, train_loss);

        Ok(val_loss)
    }

    fn decay_learning_rate(&mut self) {
        let current_lr = self.optimizer.learning_rate();
        self.optimizer.set_learning_rate(current_lr * self.lr_decay);
    }

    fn save_model(&self) -> Result<(), Box<dyn Error>> {
        self.varmap.save(&self.model_path)?;
        Ok(())
    }

    fn report_piece_values(&self) -> Result<(), Box<dyn Error>> {
        if !self.model_path.exists() {
            return Ok(());
        }
        let params = Parameters::load(&self.model_path, &self.arch)?;
        if let Some(values) = piece_values(&params, &self.arch) {
            log_piece_values(&values);
        }
        Ok(())
    }
}
