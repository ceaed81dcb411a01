mod loader;
mod shard;

pub use loader::{CsvBatchSource, Subset};

use std::path::{Path, PathBuf};
use std::{fs, io};

use nnue::Architecture;

use crate::args::Args;
use shard::Shard;

pub struct Dataset {
    train_files: Vec<PathBuf>,
    val_files: Vec<PathBuf>,
    train_subset: Subset,
    val_subset: Subset,
    train_len: usize,
    val_len: usize,
    arch: Architecture,
    workers: usize,
}

impl Dataset {
    pub fn load(args: &Args, arch: &Architecture) -> io::Result<Self> {
        log::info!("Loading data from {:?}...", args.data);
        let train_files = get_files(Path::new(&args.data))?;
        let total = count_records(&train_files)?;

        let dataset = match &args.val {
            Some(val_dir) => {
                let val_files = get_files(Path::new(val_dir))?;
                let val_len = count_records(&val_files)?;
                Self {
                    train_files,
                    val_files,
                    train_subset: Subset::All,
                    val_subset: Subset::All,
                    train_len: total,
                    val_len,
                    arch: arch.clone(),
                    workers: args.workers,
                }
            }
            None => {
                let stride = (1.0 / args.val_ratio.clamp(0.01, 0.5)).round() as usize;
                let val_len = total.div_ceil(stride);
                Self {
                    val_files: train_files.clone(),
                    train_files,
                    train_subset: Subset::Remainder { stride },
                    val_subset: Subset::HeldOut { stride },
                    train_len: total - val_len,
                    val_len,
                    arch: arch.clone(),
                    workers: args.workers,
                }
            }
        };

        log::info!("Training positions: {}", dataset.train_len);
        log::info!("Validation positions: {}", dataset.val_len);

        if dataset.val_len == 0 {
            log::warn!("No validation positions, early stopping will not trigger on progress");
        }

        if dataset.train_len == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "no training positions found",
            ));
        }

        Ok(dataset)
    }

    pub fn train_len(&self) -> usize {
        self.train_len
    }

    pub fn train_source(&self) -> CsvBatchSource {
        CsvBatchSource::new(
            &self.train_files,
            self.train_subset,
            &self.arch,
            self.workers,
            true,
        )
    }

    pub fn val_source(&self) -> CsvBatchSource {
        CsvBatchSource::new(
            &self.val_files,
            self.val_subset,
            &self.arch,
            self.workers,
            false,
        )
    }
}

fn count_records(files: &[PathBuf]) -> io::Result<usize> {
    files.iter().map(|path| Shard::count_records(path)).sum()
}

fn get_files(data_dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut entries: Vec<PathBuf> = fs::read_dir(data_dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.extension().is_some_and(|ext| ext == "csv"))
        .collect();

    log::info!("Found {} CSV files in {}", entries.len(), data_dir.display());
    entries.sort();

    Ok(entries)
}
