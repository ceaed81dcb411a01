use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{mpsc, Arc, Mutex};
use std::thread;

use nnue::{Architecture, Batch, BatchSource, Result};
use rand::seq::SliceRandom;
use rand::thread_rng;

use super::shard::{Record, Sample, Shard};

// Holds x items in the channel per worker
const CHANNEL_BUFFER_MULTIPLIER: usize = 2;

// Records handed to a worker at a time
const CHUNK_SIZE: usize = 1024;

/// Which records of the shard files a source yields, by position across all files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subset {
    All,
    /// Every `stride`-th record.
    HeldOut { stride: usize },
    /// Every record except the held out ones.
    Remainder { stride: usize },
}

impl Subset {
    #[inline(always)]
    fn keeps(&self, position: usize) -> bool {
        match *self {
            Subset::All => true,
            Subset::HeldOut { stride } => position % stride == 0,
            Subset::Remainder { stride } => position % stride != 0,
        }
    }
}

/// Multi-threaded batch source over CSV shard files.
///
/// A reader thread streams records from disk and hands chunks to workers,
/// which encode them into sparse features ahead of the consumer. Batches are
/// assembled on demand and borrow the source's buffers until the next call.
/// After the last record every call returns an empty batch.
pub struct CsvBatchSource {
    receiver: Option<mpsc::Receiver<Vec<Sample>>>,
    workers: Vec<thread::JoinHandle<()>>,
    pending: VecDeque<Sample>,
    own: Vec<[i32; 2]>,
    opponent: Vec<[i32; 2]>,
    targets: Vec<f32>,
}

impl CsvBatchSource {
    pub fn new(
        files: &[PathBuf],
        subset: Subset,
        arch: &Architecture,
        num_workers: usize,
        shuffle: bool,
    ) -> Self {
        let num_workers = num_workers.max(1);
        let (sender, receiver) = mpsc::sync_channel(num_workers * CHANNEL_BUFFER_MULTIPLIER);
        let (work_sender, work_receiver) =
            mpsc::sync_channel::<Vec<Record>>(num_workers * CHANNEL_BUFFER_MULTIPLIER);
        let work_receiver = Arc::new(Mutex::new(work_receiver));

        let mut workers = Self::spawn_workers(num_workers, work_receiver, sender, arch, shuffle);

        let mut files = files.to_vec();
        if shuffle {
            files.shuffle(&mut thread_rng());
        }
        workers.push(thread::spawn(move || Self::read_records(files, subset, work_sender)));

        Self {
            receiver: Some(receiver),
            workers,
            pending: VecDeque::new(),
            own: Vec::new(),
            opponent: Vec::new(),
            targets: Vec::new(),
        }
    }

    fn read_records(files: Vec<PathBuf>, subset: Subset, work_sender: mpsc::SyncSender<Vec<Record>>) {
        let mut position = 0;
        let mut chunk = Vec::with_capacity(CHUNK_SIZE);

        for path in files {
            let shard = match Shard::open(&path) {
                Ok(shard) => shard,
                Err(e) => {
                    log::warn!("Skipping {}: {}", path.display(), e);
                    continue;
                }
            };

            for record in shard {
                if subset.keeps(position) {
                    chunk.push(record);
                }
                position += 1;

                if chunk.len() == CHUNK_SIZE {
                    let full = std::mem::replace(&mut chunk, Vec::with_capacity(CHUNK_SIZE));
                    if work_sender.send(full).is_err() {
                        return;
                    }
                }
            }
        }

        if !chunk.is_empty() {
            let _ = work_sender.send(chunk);
        }
    }

    fn spawn_workers(
        num_workers: usize,
        work_receiver: Arc<Mutex<mpsc::Receiver<Vec<Record>>>>,
        sender: mpsc::SyncSender<Vec<Sample>>,
        arch: &Architecture,
        shuffle: bool,
    ) -> Vec<thread::JoinHandle<()>> {
        (0..num_workers)
            .map(|_| {
                let rx = Arc::clone(&work_receiver);
                let tx = sender.clone();
                let arch = arch.clone();

                thread::spawn(move || loop {
                    let received = match rx.lock() {
                        Ok(rx) => rx.recv(),
                        Err(_) => break,
                    };
                    let Ok(records) = received else {
                        break;
                    };

                    let mut samples: Vec<Sample> = records
                        .iter()
                        .filter_map(|record| {
                            let sample = record.encode(&arch);
                            if sample.is_none() {
                                log::debug!("Failed to parse FEN '{}'", record.fen);
                            }
                            sample
                        })
                        .collect();

                    if shuffle {
                        samples.shuffle(&mut thread_rng());
                    }

                    if tx.send(samples).is_err() {
                        break;
                    }
                })
            })
            .collect()
    }

    fn next_sample(&mut self) -> Option<Sample> {
        while self.pending.is_empty() {
            let samples = self.receiver.as_ref()?.recv().ok()?;
            self.pending.extend(samples);
        }
        self.pending.pop_front()
    }
}

impl BatchSource for CsvBatchSource {
    fn next_batch(&mut self, requested: usize) -> Result<Batch<'_>> {
        self.own.clear();
        self.opponent.clear();
        self.targets.clear();

        while self.targets.len() < requested {
            let Some(sample) = self.next_sample() else {
                break;
            };

            let row = self.targets.len() as i32;
            self.own
                .extend(sample.own.iter().map(|&idx| [row, idx as i32]));
            self.opponent
                .extend(sample.opponent.iter().map(|&idx| [row, idx as i32]));
            self.targets.push(sample.target);
        }

        // Both perspectives see the same pieces
        debug_assert_eq!(self.own.len(), self.opponent.len());

        Ok(Batch {
            size: self.targets.len(),
            active: self.own.len(),
            own: &self.own,
            opponent: &self.opponent,
            targets: &self.targets,
        })
    }
}

impl Drop for CsvBatchSource {
    fn drop(&mut self) {
        // Unblock workers waiting to send before joining them
        self.receiver.take();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}
