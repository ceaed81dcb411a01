use crate::error::Result;

/// One training batch, borrowed from its source and valid until the next call.
///
/// `own` and `opponent` hold `active` (sample row, feature index) pairs each.
/// Feature indices may be real or virtual.
#[derive(Debug, Clone, Copy)]
pub struct Batch<'a> {
    pub size: usize,
    pub active: usize,
    pub own: &'a [[i32; 2]],
    pub opponent: &'a [[i32; 2]],
    pub targets: &'a [f32],
}

impl<'a> Batch<'a> {
    pub fn empty() -> Self {
        Self {
            size: 0,
            active: 0,
            own: &[],
            opponent: &[],
            targets: &[],
        }
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }
}

/// Producer of sparse batches. A batch with `size == 0` marks the end of the data.
pub trait BatchSource {
    fn next_batch(&mut self, requested: usize) -> Result<Batch<'_>>;
}

/// Feeds batches to `consume` until the source runs dry.
/// Returns the number of batches consumed.
pub fn drain<S, F>(source: &mut S, requested: usize, mut consume: F) -> Result<usize>
where
    S: BatchSource + ?Sized,
    F: FnMut(&Batch) -> Result<()>,
{
    let mut count = 0;
    loop {
        let batch = source.next_batch(requested)?;
        if batch.is_empty() {
            return Ok(count);
        }
        consume(&batch)?;
        count += 1;
    }
}
