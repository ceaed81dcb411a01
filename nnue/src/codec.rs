use std::fs;
use std::io::Write;
use std::path::Path;

use tempfile::NamedTempFile;

use crate::architecture::Architecture;
use crate::error::{NnueError, Result};
use crate::network::QuantizedNetwork;

// File Layout (little-endian, no header, no padding):
//
//   [FT bias      ] ft_columns                 x u16
//   [FT weight    ] ft_in_dims x ft_columns    x u16   (feature-major, folded)
//   [Hidden1 bias ] hidden                     x u32
//   [Hidden1 wght ] hidden x 2*k_half          x u8    ([out][in])
//   [Hidden2 bias ] hidden                     x u32
//   [Hidden2 wght ] hidden x hidden            x u8    ([out][in])
//   [Output bias  ] 1                          x u32
//   [Output wght  ] hidden                     x u8
//
// Boundaries come only from the architecture. A file written for another
// architecture is detected by its length alone.

/// Fixed-width integer stored as two's complement little-endian bytes.
pub trait Word: Copy {
    const BITS: u32;
    const BYTES: usize;
    const MIN: i64;
    const MAX: i64;

    /// Narrows a value already checked against `MIN..=MAX`.
    fn narrow(value: i64) -> Self;
    fn put(self, out: &mut Vec<u8>);
    fn take(bytes: &[u8]) -> Self;
}

macro_rules! impl_word {
    ($($t:ty),*) => {$(
        impl Word for $t {
            const BITS: u32 = <$t>::BITS;
            const BYTES: usize = std::mem::size_of::<$t>();
            const MIN: i64 = <$t>::MIN as i64;
            const MAX: i64 = <$t>::MAX as i64;

            #[inline(always)]
            fn narrow(value: i64) -> Self {
                value as $t
            }

            #[inline(always)]
            fn put(self, out: &mut Vec<u8>) {
                out.extend_from_slice(&self.to_le_bytes());
            }

            #[inline(always)]
            fn take(bytes: &[u8]) -> Self {
                let mut buf = [0u8; std::mem::size_of::<$t>()];
                buf.copy_from_slice(bytes);
                <$t>::from_le_bytes(buf)
            }
        }
    )*};
}

impl_word!(i8, i16, i32);

/// Serializes a quantized network into the on-disk byte layout.
pub fn encode(network: &QuantizedNetwork, arch: &Architecture) -> Result<Vec<u8>> {
    check_shapes(network, arch)?;

    let mut out = Vec::with_capacity(arch.file_size());
    put(&mut out, &network.ft_biases);
    put(&mut out, &network.ft_weights);
    put(&mut out, &network.hidden1_biases);
    put(&mut out, &network.hidden1_weights);
    put(&mut out, &network.hidden2_biases);
    put(&mut out, &network.hidden2_weights);
    put(&mut out, &network.output_biases);
    put(&mut out, &network.output_weights);

    debug_assert_eq!(out.len(), arch.file_size());
    Ok(out)
}

/// Parses a network file. Fails before reading anything if the length does
/// not match the architecture.
pub fn decode(bytes: &[u8], arch: &Architecture) -> Result<QuantizedNetwork> {
    arch.validate()?;

    let expected = arch.file_size();
    if bytes.len() != expected {
        return Err(NnueError::ArchitectureMismatch {
            expected,
            actual: bytes.len(),
        });
    }

    let hidden = arch.hidden_dims;
    let mut reader = Reader { bytes };

    Ok(QuantizedNetwork {
        ft_biases: reader.take(arch.ft_columns()),
        ft_weights: reader.take(arch.ft_in_dims * arch.ft_columns()),
        hidden1_biases: reader.take(hidden),
        hidden1_weights: reader.take(hidden * arch.ft_out_dims()),
        hidden2_biases: reader.take(hidden),
        hidden2_weights: reader.take(hidden * hidden),
        output_biases: reader.take(1),
        output_weights: reader.take(hidden),
    })
}

/// Writes a network file atomically: the bytes go to a temporary file in the
/// destination directory which is renamed over `path` only once fully written.
pub fn write(path: &Path, network: &QuantizedNetwork, arch: &Architecture) -> Result<()> {
    let bytes = encode(network, arch)?;

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut file = NamedTempFile::new_in(dir)?;
    file.write_all(&bytes)?;
    file.flush()?;
    file.as_file().sync_all()?;
    file.persist(path)?;

    Ok(())
}

pub fn read(path: &Path, arch: &Architecture) -> Result<QuantizedNetwork> {
    decode(&fs::read(path)?, arch)
}

fn put<W: Word>(out: &mut Vec<u8>, values: &[W]) {
    for &v in values {
        v.put(out);
    }
}

struct Reader<'a> {
    bytes: &'a [u8],
}

impl<'a> Reader<'a> {
    // Total length is checked up front, so sections never run short.
    fn take<W: Word>(&mut self, count: usize) -> Vec<W> {
        let (head, tail) = self.bytes.split_at(count * W::BYTES);
        self.bytes = tail;
        head.chunks_exact(W::BYTES).map(W::take).collect()
    }
}

fn check_shapes(network: &QuantizedNetwork, arch: &Architecture) -> Result<()> {
    arch.validate()?;
    let hidden = arch.hidden_dims;

    let sections = [
        ("ft_biases", network.ft_biases.len(), arch.ft_columns()),
        (
            "ft_weights",
            network.ft_weights.len(),
            arch.ft_in_dims * arch.ft_columns(),
        ),
        ("hidden1_biases", network.hidden1_biases.len(), hidden),
        (
            "hidden1_weights",
            network.hidden1_weights.len(),
            hidden * arch.ft_out_dims(),
        ),
        ("hidden2_biases", network.hidden2_biases.len(), hidden),
        ("hidden2_weights", network.hidden2_weights.len(), hidden * hidden),
        ("output_biases", network.output_biases.len(), 1),
        ("output_weights", network.output_weights.len(), hidden),
    ];

    for (tensor, actual, expected) in sections {
        if actual != expected {
            return Err(NnueError::ShapeMismatch {
                tensor: tensor.to_string(),
                expected,
                actual,
            });
        }
    }

    Ok(())
}
