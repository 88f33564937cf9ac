//! LZ4 / Zstd block compression with output-size limits.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::io::Read;

/// Compression algorithm selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionKind {
    #[default]
    None,
    Lz4,
    Zstd,
}

impl CompressionKind {
    pub fn name(self) -> &'static str {
        match self {
            CompressionKind::None => "none",
            CompressionKind::Lz4 => "lz4",
            CompressionKind::Zstd => "zstd",
        }
    }
}

/// Entropy (bits per byte) above which a sample is treated as incompressible.
const MIN_ENTROPY_THRESHOLD: f64 = 4.0;

/// Bytes sampled from the front of a payload for the entropy estimate.
const ENTROPY_SAMPLE: usize = 512;

/// Shannon entropy of `data` in bits per byte (0.0 ..= 8.0).
fn shannon_entropy(data: &[u8]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }

    let mut histogram = [0u32; 256];
    for &byte in data {
        histogram[byte as usize] += 1;
    }

    let total = data.len() as f64;
    histogram
        .iter()
        .filter(|&&count| count > 0)
        .map(|&count| {
            let p = count as f64 / total;
            -p * p.log2()
        })
        .sum()
}

/// Stateless compressor bound to one algorithm and its limits.
#[derive(Debug, Clone, Copy)]
pub struct Compressor {
    kind: CompressionKind,
    threshold: usize,
    max_output: usize,
}

impl Compressor {
    pub fn new(kind: CompressionKind, threshold: usize, max_output: usize) -> Self {
        Self {
            kind,
            threshold,
            max_output,
        }
    }

    pub fn kind(&self) -> CompressionKind {
        self.kind
    }

    /// Compress unconditionally.
    pub fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        match self.kind {
            CompressionKind::None => Ok(data.to_vec()),
            CompressionKind::Lz4 => Ok(lz4_flex::compress_prepend_size(data)),
            CompressionKind::Zstd => {
                let mut out = Vec::new();
                zstd::stream::copy_encode(data, &mut out, 1)
                    .map_err(|_| Error::CompressionFailure)?;
                Ok(out)
            }
        }
    }

    /// Decompress, refusing output larger than the configured maximum.
    pub fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        match self.kind {
            CompressionKind::None => Ok(data.to_vec()),
            CompressionKind::Lz4 => {
                // lz4_flex prepends the decompressed size as u32 LE; check it
                // before the library allocates.
                if data.len() < 4 {
                    return Err(Error::DecompressionFailure);
                }
                let claimed = u32::from_le_bytes([data[0], data[1], data[2], data[3]]) as usize;
                if claimed > self.max_output {
                    return Err(Error::DecompressionFailure);
                }
                lz4_flex::decompress_size_prepended(data).map_err(|_| Error::DecompressionFailure)
            }
            CompressionKind::Zstd => {
                let mut decoder =
                    zstd::stream::Decoder::new(data).map_err(|_| Error::DecompressionFailure)?;
                let mut out = Vec::new();
                let mut chunk = [0u8; 8192];
                loop {
                    let n = decoder
                        .read(&mut chunk)
                        .map_err(|_| Error::DecompressionFailure)?;
                    if n == 0 {
                        break;
                    }
                    out.extend_from_slice(&chunk[..n]);
                    if out.len() > self.max_output {
                        return Err(Error::DecompressionFailure);
                    }
                }
                Ok(out)
            }
        }
    }

    /// Compress only when the payload is large enough, looks compressible,
    /// and actually shrinks. Returns the bytes and whether they are compressed.
    pub fn maybe_compress(&self, data: &[u8]) -> Result<(Vec<u8>, bool)> {
        if self.kind == CompressionKind::None || data.len() < self.threshold {
            return Ok((data.to_vec(), false));
        }

        let sample = &data[..data.len().min(ENTROPY_SAMPLE)];
        if data.len() >= 1024 && shannon_entropy(sample) >= MIN_ENTROPY_THRESHOLD {
            return Ok((data.to_vec(), false));
        }

        let compressed = self.compress(data)?;
        if compressed.len() < data.len() {
            Ok((compressed, true))
        } else {
            Ok((data.to_vec(), false))
        }
    }
}
